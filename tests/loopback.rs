//! End-to-end tests for the period exchange: a software "device" feeds
//! host buffers through `run_period` and checks what comes back out.

use pad::hw::latency::{frames_to_micros, micros_to_frames};
use pad::hw::{NoClock, StreamControl, StreamStatus};
use pad::{
    AudioStreamConfiguration, EndpointSpec, HostSampleFormat, Io, Stream, StreamOptions,
    StreamSetup,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

const RATE: f64 = 48_000.0;

fn ramp(channel: usize, frame: usize) -> i16 {
    (((frame * 7 + channel * 1000) % 20_000) as i32 - 10_000) as i16
}

fn host_period(channels: usize, start: usize, frames: usize) -> Vec<u8> {
    (start..start + frames)
        .flat_map(|f| (0..channels).map(move |ch| ramp(ch, f)))
        .flat_map(|s| s.to_le_bytes())
        .collect()
}

fn decode(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}

fn stereo_setup(block: usize, options: StreamOptions) -> StreamSetup {
    StreamSetup::new(
        AudioStreamConfiguration::new(RATE)
            .stereo_input(0)
            .stereo_output(0)
            .buffer_size(block),
    )
    .with_options(options)
    .input(EndpointSpec::new(HostSampleFormat::int16_le(), 0, 2))
    .output(EndpointSpec::new(HostSampleFormat::int16_le(), 0, 2))
}

fn thru(latencies: Arc<Mutex<Vec<i64>>>) -> impl FnMut(&mut Io<'_>) + Send + 'static {
    move |io: &mut Io<'_>| {
        let inputs = io.inputs();
        for ch in 0..io.num_outputs() {
            io.output(ch).copy_from_slice(inputs.channel(ch));
        }
        if let Ok(mut l) = latencies.lock() {
            l.push(io.latency_micros());
        }
    }
}

/// Runs `periods` periods and returns the interleaved output samples.
fn run(stream: &mut Stream, period: usize, periods: usize) -> Vec<i16> {
    let mut out = Vec::new();
    for p in 0..periods {
        let input = host_period(2, p * period, period);
        let mut output = vec![0u8; period * 4];
        let hw_time = frames_to_micros((p * period) as i64, RATE);
        stream
            .run_period(&[input.as_slice()], &mut [output.as_mut_slice()], Some(hw_time), period)
            .unwrap();
        out.extend(decode(&output));
    }
    out
}

fn assert_delayed(out: &[i16], delay: usize) {
    let frames = out.len() / 2;
    for f in 0..frames {
        for ch in 0..2 {
            let expected = if f < delay { 0 } else { ramp(ch, f - delay) };
            assert_eq!(out[f * 2 + ch], expected, "frame {f} channel {ch}");
        }
    }
}

#[test]
fn stereo_loopback_is_delayed_by_reported_latency() {
    pad::logging::init();
    let latencies = Arc::new(Mutex::new(Vec::new()));
    let mut stream = Stream::open(
        stereo_setup(256, StreamOptions::default()),
        thru(latencies.clone()),
        NoClock,
    )
    .unwrap();

    let out = run(&mut stream, 256, 12);
    let latencies = latencies.lock().unwrap();
    assert_eq!(latencies.len(), 12);
    let delay = micros_to_frames(latencies[0], RATE) as usize;
    assert_eq!(delay, 256);
    assert!(latencies.iter().all(|&l| micros_to_frames(l, RATE) == 256));
    assert_delayed(&out, delay);
    let (input_latency, output_latency) = stream.latency_frames();
    assert_eq!(input_latency + output_latency, delay);

    let stats = stream.stats();
    assert_eq!(stats.underruns, 0);
    assert_eq!(stats.overflow_frames, 0);
    assert_eq!(stats.xruns, 0);
}

#[test]
fn mismatched_period_and_block_keep_a_constant_delay() {
    let latencies = Arc::new(Mutex::new(Vec::new()));
    let options = StreamOptions {
        nperiods: 2,
        ..StreamOptions::default()
    };
    let mut stream =
        Stream::open(stereo_setup(64, options), thru(latencies.clone()), NoClock).unwrap();
    assert_eq!(stream.prefill_frames(), 128);

    let out = run(&mut stream, 100, 20);
    let latencies = latencies.lock().unwrap();
    assert!(!latencies.is_empty());
    assert!(latencies.iter().all(|&l| micros_to_frames(l, RATE) == 128));
    assert_delayed(&out, 128);
    assert_eq!(stream.stats().underruns, 0);
    assert_eq!(stream.latency_frames(), (0, 128));
}

#[test]
fn device_latency_is_reported_on_both_sides() {
    let latencies = Arc::new(Mutex::new(Vec::new()));
    let options = StreamOptions {
        input_latency_frames: 32,
        output_latency_frames: 16,
        ..StreamOptions::default()
    };
    let setup = StreamSetup::new(
        AudioStreamConfiguration::new(RATE)
            .stereo_input(0)
            .stereo_output(0)
            .buffer_size(256),
    )
    .with_options(options)
    .input(EndpointSpec::new(HostSampleFormat::int16_le(), 0, 2).with_latency(8))
    .output(EndpointSpec::new(HostSampleFormat::int16_le(), 0, 2).with_latency(24));
    let mut stream = Stream::open(setup, thru(latencies.clone()), NoClock).unwrap();
    assert_eq!(stream.latency_frames(), (40, 296));

    let out = run(&mut stream, 256, 4);
    let (input_latency, output_latency) = stream.latency_frames();
    let latencies = latencies.lock().unwrap();
    assert!(!latencies.is_empty());
    for &l in latencies.iter() {
        assert_eq!(micros_to_frames(l, RATE) as usize, input_latency + output_latency);
    }
    // Device-side latency happens outside the exchange; the buffers
    // themselves only carry the prefill.
    assert_delayed(&out, stream.prefill_frames());
}

#[test]
fn sparse_channel_selection_maps_through() {
    // Device channels 1 and 3 of a four-channel endpoint.
    let setup = StreamSetup::new(
        AudioStreamConfiguration::new(RATE)
            .input(1)
            .input(3)
            .output(1)
            .output(3)
            .buffer_size(32),
    )
    .input(EndpointSpec::new(HostSampleFormat::int16_le(), 0, 4))
    .output(EndpointSpec::new(HostSampleFormat::int16_le(), 0, 4));
    let mut stream = Stream::open(
        setup,
        |io: &mut Io<'_>| {
            assert_eq!((io.num_inputs(), io.num_outputs()), (2, 2));
            let inputs = io.inputs();
            io.output(0).copy_from_slice(inputs.channel(1));
            io.output(1).copy_from_slice(inputs.channel(0));
        },
        NoClock,
    )
    .unwrap();

    let mut outputs = Vec::new();
    for p in 0..3 {
        let input = host_period(4, p * 32, 32);
        let mut output = vec![0xaau8; 32 * 8];
        stream
            .run_period(&[input.as_slice()], &mut [output.as_mut_slice()], None, 32)
            .unwrap();
        outputs.extend(decode(&output));
    }
    for f in 32..96 {
        let row = &outputs[f * 4..f * 4 + 4];
        assert_eq!(row[0], 0);
        assert_eq!(row[2], 0);
        assert_eq!(row[1], ramp(3, f - 32));
        assert_eq!(row[3], ramp(1, f - 32));
    }
}

#[test]
fn timestamp_gap_counts_an_xrun() {
    let mut stream = Stream::open(
        stereo_setup(64, StreamOptions::default()),
        |_: &mut Io<'_>| {},
        NoClock,
    )
    .unwrap();
    let input = host_period(2, 0, 64);
    let mut output = vec![0u8; 64 * 4];
    for t in [0, 1_333, 2_667, 20_000] {
        stream
            .run_period(&[input.as_slice()], &mut [output.as_mut_slice()], Some(t), 64)
            .unwrap();
    }
    assert_eq!(stream.stats().xruns, 1);
}

#[test]
fn suspend_from_another_thread_stops_callbacks() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut stream = Stream::open(
        stereo_setup(64, StreamOptions::default()),
        move |_: &mut Io<'_>| {
            counter.fetch_add(1, Ordering::SeqCst);
        },
        NoClock,
    )
    .unwrap();
    let control: Arc<StreamControl> = stream.control();

    let rt = thread::spawn(move || {
        let input = host_period(2, 0, 64);
        let mut output = vec![0u8; 64 * 4];
        while stream.status() != StreamStatus::Stopped {
            stream
                .run_period(&[input.as_slice()], &mut [output.as_mut_slice()], None, 64)
                .unwrap();
            thread::sleep(Duration::from_micros(200));
        }
        stream.stats()
    });

    while calls.load(Ordering::SeqCst) < 5 {
        thread::sleep(Duration::from_millis(1));
    }
    control.suspend().unwrap();
    let frozen = calls.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(10));
    assert_eq!(calls.load(Ordering::SeqCst), frozen);

    control.resume().unwrap();
    while calls.load(Ordering::SeqCst) <= frozen {
        thread::sleep(Duration::from_millis(1));
    }
    control.close();
    let stats = rt.join().unwrap();
    assert!(stats.skipped_periods > 0);
}
