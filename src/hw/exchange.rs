//! Per-period buffer exchange between a hardware backend and the
//! application callback.
//!
//! Each hardware period is decoded into per-endpoint input rings, the
//! callback is run for as many blocks as input and output allow, and the
//! output rings are drained back into the host buffers. Output rings start
//! with `prefill` frames of silence, so with a fixed block size the output
//! lags the input by exactly that amount.

use super::codec::{HostSampleFormat, SampleCodec};
use super::control::{PeriodGuard, StreamControl, StreamStatus, TransitionLock, transition_lock};
use super::convert::{deinterleave, interleave};
use super::latency::{frames_to_micros, latency_ranges, playback_prefill_frames};
use super::options::StreamOptions;
use super::planar::{Planar, PlanarMut};
use super::ports::{channel_map, gather, scatter};
use super::ring::RingBuffer;
use super::sync::PeriodClock;
use super::traits::{AudioCallback, DeviceClock};
use super::transpose::TransposePlan;
use crate::Sample;
use crate::channels::ChannelRangeSet;
use crate::config::AudioStreamConfiguration;
use crate::error::{ErrorCode, PadError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// One block of interleaved host channels, e.g. an ASIO buffer pair or an
/// ALSA/OSS device, starting at device channel `first_channel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSpec {
    pub format: HostSampleFormat,
    pub first_channel: usize,
    pub channels: usize,
    #[serde(default)]
    pub latency_frames: usize,
}

impl EndpointSpec {
    pub fn new(format: HostSampleFormat, first_channel: usize, channels: usize) -> Self {
        Self {
            format,
            first_channel,
            channels,
            latency_frames: 0,
        }
    }

    pub fn with_latency(mut self, frames: usize) -> Self {
        self.latency_frames = frames;
        self
    }

    pub fn frame_bytes(&self) -> usize {
        self.channels * self.format.bytes()
    }

    fn device_end(&self) -> usize {
        self.first_channel + self.channels
    }
}

/// Everything needed to open a [`Stream`].
#[derive(Debug, Clone)]
pub struct StreamSetup {
    pub config: AudioStreamConfiguration,
    pub options: StreamOptions,
    pub inputs: Vec<EndpointSpec>,
    pub outputs: Vec<EndpointSpec>,
}

impl StreamSetup {
    pub fn new(config: AudioStreamConfiguration) -> Self {
        Self {
            config,
            options: StreamOptions::default(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: StreamOptions) -> Self {
        self.options = options;
        self
    }

    pub fn input(mut self, endpoint: EndpointSpec) -> Self {
        self.inputs.push(endpoint);
        self
    }

    pub fn output(mut self, endpoint: EndpointSpec) -> Self {
        self.outputs.push(endpoint);
        self
    }
}

/// What the callback sees for one block.
pub struct Io<'a> {
    config: &'a AudioStreamConfiguration,
    inputs: Planar<'a>,
    outputs: PlanarMut<'a>,
    input_buffer_time: i64,
    output_buffer_time: i64,
}

impl<'a> Io<'a> {
    pub fn config(&self) -> &AudioStreamConfiguration {
        self.config
    }

    pub fn frames(&self) -> usize {
        self.inputs.frames()
    }

    pub fn num_inputs(&self) -> usize {
        self.inputs.channels()
    }

    pub fn num_outputs(&self) -> usize {
        self.outputs.channels()
    }

    /// Stream input channel `channel`, in order of the active input ranges.
    pub fn input(&self, channel: usize) -> &[Sample] {
        self.inputs.channel(channel)
    }

    /// Zeroed before the callback runs.
    pub fn output(&mut self, channel: usize) -> &mut [Sample] {
        self.outputs.channel_mut(channel)
    }

    pub fn inputs(&self) -> Planar<'a> {
        self.inputs
    }

    pub fn outputs(&mut self) -> &mut PlanarMut<'a> {
        &mut self.outputs
    }

    /// Device time in microseconds at which the first input frame was
    /// captured.
    pub fn input_buffer_time(&self) -> i64 {
        self.input_buffer_time
    }

    /// Device time in microseconds at which the first output frame will be
    /// heard.
    pub fn output_buffer_time(&self) -> i64 {
        self.output_buffer_time
    }

    pub fn latency_micros(&self) -> i64 {
        self.output_buffer_time - self.input_buffer_time
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeriodReport {
    /// Callback invocations during the period.
    pub turns: usize,
    /// Frames handed to the callback.
    pub frames: usize,
    /// The stream was not streaming; outputs were silenced.
    pub skipped: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub periods: u64,
    pub skipped_periods: u64,
    pub idle_periods: u64,
    pub turns: u64,
    pub frames: u64,
    pub overflow_frames: u64,
    pub underruns: u64,
    pub xruns: u64,
}

struct Endpoint {
    spec: EndpointSpec,
    codec: SampleCodec,
    ring: RingBuffer,
    map: Vec<Option<usize>>,
    staging: Vec<Sample>,
}

impl Endpoint {
    fn open(spec: EndpointSpec, ranges: &ChannelRangeSet, period: usize, capacity: usize) -> Result<Self> {
        if spec.channels == 0 {
            return Err(PadError::soft(
                ErrorCode::InvalidBufferSize,
                format!("endpoint at channel {} has no channels", spec.first_channel),
            ));
        }
        Ok(Self {
            codec: SampleCodec::new(spec.format)?,
            ring: RingBuffer::new(spec.channels, capacity)?,
            map: channel_map(ranges, spec.first_channel, spec.channels),
            staging: vec![0.0; period * spec.channels],
            spec,
        })
    }
}

const PROFILE_INTERVAL: Duration = Duration::from_secs(1);

struct Profiler {
    report_at: Instant,
    periods: u64,
    turns: u64,
    busy_ns: u128,
    worst_ns: u128,
}

impl Profiler {
    fn new() -> Self {
        Self {
            report_at: Instant::now() + PROFILE_INTERVAL,
            periods: 0,
            turns: 0,
            busy_ns: 0,
            worst_ns: 0,
        }
    }

    fn record(&mut self, busy: Duration, report: &PeriodReport) {
        let ns = busy.as_nanos();
        self.periods += 1;
        self.turns += report.turns as u64;
        self.busy_ns += ns;
        self.worst_ns = self.worst_ns.max(ns);
    }

    fn maybe_report(&mut self, period_frames: usize, sample_rate: f64, stats: &StreamStats) {
        let now = Instant::now();
        if now < self.report_at {
            return;
        }
        let avg_us = if self.periods > 0 {
            (self.busy_ns / self.periods as u128) as f64 / 1_000.0
        } else {
            0.0
        };
        let expected_pps = if period_frames > 0 {
            sample_rate / period_frames as f64
        } else {
            0.0
        };
        info!(
            "stream profile: expected_pps={:.1} periods={} turns={} avg_us={:.1} worst_us={:.1} xruns={} underruns={} overflow_frames={}",
            expected_pps,
            self.periods,
            self.turns,
            avg_us,
            self.worst_ns as f64 / 1_000.0,
            stats.xruns,
            stats.underruns,
            stats.overflow_frames
        );
        self.report_at = now + PROFILE_INTERVAL;
        self.periods = 0;
        self.turns = 0;
        self.busy_ns = 0;
        self.worst_ns = 0;
    }
}

pub struct Stream {
    config: AudioStreamConfiguration,
    options: StreamOptions,
    plan: TransposePlan,
    control: Arc<StreamControl>,
    inputs: Vec<Endpoint>,
    outputs: Vec<Endpoint>,
    /// Active stream channels `(inputs, outputs)`, fixed at open.
    channels: (usize, usize),
    /// 0 lets each callback follow what the hardware delivers.
    block_frames: usize,
    scratch_frames: usize,
    prefill_frames: usize,
    input_latency_us: i64,
    output_latency_us: i64,
    scratch_in: Vec<Sample>,
    scratch_out: Vec<Sample>,
    callback: Box<dyn AudioCallback>,
    clock: Box<dyn DeviceClock>,
    period_clock: PeriodClock,
    primed: bool,
    stats: StreamStats,
    profiler: Option<Profiler>,
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("config", &self.config)
            .field("status", &self.control.status())
            .field("block_frames", &self.block_frames)
            .field("prefill_frames", &self.prefill_frames)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Stream {
    pub fn open(
        setup: StreamSetup,
        callback: impl AudioCallback + 'static,
        clock: impl DeviceClock + 'static,
    ) -> Result<Self> {
        Self::open_with_lock(setup, callback, clock, transition_lock())
    }

    /// Open with a transition lock shared with other streams.
    pub fn open_with_lock(
        setup: StreamSetup,
        callback: impl AudioCallback + 'static,
        clock: impl DeviceClock + 'static,
        lock: TransitionLock,
    ) -> Result<Self> {
        let StreamSetup {
            mut config,
            options,
            inputs,
            outputs,
        } = setup;
        config.validate()?;

        let device_inputs = inputs.iter().map(EndpointSpec::device_end).max().unwrap_or(0);
        let device_outputs = outputs.iter().map(EndpointSpec::device_end).max().unwrap_or(0);
        let requested = (config.num_stream_inputs(), config.num_stream_outputs());
        config.set_device_channel_limits(device_inputs, device_outputs);
        let granted = (config.num_stream_inputs(), config.num_stream_outputs());
        if requested != granted {
            warn!(
                "requested {}/{} channels, device exposes {}/{}; using {}/{}",
                requested.0, requested.1, device_inputs, device_outputs, granted.0, granted.1
            );
        }
        if granted == (0, 0) {
            return Err(PadError::soft(
                ErrorCode::ChannelRangeInvalid,
                "no active channels on this device",
            ));
        }

        let period = options.max_period_frames.max(1);
        let block = config.buffer_size_frames();
        if block > period {
            return Err(PadError::soft(
                ErrorCode::InvalidBufferSize,
                format!("buffer size {block} exceeds the largest period {period}"),
            ));
        }
        let scratch_frames = if block > 0 { block } else { period };
        let prefill = playback_prefill_frames(block, options.nperiods, options.sync_mode);
        let capacity = options
            .ring_capacity(period, scratch_frames)
            .max((prefill + period + scratch_frames).next_power_of_two());

        let inputs = inputs
            .into_iter()
            .map(|spec| Endpoint::open(spec, config.input_ranges(), period, capacity))
            .collect::<Result<Vec<_>>>()?;
        let outputs = outputs
            .into_iter()
            .map(|spec| Endpoint::open(spec, config.output_ranges(), period, capacity))
            .collect::<Result<Vec<_>>>()?;

        let sample_rate = config.get_sample_rate();
        let in_latency = options.input_latency_frames
            + inputs.iter().map(|e| e.spec.latency_frames).max().unwrap_or(0);
        let out_latency = options.output_latency_frames
            + outputs.iter().map(|e| e.spec.latency_frames).max().unwrap_or(0);

        let status = if config.is_start_suspended() {
            StreamStatus::Suspended
        } else {
            StreamStatus::Streaming
        };
        let plan = TransposePlan::from_options(options.scalar_transpose);

        let mut stream = Self {
            scratch_in: vec![0.0; granted.0 * scratch_frames],
            scratch_out: vec![0.0; granted.1 * scratch_frames],
            control: StreamControl::with_lock(status, lock),
            channels: granted,
            block_frames: block,
            scratch_frames,
            prefill_frames: prefill,
            input_latency_us: frames_to_micros(in_latency as i64, sample_rate),
            output_latency_us: frames_to_micros(out_latency as i64, sample_rate),
            callback: Box::new(callback),
            clock: Box::new(clock),
            period_clock: PeriodClock::new(sample_rate),
            primed: false,
            stats: StreamStats::default(),
            profiler: options.profile.then(Profiler::new),
            plan,
            inputs,
            outputs,
            options,
            config,
        };
        stream.prime();
        info!(
            "stream opened: rate={} inputs={} outputs={} block={} prefill={} ring={} widths={:?} status={:?}",
            sample_rate,
            granted.0,
            granted.1,
            block,
            prefill,
            capacity,
            plan.widths(),
            status
        );
        Ok(stream)
    }

    pub fn config(&self) -> &AudioStreamConfiguration {
        &self.config
    }

    pub fn options(&self) -> &StreamOptions {
        &self.options
    }

    pub fn control(&self) -> Arc<StreamControl> {
        Arc::clone(&self.control)
    }

    pub fn status(&self) -> StreamStatus {
        self.control.status()
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    pub fn plan(&self) -> TransposePlan {
        self.plan
    }

    /// Active `(input, output)` stream channels after clipping to the device.
    pub fn stream_channels(&self) -> (usize, usize) {
        self.channels
    }

    pub fn prefill_frames(&self) -> usize {
        self.prefill_frames
    }

    /// `(input, output)` latency in frames. Their sum is the delay the
    /// callback sees through [`Io::latency_micros`].
    pub fn latency_frames(&self) -> (usize, usize) {
        let in_extra = self.inputs.iter().map(|e| e.spec.latency_frames).max().unwrap_or(0);
        let out_extra = self.outputs.iter().map(|e| e.spec.latency_frames).max().unwrap_or(0);
        latency_ranges(
            self.block_frames,
            self.options.nperiods,
            self.options.sync_mode,
            self.options.input_latency_frames + in_extra,
            self.options.output_latency_frames + out_extra,
        )
    }

    /// Report a backend failure. Hard errors close the stream.
    pub fn fault(&self, err: PadError) -> PadError {
        if err.is_hard() {
            error!("{err}; closing stream");
            self.control.close();
        } else {
            warn!("{err}");
        }
        err
    }

    fn prime(&mut self) {
        for ep in &mut self.inputs {
            ep.ring.clear();
        }
        for ep in &mut self.outputs {
            ep.ring.clear();
            ep.ring.fill_silence(self.prefill_frames);
        }
        self.period_clock.reset();
        self.primed = true;
    }

    /// Exchange one hardware period of `frames` frames.
    ///
    /// `inputs[i]` and `outputs[i]` hold interleaved host samples for the
    /// i-th input and output endpoint. `hw_time_us` is the device time of
    /// the period, when the backend knows it.
    pub fn run_period(
        &mut self,
        inputs: &[&[u8]],
        outputs: &mut [&mut [u8]],
        hw_time_us: Option<i64>,
        frames: usize,
    ) -> Result<PeriodReport> {
        self.check_buffers(inputs, outputs, frames)?;

        let control = Arc::clone(&self.control);
        let Some(guard) = control.enter() else {
            for (ep, buf) in self.outputs.iter().zip(outputs.iter_mut()) {
                ep.codec.encode_silence(&mut buf[..frames * ep.spec.frame_bytes()]);
            }
            self.primed = false;
            self.stats.skipped_periods += 1;
            return Ok(PeriodReport {
                skipped: true,
                ..PeriodReport::default()
            });
        };
        if !self.primed {
            debug!("re-priming rings after suspension");
            self.prime();
        }

        let started = Instant::now();
        let sample_rate = self.config.get_sample_rate();
        let chunk_frames = self.options.max_period_frames.max(1);
        let mut report = PeriodReport::default();
        let mut offset = 0;
        while offset < frames {
            let n = (frames - offset).min(chunk_frames);
            let hw_time = hw_time_us.map(|t| t + frames_to_micros(offset as i64, sample_rate));
            self.exchange_chunk(&guard, inputs, outputs, offset, n, hw_time, &mut report);
            offset += n;
        }
        drop(guard);

        self.stats.periods += 1;
        if report.turns == 0 {
            self.stats.idle_periods += 1;
        }
        if let Some(profiler) = self.profiler.as_mut() {
            profiler.record(started.elapsed(), &report);
            profiler.maybe_report(frames, sample_rate, &self.stats);
        }
        Ok(report)
    }

    fn check_buffers(&self, inputs: &[&[u8]], outputs: &[&mut [u8]], frames: usize) -> Result<()> {
        if inputs.len() != self.inputs.len() || outputs.len() != self.outputs.len() {
            return Err(PadError::soft(
                ErrorCode::BufferMismatch,
                format!(
                    "got {}/{} buffers for {}/{} endpoints",
                    inputs.len(),
                    outputs.len(),
                    self.inputs.len(),
                    self.outputs.len()
                ),
            ));
        }
        let short = self
            .inputs
            .iter()
            .zip(inputs.iter().map(|b| b.len()))
            .chain(self.outputs.iter().zip(outputs.iter().map(|b| b.len())))
            .find(|(ep, len)| *len < frames * ep.spec.frame_bytes());
        if let Some((ep, len)) = short {
            return Err(PadError::soft(
                ErrorCode::BufferMismatch,
                format!(
                    "endpoint at channel {} needs {} bytes for {} frames, got {}",
                    ep.spec.first_channel,
                    frames * ep.spec.frame_bytes(),
                    frames,
                    len
                ),
            ));
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn exchange_chunk(
        &mut self,
        guard: &PeriodGuard<'_>,
        inputs: &[&[u8]],
        outputs: &mut [&mut [u8]],
        offset: usize,
        n: usize,
        hw_time: Option<i64>,
        report: &mut PeriodReport,
    ) {
        let (t0, xrun) = self.period_clock.begin_period(hw_time, self.clock.as_ref(), n);
        if xrun {
            self.stats.xruns += 1;
            warn!("xrun detected (#{}): hardware timestamp skipped", self.stats.xruns);
        }

        self.capture(inputs, offset, n);
        loop {
            let frames = self.next_turn_frames(n);
            if frames == 0 {
                break;
            }
            self.run_turn(guard, frames, n, t0);
            report.turns += 1;
            report.frames += frames;
        }
        self.playback(outputs, offset, n);
    }

    fn capture(&mut self, inputs: &[&[u8]], offset: usize, n: usize) {
        for (ep, buf) in self.inputs.iter_mut().zip(inputs) {
            let frame_bytes = ep.spec.frame_bytes();
            let channels = ep.spec.channels;
            let staging = &mut ep.staging[..n * channels];
            ep.codec
                .decode(&buf[offset * frame_bytes..(offset + n) * frame_bytes], staging);
            let mut done = 0;
            while done < n {
                let mut region = ep.ring.write(n - done);
                let got = region.frames();
                if got == 0 {
                    break;
                }
                deinterleave(self.plan, &staging[done * channels..], channels, &mut region);
                done += got;
            }
            if done < n {
                self.stats.overflow_frames += (n - done) as u64;
                warn!(
                    "input overflow at channel {}: dropped {} frames",
                    ep.spec.first_channel,
                    n - done
                );
            }
        }
    }

    /// Frames the next callback may process, or 0 to end the period.
    fn next_turn_frames(&self, period: usize) -> usize {
        let readable = self.inputs.iter().map(|e| e.ring.read_available()).min();
        let target = period + self.prefill_frames;
        let room = self
            .outputs
            .iter()
            .map(|e| {
                target
                    .saturating_sub(e.ring.read_available())
                    .min(e.ring.write_available())
            })
            .min();
        let available = match (readable, room) {
            (Some(r), Some(w)) => r.min(w),
            (Some(r), None) => r,
            (None, Some(w)) => w,
            (None, None) => 0,
        };
        if self.block_frames > 0 {
            if available >= self.block_frames {
                self.block_frames
            } else {
                0
            }
        } else {
            available.min(self.scratch_frames)
        }
    }

    fn run_turn(&mut self, guard: &PeriodGuard<'_>, frames: usize, period: usize, t0: i64) {
        let sample_rate = self.config.get_sample_rate();
        let stride = self.scratch_frames;
        let (n_in, n_out) = self.channels;

        let pending = self.inputs.first().map_or(period, |e| e.ring.read_available());
        let queued = self.outputs.first().map_or(0, |e| e.ring.read_available());
        let input_buffer_time =
            t0 + frames_to_micros(period as i64 - pending as i64, sample_rate) - self.input_latency_us;
        let output_buffer_time =
            t0 + frames_to_micros(queued as i64, sample_rate) + self.output_latency_us;

        {
            let mut stream_in = PlanarMut::new(&mut self.scratch_in, n_in, frames, stride);
            for ep in &mut self.inputs {
                let mut done = 0;
                while done < frames {
                    let region = ep.ring.read(frames - done);
                    let got = region.frames();
                    if got == 0 {
                        break;
                    }
                    gather(region, &ep.map, &mut stream_in, done);
                    done += got;
                }
            }
        }

        let mut outputs = PlanarMut::new(&mut self.scratch_out, n_out, frames, stride);
        outputs.fill(0.0);
        let mut io = Io {
            config: &self.config,
            inputs: Planar::new(&self.scratch_in, n_in, frames, stride),
            outputs,
            input_buffer_time,
            output_buffer_time,
        };
        let callback = &mut self.callback;
        guard.in_callback(|| callback.process(&mut io));

        let rendered = Planar::new(&self.scratch_out, n_out, frames, stride);
        for ep in &mut self.outputs {
            let mut done = 0;
            while done < frames {
                let mut region = ep.ring.write(frames - done);
                let got = region.frames();
                if got == 0 {
                    break;
                }
                scatter(rendered, done, &ep.map, &mut region);
                done += got;
            }
        }
        self.stats.turns += 1;
        self.stats.frames += frames as u64;
    }

    fn playback(&mut self, outputs: &mut [&mut [u8]], offset: usize, n: usize) {
        for (ep, buf) in self.outputs.iter_mut().zip(outputs.iter_mut()) {
            let frame_bytes = ep.spec.frame_bytes();
            let channels = ep.spec.channels;
            let staging = &mut ep.staging[..n * channels];
            let mut done = 0;
            while done < n {
                let region = ep.ring.read(n - done);
                let got = region.frames();
                if got == 0 {
                    break;
                }
                interleave(self.plan, region, &mut staging[done * channels..], channels);
                done += got;
            }
            if done < n {
                staging[done * channels..].fill(0.0);
                self.stats.underruns += 1;
                warn!(
                    "output underrun at channel {}: {} frames of silence",
                    ep.spec.first_channel,
                    n - done
                );
            }
            ep.codec
                .encode(staging, &mut buf[offset * frame_bytes..(offset + n) * frame_bytes]);
        }
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        self.control.close();
    }
}
