/// Silence queued on the output side before the first callback runs.
pub fn playback_prefill_frames(block_frames: usize, nperiods: usize, sync_mode: bool) -> usize {
    let mut prefill = nperiods.max(1).saturating_mul(block_frames);
    if !sync_mode {
        prefill = prefill.saturating_add(block_frames);
    }
    prefill
}

/// `(input, output)` latency in frames as reported to the application.
///
/// Input samples reach the callback as soon as a whole block is captured, so
/// only the device's own latency counts on that side. The output side adds
/// the prefill, which is the whole input-to-output delay of the exchange.
pub fn latency_ranges(
    block_frames: usize,
    nperiods: usize,
    sync_mode: bool,
    input_latency_frames: usize,
    output_latency_frames: usize,
) -> (usize, usize) {
    let input = input_latency_frames;
    let output = playback_prefill_frames(block_frames, nperiods, sync_mode) + output_latency_frames;
    (input, output)
}

pub fn frames_to_micros(frames: i64, sample_rate: f64) -> i64 {
    if sample_rate <= 0.0 {
        return 0;
    }
    (frames as f64 * 1_000_000.0 / sample_rate).round() as i64
}

pub fn micros_to_frames(micros: i64, sample_rate: f64) -> i64 {
    (micros as f64 * sample_rate / 1_000_000.0).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn async_mode_adds_a_block() {
        assert_eq!(playback_prefill_frames(256, 1, true), 256);
        assert_eq!(playback_prefill_frames(256, 2, false), 768);
        assert_eq!(playback_prefill_frames(128, 0, true), 128);
    }

    #[test]
    fn latency_includes_device_reports() {
        assert_eq!(latency_ranges(256, 1, true, 32, 64), (32, 320));
        assert_eq!(latency_ranges(64, 2, false, 0, 0), (0, 192));
    }

    #[test]
    fn micros_round_trip_at_common_rates() {
        assert_eq!(frames_to_micros(48_000, 48_000.0), 1_000_000);
        assert_eq!(micros_to_frames(frames_to_micros(256, 48_000.0), 48_000.0), 256);
        assert_eq!(micros_to_frames(frames_to_micros(441, 44_100.0), 44_100.0), 441);
    }
}
