use crate::channels::{ChannelRange, ChannelRangeSet};
use crate::error::{ErrorCode, PadError, Result};
use serde::{Deserialize, Serialize};

/// What the application asks a device for.
///
/// Treated as an immutable value: every builder call returns a modified copy,
/// so a base configuration can be shared and specialised per stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioStreamConfiguration {
    sample_rate: f64,
    input_ranges: ChannelRangeSet,
    output_ranges: ChannelRangeSet,
    buffer_size_frames: usize,
    start_suspended: bool,
    valid: bool,
    #[serde(skip)]
    channel_overflow: bool,
}

#[derive(Clone, Copy)]
enum Side {
    Input,
    Output,
}

fn stereo_pair(index: usize) -> Result<ChannelRange> {
    let begin = index.checked_mul(2).ok_or_else(|| {
        PadError::soft(
            ErrorCode::ChannelRangeInvalid,
            format!("stereo pair {index} is out of range"),
        )
    })?;
    ChannelRange::starting_at(begin, 2)
}

impl Default for AudioStreamConfiguration {
    fn default() -> Self {
        Self::new(44_100.0)
    }
}

impl AudioStreamConfiguration {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            input_ranges: ChannelRangeSet::new(),
            output_ranges: ChannelRangeSet::new(),
            buffer_size_frames: 0,
            start_suspended: false,
            valid: true,
            channel_overflow: false,
        }
    }

    pub fn sample_rate(&self, sample_rate: f64) -> Self {
        let mut c = self.clone();
        c.sample_rate = sample_rate;
        c
    }

    /// A channel index that overflows poisons the configuration;
    /// `validate` then reports `ChannelRangeInvalid`.
    pub fn input(&self, channel: usize) -> Self {
        self.with_range(Side::Input, ChannelRange::single(channel))
    }

    pub fn output(&self, channel: usize) -> Self {
        self.with_range(Side::Output, ChannelRange::single(channel))
    }

    /// Channels `2 * index` and `2 * index + 1`.
    pub fn stereo_input(&self, index: usize) -> Self {
        self.with_range(Side::Input, stereo_pair(index))
    }

    pub fn stereo_output(&self, index: usize) -> Self {
        self.with_range(Side::Output, stereo_pair(index))
    }

    fn with_range(&self, side: Side, range: Result<ChannelRange>) -> Self {
        let mut c = self.clone();
        match (range, side) {
            (Ok(range), Side::Input) => c.input_ranges.add(range),
            (Ok(range), Side::Output) => c.output_ranges.add(range),
            (Err(_), _) => c.channel_overflow = true,
        }
        c
    }

    pub fn inputs(&self, begin: usize, end: usize) -> Result<Self> {
        let mut c = self.clone();
        c.input_ranges.add_range(begin, end)?;
        Ok(c)
    }

    pub fn outputs(&self, begin: usize, end: usize) -> Result<Self> {
        let mut c = self.clone();
        c.output_ranges.add_range(begin, end)?;
        Ok(c)
    }

    pub fn with_input_ranges(&self, ranges: ChannelRangeSet) -> Self {
        let mut c = self.clone();
        c.input_ranges = ranges;
        c.input_ranges.normalize();
        c
    }

    pub fn with_output_ranges(&self, ranges: ChannelRangeSet) -> Self {
        let mut c = self.clone();
        c.output_ranges = ranges;
        c.output_ranges.normalize();
        c
    }

    /// `0` lets the block size follow the hardware period.
    pub fn buffer_size(&self, frames: usize) -> Self {
        let mut c = self.clone();
        c.buffer_size_frames = frames;
        c
    }

    pub fn start_suspended(&self, suspended: bool) -> Self {
        let mut c = self.clone();
        c.start_suspended = suspended;
        c
    }

    pub fn invalidate(&self) -> Self {
        let mut c = self.clone();
        c.valid = false;
        c
    }

    pub fn get_sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn input_ranges(&self) -> &ChannelRangeSet {
        &self.input_ranges
    }

    pub fn output_ranges(&self) -> &ChannelRangeSet {
        &self.output_ranges
    }

    pub fn buffer_size_frames(&self) -> usize {
        self.buffer_size_frames
    }

    pub fn is_start_suspended(&self) -> bool {
        self.start_suspended
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn num_stream_inputs(&self) -> usize {
        self.input_ranges.count_active_channels()
    }

    pub fn num_stream_outputs(&self) -> usize {
        self.output_ranges.count_active_channels()
    }

    pub fn num_device_inputs(&self) -> usize {
        self.input_ranges.device_channel_count()
    }

    pub fn num_device_outputs(&self) -> usize {
        self.output_ranges.device_channel_count()
    }

    pub fn is_input_active(&self, channel: usize) -> bool {
        self.input_ranges.is_active(channel)
    }

    pub fn is_output_active(&self, channel: usize) -> bool {
        self.output_ranges.is_active(channel)
    }

    /// Clip both range sets to what the hardware actually exposes.
    pub fn set_device_channel_limits(&mut self, inputs: usize, outputs: usize) {
        self.input_ranges.clip(inputs);
        self.output_ranges.clip(outputs);
    }

    pub fn validate(&self) -> Result<()> {
        if !self.valid {
            return Err(PadError::soft(
                ErrorCode::InvalidState,
                "configuration was invalidated",
            ));
        }
        if self.channel_overflow {
            return Err(PadError::soft(
                ErrorCode::ChannelRangeInvalid,
                "a requested channel index overflows",
            ));
        }
        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            return Err(PadError::soft(
                ErrorCode::UnsupportedSampleRate,
                format!("sample rate {} is not usable", self.sample_rate),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_leave_original_untouched() {
        let base = AudioStreamConfiguration::new(48_000.0);
        let stereo = base.stereo_input(0).stereo_output(1);
        assert_eq!(base.num_stream_inputs(), 0);
        assert_eq!(stereo.num_stream_inputs(), 2);
        assert_eq!(stereo.num_stream_outputs(), 2);
        assert_eq!(stereo.num_device_outputs(), 4);
        assert!(stereo.is_output_active(3));
        assert!(!stereo.is_output_active(1));
    }

    #[test]
    fn stream_and_device_counts_differ_with_gaps() {
        let c = AudioStreamConfiguration::new(44_100.0)
            .inputs(0, 2)
            .unwrap()
            .inputs(5, 7)
            .unwrap();
        assert_eq!(c.num_stream_inputs(), 4);
        assert_eq!(c.num_device_inputs(), 7);
    }

    #[test]
    fn invalid_range_is_soft_error() {
        let err = AudioStreamConfiguration::new(44_100.0)
            .outputs(4, 4)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ChannelRangeInvalid);
        assert!(!err.is_hard());
    }

    #[test]
    fn device_limits_clip_ranges() {
        let mut c = AudioStreamConfiguration::new(48_000.0)
            .stereo_input(0)
            .stereo_input(2)
            .stereo_output(0);
        c.set_device_channel_limits(2, 1);
        assert_eq!(c.num_stream_inputs(), 2);
        assert_eq!(c.num_stream_outputs(), 1);
        assert_eq!(c.num_device_inputs(), 2);
    }

    #[test]
    fn overflowing_channel_indices_fail_validation() {
        let base = AudioStreamConfiguration::new(48_000.0);
        for c in [
            base.input(usize::MAX),
            base.output(usize::MAX),
            base.stereo_input(usize::MAX / 2),
            base.stereo_output(usize::MAX),
        ] {
            let err = c.validate().unwrap_err();
            assert_eq!(err.code, ErrorCode::ChannelRangeInvalid);
            assert!(!err.is_hard());
        }
        let top = base.stereo_input(usize::MAX / 2 - 1);
        assert!(top.validate().is_ok());
        assert_eq!(top.input_ranges().ranges()[0].len(), 2);
    }

    #[test]
    fn validate_rejects_bad_rate_and_invalidated() {
        assert!(AudioStreamConfiguration::new(0.0).validate().is_err());
        let err = AudioStreamConfiguration::new(48_000.0)
            .invalidate()
            .validate()
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidState);
        assert!(AudioStreamConfiguration::new(48_000.0).validate().is_ok());
    }

    #[test]
    fn deserializes_from_toml() {
        let c: AudioStreamConfiguration = toml::from_str(
            r#"
            sample_rate = 96000.0
            input_ranges = [[2, 4], [0, 2]]
            output_ranges = [[0, 1]]
            buffer_size_frames = 128
            "#,
        )
        .unwrap();
        assert_eq!(c.get_sample_rate(), 96_000.0);
        assert_eq!(c.input_ranges().ranges().len(), 1);
        assert_eq!(c.num_stream_inputs(), 4);
        assert_eq!(c.buffer_size_frames(), 128);
        assert!(c.is_valid());
    }
}
