//! Per-channel block views over a single backing slice.
//!
//! Channel `c` occupies `data[c * channel_stride..][..frames]`. Scratch
//! buffers use `channel_stride == frames`; ring buffer regions use the ring
//! capacity as stride so one slice covers every channel of an endpoint.

use crate::Sample;

fn required_len(channels: usize, frames: usize, channel_stride: usize) -> usize {
    if channels == 0 {
        0
    } else {
        (channels - 1) * channel_stride + frames
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Planar<'a> {
    data: &'a [Sample],
    channels: usize,
    frames: usize,
    channel_stride: usize,
}

impl<'a> Planar<'a> {
    pub fn new(data: &'a [Sample], channels: usize, frames: usize, channel_stride: usize) -> Self {
        assert!(frames <= channel_stride || channels <= 1, "channel blocks overlap");
        assert!(
            data.len() >= required_len(channels, frames, channel_stride),
            "planar view needs {} samples, got {}",
            required_len(channels, frames, channel_stride),
            data.len()
        );
        Self {
            data,
            channels,
            frames,
            channel_stride,
        }
    }

    pub fn mono(data: &'a [Sample]) -> Self {
        Self::new(data, 1, data.len(), data.len())
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.frames == 0 || self.channels == 0
    }

    pub fn channel(&self, channel: usize) -> &'a [Sample] {
        let start = channel * self.channel_stride;
        &self.data[start..start + self.frames]
    }

    /// Sub-view of `frames` frames starting at `offset`.
    pub fn slice(&self, offset: usize, frames: usize) -> Planar<'a> {
        assert!(offset + frames <= self.frames);
        let data = if self.channels == 0 {
            self.data
        } else {
            &self.data[offset..]
        };
        Planar {
            data,
            channels: self.channels,
            frames,
            channel_stride: self.channel_stride,
        }
    }
}

#[derive(Debug)]
pub struct PlanarMut<'a> {
    data: &'a mut [Sample],
    channels: usize,
    frames: usize,
    channel_stride: usize,
}

impl<'a> PlanarMut<'a> {
    pub fn new(data: &'a mut [Sample], channels: usize, frames: usize, channel_stride: usize) -> Self {
        assert!(frames <= channel_stride || channels <= 1, "channel blocks overlap");
        assert!(
            data.len() >= required_len(channels, frames, channel_stride),
            "planar view needs {} samples, got {}",
            required_len(channels, frames, channel_stride),
            data.len()
        );
        Self {
            data,
            channels,
            frames,
            channel_stride,
        }
    }

    pub fn mono(data: &'a mut [Sample]) -> Self {
        let len = data.len();
        Self::new(data, 1, len, len)
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.frames == 0 || self.channels == 0
    }

    pub fn channel(&self, channel: usize) -> &[Sample] {
        let start = channel * self.channel_stride;
        &self.data[start..start + self.frames]
    }

    pub fn channel_mut(&mut self, channel: usize) -> &mut [Sample] {
        let start = channel * self.channel_stride;
        &mut self.data[start..start + self.frames]
    }

    pub fn as_planar(&self) -> Planar<'_> {
        Planar {
            data: self.data,
            channels: self.channels,
            frames: self.frames,
            channel_stride: self.channel_stride,
        }
    }

    pub fn slice_mut(&mut self, offset: usize, frames: usize) -> PlanarMut<'_> {
        assert!(offset + frames <= self.frames);
        let data: &mut [Sample] = if self.channels == 0 {
            &mut self.data[..]
        } else {
            &mut self.data[offset..]
        };
        PlanarMut {
            data,
            channels: self.channels,
            frames,
            channel_stride: self.channel_stride,
        }
    }

    pub fn fill(&mut self, value: Sample) {
        for ch in 0..self.channels {
            self.channel_mut(ch).fill(value);
        }
    }
}
