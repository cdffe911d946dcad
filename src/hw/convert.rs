//! Interleave and deinterleave between per-channel blocks and a frame-major
//! buffer.
//!
//! The region is covered with square tiles of the widest width that fits,
//! then the frame and channel remainders fall through to narrower widths.
//! Width 1 is a plain copy. The worklist is a fixed array, so neither
//! direction allocates.

use super::planar::{Planar, PlanarMut};
use super::transpose::{Tile, TransposePlan};
use crate::Sample;

const MAX_REGIONS: usize = 16;

#[derive(Debug, Clone, Copy, Default)]
struct Region {
    channel: usize,
    channels: usize,
    frame: usize,
    frames: usize,
}

#[derive(Clone, Copy)]
struct Worklist {
    items: [Region; MAX_REGIONS],
    len: usize,
}

impl Worklist {
    fn new() -> Self {
        Self {
            items: [Region::default(); MAX_REGIONS],
            len: 0,
        }
    }

    fn push(&mut self, region: Region) {
        if region.channels == 0 || region.frames == 0 {
            return;
        }
        // Each width at most doubles the pending regions and plans hold at
        // most four widths, so eight slots would already do.
        debug_assert!(self.len < MAX_REGIONS);
        self.items[self.len] = region;
        self.len += 1;
    }

    fn as_slice(&self) -> &[Region] {
        &self.items[..self.len]
    }
}

/// Calls `tile(width, channel, frame)` for every tile, covering the
/// `channels` x `frames` region exactly once.
fn for_each_tile(
    plan: TransposePlan,
    channels: usize,
    frames: usize,
    mut tile: impl FnMut(usize, usize, usize),
) {
    let mut pending = Worklist::new();
    pending.push(Region {
        channel: 0,
        channels,
        frame: 0,
        frames,
    });

    for &width in plan.widths() {
        let mut next = Worklist::new();
        for region in pending.as_slice() {
            if width == 1 {
                for ch in region.channel..region.channel + region.channels {
                    for frame in region.frame..region.frame + region.frames {
                        tile(1, ch, frame);
                    }
                }
                continue;
            }

            let full_channels = region.channels / width * width;
            let full_frames = region.frames / width * width;
            for ch in (0..full_channels).step_by(width) {
                for frame in (0..full_frames).step_by(width) {
                    tile(width, region.channel + ch, region.frame + frame);
                }
            }
            if full_channels > 0 {
                next.push(Region {
                    channel: region.channel,
                    channels: full_channels,
                    frame: region.frame + full_frames,
                    frames: region.frames - full_frames,
                });
            }
            next.push(Region {
                channel: region.channel + full_channels,
                channels: region.channels - full_channels,
                frame: region.frame,
                frames: region.frames,
            });
        }
        pending = next;
    }
}

#[inline]
fn interleave_tile<T: Tile>(src: &Planar<'_>, dst: &mut [Sample], stride: usize, ch0: usize, f0: usize) {
    let w = T::WIDTH;
    let mut tile = T::ZERO;
    for i in 0..w {
        tile.row_mut(i).copy_from_slice(&src.channel(ch0 + i)[f0..f0 + w]);
    }
    tile.transpose();
    for j in 0..w {
        let at = (f0 + j) * stride + ch0;
        dst[at..at + w].copy_from_slice(tile.row(j));
    }
}

#[inline]
fn deinterleave_tile<T: Tile>(src: &[Sample], stride: usize, dst: &mut PlanarMut<'_>, ch0: usize, f0: usize) {
    let w = T::WIDTH;
    let mut tile = T::ZERO;
    for j in 0..w {
        let at = (f0 + j) * stride + ch0;
        tile.row_mut(j).copy_from_slice(&src[at..at + w]);
    }
    tile.transpose();
    for i in 0..w {
        dst.channel_mut(ch0 + i)[f0..f0 + w].copy_from_slice(tile.row(i));
    }
}

fn check_interleaved(len: usize, channels: usize, frames: usize, stride: usize) {
    assert!(stride >= channels, "frame stride {stride} below channel count {channels}");
    if channels > 0 && frames > 0 {
        let needed = (frames - 1) * stride + channels;
        assert!(len >= needed, "interleaved buffer needs {needed} samples, got {len}");
    }
}

/// Write `src` into `dst` frame-major: sample (ch, f) lands at
/// `dst[f * stride + ch]`. Slots between `channels` and `stride` are left
/// untouched.
pub fn interleave(plan: TransposePlan, src: Planar<'_>, dst: &mut [Sample], stride: usize) {
    let (channels, frames) = (src.channels(), src.frames());
    check_interleaved(dst.len(), channels, frames, stride);
    for_each_tile(plan, channels, frames, |width, ch, frame| match width {
        8 => interleave_tile::<[[Sample; 8]; 8]>(&src, dst, stride, ch, frame),
        4 => interleave_tile::<[[Sample; 4]; 4]>(&src, dst, stride, ch, frame),
        2 => interleave_tile::<[[Sample; 2]; 2]>(&src, dst, stride, ch, frame),
        _ => dst[frame * stride + ch] = src.channel(ch)[frame],
    });
}

/// Inverse of [`interleave`]; reads `dst.channels()` x `dst.frames()`.
pub fn deinterleave(plan: TransposePlan, src: &[Sample], stride: usize, dst: &mut PlanarMut<'_>) {
    let (channels, frames) = (dst.channels(), dst.frames());
    check_interleaved(src.len(), channels, frames, stride);
    for_each_tile(plan, channels, frames, |width, ch, frame| match width {
        8 => deinterleave_tile::<[[Sample; 8]; 8]>(src, stride, dst, ch, frame),
        4 => deinterleave_tile::<[[Sample; 4]; 4]>(src, stride, dst, ch, frame),
        2 => deinterleave_tile::<[[Sample; 2]; 2]>(src, stride, dst, ch, frame),
        _ => dst.channel_mut(ch)[frame] = src[frame * stride + ch],
    });
}
