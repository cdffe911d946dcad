//! Fixed-capacity multichannel FIFO between the hardware side and the
//! callback side of a stream.
//!
//! Cursors run freely and are masked on access, so `write - read` is always
//! the fill level. `write`/`read` hand out one contiguous region at a time;
//! a request that crosses the end of storage comes back short and the
//! caller asks again for the rest.

use super::planar::{Planar, PlanarMut};
use crate::Sample;
use crate::error::{ErrorCode, PadError, Result};

pub type Region<'a> = Planar<'a>;
pub type RegionMut<'a> = PlanarMut<'a>;

#[derive(Debug)]
pub struct RingBuffer {
    storage: Vec<Sample>,
    channels: usize,
    capacity: usize,
    mask: usize,
    read: usize,
    write: usize,
}

impl RingBuffer {
    pub fn new(channels: usize, capacity: usize) -> Result<Self> {
        if channels == 0 {
            return Err(PadError::soft(
                ErrorCode::InvalidBufferSize,
                "ring buffer needs at least one channel",
            ));
        }
        if capacity == 0 || !capacity.is_power_of_two() {
            return Err(PadError::soft(
                ErrorCode::InvalidBufferSize,
                format!("ring capacity {capacity} is not a power of two"),
            ));
        }
        Ok(Self {
            storage: vec![0.0; channels * capacity],
            channels,
            capacity,
            mask: capacity - 1,
            read: 0,
            write: 0,
        })
    }

    /// Rounds `frames` up to the next power of two.
    pub fn with_min_capacity(channels: usize, frames: usize) -> Result<Self> {
        Self::new(channels, frames.max(1).next_power_of_two())
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn read_available(&self) -> usize {
        self.write.wrapping_sub(self.read)
    }

    pub fn write_available(&self) -> usize {
        self.capacity - self.read_available()
    }

    /// Reserve up to `frames` frames for writing and commit them at once.
    pub fn write(&mut self, frames: usize) -> RegionMut<'_> {
        let start = self.write & self.mask;
        let n = frames
            .min(self.write_available())
            .min(self.capacity - start);
        self.write = self.write.wrapping_add(n);
        PlanarMut::new(&mut self.storage[start..], self.channels, n, self.capacity)
    }

    /// Take up to `frames` frames; the region stays valid until the next
    /// mutable call.
    pub fn read(&mut self, frames: usize) -> Region<'_> {
        let start = self.read & self.mask;
        let n = frames
            .min(self.read_available())
            .min(self.capacity - start);
        self.read = self.read.wrapping_add(n);
        Planar::new(&self.storage[start..], self.channels, n, self.capacity)
    }

    /// Copy as much of `src` as fits; returns frames written.
    pub fn push(&mut self, src: Planar<'_>) -> usize {
        debug_assert_eq!(src.channels(), self.channels);
        let mut done = 0;
        while done < src.frames() {
            let mut region = self.write(src.frames() - done);
            let n = region.frames();
            if n == 0 {
                break;
            }
            for ch in 0..region.channels() {
                region
                    .channel_mut(ch)
                    .copy_from_slice(&src.channel(ch)[done..done + n]);
            }
            done += n;
        }
        done
    }

    /// Fill `dst` from the front of the ring; returns frames read.
    pub fn pop(&mut self, dst: &mut PlanarMut<'_>) -> usize {
        debug_assert_eq!(dst.channels(), self.channels);
        let wanted = dst.frames();
        let mut done = 0;
        while done < wanted {
            let region = self.read(wanted - done);
            let n = region.frames();
            if n == 0 {
                break;
            }
            for ch in 0..region.channels() {
                dst.channel_mut(ch)[done..done + n].copy_from_slice(region.channel(ch));
            }
            done += n;
        }
        done
    }

    /// Queue `frames` frames of silence; returns how many fit.
    pub fn fill_silence(&mut self, frames: usize) -> usize {
        let mut done = 0;
        while done < frames {
            let mut region = self.write(frames - done);
            let n = region.frames();
            if n == 0 {
                break;
            }
            region.fill(0.0);
            done += n;
        }
        done
    }

    /// Drop up to `frames` queued frames.
    pub fn skip(&mut self, frames: usize) -> usize {
        let n = frames.min(self.read_available());
        self.read = self.read.wrapping_add(n);
        n
    }

    pub fn clear(&mut self) {
        self.read = 0;
        self.write = 0;
    }
}
