//! Channel-range algebra.
//!
//! A [`ChannelRange`] is a half-open interval of device channel indices. A
//! [`ChannelRangeSet`] keeps a list of them in canonical form: sorted by
//! `begin`, pairwise disjoint and never touching. Overlapping or adjacent
//! ranges are merged on insertion rather than rejected.

use crate::error::{ErrorCode, PadError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "(usize, usize)", into = "(usize, usize)")]
pub struct ChannelRange {
    begin: usize,
    end: usize,
}

impl ChannelRange {
    pub fn new(begin: usize, end: usize) -> Result<Self> {
        if end <= begin {
            return Err(PadError::soft(
                ErrorCode::ChannelRangeInvalid,
                format!("channel range [{begin}, {end}) is empty"),
            ));
        }
        Ok(Self { begin, end })
    }

    pub fn single(channel: usize) -> Result<Self> {
        Self::starting_at(channel, 1)
    }

    /// `len` channels from `begin`, failing when the end would overflow.
    pub fn starting_at(begin: usize, len: usize) -> Result<Self> {
        let end = begin.checked_add(len).ok_or_else(|| {
            PadError::soft(
                ErrorCode::ChannelRangeInvalid,
                format!("channel range of {len} at {begin} overflows"),
            )
        })?;
        Self::new(begin, end)
    }

    pub fn begin(&self) -> usize {
        self.begin
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.begin
    }

    pub fn contains(&self, channel: usize) -> bool {
        channel >= self.begin && channel < self.end
    }

    /// Adjacent ranges touch, so `[0,2)` and `[2,4)` merge into `[0,4)`.
    pub fn touches(&self, other: &ChannelRange) -> bool {
        self.begin <= other.end && self.end >= other.begin
    }

    fn union(&self, other: &ChannelRange) -> ChannelRange {
        ChannelRange {
            begin: self.begin.min(other.begin),
            end: self.end.max(other.end),
        }
    }

    fn clipped(&self, limit: usize) -> Option<ChannelRange> {
        let end = self.end.min(limit);
        (end > self.begin).then_some(ChannelRange {
            begin: self.begin,
            end,
        })
    }
}

impl TryFrom<(usize, usize)> for ChannelRange {
    type Error = PadError;

    fn try_from((begin, end): (usize, usize)) -> Result<Self> {
        ChannelRange::new(begin, end)
    }
}

impl From<ChannelRange> for (usize, usize) {
    fn from(range: ChannelRange) -> Self {
        (range.begin, range.end)
    }
}

/// Where a channel index falls relative to a normalized set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Inside,
    Below,
    Between,
    Above,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<ChannelRange>", into = "Vec<ChannelRange>")]
pub struct ChannelRangeSet {
    ranges: Vec<ChannelRange>,
}

impl ChannelRangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ranges(ranges: impl IntoIterator<Item = ChannelRange>) -> Self {
        let mut set = Self {
            ranges: ranges.into_iter().collect(),
        };
        set.normalize();
        set
    }

    pub fn add_range(&mut self, begin: usize, end: usize) -> Result<()> {
        let range = ChannelRange::new(begin, end)?;
        self.add(range);
        Ok(())
    }

    pub fn add(&mut self, range: ChannelRange) {
        self.ranges.push(range);
        self.normalize();
    }

    pub fn set_ranges(&mut self, ranges: impl IntoIterator<Item = ChannelRange>) {
        self.ranges = ranges.into_iter().collect();
        self.normalize();
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    pub fn ranges(&self) -> &[ChannelRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Sort by `begin` (broader ranges first on ties) and merge touching
    /// neighbours until nothing changes.
    pub fn normalize(&mut self) {
        self.ranges
            .sort_by(|a, b| a.begin.cmp(&b.begin).then(b.end.cmp(&a.end)));
        loop {
            let mut merged = false;
            let mut i = 0;
            while i + 1 < self.ranges.len() {
                if self.ranges[i].touches(&self.ranges[i + 1]) {
                    self.ranges[i] = self.ranges[i].union(&self.ranges[i + 1]);
                    self.ranges.remove(i + 1);
                    merged = true;
                } else {
                    i += 1;
                }
            }
            if !merged {
                break;
            }
        }
    }

    pub fn classify(&self, channel: usize) -> Placement {
        let mut placement = Placement::Below;
        for range in &self.ranges {
            if range.contains(channel) {
                return Placement::Inside;
            }
            if channel < range.begin {
                return placement;
            }
            placement = Placement::Between;
        }
        if self.ranges.is_empty() {
            Placement::Below
        } else {
            Placement::Above
        }
    }

    pub fn is_active(&self, channel: usize) -> bool {
        self.classify(channel) == Placement::Inside
    }

    /// Counts covered indices, so gaps between ranges do not count.
    pub fn count_active_channels(&self) -> usize {
        if self.ranges.is_empty() {
            return 0;
        }
        let mut count = 0;
        let mut channel = 0;
        loop {
            match self.classify(channel) {
                Placement::Inside => count += 1,
                Placement::Above => break,
                Placement::Below | Placement::Between => {}
            }
            channel += 1;
        }
        count
    }

    /// Device channel count implied by the addressing (largest `end`).
    pub fn device_channel_count(&self) -> usize {
        self.ranges.iter().map(|r| r.end).max().unwrap_or(0)
    }

    /// Position of `channel` among the active channels, if it is active.
    pub fn stream_index(&self, channel: usize) -> Option<usize> {
        let mut before = 0;
        for range in &self.ranges {
            if range.contains(channel) {
                return Some(before + channel - range.begin);
            }
            if channel < range.begin {
                return None;
            }
            before += range.len();
        }
        None
    }

    pub fn active_channels(&self) -> impl Iterator<Item = usize> + '_ {
        self.ranges.iter().flat_map(|r| r.begin..r.end)
    }

    pub fn clip(&mut self, limit: usize) {
        self.ranges = self.ranges.iter().filter_map(|r| r.clipped(limit)).collect();
    }
}

impl From<Vec<ChannelRange>> for ChannelRangeSet {
    fn from(ranges: Vec<ChannelRange>) -> Self {
        ChannelRangeSet::from_ranges(ranges)
    }
}

impl From<ChannelRangeSet> for Vec<ChannelRange> {
    fn from(set: ChannelRangeSet) -> Self {
        set.ranges
    }
}

pub fn normalize(set: &mut ChannelRangeSet) {
    set.normalize();
}

pub fn count_active_channels(set: &ChannelRangeSet) -> usize {
    set.count_active_channels()
}

pub fn is_active(set: &ChannelRangeSet, channel: usize) -> bool {
    set.is_active(channel)
}
