//! Mapping between endpoint channels and dense stream channels.

use super::planar::{Planar, PlanarMut};
use crate::channels::ChannelRangeSet;

/// For each channel of an endpoint covering device channels
/// `first..first + channels`, the stream channel it feeds, if active.
pub fn channel_map(ranges: &ChannelRangeSet, first: usize, channels: usize) -> Vec<Option<usize>> {
    (first..first + channels)
        .map(|device_ch| ranges.stream_index(device_ch))
        .collect()
}

/// Copy mapped endpoint channels from `region` into `stream` at frame
/// `offset`. Stream channels no endpoint maps are left as they are.
pub fn gather(region: Planar<'_>, map: &[Option<usize>], stream: &mut PlanarMut<'_>, offset: usize) {
    let frames = region.frames();
    for (endpoint_ch, target) in map.iter().enumerate() {
        if let Some(stream_ch) = *target {
            stream.channel_mut(stream_ch)[offset..offset + frames]
                .copy_from_slice(region.channel(endpoint_ch));
        }
    }
}

/// Fill `region` from `stream` starting at frame `offset`. Endpoint
/// channels without a stream channel are written as silence.
pub fn scatter(stream: Planar<'_>, offset: usize, map: &[Option<usize>], region: &mut PlanarMut<'_>) {
    let frames = region.frames();
    for (endpoint_ch, source) in map.iter().enumerate() {
        let out = region.channel_mut(endpoint_ch);
        match *source {
            Some(stream_ch) => out.copy_from_slice(&stream.channel(stream_ch)[offset..offset + frames]),
            None => out.fill(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::ChannelRange;

    #[test]
    fn map_skips_inactive_channels() {
        let ranges = ChannelRangeSet::from_ranges([
            ChannelRange::new(1, 2).unwrap(),
            ChannelRange::new(4, 6).unwrap(),
        ]);
        assert_eq!(channel_map(&ranges, 0, 4), vec![None, Some(0), None, None]);
        assert_eq!(channel_map(&ranges, 4, 3), vec![Some(1), Some(2), None]);
    }

    #[test]
    fn scatter_silences_unmapped() {
        let stream = [1.0, 2.0];
        let mut region = [9.0; 4];
        scatter(
            Planar::new(&stream, 1, 2, 2),
            0,
            &[None, Some(0)],
            &mut PlanarMut::new(&mut region, 2, 2, 2),
        );
        assert_eq!(region, [0.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn gather_writes_at_offset() {
        let region = [5.0, 6.0];
        let mut stream = [0.0; 6];
        gather(
            Planar::new(&region, 1, 2, 2),
            &[Some(1)],
            &mut PlanarMut::new(&mut stream, 2, 3, 3),
            1,
        );
        assert_eq!(stream, [0.0, 0.0, 0.0, 0.0, 5.0, 6.0]);
    }
}
