use super::latency::frames_to_micros;
use super::traits::DeviceClock;
use std::time::Instant;

/// Microseconds since construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceClock for MonotonicClock {
    fn now_micros(&self) -> Option<i64> {
        i64::try_from(self.origin.elapsed().as_micros()).ok()
    }
}

/// A clock that never answers; period times are then extrapolated from the
/// frame count alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoClock;

impl DeviceClock for NoClock {
    fn now_micros(&self) -> Option<i64> {
        None
    }
}

/// Tracks hardware period timestamps and flags gaps.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PeriodClock {
    sample_rate: f64,
    last_hw: Option<(i64, usize)>,
    frames_seen: i64,
}

impl PeriodClock {
    pub(crate) fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            last_hw: None,
            frames_seen: 0,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.last_hw = None;
    }

    /// Start time of a period of `frames` frames. Returns the time and
    /// whether the hardware timestamp jumped by more than two periods.
    pub(crate) fn begin_period(
        &mut self,
        hw_time: Option<i64>,
        clock: &dyn DeviceClock,
        frames: usize,
    ) -> (i64, bool) {
        let mut xrun = false;
        let start = match hw_time {
            Some(t) => {
                if let Some((last_t, last_frames)) = self.last_hw {
                    let period = frames_to_micros(last_frames as i64, self.sample_rate);
                    xrun = period > 0 && t.saturating_sub(last_t) > period * 2;
                }
                self.last_hw = Some((t, frames));
                t
            }
            None => clock
                .now_micros()
                .unwrap_or_else(|| frames_to_micros(self.frames_seen, self.sample_rate)),
        };
        self.frames_seen += frames as i64;
        (start, xrun)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extrapolates_without_any_clock() {
        let mut pc = PeriodClock::new(48_000.0);
        assert_eq!(pc.begin_period(None, &NoClock, 480).0, 0);
        assert_eq!(pc.begin_period(None, &NoClock, 480).0, 10_000);
    }

    #[test]
    fn flags_gap_longer_than_two_periods() {
        let mut pc = PeriodClock::new(48_000.0);
        assert!(!pc.begin_period(Some(1_000), &NoClock, 480).1);
        assert!(!pc.begin_period(Some(11_000), &NoClock, 480).1);
        assert!(!pc.begin_period(Some(31_000), &NoClock, 480).1);
        assert!(pc.begin_period(Some(61_000), &NoClock, 480).1);
        pc.reset();
        assert!(!pc.begin_period(Some(500_000), &NoClock, 480).1);
    }

    #[test]
    fn monotonic_clock_moves_forward() {
        let clock = MonotonicClock::new();
        let a = clock.now_micros().unwrap();
        let b = clock.now_micros().unwrap();
        assert!(b >= a);
    }
}
