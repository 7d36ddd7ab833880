//! One physical temperature probe: spike rejection, smoothing and
//! stuck-value detection.
//!
//! Each raw sample goes through a 3-slot median (kills single-sample
//! spikes from the one-wire bus) and then an exponential moving average.
//! The median is handed back to callers that need a low-lag signal; the
//! EMA is the control temperature.

const RING_LEN: usize = 3;

/// Median of three values without branching on the data.
#[inline]
pub fn median3(a: f32, b: f32, c: f32) -> f32 {
    a.min(b).max(a.max(b).min(c))
}

#[derive(Debug, Clone, Copy)]
struct StuckReference {
    value: f32,
    since_secs: u64,
}

/// Flags a probe whose value has not moved for longer than plausible.
#[derive(Debug, Clone, Default)]
pub struct StuckDetector {
    reference: Option<StuckReference>,
}

impl StuckDetector {
    /// Returns `true` once `value` has stayed within `epsilon` of the
    /// reference for more than `timeout_secs`.
    pub fn check(&mut self, value: f32, now: u64, epsilon: f32, timeout_secs: u32) -> bool {
        match self.reference {
            Some(r) if (value - r.value).abs() <= epsilon => {
                now.saturating_sub(r.since_secs) > u64::from(timeout_secs)
            }
            _ => {
                self.reference = Some(StuckReference {
                    value,
                    since_secs: now,
                });
                false
            }
        }
    }

    pub fn clear(&mut self) {
        self.reference = None;
    }
}

/// Smoothing state for a single probe.
#[derive(Debug, Clone)]
pub struct SensorChannel {
    ring: [f32; RING_LEN],
    head: usize,
    smoothed: Option<f32>,
    stuck: StuckDetector,
}

impl Default for SensorChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorChannel {
    pub fn new() -> Self {
        Self {
            ring: [0.0; RING_LEN],
            head: 0,
            smoothed: None,
            stuck: StuckDetector::default(),
        }
    }

    /// Feed one valid sample. Returns the 3-sample median.
    ///
    /// The first sample after construction or [`reseed`](Self::reseed)
    /// fills the ring and the EMA directly so there is no start-up ramp.
    pub fn push(&mut self, raw: f32, alpha: f32) -> f32 {
        let Some(prev) = self.smoothed else {
            self.ring = [raw; RING_LEN];
            self.head = 0;
            self.smoothed = Some(raw);
            return raw;
        };

        self.ring[self.head] = raw;
        self.head = (self.head + 1) % RING_LEN;

        let median = median3(self.ring[0], self.ring[1], self.ring[2]);
        self.smoothed = Some(alpha * median + (1.0 - alpha) * prev);
        median
    }

    /// EMA output, `None` until the first valid sample.
    pub fn smoothed(&self) -> Option<f32> {
        self.smoothed
    }

    pub fn is_warm(&self) -> bool {
        self.smoothed.is_some()
    }

    /// Run the stuck detector on a raw sample.
    pub fn check_stuck(&mut self, raw: f32, now: u64, epsilon: f32, timeout_secs: u32) -> bool {
        self.stuck.check(raw, now, epsilon, timeout_secs)
    }

    /// Forget all history; the next sample seeds the channel again.
    pub fn reseed(&mut self) {
        self.smoothed = None;
        self.stuck.clear();
    }

    #[cfg(test)]
    fn ring(&self) -> [f32; RING_LEN] {
        self.ring
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median3_picks_middle_value() {
        assert_eq!(median3(1.0, 3.0, 2.0), 2.0);
        assert_eq!(median3(3.0, 1.0, 0.0), 1.0);
        assert_eq!(median3(5.0, 5.0, 1.0), 5.0);
        assert_eq!(median3(-4.0, 9.0, 9.0), 9.0);
        assert_eq!(median3(2.0, 2.0, 2.0), 2.0);
    }

    #[test]
    fn first_sample_seeds_ring_and_ema() {
        let mut ch = SensorChannel::new();
        assert!(!ch.is_warm());
        let m = ch.push(6.5, 0.3);
        assert_eq!(m, 6.5);
        assert_eq!(ch.smoothed(), Some(6.5));
        assert_eq!(ch.ring(), [6.5; 3]);
    }

    #[test]
    fn single_spike_is_rejected_by_median() {
        let mut ch = SensorChannel::new();
        ch.push(4.0, 0.5);
        let m = ch.push(40.0, 0.5);
        assert_eq!(m, 4.0);
        assert_eq!(ch.smoothed(), Some(4.0));
    }

    #[test]
    fn ema_moves_toward_median() {
        let mut ch = SensorChannel::new();
        ch.push(4.0, 0.5);
        ch.push(6.0, 0.5);
        let m = ch.push(6.0, 0.5);
        assert_eq!(m, 6.0);
        // first push after seed: median 4 -> ema 4; second: median 6 -> 5
        assert!((ch.smoothed().unwrap() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn reseed_restarts_from_next_sample() {
        let mut ch = SensorChannel::new();
        ch.push(4.0, 0.3);
        ch.push(5.0, 0.3);
        ch.reseed();
        ch.push(-2.0, 0.3);
        assert_eq!(ch.smoothed(), Some(-2.0));
        assert_eq!(ch.ring(), [-2.0; 3]);
    }

    #[test]
    fn stuck_detector_trips_after_timeout() {
        let mut d = StuckDetector::default();
        assert!(!d.check(4.0, 0, 0.05, 100));
        assert!(!d.check(4.01, 50, 0.05, 100));
        assert!(!d.check(4.02, 100, 0.05, 100));
        assert!(d.check(4.0, 101, 0.05, 100));
    }

    #[test]
    fn stuck_detector_resets_on_movement() {
        let mut d = StuckDetector::default();
        d.check(4.0, 0, 0.05, 100);
        assert!(!d.check(4.5, 90, 0.05, 100));
        assert!(!d.check(4.5, 150, 0.05, 100));
        assert!(d.check(4.5, 191, 0.05, 100));
    }
}
