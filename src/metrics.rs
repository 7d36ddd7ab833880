//! Runtime metrics and the hourly rollover.
//!
//! Every tick adds its length to the running totals; an hour closes once
//! `hour_total_secs` reaches 3600. The closed hour's duty percentage goes
//! into a 24-slot ring and its cycle statistics feed the adaptive
//! hysteresis controller.
//!
//! Time keeps accumulating while a sensor alarm is active. Such an hour
//! is marked `degraded` so its cycle statistics are not used for tuning.

use serde::{Deserialize, Serialize};

use crate::control::hysteresis::CycleStats;

pub const SECS_PER_HOUR: u32 = 3600;
pub const DUTY_SLOTS: usize = 24;

/// One closed hour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HourSummary {
    pub total_secs: u32,
    pub run_secs: u32,
    pub cycles: u16,
    pub duty_pct: u8,
    /// A sensor alarm was active during part of the hour.
    pub degraded: bool,
}

impl HourSummary {
    /// Average on/off times per cycle. `None` for an hour without cycles.
    pub fn cycle_stats(&self) -> Option<CycleStats> {
        if self.cycles == 0 {
            return None;
        }
        let n = f32::from(self.cycles);
        Some(CycleStats {
            avg_on_secs: self.run_secs as f32 / n,
            avg_off_secs: self.total_secs.saturating_sub(self.run_secs) as f32 / n,
            cycles: self.cycles,
        })
    }
}

/// Durable runtime counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsAccumulator {
    pub lifetime_total_secs: u64,
    pub lifetime_run_secs: u64,
    pub lifetime_cycles: u32,
    hour_total_secs: u32,
    hour_run_secs: u32,
    hour_cycles: u16,
    duty_ring: [u8; DUTY_SLOTS],
    duty_index: u8,
    #[serde(skip)]
    hour_degraded: bool,
}

impl MetricsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account one tick. Returns the closed hour when this tick completes it.
    pub fn record_tick(&mut self, secs: u32, relay_on: bool, degraded: bool) -> Option<HourSummary> {
        self.lifetime_total_secs += u64::from(secs);
        self.hour_total_secs = self.hour_total_secs.saturating_add(secs);
        if relay_on {
            self.lifetime_run_secs += u64::from(secs);
            self.hour_run_secs = self.hour_run_secs.saturating_add(secs);
        }
        self.hour_degraded |= degraded;

        if self.hour_total_secs >= SECS_PER_HOUR {
            Some(self.rollover())
        } else {
            None
        }
    }

    /// Count one completed compressor cycle (ON→OFF).
    pub fn record_cycle(&mut self) {
        self.hour_cycles = self.hour_cycles.saturating_add(1);
        self.lifetime_cycles = self.lifetime_cycles.saturating_add(1);
    }

    pub fn hour_total_secs(&self) -> u32 {
        self.hour_total_secs
    }

    pub fn hour_run_secs(&self) -> u32 {
        self.hour_run_secs
    }

    pub fn hour_cycles(&self) -> u16 {
        self.hour_cycles
    }

    pub fn duty_index(&self) -> usize {
        usize::from(self.duty_index)
    }

    /// Duty percentages, oldest first.
    pub fn duty_history(&self) -> impl Iterator<Item = u8> + '_ {
        let start = self.duty_index();
        (0..DUTY_SLOTS).map(move |i| self.duty_ring[(start + i) % DUTY_SLOTS])
    }

    /// Lifetime duty cycle in percent.
    pub fn lifetime_duty_pct(&self) -> f32 {
        if self.lifetime_total_secs == 0 {
            0.0
        } else {
            self.lifetime_run_secs as f32 * 100.0 / self.lifetime_total_secs as f32
        }
    }

    fn rollover(&mut self) -> HourSummary {
        let duty_pct = duty_percent(self.hour_run_secs, self.hour_total_secs);
        let summary = HourSummary {
            total_secs: self.hour_total_secs,
            run_secs: self.hour_run_secs,
            cycles: self.hour_cycles,
            duty_pct,
            degraded: self.hour_degraded,
        };

        let idx = self.duty_index() % DUTY_SLOTS;
        self.duty_ring[idx] = duty_pct;
        self.duty_index = ((idx + 1) % DUTY_SLOTS) as u8;

        self.hour_total_secs = 0;
        self.hour_run_secs = 0;
        self.hour_cycles = 0;
        self.hour_degraded = false;
        summary
    }
}

fn duty_percent(run: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    ((u64::from(run.min(total)) * 100 + u64::from(total) / 2) / u64::from(total)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hour_closes_at_3600_seconds() {
        let mut m = MetricsAccumulator::new();
        for _ in 0..719 {
            assert!(m.record_tick(5, false, false).is_none());
        }
        assert_eq!(m.hour_total_secs(), 3595);
        let h = m.record_tick(5, false, false).unwrap();
        assert_eq!(h.total_secs, 3600);
        assert_eq!(m.hour_total_secs(), 0);
        assert_eq!(m.duty_index(), 1);
    }

    #[test]
    fn duty_and_cycle_stats() {
        let mut m = MetricsAccumulator::new();
        let mut summary = None;
        for i in 0..720 {
            if i % 240 == 239 {
                m.record_cycle();
            }
            summary = m.record_tick(5, i % 4 == 0, false);
        }
        let h = summary.unwrap();
        assert_eq!(h.run_secs, 900);
        assert_eq!(h.duty_pct, 25);
        assert_eq!(h.cycles, 3);
        let s = h.cycle_stats().unwrap();
        assert!((s.avg_on_secs - 300.0).abs() < 1e-3);
        assert!((s.avg_off_secs - 900.0).abs() < 1e-3);
        assert_eq!(m.hour_cycles(), 0);
        assert_eq!(m.lifetime_cycles, 3);
    }

    #[test]
    fn zero_cycle_hour_has_no_stats() {
        let mut m = MetricsAccumulator::new();
        let h = m.record_tick(3600, true, false).unwrap();
        assert_eq!(h.duty_pct, 100);
        assert!(h.cycle_stats().is_none());
    }

    #[test]
    fn degraded_flag_lasts_one_hour() {
        let mut m = MetricsAccumulator::new();
        m.record_tick(60, false, true);
        assert!(m.record_tick(3540, false, false).unwrap().degraded);
        assert!(!m.record_tick(3600, false, false).unwrap().degraded);
    }

    #[test]
    fn ring_wraps_after_24_hours() {
        let mut m = MetricsAccumulator::new();
        for hour in 0..26u32 {
            let run = if hour < 24 { 0 } else { 1800 };
            m.record_tick(run, true, false);
            m.record_tick(3600 - run, false, false);
        }
        assert_eq!(m.duty_index(), 2);
        let hist: Vec<u8> = m.duty_history().collect();
        assert_eq!(hist.len(), DUTY_SLOTS);
        assert_eq!(hist[DUTY_SLOTS - 1], 50);
        assert_eq!(hist[DUTY_SLOTS - 2], 50);
        assert_eq!(hist[0], 0);
    }

    #[test]
    fn lifetime_counters_survive_rollover() {
        let mut m = MetricsAccumulator::new();
        m.record_tick(1800, true, false);
        m.record_tick(1800, false, false);
        assert_eq!(m.lifetime_total_secs, 3600);
        assert_eq!(m.lifetime_run_secs, 1800);
        assert!((m.lifetime_duty_pct() - 50.0).abs() < 1e-3);
    }

    #[test]
    fn postcard_roundtrip_keeps_ring() {
        let mut m = MetricsAccumulator::new();
        m.record_tick(3600, true, false);
        m.record_tick(100, false, false);
        let bytes = postcard::to_allocvec(&m).unwrap();
        let back: MetricsAccumulator = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(back, m);
    }
}
