//! Self-tuning hysteresis band.
//!
//! Once per completed metrics hour the controller looks at the average
//! on+off cycle length and nudges the deadband:
//!
//! ```text
//!   total cycle ─▶  [ danger ]  [ trend: widen ]  [ stable ]  [ trend: tighten ]
//!                   immediate    needs 2 hours     no action   needs 2 hours
//! ```
//!
//! The danger zone acts at once with the larger step. Trend-zone changes
//! need two consecutive hours pointing the same way. A widen that would
//! push the lower switching point too close to the freeze cut is refused.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::SystemConfig;

/// Result of one hourly evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HysteresisOutcome {
    Widen,
    Tighten,
    /// A widen was wanted but would crowd the freeze cut.
    Blocked,
    None,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TrendDirection {
    #[default]
    None,
    Widen,
    Tighten,
}

/// Cycle statistics of one completed hour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleStats {
    pub avg_on_secs: f32,
    pub avg_off_secs: f32,
    pub cycles: u16,
}

#[derive(Debug, Clone)]
pub struct AdaptiveHysteresis {
    /// Stored band half-width (°C). May be out of range after a config
    /// change; always read through [`effective_c`](Self::effective_c).
    current_c: f32,
    last_direction: TrendDirection,
    consecutive: u8,
}

impl AdaptiveHysteresis {
    pub fn new(initial_c: f32) -> Self {
        Self {
            current_c: initial_c,
            last_direction: TrendDirection::None,
            consecutive: 0,
        }
    }

    /// Band half-width bounded to the configured range.
    pub fn effective_c(&self, cfg: &SystemConfig) -> f32 {
        clamp_band(self.current_c, cfg)
    }

    /// Stored value, for persistence.
    pub fn stored_c(&self) -> f32 {
        self.current_c
    }

    pub fn direction(&self) -> TrendDirection {
        self.last_direction
    }

    pub fn consecutive(&self) -> u8 {
        self.consecutive
    }

    /// Evaluate one completed hour.
    pub fn evaluate(
        &mut self,
        stats: &CycleStats,
        turbo_active: bool,
        cfg: &SystemConfig,
    ) -> HysteresisOutcome {
        if !cfg.adaptive_enabled || turbo_active || stats.cycles == 0 {
            return HysteresisOutcome::None;
        }

        let total = stats.avg_on_secs + stats.avg_off_secs;
        let target_min = cfg.cycle_target_min_secs as f32;
        let cycles = u32::from(stats.cycles);

        // ── Danger zone ───────────────────────────────────────────
        let short_avg = total < target_min * cfg.danger_multiplier;
        let short_count = cycles >= u32::from(cfg.high_count_cycles)
            && total < cfg.high_count_ceiling_secs as f32;
        if short_avg || short_count {
            debug!("hysteresis: danger zone, cycle {total:.0}s x{cycles}");
            return self.widen(cfg.danger_step_c, cfg);
        }

        // ── Stable deadband ───────────────────────────────────────
        let stable_lo = target_min * cfg.short_multiplier;
        let stable_hi = (cfg.cycle_target_max_secs + cfg.stable_pad_secs) as f32;
        let sparse = cycles <= u32::from(cfg.low_count_cycles)
            && total > cfg.low_count_floor_secs as f32;
        if (stable_lo..=stable_hi).contains(&total) || (total > stable_hi && sparse) {
            return HysteresisOutcome::None;
        }

        // ── Trend zone ────────────────────────────────────────────
        let signal = if total < stable_lo {
            TrendDirection::Widen
        } else if stats.avg_off_secs > stats.avg_on_secs {
            TrendDirection::Tighten
        } else {
            // Long cycles with no idle headroom: the system is struggling.
            return HysteresisOutcome::None;
        };

        if signal != self.last_direction {
            self.last_direction = signal;
            self.consecutive = 1;
            debug!("hysteresis: first {signal:?} signal, cycle {total:.0}s");
            return HysteresisOutcome::None;
        }

        let outcome = match signal {
            TrendDirection::Widen => self.widen(cfg.step_c, cfg),
            TrendDirection::Tighten => self.tighten(cfg.step_c, cfg),
            TrendDirection::None => HysteresisOutcome::None,
        };
        if outcome != HysteresisOutcome::Blocked {
            self.last_direction = TrendDirection::None;
            self.consecutive = 0;
        }
        outcome
    }

    // ── Internal ──────────────────────────────────────────────────

    fn widen(&mut self, step: f32, cfg: &SystemConfig) -> HysteresisOutcome {
        let from = self.effective_c(cfg);
        let to = clamp_band(from + step, cfg);
        if cfg.target_temp_c - to < cfg.freeze_cut_c + cfg.freeze_margin_c {
            info!(
                "hysteresis widen to {to:.2} blocked: lower bound {:.2} too close to freeze cut",
                cfg.target_temp_c - to
            );
            return HysteresisOutcome::Blocked;
        }
        self.current_c = to;
        info!("hysteresis widened {from:.2} -> {to:.2}");
        HysteresisOutcome::Widen
    }

    fn tighten(&mut self, step: f32, cfg: &SystemConfig) -> HysteresisOutcome {
        let from = self.effective_c(cfg);
        let to = clamp_band(from - step, cfg);
        self.current_c = to;
        info!("hysteresis tightened {from:.2} -> {to:.2}");
        HysteresisOutcome::Tighten
    }
}

fn clamp_band(value: f32, cfg: &SystemConfig) -> f32 {
    if value.is_finite() {
        value.clamp(cfg.hyst_min_c, cfg.hyst_max_c)
    } else {
        cfg.hyst_min_c
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Short target cycle so the zones land on round numbers:
    /// danger < 450s, stable 600s..=1500s.
    fn cfg() -> SystemConfig {
        SystemConfig {
            cycle_target_min_secs: 300,
            cycle_target_max_secs: 1200,
            stable_pad_secs: 300,
            danger_multiplier: 1.5,
            short_multiplier: 2.0,
            high_count_cycles: 10,
            high_count_ceiling_secs: 900,
            low_count_cycles: 1,
            low_count_floor_secs: 3000,
            danger_step_c: 0.5,
            step_c: 0.2,
            ..Default::default()
        }
    }

    fn stats(on: f32, off: f32, cycles: u16) -> CycleStats {
        CycleStats {
            avg_on_secs: on,
            avg_off_secs: off,
            cycles,
        }
    }

    #[test]
    fn danger_zone_widens_immediately() {
        let c = cfg();
        let mut h = AdaptiveHysteresis::new(1.0);
        let out = h.evaluate(&stats(200.0, 200.0, 3), false, &c);
        assert_eq!(out, HysteresisOutcome::Widen);
        assert!((h.effective_c(&c) - 1.5).abs() < 1e-6);
    }

    #[test]
    fn danger_widen_clamps_to_max() {
        let c = SystemConfig {
            target_temp_c: 6.0,
            ..cfg()
        };
        let mut h = AdaptiveHysteresis::new(c.hyst_max_c - 0.1);
        assert_eq!(h.evaluate(&stats(200.0, 200.0, 3), false, &c), HysteresisOutcome::Widen);
        assert_eq!(h.effective_c(&c), c.hyst_max_c);
    }

    #[test]
    fn high_cycle_count_counts_as_danger() {
        let c = cfg();
        let mut h = AdaptiveHysteresis::new(1.0);
        // Average looks stable but the count says short-cycling.
        let out = h.evaluate(&stats(250.0, 300.0, 12), false, &c);
        assert_eq!(out, HysteresisOutcome::Widen);
    }

    #[test]
    fn trend_widen_needs_two_hours() {
        let c = cfg();
        let mut h = AdaptiveHysteresis::new(1.0);
        let s = stats(250.0, 250.0, 3);

        assert_eq!(h.evaluate(&s, false, &c), HysteresisOutcome::None);
        assert_eq!(h.direction(), TrendDirection::Widen);
        assert_eq!(h.consecutive(), 1);

        assert_eq!(h.evaluate(&s, false, &c), HysteresisOutcome::Widen);
        assert!((h.effective_c(&c) - 1.2).abs() < 1e-6);
        assert_eq!(h.direction(), TrendDirection::None);
        assert_eq!(h.consecutive(), 0);
    }

    #[test]
    fn opposite_signal_restarts_tracking() {
        let c = cfg();
        let mut h = AdaptiveHysteresis::new(1.0);
        h.evaluate(&stats(250.0, 250.0, 3), false, &c);
        let out = h.evaluate(&stats(400.0, 1400.0, 2), false, &c);
        assert_eq!(out, HysteresisOutcome::None);
        assert_eq!(h.direction(), TrendDirection::Tighten);
        assert_eq!(h.consecutive(), 1);
        assert_eq!(h.effective_c(&c), 1.0);
    }

    #[test]
    fn stable_hour_preserves_tracking() {
        let c = cfg();
        let mut h = AdaptiveHysteresis::new(1.0);
        h.evaluate(&stats(250.0, 250.0, 3), false, &c);
        assert_eq!(h.evaluate(&stats(400.0, 500.0, 4), false, &c), HysteresisOutcome::None);
        assert_eq!(h.direction(), TrendDirection::Widen);
        assert_eq!(h.evaluate(&stats(250.0, 250.0, 3), false, &c), HysteresisOutcome::Widen);
    }

    #[test]
    fn long_cycles_tighten_only_with_idle_headroom() {
        let c = cfg();
        let mut h = AdaptiveHysteresis::new(1.0);
        let struggling = stats(1400.0, 400.0, 2);
        assert_eq!(h.evaluate(&struggling, false, &c), HysteresisOutcome::None);
        assert_eq!(h.direction(), TrendDirection::None);

        let idle = stats(400.0, 1400.0, 2);
        h.evaluate(&idle, false, &c);
        assert_eq!(h.evaluate(&idle, false, &c), HysteresisOutcome::Tighten);
        assert!((h.effective_c(&c) - 0.8).abs() < 1e-6);
    }

    #[test]
    fn sparse_long_hour_counts_as_stable() {
        let c = cfg();
        let mut h = AdaptiveHysteresis::new(1.0);
        let out = h.evaluate(&stats(1000.0, 2500.0, 1), false, &c);
        assert_eq!(out, HysteresisOutcome::None);
        assert_eq!(h.direction(), TrendDirection::None);
    }

    #[test]
    fn widen_blocked_near_freeze_cut_keeps_tracking() {
        let c = SystemConfig {
            target_temp_c: 2.5,
            freeze_cut_c: 0.5,
            freeze_margin_c: 1.0,
            ..cfg()
        };
        let mut h = AdaptiveHysteresis::new(0.9);
        let s = stats(250.0, 250.0, 3);
        h.evaluate(&s, false, &c);
        assert_eq!(h.evaluate(&s, false, &c), HysteresisOutcome::Blocked);
        assert_eq!(h.stored_c(), 0.9);
        assert_eq!(h.direction(), TrendDirection::Widen);
        assert_eq!(h.consecutive(), 1);

        assert_eq!(h.evaluate(&stats(200.0, 200.0, 3), false, &c), HysteresisOutcome::Blocked);
    }

    #[test]
    fn skipped_in_turbo_or_without_cycles() {
        let c = cfg();
        let mut h = AdaptiveHysteresis::new(1.0);
        assert_eq!(h.evaluate(&stats(200.0, 200.0, 3), true, &c), HysteresisOutcome::None);
        assert_eq!(h.evaluate(&stats(200.0, 200.0, 0), false, &c), HysteresisOutcome::None);
        let off = SystemConfig {
            adaptive_enabled: false,
            ..c
        };
        assert_eq!(h.evaluate(&stats(200.0, 200.0, 3), false, &off), HysteresisOutcome::None);
        assert_eq!(h.stored_c(), 1.0);
    }

    #[test]
    fn out_of_range_stored_value_is_clamped_on_read() {
        let c = cfg();
        assert_eq!(AdaptiveHysteresis::new(9.0).effective_c(&c), c.hyst_max_c);
        assert_eq!(AdaptiveHysteresis::new(0.0).effective_c(&c), c.hyst_min_c);
        assert_eq!(AdaptiveHysteresis::new(f32::NAN).effective_c(&c), c.hyst_min_c);
    }
}
