//! Feature overrides the decision engine consults: turbo, door pause,
//! scheduled defrost and dynamic defrost.
//!
//! All timers live here as plain fields owned by the control service, so
//! each tick reads and advances them explicitly.

use log::{info, warn};

use crate::config::SystemConfig;
use crate::control::switch::RelayState;
use crate::sensors::SensorReport;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Overrides in force for the current tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureFlags {
    pub turbo: bool,
    pub door_paused: bool,
    pub scheduled_defrost: bool,
    pub dynamic_defrost: bool,
}

#[derive(Debug, Clone, Copy)]
struct DynamicDefrost {
    started: u64,
    warm_since: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct Features {
    turbo_until: Option<u64>,
    door_pause_until: Option<u64>,
    dyn_defrost: Option<DynamicDefrost>,
}

impl Features {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch turbo on for `turbo_duration_secs`, or off.
    pub fn set_turbo(&mut self, on: bool, now: u64, cfg: &SystemConfig) {
        if on {
            self.turbo_until = Some(now + u64::from(cfg.turbo_duration_secs));
            info!("turbo on for {}s", cfg.turbo_duration_secs);
        } else if self.turbo_until.take().is_some() {
            info!("turbo cancelled");
        }
    }

    pub fn turbo_active(&self, now: u64) -> bool {
        self.turbo_until.is_some_and(|until| now < until)
    }

    pub fn dynamic_defrost_active(&self) -> bool {
        self.dyn_defrost.is_some()
    }

    /// Scheduled defrost has priority; an interrupted dynamic defrost must
    /// not resume afterwards.
    pub fn cancel_dynamic_defrost(&mut self) {
        if self.dyn_defrost.take().is_some() {
            info!("dynamic defrost cancelled by scheduled defrost");
        }
    }

    /// Advance every timer and return the overrides for this tick.
    pub fn update(
        &mut self,
        now: u64,
        report: &SensorReport,
        relay: &RelayState,
        minute_of_day: Option<u16>,
        cfg: &SystemConfig,
    ) -> FeatureFlags {
        if self.turbo_until.is_some_and(|until| now >= until) {
            self.turbo_until = None;
            info!("turbo expired");
        }

        // ── Door ──────────────────────────────────────────────────
        if cfg.door_detect_enabled && !report.failed {
            if let (Some(median), Some(smoothed)) = (report.median_c, report.control_c) {
                if median - smoothed >= cfg.door_rise_c {
                    if !self.door_paused(now) {
                        info!("door open suspected: +{:.1}C, pausing", median - smoothed);
                    }
                    self.door_pause_until = Some(now + u64::from(cfg.door_pause_secs));
                }
            }
        }
        if self.door_pause_until.is_some_and(|until| now >= until) {
            self.door_pause_until = None;
        }

        // ── Dynamic defrost ───────────────────────────────────────
        if cfg.dyn_defrost_enabled {
            self.update_dynamic_defrost(now, report, relay, cfg);
        } else {
            self.dyn_defrost = None;
        }

        FeatureFlags {
            turbo: self.turbo_active(now),
            door_paused: self.door_paused(now),
            scheduled_defrost: in_defrost_window(minute_of_day, cfg),
            dynamic_defrost: self.dyn_defrost.is_some(),
        }
    }

    fn door_paused(&self, now: u64) -> bool {
        self.door_pause_until.is_some_and(|until| now < until)
    }

    fn update_dynamic_defrost(
        &mut self,
        now: u64,
        report: &SensorReport,
        relay: &RelayState,
        cfg: &SystemConfig,
    ) {
        let evap = if report.failed { None } else { report.evap_c };

        match self.dyn_defrost.as_mut() {
            None => {
                if let Some(e) = evap {
                    if relay.is_on && e < cfg.dyn_defrost_start_c {
                        info!("dynamic defrost start: evaporator {e:.1}C");
                        self.dyn_defrost = Some(DynamicDefrost {
                            started: now,
                            warm_since: None,
                        });
                    }
                }
            }
            Some(d) => {
                let done = match evap {
                    Some(e) if e > cfg.dyn_defrost_end_c => {
                        let since = *d.warm_since.get_or_insert(now);
                        now.saturating_sub(since) >= u64::from(cfg.dyn_defrost_dwell_secs)
                    }
                    Some(_) => {
                        d.warm_since = None;
                        false
                    }
                    None => false,
                };
                let elapsed = now.saturating_sub(d.started);
                if done {
                    info!("dynamic defrost complete after {elapsed}s");
                    self.dyn_defrost = None;
                } else if elapsed >= u64::from(cfg.dyn_defrost_max_secs) {
                    warn!("dynamic defrost hit {elapsed}s limit, ending");
                    self.dyn_defrost = None;
                }
            }
        }
    }
}

/// Whether the wall clock sits inside the daily defrost window. The
/// window may wrap past midnight. Without a synchronised clock there is
/// no scheduled defrost.
pub fn in_defrost_window(minute_of_day: Option<u16>, cfg: &SystemConfig) -> bool {
    if !cfg.sched_defrost_enabled || cfg.sched_defrost_duration_min == 0 {
        return false;
    }
    let Some(m) = minute_of_day else {
        return false;
    };
    let start = u32::from(cfg.sched_defrost_start_min);
    let offset = (u32::from(m) + MINUTES_PER_DAY - start) % MINUTES_PER_DAY;
    offset < u32::from(cfg.sched_defrost_duration_min)
}
