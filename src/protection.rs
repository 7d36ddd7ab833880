//! Compressor protection detectors.
//!
//! Runs every tick after the sensor pipeline and before the decision
//! engine. Each detector looks at one signature (temperature drop while
//! idle, evaporator differential, power draw) and raises its alarm on the
//! [`AlarmManager`]. The detectors are independent; the alarm manager's
//! precedence decides which one is visible when several fire together.
//!
//! ## Fault lifecycle
//!
//! 1. `Weld` and `LockedRotor` are fatal: raised once, recorded at once,
//!    and latched until an external reset.
//! 2. `CoolingFail` and `Ghost` are re-derived every tick and disappear
//!    when the signature does.
//! 3. Ghost trips are counted. The count survives relay cycles and only
//!    goes back to zero through [`ProtectionSupervisor::reset_ghost_count`]
//!    after the caller has seen sustained normal running.

use core::fmt::Write as _;

use log::{info, warn};

use crate::alarms::{Alarm, AlarmManager, FaultDetail};
use crate::config::SystemConfig;
use crate::control::switch::RelayState;

/// Signals the detectors need for one tick.
#[derive(Debug, Clone, Copy)]
pub struct ProtectionInputs {
    pub now: u64,
    pub relay: RelayState,
    pub control_c: Option<f32>,
    pub evap_c: Option<f32>,
    pub watts: Option<f32>,
    /// Control temperature captured at the last turn-off.
    pub weld_snapshot_c: Option<f32>,
    pub turbo_active: bool,
}

/// What fired this tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProtectionReport {
    pub weld: bool,
    pub cooling_fail: bool,
    pub locked_rotor: bool,
    pub ghost: bool,
    /// Relay on, past the inrush mask and power within limits.
    pub power_normal: bool,
}

impl ProtectionReport {
    /// The compressor must be dropped now, bypassing the timing guards.
    pub fn requires_emergency_off(&self) -> bool {
        self.locked_rotor || self.ghost
    }
}

/// Ghost-run counters plus the detector entry points.
#[derive(Debug, Clone, Default)]
pub struct ProtectionSupervisor {
    ghost_accum_secs: u32,
    ghost_count: u8,
}

impl ProtectionSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every enabled detector.
    pub fn evaluate(
        &mut self,
        inp: &ProtectionInputs,
        cfg: &SystemConfig,
        alarms: &mut AlarmManager,
    ) -> ProtectionReport {
        let mut report = ProtectionReport {
            weld: check_weld(inp, cfg, alarms),
            cooling_fail: check_cooling(inp, cfg, alarms),
            ..ProtectionReport::default()
        };

        // ── Power signature ───────────────────────────────────────
        match self.power_window(inp, cfg) {
            PowerWindow::RelayOff => self.ghost_accum_secs = 0,
            PowerWindow::Masked | PowerWindow::NoReading => {}
            PowerWindow::Reading(w) => {
                if w > cfg.locked_rotor_max_w {
                    report.locked_rotor = trip_locked_rotor(w, inp.now, alarms);
                } else if w < cfg.ghost_min_w {
                    match self.accumulate_ghost(w, inp.now, cfg, alarms) {
                        GhostTrip::Pending => {}
                        GhostTrip::Ghost => report.ghost = true,
                        GhostTrip::Escalated => {
                            report.ghost = true;
                            report.locked_rotor = true;
                        }
                    }
                } else {
                    self.ghost_accum_secs = 0;
                    report.power_normal = true;
                }
            }
        }

        report
    }

    pub fn ghost_count(&self) -> u8 {
        self.ghost_count
    }

    pub fn ghost_accum_secs(&self) -> u32 {
        self.ghost_accum_secs
    }

    /// Forget earlier ghost trips. Called once the compressor has run
    /// normally for long enough.
    pub fn reset_ghost_count(&mut self) {
        if self.ghost_count > 0 {
            info!("ghost-run count reset after sustained normal running");
        }
        self.ghost_count = 0;
    }

    // ── Internal ──────────────────────────────────────────────────

    fn power_window(&self, inp: &ProtectionInputs, cfg: &SystemConfig) -> PowerWindow {
        if !inp.relay.is_on {
            return PowerWindow::RelayOff;
        }
        if inp.relay.on_elapsed(inp.now) <= u64::from(cfg.power_startup_mask_secs) {
            return PowerWindow::Masked;
        }
        match inp.watts {
            Some(w) if cfg.power_sensor_enabled => PowerWindow::Reading(w),
            _ => PowerWindow::NoReading,
        }
    }

    fn accumulate_ghost(
        &mut self,
        watts: f32,
        now: u64,
        cfg: &SystemConfig,
        alarms: &mut AlarmManager,
    ) -> GhostTrip {
        self.ghost_accum_secs = self
            .ghost_accum_secs
            .saturating_add(cfg.control_interval_secs);
        if self.ghost_accum_secs < cfg.ghost_trip_secs {
            return GhostTrip::Pending;
        }

        self.ghost_accum_secs = 0;
        self.ghost_count = self.ghost_count.saturating_add(1);

        if self.ghost_count >= cfg.ghost_max_count {
            let mut d = FaultDetail::new();
            let _ = write!(d, "ghost run x{} at {:.0}W", self.ghost_count, watts);
            alarms.raise_fatal(Alarm::LockedRotor, now, &d);
            GhostTrip::Escalated
        } else {
            warn!(
                "ghost run {}/{}: {:.0}W below {:.0}W",
                self.ghost_count, cfg.ghost_max_count, watts, cfg.ghost_min_w
            );
            alarms.raise(Alarm::Ghost);
            GhostTrip::Ghost
        }
    }
}

enum GhostTrip {
    Pending,
    Ghost,
    /// Repeat count reached the limit; raised as a locked rotor.
    Escalated,
}

enum PowerWindow {
    RelayOff,
    Masked,
    NoReading,
    Reading(f32),
}

/// Continued cooling inside the post-off window means the contacts are
/// still closed.
fn check_weld(inp: &ProtectionInputs, cfg: &SystemConfig, alarms: &mut AlarmManager) -> bool {
    if !cfg.weld_detect_enabled || inp.relay.is_on {
        return false;
    }
    let (Some(snapshot), Some(t)) = (inp.weld_snapshot_c, inp.control_c) else {
        return false;
    };
    let since_off = inp.relay.off_elapsed(inp.now);
    // Both bounds count from the turn-off.
    if since_off <= u64::from(cfg.weld_wait_secs) || since_off >= u64::from(cfg.weld_window_secs) {
        return false;
    }

    let drop = snapshot - t;
    if drop <= cfg.weld_drop_c {
        return false;
    }
    let mut d = FaultDetail::new();
    let _ = write!(d, "{drop:.1}C drop {since_off}s after off");
    alarms.raise_fatal(Alarm::Weld, inp.now, &d);
    true
}

/// Evaporator should sit well below the cabinet while the compressor runs.
fn check_cooling(inp: &ProtectionInputs, cfg: &SystemConfig, alarms: &mut AlarmManager) -> bool {
    if !cfg.cooling_check_enabled || !inp.relay.is_on || inp.turbo_active {
        return false;
    }
    if inp.relay.on_elapsed(inp.now) < u64::from(cfg.cooling_check_delay_secs) {
        return false;
    }
    let (Some(t), Some(evap)) = (inp.control_c, inp.evap_c) else {
        return false;
    };
    // Near the setpoint the load is too small for the differential to mean anything.
    if t <= cfg.target_temp_c {
        return false;
    }
    if t - evap >= cfg.cooling_min_diff_c {
        return false;
    }
    alarms.raise(Alarm::CoolingFail);
    true
}

fn trip_locked_rotor(watts: f32, now: u64, alarms: &mut AlarmManager) -> bool {
    let mut d = FaultDetail::new();
    let _ = write!(d, "{watts:.0}W draw");
    alarms.raise_fatal(Alarm::LockedRotor, now, &d);
    true
}
