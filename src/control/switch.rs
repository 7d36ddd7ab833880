//! Relay switching with compressor timing guards.
//!
//! The decision engine says what the compressor *should* do; this module
//! decides whether it *may*. Outside limp mode a compressor that just
//! stopped is kept off for `min_off_secs` (head pressure must equalise)
//! and one that just started is kept on for `min_on_secs`.
//!
//! Relay commands are fire-and-forget: the logical state follows the
//! command even if the driver reports an error. An emergency shutdown
//! retries once before giving up.

use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::alarms::Alarm;
use crate::app::ports::RelayPort;
use crate::config::SystemConfig;
use crate::error::RelayError;

/// Logical relay state and the time of the last transition each way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayState {
    pub is_on: bool,
    pub on_since: u64,
    pub off_since: u64,
}

impl RelayState {
    /// Seconds since the last turn-on.
    pub fn on_elapsed(&self, now: u64) -> u64 {
        now.saturating_sub(self.on_since)
    }

    /// Seconds since the last turn-off.
    pub fn off_elapsed(&self, now: u64) -> u64 {
        now.saturating_sub(self.off_since)
    }

    /// Pull timestamps from a previous boot back to `now` so a restarted
    /// monotonic clock cannot hold the guards closed.
    pub fn rebased(self, now: u64) -> Self {
        Self {
            is_on: self.is_on,
            on_since: self.on_since.min(now),
            off_since: self.off_since.min(now),
        }
    }
}

/// Per-call inputs to [`SwitchExecutor::apply`].
#[derive(Debug, Clone, Copy)]
pub struct SwitchRequest {
    pub want_on: bool,
    pub now: u64,
    pub is_limp: bool,
    pub alarm: Alarm,
    pub control_c: Option<f32>,
}

/// Completed-run data captured at turn-off.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub run_secs: u64,
    /// Control temperature at the moment of turn-off.
    pub snapshot_c: Option<f32>,
    /// Cooling rate over the run (°C per minute), for long enough runs.
    pub health_c_per_min: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub on: bool,
    pub at: u64,
    pub emergency: bool,
    /// Only for ON→OFF.
    pub run: Option<RunSummary>,
    /// Driver error, if the command was not acknowledged.
    pub command_error: Option<RelayError>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SwitchOutcome {
    /// Relay already in the wanted state.
    Unchanged,
    Switched(Transition),
    /// Timing guard holds the relay; `wait_secs` until it may move.
    Blocked { want_on: bool, wait_secs: u64 },
    /// An alarm owns the relay right now.
    Refused(Alarm),
}

/// Owns [`RelayState`] and the per-run temperature bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct SwitchExecutor {
    state: RelayState,
    weld_snapshot_c: Option<f32>,
    start_temp_c: Option<f32>,
}

impl SwitchExecutor {
    pub fn new(state: RelayState) -> Self {
        Self {
            state,
            weld_snapshot_c: None,
            start_temp_c: None,
        }
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    pub fn is_on(&self) -> bool {
        self.state.is_on
    }

    /// Temperature captured at the last turn-off, for weld detection.
    pub fn weld_snapshot_c(&self) -> Option<f32> {
        self.weld_snapshot_c
    }

    /// Apply a decision, honouring the timing guards.
    pub fn apply<R: RelayPort>(
        &mut self,
        relay: &mut R,
        req: &SwitchRequest,
        cfg: &SystemConfig,
    ) -> SwitchOutcome {
        if req.want_on == self.state.is_on {
            return SwitchOutcome::Unchanged;
        }

        if !req.is_limp {
            if req.alarm.is_fatal() || req.alarm == Alarm::Ghost {
                return SwitchOutcome::Refused(req.alarm);
            }
            let wait = if req.want_on {
                remaining(self.state.off_elapsed(req.now), cfg.min_off_secs)
            } else {
                remaining(self.state.on_elapsed(req.now), cfg.min_on_secs)
            };
            if wait > 0 {
                return SwitchOutcome::Blocked {
                    want_on: req.want_on,
                    wait_secs: wait,
                };
            }
        }

        let command_error = relay.set_relay(req.want_on).err();
        if let Some(e) = command_error {
            warn!(
                "relay {} command failed: {e}",
                if req.want_on { "ON" } else { "OFF" }
            );
        }
        SwitchOutcome::Switched(self.commit(req.want_on, req.now, req.control_c, false, command_error, cfg))
    }

    /// Drop the compressor now, ignoring guards. Retries once on a driver error.
    pub fn emergency_off<R: RelayPort>(
        &mut self,
        relay: &mut R,
        now: u64,
        control_c: Option<f32>,
        cfg: &SystemConfig,
    ) -> SwitchOutcome {
        if !self.state.is_on {
            return SwitchOutcome::Unchanged;
        }
        let command_error = match relay.set_relay(false) {
            Ok(()) => None,
            Err(first) => {
                warn!("emergency OFF failed ({first}), retrying");
                match relay.set_relay(false) {
                    Ok(()) => None,
                    Err(e) => {
                        error!("emergency OFF retry failed: {e}");
                        Some(e)
                    }
                }
            }
        };
        SwitchOutcome::Switched(self.commit(false, now, control_c, true, command_error, cfg))
    }

    // ── Internal ──────────────────────────────────────────────────

    fn commit(
        &mut self,
        on: bool,
        now: u64,
        control_c: Option<f32>,
        emergency: bool,
        command_error: Option<RelayError>,
        cfg: &SystemConfig,
    ) -> Transition {
        let run = if on {
            self.state.is_on = true;
            self.state.on_since = now;
            self.start_temp_c = control_c;
            info!("compressor ON");
            None
        } else {
            let run_secs = self.state.on_elapsed(now);
            self.state.is_on = false;
            self.state.off_since = now;
            self.weld_snapshot_c = control_c;
            let health_c_per_min = match (self.start_temp_c.take(), control_c) {
                (Some(start), Some(end)) if run_secs > u64::from(cfg.health_min_run_secs) => {
                    Some((start - end) / (run_secs as f32 / 60.0))
                }
                _ => None,
            };
            info!(
                "compressor OFF after {run_secs}s{}",
                if emergency { " (emergency)" } else { "" }
            );
            Some(RunSummary {
                run_secs,
                snapshot_c: control_c,
                health_c_per_min,
            })
        };
        Transition {
            on,
            at: now,
            emergency,
            run,
            command_error,
        }
    }
}

fn remaining(elapsed: u64, guard_secs: u32) -> u64 {
    u64::from(guard_secs).saturating_sub(elapsed)
}
