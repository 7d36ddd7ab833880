//! Mode decision engine.
//!
//! A pure, strictly ordered priority list. The first rule that matches
//! decides; later rules may assume every earlier one did not match.
//!
//! | # | Rule                       | Result                        |
//! |---|----------------------------|-------------------------------|
//! | 1 | fatal alarm                | OFF                           |
//! | 2 | sensor failure             | limp duty cycle               |
//! | 3 | turbo                      | swap target/band, fall through|
//! | 4 | door pause                 | OFF                           |
//! | 5 | scheduled defrost window   | OFF                           |
//! | 6 | below freeze cut           | OFF                           |
//! | 7 | max continuous run (!turbo)| OFF                           |
//! | 8 | dynamic defrost            | OFF                           |
//! | 9 | hysteresis band            | ON / OFF / hold               |

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::alarms::Alarm;
use crate::config::SystemConfig;
use crate::control::features::FeatureFlags;
use crate::control::switch::RelayState;

/// Why the compressor is being forced off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OffReason {
    FatalAlarm(Alarm),
    DoorPause,
    ScheduledDefrost,
    FreezeProtection,
    MaxRun,
    DynamicDefrost,
}

/// Presentation status threaded through to telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlStatus {
    Cooling,
    Idle,
    Turbo,
    Limp,
    DoorOpen,
    Defrost,
    Protection,
    Fault,
    WaitingForSensor,
}

impl fmt::Display for ControlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Cooling => "cooling",
            Self::Idle => "idle",
            Self::Turbo => "turbo",
            Self::Limp => "limp",
            Self::DoorOpen => "door open",
            Self::Defrost => "defrost",
            Self::Protection => "protection",
            Self::Fault => "fault",
            Self::WaitingForSensor => "waiting for sensor",
        };
        f.write_str(s)
    }
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    ForceOff(OffReason),
    /// Blind time-based cycling while the sensor cannot be trusted.
    Limp { want_on: bool },
    /// No control temperature yet; keep whatever the relay is doing.
    AwaitingSensor { hold_on: bool },
    /// Normal bang-bang control.
    Hysteresis {
        want_on: bool,
        /// Temperature inside the band; previous state kept.
        held: bool,
        target_c: f32,
        band_c: f32,
        turbo: bool,
    },
}

impl Decision {
    pub fn want_relay_on(&self) -> bool {
        match *self {
            Self::ForceOff(_) => false,
            Self::Limp { want_on } | Self::Hysteresis { want_on, .. } => want_on,
            Self::AwaitingSensor { hold_on } => hold_on,
        }
    }

    pub fn is_limp(&self) -> bool {
        matches!(self, Self::Limp { .. })
    }

    pub fn status(&self) -> ControlStatus {
        match *self {
            Self::ForceOff(OffReason::FatalAlarm(_)) => ControlStatus::Fault,
            Self::ForceOff(OffReason::DoorPause) => ControlStatus::DoorOpen,
            Self::ForceOff(OffReason::ScheduledDefrost | OffReason::DynamicDefrost) => {
                ControlStatus::Defrost
            }
            Self::ForceOff(OffReason::FreezeProtection | OffReason::MaxRun) => {
                ControlStatus::Protection
            }
            Self::Limp { .. } => ControlStatus::Limp,
            Self::AwaitingSensor { .. } => ControlStatus::WaitingForSensor,
            Self::Hysteresis { turbo: true, .. } => ControlStatus::Turbo,
            Self::Hysteresis { want_on: true, .. } => ControlStatus::Cooling,
            Self::Hysteresis { want_on: false, .. } => ControlStatus::Idle,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ForceOff(OffReason::FatalAlarm(a)) => write!(f, "off: {a}"),
            Self::ForceOff(OffReason::DoorPause) => write!(f, "off: door pause"),
            Self::ForceOff(OffReason::ScheduledDefrost) => write!(f, "off: scheduled defrost"),
            Self::ForceOff(OffReason::FreezeProtection) => write!(f, "off: freeze protection"),
            Self::ForceOff(OffReason::MaxRun) => write!(f, "off: max-run protection"),
            Self::ForceOff(OffReason::DynamicDefrost) => write!(f, "off: dynamic defrost"),
            Self::Limp { want_on } => write!(f, "limp {}", on_off(*want_on)),
            Self::AwaitingSensor { hold_on } => write!(f, "no reading, hold {}", on_off(*hold_on)),
            Self::Hysteresis {
                want_on,
                held,
                target_c,
                band_c,
                ..
            } => write!(
                f,
                "{}{} (target {target_c:.1} ±{band_c:.2})",
                if *held { "hold " } else { "" },
                on_off(*want_on)
            ),
        }
    }
}

fn on_off(on: bool) -> &'static str {
    if on { "on" } else { "off" }
}

/// Everything the engine reads.
#[derive(Debug, Clone, Copy)]
pub struct DecisionInputs {
    /// Seconds since boot.
    pub now: u64,
    pub control_c: Option<f32>,
    pub alarm: Alarm,
    pub relay: RelayState,
    /// Effective (clamped) hysteresis half-width.
    pub band_c: f32,
    pub features: FeatureFlags,
}

/// Evaluate the priority list.
pub fn decide(inp: &DecisionInputs, cfg: &SystemConfig) -> Decision {
    // 1. Fatal
    if inp.alarm.is_fatal() {
        return Decision::ForceOff(OffReason::FatalAlarm(inp.alarm));
    }

    // 2. Sensor failure
    if inp.alarm == Alarm::SensorFail {
        return Decision::Limp {
            want_on: limp_phase_on(inp.now, cfg),
        };
    }

    // 3. Turbo
    let turbo = inp.features.turbo;
    let (target_c, band_c) = if turbo {
        (cfg.turbo_target_c, cfg.turbo_hysteresis_c)
    } else {
        (cfg.target_temp_c, inp.band_c)
    };

    // 4. Door
    if inp.features.door_paused {
        return Decision::ForceOff(OffReason::DoorPause);
    }

    // 5. Scheduled defrost
    if inp.features.scheduled_defrost {
        return Decision::ForceOff(OffReason::ScheduledDefrost);
    }

    let Some(t) = inp.control_c else {
        return Decision::AwaitingSensor {
            hold_on: inp.relay.is_on,
        };
    };

    // 6. Freeze protection
    if t < cfg.freeze_cut_c {
        return Decision::ForceOff(OffReason::FreezeProtection);
    }

    // 7. Max continuous run
    if !turbo && inp.relay.is_on && inp.relay.on_elapsed(inp.now) > u64::from(cfg.max_run_secs) {
        return Decision::ForceOff(OffReason::MaxRun);
    }

    // 8. Dynamic defrost
    if inp.features.dynamic_defrost {
        return Decision::ForceOff(OffReason::DynamicDefrost);
    }

    // 9. Hysteresis
    let (want_on, held) = if t > target_c + band_c {
        (true, false)
    } else if t < target_c - band_c {
        (false, false)
    } else {
        (inp.relay.is_on, true)
    };
    Decision::Hysteresis {
        want_on,
        held,
        target_c,
        band_c,
        turbo,
    }
}

/// Limp duty cycle: ON for the first `limp_on_secs` of every period.
pub fn limp_phase_on(now: u64, cfg: &SystemConfig) -> bool {
    let period = u64::from(cfg.limp_period_secs());
    if period == 0 {
        return false;
    }
    now % period < u64::from(cfg.limp_on_secs)
}
