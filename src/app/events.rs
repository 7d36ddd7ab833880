//! Outbound application events.
//!
//! The [`ControlService`](super::service::ControlService) emits these
//! through the [`EventSink`](super::ports::EventSink) port. Adapters on
//! the other side decide what to do with them: log to serial, publish
//! over MQTT, render a status page.

use crate::alarms::{Alarm, FaultEntry, Severity};
use crate::app::ports::ConfigError;
use crate::control::decision::ControlStatus;
use crate::control::hysteresis::HysteresisOutcome;
use crate::control::switch::Transition;
use crate::metrics::HourSummary;

/// Structured events emitted by the controller core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// The service has started (carries restored state).
    Started { relay_on: bool, fatal: Alarm },

    /// Presentation status changed.
    StatusChanged {
        from: Option<ControlStatus>,
        to: ControlStatus,
    },

    /// The relay actually moved.
    RelaySwitched(Transition),

    /// A wanted transition is held by a timing guard.
    SwitchBlocked { want_on: bool, wait_secs: u64 },

    AlarmRaised(Alarm),
    AlarmCleared(Alarm),

    /// A fault entry was appended to a severity queue.
    FaultLogged { severity: Severity, entry: FaultEntry },

    /// A metrics hour closed.
    HourRollover(HourSummary),

    /// The adaptive controller acted on the closed hour.
    HysteresisAdjusted {
        outcome: HysteresisOutcome,
        band_c: f32,
    },

    /// An external command failed validation and was rolled back.
    CommandRejected(ConfigError),

    /// Periodic telemetry snapshot.
    Telemetry(TelemetryData),
}

/// A point-in-time telemetry snapshot suitable for logging or transmission.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryData {
    pub uptime_secs: u64,
    pub status: Option<ControlStatus>,
    pub alarm: Alarm,
    pub relay_on: bool,
    pub control_c: Option<f32>,
    pub evap_c: Option<f32>,
    pub watts: Option<f32>,
    pub target_c: f32,
    pub band_c: f32,
    pub turbo: bool,
    pub sensor_errors: u8,
    pub ghost_count: u8,
    pub lifetime_duty_pct: f32,
    pub cycles: u32,
}
