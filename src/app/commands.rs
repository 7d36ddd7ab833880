//! Inbound commands to the controller core.
//!
//! These represent actions requested by the outside world (pub/sub
//! command channel, serial console, local buttons) that the
//! [`ControlService`](super::service::ControlService) interprets.

use crate::config::SystemConfig;

/// Commands that external adapters can send into the controller core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    /// Change the cabinet setpoint. Validated before it takes effect.
    SetTarget(f32),

    /// Start or cancel turbo mode.
    SetTurbo(bool),

    /// Replace the whole configuration. Validated before it takes effect.
    UpdateConfig(SystemConfig),

    /// Clear a latched weld / locked-rotor alarm after service.
    ResetFatal,

    /// Erase every fault queue.
    ClearFaultLog,

    /// Flush durable state on the next tick.
    SaveState,
}
