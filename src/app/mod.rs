//! Application core: domain orchestration with no direct I/O.
//!
//! This module wires the sensor pipeline, protection detectors, alarm
//! manager, decision engine, switch executor and metrics into one
//! per-tick pass. All interaction with hardware happens through **port
//! traits** defined in [`ports`], keeping this layer fully testable
//! without real peripherals.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
