//! FridgeGuard controller core.
//!
//! Decides once per control tick whether the compressor relay should be
//! energised, while protecting the compressor and detecting hardware
//! faults. Everything hardware-facing goes through the port traits in
//! [`app::ports`]; the modules below are pure logic and are exercised
//! directly by the integration tests.

#![deny(unused_must_use)]

pub mod adapters;
pub mod alarms;
pub mod app;
pub mod config;
pub mod control;
pub mod error;
pub mod metrics;
pub mod persist;
pub mod protection;
pub mod sensors;
