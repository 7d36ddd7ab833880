//! Simulated refrigerator plant.
//!
//! [`SimFridge`] implements both [`SensorPort`] and [`RelayPort`] on top of
//! a two-node thermal model (cabinet air and evaporator coil) so the
//! control service can be exercised on the host. Hardware faults can be
//! injected at any time with [`SimFridge::inject`].
//!
//! The model is deliberately coarse: first-order lags, forward-Euler
//! integration, no randomness. It is good enough to produce realistic
//! cycle lengths and fault signatures, not to predict a real cabinet.

use log::info;

use crate::app::ports::{Channel, RelayPort, SensorPort};
use crate::error::RelayError;

/// Steady-state coil temperature while the compressor pumps normally.
const EVAP_RUNNING_C: f32 = -18.0;
/// Coil time constant while pumping (s).
const EVAP_TAU_SECS: f32 = 240.0;
/// Coil time constant once the compressor stops and the fan keeps
/// blowing cabinet air over it (s).
const EVAP_IDLE_TAU_SECS: f32 = 60.0;
/// Cabinet ↔ room time constant (s).
const LEAK_TAU_SECS: f32 = 9000.0;
/// Cabinet ↔ coil time constant (s).
const COIL_TAU_SECS: f32 = 2400.0;

const RUN_WATTS: f32 = 110.0;
const LOCKED_WATTS: f32 = 1300.0;
const NO_START_WATTS: f32 = 4.0;

/// Hardware faults the simulator can reproduce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimFault {
    /// Relay contacts stuck closed: the compressor ignores OFF.
    WeldedContacts,
    /// Seized motor: draws stall current and moves no heat.
    LockedRotor,
    /// Motor never starts (failed start capacitor): almost no power.
    NoStart,
    /// Refrigerant loss: compressor runs, coil barely cools.
    RefrigerantLoss,
    /// Air probe off the bus.
    AirProbeDead,
    /// Air probe frozen at its last value.
    AirProbeStuck,
    /// Relay firmware rejects every command.
    RelayNack,
}

/// Two-node thermal model of a refrigerator cabinet.
#[derive(Debug, Clone)]
pub struct SimFridge {
    pub ambient_c: f32,
    cabinet_c: f32,
    evap_c: f32,
    relay_closed: bool,
    faults: Vec<SimFault>,
    frozen_air_c: Option<f32>,
    power_meter: bool,
    relay_commands: u32,
}

impl SimFridge {
    /// Start with cabinet and coil at room temperature.
    pub fn new(ambient_c: f32) -> Self {
        Self {
            ambient_c,
            cabinet_c: ambient_c,
            evap_c: ambient_c,
            relay_closed: false,
            faults: Vec::new(),
            frozen_air_c: None,
            power_meter: true,
            relay_commands: 0,
        }
    }

    /// Override the starting cabinet temperature.
    #[must_use]
    pub fn with_cabinet(mut self, cabinet_c: f32) -> Self {
        self.cabinet_c = cabinet_c;
        self.evap_c = cabinet_c;
        self
    }

    /// Remove the power meter; `read_power` then always returns `None`.
    #[must_use]
    pub fn without_power_meter(mut self) -> Self {
        self.power_meter = false;
        self
    }

    pub fn inject(&mut self, fault: SimFault) {
        if !self.faults.contains(&fault) {
            info!("SIM   | injecting {fault:?}");
            if fault == SimFault::AirProbeStuck {
                self.frozen_air_c = Some(self.cabinet_c);
            }
            self.faults.push(fault);
        }
    }

    pub fn clear(&mut self, fault: SimFault) {
        self.faults.retain(|f| *f != fault);
        if fault == SimFault::AirProbeStuck {
            self.frozen_air_c = None;
        }
    }

    pub fn has(&self, fault: SimFault) -> bool {
        self.faults.contains(&fault)
    }

    pub fn cabinet_c(&self) -> f32 {
        self.cabinet_c
    }

    pub fn evap_c(&self) -> f32 {
        self.evap_c
    }

    /// Contacts physically closed (commanded ON, or welded).
    pub fn compressor_powered(&self) -> bool {
        self.relay_closed || self.has(SimFault::WeldedContacts)
    }

    pub fn relay_commands(&self) -> u32 {
        self.relay_commands
    }

    /// Integrate the model over `secs` seconds.
    pub fn advance(&mut self, secs: u32) {
        for _ in 0..secs {
            self.step(1.0);
        }
    }

    fn pumping(&self) -> bool {
        self.compressor_powered() && !self.has(SimFault::LockedRotor) && !self.has(SimFault::NoStart)
    }

    fn step(&mut self, dt: f32) {
        let (coil_target, tau) = if !self.pumping() {
            (self.cabinet_c, EVAP_IDLE_TAU_SECS)
        } else if self.has(SimFault::RefrigerantLoss) {
            (self.cabinet_c - 1.0, EVAP_TAU_SECS)
        } else {
            (EVAP_RUNNING_C, EVAP_TAU_SECS)
        };
        self.evap_c += (coil_target - self.evap_c) * dt / tau;
        self.cabinet_c += ((self.ambient_c - self.cabinet_c) / LEAK_TAU_SECS
            + (self.evap_c - self.cabinet_c) / COIL_TAU_SECS)
            * dt;
    }
}

impl SensorPort for SimFridge {
    async fn read_temperature(&mut self, channel: Channel) -> Option<f32> {
        match channel {
            Channel::Air if self.has(SimFault::AirProbeDead) => None,
            Channel::Air => Some(self.frozen_air_c.unwrap_or(self.cabinet_c)),
            Channel::Evaporator => Some(self.evap_c),
        }
    }

    fn read_power(&mut self) -> Option<f32> {
        if !self.power_meter {
            return None;
        }
        let watts = if !self.compressor_powered() {
            0.0
        } else if self.has(SimFault::LockedRotor) {
            LOCKED_WATTS
        } else if self.has(SimFault::NoStart) {
            NO_START_WATTS
        } else {
            RUN_WATTS
        };
        Some(watts)
    }
}

impl RelayPort for SimFridge {
    fn set_relay(&mut self, on: bool) -> Result<(), RelayError> {
        self.relay_commands += 1;
        if self.has(SimFault::RelayNack) {
            return Err(RelayError::Nack);
        }
        self.relay_closed = on;
        Ok(())
    }
}
