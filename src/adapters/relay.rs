//! GPIO relay driver.
//!
//! Drives the compressor relay coil through any `embedded-hal` 1.0
//! [`OutputPin`]. Boards with an inverting transistor stage energise the
//! coil on a low level; construct those with `active_low = true`.
//!
//! The pin write is the whole acknowledgment on this path: a write error
//! maps to [`RelayError::GpioWriteFailed`].

use embedded_hal::digital::OutputPin;
use log::{debug, warn};

use crate::app::ports::RelayPort;
use crate::error::RelayError;

pub struct GpioRelay<P> {
    pin: P,
    active_low: bool,
    energised: bool,
}

impl<P: OutputPin> GpioRelay<P> {
    pub fn new(pin: P, active_low: bool) -> Self {
        Self {
            pin,
            active_low,
            energised: false,
        }
    }

    /// Last level successfully written, as coil state.
    pub fn is_energised(&self) -> bool {
        self.energised
    }

    pub fn release(self) -> P {
        self.pin
    }
}

impl<P: OutputPin> RelayPort for GpioRelay<P> {
    fn set_relay(&mut self, on: bool) -> Result<(), RelayError> {
        let high = on != self.active_low;
        let res = if high {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        match res {
            Ok(()) => {
                self.energised = on;
                debug!("relay coil {}", if on { "energised" } else { "released" });
                Ok(())
            }
            Err(e) => {
                warn!("relay GPIO write failed: {e:?}");
                Err(RelayError::GpioWriteFailed)
            }
        }
    }
}
