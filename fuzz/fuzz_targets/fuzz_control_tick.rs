//! Fuzz target: full control pass
//!
//! Drives `ControlService::tick` with arbitrary probe, power and timing
//! sequences and verifies:
//! - no panics for NaN, infinite or missing readings
//! - the effective hysteresis stays within its configured bounds
//! - a weld alarm only ever appears while the relay is logically OFF
//!
//! cargo fuzz run fuzz_control_tick

#![no_main]

use fridgeguard::adapters::memory_store::MemoryStore;
use fridgeguard::adapters::time::ManualClock;
use fridgeguard::alarms::Alarm;
use fridgeguard::app::events::AppEvent;
use fridgeguard::app::ports::{Channel, EventSink, RelayPort, SensorPort};
use fridgeguard::app::service::ControlService;
use fridgeguard::config::SystemConfig;
use fridgeguard::error::RelayError;
use futures_lite::future::block_on;
use libfuzzer_sys::fuzz_target;

#[derive(Default)]
struct Scripted {
    air: Option<f32>,
    evap: Option<f32>,
    watts: Option<f32>,
    fail: bool,
}

impl SensorPort for Scripted {
    async fn read_temperature(&mut self, channel: Channel) -> Option<f32> {
        match channel {
            Channel::Air => self.air,
            Channel::Evaporator => self.evap,
        }
    }

    fn read_power(&mut self) -> Option<f32> {
        self.watts
    }
}

impl RelayPort for Scripted {
    fn set_relay(&mut self, _on: bool) -> Result<(), RelayError> {
        if self.fail { Err(RelayError::Timeout) } else { Ok(()) }
    }
}

struct Discard;

impl EventSink for Discard {
    fn emit(&mut self, _event: &AppEvent) {}
}

/// Map one byte onto a reading, with the edge cases well represented.
fn reading(b: u8, scale: f32) -> Option<f32> {
    match b {
        0 => None,
        1 => Some(f32::NAN),
        2 => Some(f32::INFINITY),
        _ => Some((f32::from(b) - 128.0) * scale),
    }
}

fuzz_target!(|data: &[u8]| {
    let cfg = SystemConfig::default();
    let mut svc = ControlService::new(cfg.clone());
    let mut hw = Scripted::default();
    let clock = ManualClock::new(0);
    let mut store = MemoryStore::new();
    let mut sink = Discard;

    for frame in data.chunks_exact(5) {
        hw.air = reading(frame[0], 0.25);
        hw.evap = reading(frame[1], 0.25);
        hw.watts = reading(frame[2], 10.0);
        hw.fail = frame[3] & 1 == 1;
        clock.advance(u64::from(frame[4]) * 10 + 1);

        let relay_before = svc.switch().is_on();
        let prev_alarm = svc.alarms().current();
        let out = block_on(svc.tick(&mut hw, &clock, &mut store, &mut sink));

        let band = svc.hysteresis().effective_c(svc.config());
        assert!(band >= cfg.hyst_min_c && band <= cfg.hyst_max_c);
        if out.alarm == Alarm::Weld && prev_alarm != Alarm::Weld {
            assert!(!relay_before);
        }
    }
});
