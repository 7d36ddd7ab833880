//! Mock hardware adapter for integration tests.
//!
//! Serves scripted probe and power values and records every relay
//! command so tests can assert on the full command history without a
//! thermal model.

use fridgeguard::adapters::memory_store::MemoryStore;
use fridgeguard::adapters::time::ManualClock;
use fridgeguard::app::events::AppEvent;
use fridgeguard::app::ports::{Channel, Clock, EventSink, RelayPort, SensorPort};
use fridgeguard::app::service::{ControlService, TickOutcome};
use fridgeguard::config::SystemConfig;
use fridgeguard::error::RelayError;
use futures_lite::future::block_on;

// ── MockHardware ──────────────────────────────────────────────

pub struct MockHardware {
    pub air: Option<f32>,
    pub evap: Option<f32>,
    /// Power reported while the relay is closed; an open relay reads 0 W.
    pub watts_on: Option<f32>,
    pub relay_on: bool,
    pub commands: Vec<bool>,
    pub fail_commands: bool,
}

#[allow(dead_code)]
impl MockHardware {
    pub fn new(air: f32) -> Self {
        Self {
            air: Some(air),
            evap: Some(air - 8.0),
            watts_on: Some(120.0),
            relay_on: false,
            commands: Vec::new(),
            fail_commands: false,
        }
    }

    /// Set the air probe and keep the coil a healthy 8 °C colder.
    pub fn set_air(&mut self, t: f32) {
        self.air = Some(t);
        self.evap = Some(t - 8.0);
    }
}

impl SensorPort for MockHardware {
    async fn read_temperature(&mut self, channel: Channel) -> Option<f32> {
        match channel {
            Channel::Air => self.air,
            Channel::Evaporator => self.evap,
        }
    }

    fn read_power(&mut self) -> Option<f32> {
        if self.relay_on {
            self.watts_on
        } else {
            Some(0.0)
        }
    }
}

impl RelayPort for MockHardware {
    fn set_relay(&mut self, on: bool) -> Result<(), RelayError> {
        self.commands.push(on);
        if self.fail_commands {
            return Err(RelayError::Nack);
        }
        self.relay_on = on;
        Ok(())
    }
}

// ── RecordingSink ─────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Harness ───────────────────────────────────────────────────

/// Config with the slow-moving detectors switched off so scripted
/// temperature steps only exercise what a test is about.
pub fn quiet_config() -> SystemConfig {
    SystemConfig {
        ema_alpha: 0.99,
        door_detect_enabled: false,
        stuck_detect_enabled: false,
        dyn_defrost_enabled: false,
        cooling_check_enabled: false,
        ..SystemConfig::default()
    }
}

pub struct Harness {
    pub svc: ControlService,
    pub hw: MockHardware,
    pub clock: ManualClock,
    pub store: MemoryStore,
    pub sink: RecordingSink,
}

#[allow(dead_code)]
impl Harness {
    pub fn new(config: SystemConfig, air: f32) -> Self {
        Self::with_clock(config, air, ManualClock::new(1000))
    }

    pub fn with_clock(config: SystemConfig, air: f32, clock: ManualClock) -> Self {
        let mut hw = MockHardware::new(air);
        let mut sink = RecordingSink::default();
        let mut svc = ControlService::new(config);
        svc.start(&mut hw, clock.now_secs(), &mut sink);
        Self {
            svc,
            hw,
            clock,
            store: MemoryStore::new(),
            sink,
        }
    }

    pub fn now(&self) -> u64 {
        self.clock.now_secs()
    }

    /// One control pass, then advance the clock by one interval.
    pub fn tick(&mut self) -> TickOutcome {
        let out = block_on(self.svc.tick(
            &mut self.hw,
            &self.clock,
            &mut self.store,
            &mut self.sink,
        ));
        self.clock
            .advance(u64::from(self.svc.config().control_interval_secs));
        out
    }

    /// Tick until `pred` holds or `max_ticks` pass. Returns the matching outcome.
    pub fn tick_until(
        &mut self,
        max_ticks: usize,
        pred: impl Fn(&TickOutcome) -> bool,
    ) -> Option<TickOutcome> {
        for _ in 0..max_ticks {
            let out = self.tick();
            if pred(&out) {
                return Some(out);
            }
        }
        None
    }
}
