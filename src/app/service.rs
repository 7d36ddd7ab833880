//! Control service: the hexagonal core.
//!
//! [`ControlService`] owns every piece of controller state and runs one
//! control pass per call to [`tick`](ControlService::tick). All I/O flows
//! through port traits injected at call sites, making the entire service
//! testable with mock adapters.
//!
//! ```text
//!   SensorPort ──▶ ┌─────────────────────────────────────┐ ──▶ EventSink
//!                  │           ControlService            │
//!    RelayPort ◀── │ sensors · protection · alarms       │ ◀─▶ StoragePort
//!        Clock ──▶ │ decision · switch · metrics · hyst  │
//!                  └─────────────────────────────────────┘
//! ```
//!
//! ## Tick order
//!
//! 1. Read air, then evaporator (both awaited), then power.
//! 2. Smooth and health-check the samples.
//! 3. Advance feature timers (turbo, door, defrost).
//! 4. Re-derive alarms: clear non-fatal, sensor health, detectors,
//!    high-temp timer, edge detection. Fatal faults are flushed inline.
//! 5. Emergency OFF for locked rotor / ghost run.
//! 6. Decide, then apply through the timing guards.
//! 7. Account metrics; a closed hour feeds the adaptive hysteresis.
//! 8. Periodic flush of durable state.

use log::{debug, info, warn};

use crate::alarms::{Alarm, AlarmManager, EdgeSnapshot, Severity};
use crate::config::SystemConfig;
use crate::control::decision::{self, ControlStatus, Decision, DecisionInputs};
use crate::control::features::Features;
use crate::control::hysteresis::{AdaptiveHysteresis, HysteresisOutcome};
use crate::control::switch::{SwitchExecutor, SwitchOutcome, SwitchRequest};
use crate::error;
use crate::metrics::MetricsAccumulator;
use crate::persist::{self, DurableState};
use crate::protection::{ProtectionInputs, ProtectionReport, ProtectionSupervisor};
use crate::sensors::{RawReadings, SensorPipeline, SensorReport};

use super::commands::AppCommand;
use super::events::{AppEvent, TelemetryData};
use super::ports::{Channel, Clock, ConfigError, ConfigPort, EventSink, RelayPort, SensorPort, StoragePort};

/// Result of one control pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickOutcome {
    pub decision: Decision,
    pub switch: SwitchOutcome,
    pub alarm: Alarm,
    /// Detectors that fired this tick.
    pub protection: ProtectionReport,
    pub relay_on: bool,
}

/// Timers owned by the tick driver rather than by any one detector.
#[derive(Debug, Clone, Copy, Default)]
struct TickTimers {
    /// Consecutive running time with power inside limits.
    normal_power_secs: u32,
    last_flush_secs: u64,
}

// ───────────────────────────────────────────────────────────────
// ControlService
// ───────────────────────────────────────────────────────────────

/// The control service orchestrates all domain logic.
pub struct ControlService {
    config: SystemConfig,
    sensors: SensorPipeline,
    protection: ProtectionSupervisor,
    alarms: AlarmManager,
    features: Features,
    hysteresis: AdaptiveHysteresis,
    switch: SwitchExecutor,
    metrics: MetricsAccumulator,
    timers: TickTimers,
    last_report: SensorReport,
    last_status: Option<ControlStatus>,
    was_blocked: bool,
    tick_count: u64,
    config_dirty: bool,
    state_dirty: bool,
}

impl ControlService {
    /// Construct with neutral state (first boot).
    pub fn new(config: SystemConfig) -> Self {
        let fresh = DurableState::fresh(config.default_hysteresis_c);
        Self::from_state(config, fresh, 0)
    }

    /// Construct from previously persisted state.
    ///
    /// Relay timestamps are pulled back to `now` so a restarted clock
    /// cannot hold the guards closed.
    pub fn from_state(config: SystemConfig, state: DurableState, now: u64) -> Self {
        Self {
            sensors: SensorPipeline::new(),
            protection: ProtectionSupervisor::new(),
            alarms: AlarmManager::restore(state.fatal, state.faults),
            features: Features::new(),
            hysteresis: AdaptiveHysteresis::new(state.hysteresis_c),
            switch: SwitchExecutor::new(state.relay.rebased(now)),
            metrics: state.metrics,
            timers: TickTimers {
                normal_power_secs: 0,
                last_flush_secs: now,
            },
            last_report: SensorReport::default(),
            last_status: None,
            was_blocked: false,
            tick_count: 0,
            config_dirty: false,
            state_dirty: false,
            config,
        }
    }

    /// Load durable state from `storage` and construct.
    pub fn restore(config: SystemConfig, storage: &dyn StoragePort, now: u64) -> Self {
        let state = persist::load(storage, config.default_hysteresis_c);
        if state.fatal.is_fatal() {
            warn!("restored latched fatal alarm: {}", state.fatal);
        }
        Self::from_state(config, state, now)
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Drive the relay to its restored logical state and announce start-up.
    ///
    /// A latched fatal alarm with the relay logically ON is resolved with
    /// an emergency OFF, since the switch executor refuses normal
    /// transitions while a fatal alarm is active.
    pub fn start(&mut self, relay: &mut impl RelayPort, now: u64, sink: &mut impl EventSink) {
        if self.alarms.has_fatal() && self.switch.is_on() {
            if let SwitchOutcome::Switched(t) =
                self.switch.emergency_off(relay, now, None, &self.config)
            {
                sink.emit(&AppEvent::RelaySwitched(t));
            }
        } else if let Err(e) = relay.set_relay(self.switch.is_on()) {
            warn!("initial relay command failed: {e}");
        }
        sink.emit(&AppEvent::Started {
            relay_on: self.switch.is_on(),
            fatal: self.alarms.fatal(),
        });
        info!(
            "ControlService started, relay {}, target {:.1}C ±{:.2}",
            if self.switch.is_on() { "ON" } else { "OFF" },
            self.config.target_temp_c,
            self.hysteresis.effective_c(&self.config)
        );
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one full control cycle.
    ///
    /// The `hw` parameter satisfies **both** [`SensorPort`] and
    /// [`RelayPort`], which avoids a double mutable borrow while keeping
    /// the port boundary explicit. Nothing after the sensor reads runs
    /// until both temperatures are in.
    pub async fn tick<H, C, S, E>(
        &mut self,
        hw: &mut H,
        clock: &C,
        storage: &mut S,
        sink: &mut E,
    ) -> TickOutcome
    where
        H: SensorPort + RelayPort,
        C: Clock,
        S: StoragePort,
        E: EventSink,
    {
        self.tick_count += 1;
        let now = clock.now_secs();
        let cfg = &self.config;
        let tick_secs = cfg.control_interval_secs;

        // 1. Acquire
        let air = hw.read_temperature(Channel::Air).await;
        let evap = if cfg.evap_sensor_enabled {
            hw.read_temperature(Channel::Evaporator).await
        } else {
            None
        };
        let watts = if cfg.power_sensor_enabled {
            hw.read_power()
        } else {
            None
        };

        // 2. Smooth + health
        let report = self.sensors.process(&RawReadings { air, evap, watts }, now, cfg);
        let relay = self.switch.state();

        // 3. Feature timers
        let flags = self
            .features
            .update(now, &report, &relay, clock.minute_of_day(), cfg);

        // 4. Alarms
        let prev_alarm = self.alarms.current();
        self.alarms.clear_non_fatal();
        self.alarms.apply_sensor_health(report.failed, report.stuck);

        let trusted = |v: Option<f32>| if report.failed { None } else { v };
        // A failed probe leaves its last good value behind; never snapshot it.
        let switch_c = trusted(report.control_c);
        let prot = self.protection.evaluate(
            &ProtectionInputs {
                now,
                relay,
                control_c: trusted(report.control_c),
                evap_c: trusted(report.evap_c),
                watts: report.watts,
                weld_snapshot_c: self.switch.weld_snapshot_c(),
                turbo_active: flags.turbo,
            },
            cfg,
            &mut self.alarms,
        );
        self.track_normal_power(prot.power_normal, prot.requires_emergency_off());

        let high_temp_suppressed =
            flags.scheduled_defrost || flags.dynamic_defrost || flags.turbo || report.failed;
        self.alarms
            .update_high_temp(report.control_c, high_temp_suppressed, tick_secs, &self.config);

        let edge = EdgeSnapshot {
            control_c: report.control_c,
            raw_c: report.raw_c,
            evap_c: report.evap_c,
            watts: if relay.is_on { report.watts } else { None },
            sensor_errors: self.sensors.last_failure_errors(),
        };
        let closed = self.alarms.process_edges(prev_alarm, now, &edge);
        let alarm = self.alarms.current();

        if self.alarms.take_fatal_unsaved() {
            self.flush_fatal(storage, sink);
        }
        if let Some((severity, entry)) = closed {
            sink.emit(&AppEvent::FaultLogged { severity, entry });
        }
        if alarm != prev_alarm {
            if prev_alarm.is_active() {
                sink.emit(&AppEvent::AlarmCleared(prev_alarm));
            }
            if alarm.is_active() {
                sink.emit(&AppEvent::AlarmRaised(alarm));
            }
        }

        // 5. Emergency OFF
        let emergency = if prot.requires_emergency_off() {
            Some(
                self.switch
                    .emergency_off(hw, now, switch_c, &self.config),
            )
        } else {
            None
        };

        // 6. Decide + switch
        let decision = decision::decide(
            &DecisionInputs {
                now,
                control_c: report.control_c,
                alarm,
                relay: self.switch.state(),
                band_c: self.hysteresis.effective_c(&self.config),
                features: flags,
            },
            &self.config,
        );
        if flags.scheduled_defrost {
            self.features.cancel_dynamic_defrost();
        }

        let outcome = match emergency {
            Some(o) => o,
            None => self.switch.apply(
                hw,
                &SwitchRequest {
                    want_on: decision.want_relay_on(),
                    now,
                    is_limp: decision.is_limp(),
                    alarm,
                    control_c: switch_c,
                },
                &self.config,
            ),
        };
        self.report_switch(&outcome, sink);

        let status = decision.status();
        if self.last_status != Some(status) {
            sink.emit(&AppEvent::StatusChanged {
                from: self.last_status,
                to: status,
            });
            self.last_status = Some(status);
        }

        // 7. Metrics + hourly adaptation
        let degraded = matches!(alarm, Alarm::SensorFail | Alarm::SensorStuck);
        if let Some(hour) = self
            .metrics
            .record_tick(tick_secs, self.switch.is_on(), degraded)
        {
            sink.emit(&AppEvent::HourRollover(hour));
            match hour.cycle_stats() {
                Some(stats) if !hour.degraded => {
                    let adjusted = self.hysteresis.evaluate(&stats, flags.turbo, &self.config);
                    if adjusted != HysteresisOutcome::None {
                        sink.emit(&AppEvent::HysteresisAdjusted {
                            outcome: adjusted,
                            band_c: self.hysteresis.effective_c(&self.config),
                        });
                    }
                }
                Some(_) => debug!("hour degraded by sensor alarm, skipping adaptation"),
                None => {}
            }
        }

        // 8. Periodic flush
        let flush_due = now.saturating_sub(self.timers.last_flush_secs)
            >= u64::from(self.config.persist_interval_secs);
        if flush_due || self.state_dirty {
            if let Err(e) = self.flush(storage, now) {
                warn!("state flush failed: {e}");
            }
        }

        self.last_report = report;
        TickOutcome {
            decision,
            switch: outcome,
            alarm,
            protection: prot,
            relay_on: self.switch.is_on(),
        }
    }

    // ── Command handling ──────────────────────────────────────

    /// Process an external command.
    ///
    /// Configuration changes are validated on a copy first; a rejected
    /// change leaves the live configuration untouched.
    pub fn handle_command(
        &mut self,
        cmd: AppCommand,
        now: u64,
        sink: &mut impl EventSink,
    ) -> Result<(), ConfigError> {
        match cmd {
            AppCommand::SetTarget(target_c) => {
                let candidate = SystemConfig {
                    target_temp_c: target_c,
                    ..self.config.clone()
                };
                self.apply_config(candidate, sink)?;
                info!("setpoint changed to {target_c:.1}C");
            }
            AppCommand::SetTurbo(on) => {
                self.features.set_turbo(on, now, &self.config);
            }
            AppCommand::UpdateConfig(candidate) => {
                self.apply_config(candidate, sink)?;
                info!("configuration updated at runtime");
            }
            AppCommand::ResetFatal => {
                if let Some(was) = self.alarms.reset_fatal() {
                    self.protection.reset_ghost_count();
                    sink.emit(&AppEvent::AlarmCleared(was));
                    self.state_dirty = true;
                }
            }
            AppCommand::ClearFaultLog => {
                self.alarms.clear_fault_log();
                self.state_dirty = true;
                info!("fault log cleared");
            }
            AppCommand::SaveState => {
                self.state_dirty = true;
            }
        }
        Ok(())
    }

    // ── Queries ───────────────────────────────────────────────

    /// Build a telemetry snapshot from the last completed tick.
    pub fn telemetry(&self, now: u64) -> TelemetryData {
        let turbo = self.features.turbo_active(now);
        TelemetryData {
            uptime_secs: now,
            status: self.last_status,
            alarm: self.alarms.current(),
            relay_on: self.switch.is_on(),
            control_c: self.last_report.control_c,
            evap_c: self.last_report.evap_c,
            watts: self.last_report.watts,
            target_c: if turbo {
                self.config.turbo_target_c
            } else {
                self.config.target_temp_c
            },
            band_c: if turbo {
                self.config.turbo_hysteresis_c
            } else {
                self.hysteresis.effective_c(&self.config)
            },
            turbo,
            sensor_errors: self.sensors.error_count(),
            ghost_count: self.protection.ghost_count(),
            lifetime_duty_pct: self.metrics.lifetime_duty_pct(),
            cycles: self.metrics.lifetime_cycles,
        }
    }

    pub fn alarms(&self) -> &AlarmManager {
        &self.alarms
    }

    pub fn metrics(&self) -> &MetricsAccumulator {
        &self.metrics
    }

    pub fn hysteresis(&self) -> &AdaptiveHysteresis {
        &self.hysteresis
    }

    pub fn protection(&self) -> &ProtectionSupervisor {
        &self.protection
    }

    pub fn switch(&self) -> &SwitchExecutor {
        &self.switch
    }

    pub fn features(&self) -> &Features {
        &self.features
    }

    pub fn sensors(&self) -> &SensorPipeline {
        &self.sensors
    }

    /// Total control ticks executed since startup.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    /// Snapshot of everything that is persisted.
    pub fn durable_state(&self) -> DurableState {
        DurableState {
            relay: self.switch.state(),
            fatal: self.alarms.fatal(),
            faults: self.alarms.fault_log().clone(),
            hysteresis_c: self.hysteresis.stored_c(),
            metrics: self.metrics.clone(),
        }
    }

    // ── Persistence ───────────────────────────────────────────

    /// Write all durable state now.
    pub fn flush(&mut self, storage: &mut impl StoragePort, now: u64) -> error::Result<()> {
        persist::save(storage, &self.durable_state())?;
        self.state_dirty = false;
        self.timers.last_flush_secs = now;
        Ok(())
    }

    /// Persist the configuration if a command changed it.
    /// Returns `Ok(true)` if the config was saved. A failed save keeps the
    /// dirty flag so the next call retries.
    pub fn save_config_if_dirty(&mut self, port: &impl ConfigPort) -> error::Result<bool> {
        if !self.config_dirty {
            return Ok(false);
        }
        port.save(&self.config)?;
        self.config_dirty = false;
        info!("config saved");
        Ok(true)
    }

    /// Whether the config has unsaved changes.
    pub fn is_config_dirty(&self) -> bool {
        self.config_dirty
    }

    // ── Internal ──────────────────────────────────────────────

    fn apply_config(
        &mut self,
        candidate: SystemConfig,
        sink: &mut impl EventSink,
    ) -> Result<(), ConfigError> {
        if let Err(e) = candidate.validate() {
            warn!("config change rejected: {e}");
            sink.emit(&AppEvent::CommandRejected(e));
            return Err(e);
        }
        self.config = candidate;
        self.config_dirty = true;
        Ok(())
    }

    fn flush_fatal(&mut self, storage: &mut impl StoragePort, sink: &mut impl EventSink) {
        if let Err(e) = persist::save_faults(storage, self.alarms.fatal(), self.alarms.fault_log()) {
            warn!("fatal fault flush failed: {e}");
        }
        if let Some(entry) = self.alarms.fault_log().queue(Severity::Fatal).newest() {
            sink.emit(&AppEvent::FaultLogged {
                severity: Severity::Fatal,
                entry: entry.clone(),
            });
        }
    }

    fn track_normal_power(&mut self, normal: bool, tripped: bool) {
        if normal {
            self.timers.normal_power_secs = self
                .timers
                .normal_power_secs
                .saturating_add(self.config.control_interval_secs);
            if self.timers.normal_power_secs >= self.config.ghost_reset_secs {
                self.protection.reset_ghost_count();
                self.timers.normal_power_secs = 0;
            }
        } else if tripped || self.protection.ghost_accum_secs() > 0 {
            self.timers.normal_power_secs = 0;
        }
    }

    fn report_switch(&mut self, outcome: &SwitchOutcome, sink: &mut impl EventSink) {
        let blocked = matches!(outcome, SwitchOutcome::Blocked { .. });
        match *outcome {
            SwitchOutcome::Switched(t) => {
                if t.run.is_some() {
                    self.metrics.record_cycle();
                }
                sink.emit(&AppEvent::RelaySwitched(t));
            }
            SwitchOutcome::Blocked { want_on, wait_secs } if !self.was_blocked => {
                debug!(
                    "relay {} held by guard for {wait_secs}s",
                    if want_on { "ON" } else { "OFF" }
                );
                sink.emit(&AppEvent::SwitchBlocked { want_on, wait_secs });
            }
            SwitchOutcome::Refused(a) => debug!("switch refused while {a} active"),
            _ => {}
        }
        self.was_blocked = blocked;
    }
}
