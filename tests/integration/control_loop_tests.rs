//! End-to-end control-loop tests: ControlService driven through the
//! port traits by scripted hardware and a manual clock.

use fridgeguard::adapters::memory_store::MemoryStore;
use fridgeguard::adapters::sim::SimFridge;
use fridgeguard::adapters::time::ManualClock;
use fridgeguard::alarms::{Alarm, Severity};
use fridgeguard::app::commands::AppCommand;
use fridgeguard::app::events::AppEvent;
use fridgeguard::app::ports::{Clock, ConfigError};
use fridgeguard::app::service::ControlService;
use fridgeguard::config::SystemConfig;
use fridgeguard::control::decision::{ControlStatus, Decision, OffReason};
use fridgeguard::control::switch::SwitchOutcome;
use fridgeguard::persist;
use futures_lite::future::block_on;

use super::mock_hw::{Harness, RecordingSink, quiet_config};

// ── Weld ──────────────────────────────────────────────────────

#[test]
fn weld_latches_after_turn_off_and_is_flushed_inline() {
    let cfg = SystemConfig {
        weld_wait_secs: 60,
        weld_window_secs: 300,
        weld_drop_c: 1.0,
        ..quiet_config()
    };
    let mut h = Harness::new(cfg, 8.0);
    assert!(h.tick().relay_on);

    h.hw.set_air(2.5);
    h.tick_until(100, |o| !o.relay_on).expect("relay never turned off");

    // Cabinet keeps cooling with the relay released.
    h.hw.set_air(1.0);
    let weld = h
        .tick_until(100, |o| o.alarm == Alarm::Weld)
        .expect("weld not detected");
    assert!(!weld.relay_on);
    assert!(weld.protection.weld);
    assert_eq!(h.svc.alarms().fault_log().queue(Severity::Fatal).len(), 1);
    assert_eq!(persist::load(&h.store, 1.0).fatal, Alarm::Weld);
    assert_eq!(
        h.sink.count(|e| matches!(
            e,
            AppEvent::FaultLogged {
                severity: Severity::Fatal,
                ..
            }
        )),
        1
    );

    // Latched: a warm cabinet no longer brings the compressor back.
    h.hw.set_air(9.0);
    for _ in 0..100 {
        let out = h.tick();
        assert!(!out.relay_on);
        assert_eq!(out.alarm, Alarm::Weld);
        assert_eq!(out.decision, Decision::ForceOff(OffReason::FatalAlarm(Alarm::Weld)));
    }
    assert_eq!(h.hw.commands, vec![false, true, false]);
}

// ── Sensor failure / limp ─────────────────────────────────────

#[test]
fn sensor_failure_enters_limp_and_recovery_reseeds() {
    let mut h = Harness::with_clock(quiet_config(), 4.0, ManualClock::new(3600));
    h.tick();

    h.hw.air = None;
    for _ in 0..4 {
        let out = h.tick();
        assert_ne!(out.alarm, Alarm::SensorFail);
        assert!(!out.decision.is_limp());
    }
    let out = h.tick();
    assert_eq!(out.alarm, Alarm::SensorFail);
    assert_eq!(out.decision, Decision::Limp { want_on: true });
    assert!(out.relay_on);

    // Blind duty cycle ends after limp_on_secs.
    let off = h.tick_until(200, |o| !o.relay_on).expect("limp never released");
    assert_eq!(off.decision, Decision::Limp { want_on: false });
    assert!(h.now() > 3600 + 600);

    h.hw.set_air(6.0);
    let out = h.tick();
    assert_eq!(out.alarm, Alarm::None);
    assert_eq!(h.svc.sensors().error_count(), 0);
    assert_eq!(h.svc.sensors().control_c(), Some(6.0));

    let logged = h
        .svc
        .alarms()
        .fault_log()
        .queue(Severity::Error)
        .newest()
        .expect("sensor failure not logged");
    assert_eq!(logged.alarm, Alarm::SensorFail);
    assert!(logged.detail.ends_with("read errors"), "{}", logged.detail);
}

#[test]
fn limp_shutdown_leaves_no_weld_reference() {
    let cfg = quiet_config();
    let ticks_past_window = cfg.weld_window_secs / cfg.control_interval_secs + 10;
    let mut h = Harness::with_clock(cfg, 8.0, ManualClock::new(3600));
    assert!(h.tick().relay_on);

    // Both probes drop out while the compressor runs.
    h.hw.air = None;
    h.hw.evap = None;
    h.tick_until(10, |o| o.alarm == Alarm::SensorFail)
        .expect("sensor failure not raised");
    let off = h
        .tick_until(200, |o| !o.relay_on)
        .expect("limp never released");
    assert_eq!(off.decision, Decision::Limp { want_on: false });
    assert_eq!(h.svc.switch().weld_snapshot_c(), None);

    // The cabinet cooled while blind; the probe returns colder than its
    // last good value, inside the weld window.
    h.hw.set_air(4.0);
    for _ in 0..ticks_past_window {
        let out = h.tick();
        assert_ne!(out.alarm, Alarm::Weld);
        assert!(!out.protection.weld);
    }
    assert!(!h.svc.alarms().has_fatal());
    assert!(h.svc.alarms().fault_log().queue(Severity::Fatal).is_empty());
}

// ── Power signature ───────────────────────────────────────────

#[test]
fn repeated_ghost_runs_escalate_to_locked_rotor() {
    let cfg = SystemConfig {
        ghost_trip_secs: 30,
        ghost_max_count: 3,
        power_startup_mask_secs: 10,
        ..quiet_config()
    };
    let mut h = Harness::new(cfg, 8.0);
    h.hw.watts_on = Some(3.0);

    let out = h
        .tick_until(600, |o| o.alarm == Alarm::LockedRotor)
        .expect("ghost runs never escalated");
    assert!(!out.relay_on);
    assert!(matches!(out.switch, SwitchOutcome::Switched(t) if t.emergency && !t.on));
    assert_eq!(h.sink.count(|e| *e == AppEvent::AlarmRaised(Alarm::Ghost)), 2);
    assert_eq!(h.svc.protection().ghost_count(), 3);

    let log = h.svc.alarms().fault_log();
    assert_eq!(log.queue(Severity::Warning).len(), 2);
    for e in log.queue(Severity::Warning).entries() {
        assert_eq!(e.alarm, Alarm::Ghost);
        assert!(e.detail.starts_with("3W for"), "{}", e.detail);
    }
    assert_eq!(
        log.queue(Severity::Fatal).newest().map(|e| e.alarm),
        Some(Alarm::LockedRotor)
    );
    assert_eq!(persist::load(&h.store, 1.0).fatal, Alarm::LockedRotor);
}

#[test]
fn sustained_normal_running_resets_ghost_count() {
    let cfg = SystemConfig {
        ghost_trip_secs: 30,
        ghost_max_count: 3,
        ghost_reset_secs: 600,
        power_startup_mask_secs: 10,
        ..quiet_config()
    };
    let mut h = Harness::new(cfg, 8.0);
    h.hw.watts_on = Some(3.0);
    h.tick_until(100, |o| o.alarm == Alarm::Ghost)
        .expect("first ghost run not detected");
    assert_eq!(h.svc.protection().ghost_count(), 1);

    // Back to normal draw, but not for long enough to forgive the trip.
    h.hw.watts_on = Some(120.0);
    h.tick_until(100, |o| o.relay_on).expect("relay never restarted");
    for _ in 0..60 {
        assert!(h.tick().relay_on);
    }
    assert_eq!(h.svc.protection().ghost_count(), 1);

    h.hw.watts_on = Some(3.0);
    h.tick_until(100, |o| o.alarm == Alarm::Ghost)
        .expect("second ghost run not detected");
    assert_eq!(h.svc.protection().ghost_count(), 2);

    // A full reset period of normal running clears the count.
    h.hw.watts_on = Some(120.0);
    h.tick_until(100, |o| o.relay_on).expect("relay never restarted");
    let restarted = h.now();
    while h.svc.protection().ghost_count() > 0 {
        assert!(h.tick().relay_on);
        assert!(h.now() - restarted < 800, "ghost count never reset");
    }
    assert!(h.now() - restarted >= 600);
    assert_eq!(h.svc.protection().ghost_accum_secs(), 0);
}

#[test]
fn stall_current_trips_locked_rotor_after_mask() {
    let cfg = SystemConfig {
        power_startup_mask_secs: 10,
        ..quiet_config()
    };
    let mut h = Harness::new(cfg, 8.0);
    h.hw.watts_on = Some(1500.0);

    let started = h.now();
    let out = h
        .tick_until(10, |o| o.alarm == Alarm::LockedRotor)
        .expect("locked rotor not detected");
    assert!(!out.relay_on);
    assert!(h.now() - started > 10);
    assert!(matches!(out.switch, SwitchOutcome::Switched(t) if t.emergency));
}

// ── High temperature ──────────────────────────────────────────

#[test]
fn high_temp_alarm_logs_peak_when_it_clears() {
    let cfg = SystemConfig {
        high_temp_delay_secs: 60,
        ..quiet_config()
    };
    let mut h = Harness::new(cfg, 12.0);

    let raised = h.tick_until(30, |o| o.alarm == Alarm::HighTemp);
    assert!(raised.is_some());
    assert!(h.svc.alarms().high_temp_accum_secs() > 60);

    h.hw.set_air(5.0);
    h.tick_until(5, |o| o.alarm == Alarm::None)
        .expect("high temp never cleared");
    assert_eq!(h.svc.alarms().high_temp_accum_secs(), 0);

    let entry = h
        .svc
        .alarms()
        .fault_log()
        .queue(Severity::Critical)
        .newest()
        .expect("no critical entry");
    assert_eq!(entry.alarm, Alarm::HighTemp);
    assert!(entry.detail.starts_with("peak 12.0C"), "{}", entry.detail);
}

// ── Defrost schedule ──────────────────────────────────────────

#[test]
fn scheduled_defrost_holds_relay_off_for_window() {
    let cfg = SystemConfig {
        sched_defrost_enabled: true,
        sched_defrost_start_min: 0,
        sched_defrost_duration_min: 30,
        ..quiet_config()
    };
    let clock = ManualClock::new(1000).with_wall_clock(0);
    let mut h = Harness::with_clock(cfg, 8.0, clock);

    let out = h.tick();
    assert_eq!(out.decision, Decision::ForceOff(OffReason::ScheduledDefrost));
    assert_eq!(out.decision.status(), ControlStatus::Defrost);
    assert!(!out.relay_on);

    h.tick_until(300, |o| o.relay_on)
        .expect("relay never came back after defrost");
    assert!(h.now() > 30 * 60);
}

#[test]
fn scheduled_window_cancels_dynamic_defrost_behind_door_pause() {
    let cfg = SystemConfig {
        ema_alpha: 0.3,
        door_detect_enabled: true,
        door_rise_c: 1.5,
        door_pause_secs: 600,
        dyn_defrost_enabled: true,
        sched_defrost_enabled: true,
        sched_defrost_start_min: 30,
        sched_defrost_duration_min: 60,
        ..quiet_config()
    };
    let clock = ManualClock::new(1000).with_wall_clock(0);
    let mut h = Harness::with_clock(cfg, 8.0, clock);
    h.hw.evap = Some(-25.0);

    h.tick();
    h.tick();
    assert!(h.svc.features().dynamic_defrost_active());

    // Warm air rush just before the window opens at 1800 s.
    while h.now() < 1700 {
        h.tick();
    }
    h.hw.air = Some(12.0);
    while h.now() < 1800 {
        h.tick();
    }
    assert!(h.svc.features().dynamic_defrost_active());

    let out = h.tick();
    assert_eq!(out.decision, Decision::ForceOff(OffReason::DoorPause));
    assert!(!h.svc.features().dynamic_defrost_active());
}

// ── Relay command failure ─────────────────────────────────────

#[test]
fn failed_relay_command_still_moves_logical_state() {
    let mut h = Harness::new(quiet_config(), 8.0);
    h.hw.fail_commands = true;

    let out = h.tick();
    assert!(out.relay_on);
    assert!(matches!(
        out.switch,
        SwitchOutcome::Switched(t) if t.command_error.is_some()
    ));
    assert!(!h.hw.relay_on);
}

// ── Commands ──────────────────────────────────────────────────

#[test]
fn rejected_config_leaves_control_untouched() {
    let mut h = Harness::new(quiet_config(), 6.5);
    let now = h.now();

    let bad = SystemConfig {
        hyst_min_c: 4.0,
        hyst_max_c: 2.0,
        ..quiet_config()
    };
    let err = h
        .svc
        .handle_command(AppCommand::UpdateConfig(bad), now, &mut h.sink)
        .unwrap_err();
    assert!(matches!(err, ConfigError::ValidationFailed(_)));
    assert_eq!(*h.svc.config(), quiet_config());

    h.svc
        .handle_command(AppCommand::SetTarget(6.0), now, &mut h.sink)
        .unwrap();
    let out = h.tick();
    assert!(matches!(
        out.decision,
        Decision::Hysteresis { target_c, held: true, .. } if target_c == 6.0
    ));
    assert!(!out.relay_on);
}

// ── Persistence ───────────────────────────────────────────────

#[test]
fn durable_state_survives_restart() {
    let mut h = Harness::new(quiet_config(), 8.0);
    assert!(h.tick().relay_on);
    let now = h.now();
    h.svc
        .handle_command(AppCommand::SaveState, now, &mut h.sink)
        .unwrap();
    h.tick();
    let saved = h.svc.durable_state();

    let restored = ControlService::restore(quiet_config(), &h.store, 50);
    let state = restored.durable_state();
    assert_eq!(state.relay, saved.relay.rebased(50));
    assert!(state.relay.is_on);
    assert_eq!(state.metrics, saved.metrics);
    assert_eq!(state.hysteresis_c, saved.hysteresis_c);
    assert_eq!(state.fatal, Alarm::None);
}

// ── Simulated plant ───────────────────────────────────────────

#[test]
fn guard_times_hold_over_simulated_half_day() {
    let cfg = SystemConfig::default();
    let interval = cfg.control_interval_secs;
    let mut plant = SimFridge::new(22.0).with_cabinet(6.0);
    let clock = ManualClock::new(0);
    let mut store = MemoryStore::new();
    let mut sink = RecordingSink::default();
    let mut svc = ControlService::new(cfg.clone());
    svc.start(&mut plant, 0, &mut sink);

    while clock.now_secs() < 12 * 3600 {
        let out = block_on(svc.tick(&mut plant, &clock, &mut store, &mut sink));
        assert!(!out.alarm.is_fatal(), "unexpected {}", out.alarm);
        let band = svc.hysteresis().effective_c(svc.config());
        assert!((cfg.hyst_min_c..=cfg.hyst_max_c).contains(&band));
        plant.advance(interval);
        clock.advance(u64::from(interval));
    }

    let switches: Vec<_> = sink
        .events
        .iter()
        .filter_map(|e| match e {
            AppEvent::RelaySwitched(t) => Some(*t),
            _ => None,
        })
        .collect();
    assert!(switches.len() > 10, "only {} transitions", switches.len());
    for pair in switches.windows(2) {
        let gap = pair[1].at - pair[0].at;
        let guard = if pair[1].on { cfg.min_off_secs } else { cfg.min_on_secs };
        assert!(gap >= u64::from(guard), "{:?} -> {:?}", pair[0], pair[1]);
    }
    assert!(svc.metrics().lifetime_cycles > 5);
    assert!(plant.cabinet_c() < 8.0 && plant.cabinet_c() > 1.0);
}
