//! FridgeGuard simulator: main entry point
//!
//! Runs the controller core against the simulated plant in fast-forward.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  SimFridge          LogEventSink   MemoryStore   ManualClock   │
//! │  (Sensor+Relay)     (EventSink)    (Config+Kv)   (Clock)       │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │            ControlService (pure logic)                 │    │
//! │  │  Decision · Guards · Protection · Alarms · Adaptive    │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ```text
//! fridgeguard-sim [--hours N] [--ambient C] [--config cfg.json]
//!                 [--telemetry-secs N] [--fault NAME@HOUR]...
//! ```
//!
//! Fault names: `weld`, `locked-rotor`, `no-start`, `refrigerant`,
//! `probe-dead`, `probe-stuck`, `nack`. Log level follows `RUST_LOG`.
#![deny(unused_must_use)]

use anyhow::{Context, Result, bail};
use futures_lite::future::block_on;
use log::info;
use tracing_subscriber::EnvFilter;

use fridgeguard::adapters::log_sink::LogEventSink;
use fridgeguard::adapters::memory_store::MemoryStore;
use fridgeguard::adapters::sim::{SimFault, SimFridge};
use fridgeguard::adapters::time::ManualClock;
use fridgeguard::alarms::Severity;
use fridgeguard::app::events::AppEvent;
use fridgeguard::app::ports::{Clock, ConfigPort, EventSink};
use fridgeguard::app::service::ControlService;
use fridgeguard::config::SystemConfig;

// ── Command line ──────────────────────────────────────────────

struct Args {
    hours: u32,
    ambient_c: f32,
    config: Option<String>,
    telemetry_secs: u64,
    faults: Vec<(SimFault, u64)>,
}

fn parse_fault(arg: &str) -> Result<(SimFault, u64)> {
    let (name, hour) = arg
        .split_once('@')
        .with_context(|| format!("fault '{arg}' must be NAME@HOUR"))?;
    let fault = match name {
        "weld" => SimFault::WeldedContacts,
        "locked-rotor" => SimFault::LockedRotor,
        "no-start" => SimFault::NoStart,
        "refrigerant" => SimFault::RefrigerantLoss,
        "probe-dead" => SimFault::AirProbeDead,
        "probe-stuck" => SimFault::AirProbeStuck,
        "nack" => SimFault::RelayNack,
        other => bail!("unknown fault '{other}'"),
    };
    let hour: f32 = hour
        .parse()
        .with_context(|| format!("bad hour in fault '{arg}'"))?;
    Ok((fault, (hour * 3600.0) as u64))
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        hours: 24,
        ambient_c: 22.0,
        config: None,
        telemetry_secs: 900,
        faults: Vec::new(),
    };
    let mut it = std::env::args().skip(1);
    while let Some(flag) = it.next() {
        let mut value = || it.next().with_context(|| format!("{flag} needs a value"));
        match flag.as_str() {
            "--hours" => args.hours = value()?.parse().context("--hours")?,
            "--ambient" => args.ambient_c = value()?.parse().context("--ambient")?,
            "--config" => args.config = Some(value()?),
            "--telemetry-secs" => {
                args.telemetry_secs = value()?.parse().context("--telemetry-secs")?;
            }
            "--fault" => args.faults.push(parse_fault(&value()?)?),
            other => bail!("unknown argument '{other}'"),
        }
    }
    Ok(args)
}

fn load_config(path: Option<&str>, store: &MemoryStore) -> Result<SystemConfig> {
    let Some(path) = path else {
        return Ok(store.load()?);
    };
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    let config: SystemConfig =
        serde_json::from_str(&text).with_context(|| format!("parsing {path}"))?;
    config.validate()?;
    store.save(&config)?;
    Ok(config)
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("FridgeGuard simulator v{}", env!("CARGO_PKG_VERSION"));

    let args = parse_args()?;

    // ── 1. Storage + config ───────────────────────────────────
    let mut store = MemoryStore::new();
    let config = load_config(args.config.as_deref(), &store)?;
    let interval = config.control_interval_secs;

    // ── 2. Adapters ───────────────────────────────────────────
    let mut plant = SimFridge::new(args.ambient_c);
    let clock = ManualClock::new(0).with_wall_clock(0);
    let mut sink = LogEventSink::new();

    // ── 3. Service ────────────────────────────────────────────
    let mut svc = ControlService::restore(config, &store, clock.now_secs());
    svc.start(&mut plant, clock.now_secs(), &mut sink);

    let mut pending = args.faults;
    pending.sort_by_key(|(_, at)| *at);
    let end = u64::from(args.hours) * 3600;
    let mut next_telemetry = 0;

    // ── 4. Fast-forward loop ──────────────────────────────────
    while clock.now_secs() < end {
        let now = clock.now_secs();
        while let Some(&(fault, at)) = pending.first() {
            if at > now {
                break;
            }
            plant.inject(fault);
            pending.remove(0);
        }

        block_on(svc.tick(&mut plant, &clock, &mut store, &mut sink));

        if now >= next_telemetry {
            sink.emit(&AppEvent::Telemetry(svc.telemetry(now)));
            next_telemetry = now + args.telemetry_secs;
        }
        svc.save_config_if_dirty(&store)?;

        plant.advance(interval);
        clock.advance(u64::from(interval));
    }

    // ── 5. Shutdown ───────────────────────────────────────────
    svc.flush(&mut store, clock.now_secs())?;

    let m = svc.metrics();
    info!(
        "done: {}h simulated, {} cycles, duty {:.1}%, cabinet {:.1}C, hysteresis \u{00b1}{:.2}",
        args.hours,
        m.lifetime_cycles,
        m.lifetime_duty_pct(),
        plant.cabinet_c(),
        svc.hysteresis().effective_c(svc.config()),
    );
    for sev in Severity::ALL {
        for e in svc.alarms().fault_log().queue(sev).entries() {
            info!("log {sev:?}: {} @{}s {}", e.alarm, e.timestamp, e.detail);
        }
    }
    Ok(())
}
