//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the `log` facade (UART on the device, `tracing-subscriber` in the
//! simulator). A future MQTT adapter would implement the same trait.

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the console.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

fn temp(v: Option<f32>) -> String {
    v.map_or_else(|| "--".into(), |t| format!("{t:.1}"))
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Telemetry(t) => {
                info!(
                    "TELEM | status={} | T={}\u{00b0}C evap={}\u{00b0}C | P={}W | \
                     set={:.1}\u{00b1}{:.2}{} | relay={} | alarm={} | err={} ghost={} | \
                     duty={:.0}% cycles={}",
                    t.status.map_or_else(|| "-".into(), |s| s.to_string()),
                    temp(t.control_c),
                    temp(t.evap_c),
                    t.watts.map_or_else(|| "--".into(), |w| format!("{w:.0}")),
                    t.target_c,
                    t.band_c,
                    if t.turbo { " turbo" } else { "" },
                    if t.relay_on { "ON" } else { "OFF" },
                    t.alarm,
                    t.sensor_errors,
                    t.ghost_count,
                    t.lifetime_duty_pct,
                    t.cycles,
                );
            }
            AppEvent::StatusChanged { from, to } => match from {
                Some(from) => info!("STATE | {from} -> {to}"),
                None => info!("STATE | {to}"),
            },
            AppEvent::RelaySwitched(t) => {
                let run = t.run.map_or_else(String::new, |r| {
                    let health = r
                        .health_c_per_min
                        .map_or_else(String::new, |h| format!(" health={h:.2}C/min"));
                    format!(" run={}s{health}", r.run_secs)
                });
                info!(
                    "RELAY | {}{}{run}",
                    if t.on { "ON" } else { "OFF" },
                    if t.emergency { " (emergency)" } else { "" },
                );
                if let Some(e) = t.command_error {
                    warn!("RELAY | command error: {e}");
                }
            }
            AppEvent::SwitchBlocked { want_on, wait_secs } => {
                info!(
                    "GUARD | {} held {wait_secs}s",
                    if *want_on { "ON" } else { "OFF" }
                );
            }
            AppEvent::AlarmRaised(a) => info!("ALARM | raised {a}"),
            AppEvent::AlarmCleared(a) => info!("ALARM | cleared {a}"),
            AppEvent::FaultLogged { severity, entry } => {
                info!(
                    "FAULT | {severity:?} {} @{}s: {}",
                    entry.alarm, entry.timestamp, entry.detail
                );
            }
            AppEvent::HourRollover(h) => {
                info!(
                    "HOUR  | duty={}% cycles={}{}",
                    h.duty_pct,
                    h.cycles,
                    if h.degraded { " (degraded)" } else { "" }
                );
            }
            AppEvent::HysteresisAdjusted { outcome, band_c } => {
                info!("HYST  | {outcome:?} band=\u{00b1}{band_c:.2}");
            }
            AppEvent::CommandRejected(e) => warn!("CMD   | rejected: {e}"),
            AppEvent::Started { relay_on, fatal } => {
                info!(
                    "START | relay={} fatal={fatal}",
                    if *relay_on { "ON" } else { "OFF" }
                );
            }
        }
    }
}
