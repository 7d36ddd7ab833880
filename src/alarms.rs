//! Alarm state and fault history.
//!
//! The controller exposes exactly one [`Alarm`] per tick. Non-fatal alarms
//! are cleared at the start of every tick and re-derived from the
//! detectors, so they disappear on their own once the condition goes away.
//! `Weld` and `LockedRotor` are sticky: only [`AlarmManager::reset_fatal`]
//! clears them.
//!
//! ## Fault lifecycle
//!
//! 1. A non-fatal alarm appears (rising edge): a [`PendingFaultContext`]
//!    snapshots temperatures and power.
//! 2. While it persists the context tracks the peak control temperature.
//! 3. It disappears (falling edge): the context is closed into a
//!    [`FaultEntry`] with a kind-specific detail string and pushed onto the
//!    [`FaultQueue`] for its [`Severity`].
//!
//! Fatal alarms skip this path entirely. They are written to the fatal
//! queue at the moment of detection and flagged for an inline flush, since
//! they never produce a falling edge.

use core::fmt::{self, Write as _};

use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::SystemConfig;

/// Entries kept per severity.
pub const FAULT_QUEUE_CAP: usize = 3;

/// Bounded, allocation-free detail text.
pub type FaultDetail = heapless::String<64>;

// ---------------------------------------------------------------------------
// Alarm
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Alarm {
    #[default]
    None,
    /// Relay contacts welded closed: cooling continues after OFF.
    Weld,
    /// Compressor motor seized or repeatedly failing to start.
    LockedRotor,
    /// Cabinet above the high-temperature limit for too long.
    HighTemp,
    /// Probe reads invalid; controller is in limp mode.
    SensorFail,
    /// Probe value frozen for longer than plausible.
    SensorStuck,
    /// Relay on but the motor draws no meaningful power.
    Ghost,
    /// Evaporator not colder than the cabinet while running.
    CoolingFail,
}

impl Alarm {
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::Weld | Self::LockedRotor)
    }

    pub const fn is_active(self) -> bool {
        !matches!(self, Self::None)
    }

    /// Queue this alarm is logged to. `None` for [`Alarm::None`].
    pub const fn severity(self) -> Option<Severity> {
        match self {
            Self::None => None,
            Self::Weld | Self::LockedRotor => Some(Severity::Fatal),
            Self::HighTemp => Some(Severity::Critical),
            Self::SensorFail | Self::SensorStuck => Some(Severity::Error),
            Self::Ghost | Self::CoolingFail => Some(Severity::Warning),
        }
    }

    /// Which alarm is shown when several conditions hold in one tick.
    const fn rank(self) -> u8 {
        match self {
            Self::None => 0,
            Self::CoolingFail => 1,
            Self::HighTemp => 2,
            Self::Ghost => 3,
            Self::SensorStuck => 4,
            Self::SensorFail => 5,
            Self::LockedRotor => 6,
            Self::Weld => 7,
        }
    }
}

impl fmt::Display for Alarm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Weld => write!(f, "relay weld"),
            Self::LockedRotor => write!(f, "locked rotor"),
            Self::HighTemp => write!(f, "high temperature"),
            Self::SensorFail => write!(f, "sensor failure"),
            Self::SensorStuck => write!(f, "sensor stuck"),
            Self::Ghost => write!(f, "ghost run"),
            Self::CoolingFail => write!(f, "cooling failure"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Fatal,
    Critical,
    Error,
    Warning,
}

impl Severity {
    pub const ALL: [Severity; 4] = [Self::Fatal, Self::Critical, Self::Error, Self::Warning];

    const fn index(self) -> usize {
        match self {
            Self::Fatal => 0,
            Self::Critical => 1,
            Self::Error => 2,
            Self::Warning => 3,
        }
    }
}

// ---------------------------------------------------------------------------
// Fault history
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultEntry {
    pub alarm: Alarm,
    pub timestamp: u64,
    pub detail: FaultDetail,
}

impl FaultEntry {
    pub fn new(alarm: Alarm, timestamp: u64, detail: &str) -> Self {
        let mut d = FaultDetail::new();
        let end = floor_char_boundary(detail, d.capacity());
        let _ = d.push_str(&detail[..end]);
        Self {
            alarm,
            timestamp,
            detail: d,
        }
    }
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    let mut i = max;
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Newest-first list of at most [`FAULT_QUEUE_CAP`] entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaultQueue {
    entries: heapless::Vec<FaultEntry, FAULT_QUEUE_CAP>,
}

impl FaultQueue {
    /// Insert at the front, evicting the oldest entry when full.
    pub fn push(&mut self, entry: FaultEntry) {
        if self.entries.is_full() {
            self.entries.pop();
        }
        let _ = self.entries.insert(0, entry);
    }

    /// Entries, newest first.
    pub fn entries(&self) -> &[FaultEntry] {
        &self.entries
    }

    pub fn newest(&self) -> Option<&FaultEntry> {
        self.entries.first()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// One [`FaultQueue`] per [`Severity`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaultLog {
    queues: [FaultQueue; 4],
}

impl FaultLog {
    pub fn record(&mut self, severity: Severity, entry: FaultEntry) {
        self.queues[severity.index()].push(entry);
    }

    pub fn queue(&self, severity: Severity) -> &FaultQueue {
        &self.queues[severity.index()]
    }

    pub fn total(&self) -> usize {
        self.queues.iter().map(FaultQueue::len).sum()
    }

    pub fn clear(&mut self) {
        for q in &mut self.queues {
            q.clear();
        }
    }
}

// ---------------------------------------------------------------------------
// Pending context + edge detection
// ---------------------------------------------------------------------------

/// Conditions captured when a non-fatal alarm starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingFaultContext {
    pub start: u64,
    pub alarm: Alarm,
    pub peak_temp: Option<f32>,
    pub watts: Option<f32>,
    pub raw_temp: Option<f32>,
    pub smoothed_temp: Option<f32>,
    pub evap_temp: Option<f32>,
}

/// Signals the edge detector snapshots or formats into fault details.
#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeSnapshot {
    pub control_c: Option<f32>,
    pub raw_c: Option<f32>,
    pub evap_c: Option<f32>,
    /// Power, only when a meter is fitted and the relay is on.
    pub watts: Option<f32>,
    /// Error count of the most recent sensor failure episode.
    pub sensor_errors: u8,
}

struct Temp(Option<f32>);

impl fmt::Display for Temp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(t) => write!(f, "{t:.1}"),
            None => write!(f, "-"),
        }
    }
}

fn format_detail(ctx: &PendingFaultContext, duration: u64, sensor_errors: u8) -> FaultDetail {
    let mut d = FaultDetail::new();
    let _ = match ctx.alarm {
        Alarm::Ghost => write!(d, "{:.0}W for {}s", ctx.watts.unwrap_or(0.0), duration),
        Alarm::CoolingFail => write!(
            d,
            "peak {} raw {} ema {} evap {}",
            Temp(ctx.peak_temp),
            Temp(ctx.raw_temp),
            Temp(ctx.smoothed_temp),
            Temp(ctx.evap_temp)
        ),
        Alarm::HighTemp => write!(d, "peak {}C for {}s", Temp(ctx.peak_temp), duration),
        Alarm::SensorFail => write!(d, "{} read errors", sensor_errors),
        _ => write!(d, "{}s", duration),
    };
    d
}

// ---------------------------------------------------------------------------
// AlarmManager
// ---------------------------------------------------------------------------

/// Owns the current alarm, the fault history and the high-temp timer.
#[derive(Debug, Clone, Default)]
pub struct AlarmManager {
    current: Alarm,
    pending: Option<PendingFaultContext>,
    high_temp_accum_secs: u32,
    log: FaultLog,
    /// A fatal entry was recorded and has not been flushed yet.
    fatal_unsaved: bool,
}

impl AlarmManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from durable state: the persisted fatal alarm (if any) and
    /// the fault history.
    pub fn restore(fatal: Alarm, log: FaultLog) -> Self {
        Self {
            current: if fatal.is_fatal() { fatal } else { Alarm::None },
            log,
            ..Self::default()
        }
    }

    pub fn current(&self) -> Alarm {
        self.current
    }

    pub fn has_fatal(&self) -> bool {
        self.current.is_fatal()
    }

    /// Persistable fatal subset of the current alarm.
    pub fn fatal(&self) -> Alarm {
        if self.current.is_fatal() {
            self.current
        } else {
            Alarm::None
        }
    }

    /// Drop any non-fatal alarm so this tick re-derives it from scratch.
    pub fn clear_non_fatal(&mut self) {
        if !self.current.is_fatal() {
            self.current = Alarm::None;
        }
    }

    /// Raise a non-fatal alarm; the higher-ranked alarm wins.
    pub fn raise(&mut self, alarm: Alarm) {
        debug_assert!(!alarm.is_fatal(), "fatal alarms go through raise_fatal");
        if self.current.is_fatal() {
            return;
        }
        if alarm.rank() > self.current.rank() {
            self.current = alarm;
        }
    }

    /// Latch a fatal alarm and record it immediately.
    ///
    /// Returns `false` if a fatal alarm was already latched (nothing is
    /// recorded twice).
    pub fn raise_fatal(&mut self, alarm: Alarm, now: u64, detail: &str) -> bool {
        debug_assert!(alarm.is_fatal());
        if self.current.is_fatal() {
            return false;
        }
        error!("FATAL ALARM: {alarm} ({detail})");
        self.current = alarm;
        self.log
            .record(Severity::Fatal, FaultEntry::new(alarm, now, detail));
        self.fatal_unsaved = true;
        true
    }

    /// Re-apply sensor health. A dead sensor outranks a frozen one.
    pub fn apply_sensor_health(&mut self, failed: bool, stuck: bool) {
        if failed {
            self.raise(Alarm::SensorFail);
        } else if stuck {
            self.raise(Alarm::SensorStuck);
        }
    }

    /// Advance the high-temperature timer.
    ///
    /// The timer is not a latch: any tick where the temperature is at or
    /// below the limit, or the check is suppressed, zeroes it.
    pub fn update_high_temp(
        &mut self,
        control_c: Option<f32>,
        suppressed: bool,
        tick_secs: u32,
        cfg: &SystemConfig,
    ) -> bool {
        match control_c {
            Some(t) if !suppressed && t > cfg.high_temp_c => {
                self.high_temp_accum_secs = self.high_temp_accum_secs.saturating_add(tick_secs);
                if self.high_temp_accum_secs > cfg.high_temp_delay_secs {
                    self.raise(Alarm::HighTemp);
                    return true;
                }
                false
            }
            _ => {
                self.high_temp_accum_secs = 0;
                false
            }
        }
    }

    pub fn high_temp_accum_secs(&self) -> u32 {
        self.high_temp_accum_secs
    }

    /// Compare this tick's alarm with `prev` and log the edges.
    ///
    /// Returns the entry written on a falling edge, if any.
    pub fn process_edges(
        &mut self,
        prev: Alarm,
        now: u64,
        snap: &EdgeSnapshot,
    ) -> Option<(Severity, FaultEntry)> {
        if let (Some(ctx), Some(t)) = (self.pending.as_mut(), snap.control_c) {
            ctx.peak_temp = Some(ctx.peak_temp.map_or(t, |p| p.max(t)));
        }

        let cur = self.current;
        if cur == prev {
            return None;
        }

        let mut logged = None;
        if prev.is_active() && !prev.is_fatal() {
            info!("ALARM CLEARED: {prev}");
            if let Some(ctx) = self.pending.take().filter(|c| c.alarm == prev) {
                let duration = now.saturating_sub(ctx.start);
                let entry = FaultEntry {
                    alarm: prev,
                    timestamp: now,
                    detail: format_detail(&ctx, duration, snap.sensor_errors),
                };
                if let Some(sev) = prev.severity() {
                    self.log.record(sev, entry.clone());
                    logged = Some((sev, entry));
                }
            }
        }

        if cur.is_active() && !cur.is_fatal() {
            warn!("ALARM SET: {cur}");
            self.pending = Some(PendingFaultContext {
                start: now,
                alarm: cur,
                peak_temp: snap.control_c,
                watts: snap.watts,
                raw_temp: snap.raw_c,
                smoothed_temp: snap.control_c,
                evap_temp: snap.evap_c,
            });
        } else {
            self.pending = None;
        }

        logged
    }

    pub fn pending(&self) -> Option<&PendingFaultContext> {
        self.pending.as_ref()
    }

    /// Explicit external reset of a latched fatal alarm.
    pub fn reset_fatal(&mut self) -> Option<Alarm> {
        if self.current.is_fatal() {
            let was = self.current;
            info!("FATAL ALARM RESET: {was}");
            self.current = Alarm::None;
            Some(was)
        } else {
            None
        }
    }

    pub fn fault_log(&self) -> &FaultLog {
        &self.log
    }

    pub fn clear_fault_log(&mut self) {
        self.log.clear();
    }

    /// Returns `true` once per recorded fatal fault so the caller can
    /// flush it inline.
    pub fn take_fatal_unsaved(&mut self) -> bool {
        core::mem::take(&mut self.fatal_unsaved)
    }
}
