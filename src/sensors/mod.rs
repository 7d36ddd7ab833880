//! Sensor subsystem: per-probe smoothing and the aggregating [`SensorPipeline`].
//!
//! The pipeline owns one [`SensorChannel`] per probe and a single error
//! counter shared by all of them. It produces a [`SensorReport`] each tick
//! that the protection detectors, alarm manager and decision engine read.
//!
//! A failed read never crashes the control loop: the last good smoothed
//! value is retained and the error counter escalates to limp mode once it
//! reaches the configured limit.

pub mod channel;

use log::{info, warn};

use crate::config::SystemConfig;
use crate::error::SensorError;
use channel::SensorChannel;

/// Plausible range for the NTC / one-wire probes fitted to the relay.
const MIN_PLAUSIBLE_C: f32 = -55.0;
const MAX_PLAUSIBLE_C: f32 = 125.0;

/// Samples collected in one acquisition pass, before any filtering.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawReadings {
    pub air: Option<f32>,
    pub evap: Option<f32>,
    pub watts: Option<f32>,
}

/// Output of one pipeline pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct SensorReport {
    /// Smoothed air temperature, the control signal. Holds the last good
    /// value across invalid reads; `None` only before the first valid read.
    pub control_c: Option<f32>,
    /// Median of the last three air samples (low-lag signal).
    pub median_c: Option<f32>,
    /// This tick's raw air sample, if valid.
    pub raw_c: Option<f32>,
    /// Smoothed evaporator temperature.
    pub evap_c: Option<f32>,
    /// Compressor power, if a meter is fitted and answered.
    pub watts: Option<f32>,
    /// Error counter reached the configured limit.
    pub failed: bool,
    /// At least one probe has not moved for longer than plausible.
    pub stuck: bool,
    /// Current value of the shared error counter.
    pub error_count: u8,
}

/// Range-check a raw probe value.
pub fn validate_reading(value: Option<f32>) -> Result<f32, SensorError> {
    let v = value.ok_or(SensorError::NoReading)?;
    if !v.is_finite() {
        return Err(SensorError::NotFinite);
    }
    if !(MIN_PLAUSIBLE_C..=MAX_PLAUSIBLE_C).contains(&v) {
        return Err(SensorError::OutOfRange);
    }
    Ok(v)
}

/// Aggregates both probes and their shared health state.
#[derive(Debug, Clone, Default)]
pub struct SensorPipeline {
    air: SensorChannel,
    evap: SensorChannel,
    error_count: u8,
    failed: bool,
    /// Highest counter value reached in the most recent failure episode.
    last_failure_errors: u8,
}

impl SensorPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate, smooth and health-check one tick's samples.
    ///
    /// A tick counts as an error when any enabled probe returned an
    /// invalid value; a tick where every enabled probe is valid resets the
    /// counter. The first fully valid tick after a failure reseeds every
    /// channel so recovery starts without a filter transient or a stale
    /// stuck reference.
    pub fn process(&mut self, raw: &RawReadings, now: u64, cfg: &SystemConfig) -> SensorReport {
        let air = validate_reading(raw.air);
        let evap = if cfg.evap_sensor_enabled {
            Some(validate_reading(raw.evap))
        } else {
            None
        };

        let tick_valid = air.is_ok() && !matches!(evap, Some(Err(_)));
        if tick_valid {
            self.record_valid();
        } else {
            if let Err(e) = air {
                warn!("air probe read invalid: {e}");
            }
            if let Some(Err(e)) = evap {
                warn!("evaporator probe read invalid: {e}");
            }
            self.record_invalid(cfg.sensor_fail_limit);
        }

        let mut stuck = false;
        let mut median_c = None;
        let mut raw_c = None;

        if let Ok(v) = air {
            median_c = Some(self.air.push(v, cfg.ema_alpha));
            raw_c = Some(v);
            if cfg.stuck_detect_enabled {
                stuck |= self.air.check_stuck(
                    v,
                    now,
                    cfg.stuck_epsilon_c,
                    cfg.stuck_timeout_secs,
                );
            }
        }
        if let Some(Ok(v)) = evap {
            self.evap.push(v, cfg.ema_alpha);
            if cfg.stuck_detect_enabled {
                stuck |= self.evap.check_stuck(
                    v,
                    now,
                    cfg.stuck_epsilon_c,
                    cfg.stuck_timeout_secs,
                );
            }
        }

        SensorReport {
            control_c: self.air.smoothed(),
            median_c,
            raw_c,
            evap_c: if cfg.evap_sensor_enabled {
                self.evap.smoothed()
            } else {
                None
            },
            watts: if cfg.power_sensor_enabled {
                raw.watts.filter(|w| w.is_finite() && *w >= 0.0)
            } else {
                None
            },
            failed: self.failed,
            stuck,
            error_count: self.error_count,
        }
    }

    pub fn error_count(&self) -> u8 {
        self.error_count
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Counter value reached during the last failure episode.
    pub fn last_failure_errors(&self) -> u8 {
        self.last_failure_errors
    }

    /// Smoothed air value without running a pass.
    pub fn control_c(&self) -> Option<f32> {
        self.air.smoothed()
    }

    // ── Internal ──────────────────────────────────────────────────

    fn record_invalid(&mut self, limit: u8) {
        self.error_count = self.error_count.saturating_add(1);
        if self.failed {
            self.last_failure_errors = self.error_count;
        } else if self.error_count >= limit {
            self.failed = true;
            self.last_failure_errors = self.error_count;
            warn!(
                "sensor failed after {} consecutive invalid reads, entering limp mode",
                self.error_count
            );
        }
    }

    fn record_valid(&mut self) {
        if self.failed {
            info!(
                "sensor recovered after {} invalid reads, reseeding channels",
                self.error_count
            );
            self.air.reseed();
            self.evap.reseed();
            self.failed = false;
        }
        self.error_count = 0;
    }
}
