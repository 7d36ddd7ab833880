//! System configuration parameters
//!
//! All tunable thresholds, delays and enables for the controller core.
//! Values can be overridden from durable storage or the command channel;
//! every change goes through [`SystemConfig::validate`] first.

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    // --- Control ---
    /// Cabinet setpoint (°C)
    pub target_temp_c: f32,
    /// Hysteresis used until the adaptive controller has a stored value (°C)
    pub default_hysteresis_c: f32,
    /// Below this control temperature the compressor is forced off (°C)
    pub freeze_cut_c: f32,
    /// Longest continuous compressor run before a forced rest (seconds)
    pub max_run_secs: u32,
    /// Minimum compressor on-time before it may be switched off (seconds)
    pub min_on_secs: u32,
    /// Minimum compressor off-time before it may be restarted (seconds)
    pub min_off_secs: u32,
    /// Control tick length (seconds)
    pub control_interval_secs: u32,

    // --- Sensors ---
    /// EMA smoothing factor, exclusive range (0, 1)
    pub ema_alpha: f32,
    /// Consecutive invalid reads before the sensor is declared failed
    pub sensor_fail_limit: u8,
    /// Whether an evaporator probe is fitted
    pub evap_sensor_enabled: bool,
    /// Whether a power meter is fitted
    pub power_sensor_enabled: bool,
    /// Stuck-sensor detection enable
    pub stuck_detect_enabled: bool,
    /// Change below which a reading counts as unchanged (°C)
    pub stuck_epsilon_c: f32,
    /// Time without change before a sensor is declared stuck (seconds)
    pub stuck_timeout_secs: u32,

    // --- Limp mode ---
    /// Blind-cycle compressor on-time when sensors have failed (seconds)
    pub limp_on_secs: u32,
    /// Blind-cycle compressor off-time when sensors have failed (seconds)
    pub limp_off_secs: u32,

    // --- Weld detection ---
    pub weld_detect_enabled: bool,
    /// Settling time after turn-off before the window opens (seconds)
    pub weld_wait_secs: u32,
    /// Time after turn-off at which the window closes (seconds)
    pub weld_window_secs: u32,
    /// Temperature drop while idle that indicates welded contacts (°C)
    pub weld_drop_c: f32,

    // --- Cooling health ---
    pub cooling_check_enabled: bool,
    /// Run time before the evaporator differential is checked (seconds)
    pub cooling_check_delay_secs: u32,
    /// Minimum air-minus-evaporator differential while running (°C)
    pub cooling_min_diff_c: f32,

    // --- Power protection ---
    /// Inrush mask after compressor start (seconds)
    pub power_startup_mask_secs: u32,
    /// Power above this indicates a locked rotor (W)
    pub locked_rotor_max_w: f32,
    /// Power below this while running indicates a ghost run (W)
    pub ghost_min_w: f32,
    /// Sustained low-power time that trips a ghost run (seconds)
    pub ghost_trip_secs: u32,
    /// Ghost trips before escalating to a locked-rotor fatal
    pub ghost_max_count: u8,
    /// Normal running time that resets the ghost trip count (seconds)
    pub ghost_reset_secs: u32,

    // --- High-temperature alarm ---
    pub high_temp_c: f32,
    pub high_temp_delay_secs: u32,

    // --- Adaptive hysteresis ---
    pub adaptive_enabled: bool,
    pub hyst_min_c: f32,
    pub hyst_max_c: f32,
    /// Shortest healthy on+off cycle (seconds)
    pub cycle_target_min_secs: u32,
    /// Longest healthy on+off cycle (seconds)
    pub cycle_target_max_secs: u32,
    pub danger_multiplier: f32,
    pub short_multiplier: f32,
    /// Extra allowance above the longest healthy cycle (seconds)
    pub stable_pad_secs: u32,
    pub high_count_cycles: u8,
    pub high_count_ceiling_secs: u32,
    pub low_count_cycles: u8,
    pub low_count_floor_secs: u32,
    pub danger_step_c: f32,
    pub step_c: f32,
    /// Lower control bound must stay this far above the freeze cut (°C)
    pub freeze_margin_c: f32,

    // --- Health score ---
    /// Shortest run that yields a cooling-rate health score (seconds)
    pub health_min_run_secs: u32,

    // --- Turbo ---
    pub turbo_target_c: f32,
    pub turbo_hysteresis_c: f32,
    pub turbo_duration_secs: u32,

    // --- Door detection ---
    pub door_detect_enabled: bool,
    /// Median-over-EMA lead that indicates an open door (°C)
    pub door_rise_c: f32,
    pub door_pause_secs: u32,

    // --- Scheduled defrost ---
    pub sched_defrost_enabled: bool,
    /// Daily window start (minutes after midnight)
    pub sched_defrost_start_min: u16,
    pub sched_defrost_duration_min: u16,

    // --- Dynamic defrost ---
    pub dyn_defrost_enabled: bool,
    /// Evaporator temperature that starts a defrost (°C)
    pub dyn_defrost_start_c: f32,
    /// Evaporator temperature that must be held to end a defrost (°C)
    pub dyn_defrost_end_c: f32,
    pub dyn_defrost_dwell_secs: u32,
    pub dyn_defrost_max_secs: u32,

    // --- Persistence ---
    /// Periodic flush cadence for durable state (seconds)
    pub persist_interval_secs: u32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            // Control
            target_temp_c: 4.0,
            default_hysteresis_c: 1.0,
            freeze_cut_c: 0.5,
            max_run_secs: 5400, // 90 min
            min_on_secs: 180,
            min_off_secs: 300,
            control_interval_secs: 5,

            // Sensors
            ema_alpha: 0.3,
            sensor_fail_limit: 5,
            evap_sensor_enabled: true,
            power_sensor_enabled: true,
            stuck_detect_enabled: true,
            stuck_epsilon_c: 0.05,
            stuck_timeout_secs: 4 * 3600,

            // Limp mode (one third duty)
            limp_on_secs: 600,
            limp_off_secs: 1200,

            // Weld detection
            weld_detect_enabled: true,
            weld_wait_secs: 120,
            weld_window_secs: 600,
            weld_drop_c: 1.5,

            // Cooling health
            cooling_check_enabled: true,
            cooling_check_delay_secs: 900,
            cooling_min_diff_c: 3.0,

            // Power protection
            power_startup_mask_secs: 10,
            locked_rotor_max_w: 900.0,
            ghost_min_w: 15.0,
            ghost_trip_secs: 30,
            ghost_max_count: 3,
            ghost_reset_secs: 3600,

            // High-temperature alarm
            high_temp_c: 10.0,
            high_temp_delay_secs: 1800,

            // Adaptive hysteresis
            adaptive_enabled: true,
            hyst_min_c: 0.5,
            hyst_max_c: 3.0,
            cycle_target_min_secs: 900,
            cycle_target_max_secs: 2700,
            danger_multiplier: 0.5,
            short_multiplier: 1.0,
            stable_pad_secs: 600,
            high_count_cycles: 6,
            high_count_ceiling_secs: 900,
            low_count_cycles: 1,
            low_count_floor_secs: 3600,
            danger_step_c: 0.5,
            step_c: 0.2,
            freeze_margin_c: 1.0,

            // Health score
            health_min_run_secs: 300,

            // Turbo
            turbo_target_c: 1.5,
            turbo_hysteresis_c: 0.5,
            turbo_duration_secs: 3600,

            // Door detection
            door_detect_enabled: true,
            door_rise_c: 1.5,
            door_pause_secs: 120,

            // Scheduled defrost (03:00 for 30 min)
            sched_defrost_enabled: false,
            sched_defrost_start_min: 180,
            sched_defrost_duration_min: 30,

            // Dynamic defrost
            dyn_defrost_enabled: true,
            dyn_defrost_start_c: -20.0,
            dyn_defrost_end_c: 4.0,
            dyn_defrost_dwell_secs: 300,
            dyn_defrost_max_secs: 2700,

            // Persistence
            persist_interval_secs: 900,
        }
    }
}

impl SystemConfig {
    /// Range-check every field that a command or stored blob can change.
    ///
    /// Invalid values are rejected, never clamped, so a bad command cannot
    /// leave a partially applied configuration behind.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(-30.0..=15.0).contains(&self.target_temp_c) {
            return Err(ConfigError::ValidationFailed(
                "target_temp_c must be -30.0–15.0",
            ));
        }
        if !(self.hyst_min_c > 0.0 && self.hyst_min_c < self.hyst_max_c) {
            return Err(ConfigError::ValidationFailed(
                "hyst_min_c must be > 0 and < hyst_max_c",
            ));
        }
        if self.hyst_max_c > 10.0 {
            return Err(ConfigError::ValidationFailed("hyst_max_c must be <= 10.0"));
        }
        if !(self.hyst_min_c..=self.hyst_max_c).contains(&self.default_hysteresis_c) {
            return Err(ConfigError::ValidationFailed(
                "default_hysteresis_c must lie within hyst_min_c–hyst_max_c",
            ));
        }
        if self.freeze_cut_c >= self.target_temp_c {
            return Err(ConfigError::ValidationFailed(
                "freeze_cut_c must be below target_temp_c",
            ));
        }
        if !(self.ema_alpha > 0.0 && self.ema_alpha < 1.0) {
            return Err(ConfigError::ValidationFailed("ema_alpha must be in (0, 1)"));
        }
        if self.sensor_fail_limit == 0 {
            return Err(ConfigError::ValidationFailed("sensor_fail_limit must be >= 1"));
        }
        if !(1..=60).contains(&self.control_interval_secs) {
            return Err(ConfigError::ValidationFailed(
                "control_interval_secs must be 1–60",
            ));
        }
        if self.min_on_secs > 1800 || self.min_off_secs > 1800 {
            return Err(ConfigError::ValidationFailed(
                "min_on_secs/min_off_secs must be <= 1800",
            ));
        }
        if self.max_run_secs <= self.min_on_secs {
            return Err(ConfigError::ValidationFailed(
                "max_run_secs must exceed min_on_secs",
            ));
        }
        if self.limp_on_secs == 0 || self.limp_off_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "limp_on_secs and limp_off_secs must be > 0",
            ));
        }
        if self.weld_wait_secs >= self.weld_window_secs {
            return Err(ConfigError::ValidationFailed(
                "weld_wait_secs must be below weld_window_secs",
            ));
        }
        if self.ghost_max_count == 0 {
            return Err(ConfigError::ValidationFailed("ghost_max_count must be >= 1"));
        }
        if self.ghost_min_w >= self.locked_rotor_max_w {
            return Err(ConfigError::ValidationFailed(
                "ghost_min_w must be below locked_rotor_max_w",
            ));
        }
        if self.cycle_target_min_secs >= self.cycle_target_max_secs {
            return Err(ConfigError::ValidationFailed(
                "cycle_target_min_secs must be below cycle_target_max_secs",
            ));
        }
        if self.step_c <= 0.0 || self.danger_step_c < self.step_c {
            return Err(ConfigError::ValidationFailed(
                "step_c must be > 0 and danger_step_c >= step_c",
            ));
        }
        if self.turbo_target_c <= self.freeze_cut_c {
            return Err(ConfigError::ValidationFailed(
                "turbo_target_c must be above freeze_cut_c",
            ));
        }
        if self.turbo_hysteresis_c <= 0.0 {
            return Err(ConfigError::ValidationFailed("turbo_hysteresis_c must be > 0"));
        }
        if self.dyn_defrost_end_c <= self.dyn_defrost_start_c {
            return Err(ConfigError::ValidationFailed(
                "dyn_defrost_end_c must be above dyn_defrost_start_c",
            ));
        }
        if self.sched_defrost_start_min >= 24 * 60 || self.sched_defrost_duration_min > 240 {
            return Err(ConfigError::ValidationFailed(
                "sched_defrost window must start before 24:00 and last <= 240 min",
            ));
        }
        Ok(())
    }

    /// Length of one blind limp-mode cycle.
    pub fn limp_period_secs(&self) -> u32 {
        self.limp_on_secs.saturating_add(self.limp_off_secs)
    }
}
