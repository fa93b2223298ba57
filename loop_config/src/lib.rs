#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Therapy settings schema for the glucose loop.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Glucose values are mg/dL, insulin rates U/h, durations minutes.
//! - Schedules are lists of `{ start_minute, value }` breakpoints covering
//!   a repeating day; the first breakpoint must be at minute 0.

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Invalid(&'static str),
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// One breakpoint of a daily scalar schedule.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct ScheduleEntry {
    /// Minute of day this value takes effect (0..1440).
    pub start_minute: u32,
    pub value: f64,
}

/// One breakpoint of the glucose target range schedule.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct TargetEntry {
    pub start_minute: u32,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Schedules {
    /// Basal rates, U/h.
    pub basal: Vec<ScheduleEntry>,
    /// Insulin sensitivity, mg/dL per U.
    pub sensitivity: Vec<ScheduleEntry>,
    /// Carb ratios, g per U.
    pub carb_ratio: Vec<ScheduleEntry>,
    /// Glucose targets, mg/dL.
    pub target: Vec<TargetEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Suspend insulin delivery below this glucose, mg/dL.
    pub suspend_threshold: Option<f64>,
    /// U/h
    pub max_basal_rate: Option<f64>,
    /// U
    pub max_bolus: Option<f64>,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            suspend_threshold: Some(75.0),
            max_basal_rate: None,
            max_bolus: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoopCfg {
    /// Include retrospective correction in the dosing forecast.
    pub retrospective_correction_enabled: bool,
    /// Use the integral (PI) retrospective-correction controller.
    pub integral_retrospective_correction: bool,
    /// Pace carb absorption by observed counteraction.
    pub dynamic_carb_absorption: bool,
    /// Input data older than this must not produce a dose (minutes).
    pub recency_interval_min: u32,
    /// Full duration of insulin action (minutes).
    pub insulin_action_duration_min: u32,
    /// Default carb absorption time used by correction math (minutes).
    pub carb_absorption_time_min: u32,
    /// Retrospective comparison window (minutes).
    pub retrospection_interval_min: u32,
}

impl Default for LoopCfg {
    fn default() -> Self {
        Self {
            retrospective_correction_enabled: true,
            integral_retrospective_correction: false,
            dynamic_carb_absorption: true,
            recency_interval_min: 15,
            insulin_action_duration_min: 360,
            carb_absorption_time_min: 120,
            retrospection_interval_min: 30,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,
    pub level: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub schedules: Schedules,
    pub limits: Limits,
    #[serde(rename = "loop")]
    pub loop_cfg: LoopCfg,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(s)?;
    validate(&config)?;
    Ok(config)
}

/// Read and validate a settings file from disk.
pub fn load_file(path: &std::path::Path) -> eyre::Result<Config> {
    use eyre::WrapErr;
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("reading settings file {}", path.display()))?;
    load_toml(&text).wrap_err("validating settings")
}

fn validate_schedule(entries: &[ScheduleEntry], what: &'static str) -> Result<(), ConfigError> {
    if entries.is_empty() {
        return Ok(());
    }
    if entries[0].start_minute != 0 {
        return Err(ConfigError::Invalid("schedule must start at minute 0"));
    }
    if !entries.windows(2).all(|w| w[0].start_minute < w[1].start_minute) {
        return Err(ConfigError::Invalid("schedule minutes must ascend"));
    }
    if entries.iter().any(|e| e.start_minute >= 24 * 60) {
        return Err(ConfigError::Invalid("schedule minute beyond one day"));
    }
    if entries.iter().any(|e| !e.value.is_finite() || e.value < 0.0) {
        return Err(ConfigError::Invalid(what));
    }
    Ok(())
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_schedule(&config.schedules.basal, "basal rates must be finite and >= 0")?;
    validate_schedule(
        &config.schedules.sensitivity,
        "sensitivities must be finite and >= 0",
    )?;
    validate_schedule(
        &config.schedules.carb_ratio,
        "carb ratios must be finite and >= 0",
    )?;
    if config.schedules.sensitivity.iter().any(|e| e.value == 0.0) {
        return Err(ConfigError::Invalid("sensitivity must be > 0"));
    }
    if config.schedules.carb_ratio.iter().any(|e| e.value == 0.0) {
        return Err(ConfigError::Invalid("carb ratio must be > 0"));
    }

    let targets = &config.schedules.target;
    if !targets.is_empty() {
        if targets[0].start_minute != 0 {
            return Err(ConfigError::Invalid("target schedule must start at minute 0"));
        }
        if !targets.windows(2).all(|w| w[0].start_minute < w[1].start_minute) {
            return Err(ConfigError::Invalid("target schedule minutes must ascend"));
        }
        if targets
            .iter()
            .any(|t| !t.min.is_finite() || !t.max.is_finite() || t.min > t.max || t.min <= 0.0)
        {
            return Err(ConfigError::Invalid("target range must satisfy 0 < min <= max"));
        }
    }

    if let Some(t) = config.limits.suspend_threshold
        && (!t.is_finite() || t <= 0.0)
    {
        return Err(ConfigError::Invalid("suspend_threshold must be > 0"));
    }
    if let Some(r) = config.limits.max_basal_rate
        && (!r.is_finite() || r <= 0.0)
    {
        return Err(ConfigError::Invalid("max_basal_rate must be > 0"));
    }
    if let Some(b) = config.limits.max_bolus
        && (!b.is_finite() || b <= 0.0)
    {
        return Err(ConfigError::Invalid("max_bolus must be > 0"));
    }

    let lc = &config.loop_cfg;
    if lc.recency_interval_min == 0 {
        return Err(ConfigError::Invalid("recency_interval_min must be >= 1"));
    }
    if lc.insulin_action_duration_min < 60 {
        return Err(ConfigError::Invalid(
            "insulin_action_duration_min must be >= 60",
        ));
    }
    if lc.carb_absorption_time_min == 0 {
        return Err(ConfigError::Invalid("carb_absorption_time_min must be >= 1"));
    }
    if lc.retrospection_interval_min == 0 {
        return Err(ConfigError::Invalid(
            "retrospection_interval_min must be >= 1",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_and_validate() {
        let config = load_toml("").expect("empty config is valid");
        assert_eq!(config.loop_cfg.recency_interval_min, 15);
        assert_eq!(config.limits.suspend_threshold, Some(75.0));
    }

    #[test]
    fn rejects_unordered_schedule() {
        let err = load_toml(
            r#"
            [[schedules.basal]]
            start_minute = 0
            value = 1.0
            [[schedules.basal]]
            start_minute = 600
            value = 1.2
            [[schedules.basal]]
            start_minute = 300
            value = 0.9
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_inverted_target_range() {
        let err = load_toml(
            r#"
            [[schedules.target]]
            start_minute = 0
            min = 120.0
            max = 100.0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
