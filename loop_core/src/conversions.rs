//! Bridging the on-disk settings schema into runtime settings.

use chrono::Duration;
use loop_config::Config;
use loop_traits::{DailySchedule, LoopSettings, PredictionInput, TargetRangeSchedule};

fn daily_schedule(entries: &[loop_config::ScheduleEntry]) -> Option<DailySchedule> {
    // Validation already ran at load time; an empty list means unconfigured.
    DailySchedule::new(
        entries
            .iter()
            .map(|e| (e.start_minute, e.value))
            .collect(),
    )
}

fn target_schedule(entries: &[loop_config::TargetEntry]) -> Option<TargetRangeSchedule> {
    TargetRangeSchedule::new(
        entries
            .iter()
            .map(|e| (e.start_minute, e.min, e.max))
            .collect(),
    )
}

/// Build the runtime settings snapshot from a validated config file.
pub fn settings_from_config(config: &Config) -> LoopSettings {
    let lc = &config.loop_cfg;
    let mut enabled_effects =
        PredictionInput::CARBS | PredictionInput::INSULIN | PredictionInput::MOMENTUM;
    if lc.retrospective_correction_enabled {
        enabled_effects |= PredictionInput::RETROSPECTION;
    }

    LoopSettings {
        glucose_target_range: target_schedule(&config.schedules.target),
        insulin_sensitivity: daily_schedule(&config.schedules.sensitivity),
        basal_rates: daily_schedule(&config.schedules.basal),
        carb_ratios: daily_schedule(&config.schedules.carb_ratio),
        suspend_threshold: config.limits.suspend_threshold,
        max_basal_rate: config.limits.max_basal_rate,
        max_bolus: config.limits.max_bolus,
        enabled_effects,
        dynamic_carb_absorption: lc.dynamic_carb_absorption,
        integral_retrospective_correction: lc.integral_retrospective_correction,
        recency_interval: Duration::minutes(i64::from(lc.recency_interval_min)),
        insulin_action_duration: Duration::minutes(i64::from(lc.insulin_action_duration_min)),
        carb_absorption_time: Duration::minutes(i64::from(lc.carb_absorption_time_min)),
        retrospection_interval: Duration::minutes(i64::from(lc.retrospection_interval_min)),
    }
}
