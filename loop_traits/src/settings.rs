//! The loop settings snapshot read at the start of each cycle.

use bitflags::bitflags;
use chrono::Duration;

use crate::schedule::{DailySchedule, TargetRangeSchedule};

bitflags! {
    /// The effect inputs a caller opts into when requesting a forecast.
    ///
    /// Membership is explicit: the prediction engine never substitutes a
    /// default for an absent flag.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PredictionInput: u8 {
        const CARBS = 1 << 0;
        /// Carb effects restricted to entries that have not yet expired.
        const UNEXPIRED_CARBS = 1 << 1;
        const INSULIN = 1 << 2;
        const MOMENTUM = 1 << 3;
        const RETROSPECTION = 1 << 4;
        /// The trajectory under a hypothetical full basal suspension.
        const ZERO_TEMP = 1 << 5;
    }
}

impl PredictionInput {
    /// The standard dosing forecast inputs.
    pub fn standard() -> Self {
        Self::CARBS | Self::INSULIN | Self::MOMENTUM | Self::RETROSPECTION
    }
}

/// A read-only snapshot of the therapy settings, taken per computation.
///
/// Optional fields mirror what the user may not have configured yet; each
/// consumer decides whether a missing field is a hard configuration error
/// (dosing) or a reason to degrade quietly (retrospective correction).
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub glucose_target_range: Option<TargetRangeSchedule>,
    /// mg/dL per U
    pub insulin_sensitivity: Option<DailySchedule>,
    /// U/h
    pub basal_rates: Option<DailySchedule>,
    /// g per U
    pub carb_ratios: Option<DailySchedule>,
    /// mg/dL; insulin delivery should stop below this level.
    pub suspend_threshold: Option<f64>,
    /// U/h
    pub max_basal_rate: Option<f64>,
    /// U
    pub max_bolus: Option<f64>,
    /// Effects included in the dosing forecast.
    pub enabled_effects: PredictionInput,
    /// Use observed counteraction to pace carb absorption modeling.
    pub dynamic_carb_absorption: bool,
    /// Select the integral (PI) retrospective-correction controller.
    pub integral_retrospective_correction: bool,
    /// Input data older than this must not produce a dose.
    pub recency_interval: Duration,
    /// Full duration of insulin action; forecasts must span at least this.
    pub insulin_action_duration: Duration,
    /// Default carbohydrate absorption time for correction math.
    pub carb_absorption_time: Duration,
    /// Window over which forecasts are compared against observed glucose.
    pub retrospection_interval: Duration,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            glucose_target_range: None,
            insulin_sensitivity: None,
            basal_rates: None,
            carb_ratios: None,
            suspend_threshold: None,
            max_basal_rate: None,
            max_bolus: None,
            enabled_effects: PredictionInput::standard(),
            dynamic_carb_absorption: true,
            integral_retrospective_correction: false,
            recency_interval: Duration::minutes(15),
            insulin_action_duration: Duration::hours(6),
            carb_absorption_time: Duration::hours(2),
            retrospection_interval: Duration::minutes(30),
        }
    }
}
