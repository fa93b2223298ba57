//! Dose recommendation.
//!
//! Turns a forecast into a temp-basal or bolus recommendation, gated on
//! configuration completeness and input recency. All outputs are advisory;
//! enactment happens through the host's [`loop_traits::BasalDelegate`] after
//! a freshness check on the recommendation envelope.

use chrono::{DateTime, Duration, Utc};
use loop_traits::{
    BolusRecommendation, DoseEntry, LoopSettings, PredictedGlucose, Recommendation,
    TempBasalRecommendation,
};

use crate::error::{ConfigKind, LoopError, MissingDataKind, Result};

/// Duration of every recommended temp basal.
pub const TEMP_BASAL_DURATION: Duration = Duration::minutes(30);

/// Rates closer than this (U/h) to the scheduled basal are treated as equal.
const RATE_EPSILON: f64 = 1e-3;

/// Inputs shared by both recommendation paths.
#[derive(Debug, Clone, Copy)]
pub struct DoseInputs<'a> {
    pub prediction: &'a [PredictedGlucose],
    pub last_pump_date: DateTime<Utc>,
    pub settings: &'a LoopSettings,
    pub now: DateTime<Utc>,
}

struct DoseContext {
    eventual: f64,
    minimum: f64,
    target_midpoint: f64,
    sensitivity: f64,
    suspend_threshold: f64,
}

/// Recency and configuration gates, then the forecast extremes the dosing
/// math runs on.
fn validate(inputs: &DoseInputs<'_>) -> Result<DoseContext> {
    let settings = inputs.settings;
    let first = inputs
        .prediction
        .first()
        .ok_or(LoopError::MissingData(MissingDataKind::Glucose))?;

    // A stale anchor must never produce a dose, even with a cached forecast.
    if inputs.now - first.date > settings.recency_interval {
        return Err(LoopError::GlucoseTooOld(first.date));
    }
    if inputs.now - inputs.last_pump_date > settings.recency_interval {
        return Err(LoopError::PumpDataTooOld(inputs.last_pump_date));
    }

    let target = settings
        .glucose_target_range
        .as_ref()
        .ok_or(LoopError::Configuration(ConfigKind::Settings))?;
    let sensitivity = settings
        .insulin_sensitivity
        .as_ref()
        .ok_or(LoopError::Configuration(ConfigKind::Settings))?
        .value_at(inputs.now);
    let suspend_threshold = settings
        .suspend_threshold
        .ok_or(LoopError::Configuration(ConfigKind::Settings))?;

    let eventual = inputs
        .prediction
        .last()
        .map_or(first.value, |p| p.value);
    let minimum = inputs
        .prediction
        .iter()
        .map(|p| p.value)
        .fold(f64::INFINITY, f64::min);

    Ok(DoseContext {
        eventual,
        minimum,
        target_midpoint: target.midpoint_at(inputs.now),
        sensitivity,
        suspend_threshold,
    })
}

/// Insulin units that correct the eventual glucose to the target midpoint,
/// held back so the forecast minimum stays above the suspend threshold.
fn correction_units(ctx: &DoseContext) -> f64 {
    let to_target = (ctx.eventual - ctx.target_midpoint) / ctx.sensitivity;
    let headroom = (ctx.minimum - ctx.suspend_threshold) / ctx.sensitivity;
    to_target.min(headroom)
}

/// Recommend a 30-minute temp basal, or `None` when the schedule already
/// fits and no temp basal is running.
pub fn recommend_temp_basal(
    inputs: &DoseInputs<'_>,
    active_temp_basal: Option<DoseEntry>,
    round_rate: impl Fn(f64) -> f64,
) -> Result<Option<Recommendation<TempBasalRecommendation>>> {
    let ctx = validate(inputs)?;
    let settings = inputs.settings;
    let scheduled_rate = settings
        .basal_rates
        .as_ref()
        .ok_or(LoopError::Configuration(ConfigKind::BasalSchedule))?
        .value_at(inputs.now);
    let max_basal_rate = settings
        .max_basal_rate
        .ok_or(LoopError::Configuration(ConfigKind::Settings))?;

    let rate = if ctx.minimum < ctx.suspend_threshold {
        // Any forecast excursion below suspend halts delivery outright.
        0.0
    } else {
        let units = correction_units(&ctx);
        let hours = TEMP_BASAL_DURATION.num_seconds() as f64 / 3600.0;
        (scheduled_rate + units / hours).clamp(0.0, max_basal_rate)
    };
    let rate = round_rate(rate);

    if (rate - scheduled_rate).abs() < RATE_EPSILON {
        // Back on schedule: cancel a running override, otherwise nothing to
        // do.
        return Ok(active_temp_basal.map(|_| {
            Recommendation::new(
                TempBasalRecommendation {
                    units_per_hour: scheduled_rate,
                    duration: Duration::zero(),
                },
                inputs.now,
            )
        }));
    }

    Ok(Some(Recommendation::new(
        TempBasalRecommendation {
            units_per_hour: rate,
            duration: TEMP_BASAL_DURATION,
        },
        inputs.now,
    )))
}

/// Recommend a bolus. `pending_insulin` is insulin already requested or in
/// flight; it is subtracted before sizing, and the result never goes
/// negative.
pub fn recommend_bolus(
    inputs: &DoseInputs<'_>,
    pending_insulin: f64,
    round_volume: impl Fn(f64) -> f64,
) -> Result<Recommendation<BolusRecommendation>> {
    let ctx = validate(inputs)?;
    let max_bolus = inputs
        .settings
        .max_bolus
        .ok_or(LoopError::Configuration(ConfigKind::Settings))?;

    let amount = if ctx.minimum < ctx.suspend_threshold {
        // Never bolus into a forecast low.
        0.0
    } else {
        (correction_units(&ctx) - pending_insulin).clamp(0.0, max_bolus)
    };

    Ok(Recommendation::new(
        BolusRecommendation {
            amount: round_volume(amount),
            pending_insulin,
        },
        inputs.now,
    ))
}

/// Gate an enactment on recommendation freshness.
pub fn ensure_fresh<T>(envelope: &Recommendation<T>, now: DateTime<Utc>) -> Result<()> {
    if envelope.is_fresh(now) {
        Ok(())
    } else {
        Err(LoopError::RecommendationExpired(envelope.date))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use loop_traits::{DailySchedule, TargetRangeSchedule, RECOMMENDATION_VALIDITY};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 6, 1, 12, 0, 0).unwrap()
    }

    fn settings() -> LoopSettings {
        LoopSettings {
            glucose_target_range: TargetRangeSchedule::constant(95.0, 105.0),
            insulin_sensitivity: Some(DailySchedule::constant(50.0)),
            basal_rates: Some(DailySchedule::constant(1.0)),
            carb_ratios: Some(DailySchedule::constant(10.0)),
            suspend_threshold: Some(75.0),
            max_basal_rate: Some(5.0),
            max_bolus: Some(6.0),
            ..LoopSettings::default()
        }
    }

    fn flat_prediction(value: f64) -> Vec<PredictedGlucose> {
        (0..=12)
            .map(|i| PredictedGlucose {
                date: now() + Duration::minutes(5 * i),
                value,
            })
            .collect()
    }

    fn inputs<'a>(
        prediction: &'a [PredictedGlucose],
        settings: &'a LoopSettings,
    ) -> DoseInputs<'a> {
        DoseInputs {
            prediction,
            last_pump_date: now() - Duration::minutes(5),
            settings,
            now: now(),
        }
    }

    #[test]
    fn flat_high_forecast_raises_the_rate() {
        let prediction = flat_prediction(150.0);
        let s = settings();
        let rec = recommend_temp_basal(&inputs(&prediction, &s), None, |r| r)
            .unwrap()
            .unwrap();
        // (150 - 100) / 50 = 1 U, delivered over 30 min on top of 1 U/h.
        assert!((rec.recommendation.units_per_hour - 3.0).abs() < 1e-9);
        assert_eq!(rec.recommendation.duration, TEMP_BASAL_DURATION);
    }

    #[test]
    fn forecast_below_suspend_threshold_suspends() {
        let mut prediction = flat_prediction(110.0);
        prediction[6].value = 70.0;
        let s = settings();
        let rec = recommend_temp_basal(&inputs(&prediction, &s), None, |r| r)
            .unwrap()
            .unwrap();
        assert_eq!(rec.recommendation.units_per_hour, 0.0);
    }

    #[test]
    fn on_target_forecast_without_active_temp_is_a_no_op() {
        let prediction = flat_prediction(100.0);
        let s = settings();
        let rec = recommend_temp_basal(&inputs(&prediction, &s), None, |r| r).unwrap();
        assert!(rec.is_none());
    }

    #[test]
    fn on_target_forecast_cancels_an_active_temp() {
        let prediction = flat_prediction(100.0);
        let s = settings();
        let active = DoseEntry {
            start_date: now() - Duration::minutes(10),
            end_date: now() + Duration::minutes(20),
            units_per_hour: 2.5,
        };
        let rec = recommend_temp_basal(&inputs(&prediction, &s), Some(active), |r| r)
            .unwrap()
            .unwrap();
        assert_eq!(rec.recommendation.units_per_hour, 1.0);
        assert_eq!(rec.recommendation.duration, Duration::zero());
    }

    #[test]
    fn rate_is_clamped_to_the_maximum() {
        let prediction = flat_prediction(400.0);
        let s = settings();
        let rec = recommend_temp_basal(&inputs(&prediction, &s), None, |r| r)
            .unwrap()
            .unwrap();
        assert_eq!(rec.recommendation.units_per_hour, 5.0);
    }

    #[test]
    fn rounding_is_applied_to_the_rate() {
        let prediction = flat_prediction(150.0);
        let s = settings();
        let rec = recommend_temp_basal(&inputs(&prediction, &s), None, |r| {
            (r * 20.0).round() / 20.0
        })
        .unwrap()
        .unwrap();
        assert!((rec.recommendation.units_per_hour - 3.0).abs() < 0.05);
    }

    #[test]
    fn stale_glucose_fails_even_with_a_cached_forecast() {
        let sixteen_min_ago = now() - Duration::minutes(16);
        let prediction: Vec<PredictedGlucose> = (0..=12)
            .map(|i| PredictedGlucose {
                date: sixteen_min_ago + Duration::minutes(5 * i),
                value: 150.0,
            })
            .collect();
        let s = settings();
        let err = recommend_temp_basal(&inputs(&prediction, &s), None, |r| r).unwrap_err();
        assert_eq!(err, LoopError::GlucoseTooOld(sixteen_min_ago));
    }

    #[test]
    fn stale_pump_data_fails() {
        let prediction = flat_prediction(150.0);
        let s = settings();
        let mut i = inputs(&prediction, &s);
        i.last_pump_date = now() - Duration::minutes(16);
        let err = recommend_temp_basal(&i, None, |r| r).unwrap_err();
        assert_eq!(err, LoopError::PumpDataTooOld(i.last_pump_date));
    }

    #[test]
    fn missing_settings_are_a_configuration_error() {
        let prediction = flat_prediction(150.0);
        let mut s = settings();
        s.suspend_threshold = None;
        let err = recommend_temp_basal(&inputs(&prediction, &s), None, |r| r).unwrap_err();
        assert_eq!(err, LoopError::Configuration(ConfigKind::Settings));

        let mut s = settings();
        s.basal_rates = None;
        let err = recommend_temp_basal(&inputs(&prediction, &s), None, |r| r).unwrap_err();
        assert_eq!(err, LoopError::Configuration(ConfigKind::BasalSchedule));
    }

    #[test]
    fn bolus_subtracts_pending_insulin() {
        let prediction = flat_prediction(200.0);
        let s = settings();
        // (200 - 100) / 50 = 2 U needed.
        let rec = recommend_bolus(&inputs(&prediction, &s), 0.5, |v| v).unwrap();
        assert!((rec.recommendation.amount - 1.5).abs() < 1e-9);
        assert_eq!(rec.recommendation.pending_insulin, 0.5);
    }

    #[test]
    fn bolus_never_goes_negative_or_over_max() {
        let prediction = flat_prediction(110.0);
        let s = settings();
        let rec = recommend_bolus(&inputs(&prediction, &s), 3.0, |v| v).unwrap();
        assert_eq!(rec.recommendation.amount, 0.0);

        let high = flat_prediction(600.0);
        let rec = recommend_bolus(&inputs(&high, &s), 0.0, |v| v).unwrap();
        assert_eq!(rec.recommendation.amount, 6.0);
    }

    #[test]
    fn bolus_is_zero_when_forecast_dips_below_suspend() {
        let mut prediction = flat_prediction(180.0);
        prediction[10].value = 70.0;
        let s = settings();
        let rec = recommend_bolus(&inputs(&prediction, &s), 0.0, |v| v).unwrap();
        assert_eq!(rec.recommendation.amount, 0.0);
    }

    #[test]
    fn expired_envelope_is_rejected_at_enactment() {
        let rec = Recommendation::new(
            TempBasalRecommendation {
                units_per_hour: 2.0,
                duration: TEMP_BASAL_DURATION,
            },
            now(),
        );
        assert!(ensure_fresh(&rec, now() + RECOMMENDATION_VALIDITY).is_ok());
        let err =
            ensure_fresh(&rec, now() + RECOMMENDATION_VALIDITY + Duration::seconds(1))
                .unwrap_err();
        assert_eq!(err, LoopError::RecommendationExpired(now()));
    }
}
