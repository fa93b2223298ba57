//! Glucose forecasting.
//!
//! A forecast composes an anchor glucose sample with a caller-selected set of
//! effect timelines plus short-horizon momentum. Callers opt into each input
//! explicitly via [`PredictionInput`]; an absent flag never substitutes a
//! default. The returned series always spans at least the configured insulin
//! action duration, because the dosing math downstream relies on that
//! horizon.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use loop_traits::{
    DailySchedule, EffectTimeline, GlucoseEffect, GlucoseSample, PredictedGlucose,
    PredictionInput,
};

use crate::error::{LoopError, MissingDataKind, Result};

/// Sampling cadence of effect timelines and forecasts.
pub const EFFECT_INTERVAL: Duration = Duration::minutes(5);

/// The effect timelines available to a forecast. Each is optional; the
/// requested [`PredictionInput`] set decides which absences are errors.
#[derive(Debug, Default, Clone, Copy)]
pub struct PredictionSources<'a> {
    pub carb_effect: Option<&'a EffectTimeline>,
    pub unexpired_carb_effect: Option<&'a EffectTimeline>,
    pub insulin_effect: Option<&'a EffectTimeline>,
    pub momentum_effect: Option<&'a EffectTimeline>,
    pub retrospective_effect: Option<&'a EffectTimeline>,
    pub zero_temp_effect: Option<&'a EffectTimeline>,
}

/// Last cumulative delta of `timeline` at or before `date`, or 0 when the
/// timeline starts later.
fn delta_at(timeline: &[GlucoseEffect], date: DateTime<Utc>) -> f64 {
    timeline
        .iter()
        .take_while(|p| p.date <= date)
        .last()
        .map_or(0.0, |p| p.delta)
}

/// Compose a forecast from an anchor sample, momentum, and effect timelines.
///
/// Effects contribute their cumulative delta relative to their value at the
/// anchor date. Momentum dominates the earliest points and is blended out
/// linearly across its own span, after which the summed effects carry the
/// trajectory alone. The series is extended flat until it covers
/// `insulin_action_duration` past the anchor.
pub fn predict_glucose(
    anchor: GlucoseSample,
    momentum: &[GlucoseEffect],
    effects: &[&EffectTimeline],
    insulin_action_duration: Duration,
) -> Vec<PredictedGlucose> {
    let mut increments: BTreeMap<DateTime<Utc>, f64> = BTreeMap::new();
    for timeline in effects {
        let mut prev = delta_at(timeline, anchor.start_date);
        for point in timeline.iter().filter(|p| p.date > anchor.start_date) {
            *increments.entry(point.date).or_insert(0.0) += point.delta - prev;
            prev = point.delta;
        }
    }
    // Momentum dates participate in the grid even when no effect lands there.
    for point in momentum.iter().filter(|p| p.date > anchor.start_date) {
        increments.entry(point.date).or_insert(0.0);
    }

    let mut prediction = Vec::with_capacity(increments.len() + 2);
    prediction.push(PredictedGlucose {
        date: anchor.start_date,
        value: anchor.value,
    });
    let mut value = anchor.value;
    for (&date, &increment) in &increments {
        value += increment;
        prediction.push(PredictedGlucose { date, value });
    }

    // Blend momentum over its span: fully momentum-driven at the anchor,
    // fully effect-driven at the span's end.
    if let Some(momentum_end) = momentum.last().map(|p| p.date)
        && momentum_end > anchor.start_date
    {
        let momentum_baseline = delta_at(momentum, anchor.start_date);
        let span = (momentum_end - anchor.start_date).num_seconds() as f64;
        for point in &mut prediction {
            if point.date <= anchor.start_date || point.date > momentum_end {
                continue;
            }
            let elapsed = (point.date - anchor.start_date).num_seconds() as f64;
            let fraction = (elapsed / span).clamp(0.0, 1.0);
            let momentum_value =
                anchor.value + delta_at(momentum, point.date) - momentum_baseline;
            point.value = (1.0 - fraction) * momentum_value + fraction * point.value;
        }
    }

    // Dosing requires entries for at least the insulin action duration.
    let final_date = anchor.start_date + insulin_action_duration;
    if let Some(last) = prediction.last().copied()
        && last.date < final_date
    {
        prediction.push(PredictedGlucose {
            date: final_date,
            value: last.value,
        });
    }

    prediction
}

/// Forecast using an explicit input set, failing when a requested effect is
/// absent.
pub fn predict_with_inputs(
    anchor: GlucoseSample,
    inputs: PredictionInput,
    sources: &PredictionSources<'_>,
    insulin_action_duration: Duration,
) -> Result<Vec<PredictedGlucose>> {
    let empty: EffectTimeline = Vec::new();
    let mut effects: Vec<&EffectTimeline> = Vec::new();

    if inputs.contains(PredictionInput::CARBS) {
        effects.push(
            sources
                .carb_effect
                .ok_or(LoopError::MissingData(MissingDataKind::CarbEffect))?,
        );
    }
    if inputs.contains(PredictionInput::UNEXPIRED_CARBS) {
        effects.push(
            sources
                .unexpired_carb_effect
                .ok_or(LoopError::MissingData(MissingDataKind::CarbEffect))?,
        );
    }
    if inputs.contains(PredictionInput::INSULIN) {
        effects.push(
            sources
                .insulin_effect
                .ok_or(LoopError::MissingData(MissingDataKind::InsulinEffect))?,
        );
    }
    if inputs.contains(PredictionInput::RETROSPECTION) {
        // Retrospective correction degrading to zero is safe.
        effects.push(sources.retrospective_effect.unwrap_or(&empty));
    }
    if inputs.contains(PredictionInput::ZERO_TEMP) {
        effects.push(sources.zero_temp_effect.ok_or_else(|| {
            LoopError::InvalidData("zero-temp effect not available".to_string())
        })?);
    }

    let momentum: &[GlucoseEffect] = if inputs.contains(PredictionInput::MOMENTUM) {
        sources
            .momentum_effect
            .ok_or(LoopError::MissingData(MissingDataKind::MomentumEffect))?
    } else {
        &[]
    };

    Ok(predict_glucose(
        anchor,
        momentum,
        &effects,
        insulin_action_duration,
    ))
}

/// The glucose trajectory under a hypothetical full basal suspension,
/// starting at `start` for `duration`. Needs only the basal and sensitivity
/// schedules, never glucose, so it is always computable independently.
pub fn zero_temp_effect(
    start: DateTime<Utc>,
    basal_rates: &DailySchedule,
    sensitivity: &DailySchedule,
    duration: Duration,
) -> EffectTimeline {
    let steps = (duration.num_minutes() / EFFECT_INTERVAL.num_minutes()).max(0);
    let mut timeline = Vec::with_capacity(steps as usize + 1);
    let mut delta = 0.0;
    let mut date = start;
    timeline.push(GlucoseEffect { date, delta });
    for _ in 0..steps {
        // Withholding scheduled basal raises glucose by ISF * rate per hour.
        let rise_per_hour = sensitivity.value_at(date) * basal_rates.value_at(date);
        delta += rise_per_hour * EFFECT_INTERVAL.num_minutes() as f64 / 60.0;
        date += EFFECT_INTERVAL;
        timeline.push(GlucoseEffect { date, delta });
    }
    timeline
}

/// Policy for fractionally blending the zero-temp effect into the dosing
/// forecast: aggressiveness ramps with how far the unmitigated forecast sits
/// above a glucose threshold. The curve shape is tunable; the bounds are a
/// contract: the fraction is always within `[0, max_fraction]` and
/// non-decreasing in the forecast peak.
#[derive(Debug, Clone, Copy)]
pub struct ZeroTempPolicy {
    /// Forecast peak (mg/dL) below which no zero-temp effect is blended in.
    pub threshold: f64,
    /// Ramp width (mg/dL) over which the fraction rises to its maximum.
    pub window: f64,
    /// Upper bound on the blended fraction.
    pub max_fraction: f64,
}

impl Default for ZeroTempPolicy {
    fn default() -> Self {
        Self {
            threshold: 160.0,
            window: 60.0,
            max_fraction: 0.5,
        }
    }
}

impl ZeroTempPolicy {
    /// Fraction of the zero-temp effect to blend in for a given forecast
    /// peak.
    pub fn fraction(&self, forecast_peak: f64) -> f64 {
        if self.window <= 0.0 {
            return if forecast_peak > self.threshold {
                self.max_fraction.max(0.0)
            } else {
                0.0
            };
        }
        (((forecast_peak - self.threshold) / self.window).clamp(0.0, 1.0)
            * self.max_fraction)
            .clamp(0.0, self.max_fraction.max(0.0))
    }

    /// Scale a zero-temp timeline by the policy fraction for `forecast_peak`.
    pub fn scaled_effect(&self, zero_temp: &[GlucoseEffect], forecast_peak: f64) -> EffectTimeline {
        let fraction = self.fraction(forecast_peak);
        zero_temp
            .iter()
            .map(|p| GlucoseEffect {
                date: p.date,
                delta: p.delta * fraction,
            })
            .collect()
    }
}
