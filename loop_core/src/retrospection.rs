//! Retrospective correction.
//!
//! Compares the modeled glucose movement over the recent retrospection window
//! against what actually happened, and turns the discrepancy into a forward
//! effect timeline. Two controllers implement the
//! [`RetrospectiveCorrection`] seam: a stateless proportional one and a
//! stateful proportional-integral one.

use chrono::{DateTime, Duration, Utc};
use loop_traits::{EffectTimeline, GlucoseChange, GlucoseEffect, GlucoseSample, LoopSettings};

use crate::error::{LoopError, MissingDataKind, Result};
use crate::prediction::{self, EFFECT_INTERVAL};

/// Observed-minus-modeled glucose movement over a retrospection window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Discrepancy {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    /// mg/dL the model under- (positive) or over- (negative) predicted.
    pub value: f64,
    /// Modeled carb-only movement over the same window, used to decide
    /// whether a positive discrepancy is explainable by enabled carbs.
    pub carb_movement: f64,
}

/// Compute the retrospection discrepancy for an observed glucose change.
///
/// Requires both the carb and insulin effect timelines; either missing means
/// the discrepancy (and any correction built on it) cannot be computed.
pub fn compute_discrepancy(
    change: &GlucoseChange,
    carb_effect: Option<&EffectTimeline>,
    insulin_effect: Option<&EffectTimeline>,
) -> Result<Discrepancy> {
    let carb_effect =
        carb_effect.ok_or(LoopError::MissingData(MissingDataKind::CarbEffect))?;
    let insulin_effect =
        insulin_effect.ok_or(LoopError::MissingData(MissingDataKind::InsulinEffect))?;

    let horizon = change.end.start_date - change.start.start_date;
    let modeled = prediction::predict_glucose(
        change.start,
        &[],
        &[carb_effect, insulin_effect],
        horizon,
    );
    let modeled_end = modeled
        .iter()
        .take_while(|p| p.date <= change.end.start_date)
        .last()
        .map_or(change.start.value, |p| p.value);

    let carb_only =
        prediction::predict_glucose(change.start, &[], &[carb_effect], horizon);
    let carb_end = carb_only
        .iter()
        .take_while(|p| p.date <= change.end.start_date)
        .last()
        .map_or(change.start.value, |p| p.value);

    Ok(Discrepancy {
        start_date: change.start.start_date,
        end_date: change.end.start_date,
        value: change.end.value - modeled_end,
        carb_movement: carb_end - change.start.value,
    })
}

/// An effect that starts at `rate` (mg/dL per second) anchored at the sample
/// date and decays linearly to zero over `duration`.
pub fn decay_effect(
    anchor: GlucoseSample,
    rate_per_second: f64,
    duration: Duration,
) -> EffectTimeline {
    let total_seconds = duration.num_seconds() as f64;
    if total_seconds <= 0.0 {
        return Vec::new();
    }
    let steps = (duration.num_minutes() / EFFECT_INTERVAL.num_minutes()).max(0);
    let mut timeline = Vec::with_capacity(steps as usize + 1);
    for i in 0..=steps {
        let t = (EFFECT_INTERVAL * i as i32).num_seconds() as f64;
        // Integral of a rate declining linearly from `rate` to zero.
        let delta = rate_per_second * t * (1.0 - t / (2.0 * total_seconds));
        timeline.push(GlucoseEffect {
            date: anchor.start_date + EFFECT_INTERVAL * i as i32,
            delta,
        });
    }
    timeline
}

/// Per-cycle inputs to a retrospective correction controller.
#[derive(Debug, Clone, Copy)]
pub struct CorrectionInput<'a> {
    pub latest_glucose: GlucoseSample,
    pub discrepancy: Option<&'a Discrepancy>,
    pub settings: &'a LoopSettings,
    /// Whether a new glucose sample arrived since the last correction update.
    /// Stateful controllers only advance their accumulators on fresh samples.
    pub glucose_fresh: bool,
    pub now: DateTime<Utc>,
}

/// Seam for the retrospective correction algorithm.
pub trait RetrospectiveCorrection: Send {
    /// Recompute the forward correction effect. An empty timeline means no
    /// correction is active.
    fn update(&mut self, input: CorrectionInput<'_>) -> EffectTimeline;

    /// Net correction (mg/dL) currently being applied, for display.
    fn total_correction(&self) -> Option<f64>;

    /// Drop all internal state, for example after a settings change.
    fn reset(&mut self);
}

/// Effect duration used by the standard controller.
const STANDARD_EFFECT_DURATION: Duration = Duration::minutes(60);

/// Fixed velocity denominator. The correction is expressed as a rate over a
/// nominal 30 minutes regardless of the effect duration it decays over.
const VELOCITY_DENOMINATOR_SECONDS: f64 = 1800.0;

/// Proportional-only correction: each cycle's discrepancy is replayed
/// forward as a decaying effect over the next hour. Stateless across cycles.
#[derive(Debug, Default)]
pub struct StandardRetrospectiveCorrection {
    total_correction: Option<f64>,
}

impl RetrospectiveCorrection for StandardRetrospectiveCorrection {
    fn update(&mut self, input: CorrectionInput<'_>) -> EffectTimeline {
        let Some(discrepancy) = input.discrepancy else {
            self.total_correction = None;
            return Vec::new();
        };
        // Velocity over the nominal 30-minute window, decayed over an hour:
        // the cumulative correction integrates back to the discrepancy
        // itself.
        self.total_correction = Some(discrepancy.value);
        let velocity = discrepancy.value / VELOCITY_DENOMINATOR_SECONDS;
        decay_effect(input.latest_glucose, velocity, STANDARD_EFFECT_DURATION)
    }

    fn total_correction(&self) -> Option<f64> {
        self.total_correction
    }

    fn reset(&mut self) {
        self.total_correction = None;
    }
}

/// Discrepancy sampling interval the integral gains are tuned for.
const SAMPLE_MINUTES: f64 = 5.0;
/// Exponential forgetting time constant for the integral accumulator.
const TIME_CONSTANT_MINUTES: f64 = 90.0;
/// Steady-state gain for a persistent discrepancy.
const PERSISTENT_GAIN: f64 = 5.0;
/// Immediate gain applied to the current discrepancy.
const CURRENT_GAIN: f64 = 1.0;
/// Carb-explainable positive movement above which the integral resets.
const CARB_RESET_THRESHOLD: f64 = 30.0;

const INITIAL_EFFECT_MINUTES: i64 = 60;
const EFFECT_GROWTH_MINUTES: i64 = 10;
const MAX_EFFECT_MINUTES: i64 = 180;

/// Proportional-integral correction. A persistent discrepancy accumulates
/// into an integral term so the correction grows toward `PERSISTENT_GAIN`
/// times the discrepancy, while sign flips and carb-explainable rises reset
/// the accumulator to avoid overshoot.
#[derive(Debug)]
pub struct IntegralRetrospectiveCorrection {
    integral_forget: f64,
    integral_gain: f64,
    proportional_gain: f64,
    integral: f64,
    previous_discrepancy: Option<f64>,
    effect_duration: Duration,
    total_correction: Option<f64>,
}

impl Default for IntegralRetrospectiveCorrection {
    fn default() -> Self {
        Self::new()
    }
}

impl IntegralRetrospectiveCorrection {
    pub fn new() -> Self {
        let integral_forget = (-SAMPLE_MINUTES / TIME_CONSTANT_MINUTES).exp();
        let integral_gain =
            ((1.0 - integral_forget) / integral_forget) * (PERSISTENT_GAIN - CURRENT_GAIN);
        Self {
            integral_forget,
            integral_gain,
            proportional_gain: CURRENT_GAIN - integral_gain,
            integral: 0.0,
            previous_discrepancy: None,
            effect_duration: Duration::minutes(INITIAL_EFFECT_MINUTES),
            total_correction: None,
        }
    }

    /// Positive integral limit: the glucose impact of two hours of scheduled
    /// basal at current sensitivity.
    fn positive_limit(settings: &LoopSettings, now: DateTime<Utc>) -> Option<f64> {
        let sensitivity = settings.insulin_sensitivity.as_ref()?.value_at(now);
        let basal = settings.basal_rates.as_ref()?.value_at(now);
        Some(sensitivity * basal * 2.0)
    }

    /// Negative integral limit: no further below than the span between the
    /// correction target floor and the suspend threshold, and at least 15
    /// mg/dL of headroom.
    fn negative_limit(settings: &LoopSettings, now: DateTime<Utc>) -> Option<f64> {
        let target_min = settings.glucose_target_range.as_ref()?.min_at(now);
        let suspend = settings.suspend_threshold?;
        Some((-15.0_f64).min(-(target_min - suspend).abs()))
    }
}

impl RetrospectiveCorrection for IntegralRetrospectiveCorrection {
    fn update(&mut self, input: CorrectionInput<'_>) -> EffectTimeline {
        let Some(discrepancy) = input.discrepancy else {
            // Calibration or data gap: start over rather than integrate
            // across it.
            self.reset();
            return Vec::new();
        };

        let (Some(positive_limit), Some(negative_limit)) = (
            Self::positive_limit(input.settings, input.now),
            Self::negative_limit(input.settings, input.now),
        ) else {
            // Incomplete therapy settings suspend the correction without
            // failing the cycle.
            self.reset();
            return Vec::new();
        };

        let current = discrepancy.value.clamp(-positive_limit, positive_limit);

        let sign_flip = self
            .previous_discrepancy
            .is_some_and(|prev| prev * current < 0.0);
        let carb_explained = current > 0.0 && discrepancy.carb_movement > CARB_RESET_THRESHOLD;

        if sign_flip || carb_explained || self.previous_discrepancy.is_none() {
            self.integral = self.integral_gain * current;
            self.effect_duration = Duration::minutes(INITIAL_EFFECT_MINUTES);
            self.previous_discrepancy = Some(0.0);
        } else if input.glucose_fresh {
            self.integral = (self.integral_forget * self.integral
                + self.integral_gain * current)
                .clamp(negative_limit, positive_limit);
            self.effect_duration = Duration::minutes(
                (self.effect_duration.num_minutes() + EFFECT_GROWTH_MINUTES)
                    .min(MAX_EFFECT_MINUTES),
            );
            self.previous_discrepancy = Some(current);
        }

        let overall = self.proportional_gain * current + self.integral;
        let scaled =
            overall * INITIAL_EFFECT_MINUTES as f64 / self.effect_duration.num_minutes() as f64;
        self.total_correction = Some(scaled);

        let velocity = scaled / VELOCITY_DENOMINATOR_SECONDS;
        decay_effect(input.latest_glucose, velocity, self.effect_duration)
    }

    fn total_correction(&self) -> Option<f64> {
        self.total_correction
    }

    fn reset(&mut self) {
        self.integral = 0.0;
        self.previous_discrepancy = None;
        self.effect_duration = Duration::minutes(INITIAL_EFFECT_MINUTES);
        self.total_correction = None;
    }
}
