//! Therapy parameter estimation.
//!
//! Best-effort multipliers for the configured basal rate, insulin
//! sensitivity and carb ratio, inferred from how glucose actually moved over
//! an analysis window. Estimates that cannot be formed (too little data,
//! degenerate inputs) simply return `None`; nothing in the dosing path
//! depends on them.

use chrono::{DateTime, Utc};
use loop_traits::{EffectTimeline, GlucoseSample};

use crate::math;

/// Suggested scaling factors for the configured therapy parameters over one
/// analysis window. A multiplier of 1.0 means the setting looks right.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimatedMultipliers {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub basal: f64,
    pub insulin_sensitivity: f64,
    pub carb_sensitivity: f64,
    pub carb_ratio: f64,
}

/// Minimum glucose samples inside a window before estimating anything.
const MIN_SAMPLES: usize = 6;

fn window_movement(
    timeline: &EffectTimeline,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Option<f64> {
    let in_window: Vec<f64> = timeline
        .iter()
        .filter(|p| p.date >= start && p.date <= end)
        .map(|p| p.delta)
        .collect();
    Some(in_window.last()? - in_window.first()?)
}

/// Estimate basal and sensitivity multipliers over a window with no carb
/// activity. With nothing absorbing, observed movement splits between the
/// modeled insulin effect and the scheduled basal's effect; the multipliers
/// are the projection of the no-adjustment point (1, 1) onto the line those
/// observations define.
pub fn estimate_fasting(
    glucose: &[GlucoseSample],
    insulin_effect: &EffectTimeline,
    basal_effect: &EffectTimeline,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Option<EstimatedMultipliers> {
    let samples: Vec<&GlucoseSample> = glucose
        .iter()
        .filter(|s| s.start_date >= start && s.start_date <= end)
        .collect();
    if samples.len() < MIN_SAMPLES {
        return None;
    }

    let delta_glucose = samples.last()?.value - samples.first()?.value;
    let delta_insulin = -window_movement(insulin_effect, start, end)?;
    let delta_basal = window_movement(basal_effect, start, end)?;

    let (basal_multiplier, sensitivity_inverse) = math::project_to_line(
        delta_basal,
        -delta_glucose,
        delta_basal + delta_insulin,
    );
    if sensitivity_inverse == 0.0 {
        return None;
    }
    let sensitivity_multiplier = 1.0 / sensitivity_inverse;

    Some(EstimatedMultipliers {
        start_date: start,
        end_date: end,
        basal: basal_multiplier,
        insulin_sensitivity: sensitivity_multiplier,
        carb_sensitivity: sensitivity_multiplier,
        carb_ratio: 1.0,
    })
}

/// Estimate carb-ratio and sensitivity multipliers across a carb-absorption
/// window, comparing the grams observed absorbing against the grams entered.
pub fn estimate_carb_window(
    glucose: &[GlucoseSample],
    insulin_effect: &EffectTimeline,
    entered_carbs: f64,
    observed_carbs: f64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Option<EstimatedMultipliers> {
    let samples: Vec<&GlucoseSample> = glucose
        .iter()
        .filter(|s| s.start_date >= start && s.start_date <= end)
        .collect();
    if samples.len() < MIN_SAMPLES || entered_carbs <= 0.0 {
        return None;
    }

    let delta_glucose = samples.last()?.value - samples.first()?.value;
    let delta_insulin = -window_movement(insulin_effect, start, end)?;
    let delta_counteraction = delta_glucose + delta_insulin;

    let observed_over_entered = observed_carbs / entered_carbs;
    if delta_counteraction == 0.0 || observed_over_entered == 0.0 {
        return None;
    }

    // The observed/entered mismatch is modeled as the product of a carb
    // mis-estimate and a parameter mismatch; the square root attributes an
    // equal share to each.
    let actual_over_observed = (1.0 / observed_over_entered).sqrt();
    let csf_weight = delta_glucose / delta_counteraction;
    let cr_weight = 1.0 - csf_weight;

    let (csf_inverse, carb_ratio_multiplier) =
        math::project_to_line(csf_weight, cr_weight, actual_over_observed);
    if csf_inverse == 0.0 {
        return None;
    }

    Some(EstimatedMultipliers {
        start_date: start,
        end_date: end,
        basal: 1.0,
        insulin_sensitivity: carb_ratio_multiplier / csf_inverse,
        carb_sensitivity: 1.0 / csf_inverse,
        carb_ratio: carb_ratio_multiplier,
    })
}
