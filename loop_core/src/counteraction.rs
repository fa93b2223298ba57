//! Insulin counteraction measurement.
//!
//! Every observed glucose change is compared against an insulin-only
//! forecast over the same span; the residual is attributed to everything
//! insulin does not explain (carbs, activity, stress) and recorded as a
//! velocity. The resulting history paces dynamic carb-absorption modeling.

use chrono::Duration;
use loop_traits::{EffectTimeline, GlucoseChange, GlucoseVelocity};

use crate::prediction;

/// How much counteraction history is retained.
pub const RETENTION: Duration = Duration::hours(24);

/// The residual velocity for one observed glucose change, or `None` when
/// the span is empty.
pub fn counteraction_velocity(
    change: &GlucoseChange,
    insulin_effect: &EffectTimeline,
) -> Option<GlucoseVelocity> {
    let span = change.end.start_date - change.start.start_date;
    let seconds = span.num_seconds();
    if seconds <= 0 {
        return None;
    }

    let modeled = prediction::predict_glucose(change.start, &[], &[insulin_effect], span);
    let modeled_end = modeled
        .iter()
        .take_while(|p| p.date <= change.end.start_date)
        .last()
        .map_or(change.start.value, |p| p.value);

    let residual = change.end.value - modeled_end;
    Some(GlucoseVelocity {
        start_date: change.start.start_date,
        end_date: change.end.start_date,
        rate: residual / seconds as f64,
    })
}
