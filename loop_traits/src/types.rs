//! Value types exchanged between the loop core and its external stores.
//!
//! All glucose quantities are expressed in mg/dL; velocities in mg/dL per
//! second. Timelines are ordered ascending by date with no duplicate
//! timestamps, sampled at a fixed 5-minute cadence by their producers.

use chrono::{DateTime, Duration, Utc};

/// A single point glucose reading, immutable once recorded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlucoseSample {
    pub start_date: DateTime<Utc>,
    /// mg/dL
    pub value: f64,
}

/// A time-stamped contribution to glucose from one causal source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlucoseEffect {
    pub date: DateTime<Utc>,
    /// Cumulative glucose impact relative to the timeline start, mg/dL.
    pub delta: f64,
}

/// An ordered series of glucose-impact values; the common currency between
/// all of the loop's algorithms.
pub type EffectTimeline = Vec<GlucoseEffect>;

/// An interval-based rate of glucose change, used for insulin-counteraction
/// measurement. Distinct from [`GlucoseEffect`]: it is a rate over a span,
/// not an instantaneous delta.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlucoseVelocity {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    /// mg/dL per second
    pub rate: f64,
}

impl GlucoseVelocity {
    /// The total glucose change over the interval, mg/dL.
    pub fn delta(&self) -> f64 {
        self.rate * (self.end_date - self.start_date).num_seconds() as f64
    }
}

/// One point of a forecast glucose trajectory.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictedGlucose {
    pub date: DateTime<Utc>,
    /// mg/dL
    pub value: f64,
}

/// The change in glucose over a reflection window (default 30 min).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlucoseChange {
    pub start: GlucoseSample,
    pub end: GlucoseSample,
}

/// A temporary basal override delivered by the pump.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DoseEntry {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub units_per_hour: f64,
}

/// A recommended temporary basal rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempBasalRecommendation {
    pub units_per_hour: f64,
    pub duration: Duration,
}

/// A recommended bolus, along with the in-flight insulin already accounted
/// for in the recommendation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BolusRecommendation {
    /// Units to deliver now.
    pub amount: f64,
    /// Units already requested or in excess delivery, subtracted before
    /// arriving at `amount`.
    pub pending_insulin: f64,
}

/// A dosing recommendation paired with its computation date.
///
/// A recommendation older than 5 minutes must not be enacted; the check
/// happens at enactment time because computation and enactment are
/// asynchronous.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Recommendation<T> {
    pub recommendation: T,
    pub date: DateTime<Utc>,
}

/// How long a computed recommendation remains enactable.
pub const RECOMMENDATION_VALIDITY: Duration = Duration::minutes(5);

impl<T> Recommendation<T> {
    pub fn new(recommendation: T, date: DateTime<Utc>) -> Self {
        Self {
            recommendation,
            date,
        }
    }

    /// Whether the envelope is still fresh enough to enact at `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        (now - self.date).abs() <= RECOMMENDATION_VALIDITY
    }
}

/// Classification of a carb-correction decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarbCorrectionKind {
    /// Nothing to suggest; any pending notification is cleared.
    None,
    /// Small amount: badge update only, never a banner.
    BadgeOnly,
    /// Carbs advised to avert a forecast low.
    Correction,
    /// Previously entered carbs look slow or expiring.
    Warning,
    /// Both a correction and a slow-absorption warning.
    CorrectionWarning,
}

/// A carb-correction decision handed to the notifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CarbCorrectionNotification {
    pub grams: u32,
    pub grams_remaining: u32,
    /// Time until the forecast first crosses the suspend threshold.
    pub low_predicted_in: Duration,
    pub kind: CarbCorrectionKind,
}
