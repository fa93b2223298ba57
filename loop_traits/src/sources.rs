//! Store and delegate traits.
//!
//! The core is a library invoked by a host application; durable storage of
//! glucose, dose and carb history lives behind these narrow contracts. Fetch
//! methods return boxed errors which the core maps to its own typed error
//! kinds, mirroring how hardware faults cross the trait seam elsewhere in
//! this workspace's lineage.

use chrono::{DateTime, Utc};

use crate::settings::LoopSettings;
use crate::types::{
    CarbCorrectionNotification, DoseEntry, EffectTimeline, GlucoseChange, GlucoseSample,
    GlucoseVelocity, Recommendation, TempBasalRecommendation,
};

pub type SourceError = Box<dyn std::error::Error + Send + Sync>;

/// Read access to the glucose history store.
pub trait GlucoseSource: Send + Sync {
    /// The most recent sample, if any.
    fn latest_sample(&self) -> Option<GlucoseSample>;

    /// Samples recorded at or after `start`, ascending.
    fn samples_since(&self, start: DateTime<Utc>) -> Result<Vec<GlucoseSample>, SourceError>;

    /// Short-horizon extrapolation from the recent glucose trend alone.
    fn momentum_effect(&self) -> Result<EffectTimeline, SourceError>;

    /// The observed change from the earliest sample at or after `start` to
    /// the latest sample, or `None` when the span has no usable pair (the
    /// expected case right after a sensor calibration).
    fn change_since(&self, start: DateTime<Utc>) -> Result<Option<GlucoseChange>, SourceError>;
}

/// Read access to the insulin delivery store.
pub trait DoseSource: Send + Sync {
    /// Modeled insulin glucose effects covering `start` onward.
    fn glucose_effects_since(&self, start: DateTime<Utc>) -> Result<EffectTimeline, SourceError>;

    /// When the pump last reported delivery data.
    fn last_pump_data_date(&self) -> Option<DateTime<Utc>>;

    /// The temp basal currently running, if any.
    fn active_temp_basal(&self) -> Option<DoseEntry>;
}

/// Read access to the carbohydrate entry store.
pub trait CarbSource: Send + Sync {
    /// Modeled carb glucose effects covering `start` onward. When
    /// `counteraction` is supplied, absorption is paced by the observed
    /// counteraction velocities instead of the static model.
    fn glucose_effects_since(
        &self,
        start: DateTime<Utc>,
        counteraction: Option<&[GlucoseVelocity]>,
    ) -> Result<EffectTimeline, SourceError>;

    /// Effects restricted to carb entries that have not yet expired.
    fn unexpired_glucose_effects_since(
        &self,
        start: DateTime<Utc>,
        counteraction: Option<&[GlucoseVelocity]>,
    ) -> Result<EffectTimeline, SourceError>;

    /// Current estimated unabsorbed carbohydrate, grams.
    fn carbs_on_board(
        &self,
        at: DateTime<Utc>,
        counteraction: Option<&[GlucoseVelocity]>,
    ) -> Result<Option<f64>, SourceError>;
}

/// Synchronous snapshot of the therapy settings.
pub trait SettingsProvider: Send + Sync {
    fn settings(&self) -> LoopSettings;
}

/// Actuation delegate: receives basal-change recommendations and supplies
/// delivery-granularity rounding.
pub trait BasalDelegate {
    /// Enact the recommended temp basal; returns the dose as enacted.
    fn recommend_basal_change(
        &mut self,
        envelope: Recommendation<TempBasalRecommendation>,
    ) -> Result<DoseEntry, SourceError>;

    /// Round a basal rate (U/h) to a deliverable granularity.
    fn round_basal_rate(&self, units_per_hour: f64) -> f64 {
        units_per_hour
    }

    /// Round a bolus volume (U) to a deliverable granularity.
    fn round_bolus_volume(&self, units: f64) -> f64 {
        units
    }
}

/// Fire-and-forget user notification surface for carb corrections.
pub trait Notifier {
    fn send_carb_correction(&mut self, notification: CarbCorrectionNotification);
    fn send_badge(&mut self, grams: u32);
    fn clear_carb_correction(&mut self);
}
