//! Collaborator seam for the glucose loop core.
//!
//! This crate defines the value types exchanged with the external stores
//! (glucose history, insulin delivery, carbohydrate entries), the store
//! traits themselves, the settings snapshot, and a clock abstraction for
//! deterministic time in tests. It carries no algorithmic logic.

pub mod clock;
pub mod schedule;
pub mod settings;
pub mod sources;
pub mod types;

pub use clock::{Clock, SystemClock, TestClock};
pub use schedule::{DailySchedule, TargetRangeSchedule};
pub use settings::{LoopSettings, PredictionInput};
pub use sources::{
    BasalDelegate, CarbSource, DoseSource, GlucoseSource, Notifier, SettingsProvider, SourceError,
};
pub use types::{
    BolusRecommendation, CarbCorrectionKind, CarbCorrectionNotification, DoseEntry, EffectTimeline,
    GlucoseChange, GlucoseEffect, GlucoseSample, GlucoseVelocity, PredictedGlucose,
    Recommendation, TempBasalRecommendation, RECOMMENDATION_VALIDITY,
};
