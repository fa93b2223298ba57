use chrono::{DateTime, Utc};
use thiserror::Error;

/// Which required input is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingDataKind {
    Glucose,
    MomentumEffect,
    CarbEffect,
    InsulinEffect,
    PumpData,
}

impl std::fmt::Display for MissingDataKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Glucose => "glucose",
            Self::MomentumEffect => "momentum effect",
            Self::CarbEffect => "carb effect",
            Self::InsulinEffect => "insulin effect",
            Self::PumpData => "pump data",
        };
        f.write_str(s)
    }
}

/// Which part of the configuration is absent or unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKind {
    BasalSchedule,
    InsulinModel,
    Settings,
}

impl std::fmt::Display for ConfigKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::BasalSchedule => "basal rate schedule",
            Self::InsulinModel => "insulin model",
            Self::Settings => "settings",
        };
        f.write_str(s)
    }
}

/// Typed failure kinds of the loop cycle.
///
/// Data unavailability is recovered locally (the affected cache entry is
/// cleared and dependents are skipped for the cycle); configuration and
/// recency errors propagate to the orchestrator's caller. No error is ever
/// converted into a dose recommendation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LoopError {
    #[error("missing data: {0}")]
    MissingData(MissingDataKind),
    #[error("configuration error: {0}")]
    Configuration(ConfigKind),
    #[error("glucose data too old: last sample at {0}")]
    GlucoseTooOld(DateTime<Utc>),
    #[error("pump data too old: last report at {0}")]
    PumpDataTooOld(DateTime<Utc>),
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("recommendation expired: computed at {0}")]
    RecommendationExpired(DateTime<Utc>),
}

pub type Result<T, E = LoopError> = std::result::Result<T, E>;
pub use eyre::Report;

/// Construction failures raised by [`crate::orchestrator::LoopBuilder`].
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("glucose source is required")]
    MissingGlucoseSource,
    #[error("dose source is required")]
    MissingDoseSource,
    #[error("carb source is required")]
    MissingCarbSource,
    #[error("settings provider is required")]
    MissingSettingsProvider,
    #[error("notifier is required")]
    MissingNotifier,
}
