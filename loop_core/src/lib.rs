#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::unwrap_used, clippy::expect_used)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
//! Decision core of a closed-loop insulin dosing controller.
//!
//! The core is a pure decision library: durable storage, the CGM, the pump
//! and the UI all live behind the traits in `loop_traits`. Each cycle the
//! [`UpdateOrchestrator`] pulls whatever derived effects have gone stale,
//! reconciles the model against observed glucose, forecasts, and produces
//! advisory dose recommendations that the host may enact.
//!
//! - All glucose math is f64 mg/dL; timestamps are `chrono` UTC.
//! - Derived state lives in a typed effect cache with declared dependency
//!   edges; a populated slot is always consistent with its upstreams.
//! - No error path ever turns into a dose: failures surface as typed
//!   [`LoopError`] values and leave the pump untouched.

pub mod cache;
pub mod carb_correction;
pub mod conversions;
pub mod counteraction;
pub mod dose;
pub mod error;
mod math;
pub mod mocks;
pub mod orchestrator;
pub mod parameter_estimation;
pub mod prediction;
pub mod retrospection;

pub use cache::{EffectCache, EffectKey};
pub use carb_correction::{CarbCorrectionEngine, CarbCorrectionInputs, CarbCorrectionParams};
pub use conversions::settings_from_config;
pub use dose::{recommend_bolus, recommend_temp_basal, DoseInputs, TEMP_BASAL_DURATION};
pub use error::{BuildError, ConfigKind, LoopError, MissingDataKind, Report, Result};
pub use orchestrator::{LoopBuilder, UpdateOrchestrator};
pub use parameter_estimation::{estimate_carb_window, estimate_fasting, EstimatedMultipliers};
pub use prediction::{
    predict_glucose, predict_with_inputs, zero_temp_effect, PredictionSources, ZeroTempPolicy,
    EFFECT_INTERVAL,
};
pub use retrospection::{
    compute_discrepancy, CorrectionInput, Discrepancy, IntegralRetrospectiveCorrection,
    RetrospectiveCorrection, StandardRetrospectiveCorrection,
};
