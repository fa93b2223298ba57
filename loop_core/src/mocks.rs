//! In-memory store implementations for tests and examples.
//!
//! Each fixture wraps its state in `Arc<Mutex<_>>` so tests can mutate the
//! backing data between loop cycles while the orchestrator holds the trait
//! object.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use loop_traits::{
    CarbCorrectionNotification, CarbSource, DoseEntry, DoseSource, EffectTimeline,
    GlucoseChange, GlucoseSample, GlucoseSource, GlucoseVelocity, LoopSettings, Notifier,
    Recommendation, SettingsProvider, SourceError, TempBasalRecommendation,
};

fn fetch_error(what: &str) -> SourceError {
    format!("{what} unavailable").into()
}

#[derive(Debug, Default)]
pub struct GlucoseFixtureState {
    pub samples: Vec<GlucoseSample>,
    pub momentum: EffectTimeline,
    pub fail_momentum: bool,
}

/// Glucose store backed by a plain sample list.
#[derive(Debug, Clone, Default)]
pub struct GlucoseFixture {
    state: Arc<Mutex<GlucoseFixtureState>>,
}

impl GlucoseFixture {
    pub fn new(samples: Vec<GlucoseSample>, momentum: EffectTimeline) -> Self {
        Self {
            state: Arc::new(Mutex::new(GlucoseFixtureState {
                samples,
                momentum,
                fail_momentum: false,
            })),
        }
    }

    pub fn push_sample(&self, sample: GlucoseSample) {
        self.lock().samples.push(sample);
    }

    pub fn replace_samples(&self, samples: Vec<GlucoseSample>) {
        self.lock().samples = samples;
    }

    pub fn set_momentum(&self, momentum: EffectTimeline) {
        self.lock().momentum = momentum;
    }

    pub fn set_fail_momentum(&self, fail: bool) {
        self.lock().fail_momentum = fail;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GlucoseFixtureState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl GlucoseSource for GlucoseFixture {
    fn latest_sample(&self) -> Option<GlucoseSample> {
        self.lock().samples.last().copied()
    }

    fn samples_since(&self, start: DateTime<Utc>) -> Result<Vec<GlucoseSample>, SourceError> {
        Ok(self
            .lock()
            .samples
            .iter()
            .filter(|s| s.start_date >= start)
            .copied()
            .collect())
    }

    fn momentum_effect(&self) -> Result<EffectTimeline, SourceError> {
        let state = self.lock();
        if state.fail_momentum {
            return Err(fetch_error("momentum"));
        }
        Ok(state.momentum.clone())
    }

    fn change_since(&self, start: DateTime<Utc>) -> Result<Option<GlucoseChange>, SourceError> {
        let state = self.lock();
        let mut in_range = state.samples.iter().filter(|s| s.start_date >= start);
        let first = in_range.next().copied();
        let last = state.samples.last().copied();
        Ok(match (first, last) {
            (Some(start), Some(end)) if end.start_date > start.start_date => {
                Some(GlucoseChange { start, end })
            }
            _ => None,
        })
    }
}

#[derive(Debug, Default)]
pub struct DoseFixtureState {
    pub insulin_effect: EffectTimeline,
    pub last_pump_date: Option<DateTime<Utc>>,
    pub active_temp_basal: Option<DoseEntry>,
    pub fail_effects: bool,
}

/// Insulin delivery store with a precomputed effect timeline.
#[derive(Debug, Clone, Default)]
pub struct DoseFixture {
    state: Arc<Mutex<DoseFixtureState>>,
}

impl DoseFixture {
    pub fn new(insulin_effect: EffectTimeline, last_pump_date: Option<DateTime<Utc>>) -> Self {
        Self {
            state: Arc::new(Mutex::new(DoseFixtureState {
                insulin_effect,
                last_pump_date,
                active_temp_basal: None,
                fail_effects: false,
            })),
        }
    }

    pub fn set_last_pump_date(&self, date: DateTime<Utc>) {
        self.lock().last_pump_date = Some(date);
    }

    pub fn set_active_temp_basal(&self, dose: Option<DoseEntry>) {
        self.lock().active_temp_basal = dose;
    }

    pub fn set_insulin_effect(&self, effect: EffectTimeline) {
        self.lock().insulin_effect = effect;
    }

    pub fn set_fail_effects(&self, fail: bool) {
        self.lock().fail_effects = fail;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DoseFixtureState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl DoseSource for DoseFixture {
    fn glucose_effects_since(&self, start: DateTime<Utc>) -> Result<EffectTimeline, SourceError> {
        let state = self.lock();
        if state.fail_effects {
            return Err(fetch_error("insulin effects"));
        }
        Ok(state
            .insulin_effect
            .iter()
            .filter(|p| p.date >= start)
            .copied()
            .collect())
    }

    fn last_pump_data_date(&self) -> Option<DateTime<Utc>> {
        self.lock().last_pump_date
    }

    fn active_temp_basal(&self) -> Option<DoseEntry> {
        self.lock().active_temp_basal
    }
}

#[derive(Debug, Default)]
pub struct CarbFixtureState {
    pub carb_effect: EffectTimeline,
    pub unexpired_carb_effect: EffectTimeline,
    pub carbs_on_board: Option<f64>,
    pub fail_effects: bool,
    /// Whether the most recent effect fetch was handed counteraction data.
    pub saw_counteraction: bool,
}

/// Carb store with precomputed effect timelines.
#[derive(Debug, Clone, Default)]
pub struct CarbFixture {
    state: Arc<Mutex<CarbFixtureState>>,
}

impl CarbFixture {
    pub fn new(carb_effect: EffectTimeline, carbs_on_board: Option<f64>) -> Self {
        Self {
            state: Arc::new(Mutex::new(CarbFixtureState {
                unexpired_carb_effect: carb_effect.clone(),
                carb_effect,
                carbs_on_board,
                fail_effects: false,
                saw_counteraction: false,
            })),
        }
    }

    pub fn set_carb_effect(&self, effect: EffectTimeline) {
        self.lock().carb_effect = effect;
    }

    pub fn set_unexpired_carb_effect(&self, effect: EffectTimeline) {
        self.lock().unexpired_carb_effect = effect;
    }

    pub fn set_fail_effects(&self, fail: bool) {
        self.lock().fail_effects = fail;
    }

    pub fn saw_counteraction(&self) -> bool {
        self.lock().saw_counteraction
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CarbFixtureState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl CarbSource for CarbFixture {
    fn glucose_effects_since(
        &self,
        start: DateTime<Utc>,
        counteraction: Option<&[GlucoseVelocity]>,
    ) -> Result<EffectTimeline, SourceError> {
        let mut state = self.lock();
        state.saw_counteraction = counteraction.is_some();
        if state.fail_effects {
            return Err(fetch_error("carb effects"));
        }
        Ok(state
            .carb_effect
            .iter()
            .filter(|p| p.date >= start)
            .copied()
            .collect())
    }

    fn unexpired_glucose_effects_since(
        &self,
        start: DateTime<Utc>,
        _counteraction: Option<&[GlucoseVelocity]>,
    ) -> Result<EffectTimeline, SourceError> {
        let state = self.lock();
        if state.fail_effects {
            return Err(fetch_error("carb effects"));
        }
        Ok(state
            .unexpired_carb_effect
            .iter()
            .filter(|p| p.date >= start)
            .copied()
            .collect())
    }

    fn carbs_on_board(
        &self,
        _at: DateTime<Utc>,
        _counteraction: Option<&[GlucoseVelocity]>,
    ) -> Result<Option<f64>, SourceError> {
        Ok(self.lock().carbs_on_board)
    }
}

/// Settings provider returning a cloned snapshot.
#[derive(Debug, Clone)]
pub struct SettingsFixture {
    state: Arc<Mutex<LoopSettings>>,
}

impl SettingsFixture {
    pub fn new(settings: LoopSettings) -> Self {
        Self {
            state: Arc::new(Mutex::new(settings)),
        }
    }

    pub fn replace(&self, settings: LoopSettings) {
        *self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = settings;
    }
}

impl SettingsProvider for SettingsFixture {
    fn settings(&self) -> LoopSettings {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

/// Notifier that records everything it is asked to surface.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    pub banners: Vec<CarbCorrectionNotification>,
    pub badges: Vec<u32>,
    pub clears: usize,
}

impl Notifier for RecordingNotifier {
    fn send_carb_correction(&mut self, notification: CarbCorrectionNotification) {
        self.banners.push(notification);
    }

    fn send_badge(&mut self, grams: u32) {
        self.badges.push(grams);
    }

    fn clear_carb_correction(&mut self) {
        self.clears += 1;
    }
}

/// Basal delegate that records enacted recommendations.
#[derive(Debug, Default)]
pub struct RecordingDelegate {
    pub enacted: Vec<Recommendation<TempBasalRecommendation>>,
    pub fail_next: bool,
}

impl loop_traits::BasalDelegate for RecordingDelegate {
    fn recommend_basal_change(
        &mut self,
        envelope: Recommendation<TempBasalRecommendation>,
    ) -> Result<DoseEntry, SourceError> {
        if self.fail_next {
            self.fail_next = false;
            return Err(fetch_error("pump"));
        }
        self.enacted.push(envelope);
        Ok(DoseEntry {
            start_date: envelope.date,
            end_date: envelope.date + envelope.recommendation.duration,
            units_per_hour: envelope.recommendation.units_per_hour,
        })
    }

    fn round_basal_rate(&self, units_per_hour: f64) -> f64 {
        (units_per_hour * 20.0).round() / 20.0
    }

    fn round_bolus_volume(&self, units: f64) -> f64 {
        (units * 40.0).round() / 40.0
    }
}
