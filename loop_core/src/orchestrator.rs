//! The update orchestrator.
//!
//! Owns the effect cache, the retrospective-correction controller and the
//! carb-correction engine, and drives one loop cycle end to end: fetch stale
//! effects from the stores concurrently, extend the counteraction history,
//! refresh the correction, forecast, and recommend doses. All cache commits
//! happen on the caller's thread after the fetch fan-in, so observers never
//! see a partially updated cycle.

use chrono::{DateTime, Utc};
use crossbeam_channel::unbounded;
use loop_traits::{
    BasalDelegate, BolusRecommendation, CarbSource, Clock, DoseEntry, DoseSource,
    EffectTimeline, GlucoseChange, GlucoseSample, GlucoseSource, GlucoseVelocity, LoopSettings,
    Notifier, PredictedGlucose, PredictionInput, Recommendation, SettingsProvider, SourceError,
    SystemClock, TempBasalRecommendation, RECOMMENDATION_VALIDITY,
};
use tracing::{debug, info, warn};

use crate::cache::{EffectCache, EffectKey};
use crate::carb_correction::{CarbCorrectionEngine, CarbCorrectionInputs, CarbCorrectionParams};
use crate::counteraction::{self, RETENTION};
use crate::dose::{self, DoseInputs};
use crate::error::{BuildError, LoopError, MissingDataKind, Result};
use crate::prediction::{self, PredictionSources, ZeroTempPolicy};
use crate::retrospection::{
    compute_discrepancy, CorrectionInput, IntegralRetrospectiveCorrection,
    RetrospectiveCorrection, StandardRetrospectiveCorrection,
};

/// Results of one concurrent fetch phase, tagged by slot.
enum Fetched {
    Momentum(std::result::Result<EffectTimeline, SourceError>),
    InsulinEffect(std::result::Result<EffectTimeline, SourceError>),
    RetroChange(std::result::Result<Option<GlucoseChange>, SourceError>),
    RecentChange(std::result::Result<Option<GlucoseChange>, SourceError>),
    CarbEffect(std::result::Result<EffectTimeline, SourceError>),
    UnexpiredCarbEffect(std::result::Result<EffectTimeline, SourceError>),
    CarbsOnBoard(std::result::Result<Option<f64>, SourceError>),
}

/// Builder for [`UpdateOrchestrator`]. Sources and the notifier are
/// mandatory; the clock, zero-temp policy and correction parameters have
/// working defaults.
pub struct LoopBuilder {
    glucose: Option<Box<dyn GlucoseSource>>,
    doses: Option<Box<dyn DoseSource>>,
    carbs: Option<Box<dyn CarbSource>>,
    settings: Option<Box<dyn SettingsProvider>>,
    notifier: Option<Box<dyn Notifier + Send>>,
    clock: Box<dyn Clock + Send>,
    zero_temp_policy: ZeroTempPolicy,
    carb_correction_params: CarbCorrectionParams,
}

impl Default for LoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopBuilder {
    pub fn new() -> Self {
        Self {
            glucose: None,
            doses: None,
            carbs: None,
            settings: None,
            notifier: None,
            clock: Box::new(SystemClock::new()),
            zero_temp_policy: ZeroTempPolicy::default(),
            carb_correction_params: CarbCorrectionParams::default(),
        }
    }

    pub fn glucose_source(mut self, source: Box<dyn GlucoseSource>) -> Self {
        self.glucose = Some(source);
        self
    }

    pub fn dose_source(mut self, source: Box<dyn DoseSource>) -> Self {
        self.doses = Some(source);
        self
    }

    pub fn carb_source(mut self, source: Box<dyn CarbSource>) -> Self {
        self.carbs = Some(source);
        self
    }

    pub fn settings_provider(mut self, provider: Box<dyn SettingsProvider>) -> Self {
        self.settings = Some(provider);
        self
    }

    pub fn notifier(mut self, notifier: Box<dyn Notifier + Send>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn clock(mut self, clock: Box<dyn Clock + Send>) -> Self {
        self.clock = clock;
        self
    }

    pub fn zero_temp_policy(mut self, policy: ZeroTempPolicy) -> Self {
        self.zero_temp_policy = policy;
        self
    }

    pub fn carb_correction_params(mut self, params: CarbCorrectionParams) -> Self {
        self.carb_correction_params = params;
        self
    }

    pub fn try_build(self) -> eyre::Result<UpdateOrchestrator> {
        let glucose = self.glucose.ok_or(BuildError::MissingGlucoseSource)?;
        let doses = self.doses.ok_or(BuildError::MissingDoseSource)?;
        let carbs = self.carbs.ok_or(BuildError::MissingCarbSource)?;
        let settings = self.settings.ok_or(BuildError::MissingSettingsProvider)?;
        let notifier = self.notifier.ok_or(BuildError::MissingNotifier)?;
        Ok(UpdateOrchestrator {
            glucose_source: glucose,
            dose_source: doses,
            carb_source: carbs,
            settings_provider: settings,
            notifier,
            clock: self.clock,
            zero_temp_policy: self.zero_temp_policy,
            cache: EffectCache::default(),
            correction: Box::new(StandardRetrospectiveCorrection::default()),
            correction_is_integral: false,
            carb_correction: CarbCorrectionEngine::new(self.carb_correction_params),
            glucose_updated: false,
            pending_retro_change: None,
            have_retro_change: false,
            pending_recent_change: None,
            last_requested_bolus: None,
            last_enacted_temp_basal: None,
            last_loop_completed: None,
            last_error: None,
        })
    }
}

pub struct UpdateOrchestrator {
    glucose_source: Box<dyn GlucoseSource>,
    dose_source: Box<dyn DoseSource>,
    carb_source: Box<dyn CarbSource>,
    settings_provider: Box<dyn SettingsProvider>,
    notifier: Box<dyn Notifier + Send>,
    clock: Box<dyn Clock + Send>,
    zero_temp_policy: ZeroTempPolicy,
    cache: EffectCache,
    correction: Box<dyn RetrospectiveCorrection>,
    correction_is_integral: bool,
    carb_correction: CarbCorrectionEngine,
    /// Set when new glucose arrives; consumed by the correction update.
    glucose_updated: bool,
    /// Glucose change over the retrospection window, staged between the
    /// fetch fan-in and the retrospection update.
    pending_retro_change: Option<GlucoseChange>,
    have_retro_change: bool,
    /// Change past the counteraction history's end, staged for extension.
    pending_recent_change: Option<GlucoseChange>,
    /// Units and request date of a bolus awaiting pump confirmation.
    last_requested_bolus: Option<(f64, DateTime<Utc>)>,
    last_enacted_temp_basal: Option<DoseEntry>,
    last_loop_completed: Option<DateTime<Utc>>,
    last_error: Option<LoopError>,
}

impl UpdateOrchestrator {
    pub fn builder() -> LoopBuilder {
        LoopBuilder::new()
    }

    // Input-change notifications from the host. Each poisons exactly the
    // derived state the changed input feeds.

    pub fn note_glucose_added(&mut self) {
        self.glucose_updated = true;
        self.cache.note_glucose_changed();
    }

    pub fn note_carbs_changed(&mut self) {
        self.cache.note_carbs_changed();
    }

    pub fn note_dose_changed(&mut self) {
        self.cache.note_dose_changed();
    }

    pub fn note_settings_changed(&mut self) {
        self.cache.note_settings_changed();
        self.correction.reset();
    }

    /// A bolus was sent to the pump; dosing defers until it is confirmed.
    pub fn note_bolus_requested(&mut self, units: f64) {
        self.last_requested_bolus = Some((units, self.clock.now()));
        self.cache.invalidate(EffectKey::TempBasal);
        self.cache.invalidate(EffectKey::Bolus);
    }

    /// The pump confirmed (or failed) the in-flight bolus.
    pub fn note_bolus_confirmed(&mut self) {
        self.last_requested_bolus = None;
        self.cache.note_dose_changed();
    }

    // Read accessors over the cached cycle results.

    pub fn predicted_glucose(&self) -> Option<&[PredictedGlucose]> {
        self.cache.prediction()
    }

    pub fn recommended_temp_basal(&self) -> Option<&Recommendation<TempBasalRecommendation>> {
        self.cache.temp_basal()
    }

    pub fn recommended_bolus(&self) -> Option<&Recommendation<BolusRecommendation>> {
        self.cache.bolus()
    }

    pub fn carbs_on_board(&self) -> Option<f64> {
        self.cache.carbs_on_board()
    }

    pub fn counteraction_history(&self) -> Option<&[GlucoseVelocity]> {
        self.cache.counteraction()
    }

    pub fn retrospective_correction(&self) -> Option<f64> {
        self.correction.total_correction()
    }

    pub fn last_loop_completed(&self) -> Option<DateTime<Utc>> {
        self.last_loop_completed
    }

    pub fn last_enacted_temp_basal(&self) -> Option<DoseEntry> {
        self.last_enacted_temp_basal
    }

    /// Insulin already requested but not yet reflected in the delivery
    /// history: the in-flight bolus plus the above-schedule remainder of the
    /// running temp basal.
    pub fn pending_insulin(&self) -> f64 {
        let now = self.clock.now();
        let settings = self.settings_provider.settings();
        let mut pending = self.last_requested_bolus.map_or(0.0, |(units, _)| units);
        if let (Some(temp), Some(basal)) = (
            self.dose_source.active_temp_basal(),
            settings.basal_rates.as_ref(),
        ) && temp.end_date > now
        {
            let remaining_hours = (temp.end_date - now).num_seconds() as f64 / 3600.0;
            let excess = temp.units_per_hour - basal.value_at(now);
            pending += (excess * remaining_hours).max(0.0);
        }
        pending
    }

    /// Run one loop cycle. Soft failures (a store fetch failing, a
    /// correction degrading) are logged and leave their slot empty; the
    /// first hard failure in dependency order is returned after independent
    /// branches have still been given their chance to run.
    pub fn update(&mut self) -> Result<()> {
        let now = self.clock.now();
        let settings = self.settings_provider.settings();

        let latest = self
            .glucose_source
            .latest_sample()
            .ok_or(LoopError::MissingData(MissingDataKind::Glucose))?;
        // A sample older than the recency window is as good as no sample:
        // nothing downstream should run against it.
        if now - latest.start_date > settings.recency_interval {
            return Err(LoopError::MissingData(MissingDataKind::Glucose));
        }
        debug!(glucose = latest.value, date = %latest.start_date, "cycle start");

        self.swap_correction_if_needed(&settings);

        let retro_start = latest.start_date - settings.retrospection_interval;
        let counteraction_end = self
            .cache
            .counteraction()
            .and_then(|h| h.last().map(|v| v.end_date));
        let effect_start = counteraction_end.map_or(retro_start, |d| d.min(retro_start));

        self.fetch_glucose_and_insulin(latest, retro_start, effect_start, counteraction_end);
        self.extend_counteraction(now);
        self.fetch_carb_state(effect_start, now, &settings);
        self.update_retrospection(latest, &settings, now);
        self.update_zero_temp(latest, &settings);

        let mut first_error: Option<LoopError> = None;
        if let Err(e) = self.update_prediction_and_doses(latest, &settings, now) {
            warn!(error = %e, "forecast or dosing unavailable this cycle");
            first_error = Some(e);
        }
        if let Err(e) = self.update_carb_correction(latest, &settings, now) {
            warn!(error = %e, "carb correction unavailable this cycle");
            first_error.get_or_insert(e);
        }

        self.last_error = first_error.clone();
        match first_error {
            Some(e) => Err(e),
            None => {
                self.last_loop_completed = Some(now);
                info!("cycle complete");
                Ok(())
            }
        }
    }

    /// Enact the cached temp-basal recommendation through the delegate,
    /// rounding to the pump's delivery granularity. Expired envelopes are
    /// rejected, never silently re-dosed.
    pub fn enact_recommended_temp_basal(
        &mut self,
        delegate: &mut dyn BasalDelegate,
    ) -> Result<()> {
        let Some(envelope) = self.cache.temp_basal().copied() else {
            return Ok(());
        };
        dose::ensure_fresh(&envelope, self.clock.now())?;
        let rounded = Recommendation::new(
            TempBasalRecommendation {
                units_per_hour: delegate
                    .round_basal_rate(envelope.recommendation.units_per_hour),
                duration: envelope.recommendation.duration,
            },
            envelope.date,
        );
        let enacted = delegate
            .recommend_basal_change(rounded)
            .map_err(|e| LoopError::InvalidData(e.to_string()))?;
        info!(rate = enacted.units_per_hour, "temp basal enacted");
        self.last_enacted_temp_basal = Some(enacted);
        self.cache.take_temp_basal();
        self.cache.note_dose_changed();
        Ok(())
    }

    fn swap_correction_if_needed(&mut self, settings: &LoopSettings) {
        if settings.integral_retrospective_correction != self.correction_is_integral {
            self.correction = if settings.integral_retrospective_correction {
                Box::new(IntegralRetrospectiveCorrection::new())
            } else {
                Box::new(StandardRetrospectiveCorrection::default())
            };
            self.correction_is_integral = settings.integral_retrospective_correction;
            self.cache.invalidate(EffectKey::RetrospectiveCorrection);
        }
    }

    /// Fork-join fetch of the glucose-and-insulin-derived slots that are
    /// currently stale. Runs before carb fetches because carb absorption is
    /// paced by the counteraction history these feed.
    fn fetch_glucose_and_insulin(
        &mut self,
        latest: GlucoseSample,
        retro_start: DateTime<Utc>,
        effect_start: DateTime<Utc>,
        counteraction_end: Option<DateTime<Utc>>,
    ) {
        let need_momentum = !self.cache.contains(EffectKey::MomentumEffect);
        let need_insulin = !self.cache.contains(EffectKey::InsulinEffect);
        let need_retro_change = !self.cache.contains(EffectKey::RetrospectiveDiscrepancy);
        let need_recent_change = counteraction_end.is_none_or(|end| end < latest.start_date);
        let change_start = counteraction_end.unwrap_or(retro_start);

        let glucose_source = &*self.glucose_source;
        let dose_source = &*self.dose_source;
        let (tx, rx) = unbounded();
        std::thread::scope(|scope| {
            if need_momentum {
                let tx = tx.clone();
                scope.spawn(move || {
                    tx.send(Fetched::Momentum(glucose_source.momentum_effect())).ok();
                });
            }
            if need_insulin {
                let tx = tx.clone();
                scope.spawn(move || {
                    tx.send(Fetched::InsulinEffect(
                        dose_source.glucose_effects_since(effect_start),
                    ))
                    .ok();
                });
            }
            if need_retro_change {
                let tx = tx.clone();
                scope.spawn(move || {
                    tx.send(Fetched::RetroChange(glucose_source.change_since(retro_start)))
                        .ok();
                });
            }
            if need_recent_change {
                let tx = tx.clone();
                scope.spawn(move || {
                    tx.send(Fetched::RecentChange(glucose_source.change_since(change_start)))
                        .ok();
                });
            }
        });
        drop(tx);

        let mut recent_change = None;
        for fetched in rx {
            match fetched {
                Fetched::Momentum(Ok(effect)) => self.cache.set_momentum_effect(effect),
                Fetched::InsulinEffect(Ok(effect)) => self.cache.set_insulin_effect(effect),
                Fetched::RetroChange(Ok(change)) => {
                    self.pending_retro_change = change;
                    self.have_retro_change = true;
                }
                Fetched::RecentChange(Ok(change)) => recent_change = change,
                Fetched::Momentum(Err(e)) => warn!(error = %e, "momentum fetch failed"),
                Fetched::InsulinEffect(Err(e)) => warn!(error = %e, "insulin effect fetch failed"),
                Fetched::RetroChange(Err(e)) => warn!(error = %e, "glucose change fetch failed"),
                Fetched::RecentChange(Err(e)) => warn!(error = %e, "glucose change fetch failed"),
                _ => {}
            }
        }
        self.pending_recent_change = recent_change;
    }

    /// Attribute the newest observed glucose change to non-insulin causes
    /// and append it to the counteraction history.
    fn extend_counteraction(&mut self, now: DateTime<Utc>) {
        let Some(change) = self.pending_recent_change.take() else {
            return;
        };
        let Some(insulin_effect) = self.cache.insulin_effect() else {
            warn!("cannot extend counteraction without insulin effects");
            return;
        };
        if let Some(velocity) = counteraction::counteraction_velocity(&change, insulin_effect) {
            self.cache.append_counteraction(vec![velocity], now - RETENTION);
        }
    }

    /// Fork-join fetch of the carb-derived slots, paced by the counteraction
    /// history when dynamic absorption is enabled.
    fn fetch_carb_state(
        &mut self,
        effect_start: DateTime<Utc>,
        now: DateTime<Utc>,
        settings: &LoopSettings,
    ) {
        let need_carb = !self.cache.contains(EffectKey::CarbEffect);
        let need_unexpired = !self.cache.contains(EffectKey::UnexpiredCarbEffect);
        let need_cob = !self.cache.contains(EffectKey::CarbsOnBoard);
        if !(need_carb || need_unexpired || need_cob) {
            return;
        }

        let counteraction = if settings.dynamic_carb_absorption {
            self.cache.counteraction().map(<[GlucoseVelocity]>::to_vec)
        } else {
            None
        };
        let counteraction = counteraction.as_deref();

        let carb_source = &*self.carb_source;
        let (tx, rx) = unbounded();
        std::thread::scope(|scope| {
            if need_carb {
                let tx = tx.clone();
                scope.spawn(move || {
                    tx.send(Fetched::CarbEffect(
                        carb_source.glucose_effects_since(effect_start, counteraction),
                    ))
                    .ok();
                });
            }
            if need_unexpired {
                let tx = tx.clone();
                scope.spawn(move || {
                    tx.send(Fetched::UnexpiredCarbEffect(
                        carb_source.unexpired_glucose_effects_since(effect_start, counteraction),
                    ))
                    .ok();
                });
            }
            if need_cob {
                let tx = tx.clone();
                scope.spawn(move || {
                    tx.send(Fetched::CarbsOnBoard(
                        carb_source.carbs_on_board(now, counteraction),
                    ))
                    .ok();
                });
            }
        });
        drop(tx);

        for fetched in rx {
            match fetched {
                Fetched::CarbEffect(Ok(effect)) => self.cache.set_carb_effect(effect),
                Fetched::UnexpiredCarbEffect(Ok(effect)) => {
                    self.cache.set_unexpired_carb_effect(effect);
                }
                Fetched::CarbsOnBoard(Ok(Some(grams))) => self.cache.set_carbs_on_board(grams),
                Fetched::CarbsOnBoard(Ok(None)) => {}
                Fetched::CarbEffect(Err(e)) => warn!(error = %e, "carb effect fetch failed"),
                Fetched::UnexpiredCarbEffect(Err(e)) => {
                    warn!(error = %e, "unexpired carb effect fetch failed");
                }
                Fetched::CarbsOnBoard(Err(e)) => warn!(error = %e, "carbs on board fetch failed"),
                _ => {}
            }
        }
    }

    /// Refresh the retrospective discrepancy and correction. Degrades to no
    /// correction when inputs are unavailable; never fails the cycle.
    fn update_retrospection(
        &mut self,
        latest: GlucoseSample,
        settings: &LoopSettings,
        now: DateTime<Utc>,
    ) {
        if self.cache.contains(EffectKey::RetrospectiveCorrection) {
            return;
        }

        if !self.cache.contains(EffectKey::RetrospectiveDiscrepancy)
            && self.have_retro_change
        {
            self.have_retro_change = false;
            if let Some(change) = self.pending_retro_change.take() {
                match compute_discrepancy(
                    &change,
                    self.cache.carb_effect(),
                    self.cache.insulin_effect(),
                ) {
                    Ok(discrepancy) => self.cache.set_retrospective_discrepancy(discrepancy),
                    Err(e) => warn!(error = %e, "retrospection discrepancy unavailable"),
                }
            }
            // A missing change (sensor calibration) leaves the slot empty
            // and resets any stateful correction below.
        }

        let discrepancy = self.cache.retrospective_discrepancy().copied();
        let effect = self.correction.update(CorrectionInput {
            latest_glucose: latest,
            discrepancy: discrepancy.as_ref(),
            settings,
            glucose_fresh: self.glucose_updated,
            now,
        });
        self.glucose_updated = false;
        self.cache.set_retrospective_effect(effect);
    }

    fn update_zero_temp(&mut self, latest: GlucoseSample, settings: &LoopSettings) {
        let (Some(basal), Some(sensitivity)) =
            (settings.basal_rates.as_ref(), settings.insulin_sensitivity.as_ref())
        else {
            self.cache.invalidate(EffectKey::ZeroTemp);
            return;
        };
        let effect = prediction::zero_temp_effect(
            latest.start_date,
            basal,
            sensitivity,
            settings.insulin_action_duration,
        );
        self.cache.set_zero_temp_effect(effect);
    }

    /// Forecast and dose recommendations. Hard-fails on missing effects,
    /// stale anchors or incomplete configuration.
    fn update_prediction_and_doses(
        &mut self,
        latest: GlucoseSample,
        settings: &LoopSettings,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if !self.cache.contains(EffectKey::Prediction) {
            let prediction = self.forecast(latest, settings)?;
            self.cache.set_prediction(prediction);
        }

        let last_pump_date = self
            .dose_source
            .last_pump_data_date()
            .ok_or(LoopError::MissingData(MissingDataKind::PumpData))?;

        // Pump data fetched past the request's validity window covers the
        // bolus whether or not it was delivered; drop the marker so dosing
        // resumes from the reconciled history.
        if let Some((_, requested_at)) = self.last_requested_bolus
            && last_pump_date > requested_at + RECOMMENDATION_VALIDITY
        {
            self.last_requested_bolus = None;
        }

        if !self.cache.contains(EffectKey::TempBasal) && self.last_requested_bolus.is_none() {
            let prediction = self
                .cache
                .prediction()
                .ok_or(LoopError::MissingData(MissingDataKind::Glucose))?;
            let inputs = DoseInputs {
                prediction,
                last_pump_date,
                settings,
                now,
            };
            if let Some(recommendation) = dose::recommend_temp_basal(
                &inputs,
                self.dose_source.active_temp_basal(),
                |rate| rate,
            )? {
                self.cache.set_temp_basal(recommendation);
            }
        }

        if !self.cache.contains(EffectKey::Bolus) {
            let pending = self.pending_insulin();
            let prediction = self
                .cache
                .prediction()
                .ok_or(LoopError::MissingData(MissingDataKind::Glucose))?;
            let inputs = DoseInputs {
                prediction,
                last_pump_date,
                settings,
                now,
            };
            let recommendation = dose::recommend_bolus(&inputs, pending, |units| units)?;
            self.cache.set_bolus(recommendation);
        }
        Ok(())
    }

    /// Assemble the dosing forecast from the cached effects, blending in a
    /// fraction of the zero-temp effect scaled by how far the unmitigated
    /// forecast runs above the policy threshold.
    fn forecast(
        &self,
        latest: GlucoseSample,
        settings: &LoopSettings,
    ) -> Result<Vec<PredictedGlucose>> {
        let sources = PredictionSources {
            carb_effect: self.cache.carb_effect(),
            unexpired_carb_effect: self.cache.unexpired_carb_effect(),
            insulin_effect: self.cache.insulin_effect(),
            momentum_effect: self.cache.momentum_effect(),
            retrospective_effect: self.cache.retrospective_effect(),
            zero_temp_effect: self.cache.zero_temp_effect(),
        };
        let inputs = settings.enabled_effects & !PredictionInput::ZERO_TEMP;
        let base = prediction::predict_with_inputs(
            latest,
            inputs,
            &sources,
            settings.insulin_action_duration,
        )?;

        if !settings.enabled_effects.contains(PredictionInput::ZERO_TEMP) {
            return Ok(base);
        }
        let Some(zero_temp) = self.cache.zero_temp_effect() else {
            return Ok(base);
        };
        let peak = base.iter().map(|p| p.value).fold(f64::NEG_INFINITY, f64::max);
        let scaled = self.zero_temp_policy.scaled_effect(zero_temp, peak);
        if scaled.last().is_none_or(|p| p.delta == 0.0) {
            return Ok(base);
        }
        let scaled_sources = PredictionSources {
            zero_temp_effect: Some(&scaled),
            ..sources
        };
        prediction::predict_with_inputs(
            latest,
            inputs | PredictionInput::ZERO_TEMP,
            &scaled_sources,
            settings.insulin_action_duration,
        )
    }

    /// Run the carb-correction advisory over the refreshed effects.
    fn update_carb_correction(
        &mut self,
        latest: GlucoseSample,
        settings: &LoopSettings,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if self.cache.contains(EffectKey::CarbCorrection) {
            return Ok(());
        }
        let empty: Vec<GlucoseVelocity> = Vec::new();
        let inputs = CarbCorrectionInputs {
            glucose: latest,
            carb_effect: self.cache.carb_effect(),
            unexpired_carb_effect: self.cache.unexpired_carb_effect(),
            insulin_effect: self.cache.insulin_effect(),
            momentum_effect: self.cache.momentum_effect(),
            zero_temp_effect: self.cache.zero_temp_effect(),
            retrospective_effect: self.cache.retrospective_effect(),
            counteraction: self.cache.counteraction().unwrap_or(&empty),
            settings,
            now,
        };
        if let Some(decision) = self.carb_correction.update(&inputs, &mut *self.notifier)? {
            self.cache.set_carb_correction(decision);
        }
        Ok(())
    }

    /// Human-readable state dump for issue reports.
    pub fn diagnostic_report(&self) -> String {
        let mut report = String::from("## Loop State\n");
        let mut line = |s: String| {
            report.push_str(&s);
            report.push('\n');
        };
        line(format!("last loop completed: {:?}", self.last_loop_completed));
        line(format!("last error: {:?}", self.last_error));
        line(format!(
            "latest glucose: {:?}",
            self.glucose_source.latest_sample()
        ));
        line(format!("carbs on board: {:?}", self.cache.carbs_on_board()));
        line(format!(
            "retrospective correction (mg/dL): {:?}",
            self.correction.total_correction()
        ));
        line(format!(
            "predicted glucose points: {}",
            self.cache.prediction().map_or(0, <[PredictedGlucose]>::len)
        ));
        line(format!(
            "recommended temp basal: {:?}",
            self.cache.temp_basal()
        ));
        line(format!("recommended bolus: {:?}", self.cache.bolus()));
        line(format!(
            "counteraction entries: {}",
            self.cache.counteraction().map_or(0, <[GlucoseVelocity]>::len)
        ));
        line(format!("pending insulin (U): {:.2}", self.pending_insulin()));
        report.push('\n');
        report.push_str(&self.carb_correction.diagnostic_report());
        report
    }
}
