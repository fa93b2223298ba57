//! Cached derived state and its invalidation graph.
//!
//! Every derived value the loop computes lives in one typed slot here. The
//! dependency edges between slots are declared in one place
//! ([`dependents`]); storing a new value or invalidating a slot clears its
//! transitive dependents, so a consumer can trust that a populated slot is
//! consistent with everything upstream of it.

use chrono::{DateTime, Utc};
use loop_traits::{
    BolusRecommendation, CarbCorrectionNotification, EffectTimeline, GlucoseVelocity,
    PredictedGlucose, Recommendation, TempBasalRecommendation,
};

use crate::retrospection::Discrepancy;

/// One derived value in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectKey {
    CarbEffect,
    UnexpiredCarbEffect,
    InsulinEffect,
    MomentumEffect,
    Counteraction,
    CarbsOnBoard,
    ZeroTemp,
    RetrospectiveDiscrepancy,
    RetrospectiveCorrection,
    Prediction,
    TempBasal,
    Bolus,
    CarbCorrection,
}

impl EffectKey {
    pub const ALL: [EffectKey; 13] = [
        EffectKey::CarbEffect,
        EffectKey::UnexpiredCarbEffect,
        EffectKey::InsulinEffect,
        EffectKey::MomentumEffect,
        EffectKey::Counteraction,
        EffectKey::CarbsOnBoard,
        EffectKey::ZeroTemp,
        EffectKey::RetrospectiveDiscrepancy,
        EffectKey::RetrospectiveCorrection,
        EffectKey::Prediction,
        EffectKey::TempBasal,
        EffectKey::Bolus,
        EffectKey::CarbCorrection,
    ];
}

/// The direct downstream consumers of each slot. This table is the whole
/// dependency graph; invalidation walks it transitively.
fn dependents(key: EffectKey) -> &'static [EffectKey] {
    use EffectKey::*;
    match key {
        CarbEffect => &[Prediction, RetrospectiveDiscrepancy, CarbCorrection],
        UnexpiredCarbEffect => &[CarbCorrection],
        InsulinEffect => &[Prediction, CarbCorrection],
        MomentumEffect => &[Prediction, CarbCorrection],
        Counteraction => &[CarbEffect, UnexpiredCarbEffect, CarbsOnBoard],
        CarbsOnBoard => &[],
        ZeroTemp => &[CarbCorrection],
        RetrospectiveDiscrepancy => &[RetrospectiveCorrection],
        RetrospectiveCorrection => &[Prediction, CarbCorrection],
        Prediction => &[TempBasal, Bolus],
        TempBasal => &[],
        Bolus => &[],
        CarbCorrection => &[],
    }
}

/// Typed storage for every derived value, plus the invalidation walk.
///
/// Counteraction history is append-only and survives `clear_all`; it is
/// derived from persisted samples and doses, not from settings.
#[derive(Debug, Default)]
pub struct EffectCache {
    carb_effect: Option<EffectTimeline>,
    unexpired_carb_effect: Option<EffectTimeline>,
    insulin_effect: Option<EffectTimeline>,
    momentum_effect: Option<EffectTimeline>,
    counteraction: Option<Vec<GlucoseVelocity>>,
    carbs_on_board: Option<f64>,
    zero_temp_effect: Option<EffectTimeline>,
    retrospective_discrepancy: Option<Discrepancy>,
    retrospective_effect: Option<EffectTimeline>,
    prediction: Option<Vec<PredictedGlucose>>,
    temp_basal: Option<Recommendation<TempBasalRecommendation>>,
    bolus: Option<Recommendation<BolusRecommendation>>,
    carb_correction: Option<CarbCorrectionNotification>,
}

impl EffectCache {
    /// Clear `key` and everything downstream of it.
    pub fn invalidate(&mut self, key: EffectKey) {
        self.clear_slot(key);
        for &dependent in dependents(key) {
            self.invalidate(dependent);
        }
    }

    /// Whether the slot currently holds a value.
    pub fn contains(&self, key: EffectKey) -> bool {
        match key {
            EffectKey::CarbEffect => self.carb_effect.is_some(),
            EffectKey::UnexpiredCarbEffect => self.unexpired_carb_effect.is_some(),
            EffectKey::InsulinEffect => self.insulin_effect.is_some(),
            EffectKey::MomentumEffect => self.momentum_effect.is_some(),
            EffectKey::Counteraction => self.counteraction.is_some(),
            EffectKey::CarbsOnBoard => self.carbs_on_board.is_some(),
            EffectKey::ZeroTemp => self.zero_temp_effect.is_some(),
            EffectKey::RetrospectiveDiscrepancy => self.retrospective_discrepancy.is_some(),
            EffectKey::RetrospectiveCorrection => self.retrospective_effect.is_some(),
            EffectKey::Prediction => self.prediction.is_some(),
            EffectKey::TempBasal => self.temp_basal.is_some(),
            EffectKey::Bolus => self.bolus.is_some(),
            EffectKey::CarbCorrection => self.carb_correction.is_some(),
        }
    }

    fn clear_slot(&mut self, key: EffectKey) {
        match key {
            EffectKey::CarbEffect => self.carb_effect = None,
            EffectKey::UnexpiredCarbEffect => self.unexpired_carb_effect = None,
            EffectKey::InsulinEffect => self.insulin_effect = None,
            EffectKey::MomentumEffect => self.momentum_effect = None,
            EffectKey::Counteraction => self.counteraction = None,
            EffectKey::CarbsOnBoard => self.carbs_on_board = None,
            EffectKey::ZeroTemp => self.zero_temp_effect = None,
            EffectKey::RetrospectiveDiscrepancy => self.retrospective_discrepancy = None,
            EffectKey::RetrospectiveCorrection => self.retrospective_effect = None,
            EffectKey::Prediction => self.prediction = None,
            EffectKey::TempBasal => self.temp_basal = None,
            EffectKey::Bolus => self.bolus = None,
            EffectKey::CarbCorrection => self.carb_correction = None,
        }
    }

    /// Settings changes poison every derived value except the counteraction
    /// history.
    pub fn clear_all(&mut self) {
        let counteraction = self.counteraction.take();
        *self = Self {
            counteraction,
            ..Self::default()
        };
    }

    // Input-change entry points. Each clears exactly the slots the changed
    // input feeds; transitive dependents follow from the graph.

    /// New or changed glucose samples.
    pub fn note_glucose_changed(&mut self) {
        self.invalidate(EffectKey::MomentumEffect);
        self.invalidate(EffectKey::RetrospectiveDiscrepancy);
        // Observed counteraction needs extending, which reopens carb math.
        self.invalidate(EffectKey::CarbEffect);
        self.invalidate(EffectKey::UnexpiredCarbEffect);
        self.invalidate(EffectKey::CarbsOnBoard);
    }

    /// Carb entries added, edited or deleted.
    pub fn note_carbs_changed(&mut self) {
        self.invalidate(EffectKey::CarbEffect);
        self.invalidate(EffectKey::UnexpiredCarbEffect);
        self.invalidate(EffectKey::CarbsOnBoard);
    }

    /// Insulin delivery history changed.
    pub fn note_dose_changed(&mut self) {
        self.invalidate(EffectKey::InsulinEffect);
    }

    /// Therapy settings changed.
    pub fn note_settings_changed(&mut self) {
        self.clear_all();
    }

    // Typed accessors. Setters clear downstream slots, never their own.

    pub fn carb_effect(&self) -> Option<&EffectTimeline> {
        self.carb_effect.as_ref()
    }

    pub fn set_carb_effect(&mut self, effect: EffectTimeline) {
        self.carb_effect = Some(effect);
        self.invalidate_dependents_of(EffectKey::CarbEffect);
    }

    pub fn unexpired_carb_effect(&self) -> Option<&EffectTimeline> {
        self.unexpired_carb_effect.as_ref()
    }

    pub fn set_unexpired_carb_effect(&mut self, effect: EffectTimeline) {
        self.unexpired_carb_effect = Some(effect);
        self.invalidate_dependents_of(EffectKey::UnexpiredCarbEffect);
    }

    pub fn insulin_effect(&self) -> Option<&EffectTimeline> {
        self.insulin_effect.as_ref()
    }

    pub fn set_insulin_effect(&mut self, effect: EffectTimeline) {
        self.insulin_effect = Some(effect);
        self.invalidate_dependents_of(EffectKey::InsulinEffect);
    }

    pub fn momentum_effect(&self) -> Option<&EffectTimeline> {
        self.momentum_effect.as_ref()
    }

    pub fn set_momentum_effect(&mut self, effect: EffectTimeline) {
        self.momentum_effect = Some(effect);
        self.invalidate_dependents_of(EffectKey::MomentumEffect);
    }

    pub fn counteraction(&self) -> Option<&[GlucoseVelocity]> {
        self.counteraction.as_deref()
    }

    /// Append newly observed counteraction velocities, pruning history older
    /// than `retain_after`. Rejects overlap with already-recorded spans.
    pub fn append_counteraction(
        &mut self,
        velocities: Vec<GlucoseVelocity>,
        retain_after: DateTime<Utc>,
    ) {
        let history = self.counteraction.get_or_insert_with(Vec::new);
        // The overlap check tracks the running end so a batch cannot
        // overlap itself, only ever the span most recently accepted.
        let mut last_end = history.last().map(|v| v.end_date);
        history.extend(velocities.into_iter().filter(|v| {
            if last_end.is_none_or(|end| v.start_date >= end) {
                last_end = Some(v.end_date);
                true
            } else {
                false
            }
        }));
        history.retain(|v| v.end_date > retain_after);
        self.invalidate_dependents_of(EffectKey::Counteraction);
    }

    pub fn carbs_on_board(&self) -> Option<f64> {
        self.carbs_on_board
    }

    pub fn set_carbs_on_board(&mut self, grams: f64) {
        self.carbs_on_board = Some(grams);
    }

    pub fn zero_temp_effect(&self) -> Option<&EffectTimeline> {
        self.zero_temp_effect.as_ref()
    }

    pub fn set_zero_temp_effect(&mut self, effect: EffectTimeline) {
        self.zero_temp_effect = Some(effect);
        self.invalidate_dependents_of(EffectKey::ZeroTemp);
    }

    pub fn retrospective_discrepancy(&self) -> Option<&Discrepancy> {
        self.retrospective_discrepancy.as_ref()
    }

    pub fn set_retrospective_discrepancy(&mut self, discrepancy: Discrepancy) {
        self.retrospective_discrepancy = Some(discrepancy);
        self.invalidate_dependents_of(EffectKey::RetrospectiveDiscrepancy);
    }

    pub fn retrospective_effect(&self) -> Option<&EffectTimeline> {
        self.retrospective_effect.as_ref()
    }

    pub fn set_retrospective_effect(&mut self, effect: EffectTimeline) {
        self.retrospective_effect = Some(effect);
        self.invalidate_dependents_of(EffectKey::RetrospectiveCorrection);
    }

    pub fn prediction(&self) -> Option<&[PredictedGlucose]> {
        self.prediction.as_deref()
    }

    pub fn set_prediction(&mut self, prediction: Vec<PredictedGlucose>) {
        self.prediction = Some(prediction);
        self.invalidate_dependents_of(EffectKey::Prediction);
    }

    pub fn temp_basal(&self) -> Option<&Recommendation<TempBasalRecommendation>> {
        self.temp_basal.as_ref()
    }

    pub fn set_temp_basal(&mut self, recommendation: Recommendation<TempBasalRecommendation>) {
        self.temp_basal = Some(recommendation);
    }

    pub fn take_temp_basal(&mut self) -> Option<Recommendation<TempBasalRecommendation>> {
        self.temp_basal.take()
    }

    pub fn bolus(&self) -> Option<&Recommendation<BolusRecommendation>> {
        self.bolus.as_ref()
    }

    pub fn set_bolus(&mut self, recommendation: Recommendation<BolusRecommendation>) {
        self.bolus = Some(recommendation);
    }

    pub fn carb_correction(&self) -> Option<&CarbCorrectionNotification> {
        self.carb_correction.as_ref()
    }

    pub fn set_carb_correction(&mut self, notification: CarbCorrectionNotification) {
        self.carb_correction = Some(notification);
    }

    fn invalidate_dependents_of(&mut self, key: EffectKey) {
        for &dependent in dependents(key) {
            self.invalidate(dependent);
        }
    }
}
