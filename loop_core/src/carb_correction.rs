//! Carb-correction advisory engine.
//!
//! Watches the forecast for excursions below the suspend threshold that
//! insulin suspension alone cannot avert, and sizes the carbohydrate intake
//! that would. Runs every cycle but acts through the [`Notifier`] seam, with
//! repeat banners snoozed so a persistent condition does not nag.

use chrono::{DateTime, Duration, Utc};
use loop_traits::{
    CarbCorrectionKind, CarbCorrectionNotification, EffectTimeline, GlucoseSample,
    GlucoseVelocity, LoopSettings, Notifier, PredictionInput,
};
use tracing::debug;

use crate::error::{ConfigKind, LoopError, MissingDataKind, Result};
use crate::math;
use crate::prediction::{self, PredictionSources};

/// Tuning parameters. Defaults match the controller this engine was tuned
/// against; all are overridable for testing.
#[derive(Debug, Clone, Copy)]
pub struct CarbCorrectionParams {
    /// Suggestions below this many grams get a badge, never a banner.
    pub notify_threshold_grams: u32,
    /// Suggested grams are padded by this factor so an accepted suggestion
    /// does not immediately re-trigger.
    pub safety_factor: f64,
    /// Observed absorption below this fraction of the modeled rate flags
    /// entered carbs as slow or expiring.
    pub expire_carbs_threshold: f64,
    /// Forecast lows within this leading fraction of the absorption time are
    /// ignored; a correction cannot absorb fast enough to help there.
    pub skip_fraction: f64,
    /// Minimum spacing between repeat banners.
    pub snooze: Duration,
    /// Counteraction lookback for the absorption-rate fit.
    pub counteraction_window: Duration,
}

impl Default for CarbCorrectionParams {
    fn default() -> Self {
        Self {
            notify_threshold_grams: 2,
            safety_factor: 1.1,
            expire_carbs_threshold: 0.5,
            skip_fraction: 0.33,
            snooze: Duration::minutes(19),
            counteraction_window: Duration::minutes(20),
        }
    }
}

/// Everything a single carb-correction evaluation reads.
#[derive(Debug, Clone, Copy)]
pub struct CarbCorrectionInputs<'a> {
    pub glucose: GlucoseSample,
    pub carb_effect: Option<&'a EffectTimeline>,
    pub unexpired_carb_effect: Option<&'a EffectTimeline>,
    pub insulin_effect: Option<&'a EffectTimeline>,
    pub momentum_effect: Option<&'a EffectTimeline>,
    pub zero_temp_effect: Option<&'a EffectTimeline>,
    pub retrospective_effect: Option<&'a EffectTimeline>,
    pub counteraction: &'a [GlucoseVelocity],
    pub settings: &'a LoopSettings,
    pub now: DateTime<Utc>,
}

/// Observed recent counteraction, summarized for absorption-rate checks.
#[derive(Debug, Clone, Copy)]
struct ObservedCounteraction {
    /// Extrapolated value at the latest glucose date, mg/dL per interval.
    current: f64,
    /// Mean over the lookback window, mg/dL per interval.
    average: f64,
}

#[derive(Debug)]
pub struct CarbCorrectionEngine {
    params: CarbCorrectionParams,
    last_banner: Option<DateTime<Utc>>,
    // Diagnostic state from the most recent evaluation.
    status: String,
    current_absorbing_fraction: f64,
    average_absorbing_fraction: f64,
    slow_absorption: bool,
    excess_insulin: bool,
    last_decision: Option<CarbCorrectionNotification>,
}

impl CarbCorrectionEngine {
    pub fn new(params: CarbCorrectionParams) -> Self {
        Self {
            params,
            last_banner: None,
            status: "not yet evaluated".to_string(),
            current_absorbing_fraction: 0.0,
            average_absorbing_fraction: 0.0,
            slow_absorption: false,
            excess_insulin: false,
            last_decision: None,
        }
    }

    pub fn last_decision(&self) -> Option<&CarbCorrectionNotification> {
        self.last_decision.as_ref()
    }

    /// Evaluate the forecast and notify as needed. `Ok(None)` means this
    /// cycle was skipped for lack of counteraction data, which is routine
    /// right after startup or a sensor gap.
    pub fn update(
        &mut self,
        inputs: &CarbCorrectionInputs<'_>,
        notifier: &mut dyn Notifier,
    ) -> Result<Option<CarbCorrectionNotification>> {
        self.slow_absorption = false;
        self.excess_insulin = false;

        let momentum = inputs
            .momentum_effect
            .ok_or(LoopError::MissingData(MissingDataKind::MomentumEffect))?;
        let carb_effect = inputs
            .carb_effect
            .ok_or(LoopError::MissingData(MissingDataKind::CarbEffect))?;
        let insulin_effect = inputs
            .insulin_effect
            .ok_or(LoopError::MissingData(MissingDataKind::InsulinEffect))?;
        let zero_temp = inputs.zero_temp_effect.ok_or_else(|| {
            LoopError::InvalidData("zero-temp effect not available".to_string())
        })?;

        let empty: EffectTimeline = Vec::new();
        let sources = PredictionSources {
            carb_effect: Some(carb_effect),
            unexpired_carb_effect: Some(inputs.unexpired_carb_effect.unwrap_or(&empty)),
            insulin_effect: Some(insulin_effect),
            momentum_effect: Some(momentum),
            retrospective_effect: inputs.retrospective_effect,
            zero_temp_effect: Some(zero_temp),
        };

        let Some(observed) = self.recent_counteraction(inputs) else {
            self.status = "skipped: not enough counteraction data".to_string();
            debug!("carb correction skipped, insufficient counteraction data");
            return Ok(None);
        };

        let Some(modeled) = self.modeled_carb_absorption(inputs, &sources) else {
            self.status = "skipped: modeled carb absorption unavailable".to_string();
            debug!("carb correction skipped, no modeled carb absorption");
            return Ok(None);
        };

        let mut primary = PredictionInput::CARBS
            | PredictionInput::INSULIN
            | PredictionInput::MOMENTUM
            | PredictionInput::ZERO_TEMP;
        // A net-positive retrospective correction is already lifting the
        // forecast; size the suggestion against the lifted trajectory so it
        // is not overstated.
        let retrospection_rising = inputs
            .retrospective_effect
            .is_some_and(|e| e.last().is_some_and(|p| p.delta > 0.0));
        if retrospection_rising {
            primary |= PredictionInput::RETROSPECTION;
        }
        let (mut grams, mut time_to_low) = self.carbs_required(inputs, &sources, primary)?;

        let mut grams_remaining = 0.0;
        if modeled > 0.0 {
            self.current_absorbing_fraction = observed.current / modeled;
            self.average_absorbing_fraction = observed.average / modeled;
            if self.current_absorbing_fraction < 0.5 * self.params.expire_carbs_threshold
                && self.average_absorbing_fraction < self.params.expire_carbs_threshold
            {
                // Entered carbs are absorbing well below model; redo the
                // forecast counting only unexpired entries.
                self.slow_absorption = true;
                let expired = PredictionInput::UNEXPIRED_CARBS
                    | PredictionInput::INSULIN
                    | PredictionInput::MOMENTUM
                    | PredictionInput::ZERO_TEMP;
                (grams_remaining, _) = self.carbs_required(inputs, &sources, expired)?;
            }
        } else if observed.average < 0.0 && observed.current < observed.average && grams == 0.0 {
            // No carbs on the books yet glucose is dropping faster than the
            // insulin model explains. Let retrospection widen the forecast.
            self.excess_insulin = true;
            let widened = primary | PredictionInput::RETROSPECTION;
            (grams, time_to_low) = self.carbs_required(inputs, &sources, widened)?;
        }

        let padded =
            |g: f64| -> u32 { (self.params.safety_factor * g).ceil().max(0.0) as u32 };
        let decision = self.classify(CarbCorrectionNotification {
            grams: padded(grams),
            grams_remaining: padded(grams_remaining),
            low_predicted_in: time_to_low,
            kind: CarbCorrectionKind::None,
        });

        self.notify(&decision, inputs.now, notifier);
        self.status = "completed".to_string();
        self.last_decision = Some(decision);
        Ok(Some(decision))
    }

    fn classify(&self, mut decision: CarbCorrectionNotification) -> CarbCorrectionNotification {
        let threshold = self.params.notify_threshold_grams;
        let correcting = decision.grams >= threshold;
        let warning = decision.grams_remaining >= threshold;
        decision.kind = match (correcting, warning) {
            (false, false) if decision.grams == 0 => CarbCorrectionKind::None,
            (false, false) => CarbCorrectionKind::BadgeOnly,
            (true, false) => CarbCorrectionKind::Correction,
            (false, true) => CarbCorrectionKind::Warning,
            (true, true) => CarbCorrectionKind::CorrectionWarning,
        };
        decision
    }

    /// Badge updates always land; banners respect the snooze interval.
    fn notify(
        &mut self,
        decision: &CarbCorrectionNotification,
        now: DateTime<Utc>,
        notifier: &mut dyn Notifier,
    ) {
        match decision.kind {
            CarbCorrectionKind::None => notifier.clear_carb_correction(),
            CarbCorrectionKind::BadgeOnly => {
                notifier.clear_carb_correction();
                notifier.send_badge(decision.grams);
            }
            CarbCorrectionKind::Correction
            | CarbCorrectionKind::Warning
            | CarbCorrectionKind::CorrectionWarning => {
                notifier.send_badge(decision.grams);
                let snoozed = self
                    .last_banner
                    .is_some_and(|at| now - at < self.params.snooze);
                if !snoozed {
                    notifier.send_carb_correction(*decision);
                    self.last_banner = Some(now);
                }
            }
        }
    }

    /// Fit the trailing counteraction velocities against minutes-before-now
    /// and read the fit at zero. Needs at least three points.
    fn recent_counteraction(
        &self,
        inputs: &CarbCorrectionInputs<'_>,
    ) -> Option<ObservedCounteraction> {
        let window_start = inputs.glucose.start_date - self.params.counteraction_window;
        let recent: Vec<&GlucoseVelocity> = inputs
            .counteraction
            .iter()
            .filter(|v| v.start_date >= window_start && v.start_date <= inputs.glucose.start_date)
            .collect();
        if recent.len() < 3 {
            return None;
        }
        let times: Vec<f64> = recent
            .iter()
            .map(|v| (v.start_date - inputs.glucose.start_date).num_seconds() as f64 / 60.0)
            .collect();
        let values: Vec<f64> = recent.iter().map(|v| v.delta()).collect();
        let (_slope, intercept) = math::linear_regression(&times, &values)?;
        Some(ObservedCounteraction {
            current: intercept,
            average: math::average(&values),
        })
    }

    /// Modeled absorption rate right now: the delta between the second and
    /// third points of a carbs-only forecast (the first interval can be
    /// distorted by the anchor sample).
    fn modeled_carb_absorption(
        &self,
        inputs: &CarbCorrectionInputs<'_>,
        sources: &PredictionSources<'_>,
    ) -> Option<f64> {
        let prediction = prediction::predict_with_inputs(
            inputs.glucose,
            PredictionInput::CARBS,
            sources,
            inputs.settings.insulin_action_duration,
        )
        .ok()?;
        match prediction.len() {
            0 | 1 => None,
            2 => Some(prediction[1].value - prediction[0].value),
            _ => Some(prediction[2].value - prediction[1].value),
        }
    }

    /// Grams needed so the forecast under `effects` stays above the suspend
    /// threshold, and the time until it first crosses below.
    fn carbs_required(
        &self,
        inputs: &CarbCorrectionInputs<'_>,
        sources: &PredictionSources<'_>,
        effects: PredictionInput,
    ) -> Result<(f64, Duration)> {
        let settings = inputs.settings;
        let (Some(suspend_threshold), Some(sensitivity), Some(carb_ratio)) = (
            settings.suspend_threshold,
            settings
                .insulin_sensitivity
                .as_ref()
                .map(|s| s.average_value()),
            settings.carb_ratios.as_ref().map(|s| s.average_value()),
        ) else {
            return Err(LoopError::Configuration(ConfigKind::Settings));
        };

        let absorption_minutes = settings.carb_absorption_time.num_minutes() as f64;
        let skip_interval = Duration::seconds(
            (self.params.skip_fraction * settings.carb_absorption_time.num_seconds() as f64)
                as i64,
        );

        let prediction = prediction::predict_with_inputs(
            inputs.glucose,
            effects,
            sources,
            settings.insulin_action_duration,
        )?;
        let Some(current_date) = prediction.first().map(|p| p.date) else {
            return Err(LoopError::InvalidData("glucose prediction is empty".to_string()));
        };

        let window_start = current_date + skip_interval;
        let window_end = current_date + settings.insulin_action_duration;
        let lows: Vec<_> = prediction
            .iter()
            .filter(|p| {
                p.date >= window_start && p.date <= window_end && p.value < suspend_threshold
            })
            .collect();

        let mut grams = 0.0_f64;
        let mut time_to_low = Duration::zero();
        if !lows.is_empty() {
            for point in &lows {
                let elapsed_minutes = (point.date - current_date).num_seconds() as f64 / 60.0;
                let absorbed_fraction = (elapsed_minutes / absorption_minutes).min(1.0);
                let required = ((suspend_threshold - point.value) / absorbed_fraction)
                    * carb_ratio
                    / sensitivity;
                grams = grams.max(required);
            }
            if let Some(first_low) = prediction.iter().find(|p| p.value < suspend_threshold) {
                time_to_low = first_low.date - current_date;
            }
        }
        Ok((grams, time_to_low))
    }

    /// Diagnostic section describing the most recent evaluation.
    pub fn diagnostic_report(&self) -> String {
        let decision = self.last_decision;
        format!(
            "## Carb Correction\n\
             status: {}\n\
             suggested grams: {:?}\n\
             grams remaining: {:?}\n\
             low predicted in: {:?} min\n\
             current absorbing fraction: {:.2}\n\
             average absorbing fraction: {:.2}\n\
             slow absorption check: {}\n\
             excess insulin check: {}\n",
            self.status,
            decision.map(|d| d.grams),
            decision.map(|d| d.grams_remaining),
            decision.map(|d| d.low_predicted_in.num_minutes()),
            self.current_absorbing_fraction,
            self.average_absorbing_fraction,
            self.slow_absorption,
            self.excess_insulin,
        )
    }
}

impl Default for CarbCorrectionEngine {
    fn default() -> Self {
        Self::new(CarbCorrectionParams::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use loop_traits::{DailySchedule, GlucoseEffect, TargetRangeSchedule};

    struct RecordingNotifier {
        banners: Vec<CarbCorrectionNotification>,
        badges: Vec<u32>,
        clears: usize,
    }

    impl RecordingNotifier {
        fn new() -> Self {
            Self {
                banners: Vec::new(),
                badges: Vec::new(),
                clears: 0,
            }
        }
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

    fn settings() -> LoopSettings {
        LoopSettings {
            glucose_target_range: TargetRangeSchedule::constant(100.0, 110.0),
            insulin_sensitivity: Some(DailySchedule::constant(50.0)),
            basal_rates: Some(DailySchedule::constant(1.0)),
            carb_ratios: Some(DailySchedule::constant(10.0)),
            suspend_threshold: Some(75.0),
            ..LoopSettings::default()
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 6, 1, 12, 0, 0).unwrap()
    }

    fn grid(start: DateTime<Utc>, deltas: &[f64]) -> EffectTimeline {
        deltas
            .iter()
            .enumerate()
            .map(|(i, &delta)| GlucoseEffect {
                date: start + Duration::minutes(5 * i as i64),
                delta,
            })
            .collect()
    }

    fn velocities(end: DateTime<Utc>, per_interval: f64, count: usize) -> Vec<GlucoseVelocity> {
        (0..count)
            .map(|i| {
                let start = end - Duration::minutes(5 * (count - i) as i64);
                GlucoseVelocity {
                    start_date: start,
                    end_date: start + Duration::minutes(5),
                    rate: per_interval / 300.0,
                }
            })
            .collect()
    }

    struct Fixture {
        glucose: GlucoseSample,
        carb: EffectTimeline,
        insulin: EffectTimeline,
        momentum: EffectTimeline,
        zero_temp: EffectTimeline,
        counteraction: Vec<GlucoseVelocity>,
        settings: LoopSettings,
    }

    impl Fixture {
        fn inputs(&self) -> CarbCorrectionInputs<'_> {
            CarbCorrectionInputs {
                glucose: self.glucose,
                carb_effect: Some(&self.carb),
                unexpired_carb_effect: None,
                insulin_effect: Some(&self.insulin),
                momentum_effect: Some(&self.momentum),
                zero_temp_effect: Some(&self.zero_temp),
                retrospective_effect: None,
                counteraction: &self.counteraction,
                settings: &self.settings,
                now: now(),
            }
        }
    }

    /// Insulin pulls glucose down 3 mg/dL per interval for two hours; no
    /// carbs on board. The forecast dips well below suspend.
    fn falling_fixture(start_value: f64) -> Fixture {
        let t = now();
        let insulin: Vec<f64> = (0..=24).map(|i| -3.0 * f64::from(i)).collect();
        Fixture {
            glucose: GlucoseSample {
                start_date: t,
                value: start_value,
            },
            carb: grid(t, &[0.0; 25]),
            insulin: grid(t, &insulin),
            momentum: grid(t, &[0.0, 0.0, 0.0]),
            zero_temp: grid(t, &[0.0; 25]),
            counteraction: velocities(t, 0.0, 4),
            settings: settings(),
        }
    }

    #[test]
    fn missing_momentum_is_a_hard_error() {
        let fixture = falling_fixture(120.0);
        let mut inputs = fixture.inputs();
        inputs.momentum_effect = None;
        let mut notifier = RecordingNotifier::new();
        let err = CarbCorrectionEngine::default()
            .update(&inputs, &mut notifier)
            .unwrap_err();
        assert_eq!(err, LoopError::MissingData(MissingDataKind::MomentumEffect));
    }

    #[test]
    fn too_few_counteraction_points_skips_quietly() {
        let mut fixture = falling_fixture(120.0);
        fixture.counteraction.truncate(2);
        let mut notifier = RecordingNotifier::new();
        let decision = CarbCorrectionEngine::default()
            .update(&fixture.inputs(), &mut notifier)
            .unwrap();
        assert!(decision.is_none());
        assert!(notifier.banners.is_empty());
        assert_eq!(notifier.clears, 0);
    }

    #[test]
    fn forecast_low_produces_a_correction() {
        let fixture = falling_fixture(120.0);
        let mut notifier = RecordingNotifier::new();
        let decision = CarbCorrectionEngine::default()
            .update(&fixture.inputs(), &mut notifier)
            .unwrap()
            .unwrap();
        assert_eq!(decision.kind, CarbCorrectionKind::Correction);
        assert!(decision.grams >= 2);
        assert!(decision.low_predicted_in > Duration::zero());
        assert_eq!(notifier.banners.len(), 1);
    }

    #[test]
    fn deeper_forecast_low_needs_more_carbs() {
        let mut notifier = RecordingNotifier::new();
        let shallow = CarbCorrectionEngine::default()
            .update(&falling_fixture(130.0).inputs(), &mut notifier)
            .unwrap()
            .unwrap();
        let deep = CarbCorrectionEngine::default()
            .update(&falling_fixture(110.0).inputs(), &mut notifier)
            .unwrap()
            .unwrap();
        assert!(deep.grams > shallow.grams);
    }

    #[test]
    fn rising_retrospection_shrinks_the_suggestion() {
        let fixture = falling_fixture(120.0);
        let mut notifier = RecordingNotifier::new();
        let without = CarbCorrectionEngine::default()
            .update(&fixture.inputs(), &mut notifier)
            .unwrap()
            .unwrap();
        assert!(without.grams >= 2);

        // +15 mg/dL of net-positive correction lifts the sizing forecast.
        let rising = grid(now(), &[0.0, 2.5, 5.0, 7.5, 10.0, 12.5, 15.0]);
        let mut inputs = fixture.inputs();
        inputs.retrospective_effect = Some(&rising);
        let lifted = CarbCorrectionEngine::default()
            .update(&inputs, &mut notifier)
            .unwrap()
            .unwrap();
        assert!(lifted.grams < without.grams);
        assert!(lifted.grams >= 2);

        // A net-negative correction stays out of the sizing forecast.
        let negative = grid(now(), &[0.0, -5.0, -10.0]);
        let mut inputs = fixture.inputs();
        inputs.retrospective_effect = Some(&negative);
        let unchanged = CarbCorrectionEngine::default()
            .update(&inputs, &mut notifier)
            .unwrap()
            .unwrap();
        assert_eq!(unchanged.grams, without.grams);
    }

    #[test]
    fn comfortable_forecast_clears_notifications() {
        // Start high enough that a 72 mg/dL total drop never crosses 75.
        let fixture = falling_fixture(200.0);
        let mut notifier = RecordingNotifier::new();
        let decision = CarbCorrectionEngine::default()
            .update(&fixture.inputs(), &mut notifier)
            .unwrap()
            .unwrap();
        assert_eq!(decision.kind, CarbCorrectionKind::None);
        assert_eq!(decision.grams, 0);
        assert_eq!(notifier.clears, 1);
        assert!(notifier.banners.is_empty());
    }

    #[test]
    fn early_dip_within_skip_interval_is_ignored() {
        // Drop 50 in the first 10 minutes, then fully recover. The only low
        // falls inside the skip interval (40 min of the 2 h absorption).
        let t = now();
        let mut insulin = vec![0.0, -50.0, -50.0];
        insulin.extend(std::iter::repeat_n(0.0, 22));
        let fixture = Fixture {
            glucose: GlucoseSample {
                start_date: t,
                value: 100.0,
            },
            carb: grid(t, &[0.0; 25]),
            insulin: grid(t, &insulin),
            momentum: grid(t, &[0.0, 0.0, 0.0]),
            zero_temp: grid(t, &[0.0; 25]),
            counteraction: velocities(t, 0.0, 4),
            settings: settings(),
        };
        let mut notifier = RecordingNotifier::new();
        let decision = CarbCorrectionEngine::default()
            .update(&fixture.inputs(), &mut notifier)
            .unwrap()
            .unwrap();
        assert_eq!(decision.grams, 0);
        assert_eq!(decision.kind, CarbCorrectionKind::None);
    }

    #[test]
    fn slow_absorption_raises_a_warning() {
        // Carbs modeled to raise glucose briskly, counteraction flat at zero,
        // and an unexpired-only forecast that dips below suspend.
        let t = now();
        let carb: Vec<f64> = (0..=24).map(|i| 4.0 * f64::from(i)).collect();
        let insulin: Vec<f64> = (0..=24).map(|i| -4.0 * f64::from(i)).collect();
        let fixture = Fixture {
            glucose: GlucoseSample {
                start_date: t,
                value: 120.0,
            },
            carb: grid(t, &carb),
            insulin: grid(t, &insulin),
            momentum: grid(t, &[0.0, 0.0, 0.0]),
            zero_temp: grid(t, &[0.0; 25]),
            counteraction: velocities(t, 0.0, 4),
            settings: settings(),
        };
        let mut inputs = fixture.inputs();
        let empty: EffectTimeline = grid(t, &[0.0; 25]);
        inputs.unexpired_carb_effect = Some(&empty);
        let mut notifier = RecordingNotifier::new();
        let decision = CarbCorrectionEngine::default()
            .update(&inputs, &mut notifier)
            .unwrap()
            .unwrap();
        // Full forecast is flat so no immediate correction, but the
        // unexpired-only forecast falls and flags remaining carbs.
        assert_eq!(decision.grams, 0);
        assert!(decision.grams_remaining >= 2);
        assert_eq!(decision.kind, CarbCorrectionKind::Warning);
    }

    #[test]
    fn repeat_banners_are_snoozed() {
        let fixture = falling_fixture(120.0);
        let mut notifier = RecordingNotifier::new();
        let mut engine = CarbCorrectionEngine::default();
        engine.update(&fixture.inputs(), &mut notifier).unwrap();
        engine.update(&fixture.inputs(), &mut notifier).unwrap();
        assert_eq!(notifier.banners.len(), 1);
        // Badges keep flowing on every cycle.
        assert_eq!(notifier.badges.len(), 2);

        // Past the snooze interval the banner fires again.
        let mut late_inputs = fixture.inputs();
        late_inputs.now = now() + Duration::minutes(20);
        engine.update(&late_inputs, &mut notifier).unwrap();
        assert_eq!(notifier.banners.len(), 2);
    }
}
