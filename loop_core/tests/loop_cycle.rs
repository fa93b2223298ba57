//! End-to-end cycles through the orchestrator against fixture stores.

use chrono::{DateTime, Duration, TimeZone, Utc};
use loop_core::mocks::{
    CarbFixture, DoseFixture, GlucoseFixture, RecordingDelegate, RecordingNotifier,
    SettingsFixture,
};
use loop_core::{ConfigKind, LoopError, MissingDataKind, UpdateOrchestrator};
use loop_traits::{
    DailySchedule, DoseEntry, EffectTimeline, GlucoseEffect, GlucoseSample, LoopSettings,
    TargetRangeSchedule, TestClock, RECOMMENDATION_VALIDITY,
};
use rstest::rstest;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 6, 1, 12, 0, 0).unwrap()
}

fn settings() -> LoopSettings {
    LoopSettings {
        glucose_target_range: TargetRangeSchedule::constant(95.0, 105.0),
        insulin_sensitivity: Some(DailySchedule::constant(50.0)),
        basal_rates: Some(DailySchedule::constant(1.0)),
        carb_ratios: Some(DailySchedule::constant(10.0)),
        suspend_threshold: Some(75.0),
        max_basal_rate: Some(5.0),
        max_bolus: Some(6.0),
        ..LoopSettings::default()
    }
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

fn flat_samples(end: DateTime<Utc>, value: f64, count: usize) -> Vec<GlucoseSample> {
    (0..count)
        .map(|i| GlucoseSample {
            start_date: end - Duration::minutes(5 * (count - 1 - i) as i64),
            value,
        })
        .collect()
}

struct Harness {
    glucose: GlucoseFixture,
    doses: DoseFixture,
    carbs: CarbFixture,
    settings: SettingsFixture,
    clock: TestClock,
    orchestrator: UpdateOrchestrator,
}

/// Steady fixture: glucose flat at `value`, no carbs, no modeled insulin
/// movement, pump heard from a minute ago, clock one minute past the latest
/// sample.
fn harness(value: f64) -> Harness {
    let glucose = GlucoseFixture::new(
        flat_samples(t0(), value, 13),
        grid(t0(), &[0.0, 0.0, 0.0]),
    );
    let doses = DoseFixture::new(
        grid(t0() - Duration::minutes(30), &[0.0; 13]),
        Some(t0() - Duration::minutes(1)),
    );
    let carbs = CarbFixture::new(grid(t0() - Duration::minutes(30), &[0.0; 13]), Some(0.0));
    let settings = SettingsFixture::new(settings());
    let clock = TestClock::new(t0() + Duration::minutes(1));
    let orchestrator = UpdateOrchestrator::builder()
        .glucose_source(Box::new(glucose.clone()))
        .dose_source(Box::new(doses.clone()))
        .carb_source(Box::new(carbs.clone()))
        .settings_provider(Box::new(settings.clone()))
        .notifier(Box::new(RecordingNotifier::default()))
        .clock(Box::new(clock.clone()))
        .try_build()
        .unwrap();
    Harness {
        glucose,
        doses,
        carbs,
        settings,
        clock,
        orchestrator,
    }
}

#[test]
fn steady_high_cycle_recommends_a_raised_temp_basal() {
    let mut h = harness(150.0);
    h.orchestrator.update().unwrap();

    let prediction = h.orchestrator.predicted_glucose().unwrap();
    // The forecast must span the full insulin action duration.
    assert!(
        prediction.last().unwrap().date >= t0() + Duration::hours(6),
        "forecast too short"
    );
    assert!((prediction.last().unwrap().value - 150.0).abs() < 1e-6);

    // 50 mg/dL above target midpoint at ISF 50 is 1 U, over 30 minutes on
    // top of the scheduled 1 U/h.
    let rec = h.orchestrator.recommended_temp_basal().unwrap();
    assert!((rec.recommendation.units_per_hour - 3.0).abs() < 1e-6);

    let bolus = h.orchestrator.recommended_bolus().unwrap();
    assert!(bolus.recommendation.amount > 0.0);
    assert!(h.orchestrator.last_loop_completed().is_some());
}

#[test]
fn on_target_cycle_recommends_nothing() {
    let mut h = harness(100.0);
    h.orchestrator.update().unwrap();
    assert!(h.orchestrator.recommended_temp_basal().is_none());
    let bolus = h.orchestrator.recommended_bolus().unwrap();
    assert_eq!(bolus.recommendation.amount, 0.0);
}

#[test]
fn dynamic_absorption_feeds_counteraction_to_the_carb_store() {
    let mut h = harness(150.0);
    h.orchestrator.update().unwrap();
    assert!(h.carbs.saw_counteraction());
    // One velocity spanning the retrospection window was recorded.
    assert_eq!(h.orchestrator.counteraction_history().unwrap().len(), 1);
}

#[test]
fn new_glucose_extends_the_counteraction_history() {
    let mut h = harness(150.0);
    h.orchestrator.update().unwrap();

    h.glucose.push_sample(GlucoseSample {
        start_date: t0() + Duration::minutes(5),
        value: 155.0,
    });
    h.orchestrator.note_glucose_added();
    h.clock.set(t0() + Duration::minutes(6));
    h.orchestrator.update().unwrap();

    let history = h.orchestrator.counteraction_history().unwrap();
    assert_eq!(history.len(), 2);
    // The +5 rise with no modeled insulin action is pure counteraction.
    assert!(history[1].delta() > 4.9);
}

#[test]
fn no_sample_at_all_aborts_with_missing_glucose() {
    let mut h = harness(150.0);
    h.glucose.replace_samples(Vec::new());
    let err = h.orchestrator.update().unwrap_err();
    assert_eq!(err, LoopError::MissingData(MissingDataKind::Glucose));
}

#[test]
fn stale_glucose_aborts_the_cycle_before_anything_runs() {
    let mut h = harness(150.0);
    h.clock.set(t0() + Duration::minutes(16));
    let err = h.orchestrator.update().unwrap_err();
    assert_eq!(err, LoopError::MissingData(MissingDataKind::Glucose));

    // Nothing downstream ran against the stale sample.
    assert!(h.orchestrator.predicted_glucose().is_none());
    assert!(h.orchestrator.recommended_temp_basal().is_none());
    assert!(h.orchestrator.recommended_bolus().is_none());
    assert!(!h.carbs.saw_counteraction());

    // A fresh sample lets the next cycle through.
    h.doses.set_last_pump_date(t0() + Duration::minutes(15));
    h.glucose.push_sample(GlucoseSample {
        start_date: t0() + Duration::minutes(15),
        value: 150.0,
    });
    h.orchestrator.note_glucose_added();
    h.orchestrator.update().unwrap();
    assert!(h.orchestrator.predicted_glucose().is_some());
}

#[test]
fn stale_pump_data_blocks_dosing() {
    let mut h = harness(150.0);
    h.doses.set_last_pump_date(t0() - Duration::minutes(20));
    let err = h.orchestrator.update().unwrap_err();
    assert_eq!(err, LoopError::PumpDataTooOld(t0() - Duration::minutes(20)));
}

#[test]
fn failed_momentum_fetch_degrades_to_a_typed_error() {
    let mut h = harness(150.0);
    h.glucose.set_fail_momentum(true);
    let err = h.orchestrator.update().unwrap_err();
    assert_eq!(err, LoopError::MissingData(MissingDataKind::MomentumEffect));

    // Once the store recovers the next cycle completes.
    h.glucose.set_fail_momentum(false);
    h.orchestrator.update().unwrap();
    assert!(h.orchestrator.recommended_temp_basal().is_some());
}

#[test]
fn incomplete_settings_are_a_configuration_error() {
    let mut h = harness(150.0);
    h.settings.replace(LoopSettings {
        max_basal_rate: None,
        ..settings()
    });
    h.orchestrator.note_settings_changed();
    let err = h.orchestrator.update().unwrap_err();
    assert_eq!(err, LoopError::Configuration(ConfigKind::Settings));
}

#[test]
fn carb_change_reprices_the_recommendation() {
    let mut h = harness(150.0);
    h.orchestrator.update().unwrap();
    let before = h
        .orchestrator
        .recommended_temp_basal()
        .unwrap()
        .recommendation
        .units_per_hour;

    // New carbs modeled to raise glucose 50 mg/dL over the forecast.
    let rising: Vec<f64> = (0..13).map(|i| f64::from(i) * 50.0 / 12.0).collect();
    h.carbs.set_carb_effect(grid(t0(), &rising));
    h.orchestrator.note_carbs_changed();
    h.orchestrator.update().unwrap();
    let after = h
        .orchestrator
        .recommended_temp_basal()
        .unwrap()
        .recommendation
        .units_per_hour;
    assert!(after > before);
}

#[test]
fn enactment_rejects_an_expired_recommendation() {
    let mut h = harness(150.0);
    h.orchestrator.update().unwrap();
    let computed_at = h.orchestrator.recommended_temp_basal().unwrap().date;

    h.clock
        .set(computed_at + RECOMMENDATION_VALIDITY + Duration::seconds(1));
    let mut delegate = RecordingDelegate::default();
    let err = h
        .orchestrator
        .enact_recommended_temp_basal(&mut delegate)
        .unwrap_err();
    assert_eq!(err, LoopError::RecommendationExpired(computed_at));
    assert!(delegate.enacted.is_empty());
}

#[test]
fn enactment_rounds_and_clears_the_recommendation() {
    let mut h = harness(150.0);
    h.orchestrator.update().unwrap();
    let mut delegate = RecordingDelegate::default();
    h.orchestrator
        .enact_recommended_temp_basal(&mut delegate)
        .unwrap();
    assert_eq!(delegate.enacted.len(), 1);
    assert!(h.orchestrator.recommended_temp_basal().is_none());
    let enacted = h.orchestrator.last_enacted_temp_basal().unwrap();
    assert!((enacted.units_per_hour - 3.0).abs() < 1e-6);

    // Re-enacting without a fresh cycle is a no-op, not a double dose.
    h.orchestrator
        .enact_recommended_temp_basal(&mut delegate)
        .unwrap();
    assert_eq!(delegate.enacted.len(), 1);
}

#[test]
fn in_flight_bolus_defers_the_temp_basal() {
    let mut h = harness(200.0);
    h.orchestrator.note_bolus_requested(1.0);
    h.orchestrator.update().unwrap();
    assert!(h.orchestrator.recommended_temp_basal().is_none());

    // The pending units are netted out of the bolus recommendation:
    // (200 - 100) / 50 = 2 U needed, 1 U already requested.
    let bolus = h.orchestrator.recommended_bolus().unwrap().recommendation;
    assert_eq!(bolus.pending_insulin, 1.0);
    assert!((bolus.amount - 1.0).abs() < 1e-6);

    // Confirmation reopens the dosing path.
    h.orchestrator.note_bolus_confirmed();
    h.orchestrator.update().unwrap();
    assert!(h.orchestrator.recommended_temp_basal().is_some());
}

#[test]
fn pump_history_past_the_request_window_expires_the_bolus_marker() {
    let mut h = harness(200.0);
    h.orchestrator.note_bolus_requested(1.0);
    h.orchestrator.update().unwrap();
    assert!(h.orchestrator.recommended_temp_basal().is_none());
    assert!((h.orchestrator.pending_insulin() - 1.0).abs() < 1e-6);

    // No explicit confirmation ever arrives, but the pump reports history
    // past the request's validity window, so the marker lapses instead of
    // deferring temp basals forever.
    h.doses
        .set_last_pump_date(t0() + Duration::minutes(2) + RECOMMENDATION_VALIDITY);
    h.clock.set(t0() + Duration::minutes(8));
    h.orchestrator.update().unwrap();
    assert!(h.orchestrator.recommended_temp_basal().is_some());
    assert_eq!(h.orchestrator.pending_insulin(), 0.0);
}

#[test]
fn running_temp_basal_counts_toward_pending_insulin() {
    let h = harness(150.0);
    h.doses.set_active_temp_basal(Some(DoseEntry {
        start_date: t0() - Duration::minutes(10),
        end_date: t0() + Duration::minutes(31),
        units_per_hour: 3.0,
    }));
    // 2 U/h above schedule for the remaining half hour.
    assert!((h.orchestrator.pending_insulin() - 1.0).abs() < 1e-6);
}

#[test]
fn settings_change_swaps_in_the_integral_controller() {
    let mut h = harness(150.0);
    h.orchestrator.update().unwrap();

    h.settings.replace(LoopSettings {
        integral_retrospective_correction: true,
        ..settings()
    });
    h.orchestrator.note_settings_changed();
    h.orchestrator.update().unwrap();
    assert!(h.orchestrator.retrospective_correction().is_some());
    assert!(h.orchestrator.recommended_temp_basal().is_some());
}

#[test]
fn diagnostic_report_covers_the_cycle_state() {
    let mut h = harness(150.0);
    h.orchestrator.update().unwrap();
    let report = h.orchestrator.diagnostic_report();
    assert!(report.contains("## Loop State"));
    assert!(report.contains("## Carb Correction"));
    assert!(report.contains("recommended temp basal"));
}

#[rstest]
#[case::well_above_target(180.0, 4.2)]
#[case::slightly_above(110.0, 1.4)]
#[case::at_target(100.0, 1.0)]
fn temp_basal_rate_tracks_the_forecast(#[case] value: f64, #[case] expected_rate: f64) {
    let mut h = harness(value);
    h.orchestrator.update().unwrap();
    let rate = h
        .orchestrator
        .recommended_temp_basal()
        .map_or(1.0, |r| r.recommendation.units_per_hour);
    assert!(
        (rate - expected_rate).abs() < 1e-6,
        "value {value} gave rate {rate}"
    );
}
