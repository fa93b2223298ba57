//! Daily therapy schedules.
//!
//! A schedule is a set of minute-of-day breakpoints, each holding the value
//! in force from that time until the next breakpoint (wrapping at midnight).
//! Used for basal rates (U/h), insulin sensitivity (mg/dL per U) and carb
//! ratios (g per U).

use chrono::{DateTime, Timelike, Utc};

/// A repeating daily schedule of scalar values.
#[derive(Debug, Clone, PartialEq)]
pub struct DailySchedule {
    /// (minute of day, value), ascending by minute, first entry at minute 0.
    items: Vec<(u32, f64)>,
}

impl DailySchedule {
    /// Build from (minute-of-day, value) breakpoints. Returns `None` unless
    /// the breakpoints are non-empty, start at midnight, stay within the day,
    /// and ascend strictly.
    pub fn new(items: Vec<(u32, f64)>) -> Option<Self> {
        if items.first().map(|(m, _)| *m) != Some(0) {
            return None;
        }
        if !items.windows(2).all(|w| w[0].0 < w[1].0) {
            return None;
        }
        if items.iter().any(|(m, _)| *m >= 24 * 60) {
            return None;
        }
        Some(Self { items })
    }

    /// Single-value schedule in force all day.
    pub fn constant(value: f64) -> Self {
        Self {
            items: vec![(0, value)],
        }
    }

    /// The value in force at `date`.
    pub fn value_at(&self, date: DateTime<Utc>) -> f64 {
        let minute = date.hour() * 60 + date.minute();
        let mut value = self.items[0].1;
        for &(m, v) in &self.items {
            if m <= minute {
                value = v;
            } else {
                break;
            }
        }
        value
    }

    /// Time-weighted daily average.
    pub fn average_value(&self) -> f64 {
        let day = 24.0 * 60.0;
        let mut total = 0.0;
        for (i, &(m, v)) in self.items.iter().enumerate() {
            let end = self
                .items
                .get(i + 1)
                .map_or(24 * 60, |&(next, _)| next);
            total += v * f64::from(end - m);
        }
        total / day
    }
}

/// A repeating daily schedule of (min, max) glucose targets, mg/dL.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetRangeSchedule {
    items: Vec<(u32, f64, f64)>,
}

impl TargetRangeSchedule {
    /// Build from (minute-of-day, min, max) breakpoints; same validity rules
    /// as [`DailySchedule::new`], plus `min <= max` per entry.
    pub fn new(items: Vec<(u32, f64, f64)>) -> Option<Self> {
        if items.first().map(|(m, _, _)| *m) != Some(0) {
            return None;
        }
        if !items.windows(2).all(|w| w[0].0 < w[1].0) {
            return None;
        }
        if items.iter().any(|&(m, lo, hi)| m >= 24 * 60 || lo > hi) {
            return None;
        }
        Some(Self { items })
    }

    pub fn constant(min: f64, max: f64) -> Option<Self> {
        Self::new(vec![(0, min, max)])
    }

    /// The (min, max) target in force at `date`.
    pub fn range_at(&self, date: DateTime<Utc>) -> (f64, f64) {
        let minute = date.hour() * 60 + date.minute();
        let mut range = (self.items[0].1, self.items[0].2);
        for &(m, lo, hi) in &self.items {
            if m <= minute {
                range = (lo, hi);
            } else {
                break;
            }
        }
        range
    }

    pub fn min_at(&self, date: DateTime<Utc>) -> f64 {
        self.range_at(date).0
    }

    /// Midpoint of the target range at `date`; dosing corrects toward this.
    pub fn midpoint_at(&self, date: DateTime<Utc>) -> f64 {
        let (lo, hi) = self.range_at(date);
        (lo + hi) / 2.0
    }
}
