use chrono::{DateTime, Duration, Utc};

/// Wall-clock abstraction for the loop core.
///
/// The domain is calendar-timestamped (glucose samples, dose history), so
/// `now()` returns a `DateTime<Utc>` rather than a monotonic instant. All
/// staleness and expiry gates in the core measure against this clock, which
/// lets tests pin time precisely.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;

    /// Seconds elapsed since `date`, saturating at 0 for future dates.
    fn seconds_since(&self, date: DateTime<Utc>) -> i64 {
        (self.now() - date).num_seconds().max(0)
    }
}

/// Default clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Deterministic test clock whose time can be advanced manually.
#[derive(Debug, Clone)]
pub struct TestClock {
    now: std::sync::Arc<std::sync::Mutex<DateTime<Utc>>>,
}

impl TestClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::Arc::new(std::sync::Mutex::new(start)),
        }
    }

    /// Advance the clock by the given duration.
    pub fn advance(&self, d: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += d;
        }
    }

    /// Pin the clock to an absolute date.
    pub fn set(&self, date: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            *now = date;
        }
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|g| *g).unwrap_or_else(|_| Utc::now())
    }
}
