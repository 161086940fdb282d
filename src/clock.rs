use chrono::{DateTime, NaiveDate, TimeDelta, Utc};

/// Abstraction over "current time" so date validation is deterministic in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    /// Midnight UTC at the start of today.
    fn start_of_today(&self) -> DateTime<Utc> {
        self.today().and_time(chrono::NaiveTime::MIN).and_utc()
    }

    /// Midnight UTC at the start of tomorrow; the default export end date.
    fn start_of_tomorrow(&self) -> DateTime<Utc> {
        self.start_of_today() + TimeDelta::days(1)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone)]
pub struct FixedClock {
    now: DateTime<Utc>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }
}
