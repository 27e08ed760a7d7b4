use chrono::Utc;

/// Source of Unix timestamps (seconds) for token expiry checks.
pub trait Clock: Send + Sync {
    fn timestamp(&self) -> i64;
}

#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn timestamp(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// Always reports the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(i64);

impl FixedClock {
    pub fn at_timestamp(secs: i64) -> Self {
        Self(secs)
    }
}

impl Clock for FixedClock {
    fn timestamp(&self) -> i64 {
        self.0
    }
}
