//! Exponential moving average

use chrono::{DateTime, Utc};

/// Exponential moving average seeded by its first observation.
///
/// Reads before the first update return 0.0.
#[derive(Debug, Clone)]
pub struct Ema {
    alpha: f64,
    latest: f64,
    updated_at: Option<DateTime<Utc>>,
}

impl Ema {
    /// Smoothing factor is `2 / (period + 1)`
    pub fn new(period: u32) -> Self {
        let period = period.max(1);
        Self {
            alpha: 2.0 / (f64::from(period) + 1.0),
            latest: 0.0,
            updated_at: None,
        }
    }

    pub fn update(&mut self, timestamp: DateTime<Utc>, value: f64) -> f64 {
        self.latest = match self.updated_at {
            None => value,
            Some(_) => self.latest + self.alpha * (value - self.latest),
        };
        self.updated_at = Some(timestamp);
        self.latest
    }

    pub fn latest(&self) -> f64 {
        self.latest
    }
}
