//! Market data types for trading core

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Best bid/ask at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub timestamp: DateTime<Utc>,
    pub bid: f64,
    pub ask: f64,
}

impl Quote {
    pub fn new(timestamp: DateTime<Utc>, bid: f64, ask: f64) -> Self {
        Self { timestamp, bid, ask }
    }

    pub fn midpoint(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }
}

/// Trade print. The feed carries no usable trade price for currency pairs,
/// so the strategy prices trades at the current quote midpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub timestamp: DateTime<Utc>,
    pub volume: u64,
}

impl Trade {
    pub fn new(timestamp: DateTime<Utc>, volume: u64) -> Self {
        Self { timestamp, volume }
    }
}
