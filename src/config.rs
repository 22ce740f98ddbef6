//! Configuration for the strategy and the replay host

use std::path::Path;

use anyhow::Context;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::trading_core::pip::BaseCurrency;

/// Daily trade time frame, in the exchange's local clock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// IANA timezone name (e.g. "America/New_York")
    pub timezone: String,

    /// Regular hours open
    pub bell: NaiveTime,

    /// Withdraw working entries
    pub cancel: NaiveTime,

    /// Flatten open positions
    pub go_neutral: NaiveTime,

    /// Regular hours close
    pub close: NaiveTime,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timezone: "America/New_York".to_string(),
            bell: NaiveTime::from_hms_opt(3, 0, 0).unwrap_or_default(),       // London open
            cancel: NaiveTime::from_hms_opt(16, 30, 0).unwrap_or_default(),
            go_neutral: NaiveTime::from_hms_opt(16, 45, 0).unwrap_or_default(),
            close: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or_default(),     // NY rollover
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> CoreResult<()> {
        if !(self.bell < self.cancel && self.cancel <= self.go_neutral && self.go_neutral <= self.close) {
            return Err(CoreError::InvalidConfig(format!(
                "session times must satisfy bell < cancel <= go_neutral <= close, got {} {} {} {}",
                self.bell, self.cancel, self.go_neutral, self.close
            )));
        }
        Ok(())
    }
}

/// Configuration for one instrument-strategy binding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Instrument name used in log lines (e.g. "EUR/USD")
    pub instrument: String,

    /// Order quantity in units of the first currency
    pub quantity: u64,

    /// Account currency of the pair
    pub base_currency: BaseCurrency,

    /// Quote bar width in seconds; each completed bar is one evaluation pulse
    pub quote_bar_seconds: u32,

    /// Trade bar width in seconds; feeds ATR and swing detection
    pub trade_bar_seconds: u32,

    /// Trend EMA period in quote bars
    pub price_ema_period: u32,

    /// Fast ATR period in trade bars
    pub atr_fast_period: u32,

    /// Slow ATR period in trade bars
    pub atr_slow_period: u32,

    /// Trading range weighting count
    pub range_count: u32,

    /// Trade only inside this daily time frame; every pulse evaluates when absent
    pub session: Option<SessionConfig>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            instrument: "EUR/USD".to_string(),
            quantity: 100_000,          // One standard lot
            base_currency: BaseCurrency::First,
            quote_bar_seconds: 1,
            trade_bar_seconds: 60,
            price_ema_period: 180,      // Three minutes of one-second bars
            atr_fast_period: 3,
            atr_slow_period: 14,
            range_count: 4,
            session: None,
        }
    }
}

impl StrategyConfig {
    pub fn validate(&self) -> CoreResult<()> {
        let periods = [
            ("quote_bar_seconds", self.quote_bar_seconds),
            ("trade_bar_seconds", self.trade_bar_seconds),
            ("price_ema_period", self.price_ema_period),
            ("atr_fast_period", self.atr_fast_period),
            ("atr_slow_period", self.atr_slow_period),
            ("range_count", self.range_count),
        ];
        if let Some((name, _)) = periods.iter().find(|(_, v)| *v == 0) {
            return Err(CoreError::InvalidConfig(format!("{} must be positive", name)));
        }
        if self.quantity == 0 {
            return Err(CoreError::InvalidConfig("quantity must be positive".to_string()));
        }
        if self.quote_bar_seconds >= self.trade_bar_seconds {
            return Err(CoreError::InvalidConfig(format!(
                "quote bar ({}s) must be shorter than trade bar ({}s)",
                self.quote_bar_seconds, self.trade_bar_seconds
            )));
        }
        if let Some(session) = &self.session {
            session.validate()?;
        }
        Ok(())
    }

    /// Load from a JSON file; missing fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }
}

/// Settings for the simulated order tracker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Price interval reported to the strategy
    pub tick_size: f64,

    /// Bounded channel capacity between the feed reader and the strategy
    pub channel_capacity: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            tick_size: 0.00001,         // Fractional pip on majors
            channel_capacity: 10_000,
        }
    }
}
