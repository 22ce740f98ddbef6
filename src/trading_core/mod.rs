//! Trading Core - single-instrument signal-to-decision pipeline
//!
//! This module contains the strategy components:
//! - Bar aggregation from quotes and trades
//! - EMA smoothing and true range / ATR
//! - Five-bar swing detection
//! - Trading range averaging
//! - Trend follower state machines with trailing stops
//! - Session schedule and pip computation
//! - Strategy orchestration

pub mod market;
pub mod bars;
pub mod ema;
pub mod true_range;
pub mod swing;
pub mod trading_range;
pub mod trailing;
pub mod orders;
pub mod trend_follower;
pub mod series;
pub mod session;
pub mod pip;
pub mod strategy;

// Re-export commonly used types
pub use market::{Quote, Trade};
pub use bars::{Bar, BarAggregator};
pub use ema::Ema;
pub use true_range::TrueRange;
pub use swing::{Swing, SwingSlot, SwingTrack, SwingWindow};
pub use trading_range::{RangeLeg, RangeUpdate, TradingRange};
pub use trailing::TrailingStop;
pub use orders::{Direction, EntryRequest, ExitRequest, FillContinuation, OrderEvent, OrderId, OrderTracker, OrderType};
pub use trend_follower::{EvalContext, ExitReason, TradeAction, TradeState, TrendFollower};
pub use series::{Series, SeriesPoint, SeriesRecorder, SeriesSink};
pub use session::{SessionEvent, SessionSchedule, SessionTick};
pub use pip::{BaseCurrency, PipValue};
pub use strategy::{FollowerReport, ResetHandler, SessionReport, Strategy};
