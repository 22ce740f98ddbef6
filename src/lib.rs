// Library crate - exports the trading core, simulated execution and replay host

pub mod config;
pub mod error;
pub mod execution;
pub mod replay;
pub mod trading_core;

// Re-export commonly used types
pub use config::{ReplayConfig, SessionConfig, StrategyConfig};
pub use error::{CoreError, CoreResult};
pub use trading_core::Strategy;
