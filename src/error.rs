//! Error types for the trading core

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::trading_core::orders::OrderId;

/// Errors raised by the trading core
#[derive(Debug, Error)]
pub enum CoreError {
    /// Sample earlier than the bucket currently being built
    #[error("out-of-order sample at {timestamp}: active bucket starts at {bucket_start}")]
    OutOfOrder {
        timestamp: DateTime<Utc>,
        bucket_start: DateTime<Utc>,
    },

    /// Order event for an order no trend follower is waiting on
    #[error("order {0} is not pending on any trend follower")]
    UnknownOrder(OrderId),

    /// Second resolution of an entry fill
    #[error("fill for order {0} was already resolved")]
    AlreadyResolved(OrderId),

    #[error("unknown base currency designation: {0}")]
    UnknownBaseCurrency(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),
}

/// Result type for trading core operations
pub type CoreResult<T> = Result<T, CoreError>;
