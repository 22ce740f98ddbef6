//! Order tracker boundary
//!
//! The trend followers never talk to a broker. They hand entry and exit
//! requests to an `OrderTracker` and receive fills back as `OrderEvent`s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::market::Quote;
use super::swing::Swing;
use crate::error::{CoreError, CoreResult};

pub type OrderId = Uuid;

/// Bias of a trend follower
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Long-biased: buys swing lows
    Up,
    /// Short-biased: sells swing highs
    Down,
}

impl Direction {
    /// +1 for long, -1 for short. Multiplying a price difference by the sign
    /// turns it into a favorable excursion.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Up => 1.0,
            Direction::Down => -1.0,
        }
    }

    /// Swing that triggers an entry
    pub fn entry_swing(self) -> Swing {
        match self {
            Direction::Up => Swing::Up,
            Direction::Down => Swing::Down,
        }
    }

    /// Swing that forces an immediate exit
    pub fn opposing_swing(self) -> Swing {
        match self {
            Direction::Up => Swing::Down,
            Direction::Down => Swing::Up,
        }
    }

    /// Side of the book an entry executes against
    pub fn entry_price(self, quote: &Quote) -> f64 {
        match self {
            Direction::Up => quote.ask,
            Direction::Down => quote.bid,
        }
    }

    /// Side of the book an exit executes against
    pub fn exit_price(self, quote: &Quote) -> f64 {
        match self {
            Direction::Up => quote.bid,
            Direction::Down => quote.ask,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "dn",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Up => write!(f, "LONG"),
            Direction::Down => write!(f, "SHORT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
}

/// Limit entry handed to the order tracker
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntryRequest {
    pub direction: Direction,
    pub order_type: OrderType,
    pub timestamp: DateTime<Utc>,
    /// Limit price (ask for long, bid for short)
    pub price: f64,
    /// Other side of the quote at submission
    pub opposite: f64,
}

/// Market exit handed to the order tracker
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExitRequest {
    pub direction: Direction,
    pub order_type: OrderType,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

/// Notifications from the order tracker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderEvent {
    Filled {
        order_id: OrderId,
        price: f64,
        timestamp: DateTime<Utc>,
    },
    Cancelled {
        order_id: OrderId,
    },
    Rejected {
        order_id: OrderId,
        reason: String,
    },
}

impl OrderEvent {
    pub fn order_id(&self) -> OrderId {
        match self {
            OrderEvent::Filled { order_id, .. }
            | OrderEvent::Cancelled { order_id }
            | OrderEvent::Rejected { order_id, .. } => *order_id,
        }
    }
}

/// External collaborator that places orders and reports their outcome
pub trait OrderTracker {
    /// Minimum price increment for the instrument at `price`
    fn price_interval(&self, price: f64) -> f64;

    fn submit_entry(&mut self, request: &EntryRequest) -> OrderId;

    fn submit_exit(&mut self, request: &ExitRequest) -> OrderId;

    fn cancel(&mut self, order_id: OrderId);

    /// Events that became available with this quote. Push-based trackers
    /// deliver through `Strategy::handle_order_event` instead.
    fn poll_events(&mut self, _quote: &Quote) -> Vec<OrderEvent> {
        Vec::new()
    }
}

impl<T: OrderTracker + ?Sized> OrderTracker for Box<T> {
    fn price_interval(&self, price: f64) -> f64 {
        (**self).price_interval(price)
    }

    fn submit_entry(&mut self, request: &EntryRequest) -> OrderId {
        (**self).submit_entry(request)
    }

    fn submit_exit(&mut self, request: &ExitRequest) -> OrderId {
        (**self).submit_exit(request)
    }

    fn cancel(&mut self, order_id: OrderId) {
        (**self).cancel(order_id)
    }

    fn poll_events(&mut self, quote: &Quote) -> Vec<OrderEvent> {
        (**self).poll_events(quote)
    }
}

/// Continuation registered when an entry is submitted. It remembers the
/// stop anchor so the fill price can fix the protected distance, and it
/// resolves at most once.
#[derive(Debug, Clone)]
pub struct FillContinuation {
    order_id: OrderId,
    direction: Direction,
    start: f64,
    resolved: bool,
}

impl FillContinuation {
    pub fn new(order_id: OrderId, direction: Direction, start: f64) -> Self {
        Self {
            order_id,
            direction,
            start,
            resolved: false,
        }
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Resolve with the realized fill price; returns the distance between
    /// the fill and the stop anchor, positive when the anchor protects the
    /// position.
    pub fn resolve(&mut self, fill_price: f64) -> CoreResult<f64> {
        if self.resolved {
            return Err(CoreError::AlreadyResolved(self.order_id));
        }
        self.resolved = true;
        Ok(self.direction.sign() * (fill_price - self.start))
    }
}
