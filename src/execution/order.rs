//! Simulated order records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::trading_core::orders::{Direction, EntryRequest, ExitRequest, OrderId, OrderType};

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    /// Side that opens a position in `direction`
    pub fn opening(direction: Direction) -> Self {
        match direction {
            Direction::Up => Self::Buy,
            Direction::Down => Self::Sell,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Whether an order opens or closes a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderRole {
    Entry,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderState {
    /// Accepted, waiting for a fill
    Working,
    Filled,
    Cancelled,
    Rejected,
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Working => write!(f, "WORKING"),
            Self::Filled => write!(f, "FILLED"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Rejected => write!(f, "REJECTED"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimOrder {
    pub id: OrderId,
    pub direction: Direction,
    pub role: OrderRole,
    pub side: OrderSide,
    pub order_type: OrderType,
    /// Limit price for entries, reference price for market exits
    pub price: f64,
    pub quantity: u64,
    pub state: OrderState,
    pub fill_price: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SimOrder {
    pub fn entry(id: OrderId, request: &EntryRequest, quantity: u64) -> Self {
        Self {
            id,
            direction: request.direction,
            role: OrderRole::Entry,
            side: OrderSide::opening(request.direction),
            order_type: request.order_type,
            price: request.price,
            quantity,
            state: OrderState::Working,
            fill_price: None,
            created_at: request.timestamp,
            updated_at: request.timestamp,
        }
    }

    pub fn exit(id: OrderId, request: &ExitRequest, quantity: u64) -> Self {
        Self {
            id,
            direction: request.direction,
            role: OrderRole::Exit,
            side: OrderSide::opening(request.direction).opposite(),
            order_type: request.order_type,
            price: request.price,
            quantity,
            state: OrderState::Working,
            fill_price: None,
            created_at: request.timestamp,
            updated_at: request.timestamp,
        }
    }

    /// Check if order is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self.state, OrderState::Filled | OrderState::Cancelled | OrderState::Rejected)
    }

    pub fn update_state(&mut self, state: OrderState, at: DateTime<Utc>) {
        self.state = state;
        self.updated_at = at;
    }

    pub fn record_fill(&mut self, price: f64, at: DateTime<Utc>) {
        self.fill_price = Some(price);
        self.update_state(OrderState::Filled, at);
    }
}
