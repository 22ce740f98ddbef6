//! Simulated positions and P&L per direction

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::trading_core::orders::Direction;

/// Individual trade record for P&L history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub direction: Direction,
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: u64,
    /// P&L in price units per unit of quantity
    pub pnl_points: f64,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
}

/// Running P&L for one direction
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectionPnl {
    pub trade_count: u32,
    pub wins: u32,
    pub losses: u32,
    pub realized_points: f64,
    /// Realized P&L in the second currency (points * quantity)
    pub realized_value: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
}

impl DirectionPnl {
    fn record(&mut self, trade: &TradeRecord) {
        self.trade_count += 1;
        self.realized_points += trade.pnl_points;
        self.realized_value += trade.pnl_points * trade.quantity as f64;
        if trade.pnl_points > 0.0 {
            self.wins += 1;
            self.largest_win = self.largest_win.max(trade.pnl_points);
        } else if trade.pnl_points < 0.0 {
            self.losses += 1;
            self.largest_loss = self.largest_loss.min(trade.pnl_points);
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct OpenPosition {
    price: f64,
    quantity: u64,
    opened_at: DateTime<Utc>,
}

/// Open position and trade history per direction
#[derive(Debug, Clone, Default)]
pub struct PositionBook {
    long: Option<OpenPosition>,
    short: Option<OpenPosition>,
    long_pnl: DirectionPnl,
    short_pnl: DirectionPnl,
    trades: Vec<TradeRecord>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, direction: Direction) -> &mut Option<OpenPosition> {
        match direction {
            Direction::Up => &mut self.long,
            Direction::Down => &mut self.short,
        }
    }

    pub fn open(&mut self, direction: Direction, price: f64, quantity: u64, at: DateTime<Utc>) {
        *self.slot(direction) = Some(OpenPosition { price, quantity, opened_at: at });
    }

    /// Close the open position in `direction`; returns the trade if one was open
    pub fn close(&mut self, direction: Direction, price: f64, at: DateTime<Utc>) -> Option<TradeRecord> {
        let open = self.slot(direction).take()?;
        let trade = TradeRecord {
            direction,
            entry_price: open.price,
            exit_price: price,
            quantity: open.quantity,
            pnl_points: direction.sign() * (price - open.price),
            entry_time: open.opened_at,
            exit_time: at,
        };
        match direction {
            Direction::Up => self.long_pnl.record(&trade),
            Direction::Down => self.short_pnl.record(&trade),
        }
        self.trades.push(trade.clone());
        Some(trade)
    }

    pub fn is_open(&self, direction: Direction) -> bool {
        match direction {
            Direction::Up => self.long.is_some(),
            Direction::Down => self.short.is_some(),
        }
    }

    pub fn pnl(&self, direction: Direction) -> &DirectionPnl {
        match direction {
            Direction::Up => &self.long_pnl,
            Direction::Down => &self.short_pnl,
        }
    }

    pub fn total_points(&self) -> f64 {
        self.long_pnl.realized_points + self.short_pnl.realized_points
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }
}
