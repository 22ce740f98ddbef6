//! Simulated order tracker for replay
//!
//! Orders are matched against quotes that arrive after submission:
//! - long limit entry fills when ask <= limit, short when bid >= limit
//! - market exits fill at bid (long) or ask (short)
//!
//! Fills and cancel confirmations are reported through `poll_events`.

use std::collections::{HashMap, VecDeque};

use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use super::order::{OrderRole, OrderState, SimOrder};
use super::position::{DirectionPnl, PositionBook, TradeRecord};
use crate::config::ReplayConfig;
use crate::trading_core::market::Quote;
use crate::trading_core::orders::{
    Direction, EntryRequest, ExitRequest, OrderEvent, OrderId, OrderTracker, OrderType,
};

/// Simulated P&L summary
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub orders_submitted: usize,
    pub orders_filled: usize,
    pub orders_cancelled: usize,
    pub long: DirectionPnl,
    pub short: DirectionPnl,
    pub total_points: f64,
    pub trades: Vec<TradeRecord>,
}

#[derive(Debug)]
pub struct SimulatedTracker {
    config: ReplayConfig,
    quantity: u64,
    orders: HashMap<OrderId, SimOrder>,
    /// Working orders in submission order
    working: Vec<OrderId>,
    pending: VecDeque<OrderEvent>,
    book: PositionBook,
}

impl SimulatedTracker {
    pub fn new(config: ReplayConfig, quantity: u64) -> Self {
        Self {
            config,
            quantity,
            orders: HashMap::new(),
            working: Vec::new(),
            pending: VecDeque::new(),
            book: PositionBook::new(),
        }
    }

    pub fn order(&self, order_id: OrderId) -> Option<&SimOrder> {
        self.orders.get(&order_id)
    }

    pub fn working_orders(&self) -> usize {
        self.working.len()
    }

    pub fn book(&self) -> &PositionBook {
        &self.book
    }

    fn register(&mut self, order: SimOrder) -> OrderId {
        let id = order.id;
        debug!(
            "SIM {} {:?} {} {:?} @ {:.5}",
            order.side, order.role, order.direction, order.order_type, order.price
        );
        self.working.push(id);
        self.orders.insert(id, order);
        id
    }

    /// Fill price against `quote`, if the order is marketable
    fn match_price(order: &SimOrder, quote: &Quote) -> Option<f64> {
        match (order.role, order.order_type) {
            (OrderRole::Entry, OrderType::Limit) => {
                let marketable = match order.direction {
                    Direction::Up => quote.ask <= order.price,
                    Direction::Down => quote.bid >= order.price,
                };
                marketable.then_some(order.price)
            }
            (OrderRole::Entry, OrderType::Market) => Some(order.direction.entry_price(quote)),
            (OrderRole::Exit, OrderType::Market) => Some(order.direction.exit_price(quote)),
            (OrderRole::Exit, OrderType::Limit) => {
                let marketable = match order.direction {
                    Direction::Up => quote.bid >= order.price,
                    Direction::Down => quote.ask <= order.price,
                };
                marketable.then_some(order.price)
            }
        }
    }

    fn fill(&mut self, order_id: OrderId, price: f64, quote: &Quote) -> Option<OrderEvent> {
        let order = self.orders.get_mut(&order_id)?;
        order.record_fill(price, quote.timestamp);
        let (direction, role, quantity) = (order.direction, order.role, order.quantity);

        match role {
            OrderRole::Entry => {
                self.book.open(direction, price, quantity, quote.timestamp);
                info!("SIM ENTRY FILLED: {} {} @ {:.5}", direction, quantity, price);
            }
            OrderRole::Exit => {
                if let Some(trade) = self.book.close(direction, price, quote.timestamp) {
                    info!(
                        "SIM EXIT FILLED: {} @ {:.5} | P&L {:+.5} ({:+.2})",
                        direction,
                        price,
                        trade.pnl_points,
                        trade.pnl_points * trade.quantity as f64
                    );
                }
            }
        }

        Some(OrderEvent::Filled {
            order_id,
            price,
            timestamp: quote.timestamp,
        })
    }

    pub fn report(&self) -> SimulationReport {
        let count = |state: OrderState| self.orders.values().filter(|o| o.state == state).count();
        SimulationReport {
            orders_submitted: self.orders.len(),
            orders_filled: count(OrderState::Filled),
            orders_cancelled: count(OrderState::Cancelled),
            long: self.book.pnl(Direction::Up).clone(),
            short: self.book.pnl(Direction::Down).clone(),
            total_points: self.book.total_points(),
            trades: self.book.trades().to_vec(),
        }
    }
}

impl OrderTracker for SimulatedTracker {
    fn price_interval(&self, _price: f64) -> f64 {
        self.config.tick_size
    }

    fn submit_entry(&mut self, request: &EntryRequest) -> OrderId {
        let order = SimOrder::entry(Uuid::new_v4(), request, self.quantity);
        self.register(order)
    }

    fn submit_exit(&mut self, request: &ExitRequest) -> OrderId {
        let order = SimOrder::exit(Uuid::new_v4(), request, self.quantity);
        self.register(order)
    }

    fn cancel(&mut self, order_id: OrderId) {
        let Some(order) = self.orders.get_mut(&order_id) else {
            debug!("SIM cancel for unknown order {}", order_id);
            return;
        };
        if order.is_terminal() {
            return;
        }
        let at = order.updated_at;
        order.update_state(OrderState::Cancelled, at);
        self.working.retain(|id| *id != order_id);
        self.pending.push_back(OrderEvent::Cancelled { order_id });
    }

    fn poll_events(&mut self, quote: &Quote) -> Vec<OrderEvent> {
        let mut events: Vec<OrderEvent> = self.pending.drain(..).collect();

        let mut still_working = Vec::with_capacity(self.working.len());
        for order_id in std::mem::take(&mut self.working) {
            let matched = self
                .orders
                .get(&order_id)
                .filter(|o| quote.timestamp > o.created_at)
                .and_then(|o| Self::match_price(o, quote));

            match matched {
                Some(price) => events.extend(self.fill(order_id, price, quote)),
                None => still_working.push(order_id),
            }
        }
        self.working = still_working;

        events
    }
}
