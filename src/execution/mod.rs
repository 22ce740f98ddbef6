//! Simulated execution for replay
//!
//! Implements the strategy's order tracker boundary against recorded
//! quotes and keeps per-direction P&L.

mod order;
mod position;
mod simulator;

pub use order::{OrderRole, OrderSide, OrderState, SimOrder};
pub use position::{DirectionPnl, PositionBook, TradeRecord};
pub use simulator::{SimulatedTracker, SimulationReport};
