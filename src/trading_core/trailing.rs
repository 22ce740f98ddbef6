//! Trailing stop anchored at a swing extremum
//!
//! - `start` is the swing price that justified the entry and never moves
//! - `diff` is the protected distance, fixed at the entry fill
//! - `trail` only moves in the favorable direction: once price is more than
//!   `diff` beyond it, it is pulled up (long) or down (short) to `diff` behind price

use serde::{Deserialize, Serialize};

use super::orders::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailingStop {
    pub direction: Direction,
    pub start: f64,
    pub trail: f64,
    pub diff: f64,
}

impl TrailingStop {
    /// Arm at `anchor`, with a preliminary distance measured from `exit_price`
    pub fn arm(direction: Direction, anchor: f64, exit_price: f64) -> Self {
        Self {
            direction,
            start: anchor,
            trail: anchor,
            diff: direction.sign() * (exit_price - anchor),
        }
    }

    /// Favorable distance of `price` beyond the trail
    pub fn excursion(&self, price: f64) -> f64 {
        self.direction.sign() * (price - self.trail)
    }

    /// Price has reached or crossed the trail against the position
    pub fn is_hit(&self, price: f64) -> bool {
        self.excursion(price) <= 0.0
    }

    /// Tighten toward `price` when the excursion exceeds the protected
    /// distance. Returns the new trail if it moved.
    pub fn ratchet(&mut self, price: f64) -> Option<f64> {
        if self.excursion(price) > self.diff {
            self.trail = price - self.direction.sign() * self.diff;
            Some(self.trail)
        } else {
            None
        }
    }
}
