//! Rising/falling trading range averaged across swings
//!
//! Between swings the rising leg tracks the highest bid and the falling leg
//! the lowest ask. On each swing the completed leg's extent is folded into a
//! weighted average and both legs restart from the current quote. The first
//! quote seen opens both legs, so the first swing folds a real extent.

use serde::{Deserialize, Serialize};

use super::market::Quote;
use super::swing::Swing;

/// One direction of the trading range
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RangeLeg {
    pub start: f64,
    pub extension: f64,
    pub ema: f64,
}

/// Which leg was folded on a swing
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RangeUpdate {
    Rising(f64),
    Falling(f64),
}

#[derive(Debug, Clone)]
pub struct TradingRange {
    rising: RangeLeg,
    falling: RangeLeg,
    exist: f64,
    next: f64,
    /// Running sum of price movement between swings
    sum: f64,
    last: f64,
    seeded: bool,
}

impl TradingRange {
    /// `count` sets the weighting: `exist = (count - 1) / count`, `next = 1 / count`
    pub fn new(count: f64) -> Self {
        let count = count.max(1.0);
        Self {
            rising: RangeLeg::default(),
            falling: RangeLeg::default(),
            exist: (count - 1.0) / count,
            next: 1.0 / count,
            sum: 0.0,
            last: 0.0,
            seeded: false,
        }
    }

    /// Extend the open legs with the latest quote
    pub fn on_quote(&mut self, quote: &Quote) {
        if !self.seeded {
            self.seeded = true;
            self.rising.start = quote.ask;
            self.rising.extension = quote.ask;
            self.falling.start = quote.bid;
            self.falling.extension = quote.bid;
            self.last = quote.midpoint();
            return;
        }
        if quote.ask < self.falling.extension {
            self.falling.extension = quote.ask;
        }
        if quote.bid > self.rising.extension {
            self.rising.extension = quote.bid;
        }
    }

    /// Fold the completed leg on a swing
    pub fn on_swing(&mut self, swing: Swing, quote: &Quote) -> Option<RangeUpdate> {
        let (bid, ask) = (quote.bid, quote.ask);
        if swing != Swing::None {
            self.seeded = true;
        }
        match swing {
            Swing::Up => {
                self.sum += self.last - ask;
                self.last = ask;

                self.falling.ema = self.exist * self.falling.ema
                    + self.next * (self.falling.start - self.falling.extension);
                self.falling.start = bid;
                self.falling.extension = bid;

                self.rising.start = ask;
                self.rising.extension = ask;
                Some(RangeUpdate::Falling(self.falling.ema))
            }
            Swing::None => None,
            Swing::Down => {
                self.sum += bid - self.last;
                self.last = bid;

                self.rising.ema = self.exist * self.rising.ema
                    + self.next * (self.rising.extension - self.rising.start);
                self.rising.start = ask;
                self.rising.extension = ask;

                self.falling.start = bid;
                self.falling.extension = bid;
                Some(RangeUpdate::Rising(self.rising.ema))
            }
        }
    }

    pub fn rising(&self) -> &RangeLeg {
        &self.rising
    }

    pub fn falling(&self) -> &RangeLeg {
        &self.falling
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn quote(bid: f64, ask: f64) -> Quote {
        Quote::new(Utc::now(), bid, ask)
    }

    #[test]
    fn test_rising_leg_folds_on_down_swing() {
        let mut tr = TradingRange::new(4.0);

        // Start the rising leg at 1.0000
        tr.on_swing(Swing::Up, &quote(0.9998, 1.0000));
        tr.on_quote(&quote(1.0010, 1.0012));
        tr.on_quote(&quote(1.0040, 1.0042));
        tr.on_quote(&quote(1.0020, 1.0022));
        assert_eq!(tr.rising().extension, 1.0040);

        let update = tr.on_swing(Swing::Down, &quote(1.0020, 1.0022));
        match update {
            Some(RangeUpdate::Rising(v)) => assert!((v - 0.25 * 0.0040).abs() < 1e-12),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(tr.rising().start, 1.0022);
        assert_eq!(tr.falling().start, 1.0020);
    }

    #[test]
    fn test_falling_leg_tracks_lowest_ask() {
        let mut tr = TradingRange::new(4.0);
        tr.on_swing(Swing::Down, &quote(1.0050, 1.0052));
        tr.on_quote(&quote(1.0030, 1.0032));
        tr.on_quote(&quote(1.0040, 1.0042));
        assert_eq!(tr.falling().extension, 1.0032);

        let update = tr.on_swing(Swing::Up, &quote(1.0035, 1.0037));
        match update {
            Some(RangeUpdate::Falling(v)) => assert!((v - 0.25 * (1.0050 - 1.0032)).abs() < 1e-12),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_first_quote_opens_both_legs() {
        let mut tr = TradingRange::new(4.0);
        tr.on_quote(&quote(1.0800, 1.0802));
        assert_eq!(tr.rising().start, 1.0802);
        assert_eq!(tr.falling().start, 1.0800);

        tr.on_quote(&quote(1.0810, 1.0812));
        let update = tr.on_swing(Swing::Down, &quote(1.0805, 1.0807));
        match update {
            Some(RangeUpdate::Rising(v)) => assert!((v - 0.25 * (1.0810 - 1.0802)).abs() < 1e-12),
            other => panic!("unexpected {:?}", other),
        }
        // Sum starts from the first midpoint, not from zero
        assert!((tr.sum() - (1.0805 - 1.0801)).abs() < 1e-12);
    }

    #[test]
    fn test_no_swing_no_update() {
        let mut tr = TradingRange::new(4.0);
        assert!(tr.on_swing(Swing::None, &quote(1.0, 1.1)).is_none());
        assert_eq!(tr.sum(), 0.0);
    }
}
