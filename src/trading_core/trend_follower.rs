//! Trend-follower trade lifecycle
//!
//! One state machine per direction. The long-biased instance buys a swing
//! low while price sits under the trend EMA, the short-biased instance sells
//! a swing high while price sits over it. Both manage the position with a
//! trailing stop anchored at the swing extremum.
//!
//! ```text
//! Init -> Search -> EntrySubmitted -> ExitSignal -> ExitSubmitted -> Done
//!
//! Cancel / go-neutral from any active state:
//!   -> NoTrade | EndOfDayCancel | EndOfDayNeutral
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::market::Quote;
use super::orders::{
    Direction, EntryRequest, ExitRequest, FillContinuation, OrderEvent, OrderId, OrderTracker, OrderType,
};
use super::swing::{Swing, SwingSlot, CANDIDATE, SWING_SLOTS};
use super::trailing::TrailingStop;
use crate::error::{CoreError, CoreResult};

/// Lifecycle state of one trend follower
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeState {
    /// Freshly constructed or re-armed
    Init,
    /// Waiting for an entry swing
    Search,
    /// Entry order working
    EntrySubmitted,
    /// Position live, managing the trailing stop
    ExitSignal,
    /// Exit order working
    ExitSubmitted,
    /// Trade cycle complete
    Done,
    /// Cancelled while flat
    NoTrade,
    /// Session cancel received
    EndOfDayCancel,
    /// Session go-neutral received
    EndOfDayNeutral,
}

impl TradeState {
    /// States that only a re-arm leaves
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            TradeState::Done | TradeState::NoTrade | TradeState::EndOfDayCancel | TradeState::EndOfDayNeutral
        )
    }
}

impl std::fmt::Display for TradeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeState::Init => write!(f, "INIT"),
            TradeState::Search => write!(f, "SEARCH"),
            TradeState::EntrySubmitted => write!(f, "ENTRY_SUBMITTED"),
            TradeState::ExitSignal => write!(f, "EXIT_SIGNAL"),
            TradeState::ExitSubmitted => write!(f, "EXIT_SUBMITTED"),
            TradeState::Done => write!(f, "DONE"),
            TradeState::NoTrade => write!(f, "NO_TRADE"),
            TradeState::EndOfDayCancel => write!(f, "EOD_CANCEL"),
            TradeState::EndOfDayNeutral => write!(f, "EOD_NEUTRAL"),
        }
    }
}

/// Read-only market snapshot for one evaluation pulse
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub instrument: &'a str,
    pub quote: Quote,
    pub swing: Swing,
    /// Trend EMA of one-second midpoints
    pub ema: f64,
    pub atr_fast: f64,
    pub atr_slow: f64,
    pub true_range: f64,
    pub slots: [SwingSlot; SWING_SLOTS],
}

/// What an evaluation did
#[derive(Debug, Clone, PartialEq)]
pub enum TradeAction {
    Enter {
        order_id: OrderId,
        request: EntryRequest,
        stop: TrailingStop,
    },
    Exit {
        order_id: OrderId,
        request: ExitRequest,
        reason: ExitReason,
    },
    TrailUpdated {
        trail: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    /// Price crossed the trailing stop
    TrailingStop,
    /// Opposing swing while still in the position
    OpposingSwing,
    /// Session go-neutral
    GoNeutral,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::TrailingStop => write!(f, "STOP"),
            ExitReason::OpposingSwing => write!(f, "OPPOSING SWING"),
            ExitReason::GoNeutral => write!(f, "GO NEUTRAL"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrendFollower {
    direction: Direction,
    state: TradeState,
    stop: Option<TrailingStop>,
    entry: Option<FillContinuation>,
    exit_order: Option<OrderId>,
    /// Entry fill price while a position is live
    position: Option<f64>,
    completed_trades: u32,
    /// Sum of closed trade results in price units
    realized: f64,
}

impl TrendFollower {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            state: TradeState::Init,
            stop: None,
            entry: None,
            exit_order: None,
            position: None,
            completed_trades: 0,
            realized: 0.0,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn state(&self) -> TradeState {
        self.state
    }

    pub fn stop(&self) -> Option<&TrailingStop> {
        self.stop.as_ref()
    }

    pub fn position(&self) -> Option<f64> {
        self.position
    }

    pub fn completed_trades(&self) -> u32 {
        self.completed_trades
    }

    pub fn realized(&self) -> f64 {
        self.realized
    }

    /// Whether `order_id` is this follower's entry or exit order
    pub fn owns(&self, order_id: OrderId) -> bool {
        self.entry.as_ref().map(|e| e.order_id()) == Some(order_id) || self.exit_order == Some(order_id)
    }

    fn entry_pending(&self) -> Option<OrderId> {
        self.entry
            .as_ref()
            .filter(|e| !e.is_resolved())
            .map(|e| e.order_id())
    }

    /// Run one evaluation pulse
    pub fn evaluate<T>(&mut self, ctx: &EvalContext<'_>, tracker: Option<&mut T>) -> Option<TradeAction>
    where
        T: OrderTracker + ?Sized,
    {
        match self.state {
            TradeState::Init => {
                self.state = TradeState::Search;
                debug!("{} follower searching", self.direction.label());
                None
            }
            TradeState::Search => self.search(ctx, tracker),
            TradeState::ExitSignal => self.manage(ctx, tracker),
            TradeState::EntrySubmitted
            | TradeState::ExitSubmitted
            | TradeState::Done
            | TradeState::NoTrade
            | TradeState::EndOfDayCancel => None,
            TradeState::EndOfDayNeutral => self.flatten(ctx, tracker),
        }
    }

    fn search<T>(&mut self, ctx: &EvalContext<'_>, tracker: Option<&mut T>) -> Option<TradeAction>
    where
        T: OrderTracker + ?Sized,
    {
        let dir = self.direction;
        if ctx.swing != dir.entry_swing() {
            return None;
        }

        // Long only below the trend EMA, short only above it
        let entry_price = dir.entry_price(&ctx.quote);
        if dir.sign() * (ctx.ema - entry_price) <= 0.0 {
            debug!(
                "{},{} swing ignored, ema={:.5} entry={:.5}",
                ctx.instrument, dir.label(), ctx.ema, entry_price
            );
            return None;
        }

        let candidate = &ctx.slots[CANDIDATE];
        let anchor = match dir {
            Direction::Up => candidate.low,
            Direction::Down => candidate.high,
        };
        let exit_price = dir.exit_price(&ctx.quote);
        let stop = TrailingStop::arm(dir, anchor, exit_price);

        if stop.diff <= 0.0 {
            warn!(
                "{},{} entry skipped, price {:.5} already through anchor {:.5}",
                ctx.instrument, dir.label(), exit_price, anchor
            );
            return None;
        }

        let Some(tracker) = tracker else {
            debug!("{},{} no order tracker bound, entry skipped", ctx.instrument, dir.label());
            return None;
        };

        log_decision(ctx, dir, "entry", &stop);
        let request = EntryRequest {
            direction: dir,
            order_type: OrderType::Limit,
            timestamp: ctx.quote.timestamp,
            price: entry_price,
            opposite: exit_price,
        };
        let order_id = tracker.submit_entry(&request);

        self.entry = Some(FillContinuation::new(order_id, dir, anchor));
        self.stop = Some(stop);
        self.state = TradeState::EntrySubmitted;

        Some(TradeAction::Enter { order_id, request, stop })
    }

    fn manage<T>(&mut self, ctx: &EvalContext<'_>, tracker: Option<&mut T>) -> Option<TradeAction>
    where
        T: OrderTracker + ?Sized,
    {
        let dir = self.direction;
        let Some(stop) = self.stop.as_mut() else {
            warn!("{},{} position without a stop, returning to search", ctx.instrument, dir.label());
            self.state = TradeState::Search;
            return None;
        };

        if ctx.swing == dir.opposing_swing() {
            log_decision(ctx, dir, "exit swing", stop);
            let price = ctx.quote.midpoint();
            return self.submit_exit(ctx.instrument, &ctx.quote, price, ExitReason::OpposingSwing, tracker);
        }
        if ctx.swing != Swing::None {
            return None;
        }

        let price = dir.exit_price(&ctx.quote);
        if stop.is_hit(price) {
            log_decision(ctx, dir, "exit stop", stop);
            return self.submit_exit(ctx.instrument, &ctx.quote, price, ExitReason::TrailingStop, tracker);
        }

        stop.ratchet(price).map(|trail| {
            debug!("{},{} trail moved to {:.5}", ctx.instrument, dir.label(), trail);
            TradeAction::TrailUpdated { trail }
        })
    }

    /// Market exit for a position still open after go-neutral
    fn flatten<T>(&mut self, ctx: &EvalContext<'_>, tracker: Option<&mut T>) -> Option<TradeAction>
    where
        T: OrderTracker + ?Sized,
    {
        if self.position.is_none() || self.exit_order.is_some() {
            return None;
        }
        if let Some(stop) = self.stop.as_ref() {
            log_decision(ctx, self.direction, "exit neutral", stop);
        }
        let price = self.direction.exit_price(&ctx.quote);
        self.submit_exit(ctx.instrument, &ctx.quote, price, ExitReason::GoNeutral, tracker)
    }

    fn submit_exit<T>(
        &mut self,
        instrument: &str,
        quote: &Quote,
        price: f64,
        reason: ExitReason,
        tracker: Option<&mut T>,
    ) -> Option<TradeAction>
    where
        T: OrderTracker + ?Sized,
    {
        let Some(tracker) = tracker else {
            debug!("{},{} no order tracker bound, exit skipped", instrument, self.direction.label());
            return None;
        };

        let request = ExitRequest {
            direction: self.direction,
            order_type: OrderType::Market,
            timestamp: quote.timestamp,
            price,
        };
        let order_id = tracker.submit_exit(&request);
        self.exit_order = Some(order_id);
        if self.state == TradeState::ExitSignal {
            self.state = TradeState::ExitSubmitted;
        }

        Some(TradeAction::Exit { order_id, request, reason })
    }

    /// Apply a fill, cancel or reject for one of this follower's orders
    pub fn on_order_event<T>(
        &mut self,
        instrument: &str,
        event: &OrderEvent,
        tracker: Option<&mut T>,
    ) -> CoreResult<()>
    where
        T: OrderTracker + ?Sized,
    {
        let order_id = event.order_id();
        let dir = self.direction;

        if self.entry.as_ref().map(|e| e.order_id()) == Some(order_id) {
            return self.on_entry_event(instrument, event, tracker);
        }

        if self.exit_order != Some(order_id) {
            return Err(CoreError::UnknownOrder(order_id));
        }

        match event {
            OrderEvent::Filled { price, .. } => {
                let entry_price = self.position.take().unwrap_or(*price);
                let points = dir.sign() * (price - entry_price);
                self.realized += points;
                self.completed_trades += 1;
                self.exit_order = None;
                self.entry = None;
                self.stop = None;
                if self.state == TradeState::ExitSubmitted {
                    self.state = TradeState::Done;
                }
                info!(
                    "{},{} EXIT FILLED @ {} | entry {} | result {:+.6}",
                    instrument, dir.label(), price, entry_price, points
                );
            }
            OrderEvent::Cancelled { .. } | OrderEvent::Rejected { .. } => {
                self.exit_order = None;
                if self.state == TradeState::ExitSubmitted {
                    self.state = TradeState::ExitSignal;
                }
                warn!("{},{} exit order {} not filled: {:?}", instrument, dir.label(), order_id, event);
            }
        }
        Ok(())
    }

    fn on_entry_event<T>(&mut self, instrument: &str, event: &OrderEvent, tracker: Option<&mut T>) -> CoreResult<()>
    where
        T: OrderTracker + ?Sized,
    {
        let dir = self.direction;

        match event {
            OrderEvent::Filled { price, timestamp, .. } => {
                let Some(continuation) = self.entry.as_mut() else {
                    return Err(CoreError::UnknownOrder(event.order_id()));
                };
                let distance = continuation.resolve(*price)?;

                if let Some(stop) = self.stop.as_mut() {
                    if distance > 0.0 {
                        stop.diff = distance;
                    } else {
                        warn!(
                            "{},{} fill {} not beyond anchor {}, keeping distance {}",
                            instrument, dir.label(), price, stop.start, stop.diff
                        );
                    }
                }
                self.position = Some(*price);
                info!("{},{} ENTRY FILLED @ {} | stop {:?}", instrument, dir.label(), price, self.stop);

                match self.state {
                    TradeState::EntrySubmitted => self.state = TradeState::ExitSignal,
                    TradeState::EndOfDayNeutral => {
                        // Filled after go-neutral: flatten straight away
                        info!("{},{} entry filled after go neutral, closing @ {}", instrument, dir.label(), price);
                        let quote = Quote::new(*timestamp, *price, *price);
                        self.submit_exit(instrument, &quote, *price, ExitReason::GoNeutral, tracker);
                    }
                    _ => {}
                }
            }
            OrderEvent::Cancelled { .. } | OrderEvent::Rejected { .. } => {
                if self.entry.as_ref().is_some_and(|e| e.is_resolved()) {
                    warn!("{},{} cancel for already filled entry ignored", instrument, dir.label());
                    return Ok(());
                }
                self.entry = None;
                self.stop = None;
                if self.state == TradeState::EntrySubmitted {
                    self.state = TradeState::Search;
                }
                info!("{},{} entry not filled: {:?}", instrument, dir.label(), event);
            }
        }
        Ok(())
    }

    /// Session cancel: withdraw a working entry and stop trading. No-op once
    /// an end-of-day or no-trade state is reached.
    pub fn handle_cancel<T>(&mut self, tracker: Option<&mut T>)
    where
        T: OrderTracker + ?Sized,
    {
        match self.state {
            TradeState::NoTrade | TradeState::EndOfDayCancel | TradeState::EndOfDayNeutral => {}
            TradeState::EntrySubmitted => {
                if let (Some(order_id), Some(tracker)) = (self.entry_pending(), tracker) {
                    tracker.cancel(order_id);
                }
                self.state = TradeState::EndOfDayCancel;
            }
            TradeState::ExitSignal | TradeState::ExitSubmitted => {
                self.state = TradeState::EndOfDayCancel;
            }
            TradeState::Init | TradeState::Search | TradeState::Done => {
                self.state = TradeState::NoTrade;
            }
        }
    }

    /// Session go-neutral: withdraw a working entry and flatten any position.
    /// An exit that fails afterwards is resubmitted on the next evaluation.
    pub fn handle_go_neutral<T>(
        &mut self,
        instrument: &str,
        ctx: Option<&EvalContext<'_>>,
        mut tracker: Option<&mut T>,
    ) -> Option<TradeAction>
    where
        T: OrderTracker + ?Sized,
    {
        if self.state != TradeState::EndOfDayNeutral {
            if let (Some(order_id), Some(tracker)) = (self.entry_pending(), tracker.as_deref_mut()) {
                tracker.cancel(order_id);
            }
            self.state = TradeState::EndOfDayNeutral;
        }

        match ctx {
            Some(ctx) => self.flatten(ctx, tracker),
            None => {
                if self.position.is_some() && self.exit_order.is_none() {
                    warn!("{},{} go neutral without a quote, position left open", instrument, self.direction.label());
                }
                None
            }
        }
    }

    /// Return a finished, flat follower to `Init` for a new cycle
    pub fn rearm(&mut self) -> bool {
        let flat = self.position.is_none() && self.exit_order.is_none() && self.entry_pending().is_none();
        if self.state.is_finished() && flat {
            self.state = TradeState::Init;
            self.stop = None;
            self.entry = None;
            true
        } else {
            false
        }
    }
}

/// Diagnostic line for an entry or exit decision
fn log_decision(ctx: &EvalContext<'_>, direction: Direction, decision: &str, stop: &TrailingStop) {
    info!(
        "{},{},{},b={},a={},atrf={:.6},atrs={:.6},tr={:.6},sw={},st={},df={},trl={}",
        ctx.instrument,
        direction.label(),
        decision,
        ctx.quote.bid,
        ctx.quote.ask,
        ctx.atr_fast,
        ctx.atr_slow,
        ctx.true_range,
        format_extrema(direction, &ctx.slots),
        stop.start,
        stop.diff,
        stop.trail
    );
}

fn format_extrema(direction: Direction, slots: &[SwingSlot; SWING_SLOTS]) -> String {
    slots
        .iter()
        .map(|s| match direction {
            Direction::Up => s.low.to_string(),
            Direction::Down => s.high.to_string(),
        })
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};
    use uuid::Uuid;

    #[derive(Default)]
    struct RecordingTracker {
        entries: Vec<(OrderId, EntryRequest)>,
        exits: Vec<(OrderId, ExitRequest)>,
        cancels: Vec<OrderId>,
    }

    impl OrderTracker for RecordingTracker {
        fn price_interval(&self, _price: f64) -> f64 {
            0.00001
        }

        fn submit_entry(&mut self, request: &EntryRequest) -> OrderId {
            let id = Uuid::new_v4();
            self.entries.push((id, *request));
            id
        }

        fn submit_exit(&mut self, request: &ExitRequest) -> OrderId {
            let id = Uuid::new_v4();
            self.exits.push((id, *request));
            id
        }

        fn cancel(&mut self, order_id: OrderId) {
            self.cancels.push(order_id);
        }
    }

    fn t(sec: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap() + Duration::seconds(sec)
    }

    fn slots(highs: [f64; 5], lows: [f64; 5]) -> [SwingSlot; SWING_SLOTS] {
        let mut out = [SwingSlot::default(); SWING_SLOTS];
        for i in 0..SWING_SLOTS {
            out[i] = SwingSlot { timestamp: Some(t(i as i64 * 60)), high: highs[i], low: lows[i], ema: 0.0 };
        }
        out
    }

    fn ctx(sec: i64, bid: f64, ask: f64, swing: Swing, ema: f64) -> EvalContext<'static> {
        EvalContext {
            instrument: "EUR/USD",
            quote: Quote::new(t(sec), bid, ask),
            swing,
            ema,
            atr_fast: 0.0004,
            atr_slow: 0.0005,
            true_range: 0.0004,
            slots: slots(
                [1.0830, 1.0825, 1.0820, 1.0826, 1.0832],
                [1.0810, 1.0805, 1.0800, 1.0806, 1.0812],
            ),
        }
    }

    fn filled(order_id: OrderId, price: f64) -> OrderEvent {
        OrderEvent::Filled { order_id, price, timestamp: t(0) }
    }

    /// Drive the long follower into a live position with the stop at 1.0800
    fn long_in_position(tracker: &mut RecordingTracker) -> TrendFollower {
        let mut up = TrendFollower::new(Direction::Up);
        up.evaluate(&ctx(0, 1.0810, 1.0811, Swing::None, 1.0850), Some(&mut *tracker));
        let action = up.evaluate(&ctx(1, 1.0810, 1.0811, Swing::Up, 1.0850), Some(&mut *tracker));
        let Some(TradeAction::Enter { order_id, .. }) = action else {
            panic!("expected entry, got {:?}", action);
        };
        up.on_order_event("EUR/USD", &filled(order_id, 1.0811), Some(&mut *tracker)).unwrap();
        up
    }

    #[test]
    fn test_init_goes_to_search_once() {
        let mut up = TrendFollower::new(Direction::Up);
        let mut tracker = RecordingTracker::default();

        // Even an entry swing on the first pulse only moves Init -> Search
        let action = up.evaluate(&ctx(0, 1.0810, 1.0811, Swing::Up, 1.0850), Some(&mut tracker));
        assert!(action.is_none());
        assert_eq!(up.state(), TradeState::Search);
        assert!(tracker.entries.is_empty());
    }

    #[test]
    fn test_long_entry_on_swing_low_below_ema() {
        let mut tracker = RecordingTracker::default();
        let mut up = TrendFollower::new(Direction::Up);
        up.evaluate(&ctx(0, 1.0810, 1.0811, Swing::None, 1.0850), Some(&mut tracker));

        let action = up.evaluate(&ctx(1, 1.0810, 1.0811, Swing::Up, 1.0850), Some(&mut tracker));
        let Some(TradeAction::Enter { request, stop, .. }) = action else {
            panic!("expected entry, got {:?}", action);
        };
        assert_eq!(up.state(), TradeState::EntrySubmitted);
        assert_eq!(request.order_type, OrderType::Limit);
        assert_eq!(request.price, 1.0811);
        assert_eq!(request.opposite, 1.0810);
        assert_eq!(stop.start, 1.0800);
        assert_eq!(stop.trail, 1.0800);
        assert!((stop.diff - 0.0010).abs() < 1e-9);
        assert_eq!(tracker.entries.len(), 1);
    }

    #[test]
    fn test_long_entry_needs_price_below_ema() {
        let mut tracker = RecordingTracker::default();
        let mut up = TrendFollower::new(Direction::Up);
        up.evaluate(&ctx(0, 1.0810, 1.0811, Swing::None, 1.0805), Some(&mut tracker));
        let action = up.evaluate(&ctx(1, 1.0810, 1.0811, Swing::Up, 1.0805), Some(&mut tracker));
        assert!(action.is_none());
        assert_eq!(up.state(), TradeState::Search);
    }

    #[test]
    fn test_short_entry_on_swing_high_above_ema() {
        let mut tracker = RecordingTracker::default();
        let mut dn = TrendFollower::new(Direction::Down);
        dn.evaluate(&ctx(0, 1.0810, 1.0811, Swing::None, 1.0790), Some(&mut tracker));

        let action = dn.evaluate(&ctx(1, 1.0810, 1.0811, Swing::Down, 1.0790), Some(&mut tracker));
        let Some(TradeAction::Enter { order_id, request, stop }) = action else {
            panic!("expected entry, got {:?}", action);
        };
        assert_eq!(request.price, 1.0810);
        assert_eq!(stop.start, 1.0820);
        assert!((stop.diff - 0.0009).abs() < 1e-9);

        dn.on_order_event("EUR/USD", &filled(order_id, 1.0808), Some(&mut tracker)).unwrap();
        assert_eq!(dn.state(), TradeState::ExitSignal);
        assert!((dn.stop().unwrap().diff - 0.0012).abs() < 1e-9);
    }

    #[test]
    fn test_fill_fixes_protected_distance_once() {
        let mut tracker = RecordingTracker::default();
        let mut up = long_in_position(&mut tracker);
        assert_eq!(up.state(), TradeState::ExitSignal);
        assert!((up.stop().unwrap().diff - 0.0011).abs() < 1e-9);

        let order_id = tracker.entries[0].0;
        let again = up.on_order_event("EUR/USD", &filled(order_id, 1.0900), Some(&mut tracker));
        assert!(matches!(again, Err(CoreError::AlreadyResolved(id)) if id == order_id));
        assert!((up.stop().unwrap().diff - 0.0011).abs() < 1e-9);
    }

    #[test]
    fn test_trail_monotonic_then_stop_exit() {
        let mut tracker = RecordingTracker::default();
        let mut up = long_in_position(&mut tracker);

        let mut last = up.stop().unwrap().trail;
        for i in 0..30 {
            let bid = 1.0812 + i as f64 * 0.0001;
            up.evaluate(&ctx(10 + i, bid, bid + 0.0001, Swing::None, 1.0850), Some(&mut tracker));
            let trail = up.stop().unwrap().trail;
            assert!(trail >= last, "trail loosened from {} to {}", last, trail);
            last = trail;
        }
        assert!(last > 1.0800);
        assert_eq!(up.state(), TradeState::ExitSignal);

        let through = last - 0.0001;
        let action = up.evaluate(&ctx(100, through, through + 0.0001, Swing::None, 1.0850), Some(&mut tracker));
        match action {
            Some(TradeAction::Exit { request, reason, .. }) => {
                assert_eq!(reason, ExitReason::TrailingStop);
                assert_eq!(request.order_type, OrderType::Market);
                assert_eq!(request.price, through);
            }
            other => panic!("expected exit, got {:?}", other),
        }
        assert_eq!(up.state(), TradeState::ExitSubmitted);

        // No further trail updates once the exit is working
        let action = up.evaluate(&ctx(101, 1.0900, 1.0901, Swing::None, 1.0850), Some(&mut tracker));
        assert!(action.is_none());
        assert_eq!(up.stop().unwrap().trail, last);
        assert_eq!(tracker.exits.len(), 1);
    }

    #[test]
    fn test_opposing_swing_exits_at_midpoint() {
        let mut tracker = RecordingTracker::default();
        let mut up = long_in_position(&mut tracker);

        let action = up.evaluate(&ctx(5, 1.0820, 1.0822, Swing::Down, 1.0850), Some(&mut tracker));
        match action {
            Some(TradeAction::Exit { request, reason, .. }) => {
                assert_eq!(reason, ExitReason::OpposingSwing);
                assert!((request.price - 1.0821).abs() < 1e-12);
            }
            other => panic!("expected exit, got {:?}", other),
        }
    }

    #[test]
    fn test_own_swing_holds_position() {
        let mut tracker = RecordingTracker::default();
        let mut up = long_in_position(&mut tracker);
        let action = up.evaluate(&ctx(5, 1.0700, 1.0701, Swing::Up, 1.0850), Some(&mut tracker));
        assert!(action.is_none());
        assert_eq!(up.state(), TradeState::ExitSignal);
    }

    #[test]
    fn test_short_trail_tightens_downward() {
        let mut tracker = RecordingTracker::default();
        let mut dn = TrendFollower::new(Direction::Down);
        dn.evaluate(&ctx(0, 1.0810, 1.0811, Swing::None, 1.0790), Some(&mut tracker));
        let Some(TradeAction::Enter { order_id, .. }) =
            dn.evaluate(&ctx(1, 1.0810, 1.0811, Swing::Down, 1.0790), Some(&mut tracker))
        else {
            panic!("expected entry");
        };
        dn.on_order_event("EUR/USD", &filled(order_id, 1.0810), Some(&mut tracker)).unwrap();

        // diff = 0.0010, ask falls to 1.0795: trail moves to 1.0805
        let action = dn.evaluate(&ctx(2, 1.0794, 1.0795, Swing::None, 1.0790), Some(&mut tracker));
        match action {
            Some(TradeAction::TrailUpdated { trail }) => assert!((trail - 1.0805).abs() < 1e-9),
            other => panic!("expected trail update, got {:?}", other),
        }
        assert!(dn.stop().unwrap().trail < dn.stop().unwrap().start);
    }

    #[test]
    fn test_exit_fill_completes_cycle() {
        let mut tracker = RecordingTracker::default();
        let mut up = long_in_position(&mut tracker);
        up.evaluate(&ctx(5, 1.0820, 1.0822, Swing::Down, 1.0850), Some(&mut tracker));
        let exit_id = tracker.exits[0].0;

        up.on_order_event("EUR/USD", &filled(exit_id, 1.0821), Some(&mut tracker)).unwrap();
        assert_eq!(up.state(), TradeState::Done);
        assert_eq!(up.completed_trades(), 1);
        assert!((up.realized() - 0.0010).abs() < 1e-9);
        assert!(up.position().is_none());
    }

    #[test]
    fn test_rejected_exit_returns_to_signal() {
        let mut tracker = RecordingTracker::default();
        let mut up = long_in_position(&mut tracker);
        up.evaluate(&ctx(5, 1.0820, 1.0822, Swing::Down, 1.0850), Some(&mut tracker));
        let exit_id = tracker.exits[0].0;

        let rejected = OrderEvent::Rejected { order_id: exit_id, reason: "closed".to_string() };
        up.on_order_event("EUR/USD", &rejected, Some(&mut tracker)).unwrap();
        assert_eq!(up.state(), TradeState::ExitSignal);
        assert_eq!(up.position(), Some(1.0811));
    }

    #[test]
    fn test_cancelled_entry_resumes_search() {
        let mut tracker = RecordingTracker::default();
        let mut up = TrendFollower::new(Direction::Up);
        up.evaluate(&ctx(0, 1.0810, 1.0811, Swing::None, 1.0850), Some(&mut tracker));
        up.evaluate(&ctx(1, 1.0810, 1.0811, Swing::Up, 1.0850), Some(&mut tracker));
        let order_id = tracker.entries[0].0;

        up.on_order_event("EUR/USD", &OrderEvent::Cancelled { order_id }, Some(&mut tracker)).unwrap();
        assert_eq!(up.state(), TradeState::Search);
        assert!(up.stop().is_none());
        assert!(!up.owns(order_id));
    }

    #[test]
    fn test_unknown_order_rejected() {
        let mut up = TrendFollower::new(Direction::Up);
        let id = Uuid::new_v4();
        let result = up.on_order_event::<RecordingTracker>("EUR/USD", &filled(id, 1.0), None);
        assert!(matches!(result, Err(CoreError::UnknownOrder(got)) if got == id));
    }

    #[test]
    fn test_no_tracker_skips_entry() {
        let mut up = TrendFollower::new(Direction::Up);
        up.evaluate::<RecordingTracker>(&ctx(0, 1.0810, 1.0811, Swing::None, 1.0850), None);
        let action = up.evaluate::<RecordingTracker>(&ctx(1, 1.0810, 1.0811, Swing::Up, 1.0850), None);
        assert!(action.is_none());
        assert_eq!(up.state(), TradeState::Search);
    }

    #[test]
    fn test_cancel_from_every_active_state() {
        let mut tracker = RecordingTracker::default();

        // Init and Search are flat
        let mut a = TrendFollower::new(Direction::Up);
        a.handle_cancel(Some(&mut tracker));
        assert_eq!(a.state(), TradeState::NoTrade);

        // Entry working: order is withdrawn
        let mut b = TrendFollower::new(Direction::Up);
        b.evaluate(&ctx(0, 1.0810, 1.0811, Swing::None, 1.0850), Some(&mut tracker));
        b.evaluate(&ctx(1, 1.0810, 1.0811, Swing::Up, 1.0850), Some(&mut tracker));
        b.handle_cancel(Some(&mut tracker));
        assert_eq!(b.state(), TradeState::EndOfDayCancel);
        assert_eq!(tracker.cancels.len(), 1);

        // Idempotent
        b.handle_cancel(Some(&mut tracker));
        assert_eq!(b.state(), TradeState::EndOfDayCancel);
        assert_eq!(tracker.cancels.len(), 1);

        // Position live
        let mut c = long_in_position(&mut tracker);
        c.handle_cancel(Some(&mut tracker));
        assert_eq!(c.state(), TradeState::EndOfDayCancel);

        // No tracker bound
        let mut d = TrendFollower::new(Direction::Down);
        d.handle_cancel::<RecordingTracker>(None);
        assert_eq!(d.state(), TradeState::NoTrade);
    }

    #[test]
    fn test_go_neutral_flattens_position() {
        let mut tracker = RecordingTracker::default();
        let mut up = long_in_position(&mut tracker);
        up.handle_cancel(Some(&mut tracker));

        let snapshot = ctx(50, 1.0815, 1.0816, Swing::None, 1.0850);
        let action = up.handle_go_neutral("EUR/USD", Some(&snapshot), Some(&mut tracker));
        assert!(matches!(action, Some(TradeAction::Exit { reason: ExitReason::GoNeutral, .. })));
        assert_eq!(up.state(), TradeState::EndOfDayNeutral);
        assert_eq!(tracker.exits.len(), 1);
        assert_eq!(tracker.exits[0].1.price, 1.0815);

        // Second go-neutral does nothing while the exit is working
        assert!(up.handle_go_neutral("EUR/USD", Some(&snapshot), Some(&mut tracker)).is_none());
        assert!(up.evaluate(&snapshot, Some(&mut tracker)).is_none());
        assert_eq!(tracker.exits.len(), 1);

        // Exit fill keeps the end-of-day state, then re-arm starts over
        let exit_id = tracker.exits[0].0;
        up.on_order_event("EUR/USD", &filled(exit_id, 1.0815), Some(&mut tracker)).unwrap();
        assert_eq!(up.state(), TradeState::EndOfDayNeutral);
        assert!(up.rearm());
        assert_eq!(up.state(), TradeState::Init);
    }

    #[test]
    fn test_rearm_refused_with_open_position() {
        let mut tracker = RecordingTracker::default();
        let mut up = long_in_position(&mut tracker);
        up.handle_cancel(Some(&mut tracker));
        assert!(!up.rearm());
        assert_eq!(up.state(), TradeState::EndOfDayCancel);
    }

    #[test]
    fn test_failed_neutral_exit_is_resubmitted() {
        let mut tracker = RecordingTracker::default();
        let mut up = long_in_position(&mut tracker);

        let snapshot = ctx(50, 1.0815, 1.0816, Swing::None, 1.0850);
        up.handle_go_neutral("EUR/USD", Some(&snapshot), Some(&mut tracker));
        let exit_id = tracker.exits[0].0;

        let rejected = OrderEvent::Rejected { order_id: exit_id, reason: "closed".to_string() };
        up.on_order_event("EUR/USD", &rejected, Some(&mut tracker)).unwrap();
        assert_eq!(up.state(), TradeState::EndOfDayNeutral);
        assert_eq!(up.position(), Some(1.0811));
        assert!(!up.rearm());

        // Next pulse flattens again at the current bid
        let action = up.evaluate(&ctx(51, 1.0813, 1.0814, Swing::None, 1.0850), Some(&mut tracker));
        match action {
            Some(TradeAction::Exit { request, reason, .. }) => {
                assert_eq!(reason, ExitReason::GoNeutral);
                assert_eq!(request.price, 1.0813);
            }
            other => panic!("expected exit, got {:?}", other),
        }
        assert_eq!(tracker.exits.len(), 2);

        let retry_id = tracker.exits[1].0;
        up.on_order_event("EUR/USD", &filled(retry_id, 1.0813), Some(&mut tracker)).unwrap();
        assert!(up.position().is_none());
        assert!(up.rearm());
    }

    #[test]
    fn test_go_neutral_without_quote_retries_on_pulse() {
        let mut tracker = RecordingTracker::default();
        let mut up = long_in_position(&mut tracker);

        assert!(up.handle_go_neutral("EUR/USD", None, Some(&mut tracker)).is_none());
        assert_eq!(up.state(), TradeState::EndOfDayNeutral);
        assert!(tracker.exits.is_empty());

        let action = up.evaluate(&ctx(60, 1.0815, 1.0816, Swing::None, 1.0850), Some(&mut tracker));
        assert!(matches!(action, Some(TradeAction::Exit { reason: ExitReason::GoNeutral, .. })));
        assert_eq!(tracker.exits.len(), 1);
    }

    #[test]
    fn test_go_neutral_withdraws_entry_and_flattens_late_fill() {
        let mut tracker = RecordingTracker::default();
        let mut up = TrendFollower::new(Direction::Up);
        up.evaluate(&ctx(0, 1.0810, 1.0811, Swing::None, 1.0850), Some(&mut tracker));
        up.evaluate(&ctx(1, 1.0810, 1.0811, Swing::Up, 1.0850), Some(&mut tracker));
        let entry_id = tracker.entries[0].0;

        let snapshot = ctx(50, 1.0815, 1.0816, Swing::None, 1.0850);
        assert!(up.handle_go_neutral("EUR/USD", Some(&snapshot), Some(&mut tracker)).is_none());
        assert_eq!(up.state(), TradeState::EndOfDayNeutral);
        assert_eq!(tracker.cancels, vec![entry_id]);
        assert!(tracker.exits.is_empty());

        // The cancel lost the race: the fill is flattened at its own price
        up.on_order_event("EUR/USD", &filled(entry_id, 1.0811), Some(&mut tracker)).unwrap();
        assert_eq!(up.state(), TradeState::EndOfDayNeutral);
        assert_eq!(up.position(), Some(1.0811));
        assert_eq!(tracker.exits.len(), 1);
        assert_eq!(tracker.exits[0].1.price, 1.0811);
        assert_eq!(tracker.exits[0].1.order_type, OrderType::Market);
    }

    /// Short position filled at 1.0810 with the stop at 1.0820
    fn short_in_position(tracker: &mut RecordingTracker) -> TrendFollower {
        let mut dn = TrendFollower::new(Direction::Down);
        dn.evaluate(&ctx(0, 1.0810, 1.0811, Swing::None, 1.0790), Some(&mut *tracker));
        let action = dn.evaluate(&ctx(1, 1.0810, 1.0811, Swing::Down, 1.0790), Some(&mut *tracker));
        let Some(TradeAction::Enter { order_id, .. }) = action else {
            panic!("expected entry, got {:?}", action);
        };
        dn.on_order_event("EUR/USD", &filled(order_id, 1.0810), Some(&mut *tracker)).unwrap();
        dn
    }

    #[test]
    fn test_short_stop_exit_on_ask() {
        let mut tracker = RecordingTracker::default();
        let mut dn = short_in_position(&mut tracker);
        assert_eq!(dn.stop().unwrap().trail, 1.0820);

        // Bid under the trail does not trigger, the ask does
        let action = dn.evaluate(&ctx(5, 1.0815, 1.0819, Swing::None, 1.0790), Some(&mut tracker));
        assert!(action.is_none());

        let action = dn.evaluate(&ctx(6, 1.0819, 1.0821, Swing::None, 1.0790), Some(&mut tracker));
        match action {
            Some(TradeAction::Exit { request, reason, .. }) => {
                assert_eq!(reason, ExitReason::TrailingStop);
                assert_eq!(request.direction, Direction::Down);
                assert_eq!(request.price, 1.0821);
            }
            other => panic!("expected exit, got {:?}", other),
        }
        assert_eq!(dn.state(), TradeState::ExitSubmitted);

        let exit_id = tracker.exits[0].0;
        dn.on_order_event("EUR/USD", &filled(exit_id, 1.0821), Some(&mut tracker)).unwrap();
        assert_eq!(dn.state(), TradeState::Done);
        assert!((dn.realized() + 0.0011).abs() < 1e-9);
    }

    #[test]
    fn test_short_opposing_swing_exits_at_midpoint() {
        let mut tracker = RecordingTracker::default();
        let mut dn = short_in_position(&mut tracker);

        // Own swing holds, opposing swing exits
        assert!(dn.evaluate(&ctx(5, 1.0800, 1.0802, Swing::Down, 1.0790), Some(&mut tracker)).is_none());
        let action = dn.evaluate(&ctx(6, 1.0800, 1.0802, Swing::Up, 1.0790), Some(&mut tracker));
        match action {
            Some(TradeAction::Exit { request, reason, .. }) => {
                assert_eq!(reason, ExitReason::OpposingSwing);
                assert!((request.price - 1.0801).abs() < 1e-12);
            }
            other => panic!("expected exit, got {:?}", other),
        }
        assert_eq!(dn.state(), TradeState::ExitSubmitted);
    }

    #[test]
    fn test_cancel_from_search_and_exit_submitted() {
        let mut tracker = RecordingTracker::default();

        let mut searching = TrendFollower::new(Direction::Up);
        searching.evaluate(&ctx(0, 1.0810, 1.0811, Swing::None, 1.0850), Some(&mut tracker));
        assert_eq!(searching.state(), TradeState::Search);
        searching.handle_cancel(Some(&mut tracker));
        assert_eq!(searching.state(), TradeState::NoTrade);
        assert!(searching.rearm());

        // A working exit is left alone
        let mut exiting = long_in_position(&mut tracker);
        exiting.evaluate(&ctx(5, 1.0820, 1.0822, Swing::Down, 1.0850), Some(&mut tracker));
        assert_eq!(exiting.state(), TradeState::ExitSubmitted);
        exiting.handle_cancel(Some(&mut tracker));
        assert_eq!(exiting.state(), TradeState::EndOfDayCancel);
        assert!(tracker.cancels.is_empty());

        let exit_id = tracker.exits[0].0;
        exiting.on_order_event("EUR/USD", &filled(exit_id, 1.0821), Some(&mut tracker)).unwrap();
        assert_eq!(exiting.state(), TradeState::EndOfDayCancel);
        assert_eq!(exiting.completed_trades(), 1);
        assert!(exiting.rearm());
    }
}
