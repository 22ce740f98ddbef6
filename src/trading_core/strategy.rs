//! Strategy orchestrator
//!
//! Owns the full single-instrument pipeline:
//! - quotes -> 1s midpoint bars -> trend EMA -> evaluation pulse
//! - trades (priced at the midpoint) -> 60s bars -> true range -> ATR fast/slow
//! - 60s bars -> swing window -> swing classification for the next pulse
//! - pulse -> trading range update -> both trend followers
//!
//! All input must be delivered serially for one instance.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::bars::{Bar, BarAggregator};
use super::ema::Ema;
use super::market::{Quote, Trade};
use super::orders::{Direction, OrderEvent, OrderTracker};
use super::pip::PipValue;
use super::series::{Series, SeriesSink};
use super::session::{SessionEvent, SessionSchedule};
use super::swing::{Swing, SwingTrack, SwingWindow};
use super::trading_range::{RangeUpdate, TradingRange};
use super::trend_follower::{EvalContext, TradeAction, TradeState, TrendFollower};
use super::true_range::TrueRange;
use crate::config::StrategyConfig;
use crate::error::{CoreError, CoreResult};

/// Host-installed software reset hook
pub type ResetHandler = Box<dyn FnMut() -> bool + Send>;

/// End-of-run statistics for one trend follower
#[derive(Debug, Clone, Serialize)]
pub struct FollowerReport {
    pub direction: Direction,
    pub state: TradeState,
    pub completed_trades: u32,
    pub realized: f64,
}

impl FollowerReport {
    fn from_follower(follower: &TrendFollower) -> Self {
        Self {
            direction: follower.direction(),
            state: follower.state(),
            completed_trades: follower.completed_trades(),
            realized: follower.realized(),
        }
    }
}

/// Session statistics
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub instrument: String,
    pub pulses: u64,
    pub evaluations: u64,
    pub quote_bars: u64,
    pub trade_bars: u64,
    /// Out-of-order samples rejected by either aggregator
    pub rejected_samples: u64,
    /// Trades received before the first quote
    pub ignored_trades: u64,
    pub swing_highs: u32,
    pub swing_lows: u32,
    pub net_swings: i32,
    pub conflicting_swings: u32,
    pub swing_sum: f64,
    pub range_rising: f64,
    pub range_falling: f64,
    pub atr_fast: f64,
    pub atr_slow: f64,
    pub pip: Option<PipValue>,
    pub up: FollowerReport,
    pub down: FollowerReport,
}

pub struct Strategy<T: OrderTracker> {
    config: StrategyConfig,

    quote_bars: BarAggregator,
    trade_bars: BarAggregator,
    price_ema: Ema,
    true_range: TrueRange,
    atr_fast: Ema,
    atr_slow: Ema,
    swings: SwingWindow,
    range: TradingRange,

    up: TrendFollower,
    down: TrendFollower,

    schedule: Option<SessionSchedule>,
    tracker: Option<T>,
    series: Option<Box<dyn SeriesSink + Send>>,
    software_reset: Option<ResetHandler>,

    /// Current market
    quote: Option<Quote>,
    /// Swing detected since the last pulse
    swing: Swing,
    pip: Option<PipValue>,

    pulses: u64,
    evaluations: u64,
    ignored_trades: u64,
}

impl<T: OrderTracker> Strategy<T> {
    pub fn new(config: StrategyConfig) -> CoreResult<Self> {
        config.validate()?;
        let schedule = config.session.as_ref().map(SessionSchedule::new).transpose()?;

        Ok(Self {
            quote_bars: BarAggregator::new(config.quote_bar_seconds),
            trade_bars: BarAggregator::new(config.trade_bar_seconds),
            price_ema: Ema::new(config.price_ema_period),
            true_range: TrueRange::new(),
            atr_fast: Ema::new(config.atr_fast_period),
            atr_slow: Ema::new(config.atr_slow_period),
            swings: SwingWindow::new(),
            range: TradingRange::new(f64::from(config.range_count)),
            up: TrendFollower::new(Direction::Up),
            down: TrendFollower::new(Direction::Down),
            schedule,
            tracker: None,
            series: None,
            software_reset: None,
            quote: None,
            swing: Swing::None,
            pip: None,
            pulses: 0,
            evaluations: 0,
            ignored_trades: 0,
            config,
        })
    }

    pub fn bind_tracker(&mut self, tracker: T) {
        self.tracker = Some(tracker);
    }

    pub fn unbind_tracker(&mut self) -> Option<T> {
        self.tracker.take()
    }

    pub fn tracker(&self) -> Option<&T> {
        self.tracker.as_ref()
    }

    pub fn bind_series(&mut self, sink: Box<dyn SeriesSink + Send>) {
        self.series = Some(sink);
    }

    pub fn unbind_series(&mut self) -> Option<Box<dyn SeriesSink + Send>> {
        self.series.take()
    }

    pub fn set_software_reset(&mut self, handler: ResetHandler) {
        self.software_reset = Some(handler);
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn latest_quote(&self) -> Option<&Quote> {
        self.quote.as_ref()
    }

    pub fn follower(&self, direction: Direction) -> &TrendFollower {
        match direction {
            Direction::Up => &self.up,
            Direction::Down => &self.down,
        }
    }

    pub fn swings(&self) -> &SwingWindow {
        &self.swings
    }

    pub fn swing_tracks(&self) -> &[SwingTrack] {
        self.swings.tracks()
    }

    pub fn price_ema(&self) -> f64 {
        self.price_ema.latest()
    }

    pub fn pip(&self) -> Option<&PipValue> {
        self.pip.as_ref()
    }

    fn emit(&mut self, series: Series, timestamp: DateTime<Utc>, value: f64) {
        if let Some(sink) = self.series.as_mut() {
            sink.append(series, timestamp, value);
        }
    }

    /// Apply a quote. Returns the trade actions taken if the quote closed a
    /// pulse bar.
    pub fn handle_quote(&mut self, quote: Quote) -> CoreResult<Vec<TradeAction>> {
        let completed = self.quote_bars.add(quote.timestamp, quote.midpoint(), 1)?;

        self.quote = Some(quote);
        self.emit(Series::Ask, quote.timestamp, quote.ask);
        self.emit(Series::Bid, quote.timestamp, quote.bid);
        self.range.on_quote(&quote);

        let actions = match completed {
            Some(bar) => self.on_pulse_bar(&bar),
            None => Vec::new(),
        };

        let events = match self.tracker.as_mut() {
            Some(tracker) => tracker.poll_events(&quote),
            None => Vec::new(),
        };
        for event in events {
            if let Err(e) = self.handle_order_event(event) {
                warn!("{} order event dropped: {}", self.config.instrument, e);
            }
        }

        Ok(actions)
    }

    /// Apply a trade print, priced at the current midpoint
    pub fn handle_trade(&mut self, trade: Trade) -> CoreResult<()> {
        let Some(quote) = self.quote else {
            self.ignored_trades += 1;
            debug!("{} trade at {} before first quote ignored", self.config.instrument, trade.timestamp);
            return Ok(());
        };

        let price = quote.midpoint();
        if let Some(bar) = self.trade_bars.add(trade.timestamp, price, trade.volume)? {
            self.on_minute_bar(&bar);
        }
        self.emit(Series::Trade, trade.timestamp, price);
        Ok(())
    }

    fn on_minute_bar(&mut self, bar: &Bar) {
        let ts = bar.timestamp;
        if let Some(sink) = self.series.as_mut() {
            sink.append_bar(Series::TradeBars, bar);
            sink.append(Series::Volume, ts, bar.volume as f64);
        }

        let tr = self.true_range.update(bar);
        let fast = self.atr_fast.update(ts, tr);
        let slow = self.atr_slow.update(ts, tr);
        self.emit(Series::AtrFast, ts, fast);
        self.emit(Series::AtrSlow, ts, slow);

        let swing = self.swings.push(bar, self.price_ema.latest());
        if swing == Swing::None {
            return;
        }
        self.swing = swing;

        let candidate = *self.swings.candidate();
        let at = candidate.timestamp.unwrap_or(ts);
        if let Some(sink) = self.series.as_mut() {
            match swing {
                Swing::Down => sink.add_label(Series::SwingDown, at, candidate.high, "Swing Dn"),
                Swing::Up => sink.add_label(Series::SwingUp, at, candidate.low, "Swing Up"),
                Swing::None => {}
            }
        }
    }

    fn on_pulse_bar(&mut self, bar: &Bar) -> Vec<TradeAction> {
        let ema = self.price_ema.update(bar.timestamp, bar.close);
        self.emit(Series::PriceEma, bar.timestamp, ema);
        self.pulse(bar.timestamp)
    }

    /// Once-per-bar evaluation
    fn pulse(&mut self, timestamp: DateTime<Utc>) -> Vec<TradeAction> {
        self.pulses += 1;

        let in_regular_hours = match self.schedule.as_mut().map(|s| s.advance(timestamp)) {
            Some(tick) => {
                for event in tick.events {
                    self.handle_session_event(event);
                }
                tick.in_regular_hours
            }
            None => true,
        };

        let actions = if in_regular_hours {
            self.regular_hours_pulse(timestamp)
        } else {
            Vec::new()
        };

        self.swing = Swing::None;
        actions
    }

    fn regular_hours_pulse(&mut self, timestamp: DateTime<Utc>) -> Vec<TradeAction> {
        let Some(quote) = self.quote else {
            return Vec::new();
        };
        self.evaluations += 1;

        let (up_pl, dn_pl) = (self.up.realized(), self.down.realized());
        self.emit(Series::PlUp, timestamp, up_pl);
        self.emit(Series::PlDown, timestamp, dn_pl);
        self.emit(Series::PlTotal, timestamp, up_pl + dn_pl);

        match self.range.on_swing(self.swing, &quote) {
            Some(RangeUpdate::Rising(v)) => self.emit(Series::RangeRising, timestamp, v),
            Some(RangeUpdate::Falling(v)) => self.emit(Series::RangeFalling, timestamp, v),
            None => {}
        }

        let ctx = EvalContext {
            instrument: &self.config.instrument,
            quote,
            swing: self.swing,
            ema: self.price_ema.latest(),
            atr_fast: self.atr_fast.latest(),
            atr_slow: self.atr_slow.latest(),
            true_range: self.true_range.latest(),
            slots: *self.swings.slots(),
        };

        let mut actions = Vec::new();
        actions.extend(self.up.evaluate(&ctx, self.tracker.as_mut()));
        actions.extend(self.down.evaluate(&ctx, self.tracker.as_mut()));
        actions
    }

    /// Route a fill, cancel or reject to the follower that owns the order
    pub fn handle_order_event(&mut self, event: OrderEvent) -> CoreResult<()> {
        let order_id = event.order_id();
        let instrument = &self.config.instrument;
        if self.up.owns(order_id) {
            self.up.on_order_event(instrument, &event, self.tracker.as_mut())
        } else if self.down.owns(order_id) {
            self.down.on_order_event(instrument, &event, self.tracker.as_mut())
        } else {
            Err(CoreError::UnknownOrder(order_id))
        }
    }

    /// Apply a session boundary signal. Returns the reset handler's result
    /// for `SoftwareReset`, true otherwise.
    pub fn handle_session_event(&mut self, event: SessionEvent) -> bool {
        info!("{} session event {}", self.config.instrument, event);
        match event {
            SessionEvent::BellHeard => {
                self.compute_pip();
                for follower in [&mut self.up, &mut self.down] {
                    if follower.rearm() {
                        debug!("{} follower re-armed", follower.direction().label());
                    }
                }
                true
            }
            SessionEvent::Cancel => {
                self.up.handle_cancel(self.tracker.as_mut());
                self.down.handle_cancel(self.tracker.as_mut());
                true
            }
            SessionEvent::GoNeutral => {
                let instrument = &self.config.instrument;
                let ctx = self.quote.map(|quote| EvalContext {
                    instrument,
                    quote,
                    swing: self.swing,
                    ema: self.price_ema.latest(),
                    atr_fast: self.atr_fast.latest(),
                    atr_slow: self.atr_slow.latest(),
                    true_range: self.true_range.latest(),
                    slots: *self.swings.slots(),
                });
                self.up.handle_go_neutral(instrument, ctx.as_ref(), self.tracker.as_mut());
                self.down.handle_go_neutral(instrument, ctx.as_ref(), self.tracker.as_mut());
                true
            }
            SessionEvent::RhClose => {
                info!(
                    "{} swing delta {}, sum {}, {}",
                    self.config.instrument,
                    self.swings.net(),
                    self.range.sum(),
                    format_stamp(self.quote.map(|q| q.timestamp))
                );
                true
            }
            SessionEvent::SoftwareReset => match self.software_reset.as_mut() {
                Some(handler) => handler(),
                None => {
                    debug!("{} no software reset handler installed", self.config.instrument);
                    false
                }
            },
        }
    }

    fn compute_pip(&mut self) {
        let (Some(tracker), Some(quote)) = (self.tracker.as_ref(), self.quote.as_ref()) else {
            debug!("{} pip skipped, tracker or quote missing", self.config.instrument);
            return;
        };

        let mid = quote.midpoint();
        let interval = tracker.price_interval(mid);
        let pip = PipValue::compute(self.config.base_currency, self.config.quantity, mid, interval);
        info!(
            "pip,{},midprice={},interval={},first={},second={},quan={}",
            self.config.instrument, pip.midprice, pip.interval, pip.first, pip.second, pip.quantity
        );
        self.pip = Some(pip);
    }

    pub fn report(&self) -> SessionReport {
        SessionReport {
            instrument: self.config.instrument.clone(),
            pulses: self.pulses,
            evaluations: self.evaluations,
            quote_bars: self.quote_bars.emitted(),
            trade_bars: self.trade_bars.emitted(),
            rejected_samples: self.quote_bars.rejected() + self.trade_bars.rejected(),
            ignored_trades: self.ignored_trades,
            swing_highs: self.swings.highs(),
            swing_lows: self.swings.lows(),
            net_swings: self.swings.net(),
            conflicting_swings: self.swings.conflicting(),
            swing_sum: self.range.sum(),
            range_rising: self.range.rising().ema,
            range_falling: self.range.falling().ema,
            atr_fast: self.atr_fast.latest(),
            atr_slow: self.atr_slow.latest(),
            pip: self.pip,
            up: FollowerReport::from_follower(&self.up),
            down: FollowerReport::from_follower(&self.down),
        }
    }
}

/// `date T time` of the latest quote, `-` before any quote
fn format_stamp(at: Option<DateTime<Utc>>) -> String {
    match at {
        Some(at) => at.format("%Y-%m-%dT%H:%M:%S%.3f").to_string(),
        None => "-".to_string(),
    }
}
