//! Replay a recorded quote/trade feed through the strategy
//!
//! Feed format (CSV, optionally zstd-compressed with a `.zst` extension):
//!
//! ```text
//! timestamp,kind,bid,ask,volume
//! 2024-01-10T14:00:00Z,quote,1.08530,1.08532,
//! 2024-01-10T14:00:00Z,trade,,,1
//! ```
//!
//! A blocking reader task parses the file and hands events over a bounded
//! channel to a single consumer that owns the strategy.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::{ReplayConfig, StrategyConfig};
use crate::execution::{SimulatedTracker, SimulationReport};
use crate::trading_core::market::{Quote, Trade};
use crate::trading_core::series::SeriesRecorder;
use crate::trading_core::strategy::{SessionReport, Strategy};
use crate::trading_core::swing::SwingTrack;

/// One inbound market data event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MarketEvent {
    Quote(Quote),
    Trade(Trade),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum FeedKind {
    Quote,
    Trade,
}

/// CSV row of the feed file
#[derive(Debug, Deserialize)]
struct FeedRow {
    timestamp: DateTime<Utc>,
    kind: FeedKind,
    bid: Option<f64>,
    ask: Option<f64>,
    volume: Option<u64>,
}

impl FeedRow {
    fn into_event(self) -> Result<MarketEvent> {
        match self.kind {
            FeedKind::Quote => {
                let (Some(bid), Some(ask)) = (self.bid, self.ask) else {
                    bail!("quote at {} is missing bid or ask", self.timestamp);
                };
                Ok(MarketEvent::Quote(Quote::new(self.timestamp, bid, ask)))
            }
            FeedKind::Trade => Ok(MarketEvent::Trade(Trade::new(self.timestamp, self.volume.unwrap_or(1)))),
        }
    }
}

/// Open a feed file, decompressing `.zst`
pub fn open_feed(path: &Path) -> Result<Box<dyn Read + Send>> {
    let file = File::open(path).with_context(|| format!("Failed to open feed: {:?}", path))?;

    if path.extension().map_or(false, |ext| ext == "zst") {
        let decoder = zstd::stream::Decoder::new(file)
            .with_context(|| format!("Failed to create zstd decoder for: {:?}", path))?;
        Ok(Box::new(decoder))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Parse feed rows and hand each event to `on_event` until it returns false.
/// Returns the number of events delivered.
pub fn read_feed<R: Read>(reader: R, mut on_event: impl FnMut(MarketEvent) -> bool) -> Result<u64> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut delivered = 0u64;

    for (line, result) in csv_reader.deserialize::<FeedRow>().enumerate() {
        let row = result.with_context(|| format!("Failed to parse feed row {}", line + 1))?;
        let event = row.into_event().with_context(|| format!("Invalid feed row {}", line + 1))?;
        if !on_event(event) {
            debug!("Feed consumer stopped after {} events", delivered);
            break;
        }
        delivered += 1;
    }

    Ok(delivered)
}

/// Everything a replay produced
#[derive(Debug, Serialize)]
pub struct ReplayOutcome {
    pub events: u64,
    /// Events the strategy rejected (out of order)
    pub rejected: u64,
    pub interrupted: bool,
    pub report: SessionReport,
    pub simulation: SimulationReport,
    pub swing_tracks: Vec<SwingTrack>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series: Option<SeriesRecorder>,
}

/// Drive a strategy with a simulated tracker over `feed`
pub async fn run_replay(
    feed: PathBuf,
    config: StrategyConfig,
    replay: ReplayConfig,
    record_series: bool,
) -> Result<ReplayOutcome> {
    let mut strategy: Strategy<SimulatedTracker> =
        Strategy::new(config.clone()).context("Invalid strategy configuration")?;
    strategy.bind_tracker(SimulatedTracker::new(replay.clone(), config.quantity));
    if record_series {
        strategy.bind_series(Box::new(SeriesRecorder::new()));
    }

    info!("Replaying {:?} for {}", feed, config.instrument);

    let (tx, mut rx) = mpsc::channel::<MarketEvent>(replay.channel_capacity.max(1));
    let reader = tokio::task::spawn_blocking(move || -> Result<u64> {
        let source = open_feed(&feed)?;
        read_feed(source, |event| tx.blocking_send(event).is_ok())
    });

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut events = 0u64;
    let mut rejected = 0u64;
    let mut interrupted = false;

    loop {
        tokio::select! {
            next = rx.recv() => {
                let Some(event) = next else { break };
                events += 1;
                let result = match event {
                    MarketEvent::Quote(quote) => strategy.handle_quote(quote).map(|_| ()),
                    MarketEvent::Trade(trade) => strategy.handle_trade(trade),
                };
                if let Err(e) = result {
                    rejected += 1;
                    warn!("Event {} rejected: {}", events, e);
                }
            }
            _ = &mut ctrl_c => {
                warn!("Interrupted, stopping replay after {} events", events);
                interrupted = true;
                break;
            }
        }
    }

    drop(rx);
    let read = reader.await.context("Feed reader task failed")??;
    debug!("Feed reader delivered {} events", read);

    let series = strategy
        .unbind_series()
        .and_then(|sink| sink.recorded().cloned());
    let simulation = strategy
        .tracker()
        .map(|t| t.report())
        .context("Simulated tracker was unbound during replay")?;

    Ok(ReplayOutcome {
        events,
        rejected,
        interrupted,
        report: strategy.report(),
        simulation,
        swing_tracks: strategy.swing_tracks().to_vec(),
        series,
    })
}

pub fn write_report(outcome: &ReplayOutcome, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(outcome).context("Failed to serialize replay report")?;
    std::fs::write(path, json).with_context(|| format!("Failed to write report: {:?}", path))?;
    info!("Report written to {:?}", path);
    Ok(())
}

pub fn print_summary(outcome: &ReplayOutcome) {
    let report = &outcome.report;
    let sim = &outcome.simulation;

    println!("\n═══════════════════════════════════════════════════════════");
    println!("              REPLAY RESULTS: {}", report.instrument);
    println!("═══════════════════════════════════════════════════════════\n");

    println!("Events:            {}", outcome.events);
    println!("Rejected:          {}", outcome.rejected);
    println!("Pulses:            {} ({} evaluated)", report.pulses, report.evaluations);
    println!("Minute Bars:       {}", report.trade_bars);
    println!();
    println!("Swing Highs:       {}", report.swing_highs);
    println!("Swing Lows:        {}", report.swing_lows);
    println!("Swing Delta:       {}", report.net_swings);
    println!("Swing Sum:         {:+.5}", report.swing_sum);
    println!("ATR Fast / Slow:   {:.5} / {:.5}", report.atr_fast, report.atr_slow);
    if let Some(pip) = &report.pip {
        println!("Pip Value:         {:.4}", pip.pip);
    }
    println!();

    println!("─── Long ({}) ───", report.up.state);
    println!("Trades:            {} ({} W / {} L)", sim.long.trade_count, sim.long.wins, sim.long.losses);
    println!("Realized:          {:+.5} ({:+.2})", sim.long.realized_points, sim.long.realized_value);
    println!();
    println!("─── Short ({}) ───", report.down.state);
    println!("Trades:            {} ({} W / {} L)", sim.short.trade_count, sim.short.wins, sim.short.losses);
    println!("Realized:          {:+.5} ({:+.2})", sim.short.realized_points, sim.short.realized_value);
    println!();
    println!("Total:             {:+.5}", sim.total_points);

    if outcome.interrupted {
        println!("\n(interrupted before end of feed)");
    }
    println!("\n═══════════════════════════════════════════════════════════\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading_core::orders::Direction;
    use crate::trading_core::trend_follower::TradeState;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn push_second(csv: &mut String, ts: DateTime<Utc>, bid: f64, ask: f64) {
        csv.push_str(&format!("{},quote,{},{},\n", ts.to_rfc3339(), bid, ask));
        csv.push_str(&format!("{},trade,,,1\n", ts.to_rfc3339()));
    }

    /// Five minutes whose middle minute is a swing low, then a few seconds
    /// at a price the long entry can fill at
    fn synthetic_feed() -> String {
        let base = Utc.with_ymd_and_hms(2024, 1, 10, 14, 0, 0).unwrap();
        let minutes = [(1.0830, 1.0850), (1.0820, 1.0840), (1.0800, 1.0815), (1.0815, 1.0830), (1.0825, 1.0845)];

        let mut csv = String::from("timestamp,kind,bid,ask,volume\n");
        for (m, (low, high)) in minutes.iter().enumerate() {
            for s in 0..60 {
                let ts = base + Duration::minutes(m as i64) + Duration::seconds(s);
                let mid = match s {
                    30 => *high,
                    31 => *low,
                    _ => (low + high) / 2.0,
                };
                push_second(&mut csv, ts, mid - 0.00005, mid + 0.00005);
            }
        }
        for s in 0..5 {
            let ts = base + Duration::minutes(5) + Duration::seconds(s);
            push_second(&mut csv, ts, 1.08045, 1.08055);
        }
        csv
    }

    fn temp_path(ext: &str) -> PathBuf {
        std::env::temp_dir().join(format!("currency-trader-{}.{}", Uuid::new_v4(), ext))
    }

    #[test]
    fn test_read_feed_rows() {
        let csv = "timestamp,kind,bid,ask,volume\n\
                   2024-01-10T14:00:00Z,quote,1.1,1.2,\n\
                   2024-01-10T14:00:01Z,trade,,,7\n";
        let mut events = Vec::new();
        let n = read_feed(csv.as_bytes(), |e| {
            events.push(e);
            true
        })
        .unwrap();

        assert_eq!(n, 2);
        match events[0] {
            MarketEvent::Quote(q) => assert_eq!((q.bid, q.ask), (1.1, 1.2)),
            other => panic!("unexpected {:?}", other),
        }
        match events[1] {
            MarketEvent::Trade(t) => assert_eq!(t.volume, 7),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_quote_without_ask_is_an_error() {
        let csv = "timestamp,kind,bid,ask,volume\n2024-01-10T14:00:00Z,quote,1.1,,\n";
        assert!(read_feed(csv.as_bytes(), |_| true).is_err());
    }

    #[test]
    fn test_unknown_kind_is_an_error() {
        let csv = "timestamp,kind,bid,ask,volume\n2024-01-10T14:00:00Z,depth,1.1,1.2,\n";
        assert!(read_feed(csv.as_bytes(), |_| true).is_err());
    }

    #[test]
    fn test_consumer_can_stop_early() {
        let csv = synthetic_feed();
        let n = read_feed(csv.as_bytes(), |_| false).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn test_zstd_feed() {
        let path = temp_path("csv.zst");
        let compressed = zstd::encode_all(synthetic_feed().as_bytes(), 3).unwrap();
        std::fs::write(&path, compressed).unwrap();

        let n = read_feed(open_feed(&path).unwrap(), |_| true).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(n, 2 * (5 * 60 + 5));
    }

    #[tokio::test]
    async fn test_replay_enters_long_on_swing_low() {
        let path = temp_path("csv");
        std::fs::write(&path, synthetic_feed()).unwrap();

        let config = StrategyConfig { price_ema_period: 3, ..Default::default() };
        let outcome = run_replay(path.clone(), config, ReplayConfig::default(), true).await;
        std::fs::remove_file(&path).ok();
        let outcome = outcome.unwrap();

        assert_eq!(outcome.events, 2 * (5 * 60 + 5));
        assert_eq!(outcome.rejected, 0);
        assert_eq!(outcome.report.trade_bars, 5);
        assert_eq!(outcome.report.swing_lows, 1);
        assert_eq!(outcome.swing_tracks.len(), 1);

        assert_eq!(outcome.simulation.orders_filled, 1);
        assert_eq!(outcome.report.up.state, TradeState::ExitSignal);
        assert_eq!(outcome.report.up.direction, Direction::Up);
        assert_eq!(outcome.report.down.state, TradeState::Search);
        assert!(outcome.series.is_some());

        let out = temp_path("json");
        write_report(&outcome, &out).unwrap();
        let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        std::fs::remove_file(&out).ok();
        assert_eq!(json["report"]["swing_lows"], 1);
    }
}
