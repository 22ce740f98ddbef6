//! Five-bar swing point detection
//!
//! Each completed minute bar is pushed into a five-slot window. The middle
//! slot is a swing high when its high is strictly above the two bars on
//! either side, and a swing low when its low is strictly below them.
//!
//! A swing high implies the market is expected to turn down, so it is
//! classified as `Swing::Down`; a swing low is `Swing::Up`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::bars::Bar;

/// Number of bars in the window
pub const SWING_SLOTS: usize = 5;

/// Index of the candidate bar
pub const CANDIDATE: usize = 2;

/// Swing classification for the current evaluation cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Swing {
    /// Local low detected, expect a move up
    Up,
    #[default]
    None,
    /// Local high detected, expect a move down
    Down,
}

impl std::fmt::Display for Swing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Swing::Up => write!(f, "UP"),
            Swing::None => write!(f, "NONE"),
            Swing::Down => write!(f, "DOWN"),
        }
    }
}

/// Per-bar summary held in the window
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SwingSlot {
    pub timestamp: Option<DateTime<Utc>>,
    pub high: f64,
    pub low: f64,
    /// Trend EMA value when the bar completed
    pub ema: f64,
}

impl SwingSlot {
    pub fn from_bar(bar: &Bar, ema: f64) -> Self {
        Self {
            timestamp: Some(bar.timestamp),
            high: bar.high,
            low: bar.low,
            ema,
        }
    }
}

/// Detected swing point, kept for history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwingTrack {
    pub kind: Swing,
    /// Close of the bar that confirmed the swing
    pub detected_at: DateTime<Utc>,
    pub extremum_at: Option<DateTime<Utc>>,
    pub extremum_price: f64,
    /// Newest bar in the window at detection
    pub far_edge_at: Option<DateTime<Utc>>,
    pub far_edge_price: f64,
}

/// Rolling window of the five most recent minute bars
#[derive(Debug, Clone, Default)]
pub struct SwingWindow {
    slots: [SwingSlot; SWING_SLOTS],
    filled: usize,
    tracks: Vec<SwingTrack>,
    highs: u32,
    lows: u32,
    net: i32,
    conflicting: u32,
}

impl SwingWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shift in a new minute bar and classify the middle slot.
    ///
    /// Returns `Swing::None` until five real bars are held.
    pub fn push(&mut self, bar: &Bar, ema: f64) -> Swing {
        self.slots.rotate_left(1);
        self.slots[SWING_SLOTS - 1] = SwingSlot::from_bar(bar, ema);
        if self.filled < SWING_SLOTS {
            self.filled += 1;
        }

        if !self.is_warm() {
            return Swing::None;
        }

        let [a, b, c, d, e] = self.slots;

        let swing_high = c.high > a.high.max(b.high).max(d.high.max(e.high));
        let swing_low = c.low < a.low.min(b.low).min(d.low.min(e.low));

        if swing_high {
            self.tracks.push(SwingTrack {
                kind: Swing::Down,
                detected_at: bar.timestamp,
                extremum_at: c.timestamp,
                extremum_price: c.high,
                far_edge_at: e.timestamp,
                far_edge_price: e.high,
            });
            self.highs += 1;
            self.net += 1;
            debug!("Swing high {:.5} at {:?}", c.high, c.timestamp);
        }

        if swing_low {
            self.tracks.push(SwingTrack {
                kind: Swing::Up,
                detected_at: bar.timestamp,
                extremum_at: c.timestamp,
                extremum_price: c.low,
                far_edge_at: e.timestamp,
                far_edge_price: e.low,
            });
            self.lows += 1;
            self.net -= 1;
            debug!("Swing low {:.5} at {:?}", c.low, c.timestamp);
        }

        match (swing_high, swing_low) {
            (true, false) => Swing::Down,
            (false, true) => Swing::Up,
            (false, false) => Swing::None,
            (true, true) => {
                self.conflicting += 1;
                warn!(
                    "Bar at {:?} is both swing high {:.5} and swing low {:.5}, ignoring",
                    c.timestamp, c.high, c.low
                );
                Swing::None
            }
        }
    }

    /// True once five real bars have been pushed
    pub fn is_warm(&self) -> bool {
        self.filled == SWING_SLOTS
    }

    /// Slots ordered oldest to newest
    pub fn slots(&self) -> &[SwingSlot; SWING_SLOTS] {
        &self.slots
    }

    pub fn candidate(&self) -> &SwingSlot {
        &self.slots[CANDIDATE]
    }

    pub fn tracks(&self) -> &[SwingTrack] {
        &self.tracks
    }

    pub fn highs(&self) -> u32 {
        self.highs
    }

    pub fn lows(&self) -> u32 {
        self.lows
    }

    /// Swing highs minus swing lows
    pub fn net(&self) -> i32 {
        self.net
    }

    pub fn conflicting(&self) -> u32 {
        self.conflicting
    }
}
