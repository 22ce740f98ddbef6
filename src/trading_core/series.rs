//! Indicator series output
//!
//! The strategy publishes indicator values to an optional `SeriesSink`.
//! Values flow one way; nothing here feeds back into decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::bars::Bar;

/// Named output series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Series {
    Ask,
    Bid,
    /// Trade prints priced at the quote midpoint
    Trade,
    TradeBars,
    Volume,
    PriceEma,
    AtrFast,
    AtrSlow,
    RangeRising,
    RangeFalling,
    /// Label on swing lows
    SwingUp,
    /// Label on swing highs
    SwingDown,
    PlUp,
    PlDown,
    PlTotal,
}

/// Charting / persistence collaborator
pub trait SeriesSink {
    fn append(&mut self, series: Series, timestamp: DateTime<Utc>, value: f64);

    fn append_bar(&mut self, series: Series, bar: &Bar) {
        self.append(series, bar.timestamp, bar.close);
    }

    fn add_label(&mut self, series: Series, timestamp: DateTime<Utc>, value: f64, _label: &str) {
        self.append(series, timestamp, value);
    }

    /// In-memory recording, if this sink keeps one
    fn recorded(&self) -> Option<&SeriesRecorder> {
        None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub series: Series,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Sink that keeps every point in memory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeriesRecorder {
    points: Vec<SeriesPoint>,
    bars: Vec<Bar>,
}

impl SeriesRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn points(&self) -> &[SeriesPoint] {
        &self.points
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    /// Values of one series in arrival order
    pub fn values(&self, series: Series) -> Vec<f64> {
        self.points
            .iter()
            .filter(|p| p.series == series)
            .map(|p| p.value)
            .collect()
    }

    pub fn clear(&mut self) {
        self.points.clear();
        self.bars.clear();
    }
}

impl SeriesSink for SeriesRecorder {
    fn append(&mut self, series: Series, timestamp: DateTime<Utc>, value: f64) {
        self.points.push(SeriesPoint { series, timestamp, value, label: None });
    }

    fn append_bar(&mut self, series: Series, bar: &Bar) {
        self.bars.push(*bar);
        self.append(series, bar.timestamp, bar.close);
    }

    fn add_label(&mut self, series: Series, timestamp: DateTime<Utc>, value: f64, label: &str) {
        self.points.push(SeriesPoint {
            series,
            timestamp,
            value,
            label: Some(label.to_string()),
        });
    }

    fn recorded(&self) -> Option<&SeriesRecorder> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder_filters_by_series() {
        let mut rec = SeriesRecorder::new();
        let now = Utc::now();
        rec.append(Series::Ask, now, 1.2);
        rec.append(Series::Bid, now, 1.1);
        rec.append(Series::Ask, now, 1.3);
        rec.add_label(Series::SwingDown, now, 1.4, "Swing Dn");

        assert_eq!(rec.values(Series::Ask), vec![1.2, 1.3]);
        assert_eq!(rec.points()[3].label.as_deref(), Some("Swing Dn"));
        assert!(rec.recorded().is_some());

        rec.clear();
        assert!(rec.points().is_empty());
    }
}
