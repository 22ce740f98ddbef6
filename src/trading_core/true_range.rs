//! True range of successive bars

use super::bars::Bar;

/// Tracks the previous close and computes each bar's true range
#[derive(Debug, Clone, Default)]
pub struct TrueRange {
    prev_close: Option<f64>,
    latest: f64,
}

impl TrueRange {
    pub fn new() -> Self {
        Self::default()
    }

    /// True range of `bar` against the previous bar's close.
    /// The first bar is measured against its own close.
    pub fn update(&mut self, bar: &Bar) -> f64 {
        let prev_close = self.prev_close.unwrap_or(bar.close);
        let tr = (bar.high - bar.low)
            .max((bar.high - prev_close).abs())
            .max((bar.low - prev_close).abs());
        self.prev_close = Some(bar.close);
        self.latest = tr;
        tr
    }

    /// Most recent true range, 0.0 before the first bar
    pub fn latest(&self) -> f64 {
        self.latest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn bar(open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar { timestamp: Utc::now(), open, high, low, close, volume: 1 }
    }

    #[test]
    fn test_gap_from_previous_close() {
        let mut tr = TrueRange::new();
        tr.update(&bar(20.0, 20.0, 20.0, 20.0));
        assert_eq!(tr.update(&bar(1.0, 10.0, 2.0, 5.0)), 18.0);
        assert_eq!(tr.latest(), 18.0);
    }

    #[test]
    fn test_first_bar_uses_own_range() {
        let mut tr = TrueRange::new();
        assert_eq!(tr.latest(), 0.0);
        assert_eq!(tr.update(&bar(3.0, 7.0, 2.0, 4.0)), 5.0);
    }
}
