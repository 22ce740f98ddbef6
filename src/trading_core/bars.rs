//! Fixed-width OHLCV bar aggregation

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Completed OHLCV bar. `timestamp` is the close of the bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Bar {
    pub fn range(&self) -> f64 {
        self.high - self.low
    }
}

/// Bar under construction for the active bucket
#[derive(Debug, Clone)]
struct BarBuilder {
    bucket: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: u64,
}

impl BarBuilder {
    fn new(bucket: i64, price: f64, volume: u64) -> Self {
        Self {
            bucket,
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
        }
    }

    fn add_sample(&mut self, price: f64, volume: u64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.volume += volume;
    }

    fn to_bar(&self, width_ms: i64) -> Bar {
        let close_ms = (self.bucket + 1) * width_ms;
        Bar {
            timestamp: DateTime::<Utc>::from_timestamp_millis(close_ms).unwrap_or_default(),
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        }
    }
}

/// Buckets a timestamped price stream into fixed-width bars.
///
/// A bar is handed back exactly once, by the `add` call whose sample opens
/// the next bucket. The partially built bar is never exposed.
#[derive(Debug, Clone)]
pub struct BarAggregator {
    width_ms: i64,
    current: Option<BarBuilder>,
    emitted: u64,
    rejected: u64,
}

impl BarAggregator {
    /// Create an aggregator with the given bucket width in seconds
    pub fn new(width_seconds: u32) -> Self {
        Self {
            width_ms: i64::from(width_seconds.max(1)) * 1000,
            current: None,
            emitted: 0,
            rejected: 0,
        }
    }

    pub fn width(&self) -> Duration {
        Duration::milliseconds(self.width_ms)
    }

    fn bucket_of(&self, timestamp: DateTime<Utc>) -> i64 {
        timestamp.timestamp_millis().div_euclid(self.width_ms)
    }

    /// Add a sample; returns the completed bar when the sample starts a new bucket.
    ///
    /// Samples earlier than the active bucket are rejected and counted; the
    /// active bucket is left untouched.
    pub fn add(&mut self, timestamp: DateTime<Utc>, price: f64, volume: u64) -> CoreResult<Option<Bar>> {
        let bucket = self.bucket_of(timestamp);

        match &mut self.current {
            Some(builder) if bucket == builder.bucket => {
                builder.add_sample(price, volume);
                Ok(None)
            }
            Some(builder) if bucket < builder.bucket => {
                self.rejected += 1;
                let bucket_start = DateTime::<Utc>::from_timestamp_millis(builder.bucket * self.width_ms)
                    .unwrap_or_default();
                Err(CoreError::OutOfOrder { timestamp, bucket_start })
            }
            Some(builder) => {
                let completed = builder.to_bar(self.width_ms);
                *builder = BarBuilder::new(bucket, price, volume);
                self.emitted += 1;
                Ok(Some(completed))
            }
            None => {
                self.current = Some(BarBuilder::new(bucket, price, volume));
                Ok(None)
            }
        }
    }

    /// Number of bars emitted so far
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Number of out-of-order samples rejected
    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}
