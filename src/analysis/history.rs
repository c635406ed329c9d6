//! Bounded rolling window of price/volume samples

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One observation in the window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
    pub volume: Decimal,
}

/// Rolling price history, oldest first
#[derive(Debug, Clone)]
pub struct PriceHistory {
    capacity: usize,
    samples: VecDeque<PriceSample>,
}

impl PriceHistory {
    /// Create an empty window holding at most `capacity` samples
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    /// Add a sample
    ///
    /// A sample with the same timestamp as the newest one replaces it, so
    /// re-observing a tick leaves the window unchanged. Samples older than
    /// the newest are ignored.
    pub fn push(&mut self, sample: PriceSample) {
        if let Some(last) = self.samples.back_mut() {
            if sample.timestamp == last.timestamp {
                *last = sample;
                return;
            }
            if sample.timestamp < last.timestamp {
                tracing::debug!(
                    ts = %sample.timestamp,
                    newest = %last.timestamp,
                    "Ignoring out-of-order sample"
                );
                return;
            }
        }

        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Newest sample
    pub fn latest(&self) -> Option<&PriceSample> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &PriceSample> + ExactSizeIterator {
        self.samples.iter()
    }

    /// Prices, oldest first
    pub fn prices(&self) -> Vec<Decimal> {
        self.samples.iter().map(|s| s.price).collect()
    }

    /// Samples no older than `window` relative to the newest sample
    pub fn within(&self, window: Duration) -> impl Iterator<Item = &PriceSample> {
        let cutoff = self.latest().map(|s| s.timestamp - window);
        self.samples
            .iter()
            .filter(move |s| cutoff.is_some_and(|c| s.timestamp >= c))
    }

    /// Newest sample at least `age` older than the newest one, falling back
    /// to the oldest sample when the window is shorter than `age`
    pub fn sample_before(&self, age: Duration) -> Option<&PriceSample> {
        let latest = self.latest()?;
        if self.samples.len() < 2 {
            return None;
        }
        let cutoff = latest.timestamp - age;
        self.samples
            .iter()
            .rev()
            .skip(1)
            .find(|s| s.timestamp <= cutoff)
            .or_else(|| self.samples.front())
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
