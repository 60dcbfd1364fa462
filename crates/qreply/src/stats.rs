// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Round-trip latency statistics.

use serde::Serialize;
use std::time::Duration;

/// Running count, minimum, maximum and mean of round-trip latency.
///
/// Values are kept in milliseconds. A minimum of zero means "unset", so the
/// first observation always sets it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RoundTripStats {
    count: u64,
    min_ms: f64,
    max_ms: f64,
    mean_ms: f64,
}

impl RoundTripStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one observation in.
    pub fn record(&mut self, latency: Duration) {
        self.record_ms(latency.as_secs_f64() * 1000.0);
    }

    pub fn record_ms(&mut self, ms: f64) {
        let n = self.count as f64;
        self.mean_ms = (self.mean_ms * n + ms) / (n + 1.0);
        self.count += 1;

        if self.min_ms == 0.0 || ms < self.min_ms {
            self.min_ms = ms;
        }
        if ms > self.max_ms {
            self.max_ms = ms;
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn min_ms(&self) -> f64 {
        self.min_ms
    }

    pub fn max_ms(&self) -> f64 {
        self.max_ms
    }

    pub fn mean_ms(&self) -> f64 {
        self.mean_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_min_max() {
        let mut stats = RoundTripStats::new();
        for ms in [10, 30, 20] {
            stats.record(Duration::from_millis(ms));
        }
        assert_eq!(stats.count(), 3);
        assert!((stats.mean_ms() - 20.0).abs() < 1e-9);
        assert!((stats.min_ms() - 10.0).abs() < 1e-9);
        assert!((stats.max_ms() - 30.0).abs() < 1e-9);
    }

    #[test]
    fn reset_zeroes_everything() {
        let mut stats = RoundTripStats::new();
        stats.record_ms(5.0);
        stats.reset();
        assert_eq!(stats, RoundTripStats::default());

        // count was reset too: the next sample is the whole mean
        stats.record_ms(8.0);
        assert_eq!(stats.mean_ms(), 8.0);
        assert_eq!(stats.min_ms(), 8.0);
    }

    #[test]
    fn zero_min_is_treated_as_unset() {
        let mut stats = RoundTripStats::new();
        stats.record_ms(0.0);
        stats.record_ms(4.0);
        // a 0 ms sample leaves min unset, so 4 ms becomes the minimum
        assert_eq!(stats.min_ms(), 4.0);
    }
}
