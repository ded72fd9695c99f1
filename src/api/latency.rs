//! In-memory histogram of sync cycle durations.
//! The Scheduler records, the API reads. Values stored in milliseconds.

use std::sync::Mutex;
use std::time::Duration;

pub struct LatencyStats {
    inner: Option<Mutex<hdrhistogram::Histogram<u64>>>,
}

impl LatencyStats {
    /// Tracks 1ms to 1h, 3 significant figures.
    pub fn new() -> Self {
        let inner = hdrhistogram::Histogram::new_with_bounds(1, 3_600_000, 3)
            .ok()
            .map(Mutex::new);
        Self { inner }
    }

    pub fn record_ms(&self, ms: u64) {
        if let Some(Ok(mut h)) = self.inner.as_ref().map(|m| m.lock()) {
            let _ = h.saturating_record(ms.max(1));
        }
    }

    pub fn record(&self, d: Duration) {
        let ms = d.as_millis().min(u128::from(u64::MAX)) as u64;
        self.record_ms(ms);
    }

    /// Return (p50_ms, p95_ms, p99_ms). None if no samples.
    pub fn percentiles(&self) -> (Option<u64>, Option<u64>, Option<u64>) {
        let Some(Ok(h)) = self.inner.as_ref().map(|m| m.lock()) else {
            return (None, None, None);
        };
        if h.len() == 0 {
            return (None, None, None);
        }
        (
            Some(h.value_at_quantile(0.5)),
            Some(h.value_at_quantile(0.95)),
            Some(h.value_at_quantile(0.99)),
        )
    }

    pub fn len(&self) -> u64 {
        match self.inner.as_ref().map(|m| m.lock()) {
            Some(Ok(h)) => h.len(),
            _ => 0,
        }
    }
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_histogram_has_no_percentiles() {
        assert_eq!(LatencyStats::new().percentiles(), (None, None, None));
    }

    #[test]
    fn records_cycle_durations() {
        let stats = LatencyStats::new();
        for ms in [100, 200, 300, 400, 5_000] {
            stats.record(Duration::from_millis(ms));
        }
        let (p50, _, p99) = stats.percentiles();
        assert_eq!(stats.len(), 5);
        assert!(p50.unwrap() >= 299 && p50.unwrap() <= 301);
        assert!(p99.unwrap() >= 4_990);
    }
}
