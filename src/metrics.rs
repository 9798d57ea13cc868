//! Lock-free usage counters and their periodic log emission.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::info;

// ============================================================================
// UsageMetrics
// ============================================================================

/// Process-wide gateway counters.
#[derive(Debug)]
pub struct UsageMetrics {
    /// Total HTTP requests that passed the rate limiter.
    pub requests: AtomicU64,
    /// Messages acknowledged by WhatsApp.
    pub messages_sent: AtomicU64,
    /// Messages that failed validation or delivery.
    pub messages_failed: AtomicU64,
    /// Requests rejected for a missing or wrong API key.
    pub auth_failures: AtomicU64,
    /// Requests rejected by the rate limiter.
    pub rate_limited: AtomicU64,
    started_at: Instant,
}

impl UsageMetrics {
    pub fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_failed: AtomicU64::new(0),
            auth_failures: AtomicU64::new(0),
            rate_limited: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.messages_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_auth_failure(&self) {
        self.auth_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    /// Time since the counters were created.
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Emit current counters as a structured log line.
    pub fn emit_usage(&self, reason: &str) {
        info!(
            event = "usage_summary",
            reason = reason,
            uptime_secs = self.uptime().as_secs(),
            requests = self.requests.load(Ordering::Relaxed),
            messages_sent = self.messages_sent.load(Ordering::Relaxed),
            messages_failed = self.messages_failed.load(Ordering::Relaxed),
            auth_failures = self.auth_failures.load(Ordering::Relaxed),
            rate_limited = self.rate_limited.load(Ordering::Relaxed),
            "Usage metrics"
        );
    }
}

impl Default for UsageMetrics {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Periodic usage flush
// ============================================================================

/// Start a background task that emits usage metrics every `interval_secs`.
///
/// An interval of 0 disables the periodic lines. A final `shutdown` summary is
/// emitted when `shutdown_rx` signals `true` either way.
pub fn start_periodic_usage_flush(
    metrics: Arc<UsageMetrics>,
    interval_secs: u64,
    mut shutdown_rx: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if interval_secs == 0 {
            while shutdown_rx.changed().await.is_ok() {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
            metrics.emit_usage("shutdown");
            return;
        }

        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.tick().await; // skip first immediate tick

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    metrics.emit_usage("periodic");
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        metrics.emit_usage("shutdown");
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_metrics_creation() {
        let metrics = UsageMetrics::new();
        assert_eq!(metrics.requests.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.messages_sent.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.rate_limited.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_usage_metrics_recording() {
        let metrics = UsageMetrics::new();
        metrics.record_request();
        metrics.record_request();
        metrics.record_sent();
        metrics.record_failed();
        metrics.record_failed();
        metrics.record_auth_failure();
        metrics.record_rate_limited();

        assert_eq!(metrics.requests.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.messages_sent.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.messages_failed.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.auth_failures.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.rate_limited.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_flush_task_stops_on_shutdown() {
        let metrics = Arc::new(UsageMetrics::new());
        let (tx, rx) = watch::channel(false);
        let handle = start_periodic_usage_flush(metrics, 60, rx);
        tx.send(true).unwrap();
        let joined = tokio::time::timeout(Duration::from_secs(5), handle).await;
        assert!(joined.is_ok());
    }

    #[tokio::test]
    async fn test_disabled_flush_still_stops_on_shutdown() {
        let metrics = Arc::new(UsageMetrics::new());
        let (tx, rx) = watch::channel(false);
        let handle = start_periodic_usage_flush(metrics, 0, rx);
        drop(tx);
        let joined = tokio::time::timeout(Duration::from_secs(5), handle).await;
        assert!(joined.is_ok());
    }
}
