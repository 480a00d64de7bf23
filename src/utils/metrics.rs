//! Observability and Metrics
//!
//! Counters for datagram traffic and data-channel authentication outcomes.
//!
//! Uses atomic counters for thread-safe metrics collection.

use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Metrics collector for probe traffic
#[derive(Debug)]
pub struct Metrics {
    /// Datagrams handed to the socket
    pub datagrams_sent: AtomicU64,
    /// Datagrams read from the socket
    pub datagrams_received: AtomicU64,
    /// Payload bytes sent
    pub bytes_sent: AtomicU64,
    /// Payload bytes received
    pub bytes_received: AtomicU64,
    /// Datagrams dropped because they did not decode
    pub malformed_datagrams: AtomicU64,
    /// Packets rejected by the encoder for exceeding the LONG budget
    pub encoding_overflows: AtomicU64,
    /// Data packets received
    pub data_packets: AtomicU64,
    /// Data packets whose signature verified
    pub signatures_accepted: AtomicU64,
    /// Data packets whose signature did not match
    pub signatures_rejected: AtomicU64,
    /// Data packets whose key or signature could not be parsed
    pub crypto_format_errors: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            datagrams_sent: AtomicU64::new(0),
            datagrams_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            malformed_datagrams: AtomicU64::new(0),
            encoding_overflows: AtomicU64::new(0),
            data_packets: AtomicU64::new(0),
            signatures_accepted: AtomicU64::new(0),
            signatures_rejected: AtomicU64::new(0),
            crypto_format_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn datagram_sent(&self, byte_count: u64) {
        self.datagrams_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn datagram_received(&self, byte_count: u64) {
        self.datagrams_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn malformed_datagram(&self) {
        self.malformed_datagrams.fetch_add(1, Ordering::Relaxed);
    }

    pub fn encoding_overflow(&self) {
        self.encoding_overflows.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of authenticating one data packet
    pub fn data_packet(&self, outcome: &crate::error::Result<bool>) {
        self.data_packets.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            Ok(true) => &self.signatures_accepted,
            Ok(false) => &self.signatures_rejected,
            Err(_) => &self.crypto_format_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            datagrams_sent: self.datagrams_sent.load(Ordering::Relaxed),
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            malformed_datagrams: self.malformed_datagrams.load(Ordering::Relaxed),
            encoding_overflows: self.encoding_overflows.load(Ordering::Relaxed),
            data_packets: self.data_packets.load(Ordering::Relaxed),
            signatures_accepted: self.signatures_accepted.load(Ordering::Relaxed),
            signatures_rejected: self.signatures_rejected.load(Ordering::Relaxed),
            crypto_format_errors: self.crypto_format_errors.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            datagrams_sent = snapshot.datagrams_sent,
            datagrams_received = snapshot.datagrams_received,
            bytes_sent = snapshot.bytes_sent,
            bytes_received = snapshot.bytes_received,
            malformed_datagrams = snapshot.malformed_datagrams,
            encoding_overflows = snapshot.encoding_overflows,
            data_packets = snapshot.data_packets,
            signatures_accepted = snapshot.signatures_accepted,
            signatures_rejected = snapshot.signatures_rejected,
            crypto_format_errors = snapshot.crypto_format_errors,
            uptime_seconds = snapshot.uptime_seconds,
            "Probe metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub datagrams_sent: u64,
    pub datagrams_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub malformed_datagrams: u64,
    pub encoding_overflows: u64,
    pub data_packets: u64,
    pub signatures_accepted: u64,
    pub signatures_rejected: u64,
    pub crypto_format_errors: u64,
    pub uptime_seconds: u64,
}

/// Process-wide collector shared by transports that are not given their own
static METRICS: Lazy<Arc<Metrics>> = Lazy::new(|| Arc::new(Metrics::new()));

/// Get the global metrics instance
pub fn global_metrics() -> Arc<Metrics> {
    Arc::clone(&METRICS)
}

/// Initialize metrics collection (call once at startup)
pub fn init_metrics() {
    let _ = global_metrics();
    debug!("Metrics collection initialized");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolError;

    #[test]
    fn test_traffic_counters() {
        let metrics = Metrics::new();
        metrics.datagram_sent(32);
        metrics.datagram_sent(4448);
        metrics.datagram_received(32);
        metrics.malformed_datagram();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.datagrams_sent, 2);
        assert_eq!(snapshot.bytes_sent, 4480);
        assert_eq!(snapshot.datagrams_received, 1);
        assert_eq!(snapshot.malformed_datagrams, 1);
    }

    #[test]
    fn test_data_outcomes() {
        let metrics = Metrics::new();
        metrics.data_packet(&Ok(true));
        metrics.data_packet(&Ok(false));
        metrics.data_packet(&Err(ProtocolError::CryptoFormat("bad key".into())));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.data_packets, 3);
        assert_eq!(snapshot.signatures_accepted, 1);
        assert_eq!(snapshot.signatures_rejected, 1);
        assert_eq!(snapshot.crypto_format_errors, 1);
    }

    #[test]
    fn test_global_is_shared() {
        init_metrics();
        let a = global_metrics();
        let b = global_metrics();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
