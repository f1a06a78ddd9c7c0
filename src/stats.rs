/// Feed session statistics
///
/// Counters are shared between the consuming task and whoever holds the
/// session, so they are atomics. Dispatch latency keeps a bounded window.

use crate::processor::PayloadKind;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

const WINDOW_SIZE: usize = 10000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyStats {
    pub min_us: u64,
    pub max_us: u64,
    pub mean_us: f64,
    pub p50_us: u64,
    pub p99_us: u64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub received: u64,
    pub bytes: u64,
    pub dispatched: u64,
    pub empty_bodies: u64,
    pub decode_failures: u64,
    pub invalid_headers: u64,
    pub invalid_envelopes: u64,
    pub unroutable: u64,
    pub handler_failures: u64,
}

impl StatsSnapshot {
    /// Deliveries that were rejected instead of acknowledged
    pub fn rejected(&self) -> u64 {
        self.invalid_headers + self.invalid_envelopes + self.unroutable + self.handler_failures
    }
}

#[derive(Debug, Default)]
pub struct FeedStats {
    start_time: OnceLock<Instant>,
    received: AtomicU64,
    bytes: AtomicU64,
    dispatched: AtomicU64,
    empty_bodies: AtomicU64,
    decode_failures: AtomicU64,
    invalid_headers: AtomicU64,
    invalid_envelopes: AtomicU64,
    unroutable: AtomicU64,
    handler_failures: AtomicU64,
    dispatch_latencies: Mutex<VecDeque<u64>>,
}

impl FeedStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self, size: usize) {
        self.start_time.get_or_init(Instant::now);
        self.received.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(size as u64, Ordering::Relaxed);
    }

    pub fn record_dispatched(&self, kind: PayloadKind) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        match kind {
            PayloadKind::Entity => {}
            PayloadKind::Empty => {
                self.empty_bodies.fetch_add(1, Ordering::Relaxed);
            }
            PayloadKind::Undecodable => {
                self.decode_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn record_invalid_headers(&self) {
        self.invalid_headers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalid_envelope(&self) {
        self.invalid_envelopes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unroutable(&self) {
        self.unroutable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_handler_failure(&self) {
        self.handler_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record time from delivery to handler return, in microseconds
    pub fn record_dispatch_latency(&self, micros: u64) {
        if let Ok(mut window) = self.dispatch_latencies.lock() {
            if window.len() >= WINDOW_SIZE {
                window.pop_front();
            }
            window.push_back(micros);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            empty_bodies: self.empty_bodies.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            invalid_headers: self.invalid_headers.load(Ordering::Relaxed),
            invalid_envelopes: self.invalid_envelopes.load(Ordering::Relaxed),
            unroutable: self.unroutable.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
        }
    }

    pub fn elapsed(&self) -> Option<Duration> {
        self.start_time.get().map(|st| st.elapsed())
    }

    pub fn messages_per_sec(&self) -> f64 {
        match self.elapsed() {
            Some(elapsed) if elapsed.as_secs_f64() > 0.0 => {
                self.received.load(Ordering::Relaxed) as f64 / elapsed.as_secs_f64()
            }
            _ => 0.0,
        }
    }

    pub fn dispatch_latency_stats(&self) -> Option<LatencyStats> {
        let mut sorted: Vec<u64> = match self.dispatch_latencies.lock() {
            Ok(window) => window.iter().copied().collect(),
            Err(_) => return None,
        };
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_unstable();

        let len = sorted.len();
        Some(LatencyStats {
            min_us: sorted[0],
            max_us: sorted[len - 1],
            mean_us: sorted.iter().sum::<u64>() as f64 / len as f64,
            p50_us: sorted[len / 2],
            p99_us: sorted[(len * 99) / 100],
        })
    }

    pub fn log_summary(&self) {
        let s = self.snapshot();
        tracing::info!(
            received = s.received,
            bytes = s.bytes,
            dispatched = s.dispatched,
            empty = s.empty_bodies,
            decode_failures = s.decode_failures,
            unroutable = s.unroutable,
            rejected = s.rejected(),
            messages_per_sec = self.messages_per_sec(),
            "feed statistics"
        );
        if let Some(latency) = self.dispatch_latency_stats() {
            tracing::info!(
                min_us = latency.min_us,
                max_us = latency.max_us,
                mean_us = latency.mean_us,
                p50_us = latency.p50_us,
                p99_us = latency.p99_us,
                "dispatch latency"
            );
        }
    }
}
