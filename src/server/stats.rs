use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Process-wide counters, shared by the listener and every session.
#[derive(Debug)]
pub struct ServerStats {
    start_time: Instant,
    connections_accepted: AtomicU64,
    connections_refused: AtomicU64,
    active_sessions: AtomicU64,
    frames_decoded: AtomicU64,
    responses_written: AtomicU64,
    handler_failures: AtomicU64,
    protocol_errors: AtomicU64,
    transport_errors: AtomicU64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub uptime_seconds: u64,
    pub connections_accepted: u64,
    pub connections_refused: u64,
    pub active_sessions: u64,
    pub frames_decoded: u64,
    pub responses_written: u64,
    pub handler_failures: u64,
    pub protocol_errors: u64,
    pub transport_errors: u64,
}

impl ServerStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            connections_accepted: AtomicU64::new(0),
            connections_refused: AtomicU64::new(0),
            active_sessions: AtomicU64::new(0),
            frames_decoded: AtomicU64::new(0),
            responses_written: AtomicU64::new(0),
            handler_failures: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            transport_errors: AtomicU64::new(0),
        }
    }

    pub fn session_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_closed(&self) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn connection_refused(&self) {
        self.connections_refused.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames_decoded(&self, count: usize) {
        self.frames_decoded.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn response_written(&self) {
        self.responses_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handler_failure(&self) {
        self.handler_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transport_error(&self) {
        self.transport_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connections_refused: self.connections_refused.load(Ordering::Relaxed),
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            responses_written: self.responses_written.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
        }
    }
}

impl Default for ServerStats {
    fn default() -> Self {
        Self::new()
    }
}
