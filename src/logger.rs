//! Structured per-connection logging (spec §6).
//!
//! Wraps the `log` facade (already a teacher dependency) with the
//! per-connection request-id and `key=value` fields spec §6 calls for.
//! Never logs payload bytes, only shapes and outcomes.

use std::time::Instant;

/// A logger bound to one connection, carrying its request-id for the
/// lifetime of the connection.
#[derive(Clone)]
pub struct ConnLogger {
    conn_id: u64,
    peer: String,
}

impl ConnLogger {
    pub fn new(conn_id: u64, peer: impl Into<String>) -> ConnLogger {
        ConnLogger {
            conn_id,
            peer: peer.into(),
        }
    }

    pub fn info(&self, msg: &str) {
        log::info!(target: "ldapd::conn", "conn_id={} peer={} {}", self.conn_id, self.peer, msg);
    }

    pub fn warn(&self, msg: &str) {
        log::warn!(target: "ldapd::conn", "conn_id={} peer={} {}", self.conn_id, self.peer, msg);
    }

    pub fn debug(&self, msg: &str) {
        log::debug!(target: "ldapd::conn", "conn_id={} peer={} {}", self.conn_id, self.peer, msg);
    }

    pub fn error(&self, msg: &str) {
        log::error!(target: "ldapd::conn", "conn_id={} peer={} {}", self.conn_id, self.peer, msg);
    }

    /// Log one completed operation with its duration in milliseconds, per
    /// spec §6's "durations in milliseconds for every operation".
    pub fn operation(&self, op: &str, message_id: i32, started: Instant, result: &str) {
        log::info!(
            target: "ldapd::op",
            "conn_id={} peer={} op={} message_id={} result={} duration_ms={}",
            self.conn_id,
            self.peer,
            op,
            message_id,
            result,
            started.elapsed().as_millis(),
        );
    }
}
