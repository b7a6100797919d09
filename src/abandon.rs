//! The abandon tracker (§4.11): message-id to cancellation handle, so an
//! AbandonRequest can stop a long-running operation without a response.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

struct PendingOp {
    cancel: CancellationToken,
}

/// Maps in-flight message-ids to their cancellation handle for one
/// connection. A search registers itself on start and unregisters on
/// completion; Abandon looks the id up and fires the token, then the
/// handler on the other end notices and stops emitting entries without
/// a SearchResultDone (RFC 4511 §4.11).
#[derive(Default)]
pub struct AbandonTracker {
    ops: Mutex<HashMap<i32, PendingOp>>,
}

/// A registration handle returned to the operation that registered itself.
/// Holding this and dropping it unregisters the entry even if the operation
/// panics or returns early.
pub struct OpGuard<'a> {
    tracker: &'a AbandonTracker,
    message_id: i32,
    pub cancel: CancellationToken,
}

impl OpGuard<'_> {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for OpGuard<'_> {
    fn drop(&mut self) {
        let tracker = self.tracker;
        let id = self.message_id;
        // Best-effort synchronous cleanup: try_lock covers the overwhelmingly
        // common case (no other task holds the lock at drop time); if it's
        // contended the entry is merely orphaned until the next abandon miss,
        // which is harmless (Abandon on an unknown id is already a no-op).
        if let Ok(mut ops) = tracker.ops.try_lock() {
            ops.remove(&id);
        }
    }
}

impl AbandonTracker {
    pub fn new() -> AbandonTracker {
        AbandonTracker::default()
    }

    /// Register a new long-running operation under `message_id`. The
    /// returned guard's `cancel` token fires when [`AbandonTracker::abandon`]
    /// is called for this id; dropping the guard unregisters it.
    pub async fn register(&self, message_id: i32) -> OpGuard<'_> {
        let cancel = CancellationToken::new();
        self.ops.lock().await.insert(
            message_id,
            PendingOp {
                cancel: cancel.clone(),
            },
        );
        OpGuard {
            tracker: self,
            message_id,
            cancel,
        }
    }

    /// Cancel the operation registered under `message_id`, if any. Silently
    /// a no-op for unknown ids (already completed, or never existed) per
    /// §4.3's "no response" contract for AbandonRequest.
    pub async fn abandon(&self, message_id: i32) {
        if let Some(op) = self.ops.lock().await.get(&message_id) {
            op.cancel.cancel();
        }
    }

    /// Cancel every registered operation (connection close).
    pub async fn cancel_all(&self) {
        for op in self.ops.lock().await.values() {
            op.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn abandon_cancels_registered_token() {
        let tracker = AbandonTracker::new();
        let guard = tracker.register(7).await;
        assert!(!guard.is_cancelled());
        tracker.abandon(7).await;
        assert!(guard.is_cancelled());
    }

    #[tokio::test]
    async fn abandon_unknown_id_is_a_no_op() {
        let tracker = AbandonTracker::new();
        tracker.abandon(999).await;
    }

    #[tokio::test]
    async fn drop_unregisters_the_op() {
        let tracker = AbandonTracker::new();
        {
            let _guard = tracker.register(3).await;
            assert_eq!(tracker.ops.lock().await.len(), 1);
        }
        assert_eq!(tracker.ops.lock().await.len(), 0);
    }

    #[tokio::test]
    async fn cancel_all_fires_every_token() {
        let tracker = AbandonTracker::new();
        let a = tracker.register(1).await;
        let b = tracker.register(2).await;
        tracker.cancel_all().await;
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
    }
}
