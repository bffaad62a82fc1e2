//! Courier between the scheduler thread and the connection I/O layer.
//!
//! The scheduler never touches a socket. When it enqueues a message it
//! calls `OutboundCourier::notify`, which coalesces wakeups through the
//! session's flush flag and defers the actual send to the I/O side via
//! the `IoBridge`. The I/O side clears the flag, drains the queue, and
//! writes. The socket is only ever written from its own task, and at
//! most one flush is scheduled per session between drains.

use crate::engine::session::{Session, SessionRegistry};
use std::collections::VecDeque;
use std::sync::Arc;

/// Bridge into the connection layer's event loop.
///
/// `defer_flush` schedules a flush of the session's outbound queue on
/// the I/O side. Implementations must be cheap and non-blocking: the
/// scheduler calls this between inference steps.
pub trait IoBridge: Send + Sync {
    fn defer_flush(&self, session_id: &str);
}

/// Moves outbound messages toward the I/O layer.
pub struct OutboundCourier {
    registry: Arc<SessionRegistry>,
    bridge: Arc<dyn IoBridge>,
}

impl OutboundCourier {
    pub fn new(registry: Arc<SessionRegistry>, bridge: Arc<dyn IoBridge>) -> Self {
        Self { registry, bridge }
    }

    /// Wake the I/O side for a session with pending messages.
    ///
    /// Dropped silently when the session is gone or inactive. When a
    /// flush is already scheduled, this is a no-op; the pending flush
    /// will pick the new message up.
    pub fn notify(&self, session_id: &str) {
        let Some(session) = self.registry.lookup(session_id) else {
            return;
        };
        if !session.is_active() {
            return;
        }
        if !session.try_schedule_flush() {
            return;
        }
        self.bridge.defer_flush(session_id);
    }
}

/// Drain a session's queue on the I/O side.
///
/// Clears the flush flag first, so a message enqueued while the drain is
/// in progress triggers a fresh wakeup instead of being lost.
pub fn take_for_flush(session: &Session) -> VecDeque<String> {
    session.clear_flush_flag();
    session.drain_messages()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::pool::ContextPool;
    use crate::stt::{MockTranscriber, Transcriber};
    use std::sync::Mutex;

    struct RecordingBridge {
        deferred: Mutex<Vec<String>>,
    }

    impl RecordingBridge {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                deferred: Mutex::new(Vec::new()),
            })
        }

        fn deferred(&self) -> Vec<String> {
            self.deferred.lock().unwrap().clone()
        }
    }

    impl IoBridge for RecordingBridge {
        fn defer_flush(&self, session_id: &str) {
            self.deferred.lock().unwrap().push(session_id.to_string());
        }
    }

    fn registry() -> Arc<SessionRegistry> {
        let contexts: Vec<Arc<dyn Transcriber>> =
            vec![Arc::new(MockTranscriber::new("mock")) as Arc<dyn Transcriber>];
        Arc::new(SessionRegistry::new(
            Arc::new(ContextPool::new(contexts)),
            30,
            16000,
        ))
    }

    #[test]
    fn test_notify_defers_once_per_flush() {
        let registry = registry();
        let bridge = RecordingBridge::new();
        let courier = OutboundCourier::new(registry.clone(), bridge.clone());

        let session = registry.create().unwrap();
        session.enqueue_message("a".to_string());
        courier.notify(&session.id);
        session.enqueue_message("b".to_string());
        courier.notify(&session.id);
        courier.notify(&session.id);

        // Coalesced: one deferred task for any number of notifies
        assert_eq!(bridge.deferred(), vec![session.id.clone()]);
    }

    #[test]
    fn test_notify_after_flush_schedules_again() {
        let registry = registry();
        let bridge = RecordingBridge::new();
        let courier = OutboundCourier::new(registry.clone(), bridge.clone());

        let session = registry.create().unwrap();
        session.enqueue_message("a".to_string());
        courier.notify(&session.id);

        let drained = take_for_flush(&session);
        assert_eq!(drained.len(), 1);

        session.enqueue_message("b".to_string());
        courier.notify(&session.id);

        assert_eq!(bridge.deferred().len(), 2);
    }

    #[test]
    fn test_notify_unknown_session_is_dropped() {
        let registry = registry();
        let bridge = RecordingBridge::new();
        let courier = OutboundCourier::new(registry, bridge.clone());

        courier.notify("session-unknown");
        assert!(bridge.deferred().is_empty());
    }

    #[test]
    fn test_notify_destroyed_session_is_dropped() {
        let registry = registry();
        let bridge = RecordingBridge::new();
        let courier = OutboundCourier::new(registry.clone(), bridge.clone());

        let session = registry.create().unwrap();
        let id = session.id.clone();
        drop(session);
        registry.destroy(&id);

        courier.notify(&id);
        assert!(bridge.deferred().is_empty());
    }

    #[test]
    fn test_take_for_flush_clears_flag_before_drain() {
        let registry = registry();
        let bridge = RecordingBridge::new();
        let courier = OutboundCourier::new(registry.clone(), bridge.clone());

        let session = registry.create().unwrap();
        session.enqueue_message("a".to_string());
        courier.notify(&session.id);

        let drained = take_for_flush(&session);
        assert_eq!(drained, VecDeque::from(vec!["a".to_string()]));

        // A message landing right after the drain can schedule again
        assert!(!session.flush_scheduled());
    }
}
