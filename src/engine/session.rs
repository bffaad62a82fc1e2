//! Session state and registry.
//!
//! A session is the server-side state of one live connection. Sessions
//! are shared through `Arc`: the registry holds one reference and the
//! scheduler takes strong snapshots per tick, so a destroy racing with an
//! inference cannot free the session out from under it.

use crate::audio::AudioRing;
use crate::engine::pool::{ContextPool, PooledContext};
use crate::engine::speech::SpeechTracker;
use crate::error::{Result, ScribedError};
use crate::stt::Transcriber;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Process-wide source of session ids, unique for the process lifetime.
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

fn next_session_id() -> String {
    format!("session-{}", NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
}

/// State of one live client connection.
pub struct Session {
    pub id: String,
    /// Recent audio pushed by the connection.
    pub audio: AudioRing,
    /// Scheduler-owned speech state; only the scheduler thread mutates it.
    pub speech: Mutex<SpeechTracker>,
    /// The pool slot borrowed for this session's lifetime.
    context: PooledContext,
    /// One-slot busy flag: at most one inference per session at a time.
    inference_in_progress: AtomicBool,
    /// Cleared when destroy begins; no new inference starts afterwards.
    active: AtomicBool,
    /// Outgoing JSON frames awaiting egress, drained by the I/O side.
    outbound: Mutex<VecDeque<String>>,
    /// Coalesces courier wakeups: at most one pending flush at a time.
    flush_scheduled: AtomicBool,
}

impl Session {
    fn new(id: String, audio: AudioRing, context: PooledContext) -> Self {
        Self {
            id,
            audio,
            speech: Mutex::new(SpeechTracker::new()),
            context,
            inference_in_progress: AtomicBool::new(false),
            active: AtomicBool::new(true),
            outbound: Mutex::new(VecDeque::new()),
            flush_scheduled: AtomicBool::new(false),
        }
    }

    /// The transcriber context borrowed from the pool.
    pub fn transcriber(&self) -> &Arc<dyn Transcriber> {
        &self.context.transcriber
    }

    /// The pool slot id this session holds.
    pub fn slot_id(&self) -> usize {
        self.context.slot_id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    /// Try to claim the per-session inference slot.
    ///
    /// Returns true when this caller won it and must call
    /// `end_inference` when done.
    pub fn begin_inference(&self) -> bool {
        self.inference_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn end_inference(&self) {
        self.inference_in_progress.store(false, Ordering::SeqCst);
    }

    pub fn inference_in_progress(&self) -> bool {
        self.inference_in_progress.load(Ordering::SeqCst)
    }

    /// Append a JSON frame to the outbound queue.
    pub fn enqueue_message(&self, message: String) {
        self.outbound.lock().unwrap().push_back(message);
    }

    /// Take all pending outbound frames, in enqueue order.
    pub fn drain_messages(&self) -> VecDeque<String> {
        let mut outbound = self.outbound.lock().unwrap();
        std::mem::take(&mut *outbound)
    }

    pub fn outbound_len(&self) -> usize {
        self.outbound.lock().unwrap().len()
    }

    /// Set the flush-scheduled flag; returns true when this caller set
    /// it (a flush must be deferred), false when one is already pending.
    pub fn try_schedule_flush(&self) -> bool {
        !self.flush_scheduled.swap(true, Ordering::SeqCst)
    }

    /// Clear the flush flag. Called by the I/O side before draining so a
    /// message enqueued mid-flush schedules a fresh wakeup.
    pub fn clear_flush_flag(&self) {
        self.flush_scheduled.store(false, Ordering::SeqCst);
    }

    pub fn flush_scheduled(&self) -> bool {
        self.flush_scheduled.load(Ordering::SeqCst)
    }
}

/// Owner of all live sessions, keyed by id.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
    pool: Arc<ContextPool>,
    max_retain_seconds: u32,
    sample_rate: u32,
}

impl SessionRegistry {
    pub fn new(pool: Arc<ContextPool>, max_retain_seconds: u32, sample_rate: u32) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            pool,
            max_retain_seconds,
            sample_rate,
        }
    }

    /// Create a session, borrowing a context from the pool.
    ///
    /// Fails with `PoolExhausted` when every context is busy; admission
    /// is deterministic, there is no wait queue.
    pub fn create(&self) -> Result<Arc<Session>> {
        let context = self.pool.acquire().ok_or(ScribedError::PoolExhausted)?;
        let id = next_session_id();

        let session = Arc::new(Session::new(
            id.clone(),
            AudioRing::new(self.max_retain_seconds, self.sample_rate),
            context,
        ));

        self.sessions.lock().unwrap().insert(id.clone(), session.clone());
        tracing::info!(session = %id, slot = session.slot_id(), "created session");
        Ok(session)
    }

    pub fn lookup(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.lock().unwrap().get(id).cloned()
    }

    /// Strong handles to every active session, for one scheduler tick.
    pub fn snapshot_active(&self) -> Vec<Arc<Session>> {
        self.sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.is_active())
            .cloned()
            .collect()
    }

    pub fn count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    /// Tear down a session.
    ///
    /// Marks it inactive, unregisters it, then blocks until any in-flight
    /// inference has returned before the context slot goes back to the
    /// pool. Pending outbound messages are discarded.
    pub fn destroy(&self, id: &str) {
        let session = {
            let mut sessions = self.sessions.lock().unwrap();
            sessions.remove(id)
        };

        let Some(session) = session else {
            return;
        };

        session.deactivate();

        // In-flight inference cannot be interrupted; wait it out.
        while session.inference_in_progress() {
            std::thread::sleep(Duration::from_millis(10));
        }

        let discarded = session.drain_messages().len();
        if discarded > 0 {
            tracing::debug!(session = %id, discarded, "discarded undelivered messages");
        }

        self.pool.release(session.slot_id());
        tracing::info!(session = %id, "destroyed session");
    }

    /// Destroy every remaining session (shutdown path).
    pub fn destroy_all(&self) {
        let ids: Vec<String> = self.sessions.lock().unwrap().keys().cloned().collect();
        for id in ids {
            self.destroy(&id);
        }
    }
}
