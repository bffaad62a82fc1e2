//! Fixed-size pool of heavy inference contexts.
//!
//! Contexts cost hundreds of megabytes each and take seconds to load, so
//! they are created once at startup and borrowed by sessions for their
//! whole lifetime. There is no wait queue: when every slot is busy,
//! session creation fails and the client is refused immediately.

use crate::stt::Transcriber;
use std::sync::{Arc, Mutex};

struct Slot {
    transcriber: Arc<dyn Transcriber>,
    in_use: bool,
}

/// A borrowed pool slot: the context plus the slot id to release it with.
#[derive(Clone)]
pub struct PooledContext {
    pub slot_id: usize,
    pub transcriber: Arc<dyn Transcriber>,
}

/// Pool of transcriber contexts with first-fit acquisition.
pub struct ContextPool {
    slots: Mutex<Vec<Slot>>,
}

impl ContextPool {
    /// Build a pool owning the given contexts.
    pub fn new(contexts: Vec<Arc<dyn Transcriber>>) -> Self {
        let slots = contexts
            .into_iter()
            .map(|transcriber| Slot {
                transcriber,
                in_use: false,
            })
            .collect();
        Self {
            slots: Mutex::new(slots),
        }
    }

    /// Number of slots in the pool.
    pub fn capacity(&self) -> usize {
        self.slots.lock().unwrap().len()
    }

    /// Number of slots currently free.
    pub fn idle_count(&self) -> usize {
        self.slots.lock().unwrap().iter().filter(|s| !s.in_use).count()
    }

    /// Borrow the first free slot, or `None` when all are busy.
    pub fn acquire(&self) -> Option<PooledContext> {
        let mut slots = self.slots.lock().unwrap();
        for (slot_id, slot) in slots.iter_mut().enumerate() {
            if !slot.in_use {
                slot.in_use = true;
                tracing::debug!(slot_id, "acquired context slot");
                return Some(PooledContext {
                    slot_id,
                    transcriber: slot.transcriber.clone(),
                });
            }
        }
        None
    }

    /// Return a slot to the pool.
    ///
    /// Releasing a slot that is already free is a programming error.
    pub fn release(&self, slot_id: usize) {
        let mut slots = self.slots.lock().unwrap();
        match slots.get_mut(slot_id) {
            Some(slot) if slot.in_use => {
                slot.in_use = false;
                tracing::debug!(slot_id, "released context slot");
            }
            Some(_) => {
                tracing::error!(slot_id, "released a context slot that was not in use");
                debug_assert!(false, "double release of context slot {}", slot_id);
            }
            None => {
                tracing::error!(slot_id, "released an unknown context slot");
                debug_assert!(false, "release of unknown context slot {}", slot_id);
            }
        }
    }

    /// Drop all contexts at shutdown. No slot may be in use.
    pub fn close_all(&self) {
        let mut slots = self.slots.lock().unwrap();
        let busy = slots.iter().filter(|s| s.in_use).count();
        if busy > 0 {
            tracing::error!(busy, "closing context pool with slots still in use");
            debug_assert_eq!(busy, 0, "context pool closed while {} slots in use", busy);
        }
        slots.clear();
    }
}
