//! Correlation table: outstanding request ids mapped to reply slots.
//!
//! ```text
//!   send(request) ──► register(id) ──► ReplySlot (Pending)
//!                                           │
//!   reader task ──► complete(relates_to) ───┤ Ready(Ok(reply))
//!   close/fault ──► cancel_all(reason) ─────┤ Ready(Err(reason))
//!                                           │
//!   receive() ──► slot.wait() ──────────────┘ Taken
//! ```
//!
//! A slot is fulfilled at most once and its result is taken by exactly one
//! waiter. The table holds only unresolved entries: completing or cancelling
//! an entry removes it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::{ChannelError, Result};
use crate::message::{Message, MessageId};

enum SlotState {
    Pending,
    Ready(Result<Message>),
    Taken,
}

/// Pending reply for one outstanding request.
pub struct ReplySlot {
    id: MessageId,
    state: Mutex<SlotState>,
    notify: Notify,
}

impl ReplySlot {
    fn new(id: MessageId) -> Self {
        Self {
            id,
            state: Mutex::new(SlotState::Pending),
            notify: Notify::new(),
        }
    }

    /// Id of the request this slot answers.
    #[inline]
    pub fn id(&self) -> &MessageId {
        &self.id
    }

    /// Store the outcome. Returns `false` if the slot was already resolved.
    fn fulfill(&self, result: Result<Message>) -> bool {
        {
            let mut state = self.state.lock();
            if !matches!(*state, SlotState::Pending) {
                return false;
            }
            *state = SlotState::Ready(result);
        }
        self.notify.notify_waiters();
        true
    }

    /// True while no outcome has arrived.
    pub fn is_pending(&self) -> bool {
        matches!(*self.state.lock(), SlotState::Pending)
    }

    /// True once some waiter took the outcome.
    pub fn is_taken(&self) -> bool {
        matches!(*self.state.lock(), SlotState::Taken)
    }

    /// Take the outcome if it is ready.
    pub fn try_take(&self) -> Option<Result<Message>> {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, SlotState::Taken) {
            SlotState::Ready(result) => Some(result),
            other => {
                *state = other;
                None
            }
        }
    }

    /// Wait for the outcome and take it.
    ///
    /// Returns `None` if another waiter took it first. Cancel safe: dropping
    /// the future never loses the outcome.
    pub async fn wait(&self) -> Option<Result<Message>> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                match std::mem::replace(&mut *state, SlotState::Taken) {
                    SlotState::Pending => *state = SlotState::Pending,
                    SlotState::Ready(result) => return Some(result),
                    SlotState::Taken => return None,
                }
            }

            notified.await;
        }
    }
}

impl std::fmt::Debug for ReplySlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match *self.state.lock() {
            SlotState::Pending => "Pending",
            SlotState::Ready(_) => "Ready",
            SlotState::Taken => "Taken",
        };
        f.debug_struct("ReplySlot")
            .field("id", &self.id)
            .field("state", &state)
            .finish()
    }
}

/// Map of outstanding request ids to reply slots.
#[derive(Default)]
pub struct CorrelationTable {
    entries: Mutex<HashMap<MessageId, Arc<ReplySlot>>>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new outstanding request.
    ///
    /// # Errors
    ///
    /// [`ChannelError::DuplicateCorrelation`] if `id` is already outstanding.
    pub fn register(&self, id: MessageId) -> Result<Arc<ReplySlot>> {
        let mut entries = self.entries.lock();
        if entries.contains_key(&id) {
            return Err(ChannelError::DuplicateCorrelation(id));
        }
        let slot = Arc::new(ReplySlot::new(id.clone()));
        entries.insert(id, slot.clone());
        tracing::trace!(id = %slot.id(), outstanding = entries.len(), "registered reply slot");
        Ok(slot)
    }

    /// Deliver a reply. Returns `false` (and drops the reply) if nothing is
    /// waiting for `relates_to`.
    pub fn complete(&self, relates_to: &MessageId, reply: Message) -> bool {
        let slot = self.entries.lock().remove(relates_to);
        match slot {
            Some(slot) => slot.fulfill(Ok(reply)),
            None => {
                tracing::debug!(relates_to = %relates_to, "dropping uncorrelated reply");
                false
            }
        }
    }

    /// Fail one outstanding entry and remove it.
    pub fn cancel(&self, id: &MessageId, reason: ChannelError) -> bool {
        let slot = self.entries.lock().remove(id);
        slot.map(|slot| slot.fulfill(Err(reason))).unwrap_or(false)
    }

    /// Remove an entry without resolving it.
    pub fn remove(&self, id: &MessageId) -> Option<Arc<ReplySlot>> {
        self.entries.lock().remove(id)
    }

    /// Fail every outstanding entry with `reason` and empty the table.
    ///
    /// Returns the number of entries failed.
    pub fn cancel_all(&self, reason: ChannelError) -> usize {
        let drained: Vec<_> = self.entries.lock().drain().map(|(_, slot)| slot).collect();
        let count = drained
            .into_iter()
            .filter(|slot| slot.fulfill(Err(reason.clone())))
            .count();
        if count > 0 {
            tracing::debug!(count, reason = %reason, "cancelled outstanding replies");
        }
        count
    }

    /// Slot for an outstanding id.
    pub fn get(&self, id: &MessageId) -> Option<Arc<ReplySlot>> {
        self.entries.lock().get(id).cloned()
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.entries.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Outstanding ids, sorted (for diagnostics).
    pub fn pending_ids(&self) -> Vec<MessageId> {
        let mut ids: Vec<_> = self.entries.lock().keys().cloned().collect();
        ids.sort();
        ids
    }
}
