//! Bounded mailbox for uncorrelated inbound messages.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::{ChannelError, Result};
use crate::message::Message;

struct MailboxState {
    queue: VecDeque<Message>,
    /// Reported once the queue is empty.
    closed: Option<ChannelError>,
}

/// FIFO of inbound messages that are not replies.
///
/// After [`close`](Mailbox::close) queued messages stay receivable; the close
/// reason is reported once they are drained.
pub(crate) struct Mailbox {
    state: Mutex<MailboxState>,
    notify: Notify,
    capacity: usize,
}

impl Mailbox {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(MailboxState {
                queue: VecDeque::new(),
                closed: None,
            }),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Queue a message. Returns `false` if it was dropped (full or closed).
    pub fn push(&self, message: Message) -> bool {
        {
            let mut state = self.state.lock();
            if state.closed.is_some() || state.queue.len() >= self.capacity {
                return false;
            }
            state.queue.push_back(message);
        }
        self.notify.notify_waiters();
        true
    }

    /// Wait for the next message. Cancel safe.
    pub async fn recv(&self) -> Result<Message> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if let Some(message) = state.queue.pop_front() {
                    return Ok(message);
                }
                if let Some(reason) = &state.closed {
                    return Err(reason.clone());
                }
            }

            notified.await;
        }
    }

    /// Stop accepting messages. The first reason wins.
    pub fn close(&self, reason: ChannelError) {
        {
            let mut state = self.state.lock();
            if state.closed.is_none() {
                state.closed = Some(reason);
            }
        }
        self.notify.notify_waiters();
    }

    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }
}
