//! Duplex channel: one session-scoped, bidirectional conversation.
//!
//! # Architecture
//!
//! ```text
//!                    ┌──────────────── DuplexChannel ────────────────┐
//! send() ───────────►│ register id ─► CorrelationTable               │
//!                    │      │                ▲                      │
//!                    │      ▼                │ complete(relates_to) │
//!                    │ WriterHandle ──►  Writer Task ──► socket     │
//!                    │                                     │        │
//! receive() ◄────────│ ReplySlot / Mailbox ◄── Reader Task ◄┘        │
//!                    └────────────────────────────────────────────────┘
//! ```
//!
//! Every operation comes in three forms sharing one implementation:
//! `begin_*` returns an [`Operation`], the `async fn` awaits it, and
//! `*_blocking` waits for it on the calling thread.
//!
//! # Example
//!
//! ```ignore
//! let channel = factory.create_channel("net.tcp://localhost:8080/echo")?;
//! channel.open(Duration::from_secs(5)).await?;
//!
//! let request = Message::with_body("urn:echo", &"hello".to_string())?;
//! let id = channel.send(request, Duration::from_secs(5)).await?;
//! let reply = channel.receive(Duration::from_secs(5)).await?;
//! assert_eq!(reply.relates_to(), Some(&id));
//!
//! channel.close(Duration::from_secs(5)).await?;
//! ```

mod inbox;
mod reader;
mod state;

pub use state::CommunicationState;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use self::inbox::Mailbox;
use crate::config::{BindingConfig, ReceiveTimeoutPolicy};
use crate::correlation::{CorrelationTable, ReplySlot};
use crate::error::{ChannelError, Result};
use crate::handshake;
use crate::message::{Message, MessageId};
use crate::operation::Operation;
use crate::transport::{EndpointAddress, Session};
use crate::writer::WriterHandle;

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Tasks and handles of an open session.
struct ChannelIo {
    writer: WriterHandle,
    writer_task: JoinHandle<Result<()>>,
    reader_task: JoinHandle<()>,
}

impl ChannelIo {
    fn abort(self) {
        self.reader_task.abort();
        self.writer_task.abort();
    }
}

/// State shared by all clones of a channel and its in-flight operations.
pub(crate) struct ChannelShared {
    id: u64,
    address: EndpointAddress,
    settings: BindingConfig,
    handle: Handle,
    factory_open: Arc<AtomicBool>,
    state: Mutex<CommunicationState>,
    session_id: Mutex<Option<String>>,
    fault_cause: Mutex<Option<ChannelError>>,
    peer_ended: AtomicBool,
    correlation: CorrelationTable,
    /// Reply slots in send order; the last untaken one is what `receive` waits on.
    awaiting: Mutex<Vec<Arc<ReplySlot>>>,
    inbox: Mailbox,
    io: Mutex<Option<ChannelIo>>,
}

impl ChannelShared {
    fn new(
        address: EndpointAddress,
        settings: BindingConfig,
        handle: Handle,
        factory_open: Arc<AtomicBool>,
        state: CommunicationState,
    ) -> Self {
        let inbox = Mailbox::new(settings.inbound_capacity);
        Self {
            id: NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed),
            address,
            settings,
            handle,
            factory_open,
            state: Mutex::new(state),
            session_id: Mutex::new(None),
            fault_cause: Mutex::new(None),
            peer_ended: AtomicBool::new(false),
            correlation: CorrelationTable::new(),
            awaiting: Mutex::new(Vec::new()),
            inbox,
            io: Mutex::new(None),
        }
    }

    fn state(&self) -> CommunicationState {
        *self.state.lock()
    }

    /// Error for an operation attempted in the wrong state.
    fn state_error(&self, operation: &'static str, state: CommunicationState) -> ChannelError {
        match state {
            CommunicationState::Closing | CommunicationState::Closed => ChannelError::ChannelClosed,
            CommunicationState::Faulted => self.fault_error(),
            _ => ChannelError::invalid(operation, format!("channel is {}", state)),
        }
    }

    fn fault_error(&self) -> ChannelError {
        let cause = self
            .fault_cause
            .lock()
            .clone()
            .unwrap_or_else(|| ChannelError::Protocol("channel faulted".to_string()));
        ChannelError::fault(cause)
    }

    fn writer(&self) -> Option<WriterHandle> {
        self.io.lock().as_ref().map(|io| io.writer.clone())
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    async fn open(self: &Arc<Self>, deadline: Instant) -> Result<()> {
        if !self.factory_open.load(Ordering::Acquire) {
            return Err(ChannelError::invalid("open", "the channel factory is closed"));
        }

        {
            let mut state = self.state.lock();
            if *state != CommunicationState::Created {
                return Err(ChannelError::invalid("open", format!("channel is {}", *state)));
            }
            *state = CommunicationState::Opening;
        }

        tracing::debug!(channel = self.id, address = %self.address, "Opening channel");

        match self.connect(deadline).await {
            Ok((session, session_id)) => self.finish_open(session, session_id),
            Err(cause) => {
                self.fault(cause.clone());
                Err(ChannelError::OpenFailed {
                    address: self.address.to_string(),
                    source: Box::new(cause),
                })
            }
        }
    }

    async fn connect(&self, deadline: Instant) -> Result<(Session, String)> {
        let mut session = Session::connect(
            &self.address,
            deadline,
            self.settings.max_frame_size,
            self.settings.writer_config(),
        )
        .await?;

        match handshake::initiate(&mut session.reader, &session.writer, &self.address, deadline)
            .await
        {
            Ok(session_id) => Ok((session, session_id)),
            Err(e) => {
                session.writer_task.abort();
                Err(e)
            }
        }
    }

    fn finish_open(self: &Arc<Self>, session: Session, session_id: String) -> Result<()> {
        let mut state = self.state.lock();
        if *state != CommunicationState::Opening {
            // Closed or aborted while the handshake ran.
            let current = *state;
            drop(state);
            session.writer_task.abort();
            return Err(self.state_error("open", current));
        }

        let peer = session.peer.clone();
        self.install_session(session, session_id.clone());
        *state = CommunicationState::Opened;
        drop(state);

        tracing::debug!(channel = self.id, session = %session_id, peer = %peer, "Channel opened");
        Ok(())
    }

    fn install_session(self: &Arc<Self>, session: Session, session_id: String) {
        let Session {
            reader,
            writer,
            writer_task,
            ..
        } = session;
        let reader_task = reader::spawn_reader(self, reader);
        *self.session_id.lock() = Some(session_id);
        *self.io.lock() = Some(ChannelIo {
            writer,
            writer_task,
            reader_task,
        });
    }

    async fn close(self: &Arc<Self>, deadline: Instant) -> Result<()> {
        let previous = {
            let mut state = self.state.lock();
            let previous = *state;
            match previous {
                CommunicationState::Opening | CommunicationState::Opened => {
                    *state = CommunicationState::Closing
                }
                CommunicationState::Created => *state = CommunicationState::Closed,
                _ => {}
            }
            previous
        };

        match previous {
            CommunicationState::Closed | CommunicationState::Closing => return Ok(()),
            CommunicationState::Faulted => {
                self.release();
                return Ok(());
            }
            CommunicationState::Created => {
                self.finish_close();
                return Ok(());
            }
            CommunicationState::Opening | CommunicationState::Opened => {}
        }

        tracing::debug!(channel = self.id, pending = self.correlation.len(), "Closing channel");

        let io = self.io.lock().take();
        let result = match io {
            Some(io) => self.shutdown_io(io, deadline).await,
            None => Ok(()),
        };

        self.finish_close();

        let mut state = self.state.lock();
        match *state {
            CommunicationState::Closing => {
                *state = CommunicationState::Closed;
                drop(state);
                tracing::debug!(channel = self.id, "Channel closed");
                result
            }
            CommunicationState::Faulted => {
                drop(state);
                Err(self.fault_error())
            }
            _ => result,
        }
    }

    /// Drain and shut down the write half, then give the peer until the
    /// deadline to end the session.
    ///
    /// Once the write half is down the teardown is complete; a peer that keeps
    /// its side open past the deadline just has its reader aborted.
    async fn shutdown_io(&self, io: ChannelIo, deadline: Instant) -> Result<()> {
        let ChannelIo {
            writer,
            writer_task,
            mut reader_task,
        } = io;

        let flushed = match writer.shutdown(deadline).await {
            Err(e) if !e.is_retryable() => {
                self.fault(e.clone());
                Err(ChannelError::fault(e))
            }
            other => other,
        };

        if flushed.is_ok()
            && tokio::time::timeout_at(deadline, &mut reader_task)
                .await
                .is_err()
        {
            tracing::debug!(channel = self.id, "Peer kept the session open past the close deadline");
        }

        reader_task.abort();
        writer_task.abort();
        flushed
    }

    /// Fail everything still waiting with `ChannelClosed`.
    fn finish_close(&self) {
        self.correlation.cancel_all(ChannelError::ChannelClosed);
        self.inbox.close(ChannelError::ChannelClosed);
    }

    /// Drop session resources of a faulted channel.
    fn release(&self) {
        if let Some(io) = self.io.lock().take() {
            io.abort();
        }
    }

    fn abort(&self) {
        {
            let mut state = self.state.lock();
            if *state != CommunicationState::Faulted {
                *state = CommunicationState::Closed;
            }
        }
        self.release();
        self.finish_close();
        tracing::debug!(channel = self.id, "Channel aborted");
    }

    /// Move to `Faulted` and fail all waiters with the cause.
    ///
    /// No-op once the channel is `Closed` or `Faulted`.
    pub(crate) fn fault(&self, cause: ChannelError) {
        {
            let mut state = self.state.lock();
            if state.is_terminal() {
                return;
            }
            *self.fault_cause.lock() = Some(cause.clone());
            *state = CommunicationState::Faulted;
        }

        tracing::error!(channel = self.id, address = %self.address, "Channel faulted: {}", cause);

        let error = ChannelError::fault(cause);
        self.correlation.cancel_all(error.clone());
        self.inbox.close(error);
        self.release();
    }

    /// The peer closed its side of the session.
    fn on_peer_closed(&self) {
        match self.state() {
            CommunicationState::Opened => {
                self.peer_ended.store(true, Ordering::Release);
                tracing::debug!(channel = self.id, "Session ended by peer");
                self.correlation.cancel_all(ChannelError::SessionEnded);
                self.inbox.close(ChannelError::SessionEnded);
            }
            state => {
                tracing::debug!(channel = self.id, %state, "Peer ended session");
            }
        }
    }

    // ---------------------------------------------------------------------
    // Messaging
    // ---------------------------------------------------------------------

    async fn send(&self, mut message: Message, deadline: Instant) -> Result<MessageId> {
        let state = self.state();
        if state != CommunicationState::Opened {
            return Err(self.state_error("send", state));
        }
        if self.peer_ended.load(Ordering::Acquire) {
            return Err(ChannelError::SessionEnded);
        }
        let writer = self
            .writer()
            .ok_or_else(|| self.state_error("send", self.state()))?;

        let id = message.ensure_id();
        let expects_reply = message.expects_reply();
        let frame = message.into_frame()?;

        let size = frame.header.frame_length();
        if size > self.settings.max_frame_size as u64 {
            return Err(ChannelError::invalid(
                "send",
                format!(
                    "message of {} bytes exceeds max_frame_size {}",
                    size, self.settings.max_frame_size
                ),
            ));
        }

        if expects_reply {
            let slot = self.correlation.register(id.clone())?;
            self.awaiting.lock().push(slot);
        }

        match writer.send(frame, deadline).await {
            Ok(()) => {
                tracing::trace!(channel = self.id, id = %id, expects_reply, "Message sent");
                Ok(id)
            }
            Err(e) => {
                if expects_reply {
                    self.correlation.remove(&id);
                    self.forget_awaiting(&id);
                }
                Err(self.send_failed(e))
            }
        }
    }

    fn send_failed(&self, error: ChannelError) -> ChannelError {
        match error {
            ChannelError::Timeout { .. } => error,
            ChannelError::ChannelClosed => match self.state() {
                CommunicationState::Opened => ChannelError::ChannelClosed,
                state => self.state_error("send", state),
            },
            other => {
                self.fault(other.clone());
                ChannelError::fault(other)
            }
        }
    }

    async fn receive(&self, deadline: Instant) -> Result<Message> {
        let state = self.state();
        if !state.can_receive() {
            return Err(self.state_error("receive", state));
        }
        let timeout = deadline.saturating_duration_since(Instant::now());

        loop {
            let slot = self.latest_awaiting();
            let reply = async {
                match &slot {
                    Some(slot) => slot.wait().await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                biased;
                outcome = reply => {
                    if let Some(slot) = &slot {
                        self.forget_awaiting(slot.id());
                    }
                    match outcome {
                        Some(result) => return result,
                        // Another receive took it; look again.
                        None => continue,
                    }
                }
                message = self.inbox.recv() => return message,
                _ = tokio::time::sleep_until(deadline) => {
                    if let Some(slot) = &slot {
                        self.on_receive_timeout(slot, timeout);
                    }
                    return Err(ChannelError::timeout("receive", timeout));
                }
            }
        }
    }

    async fn receive_reply(&self, id: MessageId, deadline: Instant) -> Result<Message> {
        let state = self.state();
        if !state.can_receive() {
            return Err(self.state_error("receive_reply", state));
        }
        let timeout = deadline.saturating_duration_since(Instant::now());

        let slot = self
            .awaiting
            .lock()
            .iter()
            .find(|slot| slot.id() == &id && !slot.is_taken())
            .cloned()
            .ok_or_else(|| ChannelError::NotAwaitingReply(id.clone()))?;

        match tokio::time::timeout_at(deadline, slot.wait()).await {
            Ok(outcome) => {
                self.forget_awaiting(&id);
                outcome.unwrap_or(Err(ChannelError::NotAwaitingReply(id)))
            }
            Err(_) => {
                self.on_receive_timeout(&slot, timeout);
                Err(ChannelError::timeout("receive", timeout))
            }
        }
    }

    async fn request(&self, message: Message, deadline: Instant) -> Result<Message> {
        if !message.expects_reply() {
            return Err(ChannelError::invalid(
                "request",
                "message does not expect a reply",
            ));
        }
        let id = self.send(message, deadline).await?;
        self.receive_reply(id, deadline).await
    }

    /// Most recently sent request whose reply has not been taken.
    fn latest_awaiting(&self) -> Option<Arc<ReplySlot>> {
        let mut awaiting = self.awaiting.lock();
        awaiting.retain(|slot| !slot.is_taken());
        awaiting.last().cloned()
    }

    fn forget_awaiting(&self, id: &MessageId) {
        self.awaiting.lock().retain(|slot| slot.id() != id);
    }

    fn on_receive_timeout(&self, slot: &ReplySlot, timeout: Duration) {
        if self.settings.receive_timeout_policy != ReceiveTimeoutPolicy::CancelPending {
            return;
        }
        if self
            .correlation
            .cancel(slot.id(), ChannelError::timeout("receive", timeout))
        {
            self.forget_awaiting(slot.id());
            tracing::debug!(channel = self.id, id = %slot.id(), "Cancelled pending reply after receive timeout");
        }
    }
}

impl Drop for ChannelShared {
    fn drop(&mut self) {
        if let Some(io) = self.io.get_mut().take() {
            io.abort();
        }
    }
}

/// A duplex session channel.
///
/// Cheap to clone; all clones drive the same session. Dropping the last clone
/// aborts the session.
#[derive(Clone)]
pub struct DuplexChannel {
    shared: Arc<ChannelShared>,
}

impl DuplexChannel {
    /// A `Created` channel for `address` with its own copy of `settings`.
    pub(crate) fn new(
        address: EndpointAddress,
        settings: BindingConfig,
        handle: Handle,
        factory_open: Arc<AtomicBool>,
    ) -> Self {
        let shared = ChannelShared::new(
            address,
            settings,
            handle,
            factory_open,
            CommunicationState::Created,
        );
        Self {
            shared: Arc::new(shared),
        }
    }

    /// An `Opened` channel over a session accepted by a listener.
    ///
    /// Must be called inside the runtime behind `handle`.
    pub(crate) fn from_accepted(
        address: EndpointAddress,
        settings: BindingConfig,
        handle: Handle,
        session: Session,
        session_id: String,
    ) -> Self {
        let shared = Arc::new(ChannelShared::new(
            address,
            settings,
            handle,
            Arc::new(AtomicBool::new(true)),
            CommunicationState::Opened,
        ));
        shared.install_session(session, session_id);
        Self { shared }
    }

    pub(crate) fn downgrade(&self) -> Weak<ChannelShared> {
        Arc::downgrade(&self.shared)
    }

    fn spawn<T, F>(&self, name: &'static str, work: F) -> Operation<T>
    where
        T: Send + 'static,
        F: std::future::Future<Output = Result<T>> + Send + 'static,
    {
        Operation::spawn(&self.shared.handle, name, work)
    }

    // ---------------------------------------------------------------------
    // Open
    // ---------------------------------------------------------------------

    /// Start opening the channel: connect and run the session handshake.
    ///
    /// `Created → Opening → Opened`. On failure the channel is `Faulted` and the
    /// error is [`ChannelError::OpenFailed`].
    pub fn begin_open(&self, timeout: Duration) -> Operation<()> {
        let shared = self.shared.clone();
        self.spawn("open", async move { shared.open(Instant::now() + timeout).await })
    }

    pub async fn open(&self, timeout: Duration) -> Result<()> {
        self.begin_open(timeout).await
    }

    /// Blocking [`open`](Self::open). Must not be called from a runtime thread.
    pub fn open_blocking(&self, timeout: Duration) -> Result<()> {
        self.begin_open(timeout).wait()
    }

    // ---------------------------------------------------------------------
    // Send
    // ---------------------------------------------------------------------

    /// Start sending `message`; resolves to its id once the frame is written.
    ///
    /// An id is assigned if the message has none. If the message expects a
    /// reply, a correlation entry is registered before the write.
    pub fn begin_send(&self, message: Message, timeout: Duration) -> Operation<MessageId> {
        let shared = self.shared.clone();
        self.spawn("send", async move {
            shared.send(message, Instant::now() + timeout).await
        })
    }

    pub async fn send(&self, message: Message, timeout: Duration) -> Result<MessageId> {
        self.begin_send(message, timeout).await
    }

    pub fn send_blocking(&self, message: Message, timeout: Duration) -> Result<MessageId> {
        self.begin_send(message, timeout).wait()
    }

    // ---------------------------------------------------------------------
    // Receive
    // ---------------------------------------------------------------------

    /// Start receiving the next inbound message.
    ///
    /// Resolves with the reply to the most recently sent request still awaiting
    /// one, or with the next message that isn't a reply, whichever comes
    /// first. A timeout leaves the channel usable.
    pub fn begin_receive(&self, timeout: Duration) -> Operation<Message> {
        let shared = self.shared.clone();
        self.spawn("receive", async move {
            shared.receive(Instant::now() + timeout).await
        })
    }

    pub async fn receive(&self, timeout: Duration) -> Result<Message> {
        self.begin_receive(timeout).await
    }

    pub fn receive_blocking(&self, timeout: Duration) -> Result<Message> {
        self.begin_receive(timeout).wait()
    }

    /// Start waiting for the reply to the request with `id`.
    pub fn begin_receive_reply(&self, id: MessageId, timeout: Duration) -> Operation<Message> {
        let shared = self.shared.clone();
        self.spawn("receive_reply", async move {
            shared.receive_reply(id, Instant::now() + timeout).await
        })
    }

    pub async fn receive_reply(&self, id: MessageId, timeout: Duration) -> Result<Message> {
        self.begin_receive_reply(id, timeout).await
    }

    pub fn receive_reply_blocking(&self, id: MessageId, timeout: Duration) -> Result<Message> {
        self.begin_receive_reply(id, timeout).wait()
    }

    /// Start a send followed by a wait for its reply, under one deadline.
    pub fn begin_request(&self, message: Message, timeout: Duration) -> Operation<Message> {
        let shared = self.shared.clone();
        self.spawn("request", async move {
            shared.request(message, Instant::now() + timeout).await
        })
    }

    pub async fn request(&self, message: Message, timeout: Duration) -> Result<Message> {
        self.begin_request(message, timeout).await
    }

    pub fn request_blocking(&self, message: Message, timeout: Duration) -> Result<Message> {
        self.begin_request(message, timeout).wait()
    }

    // ---------------------------------------------------------------------
    // Close
    // ---------------------------------------------------------------------

    /// Start a graceful close.
    ///
    /// Queued sends are flushed and the write half is shut down. The close
    /// then waits until the deadline for the peer to end the session; a peer
    /// still holding it open has its reader aborted, and the close succeeds.
    /// Every outstanding reply fails with [`ChannelError::ChannelClosed`].
    /// Closing a `Closed` channel does nothing; closing a `Faulted` one
    /// releases its resources and leaves it `Faulted`.
    pub fn begin_close(&self, timeout: Duration) -> Operation<()> {
        let shared = self.shared.clone();
        self.spawn("close", async move { shared.close(Instant::now() + timeout).await })
    }

    pub async fn close(&self, timeout: Duration) -> Result<()> {
        self.begin_close(timeout).await
    }

    pub fn close_blocking(&self, timeout: Duration) -> Result<()> {
        self.begin_close(timeout).wait()
    }

    /// Tear the session down immediately without draining.
    pub fn abort(&self) {
        self.shared.abort();
    }

    // ---------------------------------------------------------------------
    // Binding defaults
    // ---------------------------------------------------------------------

    /// [`begin_open`](Self::begin_open) bounded by the binding's `open_timeout`.
    pub fn begin_open_default(&self) -> Operation<()> {
        self.begin_open(self.shared.settings.open_timeout)
    }

    pub async fn open_default(&self) -> Result<()> {
        self.begin_open_default().await
    }

    pub fn open_default_blocking(&self) -> Result<()> {
        self.begin_open_default().wait()
    }

    /// [`begin_send`](Self::begin_send) bounded by the binding's `send_timeout`.
    pub fn begin_send_default(&self, message: Message) -> Operation<MessageId> {
        self.begin_send(message, self.shared.settings.send_timeout)
    }

    pub async fn send_default(&self, message: Message) -> Result<MessageId> {
        self.begin_send_default(message).await
    }

    pub fn send_default_blocking(&self, message: Message) -> Result<MessageId> {
        self.begin_send_default(message).wait()
    }

    /// [`begin_receive`](Self::begin_receive) bounded by the binding's
    /// `receive_timeout`.
    pub fn begin_receive_default(&self) -> Operation<Message> {
        self.begin_receive(self.shared.settings.receive_timeout)
    }

    pub async fn receive_default(&self) -> Result<Message> {
        self.begin_receive_default().await
    }

    pub fn receive_default_blocking(&self) -> Result<Message> {
        self.begin_receive_default().wait()
    }

    /// [`begin_close`](Self::begin_close) bounded by the binding's `close_timeout`.
    pub fn begin_close_default(&self) -> Operation<()> {
        self.begin_close(self.shared.settings.close_timeout)
    }

    pub async fn close_default(&self) -> Result<()> {
        self.begin_close_default().await
    }

    pub fn close_default_blocking(&self) -> Result<()> {
        self.begin_close_default().wait()
    }

    // ---------------------------------------------------------------------
    // Diagnostics
    // ---------------------------------------------------------------------

    /// Process-unique channel number (used in logs).
    #[inline]
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn state(&self) -> CommunicationState {
        self.shared.state()
    }

    #[inline]
    pub fn address(&self) -> &EndpointAddress {
        &self.shared.address
    }

    /// The channel's copy of the binding configuration.
    #[inline]
    pub fn settings(&self) -> &BindingConfig {
        &self.shared.settings
    }

    /// Session id assigned during the handshake.
    pub fn session_id(&self) -> Option<String> {
        self.shared.session_id.lock().clone()
    }

    /// Number of requests still waiting for a reply.
    pub fn pending_replies(&self) -> usize {
        self.shared.correlation.len()
    }

    /// Ids of requests still waiting for a reply, sorted.
    pub fn pending_reply_ids(&self) -> Vec<MessageId> {
        self.shared.correlation.pending_ids()
    }

    /// Number of received messages waiting in the mailbox.
    pub fn queued_messages(&self) -> usize {
        self.shared.inbox.len()
    }

    /// True once the peer has ended the session.
    pub fn is_peer_ended(&self) -> bool {
        self.shared.peer_ended.load(Ordering::Acquire)
    }

    /// What faulted the channel, if it is `Faulted`.
    pub fn fault_cause(&self) -> Option<ChannelError> {
        self.shared.fault_cause.lock().clone()
    }
}

impl std::fmt::Debug for DuplexChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuplexChannel")
            .field("id", &self.shared.id)
            .field("address", &self.shared.address.as_str())
            .field("state", &self.state())
            .finish()
    }
}
