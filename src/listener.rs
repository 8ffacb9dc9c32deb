//! Accepting side: turns inbound sessions into opened channels.
//!
//! A background task owns the socket listener. Every connection it accepts
//! gets its own handshake task, bounded by the binding's `open_timeout`, so a
//! connection that never sends its preamble cannot hold up the ones behind
//! it. Channels whose handshake succeeded are queued for [`ChannelListener::accept`].
//!
//! ```text
//!   socket ──► accept loop ──┬─► handshake task ──┐
//!                            ├─► handshake task ──┼─► mpsc ──► accept()
//!                            └─► handshake task ──┘
//! ```

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::channel::DuplexChannel;
use crate::config::BindingConfig;
use crate::error::{ChannelError, Result};
use crate::handshake;
use crate::transport::{EndpointAddress, Session, SessionListener, SessionStream};

/// Opened channels waiting for `accept`.
const ACCEPT_QUEUE_CAPACITY: usize = 64;

/// Pause after a failed socket accept (e.g. out of file descriptors).
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Listens on an endpoint address and yields one [`DuplexChannel`] per
/// accepted session.
///
/// # Example
///
/// ```ignore
/// let listener = ChannelListener::bind("net.tcp://127.0.0.1:0/echo", BindingConfig::default()).await?;
/// loop {
///     let channel = listener.accept(Duration::from_secs(60)).await?;
///     tokio::spawn(serve(channel));
/// }
/// ```
pub struct ChannelListener {
    local_address: EndpointAddress,
    incoming: Mutex<mpsc::Receiver<DuplexChannel>>,
    accept_task: JoinHandle<()>,
}

impl ChannelListener {
    /// Validate `binding`, bind `address` and start accepting sessions.
    ///
    /// Must be called inside a Tokio runtime; accepted channels run on it.
    pub async fn bind<A>(address: A, binding: BindingConfig) -> Result<Self>
    where
        A: TryInto<EndpointAddress, Error = ChannelError>,
    {
        binding.validate()?;
        let address = address.try_into()?;
        let listener = SessionListener::bind(&address).await?;
        let local_address = listener.local_address().clone();

        tracing::debug!(address = %local_address, "Listening");

        let (tx, rx) = mpsc::channel(ACCEPT_QUEUE_CAPACITY);
        let accept_task = tokio::spawn(accept_loop(listener, binding, Handle::current(), tx));

        Ok(Self {
            local_address,
            incoming: Mutex::new(rx),
            accept_task,
        })
    }

    /// The bound address, with the assigned port for TCP port 0.
    pub fn local_address(&self) -> &EndpointAddress {
        &self.local_address
    }

    /// Wait up to `timeout` for the next session that completed its handshake.
    ///
    /// Sessions whose preamble is rejected or that stay silent past the
    /// binding's `open_timeout` are dropped without surfacing here.
    pub async fn accept(&self, timeout: Duration) -> Result<DuplexChannel> {
        let deadline = Instant::now() + timeout;
        let next = tokio::time::timeout_at(deadline, async {
            self.incoming.lock().await.recv().await
        })
        .await
        .map_err(|_| ChannelError::timeout("accept", timeout))?;

        next.ok_or(ChannelError::ChannelClosed)
    }
}

impl Drop for ChannelListener {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

impl std::fmt::Debug for ChannelListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelListener")
            .field("local_address", &self.local_address.as_str())
            .finish()
    }
}

async fn accept_loop(
    listener: SessionListener,
    binding: BindingConfig,
    handle: Handle,
    tx: mpsc::Sender<DuplexChannel>,
) {
    loop {
        let stream = match listener.accept().await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(address = %listener.local_address(), "Accept failed: {}", e);
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                continue;
            }
        };

        let local = listener.local_address().clone();
        let binding = binding.clone();
        let handle = handle.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            match accept_session(stream, &local, &binding).await {
                Ok((session, session_id)) => {
                    let channel =
                        DuplexChannel::from_accepted(local, binding, handle, session, session_id);
                    if tx.send(channel).await.is_err() {
                        tracing::debug!("Listener dropped before the session was accepted");
                    }
                }
                Err(e) => {
                    tracing::warn!(address = %local, "Inbound session rejected: {}", e);
                }
            }
        });
    }
}

/// Run the accepting handshake on one connection under the binding's
/// `open_timeout`.
async fn accept_session(
    stream: SessionStream,
    local: &EndpointAddress,
    binding: &BindingConfig,
) -> Result<(Session, String)> {
    let deadline = Instant::now() + binding.open_timeout;
    let mut session = Session::from_stream(stream, binding.max_frame_size, binding.writer_config());

    match handshake::accept(&mut session.reader, &session.writer, local, deadline).await {
        Ok((preamble, session_id)) => {
            tracing::debug!(
                session = %session_id,
                peer = %session.peer,
                via = %preamble.via,
                "Session accepted"
            );
            Ok((session, session_id))
        }
        Err(e) => {
            // Let a queued fault frame reach the peer before dropping the session.
            let _ = session.writer.shutdown(deadline).await;
            session.writer_task.abort();
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::CommunicationState;
    use crate::config::SecurityMode;

    async fn initiate(address: EndpointAddress) -> String {
        let mut session = Session::connect(
            &address,
            Instant::now() + Duration::from_secs(1),
            crate::protocol::DEFAULT_MAX_FRAME_SIZE,
            Default::default(),
        )
        .await
        .unwrap();
        handshake::initiate(
            &mut session.reader,
            &session.writer,
            &address,
            Instant::now() + Duration::from_secs(1),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_binding() {
        let binding = BindingConfig::default().security_mode(SecurityMode::Transport);
        let err = ChannelListener::bind("net.tcp://127.0.0.1:0/x", binding)
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_accept_times_out() {
        let listener = ChannelListener::bind("net.tcp://127.0.0.1:0/x", BindingConfig::default())
            .await
            .unwrap();
        let err = listener
            .accept(Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_accepted_channel_is_opened() {
        let listener = ChannelListener::bind("net.tcp://127.0.0.1:0/x", BindingConfig::default())
            .await
            .unwrap();
        let client = tokio::spawn(initiate(listener.local_address().clone()));

        let channel = listener.accept(Duration::from_secs(1)).await.unwrap();
        let session_id = client.await.unwrap();

        assert_eq!(channel.state(), CommunicationState::Opened);
        assert_eq!(channel.session_id(), Some(session_id));
    }

    #[tokio::test]
    async fn test_silent_connection_does_not_block_next_session() {
        let listener = ChannelListener::bind("net.tcp://127.0.0.1:0/x", BindingConfig::default())
            .await
            .unwrap();
        let address = listener.local_address().clone();

        // Connected first, never sends a preamble.
        let _silent = Session::connect(
            &address,
            Instant::now() + Duration::from_secs(1),
            crate::protocol::DEFAULT_MAX_FRAME_SIZE,
            Default::default(),
        )
        .await
        .unwrap();

        let client = tokio::spawn(initiate(address));
        let channel = listener.accept(Duration::from_secs(1)).await.unwrap();
        let session_id = client.await.unwrap();

        assert_eq!(channel.session_id(), Some(session_id));
    }

    #[tokio::test]
    async fn test_silent_connection_is_dropped_after_open_timeout() {
        let binding = BindingConfig::default().open_timeout(Duration::from_millis(100));
        let listener = ChannelListener::bind("net.tcp://127.0.0.1:0/x", binding)
            .await
            .unwrap();

        let mut silent = Session::connect(
            listener.local_address(),
            Instant::now() + Duration::from_secs(1),
            crate::protocol::DEFAULT_MAX_FRAME_SIZE,
            Default::default(),
        )
        .await
        .unwrap();

        // The listener gives up on the handshake and ends the session.
        let end = silent
            .reader
            .receive_frame(Some(Instant::now() + Duration::from_secs(2)))
            .await
            .unwrap();
        assert!(end.is_none());

        let err = listener
            .accept(Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
