//! Per-channel reader task.
//!
//! The task exclusively owns the session's [`FrameReader`] and routes every
//! inbound message: replies complete their correlation entry, everything else
//! goes to the mailbox. It holds only a weak reference to the channel, so
//! dropping the last channel handle stops it.

use std::sync::{Arc, Weak};

use tokio::task::JoinHandle;

use super::ChannelShared;
use crate::error::{ChannelError, Result};
use crate::message::Message;
use crate::protocol::Frame;
use crate::transport::FrameReader;

/// Spawn the read loop for `shared`.
pub(super) fn spawn_reader(shared: &Arc<ChannelShared>, reader: FrameReader) -> JoinHandle<()> {
    let channel = shared.id;
    let weak = Arc::downgrade(shared);
    shared.handle.spawn(read_loop(weak, reader, channel))
}

/// Main read loop - reads frames until the peer ends the session or an error
/// faults the channel.
async fn read_loop(weak: Weak<ChannelShared>, mut reader: FrameReader, channel: u64) {
    loop {
        let received = reader.receive_frame(None).await;

        let Some(shared) = weak.upgrade() else {
            tracing::debug!(channel, "Channel dropped, stopping reader");
            return;
        };

        match received {
            Ok(Some(frame)) => {
                if let Err(e) = dispatch_frame(&shared, frame) {
                    tracing::error!(channel, "Read loop error: {}", e);
                    shared.fault(e);
                    return;
                }
            }
            Ok(None) => {
                shared.on_peer_closed();
                return;
            }
            Err(e) => {
                tracing::error!(channel, "Read loop error: {}", e);
                shared.fault(e);
                return;
            }
        }
    }
}

/// Route a single inbound frame.
fn dispatch_frame(shared: &ChannelShared, frame: Frame) -> Result<()> {
    if frame.header.is_control() {
        return Err(ChannelError::Protocol(format!(
            "unexpected session control frame after handshake (flags {:#04x})",
            frame.flags()
        )));
    }

    let message = Message::from_frame(frame)?;

    match message.relates_to().cloned() {
        Some(relates_to) => {
            shared.correlation.complete(&relates_to, message);
        }
        None => {
            let id = message.id().cloned();
            if !shared.inbox.push(message) {
                tracing::warn!(
                    channel = shared.id,
                    id = ?id,
                    queued = shared.inbox.len(),
                    "Inbound mailbox full or closed, dropping message"
                );
            }
        }
    }

    Ok(())
}
