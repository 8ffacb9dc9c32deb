//! Session handshake.
//!
//! ```text
//! connecting side                      accepting side
//!      │── PREAMBLE {version, via, encoding} ──►│
//!      │◄── PREAMBLE_ACK {session_id} ──────────│  accepted
//!      │◄── PREAMBLE|FAULT {reason} ────────────│  rejected
//! ```
//!
//! Both halves run under the caller's deadline.

mod preamble;

pub use preamble::{Preamble, PreambleAck, PreambleFault, PreambleReply};

use tokio::time::Instant;

use crate::error::{ChannelError, Result};
use crate::message::MessageId;
use crate::transport::{EndpointAddress, FrameReader};
use crate::writer::WriterHandle;

/// Run the connecting half. Returns the session id assigned by the peer.
pub async fn initiate(
    reader: &mut FrameReader,
    writer: &WriterHandle,
    via: &EndpointAddress,
    deadline: Instant,
) -> Result<String> {
    writer
        .send(Preamble::new(via.as_str()).to_frame()?, deadline)
        .await?;

    let frame = reader
        .receive_frame(Some(deadline))
        .await?
        .ok_or_else(|| ChannelError::Protocol("peer closed during handshake".to_string()))?;

    match PreambleReply::from_frame(&frame)? {
        PreambleReply::Accepted(ack) => Ok(ack.session_id),
        PreambleReply::Rejected(fault) => Err(ChannelError::Protocol(format!(
            "preamble rejected: {}",
            fault.reason
        ))),
    }
}

/// Run the accepting half for an endpoint listening on `local`.
///
/// On success the new session id has been sent to the peer and is returned
/// together with the peer's preamble. A preamble that can't be served is
/// answered with a fault frame before the error is returned.
pub async fn accept(
    reader: &mut FrameReader,
    writer: &WriterHandle,
    local: &EndpointAddress,
    deadline: Instant,
) -> Result<(Preamble, String)> {
    let frame = reader
        .receive_frame(Some(deadline))
        .await?
        .ok_or_else(|| ChannelError::Protocol("peer closed before preamble".to_string()))?;

    let preamble = Preamble::from_frame(&frame)?;

    if let Err(reason) = check_preamble(&preamble, local) {
        tracing::warn!(via = %preamble.via, "Rejecting preamble: {}", reason);
        let fault = PreambleFault {
            reason: reason.clone(),
        };
        // Queued only; the caller flushes it when it shuts the session down.
        writer.send_detached(fault.to_frame()?).await?;
        return Err(ChannelError::Protocol(format!("preamble rejected: {}", reason)));
    }

    let session_id = MessageId::new().to_string();
    let ack = PreambleAck {
        session_id: session_id.clone(),
    };
    writer.send(ack.to_frame()?, deadline).await?;

    Ok((preamble, session_id))
}

fn check_preamble(
    preamble: &Preamble,
    local: &EndpointAddress,
) -> std::result::Result<(), String> {
    preamble.check_compatible()?;

    let via = EndpointAddress::parse(&preamble.via).map_err(|e| e.to_string())?;
    if via.scheme() != local.scheme() || via.path() != local.path() {
        return Err(format!("no endpoint listening at {}", preamble.via));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DEFAULT_MAX_FRAME_SIZE;
    use crate::transport::{Session, SessionStream};
    use crate::writer::WriterConfig;
    use std::time::Duration;
    use tokio::io::duplex;

    fn session_pair() -> (Session, Session) {
        let (a, b) = duplex(64 * 1024);
        let make = |io: tokio::io::DuplexStream, name: &'static str| {
            Session::from_stream(
                SessionStream::from_io(io, name),
                DEFAULT_MAX_FRAME_SIZE,
                WriterConfig::default(),
            )
        };
        (make(a, "client"), make(b, "service"))
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    #[tokio::test]
    async fn test_handshake_accepted() {
        let (mut client, mut service) = session_pair();
        let local = EndpointAddress::parse("net.tcp://127.0.0.1:9000/echo").unwrap();
        let via = local.clone();

        let accepting = tokio::spawn(async move {
            accept(&mut service.reader, &service.writer, &local, deadline()).await
        });

        let session_id = initiate(&mut client.reader, &client.writer, &via, deadline())
            .await
            .unwrap();
        let (preamble, accepted_id) = accepting.await.unwrap().unwrap();

        assert_eq!(session_id, accepted_id);
        assert!(session_id.starts_with("urn:uuid:"));
        assert_eq!(preamble.via, via.as_str());
    }

    #[tokio::test]
    async fn test_handshake_rejects_wrong_path() {
        let (mut client, mut service) = session_pair();
        let local = EndpointAddress::parse("net.tcp://127.0.0.1:9000/echo").unwrap();
        let via = EndpointAddress::parse("net.tcp://127.0.0.1:9000/other").unwrap();

        let accepting = tokio::spawn(async move {
            let result = accept(&mut service.reader, &service.writer, &local, deadline()).await;
            // The fault frame is only queued; shutting down flushes it.
            service.writer.shutdown(deadline()).await.unwrap();
            result
        });

        let err = initiate(&mut client.reader, &client.writer, &via, deadline())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no endpoint listening"));
        assert!(accepting.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_initiate_times_out_without_answer() {
        let (mut client, _service) = session_pair();
        let via = EndpointAddress::parse("net.tcp://127.0.0.1:9000/echo").unwrap();

        let short = Instant::now() + Duration::from_millis(50);
        let err = initiate(&mut client.reader, &client.writer, &via, short)
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_initiate_peer_closed() {
        let (mut client, service) = session_pair();
        let via = EndpointAddress::parse("net.tcp://127.0.0.1:9000/echo").unwrap();

        service.writer.shutdown(deadline()).await.unwrap();
        let err = initiate(&mut client.reader, &client.writer, &via, deadline())
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Protocol(_)));
    }
}
