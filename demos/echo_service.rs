//! Echo Service - accepting side of a duplex session.
//!
//! This example demonstrates:
//! - Binding a `ChannelListener` to a `net.tcp` address
//! - Serving each accepted channel on its own task
//! - Replying with `Message::reply_to` so the client can correlate
//!
//! # Running
//!
//! ```sh
//! cargo run --example echo_service -- net.tcp://127.0.0.1:8080/echo
//! cargo run --example echo_client -- net.tcp://127.0.0.1:8080/echo
//! ```

use duplex_session::{BindingConfig, ChannelError, ChannelListener, DuplexChannel, Message};

const DEFAULT_ADDRESS: &str = "net.tcp://127.0.0.1:8080/echo";
const REPLY_TEXT: &str = "[service] Request received, this is my Reply.";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let address = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_ADDRESS.to_string());
    let binding = BindingConfig::default();
    let listener = ChannelListener::bind(address.as_str(), binding.clone()).await?;
    println!("Echo service listening on {}", listener.local_address());

    loop {
        match listener.accept(binding.receive_timeout).await {
            Ok(channel) => {
                tokio::spawn(serve(channel));
            }
            Err(e) if e.is_retryable() => continue,
            Err(e) => tracing::warn!("Accept failed: {}", e),
        }
    }
}

async fn serve(channel: DuplexChannel) {
    println!("Session {} opened", channel.session_id().unwrap_or_default());

    loop {
        let mut request = match channel.receive_default().await {
            Ok(request) => request,
            Err(ChannelError::Timeout { .. }) => continue,
            Err(e) => {
                println!("Session ended: {}", e);
                break;
            }
        };

        if !request.expects_reply() {
            continue;
        }

        let reply = match request.read_body_as::<String>() {
            Ok(text) => Message::reply_to(
                &request,
                format!("{}/reply", request.action()),
                &format!("{}{}", text, REPLY_TEXT),
            ),
            Err(e) => Message::fault_reply(&request, &e.to_string()),
        };

        let sent = match reply {
            Ok(reply) => channel.send_default(reply).await.map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            tracing::warn!("Reply failed: {}", e);
        }
    }

    if let Err(e) = channel.close_default().await {
        tracing::warn!("Close failed: {}", e);
    }
}
