//! Echo Client - connecting side of a duplex session.
//!
//! Opens a channel to the echo service, sends one request, and checks that
//! the reply is correlated and carries the service's text.
//!
//! # Running
//!
//! ```sh
//! cargo run --example echo_client -- net.tcp://127.0.0.1:8080/echo
//! ```

use duplex_session::{BindingConfig, ChannelFactory, Message};

const DEFAULT_ADDRESS: &str = "net.tcp://127.0.0.1:8080/echo";
const REQUEST_TEXT: &str = "[client] This is my request.";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let address = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_ADDRESS.to_string());
    let binding = BindingConfig::default().target_address(address);

    let factory = ChannelFactory::builder().binding(binding).build()?;
    factory.open_default().await?;

    let channel = factory.create_default_channel()?;
    channel.open_default().await?;
    println!(
        "Opened session {} to {}",
        channel.session_id().unwrap_or_default(),
        channel.address()
    );

    let request = Message::with_body("urn:demo/echo", &REQUEST_TEXT.to_string())?;
    let id = channel.send_default(request).await?;
    let mut reply = channel.receive_default().await?;

    if reply.relates_to() != Some(&id) {
        return Err(format!("reply relates to {:?}, expected {}", reply.relates_to(), id).into());
    }
    if reply.is_fault() {
        return Err(format!("service fault: {}", reply.read_body_as::<String>()?).into());
    }

    let text: String = reply.read_body_as()?;
    println!("{}", text);

    channel.close_default().await?;
    factory.close_default().await?;
    Ok(())
}
