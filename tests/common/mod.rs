//! Shared fixtures: a loopback echo service and logging setup.

#![allow(dead_code)]

use std::time::Duration;

use duplex_session::{
    BindingConfig, ChannelError, ChannelFactory, ChannelListener, DuplexChannel, Message,
};
use tokio::task::JoinHandle;

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub const ECHO_ACTION: &str = "urn:test/echo";
/// Requests with this action get no reply.
pub const IGNORE_ACTION: &str = "urn:test/ignore";
/// Requests with this action are answered after `DELAY`.
pub const DELAY_ACTION: &str = "urn:test/delay";
/// Requests with this action are answered twice, followed by a reply to an unknown id.
pub const TWICE_ACTION: &str = "urn:test/twice";

pub const DELAY: Duration = Duration::from_millis(300);

pub const CLIENT_TEXT: &str = "[client] This is my request.";
pub const SERVICE_TEXT: &str = "[service] Request received, this is my Reply.";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// An echo service accepting sessions on an ephemeral loopback port.
pub struct EchoService {
    pub address: String,
    task: JoinHandle<()>,
}

impl EchoService {
    pub async fn start() -> Self {
        Self::start_at("net.tcp://127.0.0.1:0/echo").await
    }

    pub async fn start_at(address: &str) -> Self {
        init_tracing();
        let listener = ChannelListener::bind(address, BindingConfig::default())
            .await
            .unwrap();
        let address = listener.local_address().to_string();

        let task = tokio::spawn(async move {
            loop {
                match listener.accept(Duration::from_secs(60)).await {
                    Ok(channel) => {
                        tokio::spawn(serve(channel));
                    }
                    Err(e) if e.is_retryable() => continue,
                    Err(e) => {
                        tracing::debug!("echo service accept failed: {}", e);
                        break;
                    }
                }
            }
        });

        Self { address, task }
    }
}

impl Drop for EchoService {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Answer requests until the peer ends the session, then close.
async fn serve(channel: DuplexChannel) {
    loop {
        let request = match channel.receive(Duration::from_secs(60)).await {
            Ok(request) => request,
            Err(ChannelError::Timeout { .. }) => continue,
            Err(_) => break,
        };

        let channel = channel.clone();
        tokio::spawn(async move {
            if let Err(e) = answer(&channel, request).await {
                tracing::debug!("echo service reply failed: {}", e);
            }
        });
    }

    let _ = channel.close(TIMEOUT).await;
}

async fn answer(channel: &DuplexChannel, mut request: Message) -> duplex_session::Result<()> {
    if !request.expects_reply() {
        return Ok(());
    }

    let action = request.action().to_string();
    let text: String = request.read_body_as()?;
    let reply = Message::reply_to(&request, format!("{}/reply", action), &echo_text(&text))?;

    match action.as_str() {
        IGNORE_ACTION => {}
        DELAY_ACTION => {
            tokio::time::sleep(DELAY).await;
            channel.send(reply, TIMEOUT).await?;
        }
        TWICE_ACTION => {
            let again = Message::reply_to(&request, "urn:test/again", &"again".to_string())?;
            let stray = Message::new("urn:test/stray", bytes_of("stray"))
                .with_relates_to("urn:uuid:00000000-0000-0000-0000-000000000000");
            channel.send(reply, TIMEOUT).await?;
            channel.send(again, TIMEOUT).await?;
            channel.send(stray, TIMEOUT).await?;
        }
        _ => {
            channel.send(reply, TIMEOUT).await?;
        }
    }
    Ok(())
}

fn bytes_of(text: &str) -> Vec<u8> {
    text.as_bytes().to_vec()
}

pub fn echo_text(request: &str) -> String {
    format!("{}{}", request, SERVICE_TEXT)
}

pub fn request(action: &str) -> Message {
    Message::with_body(action, &CLIENT_TEXT.to_string()).unwrap()
}

/// An opened factory using the default binding.
pub async fn open_factory(binding: BindingConfig) -> ChannelFactory {
    let factory = ChannelFactory::builder().binding(binding).build().unwrap();
    factory.open(TIMEOUT).await.unwrap();
    factory
}

/// An opened channel to `service`.
pub async fn open_channel(factory: &ChannelFactory, service: &EchoService) -> DuplexChannel {
    let channel = factory.create_channel(service.address.as_str()).unwrap();
    channel.open(TIMEOUT).await.unwrap();
    channel
}
