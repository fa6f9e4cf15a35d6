//! Socket.IO feed client over tokio-tungstenite.

use anyhow::{anyhow, Context, Result};
use futures_util::{SinkExt, StreamExt};
use nonempty::NonEmpty;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::transport::packet::{self, EnginePacket, SocketPacket};

/// One event received from the feed.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEvent {
    pub name: String,
    pub args: Vec<Value>,
}

/// Feed connection settings.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Server URLs; the first is primary, the rest are tried in turn on failure
    pub urls: NonEmpty<String>,
    /// Pause before reconnecting after a dropped session
    pub reconnect_delay: Duration,
    pub connect_timeout: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            urls: NonEmpty::new("wss://bundle-backend-prod1.defi.gala.com".to_string()),
            reconnect_delay: Duration::from_millis(500),
            connect_timeout: Duration::from_secs(20),
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionEnd {
    Shutdown,
    ReceiverGone,
    Disconnected(String),
}

/// Socket.IO endpoint for a server base URL.
pub fn endpoint(base: &str) -> Result<Url> {
    let mut url = Url::parse(base).with_context(|| format!("Invalid feed URL {}", base))?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => return Err(anyhow!("Unsupported feed URL scheme {}", other)),
    };
    url.set_scheme(scheme)
        .map_err(|_| anyhow!("Cannot use scheme {} for {}", scheme, base))?;
    url.set_path("/socket.io/");
    url.set_query(Some("EIO=4&transport=websocket"));
    Ok(url)
}

/// Long-running feed subscriber that forwards every event to a channel.
pub struct FeedClient {
    config: FeedConfig,
    events: mpsc::UnboundedSender<FeedEvent>,
}

impl FeedClient {
    pub fn new(config: FeedConfig) -> (Self, mpsc::UnboundedReceiver<FeedEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        (Self { config, events }, receiver)
    }

    /// Connect and reconnect until `shutdown` flips to `true` or the receiver is dropped.
    #[instrument(skip_all)]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let urls: Vec<&String> = self.config.urls.iter().collect();
        let mut index = 0usize;

        loop {
            if *shutdown.borrow() {
                return Ok(());
            }

            let base = urls[index % urls.len()];
            match self.session(base, &mut shutdown).await {
                Ok(SessionEnd::Shutdown) => {
                    info!("Feed client stopped");
                    return Ok(());
                }
                Ok(SessionEnd::ReceiverGone) => {
                    debug!("Event receiver dropped; stopping feed client");
                    return Ok(());
                }
                Ok(SessionEnd::Disconnected(reason)) => {
                    info!("Disconnected: {}", reason);
                }
                Err(e) => {
                    error!("Connection error: {:#}", e);
                    index += 1;
                }
            }

            tokio::select! {
                _ = sleep(self.config.reconnect_delay) => {}
                _ = shutdown.changed() => {}
            }
        }
    }

    async fn session(&self, base: &str, shutdown: &mut watch::Receiver<bool>) -> Result<SessionEnd> {
        let url = endpoint(base)?;
        debug!("Connecting to {}", url);

        let connect = timeout(self.config.connect_timeout, connect_async(url.as_str()));
        let (stream, _response) = tokio::select! {
            _ = shutdown.changed() => return Ok(SessionEnd::Shutdown),
            connected = connect => connected
                .context("Connection timeout")?
                .with_context(|| format!("Failed to connect to {}", base))?,
        };
        let (mut sink, mut stream) = stream.split();

        // until the handshake arrives, allow the default Engine.IO liveness window
        let mut liveness = Duration::from_millis(25_000 + 20_000);

        loop {
            let frame = tokio::select! {
                _ = shutdown.changed() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(SessionEnd::Shutdown);
                }
                frame = timeout(liveness, stream.next()) => frame,
            };

            let message = match frame {
                Err(_) => return Ok(SessionEnd::Disconnected("ping timeout".to_string())),
                Ok(None) => return Ok(SessionEnd::Disconnected("transport close".to_string())),
                Ok(Some(message)) => message.context("WebSocket read failed")?,
            };

            let text = match message {
                Message::Text(text) => text,
                Message::Close(frame) => {
                    let reason = frame
                        .map(|f| f.reason.to_string())
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| "transport close".to_string());
                    return Ok(SessionEnd::Disconnected(reason));
                }
                Message::Binary(_) => {
                    debug!("Ignoring binary frame");
                    continue;
                }
                _ => continue,
            };

            let packet = match packet::decode(&text) {
                Ok(packet) => packet,
                Err(e) => {
                    warn!("Ignoring undecodable frame: {}", e);
                    continue;
                }
            };

            match packet {
                EnginePacket::Open(handshake) => {
                    liveness = Duration::from_millis(handshake.ping_interval + handshake.ping_timeout);
                    sink.send(Message::Text(packet::encode_connect("/")))
                        .await
                        .context("Failed to join namespace")?;
                }
                EnginePacket::Ping(payload) => {
                    sink.send(Message::Text(packet::encode_pong(&payload)))
                        .await
                        .context("Failed to answer ping")?;
                }
                EnginePacket::Close => return Ok(SessionEnd::Disconnected("server close".to_string())),
                EnginePacket::Message(SocketPacket::Connect { sid, .. }) => {
                    info!("Connected to {} ({})", base, sid.as_deref().unwrap_or("no sid"));
                }
                EnginePacket::Message(SocketPacket::Event { name, args, .. }) => {
                    if self.events.send(FeedEvent { name, args }).is_err() {
                        return Ok(SessionEnd::ReceiverGone);
                    }
                }
                EnginePacket::Message(SocketPacket::ConnectError { message, .. }) => {
                    return Err(anyhow!("server refused connection: {}", message));
                }
                EnginePacket::Message(SocketPacket::Disconnect { .. }) => {
                    return Ok(SessionEnd::Disconnected("io server disconnect".to_string()));
                }
                other => debug!("Ignoring packet {:?}", other),
            }
        }
    }
}
