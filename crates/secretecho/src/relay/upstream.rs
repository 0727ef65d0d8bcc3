//! Upstream connector for the Gemini Live API.
//!
//! Opens one outbound streaming socket per relay session, performs the
//! setup handshake, and bridges frames through a writer/reader task pair so
//! the session never touches the socket directly.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::error::RelayError;
use super::protocol::{LiveIncoming, ServerContent, SetupMessage};
use crate::companion::CompanionProfile;

/// Buffer size for the upstream event channel.
const EVENT_BUFFER_SIZE: usize = 256;

/// Buffer size for outbound frames.
const OUTBOUND_BUFFER_SIZE: usize = 64;

/// Default Gemini Live endpoint.
pub const DEFAULT_GEMINI_WS_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Default model requested in the setup handshake.
pub const DEFAULT_GEMINI_MODEL: &str = "models/gemini-2.0-flash-exp";

/// Configuration for the Gemini connector.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// WebSocket endpoint, without the key query parameter.
    pub ws_url: String,
    /// API key appended as `?key=`.
    pub api_key: String,
    /// Model id sent in the setup frame.
    pub model: String,
    /// Handshake timeout for the initial connect.
    pub connect_timeout: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_GEMINI_WS_URL.to_string(),
            api_key: String::new(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
            connect_timeout: Duration::from_secs(15),
        }
    }
}

/// Parsed events delivered from the upstream socket to the session.
#[derive(Debug, Clone)]
pub enum UpstreamEvent {
    /// Provider acknowledged the setup handshake.
    SetupComplete,
    /// Streamed content: fragments, a turn-complete signal, or both.
    Content(ServerContent),
    /// Frame that could not be parsed. The stream continues.
    Protocol(String),
    /// Provider closed the socket.
    Closed { code: Option<u16>, reason: String },
    /// Transport-level failure; the socket is gone.
    TransportError(String),
}

/// Handle to one open upstream connection.
///
/// Dropping the handle (or calling [`UpstreamHandle::close`]) tears down
/// the writer task, which sends a close frame before ending. Close is
/// idempotent: the session owns at most one handle and takes it out before
/// dropping.
#[derive(Debug)]
pub struct UpstreamHandle {
    outbound: mpsc::Sender<String>,
    events: mpsc::Receiver<UpstreamEvent>,
}

impl UpstreamHandle {
    /// Assemble a handle from raw channel halves. Production handles come
    /// from a connector; this seam exists for alternative connectors and
    /// tests.
    pub fn new(outbound: mpsc::Sender<String>, events: mpsc::Receiver<UpstreamEvent>) -> Self {
        Self { outbound, events }
    }

    /// Send a raw JSON frame upstream. Fails with
    /// [`RelayError::NotReady`] once the connection is gone.
    pub async fn send(&self, frame: String) -> Result<(), RelayError> {
        self.outbound
            .send(frame)
            .await
            .map_err(|_| RelayError::NotReady)
    }

    /// Receive the next upstream event. `None` means the reader task has
    /// ended and no further events will arrive.
    pub async fn recv(&mut self) -> Option<UpstreamEvent> {
        self.events.recv().await
    }

    /// Close the connection.
    pub fn close(self) {
        // Dropping the outbound sender ends the writer task, which sends a
        // close frame on its way out.
    }
}

/// Opens upstream connections for relay sessions.
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    /// Connect to the provider and perform the setup handshake for the
    /// given companion. Resolves once the socket is open and the setup
    /// frame has been written; the setup-complete acknowledgement arrives
    /// later as an [`UpstreamEvent::SetupComplete`].
    async fn open(&self, profile: &CompanionProfile) -> Result<UpstreamHandle, RelayError>;
}

/// Production connector speaking to the Gemini Live API.
#[derive(Debug, Clone)]
pub struct GeminiConnector {
    config: GeminiConfig,
}

type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

impl GeminiConnector {
    pub fn new(config: GeminiConfig) -> Self {
        Self { config }
    }

    fn endpoint(&self) -> String {
        format!("{}?key={}", self.config.ws_url, self.config.api_key)
    }
}

#[async_trait]
impl UpstreamConnector for GeminiConnector {
    async fn open(&self, profile: &CompanionProfile) -> Result<UpstreamHandle, RelayError> {
        let endpoint = self.endpoint();
        debug!("connecting to Gemini Live API for companion {}", profile.code);

        let connect = connect_async(&endpoint);
        let (socket, _) = tokio::time::timeout(self.config.connect_timeout, connect)
            .await
            .map_err(|_| {
                RelayError::Connection(format!(
                    "handshake timed out after {:?}",
                    self.config.connect_timeout
                ))
            })?
            .map_err(|err| RelayError::Connection(err.to_string()))?;

        info!("connected to Gemini Live API");
        let (write, read) = socket.split();

        let (outbound_tx, outbound_rx) = mpsc::channel::<String>(OUTBOUND_BUFFER_SIZE);
        let (event_tx, event_rx) = mpsc::channel::<UpstreamEvent>(EVENT_BUFFER_SIZE);

        tokio::spawn(writer_task(write, outbound_rx));
        tokio::spawn(reader_task(read, event_tx));

        let handle = UpstreamHandle::new(outbound_tx, event_rx);

        // Setup handshake with the companion's system prompt
        let setup = SetupMessage::new(&self.config.model, profile);
        let frame = serde_json::to_string(&setup)
            .map_err(|err| RelayError::Protocol(err.to_string()))?;
        handle
            .send(frame)
            .await
            .map_err(|_| RelayError::Connection("socket closed before setup".to_string()))?;

        Ok(handle)
    }
}

async fn writer_task(
    mut write: futures::stream::SplitSink<UpstreamSocket, WsMessage>,
    mut outbound_rx: mpsc::Receiver<String>,
) {
    while let Some(frame) = outbound_rx.recv().await {
        if write.send(WsMessage::Text(frame.into())).await.is_err() {
            break;
        }
    }
    let _ = write.send(WsMessage::Close(None)).await;
    debug!("upstream writer task ended");
}

async fn reader_task(
    mut read: futures::stream::SplitStream<UpstreamSocket>,
    event_tx: mpsc::Sender<UpstreamEvent>,
) {
    while let Some(message) = read.next().await {
        match message {
            Ok(WsMessage::Text(text)) => {
                dispatch_frame(text.as_str().as_bytes(), &event_tx).await;
            }
            // The provider also delivers JSON in binary frames
            Ok(WsMessage::Binary(data)) => {
                dispatch_frame(&data, &event_tx).await;
            }
            Ok(WsMessage::Close(frame)) => {
                let (code, reason) = match frame {
                    Some(frame) => (Some(u16::from(frame.code)), frame.reason.to_string()),
                    None => (None, String::new()),
                };
                info!("Gemini Live API closed the connection (code {:?})", code);
                let _ = event_tx.send(UpstreamEvent::Closed { code, reason }).await;
                break;
            }
            Ok(_) => {
                // Ping/pong handled by the protocol layer
            }
            Err(err) => {
                warn!("upstream socket error: {}", err);
                let _ = event_tx
                    .send(UpstreamEvent::TransportError(err.to_string()))
                    .await;
                break;
            }
        }
    }
    debug!("upstream reader task ended");
}

async fn dispatch_frame(raw: &[u8], event_tx: &mpsc::Sender<UpstreamEvent>) {
    match serde_json::from_slice::<LiveIncoming>(raw) {
        Ok(incoming) => {
            if incoming.setup_complete.is_some() {
                let _ = event_tx.send(UpstreamEvent::SetupComplete).await;
            }
            if let Some(content) = incoming.server_content {
                let _ = event_tx.send(UpstreamEvent::Content(content)).await;
            } else if incoming.setup_complete.is_none() {
                // Valid JSON but nothing we understand; drop it
                debug!("unmatched upstream frame: {}", String::from_utf8_lossy(raw));
            }
        }
        Err(err) => {
            warn!("failed to parse upstream frame: {}", err);
            let _ = event_tx
                .send(UpstreamEvent::Protocol(err.to_string()))
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    fn profile() -> CompanionProfile {
        CompanionProfile {
            code: "buddy".to_string(),
            name: "EchoBuddy".to_string(),
            description: String::new(),
            system_prompt: "Be a friend.".to_string(),
        }
    }

    fn local_config(addr: std::net::SocketAddr) -> GeminiConfig {
        GeminiConfig {
            ws_url: format!("ws://{}/", addr),
            api_key: "test-key".to_string(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
            connect_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_open_sends_setup_and_delivers_events() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut socket = accept_async(stream).await.unwrap();

            // First frame must be the setup handshake
            let setup = socket.next().await.unwrap().unwrap();
            let value: serde_json::Value =
                serde_json::from_str(setup.to_text().unwrap()).unwrap();
            assert_eq!(value["setup"]["model"], DEFAULT_GEMINI_MODEL);

            socket
                .send(WsMessage::Text(r#"{"setupComplete":{}}"#.into()))
                .await
                .unwrap();
            socket
                .send(WsMessage::Text(
                    r#"{"serverContent":{"modelTurn":{"parts":[{"text":"hi"}]},"turnComplete":true}}"#.into(),
                ))
                .await
                .unwrap();
        });

        let connector = GeminiConnector::new(local_config(addr));
        let mut handle = connector.open(&profile()).await.unwrap();

        assert!(matches!(
            handle.recv().await,
            Some(UpstreamEvent::SetupComplete)
        ));
        match handle.recv().await {
            Some(UpstreamEvent::Content(content)) => {
                assert!(content.turn_complete);
                let turn = content.model_turn.unwrap();
                assert_eq!(turn.parts[0].text.as_deref(), Some("hi"));
            }
            other => panic!("expected content event, got {:?}", other),
        }

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_frame_yields_protocol_event() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut socket = accept_async(stream).await.unwrap();
            let _setup = socket.next().await.unwrap().unwrap();
            socket
                .send(WsMessage::Text("this is not json".into()))
                .await
                .unwrap();
        });

        let connector = GeminiConnector::new(local_config(addr));
        let mut handle = connector.open(&profile()).await.unwrap();

        assert!(matches!(
            handle.recv().await,
            Some(UpstreamEvent::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let config = GeminiConfig {
            ws_url: "ws://127.0.0.1:1".to_string(),
            api_key: "test-key".to_string(),
            ..GeminiConfig::default()
        };
        let connector = GeminiConnector::new(config);

        match connector.open(&profile()).await {
            Err(RelayError::Connection(_)) => {}
            other => panic!("expected connection error, got {:?}", other.map(|_| ())),
        }
    }
}
