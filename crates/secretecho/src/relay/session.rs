//! Relay session state machine.
//!
//! One [`RelaySession`] exists per authenticated client connection, tying
//! one browser socket to one upstream socket. All events for a session are
//! handled on a single logical task (the WebSocket handler's select loop);
//! there is no parallel processing of two events for the same session.

use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::error::RelayError;
use super::protocol::{
    self, ClientContentMessage, ClientEvent, GREETING_PRIMER, HISTORY_CONTEXT_PREAMBLE,
    INVALID_MESSAGE_FORMAT, ServerContent,
};
use super::queue::PendingQueue;
use super::turn::TurnBuffer;
use super::upstream::{UpstreamConnector, UpstreamEvent, UpstreamHandle};
use crate::chat::{ChatStore, NewChatMessage, Sender};
use crate::companion::CompanionProfile;

/// Which priming message seeded the first upstream turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priming {
    /// Empty history: a fixed greeting primer was sent and the resulting
    /// turn output is discarded.
    Greeting,
    /// Stored history was replayed: the resulting turn output becomes the
    /// visible first message and is persisted.
    HistoryReplay,
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    /// Session created, no upstream connection yet.
    Idle,
    /// Upstream socket opening.
    Connecting,
    /// Upstream open, setup sent, awaiting the setup-complete signal.
    AwaitingSetup,
    /// Setup complete; history or greeting primer sent, awaiting the first
    /// full response.
    AwaitingInitialTurn { priming: Priming },
    /// Steady state, normal message exchange.
    Ready,
    /// Terminal. A new client connection creates a new session.
    Closed,
}

/// Per-connection relay orchestrator.
pub struct RelaySession {
    user_pid: String,
    profile: CompanionProfile,
    connector: Arc<dyn UpstreamConnector>,
    store: Arc<dyn ChatStore>,
    client: mpsc::Sender<ClientEvent>,
    upstream: Option<UpstreamHandle>,
    state: RelayState,
    turn: TurnBuffer,
    pending: PendingQueue,
}

impl RelaySession {
    pub fn new(
        user_pid: String,
        profile: CompanionProfile,
        connector: Arc<dyn UpstreamConnector>,
        store: Arc<dyn ChatStore>,
        client: mpsc::Sender<ClientEvent>,
    ) -> Self {
        Self {
            user_pid,
            profile,
            connector,
            store,
            client,
            upstream: None,
            state: RelayState::Idle,
            turn: TurnBuffer::new(),
            pending: PendingQueue::new(),
        }
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Wait for the next upstream event. Pends forever while no upstream
    /// connection exists, so this is safe to poll in a select loop.
    pub async fn upstream_event(&mut self) -> UpstreamEvent {
        match self.upstream.as_mut() {
            Some(handle) => match handle.recv().await {
                Some(event) => event,
                None => {
                    // Reader ended without a terminal event
                    self.upstream = None;
                    UpstreamEvent::TransportError("upstream event channel closed".to_string())
                }
            },
            None => std::future::pending().await,
        }
    }

    /// Handle one raw text frame from the client socket.
    pub async fn handle_client_text(&mut self, raw: &str) {
        let Some(message) = protocol::parse_client_message(raw) else {
            warn!("invalid client frame for user {}", self.user_pid);
            self.emit(ClientEvent::error(INVALID_MESSAGE_FORMAT)).await;
            return;
        };

        debug!("received client message");
        self.handle_client_message(message).await;
    }

    async fn handle_client_message(&mut self, message: String) {
        match self.state {
            RelayState::Idle => {
                // Lazy connect on first message; the message itself waits
                // in the queue until the session is primed.
                self.pending.enqueue(message);
                self.connect_upstream().await;
            }
            RelayState::Connecting
            | RelayState::AwaitingSetup
            | RelayState::AwaitingInitialTurn { .. } => {
                debug!("queueing message until session is ready");
                self.pending.enqueue(message);
            }
            RelayState::Ready => {
                if self.upstream.is_none() {
                    // Should not occur once ready; queue rather than drop
                    warn!("upstream missing in ready state, queueing message");
                    self.pending.enqueue(message);
                    return;
                }
                match self.forward_user_message(&message).await {
                    Ok(()) => {}
                    Err(RelayError::NotReady) => {
                        self.pending.enqueue(message);
                    }
                    Err(err) => {
                        error!("failed to forward message: {}", err);
                        self.emit(ClientEvent::error(err.to_string())).await;
                    }
                }
            }
            RelayState::Closed => {
                self.emit(ClientEvent::error("Session closed, please reconnect"))
                    .await;
            }
        }
    }

    /// Handle one parsed event from the upstream socket.
    pub async fn handle_upstream_event(&mut self, event: UpstreamEvent) {
        match event {
            UpstreamEvent::SetupComplete => self.on_setup_complete().await,
            UpstreamEvent::Content(content) => self.on_server_content(content).await,
            UpstreamEvent::Protocol(detail) => {
                warn!("malformed upstream frame: {}", detail);
                self.emit(ClientEvent::error("Error processing Gemini response"))
                    .await;
            }
            UpstreamEvent::Closed { code, reason } => {
                if self.state == RelayState::Closed {
                    return;
                }
                info!("upstream closed (code {:?}, reason {:?})", code, reason);
                self.emit(ClientEvent::error(format!(
                    "Gemini connection closed (code {}): {}",
                    code.map(|c| c.to_string()).unwrap_or_else(|| "none".to_string()),
                    reason
                )))
                .await;
                self.shutdown_upstream();
                self.state = RelayState::Closed;
            }
            UpstreamEvent::TransportError(detail) => {
                if self.state == RelayState::Closed {
                    return;
                }
                error!("upstream transport error: {}", detail);
                self.emit(ClientEvent::error(format!("Gemini connection error: {}", detail)))
                    .await;
                self.shutdown_upstream();
                self.state = RelayState::Closed;
            }
        }
    }

    /// Close the session. Idempotent: the second call is a no-op and emits
    /// nothing.
    pub fn close(&mut self) {
        if self.state == RelayState::Closed {
            return;
        }
        info!(
            "closing relay session for user {} (companion {})",
            self.user_pid, self.profile.code
        );
        self.shutdown_upstream();
        self.pending.clear();
        self.state = RelayState::Closed;
    }

    async fn connect_upstream(&mut self) {
        self.state = RelayState::Connecting;
        info!(
            "opening upstream connection for user {} (companion {})",
            self.user_pid, self.profile.code
        );

        match self.connector.open(&self.profile).await {
            Ok(handle) => {
                self.upstream = Some(handle);
                self.emit(ClientEvent::connected()).await;
                self.state = RelayState::AwaitingSetup;
            }
            Err(err) => {
                error!("upstream connect failed: {}", err);
                self.emit(ClientEvent::error(err.to_string())).await;
                // Queued messages stay put; the next client message
                // triggers another attempt.
                self.upstream = None;
                self.state = RelayState::Idle;
            }
        }
    }

    async fn on_setup_complete(&mut self) {
        if self.state != RelayState::AwaitingSetup {
            warn!("setup complete in unexpected state {:?}", self.state);
            return;
        }

        info!("setup complete received from upstream");
        self.emit(ClientEvent::setup_complete()).await;

        let priming = match self.store.history(&self.user_pid, &self.profile.code).await {
            Ok(history) if !history.is_empty() => {
                let serialized = match serde_json::to_string(&history) {
                    Ok(serialized) => serialized,
                    Err(err) => {
                        error!("failed to serialize chat history: {}", err);
                        self.emit(ClientEvent::error(format!(
                            "Failed to fetch chat history: {}",
                            err
                        )))
                        .await;
                        return self.prime_with_greeting().await;
                    }
                };
                let context = format!("{}{}", HISTORY_CONTEXT_PREAMBLE, serialized);
                info!("replaying {} stored messages as context", history.len());
                if let Err(err) = self.send_upstream(&context).await {
                    return self.fail_priming(err).await;
                }
                Priming::HistoryReplay
            }
            Ok(_) => {
                info!("no chat history found, sending greeting primer");
                if let Err(err) = self.send_upstream(GREETING_PRIMER).await {
                    return self.fail_priming(err).await;
                }
                Priming::Greeting
            }
            Err(err) => {
                error!("failed to fetch chat history: {}", err);
                self.emit(ClientEvent::error(format!(
                    "Failed to fetch chat history: {}",
                    err
                )))
                .await;
                // Degrade to the greeting path so the session still
                // reaches its ready state.
                return self.prime_with_greeting().await;
            }
        };

        self.state = RelayState::AwaitingInitialTurn { priming };
    }

    async fn prime_with_greeting(&mut self) {
        if let Err(err) = self.send_upstream(GREETING_PRIMER).await {
            return self.fail_priming(err).await;
        }
        self.state = RelayState::AwaitingInitialTurn {
            priming: Priming::Greeting,
        };
    }

    async fn fail_priming(&mut self, err: RelayError) {
        error!("failed to send priming message: {}", err);
        self.emit(ClientEvent::error(err.to_string())).await;
        self.shutdown_upstream();
        self.state = RelayState::Closed;
    }

    async fn on_server_content(&mut self, content: ServerContent) {
        if let Some(model_turn) = content.model_turn {
            let mut buffered = 0usize;
            for part in model_turn.parts {
                // Non-text payloads (inline media) are discarded
                if part.inline_data.is_some() {
                    continue;
                }
                if let Some(text) = part.text {
                    if !text.is_empty() {
                        self.turn.push(text);
                        buffered += 1;
                    }
                }
            }
            if buffered == 0 {
                debug!("no text parts in model turn");
            }
        }

        if content.interrupted {
            debug!("model turn interrupted");
        }

        if content.turn_complete {
            let output = self.turn.take();
            self.on_turn_complete(output).await;
        }
    }

    async fn on_turn_complete(&mut self, output: String) {
        match self.state {
            RelayState::AwaitingInitialTurn {
                priming: Priming::Greeting,
            } => {
                // Side effect of priming, not a real reply
                debug!("discarding priming turn output");
                self.state = RelayState::Ready;
                self.drain_pending().await;
            }
            RelayState::AwaitingInitialTurn {
                priming: Priming::HistoryReplay,
            } => {
                info!("delivering initial response to client");
                self.emit(ClientEvent::response(output.clone())).await;
                self.persist(Sender::Companion, &output).await;
                self.state = RelayState::Ready;
                self.drain_pending().await;
            }
            RelayState::Ready => {
                self.emit(ClientEvent::response(output.clone())).await;
                self.persist(Sender::Companion, &output).await;
            }
            other => {
                warn!("turn completed in unexpected state {:?}", other);
            }
        }
    }

    async fn drain_pending(&mut self) {
        let mut messages: std::collections::VecDeque<String> =
            self.pending.drain_all().into();
        if messages.is_empty() {
            return;
        }
        info!("dispatching {} queued messages", messages.len());

        while let Some(message) = messages.pop_front() {
            if let Err(err) = self.forward_user_message(&message).await {
                error!("failed to dispatch queued message: {}", err);
                self.emit(ClientEvent::error(err.to_string())).await;
                let mut rest = vec![message];
                rest.extend(messages);
                self.pending.requeue_front(rest);
                return;
            }
        }
    }

    /// Forward a user message upstream, then record it. Persistence
    /// failures are surfaced as warnings and do not retract the send.
    async fn forward_user_message(&mut self, message: &str) -> Result<(), RelayError> {
        self.send_upstream(message).await?;
        self.persist(Sender::User, message).await;
        Ok(())
    }

    async fn send_upstream(&mut self, text: &str) -> Result<(), RelayError> {
        let handle = self.upstream.as_ref().ok_or(RelayError::NotReady)?;
        let frame = serde_json::to_string(&ClientContentMessage::user_text(text))
            .map_err(|err| RelayError::Protocol(err.to_string()))?;
        handle.send(frame).await
    }

    async fn persist(&mut self, sender: Sender, content: &str) {
        let message = NewChatMessage::new(sender, content);
        if let Err(err) = self
            .store
            .append_message(&self.user_pid, &self.profile.code, message)
            .await
        {
            error!(
                "failed to persist {} message for user {}: {}",
                sender, self.user_pid, err
            );
            let label = match sender {
                Sender::User => "user",
                Sender::Companion => "AI",
            };
            self.emit(ClientEvent::error(format!(
                "Failed to save {} message: {}",
                label, err
            )))
            .await;
        }
    }

    fn shutdown_upstream(&mut self) {
        if let Some(handle) = self.upstream.take() {
            handle.close();
        }
    }

    async fn emit(&self, event: ClientEvent) {
        // The receiver disappears when the client socket goes away; frames
        // emitted after that are dropped on the floor.
        let _ = self.client.send(event).await;
    }
}
