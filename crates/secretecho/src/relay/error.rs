//! Relay error taxonomy.

use thiserror::Error;

use crate::chat::ChatStoreError;

/// Errors produced inside a relay session.
///
/// Every variant is caught at the boundary that produced it and converted
/// into a client-visible `{"error": ...}` frame; none crashes the session
/// task.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Upstream socket could not be reached or the handshake failed.
    /// Reported to the client; the session retries on the next message.
    #[error("Failed to connect to Gemini API: {0}")]
    Connection(String),

    /// Malformed frame from either side. Logged and surfaced, the
    /// connection continues.
    #[error("{0}")]
    Protocol(String),

    /// Send attempted without an open, set-up upstream. Callers queue the
    /// message instead of surfacing this to the client.
    #[error("Gemini WebSocket is not connected or setup not complete")]
    NotReady,

    /// Chat store unavailable or a write failed. Non-fatal: surfaced as a
    /// warning after any already-produced response.
    #[error("persistence error: {0}")]
    Persistence(#[from] ChatStoreError),
}
