//! WebSocket relay between browser clients and the Gemini Live API.
//!
//! Each authenticated client connection gets one [`RelaySession`] that
//! lazily opens a single upstream socket, performs the setup handshake,
//! primes the conversation with stored history (or a silent greeting),
//! assembles streamed fragments into complete turns, and persists both
//! sides of the exchange through the [`crate::chat::ChatStore`] gateway.

mod error;
pub mod protocol;
mod queue;
mod registry;
mod session;
mod turn;
mod upstream;

pub use error::RelayError;
pub use queue::PendingQueue;
pub use registry::{RelayRegistry, RelaySessionInfo};
pub use session::{Priming, RelaySession, RelayState};
pub use turn::TurnBuffer;
pub use upstream::{
    DEFAULT_GEMINI_MODEL, DEFAULT_GEMINI_WS_URL, GeminiConfig, GeminiConnector, UpstreamConnector,
    UpstreamEvent, UpstreamHandle,
};
