//! WebSocket endpoint for companion chat.

mod handler;

pub use handler::ws_handler;
