//! SecretEcho backend library.
//!
//! Exposes the server internals so integration tests and auxiliary
//! binaries can construct the application programmatically.

pub mod api;
pub mod auth;
pub mod chat;
pub mod companion;
pub mod db;
pub mod relay;
pub mod user;
pub mod ws;
