//! User accounts and auth sessions.

mod models;
mod repository;
mod service;

pub use models::{AuthSession, SignupRequest, User};
pub use repository::{AuthSessionRepository, UserRepository};
pub use service::{TokenResponse, UserService};
