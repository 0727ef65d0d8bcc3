//! JWT claims.

use serde::{Deserialize, Serialize};

/// Claims carried by a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user's public id.
    pub sub: String,

    /// Auth session public id.
    pub sid: String,

    /// Expiration time (Unix timestamp).
    pub exp: i64,

    /// Issued at (Unix timestamp).
    #[serde(default)]
    pub iat: Option<i64>,
}
