//! User and token models for storage.

use serde::{Deserialize, Serialize};

/// User account stored in Firestore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Login name (also used as document ID)
    pub username: String,
    /// bcrypt hash (salt embedded)
    pub password_hash: String,
    /// When the account was registered
    pub created_at: String,
}

/// OAuth access token for a device-data provider.
///
/// One document per provider; every exchange or refresh overwrites it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    /// Always "access_token"
    #[serde(rename = "type")]
    pub kind: String,
    /// Bearer token
    pub token: String,
    /// When the token was stored (ISO 8601)
    pub timestamp: String,
    /// Refresh token, if the provider issued one
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// When the access token expires (ISO 8601)
    #[serde(default)]
    pub expires_at: Option<String>,
}

impl AccessToken {
    pub const KIND: &'static str = "access_token";

    pub fn new(token: String, refresh_token: Option<String>, expires_at: Option<String>) -> Self {
        Self {
            kind: Self::KIND.to_string(),
            token,
            timestamp: crate::time_utils::now_rfc3339(),
            refresh_token,
            expires_at,
        }
    }
}
