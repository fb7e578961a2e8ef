//! Durable, encrypted storage for per-user OAuth2 grants.
//!
//! One record per (user, provider) pair, unique on that composite key.
//! Access and refresh tokens are encrypted separately with distinct nonces
//! by [`crate::crypto::CredentialCipher`] before they touch SQLite, and
//! decrypted transparently on read. The status path reads metadata only
//! and never decrypts token columns.
//!
//! # Security
//! - Tokens encrypted at rest (AES-256-GCM, key rotation supported)
//! - Refresh tokens never leave this module and the lifecycle manager
//! - SQLite ACID guarantees prevent partial updates

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scopes::Provider;

mod storage;

pub use storage::CredentialStore;

/// One user's grant for one provider, decrypted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub user_id: String,
    pub provider: Provider,

    /// Short-lived bearer credential for provider API calls
    pub access_token: String,

    /// Long-lived credential for minting new access tokens; absence means
    /// refresh is impossible once the access token expires
    pub refresh_token: Option<String>,

    /// Instant after which `access_token` must be treated as unusable
    pub expires_at: DateTime<Utc>,

    /// Granted permission scopes, order-preserving
    pub scope: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating or replacing a grant.
#[derive(Clone, Debug)]
pub struct NewCredential {
    pub user_id: String,
    pub provider: Provider,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub scope: Vec<String>,
}

/// Grant metadata exposed to status queries. Carries no token material.
#[derive(Clone, Debug, Serialize)]
pub struct CredentialStatus {
    pub expires_at: DateTime<Utc>,
    pub scope: Vec<String>,
}
