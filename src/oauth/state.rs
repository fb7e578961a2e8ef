//! CSRF state registry for the authorization handshake.
//!
//! Binds each authorization request to the user who initiated it via a
//! random single-use token. A state value is consumable exactly once;
//! lookup and delete happen under one lock acquisition so two concurrent
//! callbacks can never both succeed with the same token.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::{Arc, Mutex};

use crate::scopes::Provider;

/// Bytes of entropy per state token (rendered as 32 hex characters)
const STATE_TOKEN_BYTES: usize = 16;

/// Identity and scope set bound to one pending authorization
#[derive(Clone, Debug)]
pub struct StateEntry {
    pub user_id: String,
    pub provider: Provider,
    pub scopes: Vec<String>,
    pub issued_at: DateTime<Utc>,
}

/// In-memory CSRF state store with TTL-based expiry.
///
/// Process-local by design; a multi-replica deployment must back this with
/// a shared TTL-capable cache or callbacks served by another replica will
/// fail validation.
#[derive(Clone)]
pub struct StateStore {
    states: Arc<Mutex<HashMap<String, StateEntry>>>,
    ttl: Duration,
}

impl StateStore {
    /// Create a state store.
    ///
    /// # Arguments
    /// * `ttl_seconds` - How long unconsumed states remain valid (default: 600)
    pub fn new(ttl_seconds: i64) -> Self {
        Self {
            states: Arc::new(Mutex::new(HashMap::new())),
            ttl: Duration::seconds(ttl_seconds),
        }
    }

    /// Issue a new state token bound to `user_id` and the validated scope set.
    ///
    /// Expired entries are swept opportunistically on each call, so no
    /// background task is required for correctness.
    pub fn issue(&self, user_id: &str, provider: Provider, scopes: Vec<String>) -> String {
        let token = random_state_token();
        let entry = StateEntry {
            user_id: user_id.to_string(),
            provider,
            scopes,
            issued_at: Utc::now(),
        };

        let mut states = self.states.lock().unwrap();

        // Amortized cleanup
        let cutoff = Utc::now() - self.ttl;
        states.retain(|_, e| e.issued_at > cutoff);

        states.insert(token.clone(), entry);
        token
    }

    /// Atomically look up and delete a state token (single-use).
    ///
    /// Returns `None` for unknown, already-consumed, or expired tokens.
    /// An expired entry is removed but not honored.
    pub fn consume(&self, state: &str) -> Option<StateEntry> {
        let mut states = self.states.lock().unwrap();

        let entry = states.remove(state)?;

        if Utc::now() - entry.issued_at > self.ttl {
            return None;
        }

        Some(entry)
    }

    /// Remove all expired entries.
    pub fn sweep_expired(&self) {
        let mut states = self.states.lock().unwrap();
        let cutoff = Utc::now() - self.ttl;
        states.retain(|_, entry| entry.issued_at > cutoff);
    }

    /// Number of pending states (monitoring)
    pub fn len(&self) -> usize {
        self.states.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn random_state_token() -> String {
    let mut bytes = [0u8; STATE_TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);

    bytes.iter().fold(
        String::with_capacity(STATE_TOKEN_BYTES * 2),
        |mut out, b| {
            let _ = write!(out, "{:02x}", b);
            out
        },
    )
}

/// Background task to periodically sweep expired states (best-effort
/// housekeeping on top of the sweep done in `issue`).
pub async fn run_state_sweeper(store: StateStore, interval_seconds: u64) {
    let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(interval_seconds));

    loop {
        interval.tick().await;
        store.sweep_expired();
        tracing::debug!(pending = store.len(), "OAuth state sweep complete");
    }
}
