//! Credential lifecycle orchestration.
//!
//! Drives a grant through its states: authorization URL generation,
//! code-for-token exchange on callback, just-in-time refresh on use, and
//! revocation. All collaborators (state store, credential store, token
//! client) are injected and owned; there is no ambient global state.

use chrono::{Duration, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::credentials::{CredentialRecord, CredentialStore, NewCredential};
use crate::error::Error;
use crate::oauth::exchange::TokenClient;
use crate::oauth::provider::{self, ProviderCredentials, ProviderEndpoints};
use crate::oauth::state::StateStore;
use crate::scopes::{self, Provider};

/// Fallback lifetime when the provider omits `expires_in` (seconds)
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Result of initiating an authorization: where to send the user, and the
/// CSRF state the callback must echo.
#[derive(Clone, Debug)]
pub struct AuthorizationRequest {
    pub auth_url: String,
    pub state: String,
}

/// Connection status for a (user, provider) pair. Never carries tokens.
#[derive(Clone, Debug, serde::Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<chrono::DateTime<Utc>>,
    pub scope: Vec<String>,
}

/// Orchestrates the OAuth2 credential lifecycle.
pub struct TokenLifecycleManager {
    store: Arc<CredentialStore>,
    states: StateStore,
    token_client: TokenClient,
    base_url: String,

    /// Per-provider endpoint overrides, for deployments that front the
    /// provider with a gateway (and for tests against a local server)
    endpoint_overrides: HashMap<Provider, ProviderEndpoints>,

    /// Per-(user, provider) locks serializing refresh attempts
    refresh_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl TokenLifecycleManager {
    pub fn new(
        store: Arc<CredentialStore>,
        states: StateStore,
        token_client: TokenClient,
        base_url: String,
    ) -> Self {
        Self {
            store,
            states,
            token_client,
            base_url,
            endpoint_overrides: HashMap::new(),
            refresh_locks: DashMap::new(),
        }
    }

    /// Route all OAuth2 calls for `provider` to explicit endpoints instead
    /// of the well-known ones.
    pub fn with_provider_endpoints(
        mut self,
        provider: Provider,
        endpoints: ProviderEndpoints,
    ) -> Self {
        self.endpoint_overrides.insert(provider, endpoints);
        self
    }

    /// Begin an authorization: validate scopes, issue CSRF state, compose
    /// the provider authorization URL. Persists nothing.
    ///
    /// An empty validated scope set is returned as-is; the caller decides
    /// whether "no usable permissions" is worth redirecting for.
    pub fn begin_authorization(
        &self,
        user_id: &str,
        provider: Provider,
        requested_scopes: &[String],
    ) -> Result<AuthorizationRequest, Error> {
        let scopes = scopes::validate_scopes(provider, requested_scopes);
        if scopes.len() < requested_scopes.len() {
            warn!(
                %provider,
                requested = requested_scopes.len(),
                allowed = scopes.len(),
                "Dropped scopes outside the provider allow-list"
            );
        }

        let credentials = self.provider_credentials(provider)?;
        let endpoints = self.provider_endpoints(provider);

        let state = self.states.issue(user_id, provider, scopes.clone());
        let auth_url = provider::build_auth_url(&endpoints, &credentials, &scopes, &state);

        debug!(%provider, user_id = %user_id, "Authorization URL issued");

        Ok(AuthorizationRequest { auth_url, state })
    }

    /// Complete an authorization callback: consume the CSRF state, exchange
    /// the code, and persist the grant.
    ///
    /// Replaces any prior grant for the (user, provider) pair; the
    /// superseded tokens are discarded without provider-side revocation.
    pub async fn complete_authorization(
        &self,
        code: &str,
        state: &str,
    ) -> Result<CredentialRecord, Error> {
        let entry = self.states.consume(state).ok_or(Error::InvalidState)?;
        let provider = entry.provider;

        debug!(%provider, user_id = %entry.user_id, "CSRF state validated");

        let credentials = self.provider_credentials(provider)?;
        let endpoints = self.provider_endpoints(provider);

        let token = self
            .token_client
            .exchange_code(&endpoints, &credentials, code)
            .await?;

        // Identity echo is best-effort; the grant is keyed by our user id
        if let Some(user_info_url) = &endpoints.user_info_url {
            match self
                .token_client
                .fetch_user_info(user_info_url, &token.access_token)
                .await
            {
                Ok(user_info) => {
                    debug!(%provider, provider_user = %user_info.id, "Provider identity confirmed")
                }
                Err(e) => warn!(%provider, error = %e, "User-info fetch failed"),
            }
        }

        let expires_in = token.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        let expires_at = Utc::now() + Duration::seconds(expires_in);

        // Prefer the provider's granted scope string, re-filtered through
        // the allow-list; fall back to the validated requested set
        let scope = match &token.scope {
            Some(granted) => {
                let granted: Vec<String> =
                    granted.split_whitespace().map(|s| s.to_string()).collect();
                scopes::validate_scopes(provider, &granted)
            }
            None => entry.scopes,
        };

        let new_credential = NewCredential {
            user_id: entry.user_id.clone(),
            provider,
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at,
            scope,
        };

        self.store
            .upsert(&new_credential)
            .map_err(|e| Error::Storage(e.to_string()))?;

        let record = self
            .store
            .get(&entry.user_id, provider)
            .map_err(|e| Error::Storage(e.to_string()))?
            .ok_or_else(|| Error::Storage("record vanished after upsert".to_string()))?;

        info!(
            %provider,
            user_id = %entry.user_id,
            has_refresh_token = record.refresh_token.is_some(),
            "Authorization completed"
        );

        Ok(record)
    }

    /// Return a usable access token, refreshing it first if expired.
    ///
    /// Refreshes for the same (user, provider) pair are serialized by a
    /// per-key lock with a re-read after acquisition, so concurrent callers
    /// on an expired credential trigger exactly one provider round-trip and
    /// all observe the same refreshed token.
    pub async fn get_valid_access_token(
        &self,
        user_id: &str,
        provider: Provider,
    ) -> Result<String, Error> {
        let record = self
            .store
            .get(user_id, provider)
            .map_err(|e| Error::Storage(e.to_string()))?
            .ok_or(Error::CredentialNotFound)?;

        if Utc::now() < record.expires_at {
            return Ok(record.access_token);
        }

        let lock = {
            let entry = self
                .refresh_locks
                .entry(refresh_key(user_id, provider))
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())));
            entry.clone()
        };
        let _guard = lock.lock().await;

        // A concurrent caller may have refreshed while we waited
        let record = self
            .store
            .get(user_id, provider)
            .map_err(|e| Error::Storage(e.to_string()))?
            .ok_or(Error::CredentialNotFound)?;

        if Utc::now() < record.expires_at {
            return Ok(record.access_token);
        }

        let refresh_token = record.refresh_token.ok_or(Error::RefreshUnavailable)?;

        let credentials = self.provider_credentials(provider)?;
        let endpoints = self.provider_endpoints(provider);

        debug!(%provider, user_id = %user_id, "Access token expired, refreshing");

        let refreshed = self
            .token_client
            .refresh(&endpoints, &credentials, &refresh_token)
            .await?;

        let expires_in = refreshed.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        let expires_at = Utc::now() + Duration::seconds(expires_in);

        self.store
            .update_access_token(user_id, provider, &refreshed.access_token, expires_at)
            .map_err(|e| Error::Storage(e.to_string()))?;

        info!(%provider, user_id = %user_id, "Access token refreshed");

        Ok(refreshed.access_token)
    }

    /// Delete the stored grant. Idempotent; revoking an absent credential
    /// succeeds.
    pub fn revoke(&self, user_id: &str, provider: Provider) -> Result<(), Error> {
        let existed = self
            .store
            .delete(user_id, provider)
            .map_err(|e| Error::Storage(e.to_string()))?;

        info!(%provider, user_id = %user_id, existed, "Credential revoked");
        Ok(())
    }

    /// Connection status for (user, provider), with no token material.
    pub fn status(&self, user_id: &str, provider: Provider) -> Result<ConnectionStatus, Error> {
        let status = self
            .store
            .status(user_id, provider)
            .map_err(|e| Error::Storage(e.to_string()))?;

        Ok(match status {
            Some(status) => ConnectionStatus {
                connected: true,
                is_valid: Utc::now() < status.expires_at,
                expires_at: Some(status.expires_at),
                scope: status.scope,
            },
            None => ConnectionStatus {
                connected: false,
                is_valid: false,
                expires_at: None,
                scope: Vec::new(),
            },
        })
    }

    fn provider_credentials(&self, provider: Provider) -> Result<ProviderCredentials, Error> {
        provider::credentials_from_env(provider, &self.base_url)
            .ok_or_else(|| Error::ProviderNotConfigured(provider.to_string()))
    }

    fn provider_endpoints(&self, provider: Provider) -> ProviderEndpoints {
        self.endpoint_overrides
            .get(&provider)
            .cloned()
            .unwrap_or_else(|| provider::endpoints(provider))
    }
}

fn refresh_key(user_id: &str, provider: Provider) -> String {
    format!("{}:{}", user_id, provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{generate_key, CredentialCipher};

    fn test_manager() -> TokenLifecycleManager {
        let cipher = CredentialCipher::new(&generate_key(), None).unwrap();
        let store = Arc::new(CredentialStore::new(":memory:", cipher).unwrap());
        TokenLifecycleManager::new(
            store,
            StateStore::new(600),
            TokenClient::new(10).unwrap(),
            "http://localhost:3000".to_string(),
        )
    }

    fn set_google_env() {
        std::env::set_var("GRANTOR_OAUTH_GOOGLE_CLIENT_ID", "test-client-id");
        std::env::set_var("GRANTOR_OAUTH_GOOGLE_CLIENT_SECRET", "test-client-secret");
    }

    #[test]
    fn test_begin_authorization_issues_state_and_url() {
        set_google_env();
        let manager = test_manager();

        let request = manager
            .begin_authorization(
                "user1",
                Provider::Google,
                &[
                    "https://www.googleapis.com/auth/gmail.send".to_string(),
                    "https://www.googleapis.com/auth/calendar".to_string(),
                ],
            )
            .unwrap();

        assert_eq!(request.state.len(), 32);
        assert!(request.state.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(request.auth_url.contains("gmail.send"));
        assert!(request.auth_url.contains("calendar"));
        assert!(request.auth_url.contains(&request.state));
        assert!(request.auth_url.contains("access_type=offline"));
        assert!(request.auth_url.contains("prompt=consent"));
    }

    #[test]
    fn test_begin_authorization_filters_scopes() {
        set_google_env();
        let manager = test_manager();

        let request = manager
            .begin_authorization(
                "user1",
                Provider::Google,
                &[
                    "https://www.googleapis.com/auth/gmail.send".to_string(),
                    "https://evil.example.com/everything".to_string(),
                ],
            )
            .unwrap();

        assert!(!request.auth_url.contains("evil.example.com"));
    }

    #[test]
    fn test_begin_authorization_unconfigured_provider() {
        let manager = test_manager();

        let err = manager
            .begin_authorization("user1", Provider::Calendly, &[])
            .unwrap_err();
        assert_eq!(err, Error::ProviderNotConfigured("calendly".to_string()));
    }

    #[tokio::test]
    async fn test_complete_authorization_rejects_unknown_state() {
        let manager = test_manager();

        let err = manager
            .complete_authorization("some-code", "deadbeefdeadbeefdeadbeefdeadbeef")
            .await
            .unwrap_err();
        assert_eq!(err, Error::InvalidState);
    }

    #[tokio::test]
    async fn test_get_valid_access_token_missing_credential() {
        let manager = test_manager();

        let err = manager
            .get_valid_access_token("nobody", Provider::Google)
            .await
            .unwrap_err();
        assert_eq!(err, Error::CredentialNotFound);
    }

    #[tokio::test]
    async fn test_get_valid_access_token_unexpired_no_network() {
        let manager = test_manager();

        manager
            .store
            .upsert(&NewCredential {
                user_id: "user1".to_string(),
                provider: Provider::Google,
                access_token: "still-good".to_string(),
                refresh_token: None,
                expires_at: Utc::now() + Duration::hours(1),
                scope: vec![],
            })
            .unwrap();

        let token = manager
            .get_valid_access_token("user1", Provider::Google)
            .await
            .unwrap();
        assert_eq!(token, "still-good");
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token_is_terminal() {
        set_google_env();
        let manager = test_manager();

        manager
            .store
            .upsert(&NewCredential {
                user_id: "user1".to_string(),
                provider: Provider::Google,
                access_token: "expired".to_string(),
                refresh_token: None,
                expires_at: Utc::now() - Duration::hours(1),
                scope: vec![],
            })
            .unwrap();

        let err = manager
            .get_valid_access_token("user1", Provider::Google)
            .await
            .unwrap_err();
        assert_eq!(err, Error::RefreshUnavailable);
    }

    #[test]
    fn test_revoke_is_idempotent() {
        let manager = test_manager();

        // No stored credential: still succeeds
        manager.revoke("user1", Provider::Google).unwrap();

        manager
            .store
            .upsert(&NewCredential {
                user_id: "user1".to_string(),
                provider: Provider::Google,
                access_token: "tok".to_string(),
                refresh_token: None,
                expires_at: Utc::now() + Duration::hours(1),
                scope: vec![],
            })
            .unwrap();

        manager.revoke("user1", Provider::Google).unwrap();
        manager.revoke("user1", Provider::Google).unwrap();
        assert!(manager.store.get("user1", Provider::Google).unwrap().is_none());
    }

    #[test]
    fn test_status_reports_connection_without_tokens() {
        let manager = test_manager();

        let absent = manager.status("user1", Provider::Google).unwrap();
        assert!(!absent.connected);
        assert!(!absent.is_valid);

        manager
            .store
            .upsert(&NewCredential {
                user_id: "user1".to_string(),
                provider: Provider::Google,
                access_token: "secret-token".to_string(),
                refresh_token: Some("secret-refresh".to_string()),
                expires_at: Utc::now() + Duration::hours(1),
                scope: vec!["https://www.googleapis.com/auth/gmail.send".to_string()],
            })
            .unwrap();

        let status = manager.status("user1", Provider::Google).unwrap();
        assert!(status.connected);
        assert!(status.is_valid);
        assert_eq!(status.scope.len(), 1);

        let json = serde_json::to_string(&status).unwrap();
        assert!(!json.contains("secret-token"));
        assert!(!json.contains("secret-refresh"));
    }

    #[test]
    fn test_status_expired_credential_is_connected_but_invalid() {
        let manager = test_manager();

        manager
            .store
            .upsert(&NewCredential {
                user_id: "user1".to_string(),
                provider: Provider::Google,
                access_token: "tok".to_string(),
                refresh_token: None,
                expires_at: Utc::now() - Duration::minutes(5),
                scope: vec![],
            })
            .unwrap();

        let status = manager.status("user1", Provider::Google).unwrap();
        assert!(status.connected);
        assert!(!status.is_valid);
    }
}
