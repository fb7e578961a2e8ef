//! Typed client for provider token and user-info endpoints.
//!
//! Provider responses are deserialized into explicit structs at the
//! boundary so unexpected shapes fail fast instead of propagating
//! loosely-typed data inward. Requests carry a timeout; a timeout is a
//! retryable transient failure, not credential invalidation.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::Error;
use crate::oauth::provider::{ProviderCredentials, ProviderEndpoints};

/// Token endpoint response for an authorization-code exchange
#[derive(Deserialize, Debug)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Token endpoint response for a refresh exchange
#[derive(Deserialize, Debug)]
pub struct RefreshResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Provider identity echo (best-effort, shape varies per provider)
#[derive(Deserialize, Debug)]
pub struct UserInfo {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// HTTP client for the provider's OAuth2 endpoints.
#[derive(Clone)]
pub struct TokenClient {
    http: Client,
}

impl TokenClient {
    /// Build a client with a request timeout applied to every call.
    pub fn new(timeout_seconds: u64) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { http })
    }

    /// Exchange an authorization code for tokens.
    ///
    /// Provider rejection (expired or already-used code), timeouts, and
    /// malformed responses all surface as [`Error::CodeExchange`].
    pub async fn exchange_code(
        &self,
        endpoints: &ProviderEndpoints,
        credentials: &ProviderCredentials,
        code: &str,
    ) -> Result<TokenResponse, Error> {
        let mut form = HashMap::new();
        form.insert("grant_type", "authorization_code");
        form.insert("code", code);
        form.insert("redirect_uri", credentials.redirect_uri.as_str());
        form.insert("client_id", credentials.client_id.as_str());
        form.insert("client_secret", credentials.client_secret.as_str());

        tracing::debug!(token_url = %endpoints.token_url, "Exchanging authorization code");

        let response = self
            .http
            .post(&endpoints.token_url)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::CodeExchange(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(Error::CodeExchange(format!("status {}: {}", status, body)));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| Error::CodeExchange(format!("unexpected response shape: {}", e)))
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// The refresh token value is never logged or echoed into the error.
    pub async fn refresh(
        &self,
        endpoints: &ProviderEndpoints,
        credentials: &ProviderCredentials,
        refresh_token: &str,
    ) -> Result<RefreshResponse, Error> {
        let mut form = HashMap::new();
        form.insert("grant_type", "refresh_token");
        form.insert("refresh_token", refresh_token);
        form.insert("client_id", credentials.client_id.as_str());
        form.insert("client_secret", credentials.client_secret.as_str());

        tracing::debug!(token_url = %endpoints.token_url, "Refreshing access token");

        let response = self
            .http
            .post(&endpoints.token_url)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::RefreshFailed(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::RefreshFailed(format!(
                "status {}",
                response.status()
            )));
        }

        response
            .json::<RefreshResponse>()
            .await
            .map_err(|e| Error::RefreshFailed(format!("unexpected response shape: {}", e)))
    }

    /// Fetch the provider's view of the authorizing user.
    ///
    /// Best-effort: callers treat failure as non-fatal.
    pub async fn fetch_user_info(&self, user_info_url: &str, access_token: &str) -> Result<UserInfo> {
        let response = self
            .http
            .get(user_info_url)
            .bearer_auth(access_token)
            .send()
            .await
            .context("Failed to send user-info request")?;

        if !response.status().is_success() {
            anyhow::bail!("user-info request returned status {}", response.status());
        }

        response
            .json::<UserInfo>()
            .await
            .context("Failed to parse user-info response")
    }
}
