//! HTTP API for the credential lifecycle.
//!
//! Thin plumbing over [`TokenLifecycleManager`]: request parsing, error
//! mapping, and response shaping. Responses never include access tokens,
//! refresh tokens, or key material.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::Error;
use crate::oauth::TokenLifecycleManager;
use crate::scopes::Provider;

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// HTTP-facing error wrapper mapping domain errors to status codes
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::UnsupportedProvider(_) | Error::EmptyPlaintext | Error::InvalidEncryptedData => {
                StatusCode::BAD_REQUEST
            }
            Error::InvalidState => StatusCode::UNAUTHORIZED,
            Error::CredentialNotFound => StatusCode::NOT_FOUND,
            Error::CodeExchange(_) | Error::RefreshFailed(_) => StatusCode::BAD_GATEWAY,
            Error::ProviderNotConfigured(_)
            | Error::RefreshUnavailable
            | Error::Decryption
            | Error::InvalidKey(_)
            | Error::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

/// Shared application state for the OAuth API
#[derive(Clone)]
pub struct ApiState {
    pub manager: Arc<TokenLifecycleManager>,
}

/// Create the OAuth API router
pub fn create_oauth_router(state: ApiState) -> Router {
    Router::new()
        .route("/oauth/:provider", get(authorize).delete(revoke))
        .route("/oauth/:provider/status", get(status))
        .route("/oauth/callback/:provider", get(callback))
        .with_state(Arc::new(state))
}

#[derive(Deserialize)]
struct AuthorizeQuery {
    user_id: String,
    /// Comma-separated requested scopes; defaults to the provider allow-list
    scopes: Option<String>,
}

#[derive(Serialize)]
struct AuthorizeResponse {
    auth_url: String,
    state: String,
}

/// GET /oauth/:provider?user_id=&scopes=
///
/// Initiates the flow: returns the provider authorization URL and the CSRF
/// state bound to this user.
async fn authorize(
    State(state): State<Arc<ApiState>>,
    Path(provider): Path<String>,
    Query(query): Query<AuthorizeQuery>,
) -> Result<Json<AuthorizeResponse>, ApiError> {
    let provider = Provider::from_str(&provider)?;

    let requested: Vec<String> = match &query.scopes {
        Some(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        None => crate::scopes::allowed_scopes(provider)
            .iter()
            .map(|s| s.to_string())
            .collect(),
    };

    debug!(%provider, user_id = %query.user_id, "Authorization requested");

    let request = state
        .manager
        .begin_authorization(&query.user_id, provider, &requested)?;

    Ok(Json(AuthorizeResponse {
        auth_url: request.auth_url,
        state: request.state,
    }))
}

/// OAuth callback query parameters
#[derive(Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Serialize)]
struct CallbackResponse {
    success: bool,
    user_id: String,
    provider: Provider,
    scope: Vec<String>,
}

/// GET /oauth/callback/:provider
///
/// Provider redirect target. A provider-reported `error` short-circuits
/// before any exchange. On success returns the grant's owner and scope,
/// never the tokens themselves.
async fn callback(
    State(state): State<Arc<ApiState>>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Result<Json<CallbackResponse>, ApiError> {
    // Reject early but still validate the provider segment
    Provider::from_str(&provider)?;

    if let Some(error) = query.error {
        let description = query
            .error_description
            .unwrap_or_else(|| "unknown error".to_string());
        warn!(%provider, error = %error, "Provider reported authorization error");
        return Err(ApiError::bad_request(format!(
            "OAuth authorization failed: {} - {}",
            error, description
        )));
    }

    let code = query
        .code
        .ok_or_else(|| ApiError::bad_request("Missing 'code' parameter"))?;
    let csrf_state = query
        .state
        .ok_or_else(|| ApiError::bad_request("Missing 'state' parameter"))?;

    let record = state.manager.complete_authorization(&code, &csrf_state).await?;

    Ok(Json(CallbackResponse {
        success: true,
        user_id: record.user_id,
        provider: record.provider,
        scope: record.scope,
    }))
}

#[derive(Deserialize)]
struct UserQuery {
    user_id: String,
}

/// GET /oauth/:provider/status?user_id=
///
/// Connection status without token material.
async fn status(
    State(state): State<Arc<ApiState>>,
    Path(provider): Path<String>,
    Query(query): Query<UserQuery>,
) -> Result<Json<crate::oauth::ConnectionStatus>, ApiError> {
    let provider = Provider::from_str(&provider)?;
    let status = state.manager.status(&query.user_id, provider)?;
    Ok(Json(status))
}

#[derive(Serialize)]
struct RevokeResponse {
    success: bool,
    message: String,
}

/// DELETE /oauth/:provider?user_id=
///
/// Deletes the stored grant. Idempotent; always reports success.
async fn revoke(
    State(state): State<Arc<ApiState>>,
    Path(provider): Path<String>,
    Query(query): Query<UserQuery>,
) -> Result<Json<RevokeResponse>, ApiError> {
    let provider = Provider::from_str(&provider)?;
    state.manager.revoke(&query.user_id, provider)?;

    Ok(Json(RevokeResponse {
        success: true,
        message: format!("Disconnected {}", provider),
    }))
}
