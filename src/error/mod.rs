//! Error taxonomy for the credential lifecycle.
//!
//! Every failure a caller can act on gets its own variant. Variants never
//! carry token values, refresh tokens, or key material in their payloads.

use std::fmt;

/// Credential lifecycle errors
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Provider name is not in the supported set
    UnsupportedProvider(String),
    /// Provider is supported but has no client id/secret configured
    ProviderNotConfigured(String),
    /// CSRF state is missing, already consumed, or past its TTL
    InvalidState,
    /// Provider rejected the authorization code (expired, already used, forged)
    CodeExchange(String),
    /// Provider rejected the refresh exchange
    RefreshFailed(String),
    /// No stored grant for this user and provider
    CredentialNotFound,
    /// Access token expired and no refresh token is on file; re-authorization required
    RefreshUnavailable,
    /// Plaintext handed to the cipher was empty
    EmptyPlaintext,
    /// Encrypted blob is missing a field or is not valid base64
    InvalidEncryptedData,
    /// Ciphertext failed authentication under both current and previous keys
    Decryption,
    /// Encryption key is not base64 or not 32 bytes
    InvalidKey(String),
    /// Credential store operation failed
    Storage(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnsupportedProvider(name) => {
                write!(f, "Provider '{}' is not supported", name)
            }
            Error::ProviderNotConfigured(name) => {
                write!(f, "OAuth client credentials not configured for provider '{}'", name)
            }
            Error::InvalidState => write!(f, "Invalid or expired OAuth state"),
            Error::CodeExchange(msg) => write!(f, "Authorization code exchange failed: {}", msg),
            Error::RefreshFailed(msg) => write!(f, "Token refresh failed: {}", msg),
            Error::CredentialNotFound => write!(f, "No stored credential for this user and provider"),
            Error::RefreshUnavailable => {
                write!(f, "Access token expired and no refresh token is available")
            }
            Error::EmptyPlaintext => write!(f, "Cannot encrypt empty plaintext"),
            Error::InvalidEncryptedData => write!(f, "Encrypted data is missing or malformed"),
            Error::Decryption => write!(f, "Decryption failed with all configured keys"),
            Error::InvalidKey(msg) => write!(f, "Invalid encryption key: {}", msg),
            Error::Storage(msg) => write!(f, "Credential storage error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
