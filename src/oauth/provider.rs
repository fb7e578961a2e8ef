//! Provider OAuth2 endpoints and client configuration.
//!
//! Endpoint URLs are static per provider. Client id/secret/redirect come
//! from environment variables so secrets never live in config files.

use crate::scopes::Provider;

/// OAuth2 endpoint set for one provider
#[derive(Clone, Debug)]
pub struct ProviderEndpoints {
    /// Authorization endpoint (user-facing consent page)
    pub auth_url: String,

    /// Token endpoint (code exchange and refresh)
    pub token_url: String,

    /// User-info endpoint, where the provider has one
    pub user_info_url: Option<String>,
}

/// OAuth2 client registration for one provider
#[derive(Clone, Debug)]
pub struct ProviderCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

/// Well-known OAuth2 endpoints for a provider.
pub fn endpoints(provider: Provider) -> ProviderEndpoints {
    let (auth_url, token_url, user_info_url) = match provider {
        Provider::Google => (
            "https://accounts.google.com/o/oauth2/v2/auth",
            "https://oauth2.googleapis.com/token",
            Some("https://www.googleapis.com/oauth2/v2/userinfo"),
        ),
        Provider::Facebook => (
            "https://www.facebook.com/v18.0/dialog/oauth",
            "https://graph.facebook.com/v18.0/oauth/access_token",
            Some("https://graph.facebook.com/me"),
        ),
        Provider::Instagram => (
            "https://api.instagram.com/oauth/authorize",
            "https://api.instagram.com/oauth/access_token",
            None,
        ),
        Provider::Whatsapp => (
            "https://www.facebook.com/v18.0/dialog/oauth",
            "https://graph.facebook.com/v18.0/oauth/access_token",
            None,
        ),
        Provider::Outlook => (
            "https://login.microsoftonline.com/common/oauth2/v2.0/authorize",
            "https://login.microsoftonline.com/common/oauth2/v2.0/token",
            Some("https://graph.microsoft.com/v1.0/me"),
        ),
        Provider::Asana => (
            "https://app.asana.com/-/oauth_authorize",
            "https://app.asana.com/-/oauth_token",
            None,
        ),
        Provider::Notion => (
            "https://api.notion.com/v1/oauth/authorize",
            "https://api.notion.com/v1/oauth/token",
            None,
        ),
        Provider::Calendly => (
            "https://auth.calendly.com/oauth/authorize",
            "https://auth.calendly.com/oauth/token",
            None,
        ),
        Provider::Linkedin => (
            "https://www.linkedin.com/oauth/v2/authorization",
            "https://www.linkedin.com/oauth/v2/accessToken",
            Some("https://api.linkedin.com/v2/me"),
        ),
    };

    ProviderEndpoints {
        auth_url: auth_url.to_string(),
        token_url: token_url.to_string(),
        user_info_url: user_info_url.map(|u| u.to_string()),
    }
}

/// Load client credentials for a provider from the environment.
///
/// Reads `GRANTOR_OAUTH_<PROVIDER>_CLIENT_ID`, `_CLIENT_SECRET`, and
/// optionally `_REDIRECT_URI`. When the redirect variable is absent the
/// callback defaults to `<base_url>/oauth/callback/<provider>`.
///
/// Returns `None` if client id or secret is not set.
pub fn credentials_from_env(provider: Provider, base_url: &str) -> Option<ProviderCredentials> {
    let env_prefix = provider.as_str().to_uppercase();

    let client_id = std::env::var(format!("GRANTOR_OAUTH_{}_CLIENT_ID", env_prefix)).ok()?;
    let client_secret = std::env::var(format!("GRANTOR_OAUTH_{}_CLIENT_SECRET", env_prefix)).ok()?;

    let redirect_uri = std::env::var(format!("GRANTOR_OAUTH_{}_REDIRECT_URI", env_prefix))
        .unwrap_or_else(|_| format!("{}/oauth/callback/{}", base_url, provider));

    Some(ProviderCredentials {
        client_id,
        client_secret,
        redirect_uri,
    })
}

/// Compose the provider authorization URL.
///
/// `access_type=offline` and `prompt=consent` are always requested so the
/// provider (re-)issues a refresh token on every authorization.
pub fn build_auth_url(
    endpoints: &ProviderEndpoints,
    credentials: &ProviderCredentials,
    scopes: &[String],
    state: &str,
) -> String {
    let scope = scopes.join(" ");
    format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent&state={}",
        endpoints.auth_url,
        urlencoding::encode(&credentials.client_id),
        urlencoding::encode(&credentials.redirect_uri),
        urlencoding::encode(&scope),
        urlencoding::encode(state)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_credentials() -> ProviderCredentials {
        ProviderCredentials {
            client_id: "test_client_id".to_string(),
            client_secret: "test_secret".to_string(),
            redirect_uri: "http://localhost:3000/oauth/callback/google".to_string(),
        }
    }

    #[test]
    fn test_every_provider_has_endpoints() {
        for provider in Provider::ALL {
            let ep = endpoints(provider);
            assert!(ep.auth_url.starts_with("https://"));
            assert!(ep.token_url.starts_with("https://"));
        }
    }

    #[test]
    fn test_build_auth_url() {
        let ep = endpoints(Provider::Google);
        let scopes = vec![
            "https://www.googleapis.com/auth/gmail.send".to_string(),
            "https://www.googleapis.com/auth/calendar".to_string(),
        ];

        let url = build_auth_url(&ep, &test_credentials(), &scopes, "random_state");

        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(url.contains("client_id=test_client_id"));
        assert!(url.contains(
            "redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Foauth%2Fcallback%2Fgoogle"
        ));
        assert!(url.contains("response_type=code"));
        // Scopes space-joined then url-encoded
        assert!(url.contains("gmail.send%20"));
        assert!(url.contains("calendar"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("prompt=consent"));
        assert!(url.contains("state=random_state"));
        // Secret never appears in the user-facing URL
        assert!(!url.contains("test_secret"));
    }

    #[test]
    fn test_credentials_from_env_missing() {
        // No env vars set for calendly in the test environment
        assert!(credentials_from_env(Provider::Calendly, "http://localhost:3000").is_none());
    }

    #[test]
    fn test_credentials_from_env_with_default_redirect() {
        std::env::set_var("GRANTOR_OAUTH_ASANA_CLIENT_ID", "asana-id");
        std::env::set_var("GRANTOR_OAUTH_ASANA_CLIENT_SECRET", "asana-secret");

        let creds = credentials_from_env(Provider::Asana, "https://api.example.com").unwrap();
        assert_eq!(creds.client_id, "asana-id");
        assert_eq!(
            creds.redirect_uri,
            "https://api.example.com/oauth/callback/asana"
        );

        std::env::remove_var("GRANTOR_OAUTH_ASANA_CLIENT_ID");
        std::env::remove_var("GRANTOR_OAUTH_ASANA_CLIENT_SECRET");
    }
}
