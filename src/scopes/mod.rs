//! Provider registry and scope allow-listing.
//!
//! Scopes are allow-listed (not deny-listed) per provider so a compromised
//! or misconfigured caller cannot escalate permissions. Unknown scopes are
//! silently dropped rather than failing the whole authorization request;
//! an empty result means "no usable permissions", not an error.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported OAuth2 providers (closed set)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Facebook,
    Instagram,
    Whatsapp,
    Outlook,
    Asana,
    Notion,
    Calendly,
    Linkedin,
}

impl Provider {
    /// All supported providers
    pub const ALL: [Provider; 9] = [
        Provider::Google,
        Provider::Facebook,
        Provider::Instagram,
        Provider::Whatsapp,
        Provider::Outlook,
        Provider::Asana,
        Provider::Notion,
        Provider::Calendly,
        Provider::Linkedin,
    ];

    /// Lowercase provider name (used in URLs and storage)
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Facebook => "facebook",
            Provider::Instagram => "instagram",
            Provider::Whatsapp => "whatsapp",
            Provider::Outlook => "outlook",
            Provider::Asana => "asana",
            Provider::Notion => "notion",
            Provider::Calendly => "calendly",
            Provider::Linkedin => "linkedin",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google" => Ok(Provider::Google),
            "facebook" => Ok(Provider::Facebook),
            "instagram" => Ok(Provider::Instagram),
            "whatsapp" => Ok(Provider::Whatsapp),
            "outlook" => Ok(Provider::Outlook),
            "asana" => Ok(Provider::Asana),
            "notion" => Ok(Provider::Notion),
            "calendly" => Ok(Provider::Calendly),
            "linkedin" => Ok(Provider::Linkedin),
            other => Err(Error::UnsupportedProvider(other.to_string())),
        }
    }
}

/// Full scope allow-list for a provider.
///
/// Static policy data; a scope absent from this list is never granted.
pub fn allowed_scopes(provider: Provider) -> &'static [&'static str] {
    match provider {
        Provider::Google => &[
            "https://www.googleapis.com/auth/userinfo.email",
            "https://www.googleapis.com/auth/userinfo.profile",
            "https://www.googleapis.com/auth/gmail.send",
            "https://www.googleapis.com/auth/gmail.readonly",
            "https://www.googleapis.com/auth/gmail.modify",
            "https://www.googleapis.com/auth/gmail.compose",
            "https://www.googleapis.com/auth/spreadsheets",
            "https://www.googleapis.com/auth/spreadsheets.readonly",
            "https://www.googleapis.com/auth/documents",
            "https://www.googleapis.com/auth/documents.readonly",
            "https://www.googleapis.com/auth/calendar",
            "https://www.googleapis.com/auth/calendar.readonly",
            "https://www.googleapis.com/auth/calendar.events",
        ],
        Provider::Facebook => &[
            "email",
            "public_profile",
            "pages_manage_posts",
            "pages_read_engagement",
        ],
        Provider::Instagram => &[
            "instagram_basic",
            "instagram_content_publish",
            "pages_show_list",
        ],
        Provider::Whatsapp => &["whatsapp_business_management", "whatsapp_business_messaging"],
        Provider::Outlook => &[
            "https://graph.microsoft.com/User.Read",
            "https://graph.microsoft.com/Mail.Read",
            "https://graph.microsoft.com/Mail.Send",
            "https://graph.microsoft.com/Calendars.ReadWrite",
        ],
        Provider::Asana => &["default"],
        Provider::Notion => &["read", "insert", "update"],
        Provider::Calendly => &["default"],
        Provider::Linkedin => &["r_liteprofile", "r_emailaddress", "w_member_social"],
    }
}

/// Filter `requested` down to the provider's allow-list, preserving input order.
///
/// Unknown or injected scopes are dropped silently. Pure function over
/// static policy data.
pub fn validate_scopes(provider: Provider, requested: &[String]) -> Vec<String> {
    let allowed = allowed_scopes(provider);
    requested
        .iter()
        .filter(|scope| allowed.contains(&scope.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_provider_round_trip() {
        for provider in Provider::ALL {
            let parsed: Provider = provider.as_str().parse().unwrap();
            assert_eq!(parsed, provider);
        }
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let err = "tiktok".parse::<Provider>().unwrap_err();
        assert_eq!(err, Error::UnsupportedProvider("tiktok".to_string()));

        assert!("".parse::<Provider>().is_err());
        assert!("Google".parse::<Provider>().is_err()); // case-sensitive
    }

    #[test]
    fn test_validate_returns_intersection_in_order() {
        let requested = strings(&[
            "https://www.googleapis.com/auth/calendar",
            "https://www.googleapis.com/auth/gmail.send",
            "https://www.googleapis.com/auth/userinfo.email",
        ]);

        let valid = validate_scopes(Provider::Google, &requested);
        assert_eq!(valid, requested); // all allowed, order preserved
    }

    #[test]
    fn test_validate_drops_unknown_scopes() {
        let requested = strings(&[
            "https://www.googleapis.com/auth/gmail.send",
            "https://evil.example.com/steal-everything",
            "https://www.googleapis.com/auth/calendar",
        ]);

        let valid = validate_scopes(Provider::Google, &requested);
        assert_eq!(
            valid,
            strings(&[
                "https://www.googleapis.com/auth/gmail.send",
                "https://www.googleapis.com/auth/calendar",
            ])
        );
    }

    #[test]
    fn test_validate_empty_and_all_invalid_return_empty() {
        assert!(validate_scopes(Provider::Google, &[]).is_empty());

        let all_invalid = strings(&["bogus", "also-bogus"]);
        assert!(validate_scopes(Provider::Google, &all_invalid).is_empty());
    }

    #[test]
    fn test_validate_never_returns_out_of_list_scope() {
        let requested = strings(&["pages_manage_posts", "email", "not-a-scope"]);
        let valid = validate_scopes(Provider::Facebook, &requested);

        let allowed = allowed_scopes(Provider::Facebook);
        for scope in &valid {
            assert!(allowed.contains(&scope.as_str()));
        }
        assert_eq!(valid, strings(&["pages_manage_posts", "email"]));
    }

    #[test]
    fn test_every_provider_has_allow_list() {
        for provider in Provider::ALL {
            assert!(!allowed_scopes(provider).is_empty());
        }
    }
}
