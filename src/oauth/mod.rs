//! OAuth 2.0 credential lifecycle.
//!
//! Authorization code flow:
//! 1. Caller requests authorization for a user and scope set
//! 2. Scopes are filtered through the provider allow-list
//! 3. A single-use CSRF state is issued and bound to the user
//! 4. User consents on the provider's site
//! 5. Callback consumes the state and exchanges the code for tokens
//! 6. Tokens are encrypted and persisted; later API use refreshes
//!    just-in-time behind a per-credential lock

mod exchange;
mod manager;
mod provider;
mod state;

pub use exchange::{RefreshResponse, TokenClient, TokenResponse, UserInfo};
pub use manager::{AuthorizationRequest, ConnectionStatus, TokenLifecycleManager};
pub use provider::{
    build_auth_url, credentials_from_env, endpoints, ProviderCredentials, ProviderEndpoints,
};
pub use state::{run_state_sweeper, StateEntry, StateStore};
