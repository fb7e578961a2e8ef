// Error taxonomy
pub mod error;

// Provider registry and scope allow-listing
pub mod scopes;

// At-rest encryption with key rotation
pub mod crypto;

// Encrypted credential storage
pub mod credentials;

// Authorization flow, token exchange, lifecycle management
pub mod oauth;

// HTTP API
pub mod api;

// Configuration
pub mod config;
