//! lettermind-core - Core library for the lettermind letter assistant client.
//!
//! This crate contains the session and key-management logic shared by
//! the lettermind front ends:
//! - `auth`: Session lifecycle, identity assertions and credential storage
//! - `api`: HTTP client for the lettermind backend
//! - `keys`: Per-provider API key status and updates
//! - `models`: User profile and provider types
//! - `config`: Client configuration
//! - `utils`: Formatting and secret masking helpers

pub mod api;
pub mod auth;
pub mod config;
pub mod keys;
pub mod models;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{ApiClient, ApiError};
pub use auth::{AuthError, AuthGrant, IdentityAssertion, SessionManager, SessionStatus};
pub use config::Config;
pub use keys::{ApiKeyRegistry, KeyDraft};
pub use models::{KeyStatus, KeyStatusMap, Provider, User};
