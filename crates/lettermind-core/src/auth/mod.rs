//! Authentication module for managing user sessions and credentials.
//!
//! This module provides:
//! - `SessionManager`: The session state machine (login, logout, auth headers)
//! - `IdentityAssertion`: The four ways a user can prove who they are
//! - `CredentialStore`: Persistence for the credential + user pair, with
//!   in-memory, file (optionally encrypted) and OS keychain backends
//! - `IdentityVerifier`: The backend seam that turns an assertion into a grant

pub mod assertion;
pub mod credentials;
pub mod error;
pub mod seal;
pub mod session;
pub mod verifier;

pub use assertion::{decode_token_claims, token_audience, DemoUserInfo, IdentityAssertion, DEMO_SUBJECT_PREFIX};
pub use credentials::{CredentialStore, FileCredentialStore, KeyringCredentialStore, MemoryCredentialStore};
pub use error::AuthError;
pub use session::{SessionManager, SessionStatus};
pub use verifier::{AuthGrant, IdentityVerifier};
