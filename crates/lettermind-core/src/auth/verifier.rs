use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use super::IdentityAssertion;
use crate::api::ApiError;
use crate::models::User;

/// Credential and account record issued for an accepted assertion.
/// Every login path returns this same shape.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthGrant {
    pub access_token: String,
    pub user: User,
}

impl std::fmt::Debug for AuthGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGrant")
            .field("access_token", &"<redacted>")
            .field("user", &self.user)
            .finish()
    }
}

/// Backend collaborator that checks an assertion and mints a credential.
pub trait IdentityVerifier: Send + Sync {
    fn verify<'a>(&'a self, assertion: &'a IdentityAssertion) -> BoxFuture<'a, Result<AuthGrant, ApiError>>;
}
