use thiserror::Error;

use crate::api::ApiError;

/// Why a sign-in attempt did not produce a session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Assertion was incomplete or malformed; caught before any request.
    #[error("{0}")]
    Validation(String),

    /// Backend refused the assertion and said why.
    #[error("{0}")]
    Rejected(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("A sign-in attempt is already in progress")]
    LoginInProgress,

    #[error("Signed out while sign-in was in progress")]
    SignedOut,
}

impl AuthError {
    /// Message suitable for showing next to the login form.
    /// Network and server failures get a generic retry hint instead of internals.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::Validation(msg) | AuthError::Rejected(msg) => msg.clone(),
            AuthError::Network(_) => "Network error. Please try again.".to_string(),
            AuthError::Server(_) => {
                "Something went wrong on the server. Please try again.".to_string()
            }
            AuthError::LoginInProgress | AuthError::SignedOut => self.to_string(),
        }
    }
}

impl From<ApiError> for AuthError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Rejected { detail, .. } => AuthError::Rejected(detail),
            ApiError::Unauthorized => AuthError::Rejected("Authentication failed".to_string()),
            ApiError::ProviderDisabled(_) | ApiError::AudienceMismatch => {
                AuthError::Validation(err.to_string())
            }
            ApiError::NetworkError(e) => AuthError::Network(e.to_string()),
            ApiError::NotAuthenticated
            | ApiError::ServerError(_)
            | ApiError::InvalidResponse(_) => AuthError::Server(err.to_string()),
        }
    }
}
