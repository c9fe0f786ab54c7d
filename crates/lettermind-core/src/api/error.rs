use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    /// Backend refused the request and explained why in a `detail` field.
    #[error("{detail}")]
    Rejected { status: u16, detail: String },

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Not signed in")]
    NotAuthenticated,

    #[error("{0} sign-in is not configured")]
    ProviderDisabled(&'static str),

    #[error("Identity token was issued for a different application")]
    AudienceMismatch,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Extract a human-readable `detail` string. Validation failures carry a
    /// list of objects instead, which is not usable as a message.
    fn detail_message(body: &str) -> Option<String> {
        let parsed: ErrorBody = serde_json::from_str(body).ok()?;
        match parsed.detail? {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(s),
            _ => None,
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        if let Some(detail) = Self::detail_message(body) {
            return ApiError::Rejected {
                status: status.as_u16(),
                detail,
            };
        }

        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// True when the request never produced an HTTP response
    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::NetworkError(_))
    }
}
