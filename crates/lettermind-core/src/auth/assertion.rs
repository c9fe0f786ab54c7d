//! Proof-of-identity payloads accepted by `SessionManager::login`.

use std::collections::BTreeMap;
use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use serde::Serialize;
use zeroize::Zeroizing;

use super::AuthError;
use crate::models::Provider;

/// Avatar service used for demo accounts, which have no picture of their own
const DEMO_AVATAR_URL: &str = "https://ui-avatars.com/api/";

/// Avatar colors (background, foreground)
const DEMO_AVATAR_COLORS: (&str, &str) = ("4F46E5", "fff");

/// Prefix marking synthetic demo subject ids
pub const DEMO_SUBJECT_PREFIX: &str = "demo_";

/// One sign-in attempt. Every variant ends in the same credential + user grant.
pub enum IdentityAssertion {
    Password {
        email: String,
        password: Zeroizing<String>,
    },
    Registration {
        email: String,
        password: Zeroizing<String>,
        name: String,
        initial_keys: BTreeMap<Provider, Zeroizing<String>>,
    },
    /// Non-production path: no secret is involved at all.
    Demo { name: String, email: String },
    /// Opaque token from a third-party identity provider (Google).
    ThirdParty { provider_token: String },
}

impl IdentityAssertion {
    pub fn password(email: &str, password: impl Into<String>) -> Self {
        IdentityAssertion::Password {
            email: email.trim().to_string(),
            password: Zeroizing::new(password.into()),
        }
    }

    /// Registration; blank initial keys are dropped rather than sent.
    pub fn registration(
        email: &str,
        password: impl Into<String>,
        name: &str,
        initial_keys: BTreeMap<Provider, Zeroizing<String>>,
    ) -> Self {
        IdentityAssertion::Registration {
            email: email.trim().to_string(),
            password: Zeroizing::new(password.into()),
            name: name.trim().to_string(),
            initial_keys: initial_keys
                .into_iter()
                .filter(|(_, key)| !key.trim().is_empty())
                .collect(),
        }
    }

    pub fn demo(name: &str, email: &str) -> Self {
        IdentityAssertion::Demo {
            name: name.trim().to_string(),
            email: email.trim().to_string(),
        }
    }

    pub fn third_party(provider_token: &str) -> Self {
        IdentityAssertion::ThirdParty {
            provider_token: provider_token.trim().to_string(),
        }
    }

    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            IdentityAssertion::Password { .. } => "password",
            IdentityAssertion::Registration { .. } => "registration",
            IdentityAssertion::Demo { .. } => "demo",
            IdentityAssertion::ThirdParty { .. } => "third_party",
        }
    }

    /// Client-side checks run before any request is made.
    pub fn validate(&self) -> Result<(), AuthError> {
        match self {
            IdentityAssertion::Password { email, password } => {
                if email.is_empty() || password.is_empty() {
                    return Err(AuthError::Validation(
                        "Email and password are required".to_string(),
                    ));
                }
                check_email(email)
            }
            IdentityAssertion::Registration {
                email,
                password,
                name,
                ..
            } => {
                if email.is_empty() || password.is_empty() || name.is_empty() {
                    return Err(AuthError::Validation("Please fill in all fields".to_string()));
                }
                check_email(email)
            }
            IdentityAssertion::Demo { name, email } => {
                if name.is_empty() || email.is_empty() {
                    return Err(AuthError::Validation("Please fill in all fields".to_string()));
                }
                check_email(email)
            }
            IdentityAssertion::ThirdParty { provider_token } => {
                if provider_token.is_empty() {
                    return Err(AuthError::Validation("Identity token is missing".to_string()));
                }
                Ok(())
            }
        }
    }
}

fn check_email(email: &str) -> Result<(), AuthError> {
    if email.contains('@') {
        Ok(())
    } else {
        Err(AuthError::Validation("Please enter a valid email address".to_string()))
    }
}

impl fmt::Debug for IdentityAssertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityAssertion::Password { email, .. } => f
                .debug_struct("Password")
                .field("email", email)
                .finish_non_exhaustive(),
            IdentityAssertion::Registration {
                email,
                name,
                initial_keys,
                ..
            } => f
                .debug_struct("Registration")
                .field("email", email)
                .field("name", name)
                .field("initial_keys", &initial_keys.keys().collect::<Vec<_>>())
                .finish_non_exhaustive(),
            IdentityAssertion::Demo { name, email } => f
                .debug_struct("Demo")
                .field("name", name)
                .field("email", email)
                .finish(),
            IdentityAssertion::ThirdParty { .. } => {
                f.debug_struct("ThirdParty").finish_non_exhaustive()
            }
        }
    }
}

/// User info minted client-side for the demo identity exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DemoUserInfo {
    pub sub: String,
    pub email: String,
    pub name: String,
    pub picture: String,
}

impl DemoUserInfo {
    pub fn mint(name: &str, email: &str) -> Self {
        let (background, color) = DEMO_AVATAR_COLORS;
        Self {
            sub: format!("{}{}", DEMO_SUBJECT_PREFIX, Utc::now().timestamp_millis()),
            email: email.to_string(),
            name: name.to_string(),
            picture: format!(
                "{}?name={}&background={}&color={}",
                DEMO_AVATAR_URL,
                urlencoding::encode(name),
                background,
                color
            ),
        }
    }
}

/// Decode the claims segment of a JWT without checking its signature.
///
/// The result is only a hint for the backend, which verifies the token itself.
pub fn decode_token_claims(token: &str) -> Option<serde_json::Value> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    claims.is_object().then_some(claims)
}

/// Audience claim, which Google issues either as a string or a list
pub fn token_audience(claims: &serde_json::Value) -> Vec<&str> {
    match claims.get("aud") {
        Some(serde_json::Value::String(aud)) => vec![aud.as_str()],
        Some(serde_json::Value::Array(list)) => list.iter().filter_map(|v| v.as_str()).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_jwt(claims: &serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("{}.{}.signature", header, payload)
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        let err = IdentityAssertion::demo("  ", "anna@test.de").validate().unwrap_err();
        assert_eq!(err, AuthError::Validation("Please fill in all fields".to_string()));

        let err = IdentityAssertion::demo("Anna", "anna.test.de").validate().unwrap_err();
        assert_eq!(err.user_message(), "Please enter a valid email address");

        assert!(IdentityAssertion::password("a@b.com", "").validate().is_err());
        assert!(IdentityAssertion::third_party(" ").validate().is_err());
        assert!(IdentityAssertion::registration("a@b.com", "pw", "", BTreeMap::new())
            .validate()
            .is_err());
    }

    #[test]
    fn test_validate_accepts_complete_assertions() {
        assert!(IdentityAssertion::password("a@b.com", "badpw").validate().is_ok());
        assert!(IdentityAssertion::demo("Anna", "anna@test.de").validate().is_ok());
        assert!(IdentityAssertion::third_party("a.b.c").validate().is_ok());
    }

    #[test]
    fn test_registration_drops_blank_initial_keys() {
        let keys = BTreeMap::from([
            (Provider::Gemini, Zeroizing::new("AIzaSyKey".to_string())),
            (Provider::OpenAi, Zeroizing::new("   ".to_string())),
        ]);
        match IdentityAssertion::registration("a@b.com", "pw", "A", keys) {
            IdentityAssertion::Registration { initial_keys, .. } => {
                assert_eq!(initial_keys.keys().copied().collect::<Vec<_>>(), vec![Provider::Gemini]);
            }
            other => panic!("unexpected assertion: {:?}", other),
        }
    }

    #[test]
    fn test_debug_hides_secrets() {
        let debug = format!("{:?}", IdentityAssertion::password("a@b.com", "hunter2"));
        assert!(debug.contains("a@b.com"));
        assert!(!debug.contains("hunter2"));

        let debug = format!("{:?}", IdentityAssertion::third_party("secret.token.value"));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_demo_user_info() {
        let info = DemoUserInfo::mint("Anna Müller", "anna@test.de");
        assert!(info.sub.starts_with(DEMO_SUBJECT_PREFIX));
        assert!(info.sub[DEMO_SUBJECT_PREFIX.len()..].parse::<i64>().is_ok());
        assert!(info.picture.starts_with("https://ui-avatars.com/api/?name="));
        assert!(info.picture.contains("Anna%20M%C3%BCller"));
        assert!(info.picture.ends_with("&background=4F46E5&color=fff"));
    }

    #[test]
    fn test_decode_token_claims() {
        let claims = serde_json::json!({
            "email": "anna@gmail.com",
            "name": "Anna",
            "aud": "client-123.apps.googleusercontent.com"
        });
        let decoded = decode_token_claims(&fake_jwt(&claims)).expect("claims should decode");
        assert_eq!(decoded["email"], "anna@gmail.com");
        assert_eq!(token_audience(&decoded), vec!["client-123.apps.googleusercontent.com"]);

        assert!(decode_token_claims("not-a-jwt").is_none());
        assert!(decode_token_claims("a.!!!.c").is_none());
        assert!(token_audience(&serde_json::json!({})).is_empty());
    }
}
