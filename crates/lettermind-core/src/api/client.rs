//! API client for communicating with the lettermind backend.
//!
//! This module provides the `ApiClient` struct, which implements both
//! backend seams: identity verification for the four login paths and the
//! profile / API key endpoints used by the key registry.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Result;
use futures::future::BoxFuture;
use reqwest::{header::HeaderMap, Client, Response};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::auth::{decode_token_claims, token_audience, AuthGrant, DemoUserInfo, IdentityAssertion, IdentityVerifier};
use crate::config::Config;
use crate::keys::KeyBackend;
use crate::models::{Provider, User};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

const LOGIN_PATH: &str = "/api/login";
const REGISTER_PATH: &str = "/api/register";
const DEMO_VERIFY_PATH: &str = "/api/auth/demo/verify";
const GOOGLE_VERIFY_PATH: &str = "/api/auth/google/verify";
const PROFILE_PATH: &str = "/api/profile";
const API_KEYS_PATH: &str = "/api/api-keys";
const GEMINI_KEY_PATH: &str = "/api/gemini-api-key";

#[derive(Serialize)]
struct PasswordLoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    email: &'a str,
    password: &'a str,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_keys: Option<BTreeMap<&'static str, &'a str>>,
}

#[derive(Serialize)]
struct DemoVerifyRequest<'a> {
    user_info: &'a DemoUserInfo,
}

#[derive(Serialize)]
struct GoogleVerifyRequest<'a> {
    credential: &'a str,
    user_info: serde_json::Value,
}

#[derive(Serialize)]
struct ApiKeysRequest<'a> {
    api_keys: BTreeMap<&'static str, &'a str>,
}

#[derive(Serialize)]
struct GeminiKeyRequest<'a> {
    gemini_api_key: &'a str,
}

/// Map provider keys to the backend's `<provider>_api_key` fields
fn key_fields(keys: &BTreeMap<Provider, Zeroizing<String>>) -> BTreeMap<&'static str, &str> {
    keys.iter()
        .map(|(provider, key)| (provider.field_name(), key.as_str()))
        .collect()
}

/// API client for the lettermind backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    google_client_id: Option<String>,
}

impl ApiClient {
    /// Create a new API client for the configured backend
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_base_url(&config.backend_url, config.google_client_id.clone())
    }

    pub fn with_base_url(base_url: &str, google_client_id: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            google_client_id,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn google_enabled(&self) -> bool {
        self.google_client_id.is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn parse_json<T: DeserializeOwned>(response: Response, path: &str) -> Result<T, ApiError> {
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            warn!(path, error = %e, "Unexpected response body");
            ApiError::InvalidResponse(format!("Failed to parse response from {}: {}", path, e))
        })
    }

    async fn post_for_grant<B: Serialize>(&self, path: &str, body: &B) -> Result<AuthGrant, ApiError> {
        debug!(path, "POST");
        let response = self.client.post(self.url(path)).json(body).send().await?;
        let response = Self::check_response(response).await?;
        Self::parse_json(response, path).await
    }

    pub async fn login_with_password(&self, email: &str, password: &str) -> Result<AuthGrant, ApiError> {
        self.post_for_grant(LOGIN_PATH, &PasswordLoginRequest { email, password })
            .await
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: &str,
        initial_keys: &BTreeMap<Provider, Zeroizing<String>>,
    ) -> Result<AuthGrant, ApiError> {
        let api_keys = if initial_keys.is_empty() {
            None
        } else {
            Some(key_fields(initial_keys))
        };
        let body = RegisterRequest {
            email,
            password,
            name,
            api_keys,
        };
        self.post_for_grant(REGISTER_PATH, &body).await
    }

    pub async fn verify_demo(&self, user_info: &DemoUserInfo) -> Result<AuthGrant, ApiError> {
        self.post_for_grant(DEMO_VERIFY_PATH, &DemoVerifyRequest { user_info })
            .await
    }

    /// Hand a Google identity token to the backend, which verifies it.
    /// The decoded claims travel along only as a hint.
    pub async fn verify_google(&self, token: &str) -> Result<AuthGrant, ApiError> {
        let client_id = self
            .google_client_id
            .as_deref()
            .ok_or(ApiError::ProviderDisabled("Google"))?;

        let claims = decode_token_claims(token);
        if let Some(ref claims) = claims {
            let audience = token_audience(claims);
            if !audience.is_empty() && !audience.contains(&client_id) {
                warn!(?audience, "Identity token audience does not match client id");
                return Err(ApiError::AudienceMismatch);
            }
        } else {
            debug!("Identity token claims could not be decoded, sending without hint");
        }

        let body = GoogleVerifyRequest {
            credential: token,
            user_info: claims.unwrap_or_else(|| serde_json::json!({})),
        };
        self.post_for_grant(GOOGLE_VERIFY_PATH, &body).await
    }

    pub async fn get_profile(&self, headers: HeaderMap) -> Result<User, ApiError> {
        let response = self
            .client
            .get(self.url(PROFILE_PATH))
            .headers(headers)
            .send()
            .await?;
        let response = Self::check_response(response).await?;
        Self::parse_json(response, PROFILE_PATH).await
    }

    pub async fn put_api_keys(
        &self,
        headers: HeaderMap,
        keys: &BTreeMap<Provider, Zeroizing<String>>,
    ) -> Result<(), ApiError> {
        let body = ApiKeysRequest {
            api_keys: key_fields(keys),
        };
        let response = self
            .client
            .put(self.url(API_KEYS_PATH))
            .headers(headers)
            .json(&body)
            .send()
            .await?;
        Self::check_response(response).await?;
        Ok(())
    }

    pub async fn post_gemini_key(&self, headers: HeaderMap, key: &str) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.url(GEMINI_KEY_PATH))
            .headers(headers)
            .json(&GeminiKeyRequest { gemini_api_key: key })
            .send()
            .await?;
        Self::check_response(response).await?;
        Ok(())
    }
}

impl IdentityVerifier for ApiClient {
    fn verify<'a>(&'a self, assertion: &'a IdentityAssertion) -> BoxFuture<'a, Result<AuthGrant, ApiError>> {
        Box::pin(async move {
            match assertion {
                IdentityAssertion::Password { email, password } => {
                    self.login_with_password(email, password).await
                }
                IdentityAssertion::Registration {
                    email,
                    password,
                    name,
                    initial_keys,
                } => self.register(email, password, name, initial_keys).await,
                IdentityAssertion::Demo { name, email } => {
                    let user_info = DemoUserInfo::mint(name, email);
                    self.verify_demo(&user_info).await
                }
                IdentityAssertion::ThirdParty { provider_token } => {
                    self.verify_google(provider_token).await
                }
            }
        })
    }
}

impl KeyBackend for ApiClient {
    fn fetch_profile<'a>(&'a self, headers: HeaderMap) -> BoxFuture<'a, Result<User, ApiError>> {
        Box::pin(self.get_profile(headers))
    }

    fn update_api_keys<'a>(
        &'a self,
        headers: HeaderMap,
        keys: &'a BTreeMap<Provider, Zeroizing<String>>,
    ) -> BoxFuture<'a, Result<(), ApiError>> {
        Box::pin(self.put_api_keys(headers, keys))
    }

    fn update_gemini_key<'a>(&'a self, headers: HeaderMap, key: &'a str) -> BoxFuture<'a, Result<(), ApiError>> {
        Box::pin(self.post_gemini_key(headers, key))
    }
}
