//! Fakes for the backend seams used across unit tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use reqwest::header::{self, HeaderMap};
use tokio::sync::Notify;
use zeroize::Zeroizing;

use crate::api::ApiError;
use crate::auth::{AuthGrant, DemoUserInfo, IdentityAssertion, IdentityVerifier};
use crate::keys::KeyBackend;
use crate::models::{KeyStatus, Provider, User};
use crate::utils::mask_key;

pub fn sample_user(id: &str) -> User {
    User {
        id: id.to_string(),
        name: "Anna".to_string(),
        email: "anna@test.de".to_string(),
        picture: None,
        oauth_provider: None,
        created_at: Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 0).unwrap(),
        last_login: None,
        api_key_status: BTreeMap::new(),
    }
}

pub fn sample_grant(token: &str, user_id: &str) -> AuthGrant {
    AuthGrant {
        access_token: token.to_string(),
        user: sample_user(user_id),
    }
}

enum Outcome {
    Accept(AuthGrant),
    Reject(u16, String),
}

/// Identity backend keyed by the assertion's email (or token).
#[derive(Default)]
pub struct FakeVerifier {
    outcomes: Mutex<HashMap<String, Outcome>>,
    holds: Mutex<HashMap<String, Arc<Notify>>>,
    calls: AtomicUsize,
}

impl FakeVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept(&self, key: &str, grant: AuthGrant) {
        self.outcomes.lock().insert(key.to_string(), Outcome::Accept(grant));
    }

    pub fn reject(&self, key: &str, status: u16, detail: &str) {
        self.outcomes
            .lock()
            .insert(key.to_string(), Outcome::Reject(status, detail.to_string()));
    }

    /// Block verification for `key` until the returned handle is notified
    pub fn hold(&self, key: &str) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.holds.lock().insert(key.to_string(), notify.clone());
        notify
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn assertion_key(assertion: &IdentityAssertion) -> String {
    match assertion {
        IdentityAssertion::Password { email, .. }
        | IdentityAssertion::Registration { email, .. }
        | IdentityAssertion::Demo { email, .. } => email.clone(),
        IdentityAssertion::ThirdParty { provider_token } => provider_token.clone(),
    }
}

impl IdentityVerifier for FakeVerifier {
    fn verify<'a>(&'a self, assertion: &'a IdentityAssertion) -> BoxFuture<'a, Result<AuthGrant, ApiError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let key = assertion_key(assertion);

            let hold = self.holds.lock().get(&key).cloned();
            if let Some(notify) = hold {
                notify.notified().await;
            }

            let configured = match self.outcomes.lock().get(&key) {
                Some(Outcome::Accept(grant)) => Some(Ok(grant.clone())),
                Some(Outcome::Reject(status, detail)) => Some(Err(ApiError::Rejected {
                    status: *status,
                    detail: detail.clone(),
                })),
                None => None,
            };

            match (configured, assertion) {
                (Some(result), _) => result,
                // Unconfigured demo logins behave like the real exchange
                (None, IdentityAssertion::Demo { name, email }) => {
                    let info = DemoUserInfo::mint(name, email);
                    let mut user = sample_user(&info.sub);
                    user.name = info.name;
                    user.email = info.email;
                    user.picture = Some(info.picture);
                    user.oauth_provider = Some("demo".to_string());
                    Ok(AuthGrant {
                        access_token: format!("demo-token-{}", user.id),
                        user,
                    })
                }
                (None, _) => Err(ApiError::ServerError("502 Bad Gateway".to_string())),
            }
        })
    }
}

/// Key registry backend holding plaintext keys server-side only.
pub struct FakeKeyBackend {
    token: String,
    keys: Mutex<BTreeMap<Provider, String>>,
    fail_updates: Mutex<Option<String>>,
    pub updates: AtomicUsize,
    pub last_update: Mutex<Vec<Provider>>,
}

impl FakeKeyBackend {
    pub fn new(token: &str) -> Self {
        Self {
            token: token.to_string(),
            keys: Mutex::new(BTreeMap::new()),
            fail_updates: Mutex::new(None),
            updates: AtomicUsize::new(0),
            last_update: Mutex::new(Vec::new()),
        }
    }

    pub fn store_key(&self, provider: Provider, key: &str) {
        self.keys.lock().insert(provider, key.to_string());
    }

    pub fn stored_key(&self, provider: Provider) -> Option<String> {
        self.keys.lock().get(&provider).cloned()
    }

    pub fn fail_updates_with(&self, detail: &str) {
        *self.fail_updates.lock() = Some(detail.to_string());
    }

    fn authorize(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        let expected = format!("Bearer {}", self.token);
        match headers.get(header::AUTHORIZATION) {
            Some(value) if value.as_bytes() == expected.as_bytes() => Ok(()),
            _ => Err(ApiError::Unauthorized),
        }
    }

    fn check_update(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        self.authorize(headers)?;
        self.updates.fetch_add(1, Ordering::SeqCst);
        match self.fail_updates.lock().clone() {
            Some(detail) => Err(ApiError::Rejected { status: 400, detail }),
            None => Ok(()),
        }
    }
}

impl KeyBackend for FakeKeyBackend {
    fn fetch_profile<'a>(&'a self, headers: HeaderMap) -> BoxFuture<'a, Result<User, ApiError>> {
        Box::pin(async move {
            self.authorize(&headers)?;
            let mut user = sample_user("u1");
            user.api_key_status = Provider::ALL
                .iter()
                .map(|p| {
                    let status = match self.keys.lock().get(p) {
                        Some(key) => KeyStatus::present(Some(mask_key(key))),
                        None => KeyStatus::missing(),
                    };
                    (*p, status)
                })
                .collect();
            Ok(user)
        })
    }

    fn update_api_keys<'a>(
        &'a self,
        headers: HeaderMap,
        keys: &'a BTreeMap<Provider, Zeroizing<String>>,
    ) -> BoxFuture<'a, Result<(), ApiError>> {
        Box::pin(async move {
            self.check_update(&headers)?;
            *self.last_update.lock() = keys.keys().copied().collect();
            let mut stored = self.keys.lock();
            for (provider, key) in keys {
                stored.insert(*provider, key.as_str().to_string());
            }
            Ok(())
        })
    }

    fn update_gemini_key<'a>(
        &'a self,
        headers: HeaderMap,
        key: &'a str,
    ) -> BoxFuture<'a, Result<(), ApiError>> {
        Box::pin(async move {
            self.check_update(&headers)?;
            *self.last_update.lock() = vec![Provider::Gemini];
            self.keys.lock().insert(Provider::Gemini, key.to_string());
            Ok(())
        })
    }
}
