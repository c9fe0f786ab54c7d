use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use reqwest::header::{self, HeaderMap, HeaderValue};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, error, info, warn};

use super::{AuthError, AuthGrant, CredentialStore, IdentityAssertion, IdentityVerifier};
use crate::models::User;

/// Externally visible phase of the session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Uninitialized,
    Loading,
    Unauthenticated,
    Authenticated,
}

// Credential and user live in one variant, so one can't exist without the other.
enum SessionState {
    Uninitialized,
    Loading,
    Unauthenticated,
    Authenticated(AuthGrant),
}

impl SessionState {
    fn status(&self) -> SessionStatus {
        match self {
            SessionState::Uninitialized => SessionStatus::Uninitialized,
            SessionState::Loading => SessionStatus::Loading,
            SessionState::Unauthenticated => SessionStatus::Unauthenticated,
            SessionState::Authenticated(_) => SessionStatus::Authenticated,
        }
    }
}

struct Inner {
    store: Arc<dyn CredentialStore>,
    verifier: Arc<dyn IdentityVerifier>,
    state: RwLock<SessionState>,
    initialized: OnceCell<()>,
    login_gate: Arc<Mutex<()>>,
    /// Bumped on every logout; a login that started in an older epoch must
    /// not resurrect a session the user just ended.
    epoch: AtomicU64,
    /// Orders store writes. Held instead of `state` while the store works,
    /// since a sealed save can take a while.
    persist: parking_lot::Mutex<()>,
}

/// Owner of the signed-in session.
///
/// Clone is cheap and every clone observes the same session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn CredentialStore>, verifier: Arc<dyn IdentityVerifier>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                verifier,
                state: RwLock::new(SessionState::Uninitialized),
                initialized: OnceCell::new(),
                login_gate: Arc::new(Mutex::new(())),
                epoch: AtomicU64::new(0),
                persist: parking_lot::Mutex::new(()),
            }),
        }
    }

    /// Hydrate from the credential store. Only the first call reads the store;
    /// concurrent callers all wait for that read to finish.
    pub async fn initialize(&self) {
        self.inner
            .initialized
            .get_or_init(|| async {
                {
                    let mut state = self.inner.state.write();
                    if matches!(*state, SessionState::Uninitialized) {
                        *state = SessionState::Loading;
                    }
                }

                let stored = {
                    let _persist = self.inner.persist.lock();
                    self.inner.store.load()
                };

                let mut state = self.inner.state.write();
                // A logout while loading has already settled the state
                if matches!(*state, SessionState::Loading) {
                    *state = match stored {
                        Some(grant) => {
                            info!(user_id = %grant.user.id, "Restored saved session");
                            SessionState::Authenticated(grant)
                        }
                        None => {
                            debug!("No saved session");
                            SessionState::Unauthenticated
                        }
                    };
                }
            })
            .await;
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.state.read().status()
    }

    /// True until the saved session has been read; gates authenticated views.
    pub fn is_loading(&self) -> bool {
        matches!(
            self.status(),
            SessionStatus::Uninitialized | SessionStatus::Loading
        )
    }

    pub fn is_authenticated(&self) -> bool {
        self.status() == SessionStatus::Authenticated
    }

    pub fn user(&self) -> Option<User> {
        match &*self.inner.state.read() {
            SessionState::Authenticated(grant) => Some(grant.user.clone()),
            _ => None,
        }
    }

    /// Headers for authenticated requests; empty unless signed in.
    pub fn auth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let SessionState::Authenticated(ref grant) = *self.inner.state.read() {
            match HeaderValue::from_str(&format!("Bearer {}", grant.access_token)) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    headers.insert(header::AUTHORIZATION, value);
                    headers.insert(
                        header::CONTENT_TYPE,
                        HeaderValue::from_static("application/json"),
                    );
                }
                Err(_) => warn!("Stored credential is not a valid header value"),
            }
        }
        headers
    }

    /// Sign in with `assertion`, replacing any current session on success.
    ///
    /// A failure leaves the current session untouched. Only one login may be
    /// pending at a time; overlapping calls get `AuthError::LoginInProgress`.
    /// The exchange runs on its own task, so a caller that stops waiting does
    /// not lose the credential the backend issued.
    pub async fn login(&self, assertion: IdentityAssertion) -> Result<User, AuthError> {
        self.initialize().await;
        assertion.validate()?;

        let gate = self
            .inner
            .login_gate
            .clone()
            .try_lock_owned()
            .map_err(|_| AuthError::LoginInProgress)?;

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let _gate = gate;
            inner.exchange(assertion).await
        });

        match task.await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Login task failed");
                Err(AuthError::Server("Sign-in was interrupted".to_string()))
            }
        }
    }

    /// Drop the session from memory and storage. Safe to call repeatedly.
    pub fn logout(&self) {
        {
            let mut state = self.inner.state.write();
            self.inner.epoch.fetch_add(1, Ordering::SeqCst);
            if matches!(*state, SessionState::Authenticated(_)) {
                info!("Signed out");
            }
            *state = SessionState::Unauthenticated;
        }

        // Waits out any save in flight, so the clear always lands last
        let _persist = self.inner.persist.lock();
        if let Err(e) = self.inner.store.clear() {
            warn!(error = %e, "Failed to clear saved session");
        }
    }
}

impl Inner {
    async fn exchange(&self, assertion: IdentityAssertion) -> Result<User, AuthError> {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let kind = assertion.kind();
        debug!(kind, "Sending identity assertion");

        let grant = match self.verifier.verify(&assertion).await {
            Ok(grant) => grant,
            Err(e) => {
                let err = AuthError::from(e);
                match &err {
                    AuthError::Network(_) | AuthError::Server(_) => {
                        error!(kind, error = %err, "Login failed")
                    }
                    _ => info!(kind, error = %err, "Login rejected"),
                }
                return Err(err);
            }
        };
        drop(assertion);

        let _persist = self.persist.lock();
        if self.epoch.load(Ordering::SeqCst) != epoch {
            warn!(kind, "Discarding login that finished after sign-out");
            return Err(AuthError::SignedOut);
        }
        if let Err(e) = self.store.save(&grant) {
            warn!(error = %e, "Failed to save session");
        }

        let mut state = self.state.write();
        // A logout during the save is queued on `persist` and clears it afterwards
        if self.epoch.load(Ordering::SeqCst) != epoch {
            warn!(kind, "Discarding login that finished after sign-out");
            return Err(AuthError::SignedOut);
        }
        let user = grant.user.clone();
        info!(kind, user_id = %user.id, "Login successful");
        *state = SessionState::Authenticated(grant);
        Ok(user)
    }
}
