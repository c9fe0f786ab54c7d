use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::header::HeaderMap;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::api::ApiError;
use crate::auth::SessionManager;
use crate::models::{KeyStatusMap, Provider, User};

/// Backend endpoints behind the key registry.
pub trait KeyBackend: Send + Sync {
    fn fetch_profile<'a>(&'a self, headers: HeaderMap) -> BoxFuture<'a, Result<User, ApiError>>;

    fn update_api_keys<'a>(
        &'a self,
        headers: HeaderMap,
        keys: &'a BTreeMap<Provider, Zeroizing<String>>,
    ) -> BoxFuture<'a, Result<(), ApiError>>;

    fn update_gemini_key<'a>(&'a self, headers: HeaderMap, key: &'a str) -> BoxFuture<'a, Result<(), ApiError>>;
}

/// Keys typed by the user but not yet submitted.
///
/// Values are zeroed when dropped, and every submit drains the draft
/// whatever the outcome, so entered secrets never linger.
#[derive(Default)]
pub struct KeyDraft {
    entries: BTreeMap<Provider, Zeroizing<String>>,
}

impl KeyDraft {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or unset the pending key for `provider`.
    /// `None` or a blank value means "leave this provider's key alone".
    pub fn set(&mut self, provider: Provider, value: Option<String>) {
        let value = value.map(Zeroizing::new);
        match value {
            Some(key) if !key.trim().is_empty() => {
                self.entries
                    .insert(provider, Zeroizing::new(key.trim().to_string()));
            }
            _ => {
                self.entries.remove(&provider);
            }
        }
    }

    pub fn from_partial(partial: BTreeMap<Provider, Option<String>>) -> Self {
        let mut draft = Self::new();
        for (provider, value) in partial {
            draft.set(provider, value);
        }
        draft
    }

    pub fn providers(&self) -> Vec<Provider> {
        self.entries.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn take(&mut self) -> BTreeMap<Provider, Zeroizing<String>> {
        std::mem::take(&mut self.entries)
    }
}

impl std::fmt::Debug for KeyDraft {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyDraft")
            .field("providers", &self.providers())
            .finish()
    }
}

/// Client for the user's per-provider key catalog.
///
/// The registry never returns plaintext keys, only masked status. Updates
/// don't echo the new status back: call `fetch_status` afterwards.
#[derive(Clone)]
pub struct ApiKeyRegistry {
    session: SessionManager,
    backend: Arc<dyn KeyBackend>,
}

impl ApiKeyRegistry {
    pub fn new(session: SessionManager, backend: Arc<dyn KeyBackend>) -> Self {
        Self { session, backend }
    }

    fn authorized_headers(&self) -> Result<HeaderMap, ApiError> {
        let headers = self.session.auth_headers();
        if headers.is_empty() {
            Err(ApiError::NotAuthenticated)
        } else {
            Ok(headers)
        }
    }

    /// Full profile, including key status
    pub async fn fetch_profile(&self) -> Result<User, ApiError> {
        let headers = self.authorized_headers()?;
        let profile = self.backend.fetch_profile(headers).await?;
        debug!(user_id = %profile.id, providers = profile.api_key_status.len(), "Profile loaded");
        Ok(profile)
    }

    pub async fn fetch_status(&self) -> Result<KeyStatusMap, ApiError> {
        Ok(self.fetch_profile().await?.api_key_status)
    }

    /// Submit the drafted keys. Providers absent from the draft are untouched.
    /// The draft is emptied before this returns, on success and on failure.
    pub async fn update_keys(&self, draft: &mut KeyDraft) -> Result<(), ApiError> {
        let keys = draft.take();
        if keys.is_empty() {
            debug!("No keys to update");
            return Ok(());
        }

        let headers = self.authorized_headers()?;
        let providers: Vec<&str> = keys.keys().map(|p| p.as_str()).collect();
        match self.backend.update_api_keys(headers, &keys).await {
            Ok(()) => {
                info!(?providers, "API keys updated");
                Ok(())
            }
            Err(e) => {
                warn!(?providers, error = %e, "API key update failed");
                Err(e)
            }
        }
    }

    /// Single-provider endpoint for the Gemini key
    pub async fn update_gemini_key(&self, key: Zeroizing<String>) -> Result<(), ApiError> {
        if key.trim().is_empty() {
            return Ok(());
        }
        let headers = self.authorized_headers()?;
        self.backend.update_gemini_key(headers, key.trim()).await?;
        info!("Gemini API key updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryCredentialStore;
    use crate::testing::{sample_grant, FakeKeyBackend, FakeVerifier};
    use std::sync::atomic::Ordering;

    async fn signed_in(backend: Arc<FakeKeyBackend>) -> ApiKeyRegistry {
        let store = Arc::new(MemoryCredentialStore::with_session(sample_grant("tok-1", "u1")));
        let session = SessionManager::new(store, Arc::new(FakeVerifier::new()));
        session.initialize().await;
        ApiKeyRegistry::new(session, backend)
    }

    #[tokio::test]
    async fn test_fetch_status_requires_session() {
        let session = SessionManager::new(
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(FakeVerifier::new()),
        );
        session.initialize().await;
        let registry = ApiKeyRegistry::new(session, Arc::new(FakeKeyBackend::new("tok-1")));

        assert!(matches!(
            registry.fetch_status().await,
            Err(ApiError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn test_fetch_status_surfaces_backend_errors() {
        // Backend expects a different credential than the session holds
        let registry = signed_in(Arc::new(FakeKeyBackend::new("tok-other"))).await;
        assert!(matches!(
            registry.fetch_status().await,
            Err(ApiError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_update_then_fetch_shows_key() {
        let backend = Arc::new(FakeKeyBackend::new("tok-1"));
        let registry = signed_in(backend.clone()).await;

        let before = registry.fetch_status().await.unwrap();
        assert!(before.values().all(|s| !s.has_key() && s.masked_key().is_none()));

        let mut draft = KeyDraft::new();
        draft.set(Provider::OpenAi, Some("sk-proj-0123456789abcd".to_string()));
        registry.update_keys(&mut draft).await.unwrap();
        assert!(draft.is_empty());

        let after = registry.fetch_status().await.unwrap();
        let openai = &after[&Provider::OpenAi];
        assert!(openai.has_key());
        assert_eq!(openai.masked_key(), Some("****abcd"));
        assert!(!after[&Provider::Gemini].has_key());

        for status in after.values().filter(|s| !s.has_key()) {
            assert!(status.masked_key().is_none());
        }
    }

    #[tokio::test]
    async fn test_null_entry_leaves_key_unchanged() {
        let backend = Arc::new(FakeKeyBackend::new("tok-1"));
        backend.store_key(Provider::Gemini, "AIzaSyExistingKey9876");
        let registry = signed_in(backend.clone()).await;

        let mut draft = KeyDraft::from_partial(BTreeMap::from([(Provider::Gemini, None)]));
        registry.update_keys(&mut draft).await.unwrap();

        assert_eq!(backend.updates.load(Ordering::SeqCst), 0);
        assert_eq!(
            backend.stored_key(Provider::Gemini).as_deref(),
            Some("AIzaSyExistingKey9876")
        );
        let status = registry.fetch_status().await.unwrap();
        assert_eq!(status[&Provider::Gemini].masked_key(), Some("****9876"));
    }

    #[tokio::test]
    async fn test_only_drafted_providers_are_sent() {
        let backend = Arc::new(FakeKeyBackend::new("tok-1"));
        backend.store_key(Provider::Anthropic, "sk-ant-keepme-0000");
        let registry = signed_in(backend.clone()).await;

        let mut draft = KeyDraft::from_partial(BTreeMap::from([
            (Provider::Gemini, Some("AIzaSyNewKey1111".to_string())),
            (Provider::OpenAi, Some("   ".to_string())),
            (Provider::Anthropic, None),
        ]));
        registry.update_keys(&mut draft).await.unwrap();

        assert_eq!(*backend.last_update.lock(), vec![Provider::Gemini]);
        assert_eq!(
            backend.stored_key(Provider::Anthropic).as_deref(),
            Some("sk-ant-keepme-0000")
        );
    }

    #[tokio::test]
    async fn test_failed_update_still_clears_draft() {
        let backend = Arc::new(FakeKeyBackend::new("tok-1"));
        backend.fail_updates_with("Invalid API key format");
        let registry = signed_in(backend.clone()).await;

        let mut draft = KeyDraft::new();
        draft.set(Provider::Anthropic, Some("sk-ant-bad".to_string()));
        let err = registry.update_keys(&mut draft).await.unwrap_err();

        assert_eq!(err.to_string(), "Invalid API key format");
        assert!(draft.is_empty());
    }

    #[tokio::test]
    async fn test_update_without_session_clears_draft() {
        let session = SessionManager::new(
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(FakeVerifier::new()),
        );
        session.initialize().await;
        let registry = ApiKeyRegistry::new(session, Arc::new(FakeKeyBackend::new("tok-1")));

        let mut draft = KeyDraft::new();
        draft.set(Provider::Gemini, Some("AIzaSyKey".to_string()));
        assert!(matches!(
            registry.update_keys(&mut draft).await,
            Err(ApiError::NotAuthenticated)
        ));
        assert!(draft.is_empty());
    }

    #[tokio::test]
    async fn test_update_gemini_key() {
        let backend = Arc::new(FakeKeyBackend::new("tok-1"));
        let registry = signed_in(backend.clone()).await;

        registry
            .update_gemini_key(Zeroizing::new(" AIzaSyDummyKeyForTesting123456789 ".to_string()))
            .await
            .unwrap();

        assert_eq!(
            backend.stored_key(Provider::Gemini).as_deref(),
            Some("AIzaSyDummyKeyForTesting123456789")
        );
        let status = registry.fetch_status().await.unwrap();
        assert!(status[&Provider::Gemini].has_key());
    }

    #[test]
    fn test_draft_debug_hides_values() {
        let mut draft = KeyDraft::new();
        draft.set(Provider::OpenAi, Some("sk-top-secret".to_string()));
        let debug = format!("{:?}", draft);
        assert!(debug.contains("OpenAi"));
        assert!(!debug.contains("top-secret"));
    }
}
