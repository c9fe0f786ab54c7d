//! Persistence for the session credential and its user record.
//!
//! The pair is always stored as one unit so a reader can never observe a
//! credential without its user or the reverse.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use keyring::Entry;
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, warn};

use super::seal::{SealedEnvelope, SessionCipher};
use super::AuthGrant;

/// Session file name in the data directory
const SESSION_FILE: &str = "session.json";

/// Keychain service name for the keyring backend
const SERVICE_NAME: &str = "lettermind";

/// Keychain account holding the serialized session
const SESSION_ACCOUNT: &str = "session";

/// Storage for the credential + user pair.
///
/// `save` and `clear` are idempotent. `load` never returns partial state:
/// unreadable or incomplete data is reported as no session.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Option<AuthGrant>;
    fn save(&self, grant: &AuthGrant) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

fn usable(grant: AuthGrant) -> Option<AuthGrant> {
    if grant.access_token.trim().is_empty() {
        warn!("Stored session has an empty credential, ignoring it");
        None
    } else {
        Some(grant)
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// Process-local store, for tests and embedders that manage persistence
/// themselves.
#[derive(Default)]
pub struct MemoryCredentialStore {
    slot: Mutex<Option<AuthGrant>>,
    loads: AtomicUsize,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(grant: AuthGrant) -> Self {
        Self {
            slot: Mutex::new(Some(grant)),
            loads: AtomicUsize::new(0),
        }
    }

    /// Current contents without counting as a load
    pub fn snapshot(&self) -> Option<AuthGrant> {
        self.slot.lock().clone()
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Option<AuthGrant> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.slot.lock().clone().and_then(usable)
    }

    fn save(&self, grant: &AuthGrant) -> Result<()> {
        *self.slot.lock() = Some(grant.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.slot.lock() = None;
        Ok(())
    }
}

// ============================================================================
// File store
// ============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum SessionFile {
    Sealed(SealedEnvelope),
    Plain(AuthGrant),
}

/// JSON file in the data directory, optionally sealed with a passphrase.
/// Writes go to a temporary file that is renamed into place.
pub struct FileCredentialStore {
    path: PathBuf,
    cipher: Option<SessionCipher>,
}

impl FileCredentialStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(SESSION_FILE),
            cipher: None,
        }
    }

    /// Encrypt the session at rest with a key derived from `passphrase`
    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.cipher = Some(SessionCipher::new(passphrase));
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }

    /// Read the session file. The flag is true when the file held a plain,
    /// unsealed session.
    fn read(&self) -> Result<Option<(AuthGrant, bool)>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read(&self.path).context("Failed to read session file")?;
        let file: SessionFile =
            serde_json::from_slice(&contents).context("Failed to parse session file")?;

        let read = match file {
            SessionFile::Plain(grant) => (grant, true),
            SessionFile::Sealed(envelope) => {
                let cipher = self
                    .cipher
                    .as_ref()
                    .context("Session file is encrypted but no passphrase is configured")?;
                let plaintext = cipher.open(&envelope)?;
                let grant = serde_json::from_slice(&plaintext)
                    .context("Failed to parse decrypted session")?;
                (grant, false)
            }
        };
        Ok(Some(read))
    }

    fn write_atomic(&self, contents: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = self.tmp_path();
        let result = Self::write_private(&tmp, contents)
            .context("Failed to write session file")
            .and_then(|()| {
                std::fs::rename(&tmp, &self.path).context("Failed to replace session file")
            });
        if result.is_err() {
            let _ = std::fs::remove_file(&tmp);
        }
        result
    }

    /// Create `path` readable by the owner only, before any byte is written
    fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(path)?;
        file.write_all(contents)?;
        file.sync_all()
    }

    fn remove_if_present(path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Option<AuthGrant> {
        match self.read() {
            Ok(Some((grant, plain))) => {
                if plain && self.cipher.is_some() {
                    warn!(path = %self.path.display(), "Session file is not encrypted, sealing it now");
                    if let Err(e) = self.save(&grant) {
                        warn!(error = %e, "Failed to seal session file");
                    }
                }
                usable(grant)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, path = %self.path.display(), "Ignoring unreadable session file");
                None
            }
        }
    }

    fn save(&self, grant: &AuthGrant) -> Result<()> {
        let plain = zeroize::Zeroizing::new(serde_json::to_vec(grant)?);
        match self.cipher {
            Some(ref cipher) => {
                let envelope = cipher.seal(&plain)?;
                self.write_atomic(&serde_json::to_vec_pretty(&envelope)?)?;
            }
            None => self.write_atomic(&plain)?,
        }
        debug!(path = %self.path.display(), sealed = self.cipher.is_some(), "Session saved");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        // A write interrupted before its rename can leave the temp copy behind
        Self::remove_if_present(&self.tmp_path())?;
        Self::remove_if_present(&self.path)
    }
}

// ============================================================================
// OS keychain store
// ============================================================================

/// Whole session serialized into a single OS keychain entry.
pub struct KeyringCredentialStore {
    service: String,
}

impl KeyringCredentialStore {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    pub fn with_service(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(&self.service, SESSION_ACCOUNT).context("Failed to create keyring entry")
    }
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn load(&self) -> Option<AuthGrant> {
        let entry = match self.entry() {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Keychain unavailable");
                return None;
            }
        };

        let secret = match entry.get_password() {
            Ok(secret) => zeroize::Zeroizing::new(secret),
            Err(keyring::Error::NoEntry) => {
                debug!("No session in keychain");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read session from keychain");
                return None;
            }
        };

        match serde_json::from_str::<AuthGrant>(&secret) {
            Ok(grant) => usable(grant),
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable session in keychain");
                None
            }
        }
    }

    fn save(&self, grant: &AuthGrant) -> Result<()> {
        let secret = zeroize::Zeroizing::new(serde_json::to_string(grant)?);
        self.entry()?
            .set_password(&secret)
            .context("Failed to store session in keychain")?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete session from keychain"),
        }
    }
}
