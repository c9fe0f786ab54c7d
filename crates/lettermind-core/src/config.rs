//! Application configuration management.
//!
//! This module handles loading and saving the client configuration: the
//! backend URL, the optional Google client id, where the session is kept,
//! and the last email used to sign in.
//!
//! Configuration is stored at `~/.config/lettermind/config.json`; environment
//! variables override the file.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::auth::{CredentialStore, FileCredentialStore, KeyringCredentialStore};

/// Application name used for config/data directory paths
const APP_NAME: &str = "lettermind";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Backend used when nothing else is configured (local development server)
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8001";

pub const ENV_BACKEND_URL: &str = "LETTERMIND_BACKEND_URL";
pub const ENV_GOOGLE_CLIENT_ID: &str = "LETTERMIND_GOOGLE_CLIENT_ID";
pub const ENV_CREDENTIAL_BACKEND: &str = "LETTERMIND_CREDENTIAL_BACKEND";
pub const ENV_SESSION_PASSPHRASE: &str = "LETTERMIND_SESSION_PASSPHRASE";

/// Where the session credential is persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackend {
    #[default]
    File,
    Keyring,
}

impl FromStr for CredentialBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "file" => Ok(CredentialBackend::File),
            "keyring" | "keychain" => Ok(CredentialBackend::Keyring),
            other => Err(anyhow::anyhow!("Unknown credential backend: {}", other)),
        }
    }
}

impl fmt::Display for CredentialBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialBackend::File => write!(f, "file"),
            CredentialBackend::Keyring => write!(f, "keyring"),
        }
    }
}

fn default_backend_url() -> String {
    DEFAULT_BACKEND_URL.to_string()
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
    #[serde(default)]
    pub google_client_id: Option<String>,
    #[serde(default)]
    pub credential_backend: CredentialBackend,
    #[serde(default)]
    pub last_email: Option<String>,
    /// Only ever taken from the environment, never written to disk
    #[serde(skip)]
    pub session_passphrase: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            google_client_id: None,
            credential_backend: CredentialBackend::default(),
            last_email: None,
            session_passphrase: None,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("backend_url", &self.backend_url)
            .field("google_client_id", &self.google_client_id)
            .field("credential_backend", &self.credential_backend)
            .field("last_email", &self.last_email)
            .field("session_passphrase", &self.session_passphrase.as_ref().map(|_| "<set>"))
            .finish()
    }
}

impl Config {
    /// Load the config file (if any), then apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")?
        } else {
            Self::default()
        };
        config.normalize();
        Ok(config)
    }

    /// Override settings from environment variables, looked up through `var`
    pub fn apply_env<F: Fn(&str) -> Option<String>>(&mut self, var: F) {
        if let Some(url) = var(ENV_BACKEND_URL) {
            self.backend_url = url;
        }
        if let Some(client_id) = var(ENV_GOOGLE_CLIENT_ID) {
            self.google_client_id = Some(client_id);
        }
        if let Some(backend) = var(ENV_CREDENTIAL_BACKEND) {
            match backend.parse() {
                Ok(backend) => self.credential_backend = backend,
                Err(e) => warn!(error = %e, "Ignoring {}", ENV_CREDENTIAL_BACKEND),
            }
        }
        if let Some(passphrase) = var(ENV_SESSION_PASSPHRASE) {
            self.session_passphrase = Some(passphrase);
        }
        self.normalize();
    }

    fn normalize(&mut self) {
        let url = self.backend_url.trim().trim_end_matches('/');
        self.backend_url = if url.is_empty() {
            default_backend_url()
        } else {
            url.to_string()
        };
        self.google_client_id = self
            .google_client_id
            .take()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());
        self.session_passphrase = self.session_passphrase.take().filter(|p| !p.is_empty());
    }

    /// Record the email of the last sign-in. Only that field changes on disk;
    /// environment overrides never reach the file.
    pub fn remember_email(&mut self, email: &str) -> Result<()> {
        self.remember_email_at(&Self::config_path()?, email)
    }

    fn remember_email_at(&mut self, path: &Path, email: &str) -> Result<()> {
        let mut on_disk = Self::load_from(path)?;
        on_disk.last_email = Some(email.to_string());
        on_disk.save_to(path)?;
        self.last_email = Some(email.to_string());
        Ok(())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory for the session file and logs
    pub fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// Whether Google sign-in can be offered at all
    pub fn google_enabled(&self) -> bool {
        self.google_client_id.is_some()
    }

    pub fn open_credential_store(&self) -> Result<Arc<dyn CredentialStore>> {
        let store: Arc<dyn CredentialStore> = match self.credential_backend {
            CredentialBackend::Keyring => Arc::new(KeyringCredentialStore::new()),
            CredentialBackend::File => {
                let store = FileCredentialStore::new(&Self::data_dir()?);
                match self.session_passphrase {
                    Some(ref passphrase) => Arc::new(store.with_passphrase(passphrase.clone())),
                    None => Arc::new(store),
                }
            }
        };
        Ok(store)
    }
}
