//! Passphrase-based sealing for session data kept on disk.
//!
//! Format: JSON envelope with base64 salt, nonce and ChaCha20-Poly1305
//! ciphertext. The key is derived from the passphrase with Argon2id and a
//! fresh random salt on every seal.

use anyhow::{anyhow, bail, Context, Result};
use argon2::Argon2;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

const KEY_LENGTH: usize = 32;
const SALT_LENGTH: usize = 16;
const NONCE_LENGTH: usize = 12;
const ENVELOPE_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SealedEnvelope {
    pub version: u32,
    pub salt: String,
    pub nonce: String,
    pub ciphertext: String,
}

pub struct SessionCipher {
    passphrase: Zeroizing<String>,
}

impl SessionCipher {
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self {
            passphrase: Zeroizing::new(passphrase.into()),
        }
    }

    fn derive_key(&self, salt: &[u8]) -> Result<Zeroizing<[u8; KEY_LENGTH]>> {
        let mut key = Zeroizing::new([0u8; KEY_LENGTH]);
        Argon2::default()
            .hash_password_into(self.passphrase.as_bytes(), salt, &mut *key)
            .map_err(|e| anyhow!("Failed to derive session key: {}", e))?;
        Ok(key)
    }

    pub fn seal(&self, plaintext: &[u8]) -> Result<SealedEnvelope> {
        let mut salt = [0u8; SALT_LENGTH];
        let mut nonce = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut salt);
        OsRng.fill_bytes(&mut nonce);

        let key = self.derive_key(&salt)?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&*key));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| anyhow!("Failed to encrypt session"))?;

        Ok(SealedEnvelope {
            version: ENVELOPE_VERSION,
            salt: BASE64.encode(salt),
            nonce: BASE64.encode(nonce),
            ciphertext: BASE64.encode(ciphertext),
        })
    }

    pub fn open(&self, envelope: &SealedEnvelope) -> Result<Zeroizing<Vec<u8>>> {
        if envelope.version != ENVELOPE_VERSION {
            bail!("Unsupported session envelope version {}", envelope.version);
        }

        let salt = BASE64.decode(&envelope.salt).context("Invalid salt encoding")?;
        let nonce = BASE64.decode(&envelope.nonce).context("Invalid nonce encoding")?;
        let ciphertext = BASE64
            .decode(&envelope.ciphertext)
            .context("Invalid ciphertext encoding")?;
        if nonce.len() != NONCE_LENGTH {
            bail!("Invalid nonce length {}", nonce.len());
        }

        let key = self.derive_key(&salt)?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&*key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
            .map_err(|_| anyhow!("Failed to decrypt session - wrong passphrase or tampered file"))?;
        Ok(Zeroizing::new(plaintext))
    }
}
