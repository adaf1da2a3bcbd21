//! Sealed credential values
//!
//! Provider credentials (Deezer ARL cookie, Spotify password) may be stored
//! in `config.yaml` either in clear or sealed as `sealed:BASE64`. A sealed
//! value is `nonce(12) || AES-256-GCM ciphertext`, keyed by a SHA-256 digest
//! of the machine identifier, so a sealed file only opens on the machine
//! that produced it.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use anyhow::{anyhow, Result};
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::Config;

const SEALED_PREFIX: &str = "sealed:";
const KEY_CONTEXT: &[u8] = b"spotilava-credential-key-v1";
const NONCE_CONTEXT: &[u8] = b"spotilava-credential-nonce-v1";
const NONCE_LEN: usize = 12;

fn machine_id() -> Result<String> {
    for candidate in ["/etc/machine-id", "/var/lib/dbus/machine-id"] {
        if let Ok(id) = std::fs::read_to_string(candidate) {
            let id = id.trim();
            if !id.is_empty() {
                return Ok(id.to_string());
            }
        }
    }
    Err(anyhow!("no machine identifier available to open sealed credentials"))
}

fn machine_key() -> Result<[u8; 32]> {
    let id = machine_id()?;
    Ok(digest(&[id.as_bytes(), KEY_CONTEXT]))
}

fn digest(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Returns `true` when the value is a sealed credential.
pub fn is_sealed(value: &str) -> bool {
    value.starts_with(SEALED_PREFIX)
}

fn seal_with_key(key: &[u8; 32], plain: &str) -> Result<String> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| anyhow!("invalid key: {}", e))?;

    // Deterministic nonce: sealing the same value twice leaves config.yaml unchanged.
    let nonce_seed = digest(&[plain.as_bytes(), NONCE_CONTEXT]);
    let nonce = Nonce::from_slice(&nonce_seed[..NONCE_LEN]);

    let ciphertext = cipher
        .encrypt(nonce, plain.as_bytes())
        .map_err(|e| anyhow!("sealing failed: {}", e))?;

    let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    payload.extend_from_slice(&nonce_seed[..NONCE_LEN]);
    payload.extend_from_slice(&ciphertext);

    Ok(format!(
        "{}{}",
        SEALED_PREFIX,
        base64::engine::general_purpose::STANDARD.encode(payload)
    ))
}

fn open_with_key(key: &[u8; 32], sealed: &str) -> Result<String> {
    let encoded = sealed
        .strip_prefix(SEALED_PREFIX)
        .ok_or_else(|| anyhow!("value is not sealed"))?;
    let payload = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| anyhow!("invalid sealed value: {}", e))?;
    if payload.len() <= NONCE_LEN {
        return Err(anyhow!("invalid sealed value: payload too short"));
    }

    let (nonce, ciphertext) = payload.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| anyhow!("invalid key: {}", e))?;
    let plain = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| anyhow!("cannot open sealed value (other machine or corrupted data)"))?;

    String::from_utf8(plain).map_err(|e| anyhow!("sealed value is not UTF-8: {}", e))
}

/// Seals a credential with the key of the current machine.
pub fn seal(plain: &str) -> Result<String> {
    seal_with_key(&machine_key()?, plain)
}

/// Returns the clear text of a credential, opening it when it is sealed.
pub fn reveal(value: &str) -> Result<String> {
    if is_sealed(value) {
        open_with_key(&machine_key()?, value)
    } else {
        Ok(value.to_string())
    }
}

impl Config {
    /// Reads a credential at `path`, opening it if it is sealed.
    ///
    /// Returns `Ok(None)` when the credential is not configured.
    pub fn get_secret(&self, path: &[&str]) -> Result<Option<String>> {
        match self.get_string(path) {
            Some(value) => reveal(&value).map(Some),
            None => Ok(None),
        }
    }

    /// Stores a credential at `path` in sealed form.
    pub fn set_secret(&self, path: &[&str], plain: &str) -> Result<()> {
        self.set_value(path, serde_yaml::Value::String(seal(plain)?))
    }
}
