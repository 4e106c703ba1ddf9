//! Identity verification against a remote identity directory
//!
//! A request is authentic only when both halves hold: the ed25519 signature
//! is valid over the presented nonce, and the presented public key is
//! *currently* authorized for the claimed account per the directory.
//! Signature validity alone is insufficient since keys can be revoked.
//!
//! Crypto failures fail closed (`Ok(false)`); a directory that cannot be
//! reached surfaces as `VerificationUnavailable`, never as a false identity.

use crate::error::ExchangeError;
use crate::types::AuthSignature;
use async_trait::async_trait;
use ed25519_dalek::{Signature, VerifyingKey};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Debug)]
pub enum DirectoryError {
    Http(String),
    Malformed(String),
}

impl std::fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DirectoryError::Http(e) => write!(f, "directory request failed: {}", e),
            DirectoryError::Malformed(e) => write!(f, "directory response malformed: {}", e),
        }
    }
}

impl std::error::Error for DirectoryError {}

/// Read-only capability: the current list of authorized signing keys for an
/// account. Eventually-consistent is acceptable; network failure is not a
/// verdict.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn list_authorized_keys(&self, account_id: &str) -> Result<Vec<String>, DirectoryError>;
}

/// Directory response shape: `{"keys": ["<hex>", ...]}`.
#[derive(Debug, Deserialize)]
struct KeyListResponse {
    keys: Vec<String>,
}

/// HTTP identity directory client.
pub struct HttpIdentityDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpIdentityDirectory {
    pub fn new(base_url: &str) -> Result<Self, DirectoryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| DirectoryError::Http(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl IdentityDirectory for HttpIdentityDirectory {
    async fn list_authorized_keys(&self, account_id: &str) -> Result<Vec<String>, DirectoryError> {
        let url = format!("{}/accounts/{}/keys", self.base_url, account_id);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| DirectoryError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DirectoryError::Http(format!(
                "directory returned {}",
                response.status()
            )));
        }

        let body: KeyListResponse = response
            .json()
            .await
            .map_err(|e| DirectoryError::Malformed(e.to_string()))?;

        Ok(body.keys)
    }
}

/// In-memory directory for tests and demos. Keys are authorized and revoked
/// explicitly; unknown accounts have no keys.
#[derive(Default)]
pub struct StaticIdentityDirectory {
    keys: RwLock<HashMap<String, Vec<String>>>,
}

impl StaticIdentityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn authorize(&self, account_id: &str, public_key_hex: &str) {
        let mut keys = self.keys.write().await;
        keys.entry(account_id.to_string())
            .or_default()
            .push(public_key_hex.to_string());
    }

    pub async fn revoke(&self, account_id: &str, public_key_hex: &str) {
        let mut keys = self.keys.write().await;
        if let Some(list) = keys.get_mut(account_id) {
            list.retain(|k| k != public_key_hex);
        }
    }
}

#[async_trait]
impl IdentityDirectory for StaticIdentityDirectory {
    async fn list_authorized_keys(&self, account_id: &str) -> Result<Vec<String>, DirectoryError> {
        let keys = self.keys.read().await;
        Ok(keys.get(account_id).cloned().unwrap_or_default())
    }
}

/// Verifies signed assertions of account ownership.
pub struct IdentityVerifier {
    directory: Arc<dyn IdentityDirectory>,
}

impl IdentityVerifier {
    pub fn new(directory: Arc<dyn IdentityDirectory>) -> Self {
        Self { directory }
    }

    /// `Ok(true)` when the signature is valid and the key is currently
    /// authorized. `Ok(false)` on any crypto mismatch, including malformed
    /// keys or signatures. `Err(VerificationUnavailable)` only when the
    /// directory could not be consulted.
    pub async fn verify(&self, signature: &AuthSignature) -> Result<bool, ExchangeError> {
        let Some(verifying_key) = decode_verifying_key(&signature.public_key) else {
            return Ok(false);
        };
        let Some(sig) = decode_signature(&signature.signed_block_height) else {
            return Ok(false);
        };

        let nonce = signature.block_height.to_string();
        if verifying_key.verify_strict(nonce.as_bytes(), &sig).is_err() {
            log::debug!("signature check failed for account {}", signature.account_id);
            return Ok(false);
        }

        let authorized = self
            .directory
            .list_authorized_keys(&signature.account_id)
            .await
            .map_err(|e| ExchangeError::VerificationUnavailable(e.to_string()))?;

        Ok(authorized
            .iter()
            .any(|k| k.eq_ignore_ascii_case(&signature.public_key)))
    }
}

fn decode_verifying_key(public_key_hex: &str) -> Option<VerifyingKey> {
    let bytes = hex::decode(public_key_hex).ok()?;
    let bytes: [u8; 32] = bytes.try_into().ok()?;
    VerifyingKey::from_bytes(&bytes).ok()
}

fn decode_signature(signature_hex: &str) -> Option<Signature> {
    let bytes = hex::decode(signature_hex).ok()?;
    Signature::from_slice(&bytes).ok()
}

/// Build a validly signed assertion from a freshly generated key. Returns
/// the assertion and the public key hex so tests can authorize it.
#[cfg(test)]
pub(crate) fn signed_assertion(account_id: &str, block_height: u64) -> (AuthSignature, String) {
    use ed25519_dalek::{Signer, SigningKey};
    use rand::rngs::OsRng;

    let signing_key = SigningKey::generate(&mut OsRng);
    let public_key_hex = hex::encode(signing_key.verifying_key().to_bytes());
    let sig = signing_key.sign(block_height.to_string().as_bytes());

    let assertion = AuthSignature {
        account_id: account_id.to_string(),
        public_key: public_key_hex.clone(),
        block_height,
        signed_block_height: hex::encode(sig.to_bytes()),
    };
    (assertion, public_key_hex)
}
