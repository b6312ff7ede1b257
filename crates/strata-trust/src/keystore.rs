//! Issuer-keyed public-key store
//!
//! One mutex serializes all access. The store is read-heavy (a lookup on
//! every verify) with rare writes (startup load, key rotation), so a
//! plain mutex with a short critical section is enough.

use std::collections::HashMap;
use std::path::Path;

use ed25519_dalek::pkcs8::DecodePublicKey;
use ed25519_dalek::VerifyingKey;
use parking_lot::Mutex;

use strata_core::{Result, SecurityError};

/// Hash table mapping issuer identity to its verification key.
#[derive(Debug, Default)]
pub struct PublicKeyStore {
    entries: Mutex<HashMap<String, VerifyingKey>>,
}

impl PublicKeyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a key for an issuer, replacing any prior entry. Replacement
    /// is logged, never an error.
    pub fn insert(&self, issuer: impl Into<String>, key: VerifyingKey) {
        let issuer = issuer.into();
        let mut entries = self.entries.lock();
        if entries.insert(issuer.clone(), key).is_some() {
            tracing::warn!(issuer = %issuer, "replacing public key for issuer");
        }
    }

    /// Look up an issuer's key. Exact, case-sensitive match.
    pub fn lookup(&self, issuer: &str) -> Option<VerifyingKey> {
        self.entries.lock().get(issuer).copied()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when no keys are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

const PEM_BEGIN: &str = "-----BEGIN PUBLIC KEY-----";
const PEM_END: &str = "-----END PUBLIC KEY-----";

/// Parse a public-key store file: whitespace-delimited alternating records
/// of issuer name then a PEM public-key block.
///
/// Any malformed record aborts the whole load; a bad keystore file is a
/// startup failure, not something to limp past per-record.
pub fn load_keystore_file(path: impl AsRef<Path>) -> Result<Vec<(String, VerifyingKey)>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|e| SecurityError::io(format!("keystore {}: {e}", path.display())))?;
    parse_keystore(&text)
        .map_err(|e| SecurityError::invalid(format!("keystore {}: {e}", path.display())))
}

fn parse_keystore(text: &str) -> std::result::Result<Vec<(String, VerifyingKey)>, String> {
    let mut entries = Vec::new();
    let mut rest = text.trim_start();
    while !rest.is_empty() {
        let end = rest
            .find(char::is_whitespace)
            .ok_or_else(|| "issuer name without key material".to_string())?;
        let issuer = &rest[..end];
        rest = rest[end..].trim_start();

        if !rest.starts_with(PEM_BEGIN) {
            return Err(format!("expected PEM public key after issuer {issuer}"));
        }
        let block_end = rest
            .find(PEM_END)
            .ok_or_else(|| format!("unterminated PEM block for issuer {issuer}"))?
            + PEM_END.len();
        let pem = &rest[..block_end];
        let key = VerifyingKey::from_public_key_pem(pem)
            .map_err(|e| format!("bad public key for issuer {issuer}: {e}"))?;

        tracing::debug!(issuer = %issuer, "loaded public key");
        entries.push((issuer.to_string(), key));
        rest = rest[block_end..].trim_start();
    }
    Ok(entries)
}
