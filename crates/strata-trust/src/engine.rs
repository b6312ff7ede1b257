//! Capability/credential signing and verification
//!
//! The engine owns this node's private signing key and issuer alias, and
//! borrows the shared [`PublicKeyStore`] to find verification keys.
//!
//! `verify_*` is a pure predicate over (object, now, key-store contents):
//! no state transition, identical results concurrent and serial. Every
//! internal failure mode collapses to `false` so callers cannot tell a bad
//! signature from an unknown issuer from an expired object; the reason is
//! logged at debug level for operators only.

use std::sync::Arc;

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey, SIGNATURE_LENGTH};

use strata_core::{unix_now, Result, SecurityError, SignatureScheme};

use crate::capability::Capability;
use crate::credential::Credential;
use crate::keystore::PublicKeyStore;

/// Signs and verifies capabilities and credentials for one node.
pub struct TrustEngine {
    issuer: String,
    signing_key: SigningKey,
    scheme: SignatureScheme,
    capability_lifetime: u64,
    credential_lifetime: u64,
    keystore: Arc<PublicKeyStore>,
}

impl TrustEngine {
    /// Build an engine. Fails if the configured scheme is not available
    /// in this build.
    pub fn new(
        issuer: String,
        signing_key: SigningKey,
        scheme: SignatureScheme,
        capability_lifetime: u64,
        credential_lifetime: u64,
        keystore: Arc<PublicKeyStore>,
    ) -> Result<Self> {
        if scheme == SignatureScheme::Ed25519ph && !cfg!(feature = "prehashed") {
            return Err(SecurityError::invalid(
                "signature scheme ed25519ph requires the `prehashed` build feature",
            ));
        }
        Ok(Self {
            issuer,
            signing_key,
            scheme,
            capability_lifetime,
            credential_lifetime,
            keystore,
        })
    }

    /// Output size of the signing primitive, in bytes.
    pub fn signature_len(&self) -> usize {
        SIGNATURE_LENGTH
    }

    /// This node's verification key, for distribution to peers.
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// A zeroed capability with its signature buffer sized to this
    /// engine's key output.
    pub fn init_capability(&self) -> Capability {
        Capability {
            signature: vec![0u8; self.signature_len()],
            ..Capability::null()
        }
    }

    /// A zeroed credential with its signature buffer sized to this
    /// engine's key output.
    pub fn init_credential(&self) -> Credential {
        Credential {
            signature: vec![0u8; self.signature_len()],
            ..Credential::null()
        }
    }

    /// Stamp issuer and expiry into a caller-populated capability and
    /// sign it. Issuer and timeout are never caller-supplied.
    pub fn sign_capability(&self, cap: &mut Capability) -> Result<()> {
        cap.issuer = self.issuer.clone();
        cap.timeout = unix_now() + self.capability_lifetime;
        cap.signature = self.sign_buffer(&cap.signing_bytes())?;
        tracing::debug!(
            issuer = %cap.issuer,
            fsid = cap.fsid,
            timeout = cap.timeout,
            num_handles = cap.handles.len(),
            signature = %hex::encode(&cap.signature),
            "signed capability"
        );
        Ok(())
    }

    /// Stamp issuer and expiry into a caller-populated credential and
    /// sign it.
    pub fn sign_credential(&self, cred: &mut Credential) -> Result<()> {
        cred.issuer = self.issuer.clone();
        cred.timeout = unix_now() + self.credential_lifetime;
        cred.signature = self.sign_buffer(&cred.signing_bytes())?;
        tracing::debug!(
            issuer = %cred.issuer,
            userid = cred.userid,
            serial = cred.serial,
            signature = %hex::encode(&cred.signature),
            "signed credential"
        );
        Ok(())
    }

    /// Verify a capability against the current clock.
    pub fn verify_capability(&self, cap: &Capability) -> bool {
        self.verify_capability_at(cap, unix_now())
    }

    /// Verify a capability at an explicit time. Valid through `timeout`
    /// inclusive: `now == timeout` verifies, `now == timeout + 1` does
    /// not. An off-by-one here is a vulnerability, not a nit.
    pub fn verify_capability_at(&self, cap: &Capability, now: u64) -> bool {
        if cap.is_null() {
            return true;
        }
        if now > cap.timeout {
            tracing::debug!(issuer = %cap.issuer, timeout = cap.timeout, "capability expired");
            return false;
        }
        self.verify_signed(&cap.issuer, &cap.signing_bytes(), &cap.signature)
    }

    /// Verify a credential against the current clock.
    pub fn verify_credential(&self, cred: &Credential) -> bool {
        self.verify_credential_at(cred, unix_now())
    }

    /// Verify a credential at an explicit time. Same expiry boundary as
    /// capabilities.
    pub fn verify_credential_at(&self, cred: &Credential, now: u64) -> bool {
        if cred.is_null() {
            return true;
        }
        if now > cred.timeout {
            tracing::debug!(issuer = %cred.issuer, timeout = cred.timeout, "credential expired");
            return false;
        }
        self.verify_signed(&cred.issuer, &cred.signing_bytes(), &cred.signature)
    }

    fn verify_signed(&self, issuer: &str, message: &[u8], signature: &[u8]) -> bool {
        // Unknown issuer fails closed; it is not an error.
        let Some(key) = self.keystore.lookup(issuer) else {
            tracing::debug!(issuer = %issuer, "no public key for issuer");
            return false;
        };
        let Ok(sig) = ed25519_dalek::Signature::from_slice(signature) else {
            tracing::debug!(issuer = %issuer, "malformed signature buffer");
            return false;
        };
        let ok = verify_buffer(&key, self.scheme, message, &sig);
        if !ok {
            tracing::debug!(issuer = %issuer, "signature mismatch");
        }
        ok
    }

    fn sign_buffer(&self, message: &[u8]) -> Result<Vec<u8>> {
        match self.scheme {
            SignatureScheme::Ed25519 => Ok(self.signing_key.sign(message).to_bytes().to_vec()),
            SignatureScheme::Ed25519ph => sign_prehashed(&self.signing_key, message),
        }
    }
}

impl std::fmt::Debug for TrustEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustEngine")
            .field("issuer", &self.issuer)
            .field("scheme", &self.scheme)
            .field("capability_lifetime", &self.capability_lifetime)
            .field("credential_lifetime", &self.credential_lifetime)
            .finish_non_exhaustive()
    }
}

fn verify_buffer(
    key: &VerifyingKey,
    scheme: SignatureScheme,
    message: &[u8],
    signature: &ed25519_dalek::Signature,
) -> bool {
    match scheme {
        SignatureScheme::Ed25519 => key.verify(message, signature).is_ok(),
        SignatureScheme::Ed25519ph => verify_prehashed(key, message, signature),
    }
}

#[cfg(feature = "prehashed")]
fn sign_prehashed(key: &SigningKey, message: &[u8]) -> Result<Vec<u8>> {
    use sha2::{Digest, Sha512};
    let mut digest = Sha512::new();
    digest.update(message);
    key.sign_prehashed(digest, None)
        .map(|sig| sig.to_bytes().to_vec())
        .map_err(|e| SecurityError::internal(format!("prehashed signing failed: {e}")))
}

#[cfg(not(feature = "prehashed"))]
fn sign_prehashed(_key: &SigningKey, _message: &[u8]) -> Result<Vec<u8>> {
    // Unreachable: TrustEngine::new rejects the scheme in this build.
    Err(SecurityError::invalid(
        "signature scheme ed25519ph requires the `prehashed` build feature",
    ))
}

#[cfg(feature = "prehashed")]
fn verify_prehashed(
    key: &VerifyingKey,
    message: &[u8],
    signature: &ed25519_dalek::Signature,
) -> bool {
    use sha2::{Digest, Sha512};
    let mut digest = Sha512::new();
    digest.update(message);
    key.verify_prehashed(digest, None, signature).is_ok()
}

#[cfg(not(feature = "prehashed"))]
fn verify_prehashed(
    _key: &VerifyingKey,
    _message: &[u8],
    _signature: &ed25519_dalek::Signature,
) -> bool {
    false
}
