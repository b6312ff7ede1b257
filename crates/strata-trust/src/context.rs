//! Process-wide security context
//!
//! Everything the original design kept as module-level globals — the key
//! store, the trust store, the shared directory session — lives in one
//! explicit value constructed at startup and passed by reference to every
//! operation. One context per process is enforced by a lifecycle guard:
//! a second `initialize` without a shutdown is refused.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ed25519_dalek::pkcs8::DecodePrivateKey;
use ed25519_dalek::SigningKey;

use strata_core::{Result, SecurityConfig, SecurityError};

use crate::capability::Capability;
use crate::certificate::{CertificateIdentity, CertificateTrustVerifier};
use crate::credential::Credential;
use crate::engine::TrustEngine;
use crate::keystore::{load_keystore_file, PublicKeyStore};
use crate::ldap::{LdapConnector, LdapIdentityResolver};
use crate::mapping::AccountMapper;
use crate::runtime::CryptoRuntime;

static CONTEXT_ACTIVE: AtomicBool = AtomicBool::new(false);

/// The trust layer's single process-wide state value.
pub struct SecurityContext {
    engine: TrustEngine,
    keystore: Arc<PublicKeyStore>,
    cert_verifier: CertificateTrustVerifier,
    mapper: AccountMapper,
    ldap: Option<LdapIdentityResolver<LdapConnector>>,
}

impl SecurityContext {
    /// Build the context from configuration: load the private signing
    /// key, bulk-load the public-key store, load the CA bundle, and set
    /// up account mapping and directory resolution.
    ///
    /// Requires [`CryptoRuntime::install`] to have run. Fails with
    /// `AlreadyInitialized` if another context is live, and with an
    /// I/O or invalid-argument error (leaving no context) when any
    /// startup file is missing or unparsable.
    pub fn initialize(config: SecurityConfig) -> Result<Self> {
        if !CryptoRuntime::is_installed() {
            return Err(SecurityError::NotInitialized);
        }
        if CONTEXT_ACTIVE.swap(true, Ordering::SeqCst) {
            return Err(SecurityError::AlreadyInitialized);
        }
        match Self::build(config) {
            Ok(context) => Ok(context),
            Err(e) => {
                CONTEXT_ACTIVE.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    fn build(config: SecurityConfig) -> Result<Self> {
        let key_pem = std::fs::read_to_string(&config.private_key_path).map_err(|e| {
            SecurityError::io(format!(
                "private key {}: {e}",
                config.private_key_path.display()
            ))
        })?;
        let signing_key = SigningKey::from_pkcs8_pem(&key_pem).map_err(|e| {
            SecurityError::invalid(format!(
                "private key {}: {e}",
                config.private_key_path.display()
            ))
        })?;

        let keystore = Arc::new(PublicKeyStore::new());
        for (issuer, key) in load_keystore_file(&config.keystore_path)? {
            keystore.insert(issuer, key);
        }

        let cert_verifier = CertificateTrustVerifier::from_ca_bundle_path(&config.ca_bundle_path)?;

        let mapper = AccountMapper::new(
            config
                .mapping_rules
                .iter()
                .cloned()
                .map(Into::into)
                .collect(),
        );
        let ldap = config.ldap.clone().map(LdapIdentityResolver::new);

        let engine = TrustEngine::new(
            config.server_alias.clone(),
            signing_key,
            config.signature_scheme,
            config.capability_lifetime_secs,
            config.credential_lifetime_secs,
            Arc::clone(&keystore),
        )?;

        tracing::debug!(
            server_alias = %config.server_alias,
            keys = keystore.len(),
            ldap = ldap.is_some(),
            "security context initialized"
        );

        Ok(Self {
            engine,
            keystore,
            cert_verifier,
            mapper,
            ldap,
        })
    }

    /// Explicit teardown. Equivalent to dropping the context; spelled
    /// out so shutdown paths read as intent rather than scope end.
    pub fn shutdown(self) {}

    /// The capability/credential engine.
    pub fn engine(&self) -> &TrustEngine {
        &self.engine
    }

    /// The shared public-key store, for key-rotation updates.
    pub fn keystore(&self) -> &PublicKeyStore {
        &self.keystore
    }

    /// A zeroed capability sized for this node's signing key.
    pub fn init_capability(&self) -> Capability {
        self.engine.init_capability()
    }

    /// A zeroed credential sized for this node's signing key.
    pub fn init_credential(&self) -> Credential {
        self.engine.init_credential()
    }

    /// Sign a caller-populated capability as this node.
    pub fn sign_capability(&self, cap: &mut Capability) -> Result<()> {
        self.engine.sign_capability(cap)
    }

    /// Sign a caller-populated credential as this node.
    pub fn sign_credential(&self, cred: &mut Credential) -> Result<()> {
        self.engine.sign_credential(cred)
    }

    /// Verify a capability against the current clock.
    pub fn verify_capability(&self, cap: &Capability) -> bool {
        self.engine.verify_capability(cap)
    }

    /// Verify a credential against the current clock.
    pub fn verify_credential(&self, cred: &Credential) -> bool {
        self.engine.verify_credential(cred)
    }

    /// Verify a presented certificate chain plus possession proof.
    pub fn verify_certificate(&self, cert_pem: &[u8], proof_sig: &[u8]) -> Result<()> {
        self.cert_verifier.verify_presented(cert_pem, proof_sig)
    }

    /// Map a verified certificate to a local account via the configured
    /// rules. `Ok(None)` means no rule matched; the caller must treat
    /// that as access denied.
    pub fn map_certificate_account(&self, cert_pem: &[u8]) -> Result<Option<String>> {
        let identity = CertificateIdentity::from_pem(cert_pem).map_err(|e| {
            tracing::debug!(error = %e, "certificate for account mapping does not parse");
            SecurityError::denied()
        })?;
        Ok(self.mapper.find_account(&identity.subject, &identity.emails))
    }

    /// Resolve a verified certificate to uid/gids through the directory.
    pub fn resolve_certificate_identity(&self, cert_pem: &[u8]) -> Result<(u32, Vec<u32>)> {
        let ldap = self
            .ldap
            .as_ref()
            .ok_or_else(|| SecurityError::invalid("LDAP identity resolution is not configured"))?;
        ldap.map_certificate(cert_pem)
    }

    /// Interactive password authentication through the directory.
    pub fn authenticate_user(&self, username: &str, password: &str) -> Result<()> {
        let ldap = self
            .ldap
            .as_ref()
            .ok_or_else(|| SecurityError::invalid("LDAP identity resolution is not configured"))?;
        ldap.authenticate(username, password)
    }
}

impl Drop for SecurityContext {
    fn drop(&mut self) {
        if let Some(ldap) = &self.ldap {
            ldap.shutdown();
        }
        self.keystore.clear();
        CONTEXT_ACTIVE.store(false, Ordering::SeqCst);
        tracing::debug!("security context shut down");
    }
}

impl std::fmt::Debug for SecurityContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityContext")
            .field("engine", &self.engine)
            .field("keys", &self.keystore.len())
            .field("ldap", &self.ldap.is_some())
            .finish_non_exhaustive()
    }
}
