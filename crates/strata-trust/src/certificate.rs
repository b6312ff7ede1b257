//! X.509 certificate trust verification
//!
//! Two independent checks, both required. Chain trust: the presented PEM
//! chain must verify against the CA bundle loaded at startup. Proof of
//! possession: a detached signature over the presented certificate text
//! must verify with the certificate's own public key, proving the
//! presenter holds the matching private key rather than a copy of someone
//! else's certificate. Either check failing yields the same opaque
//! [`SecurityError::Denied`].

use std::path::Path;
use std::sync::Arc;

use ed25519_dalek::{Verifier, VerifyingKey};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, UnixTime};
use rustls::server::danger::ClientCertVerifier;
use rustls::server::WebPkiClientVerifier;
use rustls::RootCertStore;
use x509_parser::oid_registry::OID_SIG_ED25519;
use x509_parser::prelude::{FromDer, GeneralName, X509Certificate, X509Name};

use strata_core::{Result, SecurityError};

/// Verifies presented certificate chains against the trusted CA bundle.
#[derive(Debug, Clone)]
pub struct CertificateTrustVerifier {
    verifier: Arc<dyn ClientCertVerifier>,
}

impl CertificateTrustVerifier {
    /// Load the CA bundle from a file of concatenated PEM certificates.
    pub fn from_ca_bundle_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| SecurityError::io(format!("CA bundle {}: {e}", path.display())))?;
        Self::from_ca_bundle_pem(&bytes)
            .map_err(|e| match e {
                SecurityError::InvalidArgument { message } => {
                    SecurityError::invalid(format!("CA bundle {}: {message}", path.display()))
                }
                other => other,
            })
    }

    /// Build the trust store from concatenated PEM certificates. The
    /// bundle is read-only for the life of the verifier.
    pub fn from_ca_bundle_pem(pem: &[u8]) -> Result<Self> {
        let cas: Vec<CertificateDer<'static>> = CertificateDer::pem_slice_iter(pem)
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| SecurityError::invalid(format!("failed to parse CA certificates: {e}")))?;
        if cas.is_empty() {
            return Err(SecurityError::invalid("no CA certificates in bundle"));
        }

        let mut roots = RootCertStore::empty();
        for ca in cas {
            roots
                .add(ca)
                .map_err(|e| SecurityError::invalid(format!("failed to add CA certificate: {e}")))?;
        }

        let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
            .build()
            .map_err(|e| SecurityError::internal(format!("failed to build chain verifier: {e}")))?;

        Ok(Self { verifier })
    }

    /// Verify a presented certificate chain (leaf first) and a detached
    /// proof-of-possession signature over the presented PEM text.
    ///
    /// The outcome is all-or-nothing; the reason a presentation was
    /// rejected is logged, never returned.
    pub fn verify_presented(&self, cert_pem: &[u8], proof_sig: &[u8]) -> Result<()> {
        let chain: Vec<CertificateDer<'_>> = CertificateDer::pem_slice_iter(cert_pem)
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| {
                tracing::debug!(error = %e, "presented certificate is not valid PEM");
                SecurityError::denied()
            })?;
        let Some((leaf, intermediates)) = chain.split_first() else {
            tracing::debug!("presented certificate chain is empty");
            return Err(SecurityError::denied());
        };

        // Chain trust. The verifier's return code is authoritative; the
        // error detail is observed for diagnostics only.
        self.verifier
            .verify_client_cert(leaf, intermediates, UnixTime::now())
            .map_err(|e| {
                tracing::debug!(error = %e, "certificate chain verification failed");
                SecurityError::denied()
            })?;

        // Proof of possession with the leaf's own embedded key.
        let key = leaf_verifying_key(leaf)?;
        let sig = ed25519_dalek::Signature::from_slice(proof_sig).map_err(|e| {
            tracing::debug!(error = %e, "malformed possession signature");
            SecurityError::denied()
        })?;
        key.verify(cert_pem, &sig).map_err(|e| {
            tracing::debug!(error = %e, "possession signature verification failed");
            SecurityError::denied()
        })?;

        Ok(())
    }
}

/// Extract the leaf certificate's Ed25519 verification key. Certificates
/// carrying any other key type fail closed.
fn leaf_verifying_key(leaf: &CertificateDer<'_>) -> Result<VerifyingKey> {
    let (_, cert) = X509Certificate::from_der(leaf.as_ref()).map_err(|e| {
        tracing::debug!(error = %e, "presented certificate does not parse");
        SecurityError::denied()
    })?;
    let spki = cert.public_key();
    if spki.algorithm.algorithm != OID_SIG_ED25519 {
        tracing::debug!(
            oid = %spki.algorithm.algorithm,
            "certificate key is not Ed25519"
        );
        return Err(SecurityError::denied());
    }
    let bytes: [u8; 32] = spki
        .subject_public_key
        .data
        .as_ref()
        .try_into()
        .map_err(|_| {
            tracing::debug!("certificate SPKI has unexpected length");
            SecurityError::denied()
        })?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| {
        tracing::debug!(error = %e, "certificate key does not decode");
        SecurityError::denied()
    })
}

/// Subject and email identities read off a certificate, the inputs to
/// account mapping and directory resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateIdentity {
    /// One-line, slash-delimited subject: `/C=US/O=Acme/CN=bsmith`
    pub subject: String,
    /// Email addresses from the SAN extension plus the subject
    /// emailAddress attribute, in that order
    pub emails: Vec<String>,
}

impl CertificateIdentity {
    /// Read the identity off the first certificate in a PEM block.
    pub fn from_pem(cert_pem: &[u8]) -> Result<Self> {
        let (_, pem) = x509_parser::pem::parse_x509_pem(cert_pem)
            .map_err(|e| SecurityError::invalid(format!("certificate is not valid PEM: {e}")))?;
        let cert = pem
            .parse_x509()
            .map_err(|e| SecurityError::invalid(format!("certificate does not parse: {e}")))?;

        let subject = subject_oneline(cert.subject());
        if subject.is_empty() {
            return Err(SecurityError::invalid("certificate has no subject"));
        }

        let mut emails = Vec::new();
        if let Ok(Some(san)) = cert.subject_alternative_name() {
            for name in &san.value.general_names {
                if let GeneralName::RFC822Name(email) = name {
                    emails.push((*email).to_string());
                }
            }
        }
        for attr in cert.subject().iter_email() {
            if let Ok(email) = attr.as_str() {
                if !emails.iter().any(|e| e == email) {
                    emails.push(email.to_string());
                }
            }
        }

        Ok(Self { subject, emails })
    }
}

/// Render a subject as a one-line, slash-delimited string in DER
/// attribute order, e.g. `/C=US/O=Acme/CN=bsmith`.
pub fn subject_oneline(name: &X509Name<'_>) -> String {
    let registry = x509_parser::objects::oid_registry();
    let mut out = String::new();
    for attr in name.iter_attributes() {
        let Ok(value) = attr.as_str() else {
            continue;
        };
        let short = x509_parser::objects::oid2abbrev(attr.attr_type(), registry)
            .unwrap_or("UNKNOWN");
        out.push('/');
        out.push_str(short);
        out.push('=');
        out.push_str(value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::CryptoRuntime;
    use ed25519_dalek::pkcs8::DecodePrivateKey;
    use ed25519_dalek::{Signer, SigningKey};
    use rcgen::{CertificateParams, DnType, ExtendedKeyUsagePurpose, KeyPair};
    use serial_test::serial;

    fn install_runtime() {
        // Idempotent across tests; the guard error just means another
        // test installed first.
        let _ = CryptoRuntime::install();
    }

    fn generate_ca(cn: &str) -> (rcgen::Certificate, KeyPair) {
        let key = KeyPair::generate_for(&rcgen::PKCS_ED25519).unwrap();
        let mut params = CertificateParams::default();
        params.distinguished_name.push(DnType::CommonName, cn);
        params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        let cert = params.self_signed(&key).unwrap();
        (cert, key)
    }

    fn generate_leaf(
        ca: &rcgen::Certificate,
        ca_key: &KeyPair,
        cn: &str,
        email: Option<&str>,
    ) -> (rcgen::Certificate, KeyPair) {
        let key = KeyPair::generate_for(&rcgen::PKCS_ED25519).unwrap();
        let mut params = CertificateParams::default();
        // Default params pre-seed a CN; reset so insertion order is O, CN
        params.distinguished_name = rcgen::DistinguishedName::new();
        params
            .distinguished_name
            .push(DnType::OrganizationName, "Acme");
        params.distinguished_name.push(DnType::CommonName, cn);
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
        if let Some(email) = email {
            params.subject_alt_names =
                vec![rcgen::SanType::Rfc822Name(email.try_into().unwrap())];
        }
        let cert = params.signed_by(&key, ca, ca_key).unwrap();
        (cert, key)
    }

    fn possession_sig(cert_pem: &[u8], key: &KeyPair) -> Vec<u8> {
        let signing_key = SigningKey::from_pkcs8_der(&key.serialize_der()).unwrap();
        signing_key.sign(cert_pem).to_bytes().to_vec()
    }

    #[test]
    #[serial(crypto_runtime)]
    fn trusted_chain_with_possession_proof_verifies() {
        install_runtime();
        let (ca, ca_key) = generate_ca("Test CA");
        let (leaf, leaf_key) = generate_leaf(&ca, &ca_key, "node.example.com", None);

        let verifier = CertificateTrustVerifier::from_ca_bundle_pem(ca.pem().as_bytes()).unwrap();
        let pem = leaf.pem().into_bytes();
        let sig = possession_sig(&pem, &leaf_key);
        assert!(verifier.verify_presented(&pem, &sig).is_ok());
    }

    #[test]
    #[serial(crypto_runtime)]
    fn chain_from_stranger_ca_is_denied() {
        install_runtime();
        let (trusted_ca, _) = generate_ca("Trusted CA");
        let (stranger_ca, stranger_key) = generate_ca("Stranger CA");
        let (leaf, leaf_key) = generate_leaf(&stranger_ca, &stranger_key, "node", None);

        let verifier =
            CertificateTrustVerifier::from_ca_bundle_pem(trusted_ca.pem().as_bytes()).unwrap();
        let pem = leaf.pem().into_bytes();
        let sig = possession_sig(&pem, &leaf_key);
        assert_eq!(
            verifier.verify_presented(&pem, &sig).unwrap_err(),
            SecurityError::Denied
        );
    }

    #[test]
    #[serial(crypto_runtime)]
    fn bad_possession_signature_is_denied() {
        install_runtime();
        let (ca, ca_key) = generate_ca("Test CA");
        let (leaf, leaf_key) = generate_leaf(&ca, &ca_key, "node", None);

        let verifier = CertificateTrustVerifier::from_ca_bundle_pem(ca.pem().as_bytes()).unwrap();
        let pem = leaf.pem().into_bytes();
        let mut sig = possession_sig(&pem, &leaf_key);
        sig[0] ^= 1;
        assert_eq!(
            verifier.verify_presented(&pem, &sig).unwrap_err(),
            SecurityError::Denied
        );
    }

    #[test]
    #[serial(crypto_runtime)]
    fn possession_with_someone_elses_key_is_denied() {
        install_runtime();
        let (ca, ca_key) = generate_ca("Test CA");
        let (leaf, _) = generate_leaf(&ca, &ca_key, "node", None);
        let other_key = KeyPair::generate_for(&rcgen::PKCS_ED25519).unwrap();

        let verifier = CertificateTrustVerifier::from_ca_bundle_pem(ca.pem().as_bytes()).unwrap();
        let pem = leaf.pem().into_bytes();
        let sig = possession_sig(&pem, &other_key);
        assert_eq!(
            verifier.verify_presented(&pem, &sig).unwrap_err(),
            SecurityError::Denied
        );
    }

    #[test]
    #[serial(crypto_runtime)]
    fn garbage_presentation_is_denied() {
        install_runtime();
        let (ca, _) = generate_ca("Test CA");
        let verifier = CertificateTrustVerifier::from_ca_bundle_pem(ca.pem().as_bytes()).unwrap();
        assert_eq!(
            verifier.verify_presented(b"not a certificate", &[0u8; 64]).unwrap_err(),
            SecurityError::Denied
        );
    }

    #[test]
    fn empty_bundle_is_rejected_at_load() {
        let err = CertificateTrustVerifier::from_ca_bundle_pem(b"").unwrap_err();
        assert!(matches!(err, SecurityError::InvalidArgument { .. }));
    }

    #[test]
    fn identity_reads_subject_and_emails() {
        let (ca, ca_key) = generate_ca("Test CA");
        let (leaf, _) = generate_leaf(&ca, &ca_key, "bsmith", Some("bsmith@example.com"));

        let identity = CertificateIdentity::from_pem(leaf.pem().as_bytes()).unwrap();
        assert_eq!(identity.subject, "/O=Acme/CN=bsmith");
        assert_eq!(identity.emails, vec!["bsmith@example.com".to_string()]);
    }

    #[test]
    fn identity_of_garbage_is_invalid() {
        let err = CertificateIdentity::from_pem(b"garbage").unwrap_err();
        assert!(matches!(err, SecurityError::InvalidArgument { .. }));
    }
}
