//! Strata trust layer
//!
//! Issuance, signing, and verification of capabilities (object-access
//! grants) and credentials (identity assertions) for the Strata
//! distributed filesystem, plus the machinery that makes verification
//! meaningful: an issuer-keyed public-key store, X.509 chain trust
//! verification against a CA bundle, certificate-to-account mapping, and
//! an LDAP-backed identity resolver.
//!
//! Everything here is fail-closed: any ambiguous or erroneous verification
//! outcome is a denial. `verify_*` returns a bare bool and higher-level
//! trust operations collapse every cryptographic failure to
//! [`SecurityError::Denied`], so a peer can never learn *why* it was
//! rejected.
//!
//! Process-wide state lives in one explicit [`SecurityContext`] value,
//! constructed at startup from a [`SecurityConfig`] and torn down on drop.
//! [`CryptoRuntime::install`] must run once, before the context is built.
//!
//! This core is synchronous: callers are the server's OS worker threads,
//! and the only blocking points are startup file I/O and directory
//! searches (which carry their own wall-clock timeout).

pub mod capability;
pub mod certificate;
pub mod context;
pub mod credential;
pub mod engine;
pub mod keystore;
pub mod ldap;
pub mod mapping;
pub mod runtime;

pub use capability::{Capability, OpMask};
pub use certificate::{CertificateIdentity, CertificateTrustVerifier};
pub use context::SecurityContext;
pub use credential::Credential;
pub use engine::TrustEngine;
pub use keystore::{load_keystore_file, PublicKeyStore};
pub use ldap::{
    parse_subject_cn, subject_to_dn, DirectoryConn, DirectoryConnector, DirectoryEntry,
    DirectoryError, LdapConnector, LdapIdentityResolver,
};
pub use mapping::{AccountMapper, MappingRule};
pub use runtime::CryptoRuntime;

pub use strata_core::{
    LdapConfig, LdapSearchMode, LdapSearchScope, MappingRuleConfig, Result, SecurityConfig,
    SecurityError, SignatureScheme,
};
