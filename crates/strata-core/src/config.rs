//! Security configuration model
//!
//! The server configuration loader lives outside this subsystem; these are
//! the deserialized values it hands to `SecurityContext::initialize`. A
//! TOML convenience loader is provided for tests and small tools.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SecurityError};

fn default_capability_lifetime() -> u64 {
    600
}

fn default_credential_lifetime() -> u64 {
    3600
}

fn default_search_timeout() -> u64 {
    15
}

fn default_retries() -> u32 {
    3
}

/// Top-level trust-layer configuration, supplied by the server
/// configuration collaborator at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// This node's issuer identity, stamped into everything it signs
    pub server_alias: String,
    /// PEM (PKCS#8) private signing key
    pub private_key_path: PathBuf,
    /// Public-key store file: whitespace-delimited `issuer` / PEM pairs
    pub keystore_path: PathBuf,
    /// Concatenated PEM certificates of trusted CAs
    pub ca_bundle_path: PathBuf,
    /// Capability lifetime in seconds, applied at signing time
    #[serde(default = "default_capability_lifetime")]
    pub capability_lifetime_secs: u64,
    /// Credential lifetime in seconds, applied at signing time
    #[serde(default = "default_credential_lifetime")]
    pub credential_lifetime_secs: u64,
    /// Signature scheme for capabilities and credentials
    #[serde(default)]
    pub signature_scheme: SignatureScheme,
    /// Ordered certificate-to-account mapping rules; first match wins
    #[serde(default)]
    pub mapping_rules: Vec<MappingRuleConfig>,
    /// Directory-service identity resolution, if enabled
    #[serde(default)]
    pub ldap: Option<LdapConfig>,
}

impl SecurityConfig {
    /// Load a configuration from a TOML file.
    pub fn from_toml_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| SecurityError::io(format!("{}: {e}", path.display())))?;
        toml::from_str(&text)
            .map_err(|e| SecurityError::invalid(format!("{}: {e}", path.display())))
    }
}

/// Signature scheme used by the capability/credential engine.
///
/// `Ed25519ph` is the pre-hashed alternate branch; it is only usable in
/// builds with the `prehashed` feature enabled and is never selected by
/// default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignatureScheme {
    /// Plain Ed25519 over the raw signing buffer
    #[default]
    Ed25519,
    /// Ed25519ph: SHA-512 pre-hash of the signing buffer
    Ed25519ph,
}

/// One certificate-to-account mapping rule.
///
/// Rules are evaluated in configured order; the list order is the only
/// tie-break between rules that could both match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum MappingRuleConfig {
    /// Exact match against the one-line certificate subject
    ExactSubject {
        /// Subject string to compare against
        pattern: String,
        /// Local account granted on match
        account: String,
    },
    /// Regex match against the one-line certificate subject
    RegexSubject {
        /// Regex applied to the subject
        pattern: String,
        /// Local account granted on match
        account: String,
    },
    /// Exact match against any certificate email
    ExactEmail {
        /// Email address to compare against
        pattern: String,
        /// Local account granted on match
        account: String,
    },
    /// Regex match against any certificate email
    RegexEmail {
        /// Regex applied to each email
        pattern: String,
        /// Local account granted on match
        account: String,
    },
}

/// How a certificate subject is turned into a directory search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LdapSearchMode {
    /// Search for the subject CN under the configured root
    Cn,
    /// Convert the whole subject into an LDAP DN and probe it directly
    Dn,
}

/// LDAP search scope, mirroring the protocol's three scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LdapSearchScope {
    /// The base object only
    Base,
    /// Direct children of the base
    OneLevel,
    /// The whole subtree under the base
    Subtree,
}

/// Directory-service connection and search parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LdapConfig {
    /// Server URIs, tried in order
    pub hosts: Vec<String>,
    /// Service bind DN; `None` binds anonymously
    #[serde(default)]
    pub bind_dn: Option<String>,
    /// Service bind password, inline or `file:<path>` indirection
    #[serde(default)]
    pub bind_password: Option<String>,
    /// CN or DN resolution mode
    pub search_mode: LdapSearchMode,
    /// Root container for CN-mode searches
    #[serde(default)]
    pub search_root: Option<String>,
    /// Scope for CN-mode searches
    pub search_scope: LdapSearchScope,
    /// objectClass filtered on in CN-mode searches
    pub search_class: String,
    /// Naming attribute matched against the CN or username
    pub search_attr: String,
    /// Attribute holding the numeric uid
    pub uid_attr: String,
    /// Attribute holding the numeric gid
    pub gid_attr: String,
    /// Per-search wall-clock timeout in seconds
    #[serde(default = "default_search_timeout")]
    pub search_timeout_secs: u64,
    /// Total search attempts before a failure becomes denial
    #[serde(default = "default_retries")]
    pub retries: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;

    #[test]
    fn minimal_config_parses_with_defaults() {
        let toml = r#"
            server_alias = "fs-node-1"
            private_key_path = "/etc/strata/key.pem"
            keystore_path = "/etc/strata/keystore"
            ca_bundle_path = "/etc/strata/cabundle.pem"
        "#;
        let config: SecurityConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server_alias, "fs-node-1");
        assert_eq!(config.capability_lifetime_secs, 600);
        assert_eq!(config.credential_lifetime_secs, 3600);
        assert_eq!(config.signature_scheme, SignatureScheme::Ed25519);
        assert!(config.mapping_rules.is_empty());
        assert!(config.ldap.is_none());
    }

    #[test]
    fn full_config_parses() {
        let toml = r#"
            server_alias = "fs-node-1"
            private_key_path = "/etc/strata/key.pem"
            keystore_path = "/etc/strata/keystore"
            ca_bundle_path = "/etc/strata/cabundle.pem"
            signature_scheme = "ed25519"

            [[mapping_rules]]
            kind = "regex-subject"
            pattern = '^/CN=.*\.example\.com$'
            account = "svc-acct"

            [[mapping_rules]]
            kind = "exact-email"
            pattern = "root@example.com"
            account = "root"

            [ldap]
            hosts = ["ldap://ldap1.example.com", "ldap://ldap2.example.com"]
            bind_dn = "cn=service,dc=example,dc=com"
            bind_password = "file:/etc/strata/ldap.pw"
            search_mode = "cn"
            search_root = "ou=people,dc=example,dc=com"
            search_scope = "subtree"
            search_class = "posixAccount"
            search_attr = "uid"
            uid_attr = "uidNumber"
            gid_attr = "gidNumber"
        "#;
        let config: SecurityConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.mapping_rules.len(), 2);
        let ldap = config.ldap.unwrap();
        assert_eq!(ldap.search_mode, LdapSearchMode::Cn);
        assert_eq!(ldap.search_timeout_secs, 15);
        assert_eq!(ldap.retries, 3);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = SecurityConfig::from_toml_path("/nonexistent/strata.toml").unwrap_err();
        assert_matches!(err, SecurityError::Io { .. });
    }

    #[test]
    fn malformed_file_is_invalid_argument() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "server_alias = [not toml").unwrap();
        let err = SecurityConfig::from_toml_path(f.path()).unwrap_err();
        assert_matches!(err, SecurityError::InvalidArgument { .. });
    }
}
