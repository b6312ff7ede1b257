//! LDAP-backed identity resolution
//!
//! Maps a verified certificate (or a username/password pair) to a uid/gid
//! set via a directory service. One shared connection, guarded by one
//! mutex: concurrent resolutions queue behind each other, which is
//! acceptable because resolution happens only at identity establishment,
//! never on the per-request verify path.
//!
//! A failed search tears the connection down, reconnects, and retries the
//! same search up to the configured attempt count; exhausting the budget
//! is a denial. The directory itself sits behind the [`DirectoryConn`] /
//! [`DirectoryConnector`] seam so retry behavior is testable without a
//! server.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use parking_lot::Mutex;

use ldap3::{LdapConn, SearchEntry};

use strata_core::{LdapConfig, LdapSearchMode, LdapSearchScope, Result, SecurityError};

use crate::certificate::CertificateIdentity;

/// Errors crossing the directory seam. These never leave the resolver;
/// they are logged and collapsed per the module error policy.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DirectoryError {
    /// Could not reach or bind to any configured host
    #[error("directory connect failed: {0}")]
    Connect(String),
    /// A search was sent and failed (timeout, server down, bad base)
    #[error("directory search failed: {0}")]
    Search(String),
    /// A bind attempt was rejected
    #[error("directory bind failed: {0}")]
    Bind(String),
}

/// One directory entry: its DN plus string attribute values.
#[derive(Debug, Clone, Default)]
pub struct DirectoryEntry {
    /// Distinguished name of the entry
    pub dn: String,
    /// Attribute name to values, as returned by the server
    pub attrs: HashMap<String, Vec<String>>,
}

/// An established, bound directory connection.
pub trait DirectoryConn: Send {
    /// Run one search and return every entry.
    fn search(
        &mut self,
        base: &str,
        scope: LdapSearchScope,
        filter: &str,
        attrs: &[String],
        timeout: Duration,
    ) -> std::result::Result<Vec<DirectoryEntry>, DirectoryError>;

    /// Gracefully close the connection. Dropping the value also closes
    /// it; this just sends the protocol-level goodbye.
    fn unbind(&mut self) {}
}

/// Establishes directory connections and performs standalone
/// authentication binds.
pub trait DirectoryConnector: Send + Sync {
    /// Connection type produced by this connector
    type Conn: DirectoryConn;

    /// Connect and bind with the configured service identity.
    fn connect(&self, config: &LdapConfig)
        -> std::result::Result<Self::Conn, DirectoryError>;

    /// Open a fresh connection and bind as `dn` with `password`,
    /// discarding the connection afterwards. This is the interactive
    /// password check, deliberately separate from the service session.
    fn authenticate(
        &self,
        config: &LdapConfig,
        dn: &str,
        password: &str,
    ) -> std::result::Result<(), DirectoryError>;
}

fn to_ldap3_scope(scope: LdapSearchScope) -> ldap3::Scope {
    match scope {
        LdapSearchScope::Base => ldap3::Scope::Base,
        LdapSearchScope::OneLevel => ldap3::Scope::OneLevel,
        LdapSearchScope::Subtree => ldap3::Scope::Subtree,
    }
}

/// Production connector over `ldap3`'s synchronous connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct LdapConnector;

/// Production directory connection wrapping [`ldap3::LdapConn`].
pub struct LdapDirectoryConn {
    conn: LdapConn,
}

impl DirectoryConn for LdapDirectoryConn {
    fn search(
        &mut self,
        base: &str,
        scope: LdapSearchScope,
        filter: &str,
        attrs: &[String],
        timeout: Duration,
    ) -> std::result::Result<Vec<DirectoryEntry>, DirectoryError> {
        let result = self
            .conn
            .with_timeout(timeout)
            .search(base, to_ldap3_scope(scope), filter, attrs.to_vec())
            .map_err(|e| DirectoryError::Search(e.to_string()))?;
        let (entries, _) = result
            .success()
            .map_err(|e| DirectoryError::Search(e.to_string()))?;
        Ok(entries
            .into_iter()
            .map(|entry| {
                let entry = SearchEntry::construct(entry);
                DirectoryEntry {
                    dn: entry.dn,
                    attrs: entry.attrs,
                }
            })
            .collect())
    }

    fn unbind(&mut self) {
        let _ = self.conn.unbind();
    }
}

impl DirectoryConnector for LdapConnector {
    type Conn = LdapDirectoryConn;

    fn connect(
        &self,
        config: &LdapConfig,
    ) -> std::result::Result<Self::Conn, DirectoryError> {
        let password = resolve_bind_password(config)?;
        let bind_dn = config.bind_dn.as_deref().unwrap_or("");

        let mut last_error = String::from("no LDAP hosts configured");
        for host in &config.hosts {
            let mut conn = match LdapConn::new(host) {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!(host = %host, error = %e, "LDAP host unreachable");
                    last_error = e.to_string();
                    continue;
                }
            };
            // dn and password may both be empty for an anonymous bind
            match conn
                .simple_bind(bind_dn, password.as_deref().unwrap_or(""))
                .and_then(|r| r.success())
            {
                Ok(_) => {
                    tracing::debug!(host = %host, bind_dn = %bind_dn, "connected to LDAP");
                    return Ok(LdapDirectoryConn { conn });
                }
                Err(e) => {
                    tracing::warn!(host = %host, error = %e, "LDAP service bind failed");
                    last_error = e.to_string();
                }
            }
        }
        Err(DirectoryError::Connect(last_error))
    }

    fn authenticate(
        &self,
        config: &LdapConfig,
        dn: &str,
        password: &str,
    ) -> std::result::Result<(), DirectoryError> {
        let mut last_error = String::from("no LDAP hosts configured");
        for host in &config.hosts {
            let mut conn = match LdapConn::new(host) {
                Ok(conn) => conn,
                Err(e) => {
                    last_error = e.to_string();
                    continue;
                }
            };
            return match conn.simple_bind(dn, password).and_then(|r| r.success()) {
                Ok(_) => {
                    let _ = conn.unbind();
                    Ok(())
                }
                Err(e) => Err(DirectoryError::Bind(e.to_string())),
            };
        }
        Err(DirectoryError::Connect(last_error))
    }
}

/// Resolves certificates and username/password pairs to local identities
/// through a directory service.
pub struct LdapIdentityResolver<C: DirectoryConnector = LdapConnector> {
    connector: C,
    config: LdapConfig,
    session: Mutex<Option<C::Conn>>,
}

impl LdapIdentityResolver<LdapConnector> {
    /// Resolver over the production LDAP connector. The connection is
    /// established lazily, on first use.
    pub fn new(config: LdapConfig) -> Self {
        Self::with_connector(LdapConnector, config)
    }
}

impl<C: DirectoryConnector> LdapIdentityResolver<C> {
    /// Resolver over a caller-supplied connector.
    pub fn with_connector(connector: C, config: LdapConfig) -> Self {
        Self {
            connector,
            config,
            session: Mutex::new(None),
        }
    }

    /// Resolve a certificate to a uid and group set.
    pub fn map_certificate(&self, cert_pem: &[u8]) -> Result<(u32, Vec<u32>)> {
        let identity = CertificateIdentity::from_pem(cert_pem).map_err(|e| {
            tracing::debug!(error = %e, "certificate for directory mapping does not parse");
            SecurityError::denied()
        })?;
        tracing::debug!(subject = %identity.subject, "resolving certificate identity");

        let (base, scope, filter) = match self.config.search_mode {
            LdapSearchMode::Cn => {
                let Some(cn) = parse_subject_cn(&identity.subject) else {
                    tracing::debug!(subject = %identity.subject, "no CN in certificate subject");
                    return Err(SecurityError::denied());
                };
                (
                    self.config.search_root.clone().unwrap_or_default(),
                    self.config.search_scope,
                    format!(
                        "(&(objectClass={})({}={}))",
                        self.config.search_class, self.config.search_attr, cn
                    ),
                )
            }
            LdapSearchMode::Dn => (
                subject_to_dn(&identity.subject)?,
                LdapSearchScope::Base,
                "(objectClass=*)".to_string(),
            ),
        };

        let attrs = vec![self.config.uid_attr.clone(), self.config.gid_attr.clone()];
        let entries = self.search_with_retry(&base, scope, &filter, &attrs)?;
        if entries.len() > 1 {
            tracing::warn!(subject = %identity.subject, "multiple directory entries; using the first");
        }
        let Some(entry) = entries.first() else {
            tracing::debug!(subject = %identity.subject, "no directory entry for certificate");
            return Err(SecurityError::denied());
        };

        let uid = parse_id_attr(entry, &self.config.uid_attr)?;
        let gid = parse_id_attr(entry, &self.config.gid_attr)?;
        tracing::debug!(dn = %entry.dn, uid, gid, "resolved certificate identity");
        Ok((uid, vec![gid]))
    }

    /// Interactive password authentication: look up the user's DN by the
    /// configured naming attribute, then bind as that DN with the
    /// supplied password on a fresh connection.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<()> {
        if username.is_empty() {
            return Err(SecurityError::invalid("username is empty"));
        }
        if password.is_empty() {
            // An empty password would turn the DN bind into an anonymous
            // bind that trivially "succeeds".
            return Err(SecurityError::invalid("password is empty"));
        }

        let base = self.config.search_root.clone().unwrap_or_default();
        let filter = format!(
            "(&(objectClass={})({}={}))",
            self.config.search_class, self.config.search_attr, username
        );
        let entries =
            self.search_with_retry(&base, self.config.search_scope, &filter, &[])?;
        if entries.len() > 1 {
            tracing::warn!(username = %username, "multiple directory entries; using the first");
        }
        let Some(entry) = entries.first() else {
            tracing::debug!(username = %username, "no directory entry for user");
            return Err(SecurityError::denied());
        };

        self.connector
            .authenticate(&self.config, &entry.dn, password)
            .map_err(|e| {
                tracing::debug!(dn = %entry.dn, error = %e, "password bind failed");
                SecurityError::denied()
            })?;
        tracing::debug!(dn = %entry.dn, "password authentication succeeded");
        Ok(())
    }

    /// Tear down the shared session.
    pub fn shutdown(&self) {
        if let Some(mut conn) = self.session.lock().take() {
            conn.unbind();
        }
    }

    fn search_with_retry(
        &self,
        base: &str,
        scope: LdapSearchScope,
        filter: &str,
        attrs: &[String],
    ) -> Result<Vec<DirectoryEntry>> {
        let timeout = Duration::from_secs(self.config.search_timeout_secs);
        let mut session = self.session.lock();
        let mut remaining = self.config.retries.max(1);
        loop {
            if session.is_none() {
                match self.connector.connect(&self.config) {
                    Ok(conn) => *session = Some(conn),
                    Err(e) => {
                        tracing::warn!(error = %e, "directory reconnect failed");
                        remaining -= 1;
                        if remaining == 0 {
                            return Err(SecurityError::denied());
                        }
                        continue;
                    }
                }
            }
            let Some(conn) = session.as_mut() else {
                continue;
            };
            match conn.search(base, scope, filter, attrs, timeout) {
                Ok(entries) => return Ok(entries),
                Err(e) => {
                    tracing::warn!(error = %e, "directory search failed; reconnecting");
                    if let Some(mut dead) = session.take() {
                        dead.unbind();
                    }
                    remaining -= 1;
                    if remaining == 0 {
                        return Err(SecurityError::denied());
                    }
                }
            }
        }
    }
}

/// Pull the first numeric value of `name` off an entry. Directory data
/// that is not a non-negative integer is bad data, reported distinctly.
fn parse_id_attr(entry: &DirectoryEntry, name: &str) -> Result<u32> {
    let value = entry
        .attrs
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .and_then(|(_, values)| values.first())
        .ok_or_else(|| {
            tracing::debug!(dn = %entry.dn, attr = %name, "directory entry missing attribute");
            SecurityError::denied()
        })?;
    value.parse::<u32>().map_err(|_| {
        SecurityError::invalid(format!(
            "directory attribute {name} for {} is not a number: {value}",
            entry.dn
        ))
    })
}

/// Extract the CN component from a slash-delimited subject: the first
/// `/CN=` segment, case-insensitive.
pub fn parse_subject_cn(subject: &str) -> Option<String> {
    let lower = subject.to_ascii_lowercase();
    let start = lower.find("/cn=")? + 4;
    let rest = &subject[start..];
    let end = rest.find('/').unwrap_or(rest.len());
    let cn = &rest[..end];
    (!cn.is_empty()).then(|| cn.to_string())
}

/// Convert a slash-delimited certificate subject into an LDAP DN by
/// reversing the RDN segment order and joining with commas:
/// `/C=US/O=Acme/CN=bsmith` becomes `CN=bsmith,O=Acme,C=US`.
pub fn subject_to_dn(subject: &str) -> Result<String> {
    if !subject.starts_with('/') {
        return Err(SecurityError::invalid(format!(
            "subject is not slash-delimited: {subject}"
        )));
    }
    let segments: Vec<&str> = subject.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return Err(SecurityError::invalid("subject has no RDN segments"));
    }
    Ok(segments
        .iter()
        .rev()
        .copied()
        .collect::<Vec<_>>()
        .join(","))
}

/// Resolve the configured bind password, honoring `file:<path>`
/// indirection.
fn resolve_bind_password(
    config: &LdapConfig,
) -> std::result::Result<Option<String>, DirectoryError> {
    match &config.bind_password {
        None => Ok(None),
        Some(value) => match value.strip_prefix("file:") {
            None => Ok(Some(value.clone())),
            Some(path) => load_password_file(Path::new(path)).map(Some),
        },
    }
}

fn load_password_file(path: &Path) -> std::result::Result<String, DirectoryError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(meta) = std::fs::metadata(path) {
            if meta.permissions().mode() & 0o077 != 0 {
                tracing::warn!(
                    path = %path.display(),
                    "LDAP password file has group or other permissions enabled"
                );
            }
        }
    }
    let text = std::fs::read_to_string(path).map_err(|e| {
        DirectoryError::Connect(format!("LDAP password file {}: {e}", path.display()))
    })?;
    Ok(text.lines().next().unwrap_or_default().to_string())
}
