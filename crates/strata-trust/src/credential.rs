//! Credentials: signed, time-limited assertions of a user's identity
//! (uid and group set).
//!
//! Signing buffer layout, little-endian, no padding:
//!
//! ```text
//! serial (4) | userid (4) | num_groups (4) | groups (4 each) | issuer bytes (if present) | timeout (8)
//! ```

use serde::{Deserialize, Serialize};

/// A signed, time-limited assertion that a user holds a uid and a set of
/// gids. Same lifecycle as a capability: populated, signed once by the
/// engine, verified by any holder until expiry.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Credential {
    /// Identity of the signing node
    pub issuer: String,
    /// Monotonic identifier; not a security token by itself
    pub serial: u32,
    /// Asserted user id
    pub userid: u32,
    /// Asserted group ids, in order
    pub groups: Vec<u32>,
    /// Absolute expiry, unix seconds. Valid through `timeout` inclusive.
    pub timeout: u64,
    /// Detached signature over [`Credential::signing_bytes`]
    pub signature: Vec<u8>,
}

impl Credential {
    /// The null credential; always verifies true.
    pub fn null() -> Self {
        Self::default()
    }

    /// True when every field is zero or empty.
    pub fn is_null(&self) -> bool {
        self.issuer.is_empty()
            && self.serial == 0
            && self.userid == 0
            && self.groups.is_empty()
            && self.timeout == 0
            && self.signature.iter().all(|b| *b == 0)
    }

    /// The exact byte sequence the signature covers.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut buf =
            Vec::with_capacity(20 + self.groups.len() * 4 + self.issuer.len());
        buf.extend_from_slice(&self.serial.to_le_bytes());
        buf.extend_from_slice(&self.userid.to_le_bytes());
        buf.extend_from_slice(&(self.groups.len() as u32).to_le_bytes());
        for gid in &self.groups {
            buf.extend_from_slice(&gid.to_le_bytes());
        }
        if !self.issuer.is_empty() {
            buf.extend_from_slice(self.issuer.as_bytes());
        }
        buf.extend_from_slice(&self.timeout.to_le_bytes());
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_credential_is_null() {
        assert!(Credential::null().is_null());
    }

    #[test]
    fn signing_bytes_layout_is_exact() {
        let cred = Credential {
            issuer: "node-a".into(),
            serial: 42,
            userid: 1000,
            groups: vec![100, 200],
            timeout: 99,
            signature: Vec::new(),
        };
        let mut expected = Vec::new();
        expected.extend_from_slice(&42u32.to_le_bytes());
        expected.extend_from_slice(&1000u32.to_le_bytes());
        expected.extend_from_slice(&2u32.to_le_bytes());
        expected.extend_from_slice(&100u32.to_le_bytes());
        expected.extend_from_slice(&200u32.to_le_bytes());
        expected.extend_from_slice(b"node-a");
        expected.extend_from_slice(&99u64.to_le_bytes());
        assert_eq!(cred.signing_bytes(), expected);
    }

    #[test]
    fn empty_issuer_contributes_no_bytes() {
        let cred = Credential {
            serial: 1,
            userid: 2,
            ..Credential::null()
        };
        // serial + userid + num_groups + timeout, nothing else
        assert_eq!(cred.signing_bytes().len(), 4 + 4 + 4 + 8);
    }
}
