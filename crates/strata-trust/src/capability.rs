//! Capabilities: signed, time-limited grants of operations over object
//! handles within one filesystem.
//!
//! The signing buffer layout is compatibility-critical: signer and
//! verifier must agree on it bit-for-bit, so it is fixed here and nowhere
//! else. All integers are little-endian, with no padding:
//!
//! ```text
//! issuer bytes | fsid (4) | timeout (8) | op_mask (4) | num_handles (4) | handles (8 each)
//! ```

use serde::{Deserialize, Serialize};

bitflags::bitflags! {
    /// Operations a capability can authorize.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OpMask: u32 {
        /// Traverse / execute
        const EXEC = 1 << 0;
        /// Write object data
        const WRITE = 1 << 1;
        /// Read object data
        const READ = 1 << 2;
        /// Set object attributes
        const SETATTR = 1 << 3;
        /// Create objects
        const CREATE = 1 << 4;
        /// Administrative operations
        const ADMIN = 1 << 5;
        /// Remove objects
        const REMOVE = 1 << 6;
        /// Batched create
        const BATCH_CREATE = 1 << 7;
        /// Batched remove
        const BATCH_REMOVE = 1 << 8;
    }
}

impl Serialize for OpMask {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.bits())
    }
}

impl<'de> Deserialize<'de> for OpMask {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(OpMask::from_bits_retain(u32::deserialize(deserializer)?))
    }
}

/// A signed, time-limited grant of specific operations over specific
/// object handles within one filesystem.
///
/// Lifecycle: created zeroed, populated by the caller, signed once by the
/// engine (which stamps `issuer` and `timeout`), then verified any number
/// of times by any holder until `timeout` elapses. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capability {
    /// Identity of the signing node; verification keys are looked up by it
    pub issuer: String,
    /// Filesystem id the grant applies to
    pub fsid: u32,
    /// Absolute expiry, unix seconds. Valid through `timeout` inclusive.
    pub timeout: u64,
    /// Operations this capability authorizes
    pub op_mask: OpMask,
    /// Object handles the grant covers, in order
    pub handles: Vec<u64>,
    /// Detached signature over [`Capability::signing_bytes`]
    pub signature: Vec<u8>,
}

impl Capability {
    /// The null capability: no authorization object attached. Always
    /// verifies true; used for operations whose access control is
    /// enforced elsewhere.
    pub fn null() -> Self {
        Self::default()
    }

    /// True when every field is zero or empty (a zeroed signature buffer
    /// still counts as null).
    pub fn is_null(&self) -> bool {
        self.issuer.is_empty()
            && self.fsid == 0
            && self.timeout == 0
            && self.op_mask.is_empty()
            && self.handles.is_empty()
            && self.signature.iter().all(|b| *b == 0)
    }

    /// The exact byte sequence the signature covers.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut buf =
            Vec::with_capacity(self.issuer.len() + 20 + self.handles.len() * 8);
        buf.extend_from_slice(self.issuer.as_bytes());
        buf.extend_from_slice(&self.fsid.to_le_bytes());
        buf.extend_from_slice(&self.timeout.to_le_bytes());
        buf.extend_from_slice(&self.op_mask.bits().to_le_bytes());
        buf.extend_from_slice(&(self.handles.len() as u32).to_le_bytes());
        for handle in &self.handles {
            buf.extend_from_slice(&handle.to_le_bytes());
        }
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_capability_is_null() {
        assert!(Capability::null().is_null());
    }

    #[test]
    fn zeroed_signature_buffer_still_null() {
        let cap = Capability {
            signature: vec![0u8; 64],
            ..Capability::null()
        };
        assert!(cap.is_null());
    }

    #[test]
    fn populated_capability_is_not_null() {
        let cap = Capability {
            fsid: 7,
            ..Capability::null()
        };
        assert!(!cap.is_null());
    }

    #[test]
    fn signing_bytes_layout_is_exact() {
        let cap = Capability {
            issuer: "node-a".into(),
            fsid: 7,
            timeout: 0x0102_0304_0506_0708,
            op_mask: OpMask::READ | OpMask::WRITE,
            handles: vec![1, 2],
            signature: vec![0xff; 64],
        };
        let bytes = cap.signing_bytes();
        let mut expected = Vec::new();
        expected.extend_from_slice(b"node-a");
        expected.extend_from_slice(&7u32.to_le_bytes());
        expected.extend_from_slice(&0x0102_0304_0506_0708u64.to_le_bytes());
        expected.extend_from_slice(&(OpMask::READ | OpMask::WRITE).bits().to_le_bytes());
        expected.extend_from_slice(&2u32.to_le_bytes());
        expected.extend_from_slice(&1u64.to_le_bytes());
        expected.extend_from_slice(&2u64.to_le_bytes());
        assert_eq!(bytes, expected);
    }

    #[test]
    fn signature_is_not_part_of_signing_bytes() {
        let mut cap = Capability {
            issuer: "node-a".into(),
            fsid: 1,
            ..Capability::null()
        };
        let before = cap.signing_bytes();
        cap.signature = vec![0xaa; 64];
        assert_eq!(before, cap.signing_bytes());
    }

    #[test]
    fn op_mask_bits_match_declared_order() {
        assert_eq!(OpMask::EXEC.bits(), 1);
        assert_eq!(OpMask::WRITE.bits(), 2);
        assert_eq!(OpMask::READ.bits(), 4);
        assert_eq!(OpMask::BATCH_REMOVE.bits(), 256);
    }
}
