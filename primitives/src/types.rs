//! Core type aliases, identifiers and chain-wide constants.

use core::fmt;
use serde::{Deserialize, Serialize};

/// 32-byte hash used for code versions and state digests.
pub type Hash = [u8; 32];

/// Numeric account identifier. The low byte is a checksum over the rest.
pub type AccountUid = u64;

/// Numeric asset identifier.
pub type AssetAid = u64;

/// Seconds since the Unix epoch, as carried by block headers.
pub type Timestamp = u64;

/// Precision of the core asset (5 decimal places).
pub const BLOCKCHAIN_PRECISION: i64 = 100_000;

/// Upper bound on the absolute value of any amount.
pub const MAX_SHARE_SUPPLY: i64 = 1_000_000_000_000_000;

/// Identifier of the core asset. Fees are always paid in it.
pub const CORE_ASSET_AID: AssetAid = 0;

/// Maximum memo length accepted by a transfer.
pub const MAX_MEMO_SIZE: usize = 2048;

/// Maximum account / contract name length.
pub const MAX_NAME_LENGTH: usize = 63;

/// A zero-valued hash (32 zero bytes).
pub const ZERO_HASH: Hash = [0u8; 32];

// ── Object identifiers ──

/// Object space for records defined by the protocol.
pub const PROTOCOL_SPACE: u8 = 1;

/// Object space for bookkeeping records owned by the implementation.
pub const IMPLEMENTATION_SPACE: u8 = 2;

/// Globally unique identifier of a persisted object.
///
/// The instance number is assigned by the store at creation and increases
/// monotonically per `(space, type_id)`; it is never handed out twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct ObjectId {
    pub space: u8,
    pub type_id: u8,
    pub instance: u64,
}

impl ObjectId {
    pub const fn new(space: u8, type_id: u8, instance: u64) -> Self {
        Self { space, type_id, instance }
    }

    /// The `(space, type_id)` pair naming the table this id belongs to.
    pub const fn table(&self) -> (u8, u8) {
        (self.space, self.type_id)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.space, self.type_id, self.instance)
    }
}

/// Convert a `Hash` to a hex string for display purposes.
pub fn hash_to_hex(hash: &Hash) -> String {
    let mut s = String::with_capacity(66);
    s.push_str("0x");
    for byte in hash {
        use core::fmt::Write;
        let _ = write!(s, "{:02x}", byte);
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_id_display() {
        let id = ObjectId::new(PROTOCOL_SPACE, 2, 17);
        assert_eq!(id.to_string(), "1.2.17");
        assert_eq!(id.table(), (1, 2));
    }

    #[test]
    fn test_object_id_ordering_by_instance() {
        let a = ObjectId::new(2, 5, 1);
        let b = ObjectId::new(2, 5, 2);
        assert!(a < b);
    }

    #[test]
    fn test_object_id_serde() {
        let id = ObjectId::new(IMPLEMENTATION_SPACE, 9, 3);
        let json = serde_json::to_string(&id).unwrap();
        let back: ObjectId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn test_hash_to_hex() {
        let mut h = ZERO_HASH;
        h[0] = 0xab;
        let hex = hash_to_hex(&h);
        assert!(hex.starts_with("0xab00"));
        assert_eq!(hex.len(), 66);
    }
}
