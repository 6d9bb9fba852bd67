//! Hashing helpers.
//!
//! - BLAKE3 for contract code versions and store state digests
//! - SHA-256 for the account uid checksum
//!
//! All functions are pure and deterministic.

use crate::types::{AccountUid, Hash};

/// Compute BLAKE3 hash of the input data.
pub fn hash_blake3(data: &[u8]) -> Hash {
    *blake3::hash(data).as_bytes()
}

/// Version tag of a deployed contract: the BLAKE3 hash of its code.
pub fn code_version(code: &[u8]) -> Hash {
    hash_blake3(code)
}

/// Checksum byte for an account sequence number.
///
/// First byte of SHA-256 over the little-endian encoding of `seq`.
pub fn uid_checksum(seq: u64) -> u8 {
    use sha2::Digest;
    let digest = sha2::Sha256::digest(seq.to_le_bytes());
    digest[0]
}

/// Build an account uid from a sequence number by appending its checksum.
pub fn make_account_uid(seq: u64) -> AccountUid {
    (seq << 8) | uid_checksum(seq) as u64
}

/// Returns true if the low byte of `uid` is the checksum of the rest.
pub fn is_valid_account_uid(uid: AccountUid) -> bool {
    let checksum = (uid & 0xFF) as u8;
    uid_checksum(uid >> 8) == checksum
}
