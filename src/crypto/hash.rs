//! Hashing utilities for the ledger
//!
//! Every identity in the ledger (block hash, transaction id, merkle node)
//! is a single SHA-256 digest, rendered as lowercase hex where it is used
//! as a key.

use sha2::{Digest, Sha256};

/// Length in bytes of every digest produced here
pub const HASH_LEN: usize = 32;

/// Computes SHA-256 hash of the input data
pub fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Computes SHA-256 hash and returns it as a hex string
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Hash the concatenation of two digests (merkle interior node)
pub fn hash_pair(left: &[u8], right: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().to_vec()
}

/// Check that a string is a well-formed hex digest
pub fn is_hex_digest(value: &str) -> bool {
    value.len() == HASH_LEN * 2 && value.bytes().all(|b| b.is_ascii_hexdigit())
}
