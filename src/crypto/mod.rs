//! Cryptographic utilities for the ledger
//!
//! This module provides:
//! - SHA-256 hashing
//! - secp256k1 key management and address derivation
//! - Merkle roots and inclusion proofs

pub mod hash;
pub mod keys;
pub mod merkle;

pub use hash::{hash_pair, is_hex_digest, sha256, sha256_hex, HASH_LEN};
pub use keys::{
    is_valid_address, public_key_from_hex, public_key_to_address, sign_message,
    verify_signature, KeyError, KeyPair,
};
pub use merkle::{calculate_merkle_root, calculate_merkle_root_hex, MerkleProof};
