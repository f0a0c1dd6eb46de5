//! Merkle tree over a block's transaction ids
//!
//! The root is committed in the block header; proofs let the light-compute
//! zone check that a transaction named in a transfer log really sits in the
//! block it claims, without holding the block body.

use serde::{Deserialize, Serialize};

use super::hash::{hash_pair, sha256};

/// Calculate the merkle root from a list of leaf hashes
///
/// An odd node at any level is paired with itself.
pub fn calculate_merkle_root(hashes: &[Vec<u8>]) -> Vec<u8> {
    if hashes.is_empty() {
        return sha256(b"");
    }

    let mut current_level: Vec<Vec<u8>> = hashes.to_vec();

    while current_level.len() > 1 {
        current_level = current_level
            .chunks(2)
            .map(|chunk| match chunk {
                [left, right] => hash_pair(left, right),
                [single] => hash_pair(single, single),
                _ => unreachable!("chunks(2) yields one or two items"),
            })
            .collect();
    }

    current_level.remove(0)
}

/// Calculate merkle root from hex-encoded hashes
///
/// Entries that are not valid hex are hashed as raw bytes so a malformed id
/// still changes the root.
pub fn calculate_merkle_root_hex(hex_hashes: &[String]) -> String {
    let hashes: Vec<Vec<u8>> = hex_hashes
        .iter()
        .map(|h| hex::decode(h).unwrap_or_else(|_| sha256(h.as_bytes())))
        .collect();
    hex::encode(calculate_merkle_root(&hashes))
}

/// Merkle proof for verifying transaction inclusion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// Sibling hashes from leaf to root; `true` when the sibling is on the left
    pub siblings: Vec<(Vec<u8>, bool)>,
}

impl MerkleProof {
    /// Build the inclusion proof for the leaf at `index`
    pub fn generate(hashes: &[Vec<u8>], index: usize) -> Option<Self> {
        if index >= hashes.len() {
            return None;
        }

        let mut siblings = Vec::new();
        let mut level: Vec<Vec<u8>> = hashes.to_vec();
        let mut position = index;

        while level.len() > 1 {
            let sibling_pos = position ^ 1;
            let sibling = level
                .get(sibling_pos)
                .unwrap_or(&level[position])
                .clone();
            siblings.push((sibling, position % 2 == 1));

            level = level
                .chunks(2)
                .map(|chunk| match chunk {
                    [left, right] => hash_pair(left, right),
                    [single] => hash_pair(single, single),
                    _ => unreachable!("chunks(2) yields one or two items"),
                })
                .collect();
            position /= 2;
        }

        Some(Self { siblings })
    }

    /// Verify the proof against a root hash
    pub fn verify(&self, leaf_hash: &[u8], root_hash: &[u8]) -> bool {
        let mut current = leaf_hash.to_vec();

        for (sibling, is_left) in &self.siblings {
            current = if *is_left {
                hash_pair(sibling, &current)
            } else {
                hash_pair(&current, sibling)
            };
        }

        current == root_hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(n: usize) -> Vec<Vec<u8>> {
        (0..n).map(|i| sha256(format!("tx{}", i).as_bytes())).collect()
    }

    #[test]
    fn test_merkle_root_single() {
        let hashes = leaves(1);
        assert_eq!(calculate_merkle_root(&hashes), hashes[0]);
    }

    #[test]
    fn test_merkle_root_two() {
        let hashes = leaves(2);
        assert_eq!(
            calculate_merkle_root(&hashes),
            hash_pair(&hashes[0], &hashes[1])
        );
    }

    #[test]
    fn test_empty_merkle_root() {
        assert_eq!(calculate_merkle_root(&[]), sha256(b""));
    }

    #[test]
    fn test_proofs_verify_for_every_leaf() {
        for n in 1..8 {
            let hashes = leaves(n);
            let root = calculate_merkle_root(&hashes);
            for (i, leaf) in hashes.iter().enumerate() {
                let proof = MerkleProof::generate(&hashes, i).unwrap();
                assert!(proof.verify(leaf, &root), "leaf {} of {}", i, n);
            }
        }
    }

    #[test]
    fn test_proof_rejects_wrong_leaf() {
        let hashes = leaves(5);
        let root = calculate_merkle_root(&hashes);
        let proof = MerkleProof::generate(&hashes, 2).unwrap();
        assert!(!proof.verify(&hashes[3], &root));
        assert!(MerkleProof::generate(&hashes, 5).is_none());
    }
}
