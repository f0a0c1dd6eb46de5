//! Block implementation for the transfer-zone ledger
//!
//! A block is a header plus an ordered list of transactions. There is no
//! mining: blocks arrive already agreed upon and are only linked, hashed and
//! committed.

use crate::core::transaction::Transaction;
use crate::crypto::{
    calculate_merkle_root, calculate_merkle_root_hex, sha256, sha256_hex, MerkleProof,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Block Constants
// =============================================================================

/// Current block format version
pub const BLOCK_VERSION: u32 = 1;

// =============================================================================
// Block Errors
// =============================================================================

/// Block validation errors
#[derive(Error, Debug)]
pub enum BlockError {
    #[error("Invalid merkle root")]
    InvalidMerkleRoot,
    #[error("Block links to {found:?}, expected tip {expected:?}")]
    BrokenLink { expected: String, found: String },
    #[error("Transaction {0} does not match its id")]
    InvalidTransactionId(String),
    #[error("Block is marked invalid")]
    Rejected,
}

// =============================================================================
// Block State
// =============================================================================

/// Lifecycle marker carried in the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockState {
    Committed,
    Valid,
    Invalid,
}

impl BlockState {
    pub fn code(self) -> u8 {
        match self {
            BlockState::Committed => 0,
            BlockState::Valid => 1,
            BlockState::Invalid => 2,
        }
    }
}

// =============================================================================
// Block Header
// =============================================================================

/// Block header containing metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block version
    pub version: u32,
    /// Creation time, unix seconds
    pub timestamp: i64,
    /// Hash of the previous block; empty for genesis
    pub previous_block_hash: String,
    /// Merkle root of the transaction ids
    pub merkle_root: String,
    pub state: BlockState,
}

impl BlockHeader {
    /// Calculate the hash of the block header
    ///
    /// Strings are length-prefixed so that no two headers share an encoding.
    pub fn hash(&self) -> String {
        let mut data = Vec::with_capacity(128);
        data.extend_from_slice(&self.version.to_le_bytes());
        data.extend_from_slice(&self.timestamp.to_le_bytes());
        for field in [&self.previous_block_hash, &self.merkle_root] {
            data.extend_from_slice(&(field.len() as u64).to_le_bytes());
            data.extend_from_slice(field.as_bytes());
        }
        data.push(self.state.code());
        sha256_hex(&data)
    }
}

// =============================================================================
// Block
// =============================================================================

/// A block in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    /// List of transactions in the block
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Create a block on top of `previous_block_hash`
    pub fn new(previous_block_hash: &str, transactions: Vec<Transaction>) -> Self {
        let merkle_root = Self::calculate_merkle_root(&transactions);

        let header = BlockHeader {
            version: BLOCK_VERSION,
            timestamp: Utc::now().timestamp(),
            previous_block_hash: previous_block_hash.to_string(),
            merkle_root,
            state: BlockState::Committed,
        };

        Self {
            header,
            transactions,
        }
    }

    /// Create the genesis block
    pub fn genesis(transactions: Vec<Transaction>) -> Self {
        Self::new("", transactions)
    }

    pub fn hash(&self) -> String {
        self.header.hash()
    }

    pub fn is_genesis(&self) -> bool {
        self.header.previous_block_hash.is_empty()
    }

    pub fn transaction_ids(&self) -> Vec<String> {
        self.transactions.iter().map(|tx| tx.id.clone()).collect()
    }

    /// Calculate the merkle root from transactions
    fn calculate_merkle_root(transactions: &[Transaction]) -> String {
        let ids: Vec<String> = transactions.iter().map(|tx| tx.id.clone()).collect();
        calculate_merkle_root_hex(&ids)
    }

    /// Verify the block's merkle root
    pub fn verify_merkle_root(&self) -> bool {
        Self::calculate_merkle_root(&self.transactions) == self.header.merkle_root
    }

    /// Inclusion proof for the transaction at `position`
    pub fn merkle_proof(&self, position: usize) -> Option<MerkleProof> {
        let leaves = self.merkle_leaves();
        MerkleProof::generate(&leaves, position)
    }

    /// Check a proof for `tx_id` against this block's merkle root
    pub fn proves(&self, tx_id: &str, proof: &MerkleProof) -> bool {
        match (hex::decode(tx_id), hex::decode(&self.header.merkle_root)) {
            (Ok(leaf), Ok(root)) => proof.verify(&leaf, &root),
            _ => false,
        }
    }

    fn merkle_leaves(&self) -> Vec<Vec<u8>> {
        self.transactions
            .iter()
            .map(|tx| hex::decode(&tx.id).unwrap_or_else(|_| sha256(tx.id.as_bytes())))
            .collect()
    }

    /// Structural checks that do not need the rest of the ledger
    pub fn validate(&self) -> Result<(), BlockError> {
        if self.header.state == BlockState::Invalid {
            return Err(BlockError::Rejected);
        }

        if !self.verify_merkle_root() {
            return Err(BlockError::InvalidMerkleRoot);
        }

        for tx in &self.transactions {
            if !tx.has_valid_id().unwrap_or(false) {
                return Err(BlockError::InvalidTransactionId(tx.id.clone()));
            }
        }

        Ok(())
    }

    /// Get number of transactions in this block
    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }

    /// Root as raw bytes, for callers that verify proofs themselves
    pub fn merkle_root_bytes(&self) -> Vec<u8> {
        calculate_merkle_root(&self.merkle_leaves())
    }
}
