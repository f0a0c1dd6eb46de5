//! Cross-zone transfers between the transfer zone and the light-compute zone
//!
//! Two independent local flows:
//! - [`CrossZone::to_transfer`] mints value into this ledger for a
//!   light-compute zone request
//! - [`CrossZone::to_light_compute`] burns value here and returns the
//!   evidence the light-compute zone needs to credit it
//!
//! Neither flow waits for the other zone. A crash after a burn is committed
//! but before the other zone acts on the receipt leaves the value destroyed
//! here and not yet created there; nothing in this crate rolls that back.

mod to_light;
mod to_transfer;
pub mod rpc;

use crate::core::block::Block;
use crate::core::ledger::Ledger;
use crate::core::transaction::Transaction;
use crate::crypto::MerkleProof;
use crate::wallet::AccountDirectory;
use serde::{Deserialize, Serialize};

pub use rpc::{CommitTransferReply, CommitTransferRequest, TransferService};

/// Cross-zone operations over one ledger and its account directory
pub struct CrossZone<'a> {
    ledger: &'a Ledger,
    accounts: &'a AccountDirectory,
}

impl<'a> CrossZone<'a> {
    pub fn new(ledger: &'a Ledger, accounts: &'a AccountDirectory) -> Self {
        Self { ledger, accounts }
    }
}

/// Outcome of a mint into the transfer zone
#[derive(Debug, Clone)]
pub struct MintReceipt {
    /// Account credited
    pub account: String,
    pub address: String,
    /// The account did not exist and was registered watch-only
    pub provisioned: bool,
    pub transaction: Transaction,
    pub block_hash: String,
}

/// Where a burned output came from
///
/// Enough for the light-compute zone to find the creating transaction by
/// coordinate and check its inclusion without the rest of the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferLogEntry {
    pub original_transaction: Transaction,
    /// Block height from genesis
    pub block_coordinate: u64,
    /// Position inside that block
    pub transaction_coordinate: u32,
    pub block_hash: String,
    pub inclusion_proof: MerkleProof,
}

impl TransferLogEntry {
    /// Check the entry against the block it names
    pub fn is_included_in(&self, block: &Block) -> bool {
        block.hash() == self.block_hash
            && block.proves(&self.original_transaction.id, &self.inclusion_proof)
    }

    /// Check the entry against a merkle root alone
    pub fn verify_proof(&self, merkle_root: &str) -> bool {
        match (hex::decode(&self.original_transaction.id), hex::decode(merkle_root)) {
            (Ok(leaf), Ok(root)) => self.inclusion_proof.verify(&leaf, &root),
            _ => false,
        }
    }
}

/// Outcome of a burn toward the light-compute zone
#[derive(Debug, Clone)]
pub struct BurnReceipt {
    pub amount: u64,
    /// Sender's spendable balance after the burn
    pub remaining_balance: u64,
    pub transfer_log: Vec<TransferLogEntry>,
    pub transaction: Transaction,
    pub block_hash: String,
}
