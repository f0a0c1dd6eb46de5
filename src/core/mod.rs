//! Core ledger components
//!
//! This module contains the fundamental building blocks:
//! - Transactions (UTXO model with cross-zone mint and burn kinds)
//! - Blocks (linked by hash, merkle root over transaction ids)
//! - Ledger (block store and UTXO index committed together)
//! - Verifier (ownership, double spend, value and signature checks)

pub mod block;
pub mod error;
pub mod ledger;
pub mod transaction;
pub mod verify;

pub use block::{Block, BlockError, BlockHeader, BlockState, BLOCK_VERSION};
pub use error::{LedgerError, LedgerResult};
pub use ledger::{ChainStats, Ledger};
pub use transaction::{
    Transaction, TransactionBuilder, TransactionError, TransactionKind, TxInput, TxLocation,
    TxOutput, UnspentOutput, MINT_OUTPUT_INDEX,
};
pub use verify::{AccountKeys, AccountLookup, Verifier};
