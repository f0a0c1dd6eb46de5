//! Error taxonomy shared by the ledger, builder, verifier and cross-zone flows

use crate::core::block::BlockError;
use crate::core::transaction::TransactionError;
use crate::crypto::KeyError;
use crate::storage::StorageError;
use thiserror::Error;

/// Errors surfaced to callers of the ledger core
#[derive(Error, Debug)]
pub enum LedgerError {
    /// I/O or codec failure on the persistent store
    #[error("Storage failure: {0}")]
    StorageFailure(#[source] StorageError),
    #[error("Insufficient funds: have {have}, need {need}")]
    InsufficientFunds { have: u64, need: u64 },
    /// An input names a transaction or output the ledger does not hold unspent
    #[error("Unknown reference: {0}")]
    UnknownReference(String),
    #[error("Invalid signature on transaction {0}")]
    SignatureInvalid(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid block: {0}")]
    InvalidBlock(#[from] BlockError),
    #[error("Value mismatch: inputs {inputs}, outputs {outputs}")]
    ValueMismatch { inputs: u64, outputs: u64 },
    #[error("Key error: {0}")]
    Key(#[from] KeyError),
    /// A request the ledger cannot act on, such as a zero amount
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<StorageError> for LedgerError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::BrokenLink { expected, found } => {
                LedgerError::InvalidBlock(BlockError::BrokenLink { expected, found })
            }
            other => LedgerError::StorageFailure(other),
        }
    }
}

impl From<TransactionError> for LedgerError {
    fn from(err: TransactionError) -> Self {
        match err {
            TransactionError::UnknownPrevious(id) => {
                LedgerError::UnknownReference(format!("transaction {}", id))
            }
            TransactionError::MissingOutput { tx_id, index, .. } => {
                LedgerError::UnknownReference(format!("output {} of {}", index, tx_id))
            }
            TransactionError::MissingKey(address) => {
                LedgerError::NotFound(format!("signing key for {}", address))
            }
            TransactionError::ValueOverflow => {
                LedgerError::InvalidRequest("value total overflows".to_string())
            }
            TransactionError::CryptoError(e) => LedgerError::Key(e),
            TransactionError::EncodingError(e) => {
                LedgerError::StorageFailure(StorageError::Codec(e))
            }
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
