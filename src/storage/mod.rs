//! Persistence for the ledger: the sled-backed block store and the UTXO index

pub mod ledger_store;
pub mod utxo_index;

pub use ledger_store::{
    BlockIterator, LedgerStore, StorageConfig, StorageError, StorageResult, CODEC_VERSION,
};
pub use utxo_index::{UtxoDelta, UtxoIndex};
