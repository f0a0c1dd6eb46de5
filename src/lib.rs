//! Zone Ledger: the UTXO ledger of the transfer zone
//!
//! This crate provides the ledger core of a two-zone value-transfer network:
//! - Append-only block store on sled with an atomically maintained UTXO index
//! - ECDSA signatures (secp256k1) over a signature-independent transaction id
//! - Largest-first input selection with change back to the sender
//! - Accounts with several addresses and watch-only accounts
//! - Cross-zone mint (light-compute → transfer) and burn with a transfer log
//!
//! # Example
//!
//! ```rust
//! use zone_ledger::core::Ledger;
//! use zone_ledger::interconnect::CrossZone;
//! use zone_ledger::wallet::AccountDirectory;
//!
//! let ledger = Ledger::open_temporary().unwrap();
//! ledger.commit_transactions(vec![]).unwrap();
//!
//! let accounts = AccountDirectory::new();
//! let alice = accounts.create_account("alice").unwrap();
//! let zone = CrossZone::new(&ledger, &accounts);
//!
//! // Value arriving from the light-compute zone
//! zone.to_transfer("light-addr", &alice.key_pair().public_key, 100).unwrap();
//!
//! // Send part of it back
//! let receipt = zone.to_light_compute("alice", "light-addr", 30).unwrap();
//! assert_eq!(receipt.remaining_balance, 70);
//! assert_eq!(receipt.transfer_log.len(), 1);
//! ```

pub mod cli;
pub mod core;
pub mod crypto;
pub mod interconnect;
pub mod storage;
pub mod wallet;

// Re-export commonly used types
pub use core::{Block, Ledger, LedgerError, LedgerResult, Transaction, Verifier};
pub use crypto::{KeyPair, MerkleProof};
pub use interconnect::{CrossZone, TransferService};
pub use storage::StorageConfig;
pub use wallet::{AccountDirectory, Wallet};
