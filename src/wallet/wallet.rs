//! Wallet: the signing handle of one account address
//!
//! A `Wallet` pairs an account name with one key pair. It is what the
//! transaction builder signs with; the account directory hands them out.

use crate::core::error::LedgerError;
use crate::core::ledger::Ledger;
use crate::core::transaction::{Transaction, UnspentOutput};
use crate::crypto::{KeyError, KeyPair};
use crate::wallet::builder::{self, TransferRequest};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Wallet-related errors
#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Account already exists: {0}")]
    DuplicateAccount(String),
    #[error("Unknown account: {0}")]
    UnknownAccount(String),
    #[error("Unknown address: {0}")]
    UnknownAddress(String),
    #[error("Account {0} is watch-only")]
    WatchOnly(String),
    #[error("Crypto error: {0}")]
    CryptoError(#[from] KeyError),
}

impl From<WalletError> for LedgerError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::UnknownAccount(name) => LedgerError::NotFound(format!("account {}", name)),
            WalletError::UnknownAddress(addr) => LedgerError::NotFound(format!("address {}", addr)),
            WalletError::WatchOnly(name) => {
                LedgerError::NotFound(format!("signing key of account {}", name))
            }
            WalletError::DuplicateAccount(name) => {
                LedgerError::InvalidRequest(format!("account {} already exists", name))
            }
            WalletError::CryptoError(e) => LedgerError::Key(e),
        }
    }
}

/// A key able to spend the outputs of one address
#[derive(Debug, Clone)]
pub struct Wallet {
    account: String,
    key_pair: KeyPair,
}

impl Wallet {
    /// Create a wallet with a fresh key pair
    pub fn new(account: &str) -> Self {
        Self::from_key_pair(account, KeyPair::generate())
    }

    pub fn from_key_pair(account: &str, key_pair: KeyPair) -> Self {
        Self {
            account: account.to_string(),
            key_pair,
        }
    }

    /// Import a wallet from a private key
    pub fn from_private_key(account: &str, private_key_hex: &str) -> Result<Self, WalletError> {
        let key_pair = KeyPair::from_private_key_hex(private_key_hex)?;
        Ok(Self::from_key_pair(account, key_pair))
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    /// Get the wallet's address
    pub fn address(&self) -> String {
        self.key_pair.address()
    }

    /// Get the wallet's public key (hex)
    pub fn public_key(&self) -> String {
        self.key_pair.public_key_hex()
    }

    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    /// Spendable balance in the ledger
    pub fn balance(&self, ledger: &Ledger) -> u64 {
        ledger.balance(&self.address())
    }

    /// Outputs this wallet can spend
    pub fn utxos(&self, ledger: &Ledger) -> Vec<UnspentOutput> {
        ledger.outputs_owned_by(&self.address())
    }

    /// Build and sign a payment to `recipients` from this wallet's outputs
    pub fn create_transaction(
        &self,
        recipients: &BTreeMap<String, u64>,
        ledger: &Ledger,
    ) -> Result<Transaction, LedgerError> {
        let request = TransferRequest::to_recipients(recipients);
        let built = builder::build(self, &request, &self.utxos(ledger), ledger)?;
        Ok(built.transaction)
    }

    /// Export wallet info (without private key)
    pub fn export_public_info(&self) -> WalletInfo {
        WalletInfo {
            account: self.account.clone(),
            address: self.address(),
            public_key: self.public_key(),
        }
    }
}

/// Public wallet information (safe to share)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletInfo {
    pub account: String,
    pub address: String,
    pub public_key: String,
}
