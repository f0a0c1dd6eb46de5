//! Accounts, signing handles and the transaction builder

pub mod account;
pub mod builder;
pub mod wallet;

pub use account::{Account, AccountAddress, AccountDirectory};
pub use builder::{
    build, build_from, build_mint, select_outputs, select_outputs_of, BuiltTransaction,
    TransferRequest,
};
pub use wallet::{Wallet, WalletError, WalletInfo};
