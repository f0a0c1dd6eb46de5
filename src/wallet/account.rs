//! Accounts and the account directory
//!
//! An account groups a signing key with any number of extra addresses, each
//! backed by its own key pair. Accounts provisioned for a remote public key
//! are watch-only: the directory knows the key but cannot sign for it.
//!
//! The directory is passed explicitly to whatever needs it (verifier,
//! cross-zone flows) and can be shared behind an `Arc`.

use crate::core::verify::{AccountKeys, AccountLookup};
use crate::crypto::{public_key_to_address, KeyPair};
use crate::wallet::wallet::{Wallet, WalletError};
use log::info;
use parking_lot::RwLock;
use secp256k1::PublicKey;
use std::collections::{BTreeMap, HashMap};

// =============================================================================
// Account
// =============================================================================

/// One address of an account
#[derive(Debug, Clone)]
pub struct AccountAddress {
    pub address: String,
    pub public_key: PublicKey,
    key_pair: Option<KeyPair>,
}

impl AccountAddress {
    fn owned(key_pair: KeyPair) -> Self {
        Self {
            address: key_pair.address(),
            public_key: key_pair.public_key,
            key_pair: Some(key_pair),
        }
    }

    fn watch_only(public_key: PublicKey) -> Self {
        Self {
            address: public_key_to_address(&public_key),
            public_key,
            key_pair: None,
        }
    }

    pub fn can_sign(&self) -> bool {
        self.key_pair.is_some()
    }
}

/// A named account
#[derive(Debug, Clone)]
pub struct Account {
    pub name: String,
    /// Account signing key; its address is the account's main address
    main: AccountAddress,
    extra: Vec<AccountAddress>,
}

impl Account {
    /// Account holding the secret key
    pub fn with_key_pair(name: &str, key_pair: KeyPair) -> Self {
        Self {
            name: name.to_string(),
            main: AccountAddress::owned(key_pair),
            extra: Vec::new(),
        }
    }

    /// Account known only by its public key
    pub fn watch_only(name: &str, public_key: PublicKey) -> Self {
        Self {
            name: name.to_string(),
            main: AccountAddress::watch_only(public_key),
            extra: Vec::new(),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        self.main.public_key
    }

    pub fn address(&self) -> &str {
        &self.main.address
    }

    pub fn is_watch_only(&self) -> bool {
        !self.main.can_sign()
    }

    /// Main address first, then extra addresses in creation order
    pub fn addresses(&self) -> impl Iterator<Item = &AccountAddress> + '_ {
        std::iter::once(&self.main).chain(self.extra.iter())
    }

    pub fn owns(&self, address: &str) -> bool {
        self.addresses().any(|a| a.address == address)
    }

    /// Add `count` addresses, each with a fresh key pair
    pub fn create_addresses(&mut self, count: usize) -> Result<Vec<String>, WalletError> {
        if self.is_watch_only() {
            return Err(WalletError::WatchOnly(self.name.clone()));
        }
        let created: Vec<AccountAddress> = (0..count)
            .map(|_| AccountAddress::owned(KeyPair::generate()))
            .collect();
        let addresses = created.iter().map(|a| a.address.clone()).collect();
        self.extra.extend(created);
        Ok(addresses)
    }

    /// Signing handle for the main address
    pub fn wallet(&self) -> Result<Wallet, WalletError> {
        self.wallet_for(&self.main.address)
    }

    /// Signing handle for one of the account's addresses
    pub fn wallet_for(&self, address: &str) -> Result<Wallet, WalletError> {
        let entry = self
            .addresses()
            .find(|a| a.address == address)
            .ok_or_else(|| WalletError::UnknownAddress(address.to_string()))?;
        entry
            .key_pair
            .clone()
            .map(|kp| Wallet::from_key_pair(&self.name, kp))
            .ok_or_else(|| WalletError::WatchOnly(self.name.clone()))
    }

    /// Signing handles for every address holding a secret key, main first
    pub fn wallets(&self) -> Vec<Wallet> {
        self.addresses()
            .filter_map(|a| a.key_pair.clone())
            .map(|kp| Wallet::from_key_pair(&self.name, kp))
            .collect()
    }

    pub fn keys(&self) -> AccountKeys {
        AccountKeys {
            public_key: self.main.public_key,
            addresses: self
                .addresses()
                .map(|a| (a.address.clone(), a.public_key))
                .collect(),
        }
    }
}

// =============================================================================
// Account Directory
// =============================================================================

#[derive(Debug, Default)]
struct DirectoryInner {
    accounts: BTreeMap<String, Account>,
    /// address → account name
    by_address: HashMap<String, String>,
}

impl DirectoryInner {
    fn insert(&mut self, account: Account) -> Result<(), WalletError> {
        if self.accounts.contains_key(&account.name) {
            return Err(WalletError::DuplicateAccount(account.name));
        }
        for entry in account.addresses() {
            self.by_address.insert(entry.address.clone(), account.name.clone());
        }
        self.accounts.insert(account.name.clone(), account);
        Ok(())
    }
}

/// Registry of accounts, keyed by name and by address
#[derive(Debug, Default)]
pub struct AccountDirectory {
    inner: RwLock<DirectoryInner>,
}

impl AccountDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an account with a fresh signing key
    pub fn create_account(&self, name: &str) -> Result<Wallet, WalletError> {
        self.import(name, KeyPair::generate())
    }

    /// Register an account for an existing key pair
    pub fn import(&self, name: &str, key_pair: KeyPair) -> Result<Wallet, WalletError> {
        let account = Account::with_key_pair(name, key_pair);
        let wallet = account.wallet()?;
        self.inner.write().insert(account)?;
        info!("Created account {} ({})", name, wallet.address());
        Ok(wallet)
    }

    /// Register a watch-only account for a public key
    pub fn register_watch_only(&self, name: &str, public_key: PublicKey) -> Result<String, WalletError> {
        let account = Account::watch_only(name, public_key);
        let address = account.address().to_string();
        self.inner.write().insert(account)?;
        info!("Registered watch-only account {} ({})", name, address);
        Ok(address)
    }

    /// Add `count` addresses to `name`
    pub fn create_addresses(&self, name: &str, count: usize) -> Result<Vec<String>, WalletError> {
        let mut inner = self.inner.write();
        let account = inner
            .accounts
            .get_mut(name)
            .ok_or_else(|| WalletError::UnknownAccount(name.to_string()))?;
        let created = account.create_addresses(count)?;
        for address in &created {
            inner.by_address.insert(address.clone(), name.to_string());
        }
        Ok(created)
    }

    pub fn get(&self, name: &str) -> Option<Account> {
        self.inner.read().accounts.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().accounts.contains_key(name)
    }

    /// Name of the account holding an address backed by `public_key`
    pub fn find_by_public_key(&self, public_key: &PublicKey) -> Option<String> {
        self.inner
            .read()
            .accounts
            .values()
            .find(|a| a.addresses().any(|entry| entry.public_key == *public_key))
            .map(|a| a.name.clone())
    }

    /// Signing handle for the main address of `name`
    pub fn wallet(&self, name: &str) -> Result<Wallet, WalletError> {
        self.get(name)
            .ok_or_else(|| WalletError::UnknownAccount(name.to_string()))?
            .wallet()
    }

    /// Signing handles for every address of `name`, main address first
    pub fn signing_wallets(&self, name: &str) -> Result<Vec<Wallet>, WalletError> {
        let account = self
            .get(name)
            .ok_or_else(|| WalletError::UnknownAccount(name.to_string()))?;
        let wallets = account.wallets();
        if wallets.is_empty() {
            return Err(WalletError::WatchOnly(name.to_string()));
        }
        Ok(wallets)
    }

    /// Signing handle for `address`, whichever account holds it
    pub fn wallet_for_address(&self, address: &str) -> Result<Wallet, WalletError> {
        let inner = self.inner.read();
        let name = inner
            .by_address
            .get(address)
            .ok_or_else(|| WalletError::UnknownAddress(address.to_string()))?;
        match inner.accounts.get(name) {
            Some(account) => account.wallet_for(address),
            None => Err(WalletError::UnknownAccount(name.clone())),
        }
    }

    pub fn remove(&self, name: &str) -> Result<Account, WalletError> {
        let mut inner = self.inner.write();
        let account = inner
            .accounts
            .remove(name)
            .ok_or_else(|| WalletError::UnknownAccount(name.to_string()))?;
        inner.by_address.retain(|_, owner| owner.as_str() != name);
        Ok(account)
    }

    pub fn names(&self) -> Vec<String> {
        self.inner.read().accounts.keys().cloned().collect()
    }
}

impl AccountLookup for AccountDirectory {
    fn account_keys(&self, account: &str) -> Option<AccountKeys> {
        self.inner.read().accounts.get(account).map(Account::keys)
    }

    fn owner_of(&self, address: &str) -> Option<String> {
        self.inner.read().by_address.get(address).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_lookup() {
        let directory = AccountDirectory::new();
        let wallet = directory.create_account("alice").unwrap();

        assert!(directory.contains("alice"));
        assert_eq!(directory.owner_of(&wallet.address()), Some("alice".to_string()));
        assert_eq!(
            directory.find_by_public_key(&wallet.key_pair().public_key),
            Some("alice".to_string())
        );
        let keys = directory.account_keys("alice").unwrap();
        assert_eq!(keys.public_key, wallet.key_pair().public_key);
        assert!(keys.owns(&wallet.address()));
        assert!(directory.account_keys("bob").is_none());
    }

    #[test]
    fn test_duplicate_account() {
        let directory = AccountDirectory::new();
        directory.create_account("alice").unwrap();
        assert!(matches!(
            directory.create_account("alice"),
            Err(WalletError::DuplicateAccount(_))
        ));
    }

    #[test]
    fn test_extra_addresses() {
        let directory = AccountDirectory::new();
        directory.create_account("alice").unwrap();
        let created = directory.create_addresses("alice", 3).unwrap();
        assert_eq!(created.len(), 3);

        let account = directory.get("alice").unwrap();
        assert_eq!(account.addresses().count(), 4);
        for address in &created {
            assert_eq!(directory.owner_of(address), Some("alice".to_string()));
            let wallet = directory.wallet_for_address(address).unwrap();
            assert_eq!(&wallet.address(), address);
            assert_eq!(wallet.account(), "alice");
        }
        assert_eq!(directory.account_keys("alice").unwrap().addresses.len(), 4);

        let wallets = directory.signing_wallets("alice").unwrap();
        assert_eq!(wallets.len(), 4);
        assert_eq!(wallets[0].address(), account.address());
    }

    #[test]
    fn test_watch_only_account() {
        let directory = AccountDirectory::new();
        let remote = KeyPair::generate();
        let address = directory.register_watch_only("remote", remote.public_key).unwrap();

        assert_eq!(address, remote.address());
        assert!(directory.get("remote").unwrap().is_watch_only());
        assert!(matches!(directory.wallet("remote"), Err(WalletError::WatchOnly(_))));
        assert!(matches!(
            directory.signing_wallets("remote"),
            Err(WalletError::WatchOnly(_))
        ));
        assert!(matches!(
            directory.create_addresses("remote", 1),
            Err(WalletError::WatchOnly(_))
        ));
    }

    #[test]
    fn test_remove_account() {
        let directory = AccountDirectory::new();
        let wallet = directory.create_account("alice").unwrap();
        directory.remove("alice").unwrap();

        assert!(directory.owner_of(&wallet.address()).is_none());
        assert!(matches!(directory.wallet("alice"), Err(WalletError::UnknownAccount(_))));
        assert!(directory.names().is_empty());
    }
}
