//! Light-compute zone → transfer zone: mint

use super::{CrossZone, MintReceipt};
use crate::core::error::{LedgerError, LedgerResult};
use crate::crypto::public_key_to_address;
use crate::wallet::build_mint;
use log::info;
use secp256k1::PublicKey;

impl CrossZone<'_> {
    /// Mint `amount` to the address of `destination`
    ///
    /// An unknown key is registered as a new watch-only account named after
    /// its address. The mint is committed in its own block.
    pub fn to_transfer(
        &self,
        from_address: &str,
        destination: &PublicKey,
        amount: u64,
    ) -> LedgerResult<MintReceipt> {
        let address = public_key_to_address(destination);
        let (account, provisioned) = match self.accounts.find_by_public_key(destination) {
            Some(account) => (account, false),
            None => {
                self.accounts.register_watch_only(&address, *destination)?;
                (address.clone(), true)
            }
        };

        self.mint_to(from_address, &account, &address, amount, provisioned)
    }

    /// Mint `amount` to `address`, which must belong to `account`
    ///
    /// Refused when it would push the address's balance past `u64::MAX`.
    pub(crate) fn mint_to(
        &self,
        from_address: &str,
        account: &str,
        address: &str,
        amount: u64,
        provisioned: bool,
    ) -> LedgerResult<MintReceipt> {
        if self.ledger.balance(address).checked_add(amount).is_none() {
            return Err(LedgerError::InvalidRequest(format!(
                "minting {} would overflow the balance of {}",
                amount, address
            )));
        }
        let transaction = build_mint(from_address, address, amount, account)?;
        let block = self.ledger.commit_transactions(vec![transaction.clone()])?;

        info!(
            "Minted {} to {} (account {}{}) from light-compute address {}",
            amount,
            address,
            account,
            if provisioned { ", provisioned" } else { "" },
            from_address
        );
        Ok(MintReceipt {
            account: account.to_string(),
            address: address.to_string(),
            provisioned,
            transaction,
            block_hash: block.hash(),
        })
    }
}
