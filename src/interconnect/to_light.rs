//! Transfer zone → light-compute zone: burn and attest

use super::{BurnReceipt, CrossZone, TransferLogEntry};
use crate::core::error::{LedgerError, LedgerResult};
use crate::core::ledger::Ledger;
use crate::core::transaction::UnspentOutput;
use crate::core::verify::Verifier;
use crate::wallet::{build_from, TransferRequest, Wallet};
use log::info;

impl CrossZone<'_> {
    /// Move `amount` from `account` to `destination` in the light-compute zone
    ///
    /// Outputs of every signing address of the account are eligible. The
    /// transaction's first output carries the amount to `destination` and is
    /// earmarked, so it can never be spent here; change returns to the main
    /// address. The transaction is verified and committed, and the receipt
    /// lists where every consumed output was created.
    pub fn to_light_compute(
        &self,
        account: &str,
        destination: &str,
        amount: u64,
    ) -> LedgerResult<BurnReceipt> {
        let wallets = self.accounts.signing_wallets(account)?;
        let available: Vec<UnspentOutput> = wallets
            .iter()
            .flat_map(|w| w.utxos(self.ledger))
            .collect();
        let balance = available
            .iter()
            .fold(0u64, |acc, u| acc.saturating_add(u.value()));
        if balance < amount {
            return Err(LedgerError::InsufficientFunds {
                have: balance,
                need: amount,
            });
        }

        let request = TransferRequest::to_light_compute(destination, amount);
        let built = build_from(&wallets, &request, &available, self.ledger)?;
        Verifier::new(self.ledger, self.accounts).check(&built.transaction)?;

        let transfer_log = built
            .consumed
            .iter()
            .map(|utxo| self.log_entry(utxo))
            .collect::<LedgerResult<Vec<_>>>()?;

        let block = self
            .ledger
            .commit_transactions(vec![built.transaction.clone()])?;

        info!(
            "Burned {} from account {} toward light-compute address {} ({} inputs)",
            amount,
            account,
            destination,
            transfer_log.len()
        );
        Ok(BurnReceipt {
            amount,
            remaining_balance: total_balance(&wallets, self.ledger),
            transfer_log,
            transaction: built.transaction,
            block_hash: block.hash(),
        })
    }

    /// Provenance of one consumed output
    fn log_entry(&self, utxo: &UnspentOutput) -> LedgerResult<TransferLogEntry> {
        let location = utxo.location.ok_or_else(|| {
            LedgerError::NotFound(format!("location of output {} of {}", utxo.index, utxo.tx_id))
        })?;
        let block = self.ledger.block_at(location.block)?;
        let original_transaction = block
            .transactions
            .get(location.position as usize)
            .filter(|tx| tx.id == utxo.tx_id)
            .cloned()
            .ok_or_else(|| {
                LedgerError::UnknownReference(format!(
                    "transaction {} is not at ({}, {})",
                    utxo.tx_id, location.block, location.position
                ))
            })?;
        let inclusion_proof = block
            .merkle_proof(location.position as usize)
            .ok_or_else(|| LedgerError::NotFound(format!("merkle proof for {}", utxo.tx_id)))?;

        Ok(TransferLogEntry {
            original_transaction,
            block_coordinate: location.block,
            transaction_coordinate: location.position,
            block_hash: block.hash(),
            inclusion_proof,
        })
    }
}

fn total_balance(wallets: &[Wallet], ledger: &Ledger) -> u64 {
    wallets
        .iter()
        .fold(0u64, |acc, w| acc.saturating_add(w.balance(ledger)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transaction::{TransactionKind, TxOutput};
    use crate::wallet::AccountDirectory;

    fn funded(amounts: &[u64]) -> (Ledger, AccountDirectory, String) {
        let ledger = Ledger::open_temporary().unwrap();
        ledger.commit_transactions(vec![]).unwrap();
        let accounts = AccountDirectory::new();
        let wallet = accounts.create_account("alice").unwrap();
        let zone = CrossZone::new(&ledger, &accounts);
        for amount in amounts {
            zone.to_transfer("light-addr", &wallet.key_pair().public_key, *amount)
                .unwrap();
        }
        (ledger, accounts, wallet.address())
    }

    #[test]
    fn test_burn_with_change() {
        let (ledger, accounts, alice) = funded(&[40]);
        let zone = CrossZone::new(&ledger, &accounts);

        let receipt = zone.to_light_compute("alice", "light-bob", 30).unwrap();
        let tx = &receipt.transaction;

        assert_eq!(receipt.amount, 30);
        assert_eq!(receipt.remaining_balance, 10);
        assert_eq!(tx.kind, TransactionKind::MintToLight);
        assert_eq!(tx.outputs[0], TxOutput::earmarked(30, "light-bob"));
        assert_eq!(tx.outputs[1], TxOutput::new(10, &alice));
        assert_eq!(ledger.balance(&alice), 10);
        assert_eq!(ledger.balance("light-bob"), 0);
        assert_eq!(ledger.tip().unwrap(), Some(receipt.block_hash.clone()));
    }

    #[test]
    fn test_transfer_log_resolves_to_origin() {
        let (ledger, accounts, _) = funded(&[40]);
        let zone = CrossZone::new(&ledger, &accounts);

        let receipt = zone.to_light_compute("alice", "light-bob", 30).unwrap();
        assert_eq!(receipt.transfer_log.len(), 1);

        let entry = &receipt.transfer_log[0];
        let spent = &receipt.transaction.inputs[0];
        assert_eq!(entry.original_transaction.id, spent.prev_tx_id);

        let resolved = ledger
            .transaction_at(entry.block_coordinate, entry.transaction_coordinate)
            .unwrap();
        assert_eq!(resolved, entry.original_transaction);

        let block = ledger.block_at(entry.block_coordinate).unwrap();
        assert!(entry.is_included_in(&block));
        assert!(entry.verify_proof(&block.header.merkle_root));
    }

    #[test]
    fn test_one_log_entry_per_input() {
        let (ledger, accounts, _) = funded(&[10, 20, 30]);
        let zone = CrossZone::new(&ledger, &accounts);

        let receipt = zone.to_light_compute("alice", "light-bob", 45).unwrap();
        assert_eq!(receipt.transaction.inputs.len(), 2);
        assert_eq!(receipt.transfer_log.len(), 2);
        for (entry, input) in receipt.transfer_log.iter().zip(&receipt.transaction.inputs) {
            assert_eq!(entry.original_transaction.id, input.prev_tx_id);
        }
        assert_eq!(receipt.remaining_balance, 15);
    }

    #[test]
    fn test_earmarked_output_cannot_be_burned_again() {
        let (ledger, accounts, _) = funded(&[40]);
        let zone = CrossZone::new(&ledger, &accounts);

        zone.to_light_compute("alice", "light-bob", 40).unwrap();
        let err = zone.to_light_compute("alice", "light-bob", 1).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { have: 0, need: 1 }));
    }

    #[test]
    fn test_insufficient_balance_changes_nothing() {
        let (ledger, accounts, alice) = funded(&[40]);
        let tip = ledger.tip().unwrap();

        let err = CrossZone::new(&ledger, &accounts)
            .to_light_compute("alice", "light-bob", 41)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { have: 40, need: 41 }));
        assert_eq!(ledger.tip().unwrap(), tip);
        assert_eq!(ledger.balance(&alice), 40);
    }

    #[test]
    fn test_burn_spans_account_addresses() {
        let (ledger, accounts, alice) = funded(&[20]);
        let extra = accounts.create_addresses("alice", 1).unwrap().remove(0);
        let extra_key = accounts.wallet_for_address(&extra).unwrap().key_pair().public_key;
        let zone = CrossZone::new(&ledger, &accounts);
        zone.to_transfer("light-addr", &extra_key, 20).unwrap();

        let receipt = zone.to_light_compute("alice", "light-bob", 30).unwrap();
        assert_eq!(receipt.transaction.inputs.len(), 2);
        assert_eq!(receipt.transfer_log.len(), 2);
        assert_eq!(receipt.transaction.outputs[1], TxOutput::new(10, &alice));
        assert_eq!(receipt.remaining_balance, 10);
        assert_eq!(ledger.balance(&extra), 0);
    }

    #[test]
    fn test_unknown_account_is_not_found() {
        let (ledger, accounts, _) = funded(&[40]);
        let err = CrossZone::new(&ledger, &accounts)
            .to_light_compute("mallory", "light-bob", 1)
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }
}
