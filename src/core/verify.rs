//! Transaction verification against the ledger
//!
//! A transaction is accepted only if every input names an output that the
//! ledger holds, that is still in the UTXO index with the same value, owner
//! and `used` marker, and that belongs to the submitting account. Signatures
//! are then checked against the key backing each spent output's address.
//! Nothing here writes to the index.
//!
//! Mint inputs never pass: value is created only by the cross-zone mint flow,
//! which commits without going through the verifier.

use crate::core::error::{LedgerError, LedgerResult};
use crate::core::ledger::Ledger;
use crate::core::transaction::{Transaction, TransactionError, TxInput};
use crate::crypto::KeyError;
use log::{debug, warn};
use secp256k1::PublicKey;
use std::collections::BTreeMap;

// =============================================================================
// Account resolution
// =============================================================================

/// Public material of one account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountKeys {
    /// Account signing key
    pub public_key: PublicKey,
    /// Every address of the account with the key that backs it
    pub addresses: BTreeMap<String, PublicKey>,
}

impl AccountKeys {
    pub fn owns(&self, address: &str) -> bool {
        self.addresses.contains_key(address)
    }
}

/// Lookup the ledger core needs from the account subsystem
pub trait AccountLookup {
    /// Keys and addresses of `account`
    fn account_keys(&self, account: &str) -> Option<AccountKeys>;

    /// Name of the account owning `address`
    fn owner_of(&self, address: &str) -> Option<String>;
}

// =============================================================================
// Verifier
// =============================================================================

/// Read-only transaction checks
pub struct Verifier<'a, A: AccountLookup + ?Sized> {
    ledger: &'a Ledger,
    accounts: &'a A,
}

impl<'a, A: AccountLookup + ?Sized> Verifier<'a, A> {
    pub fn new(ledger: &'a Ledger, accounts: &'a A) -> Self {
        Self { ledger, accounts }
    }

    /// Whether `tx` may be accepted
    pub fn verify(&self, tx: &Transaction) -> bool {
        match self.check(tx) {
            Ok(()) => true,
            Err(e) => {
                warn!("Rejected transaction {}: {}", tx.id, e);
                false
            }
        }
    }

    /// Check `tx`, reporting the first reason it cannot be accepted
    pub fn check(&self, tx: &Transaction) -> LedgerResult<()> {
        let keys = self
            .accounts
            .account_keys(&tx.account)
            .ok_or_else(|| LedgerError::NotFound(format!("account {}", tx.account)))?;

        if !tx.has_valid_id()? {
            return Err(LedgerError::SignatureInvalid(tx.id.clone()));
        }

        if tx.inputs.iter().any(TxInput::is_mint_placeholder) {
            return Err(LedgerError::UnknownReference(format!(
                "transaction {} has a mint input with no funding output",
                tx.id
            )));
        }

        let prev_txs = self.ledger.previous_transactions(tx)?;

        let mut input_total = 0u64;
        let mut signers = Vec::with_capacity(tx.inputs.len());
        {
            let index = self.ledger.index();
            for input in &tx.inputs {
                let position = input.output_position().ok_or_else(|| {
                    LedgerError::UnknownReference(format!(
                        "output {} of {}",
                        input.prev_output_index, input.prev_tx_id
                    ))
                })?;
                let recorded = prev_txs
                    .get(&input.prev_tx_id)
                    .and_then(|prev| prev.outputs.get(position as usize))
                    .ok_or_else(|| {
                        LedgerError::UnknownReference(format!(
                            "output {} of {}",
                            position, input.prev_tx_id
                        ))
                    })?;

                let unspent = index
                    .find_unspent(&input.prev_tx_id, position)
                    .filter(|u| u.output == *recorded)
                    .ok_or_else(|| {
                        LedgerError::UnknownReference(format!(
                            "output {} of {} is already spent",
                            position, input.prev_tx_id
                        ))
                    })?;

                if unspent.output.used {
                    return Err(LedgerError::UnknownReference(format!(
                        "output {} of {} is earmarked for the light-compute zone",
                        position, input.prev_tx_id
                    )));
                }

                let signer = keys.addresses.get(&unspent.output.owner).ok_or_else(|| {
                    LedgerError::UnknownReference(format!(
                        "output {} of {} is not owned by account {}",
                        position, input.prev_tx_id, tx.account
                    ))
                })?;

                input_total = input_total.checked_add(unspent.output.value).ok_or_else(|| {
                    LedgerError::InvalidRequest(format!("inputs of {} overflow", tx.id))
                })?;
                signers.push(*signer);
            }
        }

        let output_total = tx.total_output()?;
        if input_total != output_total {
            return Err(LedgerError::ValueMismatch {
                inputs: input_total,
                outputs: output_total,
            });
        }

        for (i, signer) in signers.iter().enumerate() {
            let valid = match tx.verify_input(i, signer, &prev_txs) {
                Ok(valid) => valid,
                Err(TransactionError::CryptoError(KeyError::InvalidSignature)) => false,
                Err(e) => return Err(e.into()),
            };
            if !valid {
                return Err(LedgerError::SignatureInvalid(tx.id.clone()));
            }
        }

        debug!("Transaction {} verified ({} inputs)", tx.id, tx.inputs.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ledger::test_support::funded_ledger;
    use crate::core::transaction::{TransactionBuilder, TransactionKind, TxOutput, UnspentOutput};
    use crate::crypto::KeyPair;
    use std::collections::HashMap;

    /// Accounts backed by a single key each
    struct Keys(HashMap<String, KeyPair>);

    impl Keys {
        fn of(pairs: &[(&str, &KeyPair)]) -> Self {
            Keys(
                pairs
                    .iter()
                    .map(|(name, kp)| (name.to_string(), (*kp).clone()))
                    .collect(),
            )
        }
    }

    impl AccountLookup for Keys {
        fn account_keys(&self, account: &str) -> Option<AccountKeys> {
            self.0.get(account).map(|kp| AccountKeys {
                public_key: kp.public_key,
                addresses: [(kp.address(), kp.public_key)].into_iter().collect(),
            })
        }

        fn owner_of(&self, address: &str) -> Option<String> {
            self.0
                .iter()
                .find(|(_, kp)| kp.address() == address)
                .map(|(name, _)| name.clone())
        }
    }

    fn pay(ledger: &Ledger, from: &KeyPair, utxo: &UnspentOutput, to: &str, amount: u64) -> Transaction {
        let mut builder = TransactionBuilder::new("alice")
            .add_input(utxo)
            .add_output(to, amount);
        if utxo.value() > amount {
            builder = builder.add_output(&from.address(), utxo.value() - amount);
        }
        let mut tx = builder.build().unwrap();
        let prev = ledger.previous_transactions(&tx).unwrap();
        tx.sign(from, &prev).unwrap();
        tx
    }

    #[test]
    fn test_valid_transaction_passes() {
        let alice = KeyPair::generate();
        let (ledger, _) = funded_ledger(&alice, 100);
        let accounts = Keys::of(&[("alice", &alice)]);

        let utxo = ledger.outputs_owned_by(&alice.address()).remove(0);
        let tx = pay(&ledger, &alice, &utxo, "bob", 60);

        let before = ledger.index().clone();
        assert!(Verifier::new(&ledger, &accounts).verify(&tx));
        assert_eq!(*ledger.index(), before);
    }

    #[test]
    fn test_unknown_account_is_not_found() {
        let alice = KeyPair::generate();
        let (ledger, _) = funded_ledger(&alice, 100);
        let accounts = Keys::of(&[]);

        let utxo = ledger.outputs_owned_by(&alice.address()).remove(0);
        let tx = pay(&ledger, &alice, &utxo, "bob", 100);
        assert!(matches!(
            Verifier::new(&ledger, &accounts).check(&tx),
            Err(LedgerError::NotFound(_))
        ));
    }

    #[test]
    fn test_wrong_key_is_signature_invalid() {
        let alice = KeyPair::generate();
        let mallory = KeyPair::generate();
        let (ledger, _) = funded_ledger(&alice, 100);
        let accounts = Keys::of(&[("alice", &alice)]);

        let utxo = ledger.outputs_owned_by(&alice.address()).remove(0);
        let tx = pay(&ledger, &mallory, &utxo, "bob", 100);
        assert!(matches!(
            Verifier::new(&ledger, &accounts).check(&tx),
            Err(LedgerError::SignatureInvalid(_))
        ));
    }

    #[test]
    fn test_tampered_output_is_rejected() {
        let alice = KeyPair::generate();
        let (ledger, _) = funded_ledger(&alice, 100);
        let accounts = Keys::of(&[("alice", &alice)]);

        let utxo = ledger.outputs_owned_by(&alice.address()).remove(0);
        let mut tx = pay(&ledger, &alice, &utxo, "bob", 60);
        tx.outputs[0].value = 59;
        tx.outputs[1].value = 41;
        tx.id = tx.calculate_hash().unwrap();
        assert!(matches!(
            Verifier::new(&ledger, &accounts).check(&tx),
            Err(LedgerError::SignatureInvalid(_))
        ));
    }

    #[test]
    fn test_inflated_outputs_are_value_mismatch() {
        let alice = KeyPair::generate();
        let (ledger, _) = funded_ledger(&alice, 100);
        let accounts = Keys::of(&[("alice", &alice)]);

        let utxo = ledger.outputs_owned_by(&alice.address()).remove(0);
        let tx = pay(&ledger, &alice, &utxo, "bob", 150);
        assert!(matches!(
            Verifier::new(&ledger, &accounts).check(&tx),
            Err(LedgerError::ValueMismatch { inputs: 100, outputs: 150 })
        ));
    }

    #[test]
    fn test_double_spend_is_unknown_reference() {
        let alice = KeyPair::generate();
        let (ledger, _) = funded_ledger(&alice, 100);
        let accounts = Keys::of(&[("alice", &alice)]);
        let verifier = Verifier::new(&ledger, &accounts);

        let utxo = ledger.outputs_owned_by(&alice.address()).remove(0);
        let first = pay(&ledger, &alice, &utxo, "bob", 100);
        let second = pay(&ledger, &alice, &utxo, "carol", 100);
        assert!(verifier.verify(&first));
        assert!(verifier.verify(&second));

        ledger.commit_transactions(vec![first]).unwrap();
        assert!(matches!(
            verifier.check(&second),
            Err(LedgerError::UnknownReference(_))
        ));
    }

    #[test]
    fn test_foreign_output_is_rejected() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let (ledger, _) = funded_ledger(&alice, 100);
        let accounts = Keys::of(&[("alice", &alice), ("bob", &bob)]);

        let utxo = ledger.outputs_owned_by(&alice.address()).remove(0);
        let mut tx = pay(&ledger, &alice, &utxo, "carol", 100);
        tx.account = "bob".to_string();
        tx.id = tx.calculate_hash().unwrap();
        assert!(matches!(
            Verifier::new(&ledger, &accounts).check(&tx),
            Err(LedgerError::UnknownReference(_))
        ));
    }

    #[test]
    fn test_submitted_mint_is_rejected() {
        let alice = KeyPair::generate();
        let (ledger, _) = funded_ledger(&alice, 1);
        let accounts = Keys::of(&[("alice", &alice)]);
        let verifier = Verifier::new(&ledger, &accounts);

        let mint = Transaction::mint("light-zone", &alice.address(), 5, "alice").unwrap();
        assert!(matches!(verifier.check(&mint), Err(LedgerError::UnknownReference(_))));

        let forged = Transaction::new(
            vec![TxInput::mint_placeholder("light-zone")],
            vec![TxOutput::new(1_000_000, "mallory")],
            TransactionKind::Normal,
            "alice",
        )
        .unwrap();
        assert!(!verifier.verify(&forged));
    }

    #[test]
    fn test_wrapping_outputs_are_rejected() {
        let alice = KeyPair::generate();
        let (ledger, _) = funded_ledger(&alice, 100);
        let accounts = Keys::of(&[("alice", &alice)]);

        let utxo = ledger.outputs_owned_by(&alice.address()).remove(0);
        let mut tx = TransactionBuilder::new("alice")
            .add_input(&utxo)
            .add_output(&alice.address(), u64::MAX)
            .add_output(&alice.address(), 101)
            .build()
            .unwrap();
        let prev = ledger.previous_transactions(&tx).unwrap();
        tx.sign(&alice, &prev).unwrap();

        assert!(matches!(
            Verifier::new(&ledger, &accounts).check(&tx),
            Err(LedgerError::InvalidRequest(_))
        ));
    }
}
