//! Transaction builder
//!
//! Turns a payment request into a signed transaction: choose the owner's
//! largest unspent outputs until the request is covered, pay each recipient,
//! return any change to the owner, then sign every input. Nothing is
//! consumed until the resulting transaction is committed in a block.

use crate::core::error::{LedgerError, LedgerResult};
use crate::core::ledger::Ledger;
use crate::core::transaction::{
    Transaction, TransactionBuilder, TransactionKind, TxOutput, UnspentOutput,
};
use crate::crypto::KeyPair;
use crate::wallet::Wallet;
use log::debug;
use std::collections::{BTreeMap, HashMap};
use std::slice;

/// What a transaction has to pay, before any input is chosen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub outputs: Vec<TxOutput>,
    pub kind: TransactionKind,
}

impl TransferRequest {
    /// Ordinary payment, one output per recipient
    pub fn to_recipients(recipients: &BTreeMap<String, u64>) -> Self {
        Self {
            outputs: recipients
                .iter()
                .map(|(address, amount)| TxOutput::new(*amount, address))
                .collect(),
            kind: TransactionKind::Normal,
        }
    }

    /// Value leaving for the light-compute zone, earmarked so it cannot be
    /// spent again here
    pub fn to_light_compute(destination: &str, amount: u64) -> Self {
        Self {
            outputs: vec![TxOutput::earmarked(amount, destination)],
            kind: TransactionKind::MintToLight,
        }
    }

    pub fn total(&self) -> LedgerResult<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, out| acc.checked_add(out.value))
            .ok_or_else(|| LedgerError::InvalidRequest("requested total overflows".to_string()))
    }
}

/// A signed transaction together with the outputs it spends
#[derive(Debug, Clone)]
pub struct BuiltTransaction {
    pub transaction: Transaction,
    /// Spent outputs, in input order
    pub consumed: Vec<UnspentOutput>,
    pub change: u64,
}

/// Owner's unused outputs, largest first, until `need` is covered
///
/// Equal values keep the order of `available`. Returns the accumulated
/// value with the chosen outputs; the accumulated value falls short of
/// `need` only when every eligible output was taken. It saturates at
/// `u64::MAX`.
pub fn select_outputs(owner: &str, need: u64, available: &[UnspentOutput]) -> (u64, Vec<UnspentOutput>) {
    select_outputs_of(&[owner.to_string()], need, available)
}

/// Like [`select_outputs`], drawing on every address in `owners`
pub fn select_outputs_of(
    owners: &[String],
    need: u64,
    available: &[UnspentOutput],
) -> (u64, Vec<UnspentOutput>) {
    let mut candidates: Vec<&UnspentOutput> = available
        .iter()
        .filter(|u| owners.iter().any(|owner| u.output.is_spendable_by(owner)))
        .collect();
    candidates.sort_by(|a, b| b.output.value.cmp(&a.output.value));

    let mut accumulated = 0u64;
    let mut selected = Vec::new();
    for utxo in candidates {
        if accumulated >= need {
            break;
        }
        accumulated = accumulated.saturating_add(utxo.output.value);
        selected.push(utxo.clone());
    }
    (accumulated, selected)
}

/// Build and sign a transaction paying `request` from `wallet`'s outputs
///
/// Fails with `InsufficientFunds` before anything is built when the
/// wallet's outputs in `available` cannot cover the request.
pub fn build(
    wallet: &Wallet,
    request: &TransferRequest,
    available: &[UnspentOutput],
    ledger: &Ledger,
) -> LedgerResult<BuiltTransaction> {
    build_from(slice::from_ref(wallet), request, available, ledger)
}

/// Build and sign a transaction paying `request` from several addresses of
/// one account
///
/// Each input is signed by the wallet of the address it spends. Change goes
/// to the first wallet.
pub fn build_from(
    wallets: &[Wallet],
    request: &TransferRequest,
    available: &[UnspentOutput],
    ledger: &Ledger,
) -> LedgerResult<BuiltTransaction> {
    let need = request.total()?;
    if need == 0 {
        return Err(LedgerError::InvalidRequest("nothing to transfer".to_string()));
    }
    let main = wallets
        .first()
        .ok_or_else(|| LedgerError::NotFound("signing wallet".to_string()))?;

    let owners: Vec<String> = wallets.iter().map(Wallet::address).collect();
    let (accumulated, consumed) = select_outputs_of(&owners, need, available);
    if accumulated < need {
        return Err(LedgerError::InsufficientFunds {
            have: accumulated,
            need,
        });
    }

    let owner = main.address();
    let mut builder = TransactionBuilder::new(main.account()).kind(request.kind);
    for utxo in &consumed {
        builder = builder.add_input(utxo);
    }
    for output in &request.outputs {
        builder = if output.used {
            builder.add_earmarked_output(&output.owner, output.value)
        } else {
            builder.add_output(&output.owner, output.value)
        };
    }
    let selected: u128 = consumed.iter().map(|u| u128::from(u.value())).sum();
    let change = u64::try_from(selected - u128::from(need))
        .map_err(|_| LedgerError::InvalidRequest("change overflows".to_string()))?;
    if change > 0 {
        builder = builder.add_output(&owner, change);
    }

    let mut transaction = builder.build()?;
    let prev_txs = ledger.previous_transactions(&transaction)?;
    let keys: HashMap<String, KeyPair> = wallets
        .iter()
        .map(|w| (w.address(), w.key_pair().clone()))
        .collect();
    transaction.sign_by_owner(&keys, &prev_txs)?;

    debug!(
        "Built transaction {} spending {} outputs ({} change)",
        transaction.id,
        consumed.len(),
        change
    );
    Ok(BuiltTransaction {
        transaction,
        consumed,
        change,
    })
}

/// Mint `amount` to `destination` on behalf of a light-compute zone address
///
/// No selection and no signature: the single placeholder input marks the
/// value as created here.
pub fn build_mint(
    source_address: &str,
    destination: &str,
    amount: u64,
    account: &str,
) -> LedgerResult<Transaction> {
    if amount == 0 {
        return Err(LedgerError::InvalidRequest("cannot mint zero".to_string()));
    }
    Ok(Transaction::mint(source_address, destination, amount, account)?)
}
