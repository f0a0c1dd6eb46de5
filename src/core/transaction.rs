//! Transaction model for the transfer zone
//!
//! UTXO-style transactions with one signature per input. The transaction id
//! is the SHA-256 of the trimmed copy (signatures cleared, id zeroed), so it
//! is fixed once inputs and outputs are final and does not move when the
//! inputs are signed afterwards.
//!
//! Each input is signed over its own view of the trimmed copy: the input's
//! `source_address` is replaced by the owner of the output it spends, as
//! recorded in the previous transaction.

use crate::crypto::{sha256_hex, verify_signature, KeyError, KeyPair};
use secp256k1::PublicKey;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Output index carried by the single placeholder input of a mint
pub const MINT_OUTPUT_INDEX: i64 = -1;

// =============================================================================
// Error Types
// =============================================================================

/// Transaction-related errors
#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Previous transaction {0} is not known")]
    UnknownPrevious(String),
    #[error("Input {input} references missing output {index} of {tx_id}")]
    MissingOutput {
        input: usize,
        tx_id: String,
        index: i64,
    },
    #[error("No signing key for address {0}")]
    MissingKey(String),
    #[error("Value total overflows")]
    ValueOverflow,
    #[error("Crypto error: {0}")]
    CryptoError(#[from] KeyError),
    #[error("Encoding error: {0}")]
    EncodingError(#[from] bincode::Error),
}

// =============================================================================
// Transaction Kind
// =============================================================================

/// What a transaction does to the zone's money supply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionKind {
    /// Ordinary transfer inside the transfer zone
    Normal,
    /// Burn in the transfer zone, attested to the light-compute zone
    MintToLight,
    /// Value minted into the transfer zone on behalf of the light-compute zone
    MintToTransfer,
}

impl TransactionKind {
    /// Numeric code used on the wire between zones
    pub fn code(self) -> u8 {
        match self {
            TransactionKind::Normal => 0,
            TransactionKind::MintToLight => 1,
            TransactionKind::MintToTransfer => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(TransactionKind::Normal),
            1 => Some(TransactionKind::MintToLight),
            2 => Some(TransactionKind::MintToTransfer),
            _ => None,
        }
    }
}

// =============================================================================
// Transaction Input
// =============================================================================

/// Transaction input (reference to a previous output)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// Id of the transaction holding the spent output; empty for a mint
    pub prev_tx_id: String,
    /// Position of the spent output; `MINT_OUTPUT_INDEX` for a mint
    pub prev_output_index: i64,
    /// Compact ECDSA signature, empty until signed
    pub signature: Vec<u8>,
    /// Address the spent value comes from. For a mint this is the
    /// light-compute zone address that asked for it.
    pub source_address: String,
    /// Set on the placeholder input of a cross-zone mint
    pub cross_zone_mint: bool,
}

impl TxInput {
    /// Input spending output `index` of `tx_id`
    pub fn spending(tx_id: &str, index: u32, source_address: &str) -> Self {
        Self {
            prev_tx_id: tx_id.to_string(),
            prev_output_index: i64::from(index),
            signature: Vec::new(),
            source_address: source_address.to_string(),
            cross_zone_mint: false,
        }
    }

    /// Placeholder input of a mint: no funding source
    pub fn mint_placeholder(source_address: &str) -> Self {
        Self {
            prev_tx_id: String::new(),
            prev_output_index: MINT_OUTPUT_INDEX,
            signature: Vec::new(),
            source_address: source_address.to_string(),
            cross_zone_mint: true,
        }
    }

    /// True when this input funds nothing and creates value instead
    pub fn is_mint_placeholder(&self) -> bool {
        self.prev_tx_id.is_empty() && self.prev_output_index == MINT_OUTPUT_INDEX
    }

    /// Position of the referenced output, if the index is in range
    pub fn output_position(&self) -> Option<u32> {
        u32::try_from(self.prev_output_index).ok()
    }
}

// =============================================================================
// Transaction Output
// =============================================================================

/// Transaction output
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxOutput {
    /// Amount of value
    pub value: u64,
    /// Owner address
    pub owner: String,
    /// Earmarked for cross-zone movement; never spendable in this zone
    pub used: bool,
}

impl TxOutput {
    pub fn new(value: u64, owner: &str) -> Self {
        Self {
            value,
            owner: owner.to_string(),
            used: false,
        }
    }

    /// Output carrying value out to the light-compute zone
    pub fn earmarked(value: u64, owner: &str) -> Self {
        Self {
            value,
            owner: owner.to_string(),
            used: true,
        }
    }

    pub fn is_owned_by(&self, address: &str) -> bool {
        self.owner == address
    }

    /// Owned by `address` and available for ordinary spending
    pub fn is_spendable_by(&self, address: &str) -> bool {
        !self.used && self.is_owned_by(address)
    }
}

// =============================================================================
// Unspent outputs
// =============================================================================

/// Where a transaction sits in the ledger
///
/// `block` counts from genesis (0), `position` is the index inside the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxLocation {
    pub block: u64,
    pub position: u32,
}

/// An output that no later input has consumed
///
/// The same shape serves the index, balance queries and the cross-zone burn;
/// `location` is filled in whenever the output came from a stored block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentOutput {
    pub tx_id: String,
    /// Original position inside the creating transaction
    pub index: u32,
    pub output: TxOutput,
    #[serde(default)]
    pub location: Option<TxLocation>,
}

impl UnspentOutput {
    pub fn value(&self) -> u64 {
        self.output.value
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// A ledger transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Hex SHA-256 of the trimmed copy with this field empty
    pub id: String,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub kind: TransactionKind,
    /// Account that submitted the transaction
    pub account: String,
    /// Random for mints, which have no inputs to tell them apart; zero otherwise
    #[serde(default)]
    pub nonce: u64,
}

impl Transaction {
    /// Create a new unsigned transaction with its id computed
    pub fn new(
        inputs: Vec<TxInput>,
        outputs: Vec<TxOutput>,
        kind: TransactionKind,
        account: &str,
    ) -> Result<Self, TransactionError> {
        let mut tx = Self {
            id: String::new(),
            inputs,
            outputs,
            kind,
            account: account.to_string(),
            nonce: 0,
        };
        tx.id = tx.calculate_hash()?;
        Ok(tx)
    }

    /// Create a mint into the transfer zone
    ///
    /// One placeholder input, one output carrying the full amount. Mints are
    /// never signed.
    pub fn mint(
        source_address: &str,
        destination: &str,
        amount: u64,
        account: &str,
    ) -> Result<Self, TransactionError> {
        let mut tx = Self::new(
            vec![TxInput::mint_placeholder(source_address)],
            vec![TxOutput::new(amount, destination)],
            TransactionKind::MintToTransfer,
            account,
        )?;
        tx.nonce = rand::random();
        tx.id = tx.calculate_hash()?;
        Ok(tx)
    }

    /// Exactly one input, with no funding reference
    pub fn is_mint(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].is_mint_placeholder()
    }

    /// Copy with every input signature cleared
    pub fn trimmed_copy(&self) -> Transaction {
        let mut copy = self.clone();
        for input in &mut copy.inputs {
            input.signature.clear();
        }
        copy
    }

    /// Hash of the trimmed copy with the id field emptied
    pub fn calculate_hash(&self) -> Result<String, TransactionError> {
        let mut copy = self.trimmed_copy();
        copy.id.clear();
        let bytes = bincode::serialize(&copy)?;
        Ok(sha256_hex(&bytes))
    }

    /// Whether the stored id still matches the content
    pub fn has_valid_id(&self) -> Result<bool, TransactionError> {
        Ok(self.calculate_hash()? == self.id)
    }

    /// Bytes signed for input `input`, with its source address substituted
    fn signing_payload(&self, input: usize, source_address: &str) -> Result<Vec<u8>, TransactionError> {
        let mut copy = self.trimmed_copy();
        copy.inputs[input].source_address = source_address.to_string();
        Ok(bincode::serialize(&copy)?)
    }

    /// Owner of the output that input `input` spends
    fn referenced_owner<'a>(
        &self,
        input: usize,
        prev_txs: &'a HashMap<String, Transaction>,
    ) -> Result<&'a str, TransactionError> {
        let vin = &self.inputs[input];
        let prev = prev_txs
            .get(&vin.prev_tx_id)
            .ok_or_else(|| TransactionError::UnknownPrevious(vin.prev_tx_id.clone()))?;
        vin.output_position()
            .and_then(|pos| prev.outputs.get(pos as usize))
            .map(|out| out.owner.as_str())
            .ok_or_else(|| TransactionError::MissingOutput {
                input,
                tx_id: vin.prev_tx_id.clone(),
                index: vin.prev_output_index,
            })
    }

    /// Sign every input with `key_pair`
    ///
    /// `prev_txs` must hold every transaction the inputs reference; a missing
    /// one means the ledger and the caller disagree and nothing is signed.
    pub fn sign(
        &mut self,
        key_pair: &KeyPair,
        prev_txs: &HashMap<String, Transaction>,
    ) -> Result<(), TransactionError> {
        self.sign_with(|_| Some(key_pair), prev_txs)
    }

    /// Sign each input with the key of the address owning the output it spends
    pub fn sign_by_owner(
        &mut self,
        keys: &HashMap<String, KeyPair>,
        prev_txs: &HashMap<String, Transaction>,
    ) -> Result<(), TransactionError> {
        self.sign_with(|owner| keys.get(owner), prev_txs)
    }

    fn sign_with<'k, F>(
        &mut self,
        key_for: F,
        prev_txs: &HashMap<String, Transaction>,
    ) -> Result<(), TransactionError>
    where
        F: Fn(&str) -> Option<&'k KeyPair>,
    {
        if self.is_mint() {
            return Ok(());
        }

        let owners = (0..self.inputs.len())
            .map(|i| self.referenced_owner(i, prev_txs).map(str::to_string))
            .collect::<Result<Vec<_>, _>>()?;

        let mut signatures = Vec::with_capacity(owners.len());
        for (i, owner) in owners.iter().enumerate() {
            let key_pair =
                key_for(owner).ok_or_else(|| TransactionError::MissingKey(owner.clone()))?;
            let payload = self.signing_payload(i, owner)?;
            signatures.push(key_pair.sign(&payload)?);
        }

        for (input, signature) in self.inputs.iter_mut().zip(signatures) {
            input.signature = signature;
        }
        Ok(())
    }

    /// Verify every input signature against `public_key`
    pub fn verify_signatures(
        &self,
        public_key: &PublicKey,
        prev_txs: &HashMap<String, Transaction>,
    ) -> Result<bool, TransactionError> {
        if self.is_mint() {
            return Ok(true);
        }

        for i in 0..self.inputs.len() {
            if !self.verify_input(i, public_key, prev_txs)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Verify the signature of input `input` alone
    ///
    /// An index past the last input verifies as `false`.
    pub fn verify_input(
        &self,
        input: usize,
        public_key: &PublicKey,
        prev_txs: &HashMap<String, Transaction>,
    ) -> Result<bool, TransactionError> {
        let Some(vin) = self.inputs.get(input) else {
            return Ok(false);
        };
        let signature = &vin.signature;
        if signature.is_empty() {
            return Ok(false);
        }
        let owner = self.referenced_owner(input, prev_txs)?;
        let payload = self.signing_payload(input, owner)?;
        Ok(verify_signature(public_key, &payload, signature)?)
    }

    /// Get total output amount
    pub fn total_output(&self) -> Result<u64, TransactionError> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, o| acc.checked_add(o.value))
            .ok_or(TransactionError::ValueOverflow)
    }

    /// Sum of the values this transaction's inputs spend
    pub fn total_input(&self, prev_txs: &HashMap<String, Transaction>) -> Result<u64, TransactionError> {
        let mut total = 0u64;
        for (i, input) in self.inputs.iter().enumerate() {
            if input.is_mint_placeholder() {
                continue;
            }
            let prev = prev_txs
                .get(&input.prev_tx_id)
                .ok_or_else(|| TransactionError::UnknownPrevious(input.prev_tx_id.clone()))?;
            let out = input
                .output_position()
                .and_then(|pos| prev.outputs.get(pos as usize))
                .ok_or_else(|| TransactionError::MissingOutput {
                    input: i,
                    tx_id: input.prev_tx_id.clone(),
                    index: input.prev_output_index,
                })?;
            total = total
                .checked_add(out.value)
                .ok_or(TransactionError::ValueOverflow)?;
        }
        Ok(total)
    }
}

// =============================================================================
// Transaction Builder
// =============================================================================

/// Fluent assembly of a transaction from chosen outputs
pub struct TransactionBuilder {
    inputs: Vec<TxInput>,
    outputs: Vec<TxOutput>,
    kind: TransactionKind,
    account: String,
}

impl TransactionBuilder {
    pub fn new(account: &str) -> Self {
        Self {
            inputs: Vec::new(),
            outputs: Vec::new(),
            kind: TransactionKind::Normal,
            account: account.to_string(),
        }
    }

    pub fn kind(mut self, kind: TransactionKind) -> Self {
        self.kind = kind;
        self
    }

    /// Spend an unspent output; the input's address is the output's owner
    pub fn add_input(mut self, utxo: &UnspentOutput) -> Self {
        self.inputs
            .push(TxInput::spending(&utxo.tx_id, utxo.index, &utxo.output.owner));
        self
    }

    pub fn add_output(mut self, recipient: &str, amount: u64) -> Self {
        self.outputs.push(TxOutput::new(amount, recipient));
        self
    }

    /// Output leaving the zone; marked used so nobody spends it here
    pub fn add_earmarked_output(mut self, recipient: &str, amount: u64) -> Self {
        self.outputs.push(TxOutput::earmarked(amount, recipient));
        self
    }

    /// Build and sign the transaction
    pub fn build_and_sign(
        self,
        key_pair: &KeyPair,
        prev_txs: &HashMap<String, Transaction>,
    ) -> Result<Transaction, TransactionError> {
        let mut tx = self.build()?;
        tx.sign(key_pair, prev_txs)?;
        Ok(tx)
    }

    /// Build without signing
    pub fn build(self) -> Result<Transaction, TransactionError> {
        Transaction::new(self.inputs, self.outputs, self.kind, &self.account)
    }
}

// =============================================================================
// Tests
// =============================================================================
