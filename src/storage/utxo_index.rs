//! UTXO index derived from the ledger
//!
//! Maps a transaction id to the outputs of that transaction that no later
//! input has consumed. The index is always reconstructible by folding
//! [`UtxoIndex::apply`] over every block from genesis; the persisted copy in
//! the `chainstate` tree is only a cache of that fold.
//!
//! Block application is split in two: [`UtxoIndex::stage`] computes the
//! changed entries without touching the index, so the caller can persist
//! them together with the block, and [`UtxoIndex::commit`] publishes them.

use crate::core::block::Block;
use crate::core::error::LedgerError;
use crate::core::transaction::{TxLocation, UnspentOutput};
use std::collections::BTreeMap;

// =============================================================================
// Delta
// =============================================================================

/// Entries changed by one block: `None` removes the entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtxoDelta {
    pub changes: BTreeMap<String, Option<Vec<UnspentOutput>>>,
}

impl UtxoDelta {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }
}

// =============================================================================
// UTXO Index
// =============================================================================

/// Transaction id → unspent outputs of that transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtxoIndex {
    entries: BTreeMap<String, Vec<UnspentOutput>>,
}

impl UtxoIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index loaded from persisted entries
    pub fn from_entries(entries: BTreeMap<String, Vec<UnspentOutput>>) -> Self {
        let entries = entries.into_iter().filter(|(_, v)| !v.is_empty()).collect();
        Self { entries }
    }

    /// Build the index by replaying blocks oldest first
    pub fn rebuild<'a, I>(blocks: I) -> Result<Self, LedgerError>
    where
        I: IntoIterator<Item = &'a Block>,
    {
        let mut index = Self::new();
        for (height, block) in blocks.into_iter().enumerate() {
            index.apply(block, height as u64)?;
        }
        Ok(index)
    }

    /// Apply one block in place
    pub fn apply(&mut self, block: &Block, height: u64) -> Result<(), LedgerError> {
        let delta = self.stage(block, height)?;
        self.commit(delta);
        Ok(())
    }

    /// Compute the effect of `block` at `height` without changing the index
    ///
    /// Transactions are taken in block order: a transaction's inputs are
    /// removed before its outputs are added, so a later transaction in the
    /// same block may spend an earlier one. An input whose output is not in
    /// the index fails the whole block with `UnknownReference`.
    pub fn stage(&self, block: &Block, height: u64) -> Result<UtxoDelta, LedgerError> {
        let mut overlay: BTreeMap<String, Option<Vec<UnspentOutput>>> = BTreeMap::new();

        for (position, tx) in block.transactions.iter().enumerate() {
            if !tx.is_mint() {
                for input in &tx.inputs {
                    let outputs = match overlay.get(&input.prev_tx_id) {
                        Some(staged) => staged.clone(),
                        None => self.entries.get(&input.prev_tx_id).cloned(),
                    };
                    let mut outputs = outputs.ok_or_else(|| {
                        LedgerError::UnknownReference(format!(
                            "transaction {} has no unspent outputs",
                            input.prev_tx_id
                        ))
                    })?;

                    let slot = input
                        .output_position()
                        .and_then(|idx| outputs.iter().position(|u| u.index == idx))
                        .ok_or_else(|| {
                            LedgerError::UnknownReference(format!(
                                "output {} of {} is spent or missing",
                                input.prev_output_index, input.prev_tx_id
                            ))
                        })?;
                    outputs.remove(slot);

                    let staged = if outputs.is_empty() { None } else { Some(outputs) };
                    overlay.insert(input.prev_tx_id.clone(), staged);
                }
            }

            let location = TxLocation {
                block: height,
                position: position as u32,
            };
            let created: Vec<UnspentOutput> = tx
                .outputs
                .iter()
                .enumerate()
                .map(|(i, out)| UnspentOutput {
                    tx_id: tx.id.clone(),
                    index: i as u32,
                    output: out.clone(),
                    location: Some(location),
                })
                .collect();
            if !created.is_empty() {
                overlay.insert(tx.id.clone(), Some(created));
            }
        }

        Ok(UtxoDelta { changes: overlay })
    }

    /// Publish a staged delta
    pub fn commit(&mut self, delta: UtxoDelta) {
        for (tx_id, change) in delta.changes {
            match change {
                Some(outputs) => {
                    self.entries.insert(tx_id, outputs);
                }
                None => {
                    self.entries.remove(&tx_id);
                }
            }
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn get(&self, tx_id: &str) -> Option<&[UnspentOutput]> {
        self.entries.get(tx_id).map(Vec::as_slice)
    }

    /// The unspent output at original position `index` of `tx_id`
    pub fn find_unspent(&self, tx_id: &str, index: u32) -> Option<&UnspentOutput> {
        self.entries
            .get(tx_id)
            .and_then(|outputs| outputs.iter().find(|u| u.index == index))
    }

    /// Every unspent output, oldest first
    pub fn iter_ledger_order(&self) -> Vec<&UnspentOutput> {
        let mut all: Vec<&UnspentOutput> = self.entries.values().flatten().collect();
        all.sort_by(|a, b| {
            (a.location, &a.tx_id, a.index).cmp(&(b.location, &b.tx_id, b.index))
        });
        all
    }

    /// Greedily collect outputs spendable by `owner` until `amount` is covered
    ///
    /// Returns the accumulated value and the outputs consumed; an accumulated
    /// value below `amount` means the owner cannot pay. The accumulated value
    /// saturates at `u64::MAX`.
    pub fn find_spendable(&self, owner: &str, amount: u64) -> (u64, Vec<UnspentOutput>) {
        let mut accumulated = 0u64;
        let mut selected = Vec::new();

        for utxo in self.iter_ledger_order() {
            if accumulated >= amount {
                break;
            }
            if utxo.output.is_spendable_by(owner) {
                accumulated = accumulated.saturating_add(utxo.output.value);
                selected.push(utxo.clone());
            }
        }

        (accumulated, selected)
    }

    /// Outputs `owner` could spend right now
    pub fn outputs_owned_by(&self, owner: &str) -> Vec<UnspentOutput> {
        self.iter_ledger_order()
            .into_iter()
            .filter(|u| u.output.is_spendable_by(owner))
            .cloned()
            .collect()
    }

    /// Spendable value of `owner`, saturating at `u64::MAX`
    pub fn balance(&self, owner: &str) -> u64 {
        self.entries
            .values()
            .flatten()
            .filter(|u| u.output.is_spendable_by(owner))
            .fold(0u64, |acc, u| acc.saturating_add(u.output.value))
    }

    /// Number of transactions with at least one unspent output
    pub fn count_transactions(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &BTreeMap<String, Vec<UnspentOutput>> {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transaction::{
        Transaction, TransactionBuilder, TransactionKind, TxInput, TxOutput,
    };
    use crate::crypto::KeyPair;
    use proptest::prelude::*;

    fn mint(to: &str, amount: u64) -> Transaction {
        Transaction::mint("light-zone", to, amount, "acct").unwrap()
    }

    fn spend(from: &UnspentOutput, to: &[(&str, u64)]) -> Transaction {
        let mut builder = TransactionBuilder::new("acct").add_input(from);
        for (addr, amount) in to {
            builder = builder.add_output(addr, *amount);
        }
        builder.build().unwrap()
    }

    fn chain_of(blocks: Vec<Vec<Transaction>>) -> Vec<Block> {
        let mut chain: Vec<Block> = Vec::new();
        for txs in blocks {
            let prev = chain.last().map(|b| b.hash()).unwrap_or_default();
            chain.push(Block::new(&prev, txs));
        }
        chain
    }

    #[test]
    fn test_apply_adds_outputs_with_location() {
        let tx = mint("alice", 100);
        let chain = chain_of(vec![vec![], vec![tx.clone()]]);
        let index = UtxoIndex::rebuild(&chain).unwrap();

        let utxo = index.find_unspent(&tx.id, 0).unwrap();
        assert_eq!(utxo.value(), 100);
        assert_eq!(utxo.location, Some(TxLocation { block: 1, position: 0 }));
        assert_eq!(index.balance("alice"), 100);
        assert_eq!(index.count_transactions(), 1);
    }

    #[test]
    fn test_spend_removes_exact_output() {
        let funding = Transaction::new(
            vec![TxInput::mint_placeholder("light-zone")],
            vec![TxOutput::new(10, "alice"), TxOutput::new(20, "alice")],
            TransactionKind::MintToTransfer,
            "acct",
        )
        .unwrap();
        let mut index = UtxoIndex::new();
        index.apply(&Block::genesis(vec![funding.clone()]), 0).unwrap();

        let second = index.find_unspent(&funding.id, 1).unwrap().clone();
        let tx = spend(&second, &[("bob", 20)]);
        index.apply(&Block::new("g", vec![tx]), 1).unwrap();

        let left = index.get(&funding.id).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].index, 0);
        assert_eq!(left[0].value(), 10);
        assert_eq!(index.balance("bob"), 20);
    }

    #[test]
    fn test_huge_balances_saturate() {
        let half = u64::MAX / 2 + 1;
        let mut index = UtxoIndex::new();
        index
            .apply(&Block::genesis(vec![mint("alice", half), mint("alice", half)]), 0)
            .unwrap();

        assert_eq!(index.balance("alice"), u64::MAX);
        let (acc, selected) = index.find_spendable("alice", u64::MAX);
        assert_eq!(acc, u64::MAX);
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn test_fully_spent_entry_is_removed() {
        let funding = mint("alice", 10);
        let mut index = UtxoIndex::new();
        index.apply(&Block::genesis(vec![funding.clone()]), 0).unwrap();

        let utxo = index.find_unspent(&funding.id, 0).unwrap().clone();
        index
            .apply(&Block::new("g", vec![spend(&utxo, &[("bob", 10)])]), 1)
            .unwrap();
        assert!(index.get(&funding.id).is_none());
    }

    #[test]
    fn test_spend_within_same_block() {
        let funding = mint("alice", 10);
        let utxo = UnspentOutput {
            tx_id: funding.id.clone(),
            index: 0,
            output: funding.outputs[0].clone(),
            location: None,
        };
        let hop = spend(&utxo, &[("bob", 10)]);

        let mut index = UtxoIndex::new();
        index.apply(&Block::genesis(vec![funding, hop.clone()]), 0).unwrap();
        assert_eq!(index.balance("alice"), 0);
        assert_eq!(index.balance("bob"), 10);
        assert_eq!(
            index.find_unspent(&hop.id, 0).unwrap().location,
            Some(TxLocation { block: 0, position: 1 })
        );
    }

    #[test]
    fn test_double_spend_in_block_is_unknown_reference() {
        let funding = mint("alice", 10);
        let mut index = UtxoIndex::new();
        index.apply(&Block::genesis(vec![funding.clone()]), 0).unwrap();

        let utxo = index.find_unspent(&funding.id, 0).unwrap().clone();
        let a = spend(&utxo, &[("bob", 10)]);
        let b = spend(&utxo, &[("carol", 10)]);
        let before = index.clone();

        let err = index.apply(&Block::new("g", vec![a, b]), 1).unwrap_err();
        assert!(matches!(err, LedgerError::UnknownReference(_)));
        assert_eq!(index, before);
    }

    #[test]
    fn test_stage_does_not_mutate() {
        let funding = mint("alice", 10);
        let index = UtxoIndex::new();
        let delta = index.stage(&Block::genesis(vec![funding]), 0).unwrap();
        assert_eq!(delta.len(), 1);
        assert!(index.is_empty());
    }

    #[test]
    fn test_find_spendable_skips_foreign_and_earmarked() {
        let funding = Transaction::new(
            vec![TxInput::mint_placeholder("light-zone")],
            vec![
                TxOutput::new(5, "alice"),
                TxOutput::earmarked(50, "alice"),
                TxOutput::new(7, "bob"),
                TxOutput::new(8, "alice"),
            ],
            TransactionKind::MintToTransfer,
            "acct",
        )
        .unwrap();
        let mut index = UtxoIndex::new();
        index.apply(&Block::genesis(vec![funding]), 0).unwrap();

        let (acc, selected) = index.find_spendable("alice", 100);
        assert_eq!(acc, 13);
        assert_eq!(selected.len(), 2);
        assert!(selected.iter().all(|u| !u.output.used));

        let (acc, selected) = index.find_spendable("alice", 4);
        assert_eq!(acc, 5);
        assert_eq!(selected.len(), 1);

        assert_eq!(index.balance("alice"), 13);
        assert_eq!(index.outputs_owned_by("alice").len(), 2);
    }

    #[test]
    fn test_from_entries_drops_empty_lists() {
        let mut entries = BTreeMap::new();
        entries.insert("ab".to_string(), Vec::new());
        assert!(UtxoIndex::from_entries(entries).is_empty());
    }

    // Random chains: each step either mints to an owner or moves the oldest
    // spendable output of one owner to another, splitting off change.
    fn random_chain(steps: Vec<(u8, u8, u64, bool)>) -> Vec<Block> {
        let owners: Vec<String> = (0..4).map(|_| KeyPair::generate().address()).collect();
        let mut blocks = vec![Block::genesis(vec![])];
        let mut index = UtxoIndex::new();
        index.apply(&blocks[0], 0).unwrap();

        for (from, to, amount, is_mint) in steps {
            let from = owners[from as usize % owners.len()].as_str();
            let to = owners[to as usize % owners.len()].as_str();
            let amount = amount.max(1);
            let tx = match index.outputs_owned_by(from).first() {
                Some(utxo) if !is_mint && utxo.value() > amount => {
                    spend(utxo, &[(to, amount), (from, utxo.value() - amount)])
                }
                Some(utxo) if !is_mint => spend(utxo, &[(to, utxo.value())]),
                _ => mint(to, amount),
            };
            let block = Block::new(&blocks[blocks.len() - 1].hash(), vec![tx]);
            index.apply(&block, blocks.len() as u64).unwrap();
            blocks.push(block);
        }
        blocks
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn rebuild_matches_incremental_apply(
            steps in prop::collection::vec((0u8..4, 0u8..4, 1u64..1_000, any::<bool>()), 1..24)
        ) {
            let blocks = random_chain(steps);

            let mut incremental = UtxoIndex::new();
            for (height, block) in blocks.iter().enumerate() {
                incremental.apply(block, height as u64).unwrap();
            }
            let rebuilt = UtxoIndex::rebuild(&blocks).unwrap();
            prop_assert_eq!(rebuilt, incremental);
        }

        #[test]
        fn non_mint_transactions_conserve_value(
            steps in prop::collection::vec((0u8..4, 0u8..4, 1u64..1_000, any::<bool>()), 1..24)
        ) {
            let blocks = random_chain(steps);
            let mut index = UtxoIndex::new();
            for (height, block) in blocks.iter().enumerate() {
                for tx in block.transactions.iter().filter(|tx| !tx.is_mint()) {
                    let spent: u64 = tx
                        .inputs
                        .iter()
                        .map(|i| index.find_unspent(&i.prev_tx_id, i.prev_output_index as u32).unwrap().value())
                        .sum();
                    prop_assert_eq!(spent, tx.total_output().unwrap());
                }
                index.apply(block, height as u64).unwrap();
            }
        }

        #[test]
        fn find_spendable_is_complete(
            steps in prop::collection::vec((0u8..4, 0u8..4, 1u64..1_000, any::<bool>()), 1..24),
            want in 1u64..5_000,
        ) {
            let blocks = random_chain(steps);
            let index = UtxoIndex::rebuild(&blocks).unwrap();
            for owner in index.iter_ledger_order().iter().map(|u| u.output.owner.clone()) {
                let (acc, selected) = index.find_spendable(&owner, want);
                let picked: u64 = selected.iter().map(|u| u.value()).sum();
                prop_assert_eq!(acc, picked);
                if acc < want {
                    prop_assert_eq!(acc, index.balance(&owner));
                }
            }
        }
    }
}
