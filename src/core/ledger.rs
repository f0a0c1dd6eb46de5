//! Ledger handle
//!
//! One long-lived value owning the block store and the UTXO index built from
//! it. Every block goes through [`Ledger::commit_block`], which holds the
//! index write lock across staging, the store transaction and publication,
//! so readers see the index either before or after a block, never between.

use crate::core::block::Block;
use crate::core::error::{LedgerError, LedgerResult};
use crate::core::transaction::{Transaction, TxOutput, UnspentOutput};
use crate::storage::{LedgerStore, StorageConfig, UtxoIndex};
use log::{info, warn};
use parking_lot::{RwLock, RwLockReadGuard};
use std::collections::HashMap;

/// Chain statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainStats {
    pub height: Option<u64>,
    pub total_blocks: u64,
    pub total_transactions: u64,
    /// Transactions with at least one unspent output
    pub utxo_transactions: usize,
    /// Value held in spendable and earmarked outputs, saturating at `u64::MAX`
    pub total_unspent: u64,
    pub tip: Option<String>,
}

/// The transfer-zone ledger
#[derive(Debug)]
pub struct Ledger {
    store: LedgerStore,
    index: RwLock<UtxoIndex>,
}

impl Ledger {
    /// Open the ledger, loading the persisted UTXO entries
    pub fn open(config: &StorageConfig) -> LedgerResult<Self> {
        let store = LedgerStore::open(config)?;
        let index = UtxoIndex::from_entries(store.load_chainstate()?);
        info!(
            "Ledger opened at height {:?} with {} unspent transactions",
            store.height()?,
            index.count_transactions()
        );
        Ok(Self {
            store,
            index: RwLock::new(index),
        })
    }

    /// Ledger backed by a throw-away database
    pub fn open_temporary() -> LedgerResult<Self> {
        Self::open(&StorageConfig::temporary())
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    /// Shared view of the index; blocks commits until dropped
    pub fn index(&self) -> RwLockReadGuard<'_, UtxoIndex> {
        self.index.read()
    }

    pub fn tip(&self) -> LedgerResult<Option<String>> {
        Ok(self.store.tip()?)
    }

    pub fn height(&self) -> LedgerResult<Option<u64>> {
        Ok(self.store.height()?)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Validate and append a block, updating the index in the same step
    pub fn commit_block(&self, block: Block) -> LedgerResult<String> {
        let mut index = self.index.write();
        self.commit_locked(&mut index, &block)
    }

    /// Wrap `transactions` in a block on top of the tip and commit it
    ///
    /// On an empty ledger this creates the genesis block.
    pub fn commit_transactions(&self, transactions: Vec<Transaction>) -> LedgerResult<Block> {
        let mut index = self.index.write();
        let previous = self.store.tip()?.unwrap_or_default();
        let block = Block::new(&previous, transactions);
        self.commit_locked(&mut index, &block)?;
        Ok(block)
    }

    fn commit_locked(&self, index: &mut UtxoIndex, block: &Block) -> LedgerResult<String> {
        block.validate()?;

        let height = match self.store.height()? {
            Some(h) if !block.is_genesis() => h + 1,
            _ => 0,
        };
        let delta = index.stage(block, height)?;
        let (hash, height) = self.store.append_with_delta(block, &delta)?;
        index.commit(delta);

        info!(
            "Committed block {} at height {} with {} transactions",
            hash,
            height,
            block.tx_count()
        );
        Ok(hash)
    }

    /// Rebuild the index from every stored block and persist it
    ///
    /// Returns the number of transactions left with unspent outputs.
    pub fn reindex(&self) -> LedgerResult<usize> {
        let mut index = self.index.write();
        let blocks = self
            .store
            .blocks_from_genesis()
            .collect::<Result<Vec<_>, _>>()?;

        let rebuilt = UtxoIndex::rebuild(&blocks)?;
        self.store.replace_chainstate(rebuilt.entries())?;

        if *index != rebuilt {
            warn!("Persisted UTXO index differed from the ledger; replaced");
        }
        *index = rebuilt;

        info!(
            "Reindexed {} blocks, {} transactions with unspent outputs",
            blocks.len(),
            index.count_transactions()
        );
        Ok(index.count_transactions())
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Find a transaction anywhere in the ledger
    pub fn find_transaction(&self, tx_id: &str) -> LedgerResult<Transaction> {
        let located = self
            .index
            .read()
            .get(tx_id)
            .and_then(|outputs| outputs.first())
            .and_then(|u| u.location);
        if let Some(location) = located {
            let tx = self.transaction_at(location.block, location.position)?;
            if tx.id == tx_id {
                return Ok(tx);
            }
        }

        for block in self.store.iter()? {
            if let Some(tx) = block?.transactions.into_iter().find(|tx| tx.id == tx_id) {
                return Ok(tx);
            }
        }
        Err(LedgerError::NotFound(format!("transaction {}", tx_id)))
    }

    /// Output `index` of transaction `tx_id`, spent or not
    pub fn find_output(&self, tx_id: &str, index: u32) -> LedgerResult<TxOutput> {
        let tx = self.find_transaction(tx_id)?;
        tx.outputs
            .get(index as usize)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("output {} of {}", index, tx_id)))
    }

    /// Block at `height` counted from genesis
    pub fn block_at(&self, height: u64) -> LedgerResult<Block> {
        self.store
            .block_at(height)?
            .ok_or_else(|| LedgerError::NotFound(format!("block at height {}", height)))
    }

    /// Transaction at `(block, position)`
    pub fn transaction_at(&self, block: u64, position: u32) -> LedgerResult<Transaction> {
        self.block_at(block)?
            .transactions
            .into_iter()
            .nth(position as usize)
            .ok_or_else(|| {
                LedgerError::NotFound(format!("transaction {} of block {}", position, block))
            })
    }

    /// Transactions referenced by the inputs of `tx`, keyed by id
    pub fn previous_transactions(&self, tx: &Transaction) -> LedgerResult<HashMap<String, Transaction>> {
        let mut prev_txs = HashMap::new();
        if tx.is_mint() {
            return Ok(prev_txs);
        }

        for input in &tx.inputs {
            if prev_txs.contains_key(&input.prev_tx_id) {
                continue;
            }
            let prev = self.find_transaction(&input.prev_tx_id).map_err(|e| match e {
                LedgerError::NotFound(what) => LedgerError::UnknownReference(what),
                other => other,
            })?;
            prev_txs.insert(prev.id.clone(), prev);
        }
        Ok(prev_txs)
    }

    /// All blocks, tip first
    pub fn blocks(&self) -> LedgerResult<Vec<Block>> {
        Ok(self.store.iter()?.collect::<Result<Vec<_>, _>>()?)
    }

    // =========================================================================
    // Index queries
    // =========================================================================

    pub fn find_spendable(&self, owner: &str, amount: u64) -> (u64, Vec<UnspentOutput>) {
        self.index.read().find_spendable(owner, amount)
    }

    pub fn balance(&self, owner: &str) -> u64 {
        self.index.read().balance(owner)
    }

    pub fn outputs_owned_by(&self, owner: &str) -> Vec<UnspentOutput> {
        self.index.read().outputs_owned_by(owner)
    }

    pub fn stats(&self) -> LedgerResult<ChainStats> {
        let mut total_blocks = 0u64;
        let mut total_transactions = 0u64;
        for block in self.store.iter()? {
            total_blocks += 1;
            total_transactions += block?.tx_count() as u64;
        }

        let index = self.index.read();
        Ok(ChainStats {
            height: self.store.height()?,
            total_blocks,
            total_transactions,
            utxo_transactions: index.count_transactions(),
            total_unspent: index
                .entries()
                .values()
                .flatten()
                .fold(0u64, |acc, u| acc.saturating_add(u.value())),
            tip: self.store.tip()?,
        })
    }
}
