//! Sled-backed ledger store
//!
//! Three trees:
//! - `blocks`: hex block hash → encoded block, plus the reserved keys `l`
//!   (tip hash) and `n` (tip height)
//! - `heights`: big-endian height → block hash
//! - `chainstate`: hex transaction id → encoded unspent outputs
//!
//! A block, the tip pointer and the block's index changes are written in one
//! multi-tree transaction, so no reader ever sees a tip without its block or
//! a block without its chainstate.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError as SledTransactionError};
use sled::{Batch, Db, Transactional, Tree};
use thiserror::Error;

use crate::core::block::Block;
use crate::core::transaction::UnspentOutput;
use crate::storage::utxo_index::UtxoDelta;

// =============================================================================
// Tree names and reserved keys
// =============================================================================

const TREE_BLOCKS: &str = "blocks";
const TREE_HEIGHTS: &str = "heights";
const TREE_CHAINSTATE: &str = "chainstate";

const TIP_KEY: &[u8] = b"l";
const HEIGHT_KEY: &[u8] = b"n";

/// Leading byte of every stored value
pub const CODEC_VERSION: u8 = 1;

// =============================================================================
// Errors
// =============================================================================

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Codec error: {0}")]
    Codec(#[from] bincode::Error),
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
    #[error("Unsupported codec version {0}")]
    UnsupportedVersion(u8),
    #[error("Block links to {found:?} but the tip is {expected:?}")]
    BrokenLink { expected: String, found: String },
    #[error("Corrupted store: {0}")]
    Corrupted(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

// =============================================================================
// Configuration
// =============================================================================

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub db_name: String,
    /// Throw-away database, removed when the store is dropped
    pub temporary: bool,
    /// Flush to disk after every committed block
    pub flush_on_commit: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".zone_ledger_data"),
            db_name: "chain.db".to_string(),
            temporary: false,
            flush_on_commit: true,
        }
    }
}

impl StorageConfig {
    pub fn temporary() -> Self {
        Self {
            temporary: true,
            flush_on_commit: false,
            ..Self::default()
        }
    }

    pub fn with_data_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.data_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.db_name)
    }

    /// Load from a JSON file; missing fields take their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

// =============================================================================
// Codec
// =============================================================================

fn encode<T: Serialize>(value: &T) -> StorageResult<Vec<u8>> {
    let mut out = vec![CODEC_VERSION];
    out.extend(bincode::serialize(value)?);
    Ok(out)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StorageResult<T> {
    match bytes.split_first() {
        Some((&CODEC_VERSION, body)) => Ok(bincode::deserialize(body)?),
        Some((version, _)) => Err(StorageError::UnsupportedVersion(*version)),
        None => Err(StorageError::Corrupted("empty value".to_string())),
    }
}

fn decode_height(bytes: &[u8]) -> StorageResult<u64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StorageError::Corrupted("tip height is not 8 bytes".to_string()))?;
    Ok(u64::from_be_bytes(raw))
}

fn decode_hash(bytes: &[u8]) -> StorageResult<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| StorageError::Corrupted("block hash is not utf-8".to_string()))
}

// =============================================================================
// Ledger Store
// =============================================================================

/// Append-only block store with a tip pointer and the persisted UTXO entries
pub struct LedgerStore {
    db: Db,
    blocks: Tree,
    heights: Tree,
    chainstate: Tree,
    flush_on_commit: bool,
}

impl std::fmt::Debug for LedgerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerStore")
            .field("blocks", &self.blocks.len())
            .field("chainstate", &self.chainstate.len())
            .finish_non_exhaustive()
    }
}

impl LedgerStore {
    /// Open or create the store described by `config`
    pub fn open(config: &StorageConfig) -> StorageResult<Self> {
        let db = if config.temporary {
            sled::Config::new().temporary(true).open()?
        } else {
            fs::create_dir_all(&config.data_dir)?;
            info!("Opening ledger store at {}", config.db_path().display());
            sled::Config::new().path(config.db_path()).open()?
        };

        Ok(Self {
            blocks: db.open_tree(TREE_BLOCKS)?,
            heights: db.open_tree(TREE_HEIGHTS)?,
            chainstate: db.open_tree(TREE_CHAINSTATE)?,
            db,
            flush_on_commit: config.flush_on_commit,
        })
    }

    /// Open a temporary store
    pub fn open_temporary() -> StorageResult<Self> {
        Self::open(&StorageConfig::temporary())
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> StorageResult<()> {
        self.db.flush()?;
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Hash of the latest block, `None` before genesis
    pub fn tip(&self) -> StorageResult<Option<String>> {
        self.blocks
            .get(TIP_KEY)?
            .map(|v| decode_hash(&v))
            .transpose()
    }

    /// Height of the latest block, `None` before genesis
    pub fn height(&self) -> StorageResult<Option<u64>> {
        self.blocks
            .get(HEIGHT_KEY)?
            .map(|v| decode_height(&v))
            .transpose()
    }

    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.tip()?.is_none())
    }

    pub fn get(&self, hash: &str) -> StorageResult<Option<Block>> {
        if hash.as_bytes() == TIP_KEY || hash.as_bytes() == HEIGHT_KEY {
            return Ok(None);
        }
        self.blocks
            .get(hash.as_bytes())?
            .map(|v| decode(&v))
            .transpose()
    }

    /// Hash of the block at `height` (0 = genesis)
    pub fn hash_at(&self, height: u64) -> StorageResult<Option<String>> {
        self.heights
            .get(height.to_be_bytes())?
            .map(|v| decode_hash(&v))
            .transpose()
    }

    pub fn block_at(&self, height: u64) -> StorageResult<Option<Block>> {
        match self.hash_at(height)? {
            Some(hash) => self.get(&hash),
            None => Ok(None),
        }
    }

    /// Blocks from the tip back to genesis
    pub fn iter(&self) -> StorageResult<BlockIterator<'_>> {
        Ok(BlockIterator {
            store: self,
            current: self.tip()?,
        })
    }

    /// Blocks from genesis up to the tip
    pub fn blocks_from_genesis(&self) -> impl Iterator<Item = StorageResult<Block>> + '_ {
        self.heights.iter().map(move |entry| {
            let (height, hash) = entry?;
            let hash = decode_hash(&hash)?;
            self.get(&hash)?.ok_or_else(|| {
                StorageError::Corrupted(format!(
                    "height {:?} points at missing block {}",
                    height.as_ref(),
                    hash
                ))
            })
        })
    }

    /// Persisted UTXO entries
    pub fn load_chainstate(&self) -> StorageResult<BTreeMap<String, Vec<UnspentOutput>>> {
        let mut entries = BTreeMap::new();
        for entry in self.chainstate.iter() {
            let (key, value) = entry?;
            entries.insert(decode_hash(&key)?, decode(&value)?);
        }
        Ok(entries)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Append a block on top of the tip; returns its hash
    pub fn append(&self, block: &Block) -> StorageResult<String> {
        self.append_with_delta(block, &UtxoDelta::default())
            .map(|(hash, _)| hash)
    }

    /// Append a block and the index changes it causes in one transaction
    ///
    /// The block must link to the current tip (or be a genesis block on an
    /// empty store). Returns the block hash and its height.
    pub fn append_with_delta(&self, block: &Block, delta: &UtxoDelta) -> StorageResult<(String, u64)> {
        let hash = block.hash();
        let encoded = encode(block)?;
        let changes = delta
            .changes
            .iter()
            .map(|(tx_id, change)| -> StorageResult<(Vec<u8>, Option<Vec<u8>>)> {
                let value = change.as_ref().map(encode).transpose()?;
                Ok((tx_id.as_bytes().to_vec(), value))
            })
            .collect::<StorageResult<Vec<_>>>()?;

        let result = (&self.blocks, &self.heights, &self.chainstate).transaction(
            |(blocks, heights, chainstate)| {
                let expected = match blocks.get(TIP_KEY)? {
                    Some(tip) => decode_hash(&tip).map_err(ConflictableTransactionError::Abort)?,
                    None => String::new(),
                };
                if block.header.previous_block_hash != expected {
                    return Err(ConflictableTransactionError::Abort(StorageError::BrokenLink {
                        expected,
                        found: block.header.previous_block_hash.clone(),
                    }));
                }

                let height = match blocks.get(HEIGHT_KEY)? {
                    Some(raw) if !expected.is_empty() => {
                        decode_height(&raw).map_err(ConflictableTransactionError::Abort)? + 1
                    }
                    _ => 0,
                };

                blocks.insert(hash.as_bytes(), encoded.as_slice())?;
                blocks.insert(TIP_KEY, hash.as_bytes())?;
                blocks.insert(HEIGHT_KEY, height.to_be_bytes().to_vec())?;
                heights.insert(height.to_be_bytes().to_vec(), hash.as_bytes())?;

                for (key, value) in &changes {
                    match value {
                        Some(value) => {
                            chainstate.insert(key.as_slice(), value.as_slice())?;
                        }
                        None => {
                            chainstate.remove(key.as_slice())?;
                        }
                    }
                }

                Ok(height)
            },
        );

        let height = result.map_err(|e| match e {
            SledTransactionError::Abort(e) => e,
            SledTransactionError::Storage(e) => StorageError::Database(e),
        })?;

        if self.flush_on_commit {
            self.flush()?;
        }

        debug!(
            "Stored block {} at height {} ({} chainstate changes)",
            hash,
            height,
            changes.len()
        );
        Ok((hash, height))
    }

    /// Replace every persisted UTXO entry in one batch
    pub fn replace_chainstate(&self, entries: &BTreeMap<String, Vec<UnspentOutput>>) -> StorageResult<()> {
        let mut batch = Batch::default();
        for key in self.chainstate.iter().keys() {
            batch.remove(key?);
        }
        for (tx_id, outputs) in entries {
            batch.insert(tx_id.as_bytes(), encode(outputs)?);
        }
        self.chainstate.apply_batch(batch)?;

        if self.flush_on_commit {
            self.flush()?;
        }
        Ok(())
    }
}

// =============================================================================
// Iterator
// =============================================================================

/// Lazy walk from the tip to genesis
pub struct BlockIterator<'a> {
    store: &'a LedgerStore,
    current: Option<String>,
}

impl Iterator for BlockIterator<'_> {
    type Item = StorageResult<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        let hash = self.current.take()?;
        match self.store.get(&hash) {
            Ok(Some(block)) => {
                if !block.is_genesis() {
                    self.current = Some(block.header.previous_block_hash.clone());
                }
                Some(Ok(block))
            }
            Ok(None) => Some(Err(StorageError::Corrupted(format!("block {} is missing", hash)))),
            Err(e) => Some(Err(e)),
        }
    }
}
