//! CLI commands for the ledger
//!
//! Implements the operator command handlers.

use crate::core::Ledger;
use crate::crypto::is_hex_digest;
use crate::storage::StorageConfig;
use chrono::DateTime;
use std::path::{Path, PathBuf};

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Storage configuration from an optional JSON file, then the command line
pub fn load_config(config_file: Option<&Path>, data_dir: Option<&PathBuf>) -> CliResult<StorageConfig> {
    let config = match config_file {
        Some(path) => StorageConfig::from_json_file(path)?,
        None => StorageConfig::default(),
    };
    Ok(match data_dir {
        Some(dir) => config.with_data_dir(dir),
        None => config,
    })
}

/// Application state
pub struct AppState {
    pub ledger: Ledger,
    pub config: StorageConfig,
}

impl AppState {
    /// Open the ledger described by `config`
    pub fn new(config: StorageConfig) -> CliResult<Self> {
        let ledger = Ledger::open(&config)?;
        if ledger.height()?.is_none() {
            println!("⚠️  Ledger at {:?} is empty. Run `zone-ledger init` first.", config.db_path());
        }
        Ok(Self { ledger, config })
    }
}

/// Initialize a new ledger with its genesis block
pub fn cmd_init(config: &StorageConfig) -> CliResult<()> {
    let ledger = Ledger::open(config)?;

    if let Some(tip) = ledger.tip()? {
        println!("⚠️  Ledger already exists at {:?}", config.db_path());
        println!("   Tip: {}", tip);
        return Ok(());
    }

    let genesis = ledger.commit_transactions(vec![])?;

    println!("✅ Ledger initialized!");
    println!("   📁 Database: {:?}", config.db_path());
    println!("   🧱 Genesis block hash: {}", genesis.hash());

    Ok(())
}

/// Display ledger info
pub fn cmd_chain_info(state: &AppState) -> CliResult<()> {
    let stats = state.ledger.stats()?;

    println!("⛓️  Ledger Info");
    match stats.height {
        Some(height) => println!("   ├─ Height: {}", height),
        None => println!("   ├─ Height: - (empty)"),
    }
    println!("   ├─ Total blocks: {}", stats.total_blocks);
    println!("   ├─ Total transactions: {}", stats.total_transactions);
    println!("   ├─ Transactions with unspent outputs: {}", stats.utxo_transactions);
    println!("   ├─ Unspent value: {}", stats.total_unspent);
    println!("   └─ Tip: {}", stats.tip.as_deref().unwrap_or("-"));

    Ok(())
}

/// List recent blocks
pub fn cmd_chain_blocks(state: &AppState, count: u32) -> CliResult<()> {
    let Some(height) = state.ledger.height()? else {
        println!("📭 Ledger is empty");
        return Ok(());
    };
    let start = height.saturating_sub(u64::from(count).saturating_sub(1));

    println!("🧱 Recent blocks:");
    for h in (start..=height).rev() {
        let block = state.ledger.block_at(h)?;
        let time = DateTime::from_timestamp(block.header.timestamp, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| block.header.timestamp.to_string());
        println!(
            "   #{} | {} | {} tx | {}",
            h,
            &block.hash()[..16],
            block.tx_count(),
            time
        );
    }

    Ok(())
}

/// Show one transaction, by id or by coordinate
pub fn cmd_chain_tx(state: &AppState, id: Option<&str>, at: Option<(u64, u32)>) -> CliResult<()> {
    let tx = match (id, at) {
        (Some(id), _) if !is_hex_digest(id) => {
            return Err(format!("{} is not a transaction id", id).into())
        }
        (Some(id), _) => state.ledger.find_transaction(id)?,
        (None, Some((block, position))) => state.ledger.transaction_at(block, position)?,
        (None, None) => return Err("give a transaction id or --block and --position".into()),
    };

    println!("📄 Transaction {}", tx.id);
    println!("   ├─ Account: {}", tx.account);
    println!("   ├─ Kind: {:?}", tx.kind);
    for input in &tx.inputs {
        if input.is_mint_placeholder() {
            println!("   ├─ In: mint from {}", input.source_address);
        } else {
            println!(
                "   ├─ In: {}:{} ({})",
                &input.prev_tx_id[..16.min(input.prev_tx_id.len())],
                input.prev_output_index,
                input.source_address
            );
        }
    }
    for (i, output) in tx.outputs.iter().enumerate() {
        let marker = if output.used { " [light-compute]" } else { "" };
        println!("   ├─ Out {}: {} → {}{}", i, output.value, output.owner, marker);
    }
    println!("   └─ Total out: {}", tx.total_output()?);

    Ok(())
}

/// Get address balance
pub fn cmd_balance(state: &AppState, address: &str) -> CliResult<()> {
    let utxos = state.ledger.outputs_owned_by(address);

    println!("💰 Balance for {}", address);
    println!("   Total: {}", state.ledger.balance(address));
    println!("   UTXOs: {}", utxos.len());

    if !utxos.is_empty() {
        println!("\n   Transaction outputs:");
        for utxo in utxos.iter().take(10) {
            println!("   └─ {}:{} = {}", &utxo.tx_id[..8], utxo.index, utxo.value());
        }
        if utxos.len() > 10 {
            println!("   ... and {} more", utxos.len() - 10);
        }
    }

    Ok(())
}

/// Validate every stored block
pub fn cmd_validate(state: &AppState) -> CliResult<()> {
    println!("🔍 Validating ledger...");

    let mut checked = 0u64;
    for block in state.ledger.store().blocks_from_genesis() {
        let block = block?;
        if let Err(e) = block.validate() {
            println!("❌ Block {} at height {} is invalid: {}", block.hash(), checked, e);
            return Ok(());
        }
        checked += 1;
    }

    println!("✅ Ledger is valid!");
    println!("   {} blocks verified", checked);

    Ok(())
}

/// Rebuild the UTXO index from the blocks
pub fn cmd_reindex(state: &AppState) -> CliResult<()> {
    println!("🔄 Rebuilding UTXO index...");
    let count = state.ledger.reindex()?;
    println!("✅ Index rebuilt: {} transactions with unspent outputs", count);
    Ok(())
}
