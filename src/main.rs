//! Zone Ledger CLI Application
//!
//! A command-line interface for inspecting and maintaining the ledger.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use zone_ledger::cli::{self, AppState};

#[derive(Parser)]
#[command(name = "zone-ledger")]
#[command(author = "Darshan")]
#[command(version = "0.1.0")]
#[command(about = "UTXO ledger of the transfer zone", long_about = None)]
struct Cli {
    /// Data directory for ledger storage
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// JSON storage configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new ledger
    Init,

    /// Display ledger information
    Chain {
        #[command(subcommand)]
        action: Option<ChainCommands>,
    },

    /// Show the balance of an address
    Balance {
        /// Address to query
        #[arg(short, long)]
        address: String,
    },

    /// Validate every stored block
    Validate,

    /// Rebuild the UTXO index from the blocks
    Reindex,
}

#[derive(Subcommand)]
enum ChainCommands {
    /// Show detailed info
    Info,

    /// List recent blocks
    Blocks {
        /// Number of blocks to show
        #[arg(short, long, default_value = "10")]
        count: u32,
    },

    /// Show a transaction by id or by coordinate
    Tx {
        /// Transaction id
        id: Option<String>,

        /// Block height from genesis
        #[arg(short, long, requires = "position")]
        block: Option<u64>,

        /// Position inside the block
        #[arg(short, long, requires = "block")]
        position: Option<u32>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = cli::load_config(cli.config.as_deref(), cli.data_dir.as_ref())?;

    // Handle init command separately (opens its own ledger)
    if let Commands::Init = cli.command {
        return cli::cmd_init(&config);
    }

    let state = AppState::new(config)?;

    match cli.command {
        Commands::Init => unreachable!(),
        Commands::Chain { action } => match action.unwrap_or(ChainCommands::Info) {
            ChainCommands::Info => cli::cmd_chain_info(&state)?,
            ChainCommands::Blocks { count } => cli::cmd_chain_blocks(&state, count)?,
            ChainCommands::Tx {
                id,
                block,
                position,
            } => {
                let at = block.zip(position);
                cli::cmd_chain_tx(&state, id.as_deref(), at)?
            }
        },
        Commands::Balance { address } => cli::cmd_balance(&state, &address)?,
        Commands::Validate => cli::cmd_validate(&state)?,
        Commands::Reindex => cli::cmd_reindex(&state)?,
    }

    Ok(())
}
