mod commands;
mod config;

use clap::{Parser, Subcommand};
use config::CliConfig;
use std::path::PathBuf;
use tictac_core::Storage;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "tictactoe")]
#[command(about = "Tic-tac-toe staked on a Bitcoin contract output")]
#[command(version)]
struct Cli {
    /// Data directory for game storage
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a game for a deployed contract output
    Create {
        /// Alice's public key (hex)
        alice: String,
        /// Bob's public key (hex)
        bob: String,
        /// Deployed contract output as txid:vout
        deploy: String,
        /// Locked stake in satoshis
        stake: u64,
        /// Network (bitcoin, testnet, signet, regtest)
        #[arg(short, long)]
        network: Option<String>,
        /// Contract code (hex)
        #[arg(long)]
        contract_code: Option<String>,
    },
    /// Start a game
    Start {
        /// Game ID
        game_id: String,
    },
    /// Build the transaction for a move
    Move {
        /// Game ID
        game_id: String,
        /// Cell index 0-8
        cell: usize,
        /// Fee funding coin as txid:vout:sats (repeatable)
        #[arg(short, long, required = true)]
        funding: Vec<String>,
        /// Address receiving the change
        #[arg(short, long)]
        change: String,
    },
    /// Record the txid of the pending move once it is accepted
    Confirm {
        /// Game ID
        game_id: String,
        /// Transaction ID
        txid: String,
    },
    /// Show game status
    Status {
        /// Game ID
        game_id: String,
    },
    /// Show confirmed moves, optionally the board at a given step
    History {
        /// Game ID
        game_id: String,
        /// Step to display
        #[arg(short, long)]
        step: Option<usize>,
    },
    /// List games
    List,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Get data directory
    let data_dir = cli
        .data_dir
        .unwrap_or_else(|| CliConfig::default().data_dir);
    tokio::fs::create_dir_all(&data_dir).await?;

    let config = CliConfig::load(&data_dir).await?;

    // Initialize logging
    let log_level = if cli.verbose || config.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!(
            "tictactoe={},tictac_game={},tictac_core={}",
            log_level, log_level, log_level
        )))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let storage = Storage::new(&data_dir.join("games.db")).await?;

    // Execute command
    let result = match cli.command {
        Commands::Create {
            alice,
            bob,
            deploy,
            stake,
            network,
            contract_code,
        } => {
            let game_config = config.game_config(network.as_deref(), contract_code)?;
            commands::create_game(&storage, &alice, &bob, &deploy, stake, game_config).await
        }
        Commands::Start { game_id } => commands::start_game(&storage, &game_id).await,
        Commands::Move {
            game_id,
            cell,
            funding,
            change,
        } => commands::prepare_move(&storage, &game_id, cell, &funding, &change).await,
        Commands::Confirm { game_id, txid } => {
            commands::confirm_move(&storage, &game_id, &txid).await
        }
        Commands::Status { game_id } => commands::show_status(&storage, &game_id).await,
        Commands::History { game_id, step } => {
            commands::show_history(&storage, &game_id, step).await
        }
        Commands::List => commands::list_games(&storage).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
