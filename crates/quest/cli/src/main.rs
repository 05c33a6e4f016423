//! questctl - command-line interface for the Quest Ledger
//!
//! Lets group members:
//! - create and join groups
//! - maintain the task and shop catalogs
//! - complete tasks, buy items and fulfil purchases
//! - inspect balances and history, undo events, adjust balances

use clap::{Parser, Subcommand};
use quest_types::UserId;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod error;
mod output;

use commands::{group, ledger, purchase, shop, task, Session};
use config::QuestConfig;

/// Quest Ledger CLI application
#[derive(Parser)]
#[command(name = "questctl")]
#[command(about = "Quest Ledger - habit rewards, shop and balances", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "QUEST_CONFIG")]
    config: Option<String>,

    /// Acting user id
    #[arg(short, long, env = "QUEST_USER")]
    user: Option<i64>,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table")]
    output: output::OutputFormat,

    /// Log filter, overrides the configured level
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON logs
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Create, join and inspect groups
    Group {
        #[command(subcommand)]
        command: group::GroupCommands,
    },

    /// Manage and complete tasks
    Task {
        #[command(subcommand)]
        command: task::TaskCommands,
    },

    /// Manage and buy shop items
    Shop {
        #[command(subcommand)]
        command: shop::ShopCommands,
    },

    /// Inspect and fulfil purchases
    Purchase {
        #[command(subcommand)]
        command: purchase::PurchaseCommands,
    },

    /// Balances, history, undo and adjustments
    Ledger {
        #[command(subcommand)]
        command: ledger::LedgerCommands,
    },

    /// Show effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = QuestConfig::load(cli.config.as_deref())?;

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    if cli.json_logs || config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    if let Commands::Config = cli.command {
        output::print_single(&config)?;
        return Ok(());
    }

    let session = Session::open(&config, cli.user.map(UserId), cli.output).await?;

    let result = match cli.command {
        Commands::Group { command } => group::execute(command, &session).await,
        Commands::Task { command } => task::execute(command, &session).await,
        Commands::Shop { command } => shop::execute(command, &session).await,
        Commands::Purchase { command } => purchase::execute(command, &session).await,
        Commands::Ledger { command } => ledger::execute(command, &session).await,
        Commands::Config => Ok(()),
    };

    if let Err(err) = result {
        output::print_error(&err.to_string());
        std::process::exit(1);
    }
    Ok(())
}
