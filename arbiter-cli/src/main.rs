//! Arbiter command-line entry point.

mod replay;
mod run;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "arbiter", about = "Adaptive trading decision engine", version)]
struct Cli {
    /// Configuration environment (selects config/{env}.toml).
    #[arg(long, global = true)]
    env: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the engine against a candle stream on stdin (JSON lines).
    Run,
    /// Drive the engine with a deterministic synthetic candle walk.
    Replay {
        /// Number of candles to synthesize per symbol.
        #[arg(long, default_value_t = 240)]
        candles: usize,
    },
    /// Train a candidate model from the persisted corpus of one symbol.
    Train { symbol: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,arbiter=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = arbiter_config::load_config(cli.env.as_deref())?;

    match cli.command {
        Command::Run => run::run(config).await,
        Command::Replay { candles } => replay::replay(config, candles).await,
        Command::Train { symbol } => run::train(&config, &symbol),
    }
}
