//! Main entry point for the bridge binary
//!
//! Wires the real services (docker CLI, relay HTTP client, websocket feed and
//! file-backed registry/storage) into the supervisor and the ingestion loop.

mod app;
mod cli;

use clap::Parser;

use cli::{Args, Command};
use shared::{logging, BridgeConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    logging::init_tracing(Some(&args.log_level));

    let config = args.apply(BridgeConfig::from_env()?);

    match args.command() {
        Command::Run => app::run(config).await,
        Command::Register { number, captcha } => app::register(config, &number, captcha.as_deref()).await,
        Command::Verify { number, code } => app::verify(config, &number, &code).await,
        Command::Account { number } => app::account(config, &number).await,
    }
}
