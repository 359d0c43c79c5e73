mod auth;
mod cli;
mod error;
mod ingest;
mod models;
mod organizations;
mod pipeline;
mod providers;
mod store;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    info!("Starting DevPulse - developer activity insights");
    cli.execute().await?;

    Ok(())
}
