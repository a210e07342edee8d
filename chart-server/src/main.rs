//! Standalone chart repository server binary.

use anyhow::Result;
use chart_server::{cli::Cli, generate_index, logging, run_server};
use clap::Parser;
use std::io::Write;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.resolve_config()?;
    logging::init_subscriber(&config.logging)?;

    if config.repository.gen_index {
        let index = generate_index(config).await?;
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(&index)?;
        stdout.flush()?;
        return Ok(());
    }

    run_server(config).await
}
