//! Armada cluster registry CLI
//!
//! Lists, registers and removes the clusters Armada may deploy to.

use clap::Parser;

use armada_cli::{Cli, Result};
use armada_common::telemetry::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format)?;
    cli.run().await
}
