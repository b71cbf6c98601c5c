//! WTM CLI - Command line tool for monitoring water tank levels.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "wtm-cli",
    version,
    about = "Water tank level monitor"
)]
struct Cli {
    /// Settings document holding the settings and the water tanks
    #[arg(long, global = true, default_value = "./data/water_tank.json")]
    data: PathBuf,

    #[command(subcommand)]
    command: wtm_cmd::Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    wtm_cmd::run(cli.command, &cli.data).await
}
