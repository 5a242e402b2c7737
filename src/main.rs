use anyhow::Result;
use clap::{Parser, Subcommand};

use simq::cli::cancel::CancelCommand;
use simq::cli::config::ConfigCommand;
use simq::cli::status::StatusCommand;
use simq::cli::submit::SubmitCommand;

#[derive(Parser)]
#[command(name = "simq")]
#[command(about = "Submit, monitor and cancel simulation jobs on remote hosts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Submit(SubmitCommand),
    Status(StatusCommand),
    Cancel(CancelCommand),
    Config(ConfigCommand),
}

fn main() -> Result<()> {
    // Initialize logging with INFO level by default
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Submit(cmd) => cmd.execute(),
        Commands::Status(cmd) => cmd.execute(),
        Commands::Cancel(cmd) => cmd.execute(),
        Commands::Config(cmd) => cmd.execute(),
    }
}
