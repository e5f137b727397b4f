//! wsconf CLI
//!
//! Reads and writes layered workspace settings from the command line.

mod cli;
mod commands;
mod context;
mod error;
mod logging;

use clap::Parser;
use colored::Colorize;

use cli::{Cli, Commands};
use context::Context;
use error::{CliError, Result};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.verbose) {
        eprintln!("{}: cannot initialize logging: {}", "warning".yellow(), e);
    }
    tracing::debug!("Verbose mode enabled");

    let cwd = std::env::current_dir()?;
    let context = Context::open(&cwd, &cli.open).await?;
    execute_command(&context, cli.command).await
}

async fn execute_command(context: &Context, cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Get { key, scope } => commands::run_get(context, &key, &scope),
        Commands::Inspect { key, scope, json } => commands::run_inspect(context, &key, &scope, json),
        Commands::Keys { json } => commands::run_keys(context, json),
        Commands::Set {
            key,
            value,
            target,
            scope,
        } => commands::run_set(context, &key, &value, target, &scope).await,
        Commands::Unset { key, target, scope } => {
            commands::run_unset(context, &key, target, &scope).await
        }
        Commands::Folders { action } => commands::run_folders(context, action).await,
    }
}
