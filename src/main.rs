mod args;
mod commands;

use args::{Cli, Commands};
use clap::Parser;

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Diagnostics go to stderr; stdout carries command output only.
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Create { name, hwid } => {
            commands::create::cmd_create(name.as_deref(), hwid.as_deref())?
        }
        Commands::List { hwid } => commands::list::cmd_list(hwid.as_deref())?,
        Commands::Delete { target } => commands::delete::cmd_delete(&target)?,
    }

    Ok(())
}
