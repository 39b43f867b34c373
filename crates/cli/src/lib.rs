pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use crate::commands::export::ExportKind;

#[derive(Debug, Parser)]
#[command(
    name = "claimdesk",
    about = "Claimdesk operator CLI",
    long_about = "Operate the claimdesk database: migrations, demo data, config inspection, readiness checks, and CSV exports.",
    after_help = "Examples:\n  claimdesk migrate\n  claimdesk doctor --json\n  claimdesk export claims --output claims.csv"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo directory, rooms and workflow stages, then verify them")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, DB connectivity and the stored workflow stages")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Export every claim or booking as CSV")]
    Export {
        #[arg(value_enum)]
        kind: ExportKind,
        #[arg(long, help = "Write the CSV to this file instead of stdout")]
        output: Option<PathBuf>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Export { kind, output } => commands::export::run(kind, output.as_deref()),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
