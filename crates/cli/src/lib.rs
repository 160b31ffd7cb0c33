pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "mooai",
    about = "MooAI operator CLI",
    long_about = "Prepare and inspect the MooAI assistant: migrations, readiness checks, \
                  and continuation store maintenance.",
    after_help = "Examples:\n  mooai migrate\n  mooai doctor --json\n  mooai prune"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Validate config, Slack tokens, model settings, and DB readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Delete expired continuation records from the context store")]
    Prune,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Prune => commands::prune::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
