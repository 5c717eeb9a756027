pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "agentforge",
    about = "AgentForge operator CLI",
    long_about = "Apply migrations, inspect configuration, validate Blueprint files, and register built-in tools.",
    after_help = "Examples:\n  agentforge migrate\n  agentforge config\n  agentforge validate blueprint.json\n  agentforge discover"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate a Blueprint JSON file and report every violation")]
    Validate {
        #[arg(help = "Path to the Blueprint JSON document")]
        file: PathBuf,
    },
    #[command(about = "Register the built-in tools in the catalog")]
    Discover,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => commands::config::run(),
        Command::Validate { file } => commands::validate::run(&file),
        Command::Discover => commands::discover::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
