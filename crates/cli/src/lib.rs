pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "readmit",
    about = "Readmission-risk prediction CLI",
    long_about = "Run the slot-filling chat, score one-shot records or batch uploads, and inspect runtime configuration.",
    after_help = "Examples:\n  readmit chat\n  readmit predict --input patient.json\n  readmit batch --input rows.json\n  readmit doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Start an interactive slot-filling prediction session on stdin/stdout")]
    Chat,
    #[command(about = "Predict readmission risk for one complete JSON record")]
    Predict {
        #[arg(long, help = "Path to a JSON object of field values (defaults to stdin)")]
        input: Option<PathBuf>,
    },
    #[command(about = "Score a JSON array of rows and print the table with prediction columns")]
    Batch {
        #[arg(long, help = "Path to a JSON array of row objects (defaults to stdin)")]
        input: Option<PathBuf>,
    },
    #[command(about = "Inspect effective configuration values with source attribution and redaction")]
    Config,
    #[command(about = "Validate config, schema integrity, and prediction-service readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Chat => commands::chat::run(),
        Command::Predict { input } => commands::predict::run(input.as_deref()),
        Command::Batch { input } => commands::batch::run(input.as_deref()),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
