pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use scenebot_core::config::{AppConfig, LoadOptions, LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

use crate::commands::simulate::SimulateArgs;

#[derive(Debug, Parser)]
#[command(
    name = "scenebot",
    about = "Scenebot operator CLI",
    long_about = "Validate scenario graphs, simulate conversations, apply migrations and inspect configuration.",
    after_help = "Examples:\n  scenebot validate --path config/scenario_transitions.yaml\n  scenebot simulate --segment warm --score 7 /start survey:start\n  scenebot doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Load the scenario graph and print a structured summary")]
    Validate {
        #[arg(long, help = "Scenario graph to check instead of the configured one")]
        path: Option<PathBuf>,
    },
    #[command(about = "Run inputs through the engine with in-memory stores and a canned model")]
    Simulate {
        #[arg(long, default_value_t = 1)]
        user_id: i64,
        #[arg(long, help = "Lead segment: cold|warm|hot")]
        segment: Option<String>,
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        score: i32,
        #[arg(long, help = "Funnel stage, e.g. new|welcomed|surveyed|engaged")]
        stage: Option<String>,
        #[arg(long, help = "Scenario graph to use instead of the configured one")]
        path: Option<PathBuf>,
        #[arg(
            required = true,
            help = "`/command`, a button payload, or `text:<message>` for free text"
        )]
        inputs: Vec<String>,
    },
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Check configuration, scenario graph and database readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let logging = AppConfig::load(LoadOptions::default())
        .map(|config| config.logging)
        .unwrap_or_else(|_| AppConfig::default().logging);
    init_logging(&logging);

    let result = match cli.command {
        Command::Validate { path } => commands::validate::run(path.as_deref()),
        Command::Simulate { user_id, segment, score, stage, path, inputs } => {
            commands::simulate::run(SimulateArgs { user_id, segment, score, stage, path, inputs })
        }
        Command::Migrate => commands::migrate::run(),
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

/// Logs go to stderr so command output on stdout stays machine-readable.
/// `RUST_LOG` overrides the configured level.
pub fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(filter);

    let _ = match logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
