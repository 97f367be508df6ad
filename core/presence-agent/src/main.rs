//! presence-agent: stdin-driven host for presence tracking.
//!
//! ## Subcommands
//!
//! - `run`: starts the tracker and reads activity from stdin, one per line
//!   (`pointer`, `key`, `scroll`, `touch`, `nav <path>`, `stats`, `quit`)
//! - `config`: prints the resolved configuration as TOML

mod logging;
mod session;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "presence-agent")]
#[command(about = "Automatic presence tracking driven by user activity")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Track presence, reading activity lines from stdin
    Run {
        /// Config file (defaults to ~/.presence/config.toml)
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Directory for presence.json, audit.jsonl and logs/
        #[arg(long, value_name = "PATH")]
        state_dir: Option<PathBuf>,
    },

    /// Print the resolved, validated configuration
    Config {
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, state_dir } => {
            let state_dir = match state_dir.map_or_else(session::default_state_dir, Ok) {
                Ok(dir) => dir,
                Err(e) => {
                    eprintln!("presence-agent: {e}");
                    std::process::exit(1);
                }
            };
            let _logging_guard = logging::init(Some(&state_dir.join("logs")));

            let config = match presence_core::load_config(config) {
                Ok(config) => config,
                Err(e) => {
                    tracing::error!(error = %e, "presence-agent config failed");
                    std::process::exit(1);
                }
            };
            if let Err(e) = session::run(config, &state_dir) {
                tracing::error!(error = %e, "presence-agent run failed");
                std::process::exit(1);
            }
        }
        Commands::Config { config } => {
            let _logging_guard = logging::init(None);
            let rendered = presence_core::load_config(config)
                .map_err(String::from)
                .and_then(|config| {
                    toml::to_string_pretty(&config).map_err(|err| err.to_string())
                });
            match rendered {
                Ok(text) => print!("{text}"),
                Err(e) => {
                    tracing::error!(error = %e, "presence-agent config failed");
                    std::process::exit(1);
                }
            }
        }
    }
}
