//! `dialer` - command-line companion for the rvoip softphone dialer
//!
//! Talks to the same credential service the dialer uses and runs the signal
//! quality rules offline, which is handy when diagnosing an operator who keeps
//! dropping off the network.

mod commands;
mod settings;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use rvoip_dialer_core::{parse_log_level, setup_logging, HttpCredentialProvider, LoggingConfig};
use std::path::PathBuf;

use commands::Output;

#[derive(Parser, Debug)]
#[command(name = "dialer", author, version, about = "rvoip softphone dialer tools", long_about = None)]
struct Cli {
    /// Credential service base URL; overrides the config file
    #[arg(long, global = true, env = "DIALER_SERVER")]
    server: Option<String>,

    /// Config file [default: <config dir>/rvoip/dialer.toml]
    #[arg(long, global = true, env = "DIALER_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log an operator in and fetch its first access token
    Login { name: String },

    /// Log an operator out
    Logout { name: String },

    /// Fetch a fresh access token
    Token {
        name: String,
        /// Print the whole token instead of a prefix
        #[arg(long)]
        show: bool,
    },

    /// Recent calls for an operator
    History {
        name: String,
        #[arg(short, long, default_value_t = 5)]
        limit: usize,
    },

    /// Operator availability and current call
    Status {
        name: String,
        /// Refresh every N seconds (0 = once)
        #[arg(short, long, default_value_t = 0)]
        refresh: u64,
    },

    /// Score network and call measurements with the dialer's quality rules
    Score(commands::score::ScoreArgs),

    /// Inspect or create the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the config file location
    Path,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let level = parse_log_level(&cli.log_level)?;
    setup_logging(LoggingConfig::new(level, "dialer-cli"))?;

    let config_path = cli.config.clone().unwrap_or_else(settings::default_config_path);
    let mut config = settings::load(&config_path)?;
    if let Some(server) = cli.server {
        config.service_url = server;
    }
    let out = Output::new(cli.json);

    match cli.command {
        Command::Login { name } => {
            let provider = HttpCredentialProvider::new(config.service_url.clone())?;
            commands::login::execute(&provider, &name, &out).await
        }
        Command::Logout { name } => {
            let provider = HttpCredentialProvider::new(config.service_url.clone())?;
            commands::login::logout(&provider, &name, &out).await
        }
        Command::Token { name, show } => {
            let provider = HttpCredentialProvider::new(config.service_url.clone())?;
            commands::token::execute(&provider, &name, show, &out).await
        }
        Command::History { name, limit } => {
            let provider = HttpCredentialProvider::new(config.service_url.clone())?;
            commands::history::execute(&provider, &name, limit, &out).await
        }
        Command::Status { name, refresh } => {
            let provider = HttpCredentialProvider::new(config.service_url.clone())?;
            commands::status::execute(&provider, &name, refresh, &out).await
        }
        Command::Score(args) => commands::score::execute(&args, &config, &out),
        Command::Config { action } => match action {
            ConfigAction::Show => commands::config::show(&config, &out),
            ConfigAction::Init { force } => commands::config::init(&config_path, force),
            ConfigAction::Path => {
                println!("{}", config_path.display());
                Ok(())
            }
        },
    }
}
