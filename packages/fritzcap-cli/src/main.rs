//! Fritzcap CLI - acquire FRITZ!Box web sessions from the command line
//!
//! This binary negotiates a short-lived session id (sid) with the web
//! interface of an AVM FRITZ!Box-style device by solving its
//! challenge-response login, for use in scripts that drive the device's
//! web interface.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use fritzcap_core::device;
use fritzcap_core::session::{SessionError, SessionNegotiator};

/// Environment variable consulted when --password is not given
const ENV_PASSWORD: &str = "FRITZCAP_PASSWORD";

#[derive(Parser)]
#[command(name = "fritzcap")]
#[command(version)]
#[command(about = "Acquire web sessions from AVM FRITZ!Box devices")]
#[command(long_about = "
Fritzcap negotiates a short-lived session id (sid) with the web interface
of an AVM FRITZ!Box by solving the challenge-response login protocol.

Quick start:
  1. Log in:         fritzcap login --username admin --password secret
  2. Show settings:  fritzcap config

The device address can be set with --box-url, the FRITZCAP_BOX_URL
environment variable or a config file (see 'fritzcap config'). The
password can also be supplied via FRITZCAP_PASSWORD.
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Log in to the device and print the session id
    Login {
        /// Device base URL (e.g. http://fritz.box)
        #[arg(short, long)]
        box_url: Option<String>,

        /// Login username
        #[arg(short, long)]
        username: Option<String>,

        /// Login password (falls back to FRITZCAP_PASSWORD)
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Show configuration paths and settings
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("fritzcap={},fritzcap_core={}", log_level, log_level).into()
            }),
        )
        .with_target(false)
        .init();

    match &cli.command {
        Commands::Login {
            box_url,
            username,
            password,
        } => {
            cmd_login(
                &cli,
                box_url.clone(),
                username.clone(),
                password.clone(),
            )
            .await
        }
        Commands::Config => cmd_config(&cli).await,
    }
}

async fn cmd_login(
    cli: &Cli,
    box_url: Option<String>,
    username: Option<String>,
    password: Option<String>,
) -> Result<()> {
    let config = device::load_device_config();

    let box_url = box_url.unwrap_or(config.box_url);
    let username = username
        .or(config.username)
        .context("No username given. Pass --username or set it in the config file.")?;
    let password = match password {
        Some(password) => password,
        None => std::env::var(ENV_PASSWORD)
            .context("No password given. Pass --password or set FRITZCAP_PASSWORD.")?,
    };

    tracing::debug!("Logging in to {} as '{}'", box_url, username);

    let negotiator = SessionNegotiator::new(&box_url);
    match negotiator.acquire_session(&username, &password).await {
        Ok(sid) => {
            match cli.format {
                OutputFormat::Text => {
                    println!("Session id: {}", sid);
                }
                OutputFormat::Json => {
                    println!(
                        "{}",
                        serde_json::json!({
                            "status": "logged_in",
                            "box_url": box_url,
                            "username": username,
                            "sid": sid,
                        })
                    );
                }
            }
            Ok(())
        }
        Err(SessionError::AuthenticationRejected) => {
            if let OutputFormat::Json = cli.format {
                println!(
                    "{}",
                    serde_json::json!({
                        "status": "rejected",
                        "box_url": box_url,
                        "username": username,
                    })
                );
            }
            Err(anyhow::anyhow!(
                "Login rejected by {}: wrong username or password",
                box_url
            ))
        }
        Err(e) => Err(anyhow::Error::from(e).context(format!("Failed to log in to {}", box_url))),
    }
}

async fn cmd_config(cli: &Cli) -> Result<()> {
    let config = device::load_device_config();
    let config_path = device::config::get_config_file_path_string();

    match cli.format {
        OutputFormat::Text => {
            println!("Configuration");
            println!("=============");
            println!();
            println!("Config file:  {}", config_path);
            println!("Box URL:      {} (from {})", config.box_url, config.source);
            println!("Username:     {}", config.username.as_deref().unwrap_or("-"));
            println!();
            println!("Environment variables:");
            println!("  FRITZCAP_BOX_URL  - Override device base URL");
            println!("  FRITZCAP_PASSWORD - Login password for 'fritzcap login'");
            println!();
            println!("Example config.toml:");
            println!();
            println!("{}", device::config::generate_example_config());
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "config_file": config_path,
                    "box_url": config.box_url,
                    "box_url_source": format!("{}", config.source),
                    "username": config.username,
                })
            );
        }
    }

    Ok(())
}
