//! habit-engagement: streaks, reminders, badges and history from the command line
//!
//! Data lives in YAML files under the data directory; installed notification
//! schedules are kept next to them in `schedules.yaml`.

use std::path::PathBuf;

use clap::Parser;
use log::{debug, error};
use shared::UserId;
use tracing_subscriber::EnvFilter;

use habit_engagement::backend::config::EngagementConfig;
use habit_engagement::backend::io::{execute_command, Command};
use habit_engagement::backend::open_local_backend;

#[derive(Parser)]
#[command(name = "habit-engagement")]
#[command(about = "Streaks, reminders and badges for a personal health tracker")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "HABIT_ENGAGEMENT_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory (overrides config file)
    #[arg(short, long, env = "HABIT_ENGAGEMENT_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// User to act as (overrides default_user)
    #[arg(short, long, env = "HABIT_ENGAGEMENT_USER")]
    user: Option<String>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => EngagementConfig::default_path()?,
    };
    let mut config = EngagementConfig::load(&config_path)?;

    // Apply CLI overrides
    if let Some(data_dir) = cli.data_dir {
        config.data_directory = Some(data_dir);
    }
    if let Some(user) = cli.user {
        config.default_user = Some(user);
    }

    let level = match cli.verbose {
        0 => config.log_level.clone(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&level))?)
        .with_writer(std::io::stderr)
        .init();
    debug!("Config file: {}", config_path.display());

    let user = config.default_user.clone().map(UserId::new);
    let backend = open_local_backend(&config, user)?;

    let result = execute_command(&backend, &config, cli.command).await;
    backend.app.shutdown();

    match result {
        Ok(output) => {
            println!("{}", output);
            Ok(())
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
