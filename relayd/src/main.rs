use clap::{value_parser, Arg, Command};
use relay_core::{logging, DifficultyMode, RelayConfig};
use std::path::PathBuf;
use tracing::{error, info};

pub mod daemon;

use daemon::RelayDaemon;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = Command::new("relayd")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Minimal Stratum relay server")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .value_parser(value_parser!(PathBuf))
                .default_value("relayd.toml"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("Miner listener port")
                .value_parser(value_parser!(u16)),
        )
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .value_name("MODE")
                .help("Difficulty mode (low, normal, medium, high, aggressive, aggressive_pool)"),
        )
        .get_matches();

    let config_path = matches.get_one::<PathBuf>("config");
    let mut config = RelayConfig::load_with_env(config_path.map(PathBuf::as_path))?;

    // Command line wins over file and environment
    if let Some(port) = matches.get_one::<u16>("port") {
        config.network.port = *port;
    }
    if let Some(mode) = matches.get_one::<String>("mode") {
        config.difficulty.initial_mode = mode.parse::<DifficultyMode>()?;
    }

    config.validate()?;

    logging::init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Starting relayd in {} mode (difficulty {})",
        config.difficulty.initial_mode, config.difficulty.initial_difficulty
    );

    let mut daemon = RelayDaemon::new(config);

    if let Err(e) = daemon.start().await {
        error!("Failed to start relay: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = daemon.run_until_shutdown().await {
        error!("Relay error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
