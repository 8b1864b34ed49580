//! Chalak - remote drive receiver daemon
//!
//! Connects out to the command source, applies every steering/throttle frame
//! it sends to the PCA9685 outputs, and reconnects forever when the link
//! drops. SIGINT/SIGTERM stop the loop and return the outputs to neutral.

use chalak::config::Config;
use chalak::devices::create_actuator;
use chalak::error::{Error, Result};
use chalak::motion::RangeMapper;
use chalak::shutdown::Shutdown;
use chalak::streaming::{Backoff, CommandLoop, ConnectionManager, TcpConnector};
use std::env;
use std::path::Path;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "/etc/chalak.toml";

/// Log level used until the config is loaded
const DEFAULT_LOG_LEVEL: &str = "info";

/// Command line options
///
/// Supports:
/// - `chalak <path>` (positional)
/// - `chalak --config <path>` / `chalak -c <path>`
/// - `--host <host>` and `--port <port>` to override the command source
#[derive(Debug, Default)]
struct CliArgs {
    config_path: Option<String>,
    host: Option<String>,
    port: Option<String>,
}

fn parse_args(args: &[String]) -> CliArgs {
    let mut cli = CliArgs::default();
    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1).cloned();
        match args[i].as_str() {
            "--config" | "-c" if value.is_some() => {
                cli.config_path = value;
                i += 2;
            }
            "--host" if value.is_some() => {
                cli.host = value;
                i += 2;
            }
            "--port" if value.is_some() => {
                cli.port = value;
                i += 2;
            }
            arg => {
                if cli.config_path.is_none() && !arg.starts_with('-') {
                    cli.config_path = Some(arg.to_string());
                }
                i += 1;
            }
        }
    }
    cli
}

/// Load the config file, falling back to defaults if it does not exist.
///
/// Returns the config and whether defaults were used.
fn load_config(path: &str) -> Result<(Config, bool)> {
    if Path::new(path).exists() {
        Ok((Config::load(path)?, false))
    } else {
        Ok((Config::default(), true))
    }
}

fn apply_overrides(config: &mut Config, cli: &CliArgs) -> Result<()> {
    if let Some(host) = &cli.host {
        config.connection.host = host.clone();
    }
    if let Some(port) = &cli.port {
        config.connection.port = port
            .parse()
            .map_err(|_| Error::Config(format!("Invalid port: {}", port)))?;
    }
    config.validate()
}

/// Load the config and apply command line overrides.
///
/// Returns the config and whether built-in defaults were used.
fn prepare_config(path: &str, cli: &CliArgs) -> Result<(Config, bool)> {
    let (mut config, defaulted) = load_config(path)?;
    apply_overrides(&mut config, cli)?;
    Ok((config, defaulted))
}

/// Initialize env_logger; `RUST_LOG` takes precedence over `level`
fn init_logging(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let cli = parse_args(&args);
    let config_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let (config, defaulted) = match prepare_config(&config_path, &cli) {
        Ok(loaded) => loaded,
        Err(e) => {
            init_logging(DEFAULT_LOG_LEVEL);
            log::error!("Failed to load config {}: {}", config_path, e);
            return Err(e);
        }
    };
    init_logging(&config.logging.level);

    log::info!("Chalak v{} starting...", env!("CARGO_PKG_VERSION"));
    if defaulted {
        log::warn!("Config {} not found, using built-in defaults", config_path);
    } else {
        log::info!("Using config: {}", config_path);
    }
    log::info!(
        "Command source: {} (driver: {}, steering policy: {:?})",
        config.address(),
        config.actuator.driver,
        config.mapping.steering_policy
    );
    if !config.mapping.steering_policy.is_range_safe() {
        log::warn!("Steering policy drives outside 0..180 degrees; servo output will be clamped");
    }

    // Hardware failure here is fatal: never enter the loop without actuators
    let sink = create_actuator(&config.actuator).inspect_err(|e| {
        log::error!("Actuator setup failed: {}", e);
    })?;

    let shutdown = Shutdown::new();
    shutdown.install_signal_handler()?;

    let connection = ConnectionManager::new(
        TcpConnector::new(&config.connection),
        Backoff::from_config(&config.backoff),
        shutdown.clone(),
    )
    .with_idle_timeout(config.connection.idle_timeout());

    let mut command_loop = CommandLoop::new(
        connection,
        sink,
        RangeMapper::new(config.mapping.steering_policy),
        shutdown,
    )
    .with_neutral_on_disconnect(config.failsafe.neutral_on_disconnect)
    .with_stats_interval(Duration::from_secs(config.logging.stats_interval_secs));

    log::info!("Chalak running. Press Ctrl-C to stop.");
    let stats = command_loop.run();

    log::info!("Shutting down... ({})", stats);
    drop(command_loop);
    log::info!("Chalak stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("chalak")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_positional_and_flags() {
        let cli = parse_args(&args(&["my.toml", "--host", "10.0.0.2", "--port", "7000"]));
        assert_eq!(cli.config_path.as_deref(), Some("my.toml"));
        assert_eq!(cli.host.as_deref(), Some("10.0.0.2"));
        assert_eq!(cli.port.as_deref(), Some("7000"));

        let cli = parse_args(&args(&["-c", "/tmp/x.toml"]));
        assert_eq!(cli.config_path.as_deref(), Some("/tmp/x.toml"));

        let cli = parse_args(&args(&[]));
        assert!(cli.config_path.is_none());
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        let cli = CliArgs {
            host: Some("localhost".to_string()),
            port: Some("7000".to_string()),
            ..CliArgs::default()
        };
        apply_overrides(&mut config, &cli).unwrap();
        assert_eq!(config.address(), "localhost:7000");

        let bad = CliArgs {
            port: Some("seventy".to_string()),
            ..CliArgs::default()
        };
        assert!(apply_overrides(&mut config, &bad).is_err());
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chalak.toml");
        std::fs::write(&path, "[connection]\nport = 0\n").unwrap();
        let path = path.to_str().unwrap();

        let err = prepare_config(path, &CliArgs::default()).err().unwrap();
        assert!(matches!(err, Error::Config(_)));

        // A valid override does not rescue an unparsable file
        std::fs::write(path, "[connection\n").unwrap();
        let cli = CliArgs {
            port: Some("7000".to_string()),
            ..CliArgs::default()
        };
        assert!(prepare_config(path, &cli).is_err());
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let (config, defaulted) = load_config("/nonexistent/chalak.toml").unwrap();
        assert!(defaulted);
        assert_eq!(config.connection.port, 60606);
    }
}
