//! Main application entry point for the Playgrid session server
//!
//! Provides the CLI interface, TOML configuration loading and server
//! startup with graceful shutdown on SIGINT/SIGTERM.

use clap::{Arg, Command};
use game_server::{GameServer, ServerConfig, DEFAULT_OUTBOX_CAPACITY};
use playgrid_engine::{DEFAULT_INGRESS_CAPACITY, DEFAULT_SUBSCRIPTION_CAPACITY};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// ============================================================================
// Configuration
// ============================================================================

/// Application configuration loaded from TOML file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerSettings,
    /// Plugin configuration
    pub plugins: PluginSettings,
    /// Logging configuration
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Bind address
    pub bind_address: String,
    /// Directory of JSON entity definitions
    pub entity_directory: String,
    /// Shared action ingress queue depth
    pub ingress_capacity: usize,
    /// Per-subscription queue depth
    pub subscription_capacity: usize,
    /// Per-session outbound queue depth
    pub outbox_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginSettings {
    /// Extension module directory
    pub directory: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter
    pub level: String,
    /// JSON formatting
    pub json_format: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                bind_address: "0.0.0.0:8080".to_string(),
                entity_directory: "entities".to_string(),
                ingress_capacity: DEFAULT_INGRESS_CAPACITY,
                subscription_capacity: DEFAULT_SUBSCRIPTION_CAPACITY,
                outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
            },
            plugins: PluginSettings {
                directory: "plugins".to_string(),
            },
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from file, creating a default one if missing
    pub async fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Convert to the server's ServerConfig
    pub fn to_server_config(&self) -> Result<ServerConfig, Box<dyn std::error::Error>> {
        Ok(ServerConfig {
            bind_address: self.server.bind_address.parse()?,
            entity_directory: PathBuf::from(&self.server.entity_directory),
            plugin_directory: PathBuf::from(&self.plugins.directory),
            ingress_capacity: self.server.ingress_capacity,
            subscription_capacity: self.server.subscription_capacity,
            outbox_capacity: self.server.outbox_capacity,
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        if self
            .server
            .bind_address
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            return Err(format!(
                "Invalid bind address: {}",
                self.server.bind_address
            ));
        }

        if self.server.entity_directory.is_empty() {
            return Err("Entity directory cannot be empty".to_string());
        }
        if self.plugins.directory.is_empty() {
            return Err("Plugin directory cannot be empty".to_string());
        }

        if self.server.ingress_capacity == 0 {
            return Err("Ingress capacity must be at least 1".to_string());
        }
        if self.server.subscription_capacity == 0 {
            return Err("Subscription capacity must be at least 1".to_string());
        }
        if self.server.outbox_capacity == 0 {
            return Err("Outbox capacity must be at least 1".to_string());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level, valid_levels
            ));
        }

        Ok(())
    }
}

// ============================================================================
// CLI Interface
// ============================================================================

/// Command line arguments
#[derive(Debug, Clone)]
pub struct CliArgs {
    pub config_path: PathBuf,
    pub entity_dir: Option<PathBuf>,
    pub plugin_dir: Option<PathBuf>,
    pub bind_address: Option<String>,
    pub log_level: Option<String>,
    pub json_logs: bool,
}

impl CliArgs {
    /// Parse command line arguments
    pub fn parse() -> Self {
        let matches = Command::new("Playgrid Session Server")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Websocket session server with a dynamic extension-module runtime")
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path")
                    .default_value("config.toml"),
            )
            .arg(
                Arg::new("entities")
                    .short('e')
                    .long("entities")
                    .value_name("DIR")
                    .help("Entity definition directory"),
            )
            .arg(
                Arg::new("plugins")
                    .short('p')
                    .long("plugins")
                    .value_name("DIR")
                    .help("Extension module directory"),
            )
            .arg(
                Arg::new("bind")
                    .short('b')
                    .long("bind")
                    .value_name("ADDRESS")
                    .help("Bind address (e.g., 127.0.0.1:8080)"),
            )
            .arg(
                Arg::new("log-level")
                    .short('l')
                    .long("log-level")
                    .value_name("LEVEL")
                    .help("Log level (trace, debug, info, warn, error)"),
            )
            .arg(
                Arg::new("json-logs")
                    .long("json-logs")
                    .help("Output logs in JSON format")
                    .action(clap::ArgAction::SetTrue),
            )
            .get_matches();

        Self {
            config_path: PathBuf::from(
                matches
                    .get_one::<String>("config")
                    .expect("Default config path should always be set"),
            ),
            entity_dir: matches.get_one::<String>("entities").map(PathBuf::from),
            plugin_dir: matches.get_one::<String>("plugins").map(PathBuf::from),
            bind_address: matches.get_one::<String>("bind").cloned(),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
        }
    }
}

// ============================================================================
// Logging Setup
// ============================================================================

/// Initialize logging system
fn setup_logging(config: &LoggingSettings) -> Result<(), Box<dyn std::error::Error>> {
    let log_level = config.level.as_str();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if config.json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_file(false)
                    .with_line_number(false),
            )
            .init();
    }

    info!("Logging initialized with level: {}", log_level);
    Ok(())
}

// ============================================================================
// Signal Handling
// ============================================================================

/// Block until a shutdown signal arrives
async fn wait_for_shutdown_signal() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
        }
    }

    #[cfg(windows)]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}

// ============================================================================
// Application
// ============================================================================

/// Main application struct
pub struct Application {
    config: AppConfig,
    server: GameServer,
}

impl Application {
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        // Load configuration first (before logging setup)
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        // Apply CLI overrides
        if let Some(entity_dir) = args.entity_dir {
            config.server.entity_directory = entity_dir.to_string_lossy().to_string();
        }

        if let Some(plugin_dir) = args.plugin_dir {
            config.plugins.directory = plugin_dir.to_string_lossy().to_string();
        }

        if let Some(bind_address) = args.bind_address {
            config.server.bind_address = bind_address;
        }

        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }

        if args.json_logs {
            config.logging.json_format = true;
        }

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {}", e).into());
        }

        setup_logging(&config.logging)?;

        let server_config = config.to_server_config()?;
        let server = GameServer::new(server_config);

        info!(
            "Playgrid Session Server v{}",
            option_env!("CARGO_PKG_VERSION").unwrap_or("UNK")
        );
        info!(
            "Config: {} | Entities: {} | Plugins: {}",
            args.config_path.display(),
            config.server.entity_directory,
            config.plugins.directory
        );

        Ok(Self { config, server })
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Configuration summary:");
        info!("  Bind address: {}", self.config.server.bind_address);
        info!("  Entity directory: {}", self.config.server.entity_directory);
        info!("  Plugin directory: {}", self.config.plugins.directory);
        info!(
            "  Queues: ingress {} | subscription {} | outbox {}",
            self.config.server.ingress_capacity,
            self.config.server.subscription_capacity,
            self.config.server.outbox_capacity
        );

        let shutdown = self.server.shutdown_handle();
        let server_handle = {
            let server = self.server;
            tokio::spawn(async move {
                match server.start().await {
                    Ok(()) => {
                        info!("Server stopped");
                    }
                    Err(e) => {
                        error!("Server error: {:?}", e);
                        std::process::exit(1);
                    }
                }
            })
        };

        info!(
            "Ready to accept connections on {}",
            self.config.server.bind_address
        );
        info!("Press Ctrl+C to shut down");

        wait_for_shutdown_signal().await?;

        info!("Shutdown signal received, stopping server...");
        let _ = shutdown.send(());

        // Give the accept loop a moment to wind down before exiting.
        let _ = tokio::time::timeout(tokio::time::Duration::from_secs(3), server_handle).await;

        info!("Playgrid shutdown complete");
        Ok(())
    }
}

// ============================================================================
// Entry Point
// ============================================================================

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("Failed to start application: {:?}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());

        let server_config = config
            .to_server_config()
            .expect("Default config should convert to ServerConfig");
        assert_eq!(server_config.entity_directory, PathBuf::from("entities"));
        assert_eq!(server_config.plugin_directory, PathBuf::from("plugins"));
        assert_eq!(server_config.outbox_capacity, DEFAULT_OUTBOX_CAPACITY);
    }

    #[tokio::test]
    async fn test_config_validation() {
        let mut config = AppConfig::default();

        config.server.bind_address = "invalid".to_string();
        assert!(config.validate().is_err());

        config.server.bind_address = "127.0.0.1:8080".to_string();
        config.server.ingress_capacity = 0;
        assert!(config.validate().is_err());

        config.server.ingress_capacity = 64;
        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        // First load creates the default file.
        let created = AppConfig::load_from_file(&path).await.unwrap();
        assert!(path.exists());

        // Second load reads it back.
        let loaded = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(loaded.server.bind_address, created.server.bind_address);
        assert_eq!(loaded.plugins.directory, created.plugins.directory);
    }

    #[tokio::test]
    async fn test_cli_overrides_apply() {
        let dir = tempfile::tempdir().unwrap();
        let args = CliArgs {
            config_path: dir.path().join("config.toml"),
            entity_dir: Some(PathBuf::from("custom_entities")),
            plugin_dir: Some(PathBuf::from("custom_plugins")),
            bind_address: Some("127.0.0.1:9000".to_string()),
            log_level: None,
            json_logs: false,
        };

        let mut config = AppConfig::load_from_file(&args.config_path).await.unwrap();
        if let Some(entity_dir) = args.entity_dir {
            config.server.entity_directory = entity_dir.to_string_lossy().to_string();
        }
        if let Some(plugin_dir) = args.plugin_dir {
            config.plugins.directory = plugin_dir.to_string_lossy().to_string();
        }
        if let Some(bind_address) = args.bind_address {
            config.server.bind_address = bind_address;
        }

        assert!(config.validate().is_ok());
        let server_config = config.to_server_config().unwrap();
        assert_eq!(
            server_config.entity_directory,
            PathBuf::from("custom_entities")
        );
        assert_eq!(
            server_config.plugin_directory,
            PathBuf::from("custom_plugins")
        );
        assert_eq!(server_config.bind_address.port(), 9000);
    }
}
