use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for Greenlight
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GreenlightConfig {
    /// Review checkpoint settings
    pub review: ReviewConfig,
    /// Timeout watchdog settings
    pub watchdog: WatchdogConfig,
    /// Observability settings
    pub observability: ObservabilityConfig,
    /// Database settings (optional)
    pub database: Option<DatabaseConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReviewConfig {
    /// Deadline for a review when the checkpoint does not name one
    pub default_timeout_seconds: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WatchdogConfig {
    /// Whether the watchdog task runs at all
    pub enabled: bool,
    /// Seconds between scans for overdue reviews
    pub interval_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level
    pub log_level: String,
    /// Emit JSON-formatted log lines
    pub json_logs: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL (SQLite file path or connection string)
    pub url: String,
    /// Enable automatic migrations
    pub auto_migrate: bool,
}

impl Default for GreenlightConfig {
    fn default() -> Self {
        Self {
            review: ReviewConfig {
                default_timeout_seconds: 1800, // 30 minutes
            },
            watchdog: WatchdogConfig {
                enabled: true,
                interval_seconds: 5,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                json_logs: false,
            },
            database: None,
        }
    }
}

impl GreenlightConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration file (greenlight.toml)
    /// 3. Environment variables (prefixed with GREENLIGHT__)
    pub fn load() -> Result<Self> {
        let defaults = Config::try_from(&GreenlightConfig::default())?;
        let mut builder = Config::builder().add_source(defaults);

        if Path::new("greenlight.toml").exists() {
            builder = builder.add_source(File::with_name("greenlight"));
        }

        builder = builder.add_source(
            Environment::with_prefix("GREENLIGHT")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<GreenlightConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        let _ = GreenlightConfig::load_env_file();
        GreenlightConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static GreenlightConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

/// Initialize configuration (called at startup)
pub fn init_config() -> Result<()> {
    let _config = config()?;
    tracing::info!("Configuration loaded successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = GreenlightConfig::default();
        assert_eq!(config.review.default_timeout_seconds, 1800);
        assert!(config.watchdog.enabled);
        assert!(config.database.is_none());
    }

    #[test]
    fn round_trips_through_toml() {
        let config = GreenlightConfig::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let restored: GreenlightConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(
            restored.watchdog.interval_seconds,
            config.watchdog.interval_seconds
        );
    }
}
