//! Process configuration module
//!
//! Handles loading the process-level settings (bind address, run mode, asset
//! roots, cookie secrets) from environment variables. The storefront's own
//! settings documents live in the `settings` module.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

const DEV_COOKIE_SECRET: &str = "5TOCyfH3HuszKGzFZntk";
const DEV_SESSION_SECRET: &str = "pAgGxo8Hzg7PFlv1HpO8Eg0Y6xtP7zYx";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },
}

/// Execution mode of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RunMode {
    #[default]
    Development,
    Production,
    Test,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Development => "development",
            RunMode::Production => "production",
            RunMode::Test => "test",
        }
    }

    /// Whether error pages may carry full diagnostic detail
    pub fn is_development(&self) -> bool {
        matches!(self, RunMode::Development)
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(RunMode::Development),
            "production" | "prod" => Ok(RunMode::Production),
            "test" => Ok(RunMode::Test),
            other => Err(other.to_string()),
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: Ipv4Addr,
    pub port: u16,
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::new(0, 0, 0, 0),
            port: 8080,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Filesystem locations the service reads from
#[derive(Debug, Clone)]
pub struct PathsConfig {
    /// Directory holding settings.json and the gateway documents
    pub config_dir: PathBuf,
    pub public_dir: PathBuf,
    pub themes_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from("config"),
            public_dir: PathBuf::from("public"),
            themes_dir: PathBuf::from("views").join("themes"),
        }
    }
}

/// Secrets used to sign cookies
#[derive(Debug, Clone)]
pub struct SecretsConfig {
    pub cookie_secret: String,
    pub session_secret: String,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            cookie_secret: DEV_COOKIE_SECRET.to_string(),
            session_secret: DEV_SESSION_SECRET.to_string(),
        }
    }
}

/// Complete process configuration
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub run_mode: RunMode,
    pub server: ServerConfig,
    pub paths: PathsConfig,
    pub secrets: SecretsConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (ignore errors if file not found)
        let _ = dotenvy::dotenv();

        let run_mode = match std::env::var("RUN_MODE") {
            Ok(value) => value.parse().map_err(|value| ConfigError::InvalidValue {
                var: "RUN_MODE",
                value,
            })?,
            Err(_) => RunMode::default(),
        };

        let defaults = ServerConfig::default();
        let server = ServerConfig {
            host: parse_var("HOST")?.unwrap_or(defaults.host),
            port: parse_var("PORT")?.unwrap_or(defaults.port),
            request_timeout: parse_var::<u64>("REQUEST_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
        };

        let defaults = PathsConfig::default();
        let paths = PathsConfig {
            config_dir: path_var("CONFIG_DIR").unwrap_or(defaults.config_dir),
            public_dir: path_var("PUBLIC_DIR").unwrap_or(defaults.public_dir),
            themes_dir: path_var("THEMES_DIR").unwrap_or(defaults.themes_dir),
        };

        let secrets = SecretsConfig {
            cookie_secret: secret_var("COOKIE_SECRET", DEV_COOKIE_SECRET, run_mode),
            session_secret: secret_var("SESSION_SECRET", DEV_SESSION_SECRET, run_mode),
        };

        Ok(Self {
            run_mode,
            server,
            paths,
            secrets,
        })
    }
}

fn parse_var<T: FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { var, value }),
        Err(_) => Ok(None),
    }
}

fn path_var(var: &str) -> Option<PathBuf> {
    std::env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn secret_var(var: &str, fallback: &str, run_mode: RunMode) -> String {
    std::env::var(var).unwrap_or_else(|_| {
        if run_mode == RunMode::Production {
            warn!("⚠️  {} not set, using default (INSECURE - set in production!)", var);
        }
        fallback.to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_server_config() {
        let config = ServerConfig::default();
        assert_eq!(config.host, Ipv4Addr::new(0, 0, 0, 0));
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_default_paths() {
        let paths = PathsConfig::default();
        assert_eq!(paths.config_dir, PathBuf::from("config"));
        assert_eq!(paths.themes_dir, PathBuf::from("views/themes"));
    }

    #[test]
    fn test_run_mode_parsing() {
        assert_eq!("test".parse::<RunMode>(), Ok(RunMode::Test));
        assert_eq!("Production".parse::<RunMode>(), Ok(RunMode::Production));
        assert_eq!(" dev ".parse::<RunMode>(), Ok(RunMode::Development));
        assert!("staging".parse::<RunMode>().is_err());
    }

    #[test]
    fn test_only_development_is_verbose() {
        assert!(RunMode::Development.is_development());
        assert!(!RunMode::Production.is_development());
        assert!(!RunMode::Test.is_development());
    }
}
