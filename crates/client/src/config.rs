//! Client configuration management
//!
//! The TOML file holds user-facing units (minutes, seconds). It converts into
//! a [`SessionConfig`] of durations, which is what the session runs on.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default pigpio daemon port
pub const DEFAULT_PORT: u16 = 8888;

/// Default delay between connection attempts
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(5);

/// Upper bound for `timeout` and `keepalive` (one year)
pub const MAX_TIMEOUT_MINUTES: u64 = 365 * 24 * 60;

/// Upper bound for `retry_backoff_secs` (one hour)
pub const MAX_RETRY_BACKOFF_SECS: u64 = 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub connection: ConnectionSettings,
    pub client: ClientSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    /// Write requests without waiting for earlier responses
    #[serde(default)]
    pub pipelining: bool,
    /// Connection retry timeout in minutes (0 = fail on first error)
    #[serde(default)]
    pub timeout: u64,
    /// Seconds between connection attempts while retrying
    #[serde(default = "default_backoff_secs")]
    pub retry_backoff_secs: u64,
    /// Notification idle timeout in minutes (0 = off); defaults to `timeout`
    #[serde(default)]
    pub keepalive: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSettings {
    pub log_level: String,
}

fn default_backoff_secs() -> u64 {
    DEFAULT_RETRY_BACKOFF.as_secs()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionSettings {
                host: "localhost".to_string(),
                port: DEFAULT_PORT,
                pipelining: false,
                timeout: 0,
                retry_backoff_secs: default_backoff_secs(),
                keepalive: None,
            },
            client: ClientSettings {
                log_level: "info".to_string(),
            },
        }
    }
}

impl ClientConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            PathBuf::from(shellexpand::tilde(&p.to_string_lossy()).as_ref())
        } else {
            // Try standard locations in order
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/pigpio-client/client.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: ClientConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        tracing::debug!(
            "Config: {}:{} pipelining={} timeout={}min",
            config.connection.host,
            config.connection.port,
            config.connection.pipelining,
            config.connection.timeout
        );
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                // Print to stderr since logging might not be initialized yet
                eprintln!("Config: {}", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("pigpio-client").join("client.toml")
        } else {
            PathBuf::from(".config/pigpio-client/client.toml")
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.client.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.client.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.connection.host.trim().is_empty() {
            return Err(anyhow!("Empty host in [connection]"));
        }
        if self.connection.port == 0 {
            return Err(anyhow!("Port must be non-zero"));
        }
        let conn = &self.connection;
        if conn.timeout > MAX_TIMEOUT_MINUTES {
            return Err(anyhow!(
                "timeout {} exceeds {} minutes",
                conn.timeout,
                MAX_TIMEOUT_MINUTES
            ));
        }
        if let Some(keepalive) = conn.keepalive
            && keepalive > MAX_TIMEOUT_MINUTES
        {
            return Err(anyhow!(
                "keepalive {} exceeds {} minutes",
                keepalive,
                MAX_TIMEOUT_MINUTES
            ));
        }
        if conn.retry_backoff_secs > MAX_RETRY_BACKOFF_SECS {
            return Err(anyhow!(
                "retry_backoff_secs {} exceeds {}",
                conn.retry_backoff_secs,
                MAX_RETRY_BACKOFF_SECS
            ));
        }
        if self.connection.timeout > 0 && self.connection.retry_backoff_secs == 0 {
            return Err(anyhow!("retry_backoff_secs must be non-zero when timeout is set"));
        }

        Ok(())
    }

    /// Runtime session settings
    ///
    /// Values past the validated bounds saturate rather than wrap.
    pub fn session_config(&self) -> SessionConfig {
        let conn = &self.connection;
        let minutes = |m: u64| {
            m.checked_mul(60)
                .map(Duration::from_secs)
                .unwrap_or(Duration::MAX)
        };
        SessionConfig {
            host: conn.host.clone(),
            port: conn.port,
            pipelining: conn.pipelining,
            retry_timeout: minutes(conn.timeout),
            retry_backoff: Duration::from_secs(conn.retry_backoff_secs),
            keepalive: minutes(conn.keepalive.unwrap_or(conn.timeout)),
        }
    }
}

/// Settings a session runs with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub pipelining: bool,
    /// Overall connect retry window; zero disables retrying
    pub retry_timeout: Duration,
    /// Delay before the next connect attempt
    pub retry_backoff: Duration,
    /// Notification socket idle timeout; zero disables it
    pub keepalive: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        ClientConfig::default().session_config()
    }
}

impl SessionConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn with_pipelining(mut self, pipelining: bool) -> Self {
        self.pipelining = pipelining;
        self
    }

    pub fn with_retry(mut self, timeout: Duration, backoff: Duration) -> Self {
        self.retry_timeout = timeout;
        self.retry_backoff = backoff;
        self
    }

    pub fn with_keepalive(mut self, keepalive: Duration) -> Self {
        self.keepalive = keepalive;
        self
    }

    /// `host:port` for log lines and errors
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.client.log_level, "info");
        assert_eq!(config.connection.host, "localhost");
        assert_eq!(config.connection.port, 8888);
        assert!(!config.connection.pipelining);
        assert_eq!(config.connection.timeout, 0);
    }

    #[test]
    fn test_config_serialization() {
        let config = ClientConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: ClientConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.client.log_level, parsed.client.log_level);
        assert_eq!(config.connection.port, parsed.connection.port);
    }

    #[test]
    fn test_minimal_file_uses_defaults() {
        let parsed: ClientConfig = toml::from_str(
            r#"
            [connection]
            host = "pi.local"
            port = 8888

            [client]
            log_level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.connection.retry_backoff_secs, 5);
        assert_eq!(parsed.connection.keepalive, None);
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = ClientConfig::default();
        assert!(config.validate().is_ok());

        config.client.log_level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.client.log_level = "trace".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_connection() {
        let mut config = ClientConfig::default();
        config.connection.port = 0;
        assert!(config.validate().is_err());

        let mut config = ClientConfig::default();
        config.connection.host = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = ClientConfig::default();
        config.connection.timeout = 1;
        config.connection.retry_backoff_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_session_config_units() {
        let mut config = ClientConfig::default();
        config.connection.timeout = 2;
        config.connection.retry_backoff_secs = 3;

        let session = config.session_config();
        assert_eq!(session.retry_timeout, Duration::from_secs(120));
        assert_eq!(session.retry_backoff, Duration::from_secs(3));
        // keepalive follows timeout unless set
        assert_eq!(session.keepalive, Duration::from_secs(120));

        config.connection.keepalive = Some(0);
        assert_eq!(config.session_config().keepalive, Duration::ZERO);
    }

    #[test]
    fn test_session_config_builder() {
        let session = SessionConfig::new("10.0.0.2", 9000)
            .with_pipelining(true)
            .with_keepalive(Duration::from_millis(200));
        assert_eq!(session.address(), "10.0.0.2:9000");
        assert!(session.pipelining);
        assert_eq!(session.retry_timeout, Duration::ZERO);
        assert_eq!(session.retry_backoff, DEFAULT_RETRY_BACKOFF);
    }

    #[test]
    fn test_validate_duration_bounds() {
        let mut config = ClientConfig::default();
        config.connection.timeout = u64::MAX / 60;
        assert!(config.validate().is_err());

        let mut config = ClientConfig::default();
        config.connection.keepalive = Some(MAX_TIMEOUT_MINUTES + 1);
        assert!(config.validate().is_err());

        let mut config = ClientConfig::default();
        config.connection.timeout = 1;
        config.connection.retry_backoff_secs = u64::MAX;
        assert!(config.validate().is_err());

        let mut config = ClientConfig::default();
        config.connection.timeout = MAX_TIMEOUT_MINUTES;
        config.connection.retry_backoff_secs = MAX_RETRY_BACKOFF_SECS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_session_config_saturates() {
        let mut config = ClientConfig::default();
        config.connection.timeout = u64::MAX;
        let session = config.session_config();
        assert_eq!(session.retry_timeout, Duration::MAX);
        assert_eq!(session.keepalive, Duration::MAX);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("client.toml");

        let mut config = ClientConfig::default();
        config.connection.host = "raspberrypi".to_string();
        config.connection.pipelining = true;
        config.save(&path).unwrap();

        let loaded = ClientConfig::load(Some(path)).unwrap();
        assert_eq!(loaded.connection.host, "raspberrypi");
        assert!(loaded.connection.pipelining);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("client.toml");
        fs::write(&path, "[connection]\nhost = \"x\"\nport = 0\n[client]\nlog_level = \"info\"\n")
            .unwrap();
        assert!(ClientConfig::load(Some(path)).is_err());
    }
}
