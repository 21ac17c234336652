use std::path::Path;
use std::time::Duration;
use serde::Deserialize;
use anyhow::{bail, Context, Result};
use shared::protocol::{DEFAULT_HEALTH_PATH, DEFAULT_SERVICE_PORT};

/// Upper bound for every TTL, interval and timeout: one year
pub const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Take the registering client's address from X-Forwarded-For / X-Real-IP
    #[serde(default)]
    pub trust_forwarded_headers: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,
    #[serde(default = "default_reap_interval")]
    pub reap_interval_secs: u64,
    #[serde(default = "default_port")]
    pub default_port: u16,
    #[serde(default = "default_health_path")]
    pub default_health_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_probe_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_probe_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_probe_timeout")]
    pub read_timeout_secs: u64,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_ttl() -> u64 {
    60
}

fn default_reap_interval() -> u64 {
    10
}

fn default_port() -> u16 {
    DEFAULT_SERVICE_PORT
}

fn default_health_path() -> String {
    DEFAULT_HEALTH_PATH.to_string()
}

fn default_probe_interval() -> u64 {
    10
}

fn default_probe_timeout() -> u64 {
    5
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            trust_forwarded_headers: false,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl(),
            reap_interval_secs: default_reap_interval(),
            default_port: default_port(),
            default_health_path: default_health_path(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_probe_interval(),
            connect_timeout_secs: default_probe_timeout(),
            read_timeout_secs: default_probe_timeout(),
        }
    }
}

impl RegistryConfig {
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.ttl_secs.min(MAX_DURATION_SECS) as i64)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }
}

impl ProbeConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Whole-request budget: connect plus read
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.saturating_add(self.read_timeout_secs))
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let registry = &self.registry;
        if registry.ttl_secs < 5 {
            bail!("registry.ttl_secs too small: {}", registry.ttl_secs);
        }
        if registry.ttl_secs > MAX_DURATION_SECS {
            bail!("registry.ttl_secs too large: {} (max {})", registry.ttl_secs, MAX_DURATION_SECS);
        }
        if registry.reap_interval_secs == 0 || registry.reap_interval_secs >= registry.ttl_secs {
            bail!(
                "registry.reap_interval_secs must be non-zero and shorter than ttl_secs ({}): {}",
                registry.ttl_secs,
                registry.reap_interval_secs
            );
        }
        if registry.default_port == 0 {
            bail!("registry.default_port must be non-zero");
        }
        if !registry.default_health_path.starts_with('/') {
            bail!(
                "registry.default_health_path must start with '/': {}",
                registry.default_health_path
            );
        }

        let probe = &self.probe;
        if probe.interval_secs == 0 || probe.interval_secs > MAX_DURATION_SECS {
            bail!(
                "probe.interval_secs must be between 1 and {}: {}",
                MAX_DURATION_SECS,
                probe.interval_secs
            );
        }
        for (name, secs) in [
            ("probe.connect_timeout_secs", probe.connect_timeout_secs),
            ("probe.read_timeout_secs", probe.read_timeout_secs),
        ] {
            if secs == 0 || secs > MAX_DURATION_SECS {
                bail!("{} must be between 1 and {}: {}", name, MAX_DURATION_SECS, secs);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_behavior() {
        let config = Config::default();
        assert_eq!(config.api.listen, "0.0.0.0:8080");
        assert!(!config.api.trust_forwarded_headers);
        assert_eq!(config.registry.ttl_secs, 60);
        assert_eq!(config.registry.reap_interval_secs, 10);
        assert_eq!(config.registry.default_port, 80);
        assert_eq!(config.registry.default_health_path, "/health");
        assert_eq!(config.probe.interval_secs, 10);
        assert_eq!(config.probe.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.probe.read_timeout(), Duration::from_secs(5));
        assert_eq!(config.probe.request_timeout(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sample_config_parses() {
        let config: Config = toml::from_str(include_str!("../discoveryd.toml")).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.registry.ttl_secs, Config::default().registry.ttl_secs);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [registry]
            ttl_secs = 120

            [probe]
            read_timeout_secs = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.registry.ttl_secs, 120);
        assert_eq!(config.registry.reap_interval_secs, 10);
        assert_eq!(config.probe.connect_timeout_secs, 5);
        assert_eq!(config.probe.read_timeout_secs, 2);
        assert_eq!(config.api.listen, "0.0.0.0:8080");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_reaper_slower_than_ttl() {
        let mut config = Config::default();
        config.registry.reap_interval_secs = 60;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_tiny_ttl_and_zero_timeouts() {
        let mut config = Config::default();
        config.registry.ttl_secs = 3;
        config.registry.reap_interval_secs = 1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.probe.read_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_out_of_range_durations() {
        let mut config = Config::default();
        config.registry.ttl_secs = 20_000_000_000_000;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.registry.ttl_secs = MAX_DURATION_SECS;
        config.registry.reap_interval_secs = 10;
        assert!(config.validate().is_ok());

        let mut config = Config::default();
        config.probe.interval_secs = u64::MAX;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.probe.connect_timeout_secs = u64::MAX;
        config.probe.read_timeout_secs = u64::MAX;
        assert!(config.validate().is_err());
        assert_eq!(config.probe.request_timeout(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_rejects_relative_health_path() {
        let mut config = Config::default();
        config.registry.default_health_path = "health".to_string();
        assert!(config.validate().is_err());
    }
}
