//! API server configuration.
//!
//! Resolution order: built-in defaults, then the TOML file named by
//! `IQ_CONFIG` (if any), then individual environment variables.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use iq_engine::{AggregatorConfig, ResolverConfig};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {message}")]
    Io { path: String, message: String },

    #[error("invalid config file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("invalid value for {var}: {message}")]
    Invalid { var: &'static str, message: String },
}

/// Top-level API server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Listen address (e.g., "0.0.0.0").
    #[serde(default = "default_host")]
    pub host: String,
    /// Listen port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// PostgreSQL connection URL. Without it the server runs on sample data.
    #[serde(default)]
    pub database_url: Option<String>,
    /// Rule file (JSON or TOML). Takes precedence over the database table.
    #[serde(default)]
    pub rules_path: Option<PathBuf>,
    /// Dictionary file (JSON or TOML). Takes precedence over the database.
    #[serde(default)]
    pub dictionaries_path: Option<PathBuf>,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

impl ApiConfig {
    /// Load config from `IQ_CONFIG` and environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base = match lookup("IQ_CONFIG") {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        base.with_overrides(lookup)
    }

    /// Load config from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(host) = lookup("IQ_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("IQ_PORT") {
            self.port = port.parse().map_err(|_| ConfigError::Invalid {
                var: "IQ_PORT",
                message: format!("'{port}' is not a port number"),
            })?;
        }
        if let Some(url) = lookup("DATABASE_URL").filter(|u| !u.is_empty()) {
            self.database_url = Some(url);
        }
        if let Some(path) = lookup("IQ_RULES_PATH").filter(|p| !p.is_empty()) {
            self.rules_path = Some(path.into());
        }
        if let Some(path) = lookup("IQ_DICTIONARIES_PATH").filter(|p| !p.is_empty()) {
            self.dictionaries_path = Some(path.into());
        }
        // Blank or `none` turns the fallback off; any other value names the rule.
        if let Some(rule) = lookup("IQ_FALLBACK_RULE") {
            let rule = rule.trim();
            if rule.is_empty() || rule.eq_ignore_ascii_case("none") {
                self.resolver.fallback_enabled = false;
                self.resolver.fallback_rule = None;
            } else {
                self.resolver.fallback_enabled = true;
                self.resolver.fallback_rule = Some(rule.to_string());
            }
        }
        Ok(self)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database_url: None,
            rules_path: None,
            dictionaries_path: None,
            resolver: ResolverConfig::default(),
            aggregator: AggregatorConfig::default(),
        }
    }
}
