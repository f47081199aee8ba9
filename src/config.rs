// src/config.rs
//! Application config: TOML file + env overrides.
//!
//! Lookup order:
//! 1) `$RELAY_CONFIG_PATH` (must exist)
//! 2) `config/relay.toml`
//! 3) built-in defaults
//!
//! Then `RELAY_BIND_ADDR`, `RELAY_MIN_SCORE` and `RELAY_WEBHOOK_URL` override the file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::analyze::ScoringConfig;
use crate::dedup::DedupConfig;
use crate::notify::DispatchConfig;
use crate::resilience::{
    BreakerConfig, CacheConfig, RateLimitConfig, ResilienceConfig, RetryPolicy,
};
use crate::routing::RoutingConfig;

pub const ENV_CONFIG_PATH: &str = "RELAY_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/relay.toml";
pub const ENV_BIND_ADDR: &str = "RELAY_BIND_ADDR";
pub const ENV_MIN_SCORE: &str = "RELAY_MIN_SCORE";
pub const ENV_WEBHOOK_URL: &str = "RELAY_WEBHOOK_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} points to non-existent path {}", .path.display())]
    MissingFile { var: &'static str, path: PathBuf },
    #[error("reading config {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid {var}={value:?}: {reason}")]
    InvalidEnv {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Seconds between collection passes. 0 disables the background collector.
    pub collect_interval_secs: u64,
    /// Overall deadline applied to `POST /plans/run`.
    pub plan_deadline_ms: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            collect_interval_secs: 60,
            plan_deadline_ms: Some(30_000),
        }
    }
}

/// `[upstreams.<name>]`. Unset sections fall back to `[defaults]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
    #[serde(default)]
    pub breaker: Option<BreakerConfig>,
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
    #[serde(default)]
    pub cache: Option<CacheConfig>,
    #[serde(default)]
    pub deadline_ms: Option<u64>,
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl UpstreamConfig {
    pub fn resilience(&self, defaults: &ResilienceConfig) -> ResilienceConfig {
        ResilienceConfig {
            rate_limit: self.rate_limit.unwrap_or(defaults.rate_limit),
            breaker: self.breaker.unwrap_or(defaults.breaker),
            retry: self.retry.unwrap_or(defaults.retry),
            cache: self.cache.unwrap_or(defaults.cache),
            deadline_ms: self.deadline_ms.or(defaults.deadline_ms),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub defaults: ResilienceConfig,
    pub upstreams: BTreeMap<String, UpstreamConfig>,
    pub dedup: DedupConfig,
    pub scoring: ScoringConfig,
    pub routing: RoutingConfig,
    pub dispatch: DispatchConfig,
}

impl AppConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Parse one file. No env overrides, no validation.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Full lookup (env path, default path, defaults), env overrides, validation.
    pub fn load() -> Result<Self, ConfigError> {
        let mut cfg = match std::env::var(ENV_CONFIG_PATH) {
            Ok(p) if !p.trim().is_empty() => {
                let path = PathBuf::from(p);
                if !path.exists() {
                    return Err(ConfigError::MissingFile {
                        var: ENV_CONFIG_PATH,
                        path,
                    });
                }
                Self::load_from(&path)?
            }
            _ => {
                let path = PathBuf::from(DEFAULT_CONFIG_PATH);
                if path.exists() {
                    Self::load_from(&path)?
                } else {
                    tracing::info!("no {DEFAULT_CONFIG_PATH}, using built-in defaults");
                    Self::default()
                }
            }
        };
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(addr) = env_nonempty(ENV_BIND_ADDR) {
            self.server.bind_addr = addr;
        }
        if let Some(raw) = env_nonempty(ENV_MIN_SCORE) {
            let v: u8 = raw.parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::InvalidEnv {
                    var: ENV_MIN_SCORE,
                    value: raw.clone(),
                    reason: e.to_string(),
                }
            })?;
            self.routing.min_score = v;
        }
        if let Some(url) = env_nonempty(ENV_WEBHOOK_URL) {
            self.dispatch.webhook_url = Some(url);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;

        for (name, up) in &self.upstreams {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid("upstream with empty name".into()));
            }
            if !(up.url.starts_with("http://") || up.url.starts_with("https://")) {
                return Err(ConfigError::Invalid(format!(
                    "upstream `{name}`: url must be http(s), got {:?}",
                    up.url
                )));
            }
        }

        let t = self.scoring.thresholds;
        if !(t.medium <= t.high && t.high <= t.breaking && t.breaking <= 100) {
            return Err(ConfigError::Invalid(format!(
                "scoring thresholds must satisfy medium <= high <= breaking <= 100, got {}/{}/{}",
                t.medium, t.high, t.breaking
            )));
        }
        if self.routing.min_score > 100 {
            return Err(ConfigError::Invalid(format!(
                "routing.min_score {} is above 100",
                self.routing.min_score
            )));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server.bind_addr.parse().map_err(|_| {
            ConfigError::Invalid(format!(
                "server.bind_addr {:?} is not a socket address",
                self.server.bind_addr
            ))
        })
    }
}

fn env_nonempty(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let cfg = AppConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn upstream_overrides_merge_with_defaults() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [defaults]
            deadline_ms = 8000
            [defaults.retry]
            retries = 3
            delay_ms = 200

            [upstreams.github]
            url = "https://collector.local/github"
            [upstreams.github.rate_limit]
            max_requests = 30
            window_ms = 60000
            "#,
        )
        .unwrap();
        let gh = &cfg.upstreams["github"];
        assert_eq!(gh.request_timeout_ms, 10_000);
        let r = gh.resilience(&cfg.defaults);
        assert_eq!(r.rate_limit.max_requests, 30);
        assert_eq!(r.retry.retries, 3);
        assert_eq!(r.deadline_ms, Some(8_000));
        assert_eq!(r.breaker, BreakerConfig::default());
    }

    #[test]
    fn validation_catches_bad_values() {
        let mut cfg = AppConfig::default();
        cfg.server.bind_addr = "not-an-addr".into();
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));

        let mut cfg = AppConfig::default();
        cfg.scoring.thresholds.medium = 90;
        assert!(cfg.validate().is_err());

        let cfg = AppConfig::from_toml_str(
            r#"
            [upstreams.x]
            url = "ftp://nope"
            "#,
        )
        .unwrap();
        assert!(cfg.validate().is_err());
    }
}
