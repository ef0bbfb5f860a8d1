//! Service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! - `HOST` - Bind address (default: 0.0.0.0)
//! - `PORT` - Listen port (default: 8083)
//! - `DATABASE_URL` - `PostgreSQL` connection string; without it the service
//!   runs on the in-memory store
//! - `DATABASE_MAX_CONNECTIONS` - Pool size (default: 10)
//! - `NATS_URL` - Event bus; events are only logged when unset
//! - `CURRENCY` - ISO code all prices are quoted in (default: INR)
//! - `RETURN_WINDOW_DAYS` - Days after delivery a return may be filed (default: 30)
//! - `STRICT_STATUS_TRANSITIONS` - Restrict admin status changes to the next
//!   forward step (default: false)
//! - `REELS_CACHE_TTL_SECS` - Freshness window for the public reels list (default: 600)
//! - `ADMIN_EMAIL` / `ADMIN_TOKEN` - Bootstrap admin account, both or neither

use std::net::IpAddr;
use std::time::Duration;

use thiserror::Error;

use crate::domain::aggregates::TransitionPolicy;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
}

#[derive(Clone)]
pub struct AdminBootstrap {
    pub email: String,
    pub token: String,
}

impl std::fmt::Debug for AdminBootstrap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminBootstrap")
            .field("email", &self.email)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub nats_url: Option<String>,
    pub currency: String,
    pub return_window_days: i64,
    pub transition_policy: TransitionPolicy,
    pub reels_cache_ttl: Duration,
    pub admin: Option<AdminBootstrap>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: IpAddr::from([0, 0, 0, 0]),
            port: 8083,
            database_url: None,
            database_max_connections: 10,
            nats_url: None,
            currency: "INR".to_string(),
            return_window_days: 30,
            transition_policy: TransitionPolicy::Permissive,
            reels_cache_ttl: Duration::from_secs(600),
            admin: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok().filter(|v| !v.trim().is_empty()))
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let admin = match (get("ADMIN_EMAIL"), get("ADMIN_TOKEN")) {
            (Some(email), Some(token)) => Some(AdminBootstrap { email, token }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::MissingEnvVar("ADMIN_TOKEN".into())),
            (None, Some(_)) => return Err(ConfigError::MissingEnvVar("ADMIN_EMAIL".into())),
        };

        let strict = parse_or(&get, "STRICT_STATUS_TRANSITIONS", false, parse_bool)?;
        let return_window_days = parse_or(&get, "RETURN_WINDOW_DAYS", defaults.return_window_days, |v| {
            v.parse::<i64>().map_err(|e| e.to_string()).and_then(|d| {
                if d < 0 {
                    Err("must not be negative".to_string())
                } else {
                    Ok(d)
                }
            })
        })?;

        Ok(Self {
            host: parse_or(&get, "HOST", defaults.host, |v| {
                v.parse().map_err(|e: std::net::AddrParseError| e.to_string())
            })?,
            port: parse_or(&get, "PORT", defaults.port, |v| {
                v.parse().map_err(|e: std::num::ParseIntError| e.to_string())
            })?,
            database_url: get("DATABASE_URL"),
            database_max_connections: parse_or(
                &get,
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
                |v| v.parse().map_err(|e: std::num::ParseIntError| e.to_string()),
            )?,
            nats_url: get("NATS_URL"),
            currency: get("CURRENCY").map(|c| c.trim().to_uppercase()).unwrap_or(defaults.currency),
            return_window_days,
            transition_policy: if strict { TransitionPolicy::Strict } else { TransitionPolicy::Permissive },
            reels_cache_ttl: parse_or(&get, "REELS_CACHE_TTL_SECS", defaults.reels_cache_ttl, |v| {
                v.parse().map(Duration::from_secs).map_err(|e: std::num::ParseIntError| e.to_string())
            })?,
            admin,
        })
    }
}

fn parse_or<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
    parse: impl Fn(&str) -> Result<T, String>,
) -> Result<T, ConfigError> {
    match get(key) {
        Some(raw) => parse(raw.trim()).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e)),
        None => Ok(default),
    }
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(format!("expected a boolean, got '{other}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.port, 8083);
        assert_eq!(config.currency, "INR");
        assert_eq!(config.return_window_days, 30);
        assert_eq!(config.transition_policy, TransitionPolicy::Permissive);
        assert_eq!(config.reels_cache_ttl, Duration::from_secs(600));
        assert!(config.database_url.is_none());
        assert!(config.admin.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("PORT", "9000"),
            ("STRICT_STATUS_TRANSITIONS", "true"),
            ("RETURN_WINDOW_DAYS", "14"),
            ("CURRENCY", "usd"),
            ("ADMIN_EMAIL", "ops@shop.test"),
            ("ADMIN_TOKEN", "tok"),
        ])
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.transition_policy, TransitionPolicy::Strict);
        assert_eq!(config.return_window_days, 14);
        assert_eq!(config.currency, "USD");
        assert_eq!(config.admin.unwrap().email, "ops@shop.test");
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(load(&[("PORT", "eighty")]), Err(ConfigError::InvalidEnvVar(k, _)) if k == "PORT"));
        assert!(matches!(
            load(&[("STRICT_STATUS_TRANSITIONS", "maybe")]),
            Err(ConfigError::InvalidEnvVar(k, _)) if k == "STRICT_STATUS_TRANSITIONS"
        ));
        assert_eq!(
            load(&[("ADMIN_EMAIL", "ops@shop.test")]).unwrap_err(),
            ConfigError::MissingEnvVar("ADMIN_TOKEN".into())
        );
    }
}
