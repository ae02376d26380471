//! Process configuration read from the environment.

use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::Duration;
use thiserror::Error;

pub const LISTEN_ADDR_VAR: &str = "MEDISYNC_LISTEN_ADDR";
pub const KEYS_DIR_VAR: &str = "MEDISYNC_KEYS_DIR";
pub const ACTIVE_KID_VAR: &str = "MEDISYNC_ACTIVE_KID";
pub const ISSUER_VAR: &str = "MEDISYNC_ISSUER";
pub const TOKEN_TTL_VAR: &str = "MEDISYNC_TOKEN_TTL_SECS";
pub const BOOTSTRAP_ADMIN_VAR: &str = "MEDISYNC_BOOTSTRAP_ADMIN_EMAIL";

/// Longest accepted token lifetime (30 days).
pub const MAX_TOKEN_TTL_SECS: i64 = 30 * 24 * 60 * 60;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has an invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub listen_addr: SocketAddr,
    pub keys_dir: PathBuf,
    pub active_kid: String,
    pub issuer: String,
    pub token_ttl: Duration,
    pub bootstrap_admin_email: Option<String>,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let listen_addr = match get(LISTEN_ADDR_VAR) {
            Some(raw) => raw.parse().map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                var: LISTEN_ADDR_VAR,
                value: raw.clone(),
                reason: e.to_string(),
            })?,
            None => SocketAddr::from(([0, 0, 0, 0], 3000)),
        };

        let token_ttl = match get(TOKEN_TTL_VAR) {
            Some(raw) => {
                let secs: i64 = raw.parse().map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
                    var: TOKEN_TTL_VAR,
                    value: raw.clone(),
                    reason: e.to_string(),
                })?;
                if !(1..=MAX_TOKEN_TTL_SECS).contains(&secs) {
                    return Err(ConfigError::Invalid {
                        var: TOKEN_TTL_VAR,
                        value: raw,
                        reason: format!("must be between 1 and {MAX_TOKEN_TTL_SECS} seconds"),
                    });
                }
                Duration::seconds(secs)
            }
            None => Duration::hours(1),
        };

        Ok(Self {
            listen_addr,
            keys_dir: get(KEYS_DIR_VAR).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("keys")),
            active_kid: get(ACTIVE_KID_VAR).ok_or(ConfigError::Missing(ACTIVE_KID_VAR))?,
            issuer: get(ISSUER_VAR).unwrap_or_else(|| "medisync".to_string()),
            token_ttl,
            bootstrap_admin_email: get(BOOTSTRAP_ADMIN_VAR),
        })
    }
}
