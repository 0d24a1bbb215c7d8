//! Server configuration, read from a TOML file.
//!
//! Every section is optional; a missing file section falls back to the
//! defaults below, which run an in-memory store on the loopback interface.

use std::collections::HashSet;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use common::Market;
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

use crate::ledger::OverdraftPolicy;
use crate::logging::LoggingConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub listen_address: String,
    pub database: DatabaseConfig,
    pub ledger: LedgerConfig,
    pub settlement: SettlementConfig,
    pub logging: LoggingConfig,
    pub seed: SeedConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_address: "127.0.0.1:6379".into(),
            database: DatabaseConfig::default(),
            ledger: LedgerConfig::default(),
            settlement: SettlementConfig::default(),
            logging: LoggingConfig::default(),
            seed: SeedConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `mem://` for an embedded store, `ws://host:port` for a remote one.
    pub endpoint: String,
    pub namespace: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            endpoint: "mem://".into(),
            namespace: "propbet".into(),
            database: "wagers".into(),
            username: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub overdraft: OverdraftPolicy,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    /// Users allowed to resolve matched wagers over the network.
    pub operators: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    pub users: Vec<SeedUser>,
    pub markets: Vec<Market>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SeedUser {
    pub name: String,
    pub balance: Decimal,
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse_toml(&content)
    }

    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.listen_address
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue {
                field: "listen_address",
                reason: e.to_string(),
            })?;

        if self.database.endpoint.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "database.endpoint",
                reason: "must not be empty".into(),
            });
        }
        if self.database.username.is_some() != self.database.password.is_some() {
            return Err(ConfigError::InvalidValue {
                field: "database.username",
                reason: "username and password must be set together".into(),
            });
        }

        if let Some(user) = self.seed.users.iter().find(|u| u.balance < Decimal::ZERO) {
            return Err(ConfigError::InvalidValue {
                field: "seed.users",
                reason: format!("{} has a negative balance", user.name),
            });
        }

        let mut ids = HashSet::new();
        for market in &self.seed.markets {
            if !ids.insert(market.id.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: "seed.markets",
                    reason: format!("duplicate market id {}", market.id),
                });
            }
        }
        Ok(())
    }
}
