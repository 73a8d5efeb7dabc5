mod basic;
mod blob_store;
mod collector;
mod host;
mod tracked;

pub use basic::BasicConfig;
pub use blob_store::{BlobStoreConfig, S3Config};
pub use collector::CollectorConfig;
pub use host::HostConfig;
pub use tracked::{DiscoveryConfig, TrackedRepository};

use crate::error::VaultError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Core settings (see `basic` table in config.toml).
    #[serde(default)]
    pub basic: BasicConfig,

    /// Remote host API settings (see `host` table in config.toml).
    #[serde(default)]
    pub host: HostConfig,

    /// Object storage for file contents (see `blob_store` table in config.toml).
    #[serde(default)]
    pub blob_store: BlobStoreConfig,

    /// Collection run limits (see `collector` table in config.toml).
    #[serde(default)]
    pub collector: CollectorConfig,

    /// Repositories to track, as `[[repositories]]` entries.
    #[serde(default)]
    pub repositories: Vec<TrackedRepository>,

    /// Topic-driven repository discovery (see `discovery` table in config.toml).
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

const DEFAULT_CONFIG_FILE: &str = "config.toml";
const ENV_PREFIX: &str = "COMMITVAULT_";

impl Config {
    /// Builds a Figment that merges defaults, a config TOML file and `COMMITVAULT_*` env vars.
    ///
    /// Nested keys use a double underscore, e.g. `COMMITVAULT_HOST__TOKEN`.
    pub fn figment() -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
        if PathBuf::from(DEFAULT_CONFIG_FILE).is_file() {
            figment = figment.merge(Toml::file(DEFAULT_CONFIG_FILE));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Loads configuration by merging defaults, `config.toml` if present and env overrides.
    ///
    /// Note: this does **not** validate. Binaries should call `Config::from_toml()` instead.
    pub fn from_optional_toml() -> Self {
        Self::figment().extract().unwrap_or_else(|err| {
            panic!("failed to extract configuration (defaults + optional config.toml): {err}")
        })
    }

    /// Loads configuration and validates it, panicking with a readable message on failure.
    pub fn from_toml() -> Self {
        let cfg: Self = Self::figment().extract().unwrap_or_else(|err| {
            panic!(
                "failed to extract configuration from {}: {err}",
                DEFAULT_CONFIG_FILE
            )
        });
        if let Err(err) = cfg.validate() {
            panic!("{err}");
        }
        cfg
    }

    pub fn validate(&self) -> Result<(), VaultError> {
        if self.basic.database_url.trim().is_empty() {
            return Err(VaultError::Config(
                "basic.database_url must be set and non-empty".to_string(),
            ));
        }
        self.blob_store.validate()?;
        if self.collector.max_workers == 0 {
            return Err(VaultError::Config(
                "collector.max_workers must be at least 1".to_string(),
            ));
        }
        for repo in &self.repositories {
            if repo.owner.trim().is_empty() || repo.name.trim().is_empty() {
                return Err(VaultError::Config(format!(
                    "repositories entry '{}' needs both owner and name",
                    repo.full_name()
                )));
            }
        }
        Ok(())
    }
}
