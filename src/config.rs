use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Environment, File};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::fingerprint::{Component, ComponentKind};

pub const DEFAULT_LOG_FILTER: &str = "hostprint=info";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Probes to run, in order.
    pub components: Vec<ComponentKind>,
    pub token: TokenConfig,
    pub log_filter: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Sub-key for the stable token; the process name when unset.
    pub name: Option<String>,
    /// Token file used where there is no registry.
    pub store_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            components: ComponentKind::ALL.to_vec(),
            token: TokenConfig::default(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Config {
    /// Defaults, then the per-user file, then `explicit`, then `HOSTPRINT_*`.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let user = Self::config_path();
        Self::load_layers(user.as_deref(), explicit, Self::environment())
    }

    /// `$CONFIG_DIR/hostprint/config.toml`, if the platform has a config dir.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("hostprint").join("config.toml"))
    }

    fn environment() -> Environment {
        Environment::with_prefix("HOSTPRINT")
            .prefix_separator("_")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("components")
            .try_parsing(true)
    }

    fn load_layers(user: Option<&Path>, explicit: Option<&Path>, env: Environment) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = user {
            debug!("Reading user config from {:?} (optional)", path);
            builder = builder.add_source(File::from(path).required(false));
        }

        if let Some(path) = explicit {
            if !path.exists() {
                anyhow::bail!("Configuration file not found at: {:?}", path);
            }
            builder = builder.add_source(File::from(path).required(true));
        }

        let config = builder
            .add_source(env)
            .build()
            .context("Failed to read configuration")?
            .try_deserialize::<Config>()
            .context("Failed to parse configuration")?;

        Ok(config)
    }

    /// Component descriptors for the configured kinds.
    pub fn components(&self) -> Vec<Component> {
        self.components
            .iter()
            .map(|kind| Component::from_kind(*kind, self.token.name.as_deref()))
            .collect()
    }
}
