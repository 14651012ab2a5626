//! Bot configuration file.
//!
//! Lives at `~/.config/ircbot/config.toml` unless `--config` says otherwise.
//! One `[servers.<name>]` table per network; see `config.example.toml`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ircbot_sdk::{ConfigError, ServerConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Log raw traffic and lower the default filter to `debug`.
    pub debug: bool,
    /// Servers by name. Sorted so startup order is stable.
    pub servers: BTreeMap<String, ServerConfig>,
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ircbot")
}

pub fn default_path() -> PathBuf {
    config_dir().join("config.toml")
}

impl Config {
    /// Read and parse `path`. Does not validate; call [`Config::check`].
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("can't read {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("bad config file {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Validate every server, filling in identity defaults.
    pub fn check(&mut self) -> Result<(), ConfigError> {
        for (name, server) in &mut self.servers {
            server.validate(name)?;
        }
        Ok(())
    }

    /// Keep only the server called `name`.
    pub fn select(&mut self, name: &str) -> Result<()> {
        let server = self
            .servers
            .remove(name)
            .with_context(|| format!("no server named {name:?} in config"))?;
        self.servers = BTreeMap::from([(name.to_string(), server)]);
        Ok(())
    }
}
