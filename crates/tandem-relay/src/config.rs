use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub bind: String,
    pub port: u16,
    /// `EnvFilter` directives; falls back to `RUST_LOG` when unset
    pub log_filter: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8000,
            log_filter: None,
        }
    }
}

impl RelayConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tandem")
        .join("relay.toml")
}

/// Load from `path`, or from the default location if it exists.
///
/// An explicit path must exist; a missing default file means defaults.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<RelayConfig> {
    let (path, required) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (config_path(), false),
    };

    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(RelayConfig::default());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("reading {}", path.display()));
        }
    };
    parse_config(&text).with_context(|| format!("parsing {}", path.display()))
}

pub fn parse_config(text: &str) -> anyhow::Result<RelayConfig> {
    Ok(toml::from_str(text)?)
}
