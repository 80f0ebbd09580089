use crate::commands::invalid_argument;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use stratum_schema::DEFAULT_TAG;
use tracing::debug;

/// User settings read from `config.toml`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Settings {
    pub default_tag: Option<String>,
    pub rootless: bool,
    pub uid_map: Vec<String>,
    pub gid_map: Vec<String>,
}

impl Settings {
    /// Load an explicit settings file, or the default one when `path` is `None`.
    pub fn resolve(path: Option<&Path>) -> Result<Self, String> {
        match path {
            Some(p) => Self::load(p),
            None => Self::load_default(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| invalid_argument(format!("cannot read {}: {e}", path.display())))?;
        let settings: Self = toml::from_str(&content)
            .map_err(|e| invalid_argument(format!("invalid settings {}: {e}", path.display())))?;
        debug!("loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Load `$XDG_CONFIG_HOME/stratum/config.toml` (or `~/.config/...`).
    /// A missing file yields the defaults.
    pub fn load_default() -> Result<Self, String> {
        match default_config_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn default_tag(&self) -> &str {
        self.default_tag.as_deref().unwrap_or(DEFAULT_TAG)
    }

    /// Command-line directives replace the configured list when any are given.
    pub fn uid_map(&self, cli: &[String]) -> Vec<String> {
        pick(cli, &self.uid_map)
    }

    pub fn gid_map(&self, cli: &[String]) -> Vec<String> {
        pick(cli, &self.gid_map)
    }

    pub fn rootless(&self, cli: bool) -> bool {
        cli || self.rootless
    }
}

fn pick(cli: &[String], configured: &[String]) -> Vec<String> {
    if cli.is_empty() {
        configured.to_vec()
    } else {
        cli.to_vec()
    }
}

fn default_config_path() -> Option<PathBuf> {
    let base = match std::env::var_os("XDG_CONFIG_HOME") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => PathBuf::from(std::env::var_os("HOME")?).join(".config"),
    };
    Some(base.join("stratum").join("config.toml"))
}
