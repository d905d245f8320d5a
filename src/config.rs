use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{query::FilterMode, store::BackendKind};

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Engine settings, usually read from `config.toml` in the data directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Holds `projects.json` and the row store.
    pub data_dir: PathBuf,
    pub backend: BackendKind,
    /// Applied to query execution and to the displayed query text alike.
    pub filter_mode: FilterMode,
    /// Page size used when a request does not name one.
    pub default_page_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("tablescope-data"),
            backend: BackendKind::default(),
            filter_mode: FilterMode::default(),
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

const CONFIG_COMMENTS: &[(&str, &str)] = &[
    ("data_dir", "Directory for project records and stored rows"),
    ("backend", "Row store engine: \"memory\", \"kv\" or \"columnar\""),
    ("filter_mode", "Filter matching: \"contains\" or \"starts_with\""),
    ("default_page_size", "Rows per page when a request omits pageSize"),
];

impl EngineConfig {
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Reads a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        Self::from_toml_str(&text).with_context(|| format!("failed to parse config file {:?}", path))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let mut config: EngineConfig = toml::from_str(text).context("invalid engine config")?;
        config.default_page_size = config.default_page_size.max(1);
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create config dir {:?}", parent))?;
        }
        let text = toml::to_string_pretty(self).context("failed to serialize engine config")?;
        fs::write(path, text).with_context(|| format!("failed to write config file {:?}", path))
    }

    /// Default configuration with every setting commented out and described.
    pub fn generate_default_config() -> Result<String> {
        let text = toml::to_string_pretty(&Self::default())
            .context("failed to serialize default config")?;
        let mut out = String::new();
        for line in text.lines() {
            let key = line.split('=').next().unwrap_or("").trim();
            if let Some((_, comment)) = CONFIG_COMMENTS.iter().find(|(name, _)| *name == key) {
                out.push_str(&format!("# {}\n", comment));
            }
            if line.trim().is_empty() {
                out.push('\n');
            } else {
                out.push_str(&format!("# {}\n", line));
            }
        }
        Ok(out)
    }
}
