use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::db::ConnectionStore;
use crate::ui::Theme;

/// Default cell margin in the terminal. The widget's own default is wider,
/// which reads poorly at character resolution.
pub const DEFAULT_MARGIN: usize = 1;

/// User preferences from `config.toml`. Every field is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub margin: usize,
    pub best_layout: bool,
    pub query_box: bool,
    pub theme: String,
    pub log_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            margin: DEFAULT_MARGIN,
            best_layout: false,
            query_box: true,
            theme: String::from("dark"),
            log_file: None,
        }
    }
}

impl Settings {
    pub fn path() -> PathBuf {
        ConnectionStore::config_dir().join("config.toml")
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path())
    }

    /// Missing file means defaults; an unreadable or malformed one is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn log_path(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| ConnectionStore::config_dir().join("rsview.log"))
    }

    /// Unknown theme names fall back to the dark theme.
    pub fn theme(&self) -> Theme {
        Theme::by_name(&self.theme).unwrap_or_else(|| {
            tracing::warn!("unknown theme {:?}, using dark", self.theme);
            Theme::dark()
        })
    }
}
