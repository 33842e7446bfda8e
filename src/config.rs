use crate::timer::Precision;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "TASKPAGES_CONFIG";
pub const STORE_ENV: &str = "TASKPAGES_STORE";
pub const PAGE_ENV: &str = "TASKPAGES_PAGE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Page store file; when unset the project/global lookup applies.
    pub store_path: Option<PathBuf>,
    /// File used by the single-page commands.
    pub page_path: PathBuf,
    /// Title given to a freshly created single page.
    pub default_title: String,
    /// Clock resolution for the page store. Single-page commands always
    /// record seconds.
    pub precision: Precision,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            store_path: None,
            page_path: PathBuf::from("data/page.json"),
            default_title: "My Tasks".to_string(),
            precision: Precision::Minute,
        }
    }
}

impl Config {
    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Config::default());
        }
        serde_yaml::from_str(text).context("parsing config file")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
        Config::from_yaml(&text)
    }

    /// Applies `TASKPAGES_STORE` / `TASKPAGES_PAGE` on top of the file values.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(path) = non_empty_env(STORE_ENV) {
            self.store_path = Some(PathBuf::from(path));
        }
        if let Some(path) = non_empty_env(PAGE_ENV) {
            self.page_path = PathBuf::from(path);
        }
        self
    }
}

/// Reads the config file named by `TASKPAGES_CONFIG`, else the platform
/// config directory's `config.yml`. A missing file yields the defaults.
pub fn load_config() -> Result<Config> {
    let path = match non_empty_env(CONFIG_ENV) {
        Some(path) => Some(PathBuf::from(path)),
        None => ProjectDirs::from("", "", "taskpages").map(|d| d.config_dir().join("config.yml")),
    };
    let config = match path {
        Some(path) if path.exists() => {
            tracing::debug!(path = %path.display(), "reading config");
            Config::from_file(&path)?
        }
        _ => Config::default(),
    };
    Ok(config.with_env_overrides())
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
