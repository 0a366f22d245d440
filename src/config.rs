use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StoreError;

pub const DEFAULT_DATA_ROOT: &str = "~/Documents/TravelRequests";
pub const DEFAULT_AI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_AI_MODEL: &str = "gemini-2.0-flash";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AiSettings {
    pub endpoint: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_AI_ENDPOINT.to_string(),
            model: DEFAULT_AI_MODEL.to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            timeout_secs: 60,
        }
    }
}

impl AiSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppSettings {
    pub data_root: String,
    #[serde(default)]
    pub theme: Theme,
    #[serde(default)]
    pub ai: AiSettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self { data_root: DEFAULT_DATA_ROOT.to_string(), theme: Theme::default(), ai: AiSettings::default() }
    }
}

impl AppSettings {
    pub fn paths(&self) -> DataPaths {
        DataPaths::new(expand_home_dir(&self.data_root))
    }
}

/// Where everything lives under the data root.
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub root: PathBuf,
}

impl DataPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn requests(&self) -> PathBuf {
        self.root.join("data/requests.toml")
    }

    pub fn catalog(&self) -> PathBuf {
        self.root.join("data/passengers.toml")
    }

    pub fn session(&self) -> PathBuf {
        self.root.join("data/session.toml")
    }

    pub fn templates(&self) -> PathBuf {
        self.root.join("templates")
    }

    pub fn output(&self) -> PathBuf {
        self.root.join("output")
    }
}

pub fn get_config_path() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("com", "travel-request", "app") {
        let config_dir = proj_dirs.config_dir();
        if !config_dir.exists() {
            fs::create_dir_all(config_dir).ok();
        }
        return config_dir.join("settings.toml");
    }
    PathBuf::from("settings.toml")
}

/// `None` when the file is missing or unreadable.
pub fn load_settings(path: &Path) -> Option<AppSettings> {
    if !path.exists() {
        return None;
    }
    let content = fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(settings) => Some(settings),
        Err(e) => {
            debug!("ignoring unreadable settings at {}: {}", path.display(), e);
            None
        }
    }
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> Result<(), StoreError> {
    let toml_str = toml::to_string_pretty(settings)?;
    fs::write(path, toml_str).map_err(|source| StoreError::Io { path: path.to_path_buf(), source })
}

pub fn expand_home_dir(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(base_dirs) = BaseDirs::new() {
            let home = base_dirs.home_dir().to_string_lossy();
            return path.replacen('~', &home, 1);
        }
    }
    path.to_string()
}
