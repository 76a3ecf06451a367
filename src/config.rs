use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "meghendra", "habitlog")
}

fn default_data_dir() -> PathBuf {
    if let Some(path) = std::env::var_os("HABITLOG_DATA_DIR") {
        return PathBuf::from(path);
    }
    if let Some(dirs) = project_dirs() {
        return dirs.data_dir().to_path_buf();
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".habitlog")
}

fn default_local_path() -> PathBuf {
    default_data_dir().join("habitlog-data.json")
}

fn default_token_path() -> PathBuf {
    default_data_dir().join("remote_token.json")
}

pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os("HABITLOG_CONFIG") {
        return PathBuf::from(path);
    }
    if let Some(dirs) = project_dirs() {
        return dirs.config_dir().join("config.toml");
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".habitlog-config.toml")
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub remote: RemoteConfig,
    pub auth: AuthConfig,
    pub sync: SyncConfig,
    pub pomodoro: PomodoroConfig,
    pub log: LogConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DataConfig {
    /// Local fallback document used while signed out.
    pub local_path: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            local_path: default_local_path(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RemoteConfig {
    pub enabled: bool,
    pub file_name: String,
    pub api_base: String,
    pub timeout_seconds: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            file_name: "monk-mode-data.json".to_string(),
            api_base: "https://www.googleapis.com".to_string(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub token_path: PathBuf,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_path: default_token_path(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SyncConfig {
    /// Restore the previous document when the latest remote write fails.
    pub rollback_on_failure: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PomodoroConfig {
    pub work_minutes: u64,
    pub short_break_minutes: u64,
    pub long_break_minutes: u64,
    pub long_break_every: u64,
}

impl Default for PomodoroConfig {
    fn default() -> Self {
        Self {
            work_minutes: 25,
            short_break_minutes: 5,
            long_break_minutes: 15,
            long_break_every: 4,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LogConfig {
    /// Default `env_logger` filter; `RUST_LOG` wins when set.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Self {
        Self::load_from_path(&config_path())
    }

    pub fn load_from_path(config_path: &Path) -> Self {
        let mut config = if let Ok(content) = fs::read_to_string(config_path) {
            match toml::from_str::<Config>(&content) {
                Ok(config) => config,
                Err(e) => {
                    log::warn!(
                        "Failed to parse config.toml ({config_path:?}), using defaults: {e}"
                    );
                    Config::default()
                }
            }
        } else {
            Config::default()
        };

        let changed = config.normalize();

        if changed || !config_path.exists() {
            if let Err(e) = config.save_to_path(config_path) {
                log::warn!("Failed to write config.toml ({config_path:?}): {e}");
            }
        }

        config
    }

    pub fn save_to_path(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).unwrap_or_default();
        fs::write(path, content)
    }

    fn normalize(&mut self) -> bool {
        let mut changed = false;

        if self.data.local_path.as_os_str().is_empty() {
            self.data.local_path = default_local_path();
            changed = true;
        }
        if self.data.local_path.is_relative() {
            self.data.local_path = default_data_dir().join(&self.data.local_path);
            changed = true;
        }

        if self.auth.token_path.as_os_str().is_empty() {
            self.auth.token_path = default_token_path();
            changed = true;
        }
        if self.auth.token_path.is_relative() {
            self.auth.token_path = default_data_dir().join(&self.auth.token_path);
            changed = true;
        }

        let trimmed = self.remote.api_base.trim_end_matches('/');
        if trimmed.len() != self.remote.api_base.len() {
            self.remote.api_base = trimmed.to_string();
            changed = true;
        }

        if self.remote.file_name.trim().is_empty() {
            self.remote.file_name = RemoteConfig::default().file_name;
            changed = true;
        }

        changed
    }
}
