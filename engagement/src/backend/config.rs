//! # Engagement Configuration
//!
//! Settings are read from a single YAML file. Every field has a default, so a
//! missing file, or one that only sets a couple of keys, is valid.
//!
//! ## YAML Format
//!
//! ```yaml
//! data_directory: "/home/me/.local/share/Habit Engagement"
//! users_collection: users
//! default_user: u1
//! log_level: info
//! notifications:
//!   title: Health App Reminder
//!   sound: default
//!   channel:
//!     id: default
//!     name: default
//!     importance: max
//!     vibration_pattern: [0, 250, 250, 250]
//!     light_color: "#FF231F7C"
//! ```

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::backend::notifications::NotificationChannel;
use crate::backend::storage::yaml::default_data_directory;

/// Name of the config file inside the data directory
pub const CONFIG_FILE_NAME: &str = "engagement.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngagementConfig {
    /// Where documents and schedules are stored; the platform data directory when unset
    pub data_directory: Option<PathBuf>,
    pub users_collection: String,
    /// User the command-line binary acts as when `--user` is not given
    pub default_user: Option<String>,
    pub log_level: String,
    pub notifications: NotificationSettings,
}

impl Default for EngagementConfig {
    fn default() -> Self {
        Self {
            data_directory: None,
            users_collection: "users".to_string(),
            default_user: None,
            log_level: "info".to_string(),
            notifications: NotificationSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub title: String,
    pub sound: Option<String>,
    pub channel: NotificationChannel,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            title: "Health App Reminder".to_string(),
            sound: Some("default".to_string()),
            channel: NotificationChannel::default(),
        }
    }
}

impl EngagementConfig {
    /// Load from `path`, falling back to defaults when the file does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config file at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let yaml_content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&yaml_content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Write the configuration using the temp file + rename pattern
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let yaml_content = serde_yaml::to_string(self)?;
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, yaml_content)?;
        fs::rename(&temp_path, path)?;

        debug!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// The configured data directory, or the platform default
    pub fn resolve_data_directory(&self) -> Result<PathBuf> {
        match &self.data_directory {
            Some(directory) => Ok(directory.clone()),
            None => default_data_directory(),
        }
    }

    /// Default location of the config file
    pub fn default_path() -> Result<PathBuf> {
        Ok(default_data_directory()?.join(CONFIG_FILE_NAME))
    }
}
