use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Values that survive an app restart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalSettings {
    #[serde(default)]
    pub tracking_active: bool,
    #[serde(default)]
    pub last_sync_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub device_id: Option<String>,
}

pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Self {
        SettingsStore { path }
    }

    /// Missing file means defaults. A device id is assigned on first load.
    pub fn load(&self) -> Result<LocalSettings, SettingsError> {
        let content = if self.path.exists() {
            std::fs::read_to_string(&self.path)?
        } else {
            String::new()
        };
        let mut settings: LocalSettings = if content.trim().is_empty() {
            LocalSettings::default()
        } else {
            serde_yaml::from_str(&content)?
        };

        if settings.device_id.is_none() {
            settings.device_id = Some(uuid::Uuid::new_v4().to_string());
            self.save(&settings)?;
        }

        Ok(settings)
    }

    pub fn save(&self, settings: &LocalSettings) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, serde_yaml::to_string(settings)?)?;
        Ok(())
    }

    /// Load, modify, save.
    pub fn update<F>(&self, f: F) -> Result<LocalSettings, SettingsError>
    where
        F: FnOnce(&mut LocalSettings),
    {
        let mut settings = self.load()?;
        f(&mut settings);
        self.save(&settings)?;
        Ok(settings)
    }
}

#[cfg(test)]
pub(crate) fn scratch_path(name: &str) -> PathBuf {
    std::env::temp_dir()
        .join(format!("track-sync-{}", uuid::Uuid::new_v4()))
        .join(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_missing_file_loads_defaults_with_device_id() {
        let store = SettingsStore::new(scratch_path("settings.yaml"));
        let settings = store.load().unwrap();
        assert!(!settings.tracking_active);
        assert!(settings.last_sync_time.is_none());
        assert!(settings.device_id.is_some());

        // Same id on the next load.
        assert_eq!(store.load().unwrap().device_id, settings.device_id);
    }

    #[test]
    fn test_update_persists() {
        let store = SettingsStore::new(scratch_path("settings.yaml"));
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        store
            .update(|s| {
                s.tracking_active = true;
                s.last_sync_time = Some(t);
            })
            .unwrap();

        let reloaded = store.load().unwrap();
        assert!(reloaded.tracking_active);
        assert_eq!(reloaded.last_sync_time, Some(t));
    }

    #[test]
    fn test_empty_file_is_defaults() {
        let path = scratch_path("settings.yaml");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "").unwrap();
        let settings = SettingsStore::new(path).load().unwrap();
        assert!(!settings.tracking_active);
    }
}
