use std::sync::Mutex;

use chrono::{DateTime, Utc};

use super::error::SyncError;
use crate::settings::SettingsStore;

/// Where the time of the last successful pass is kept.
pub trait SyncCheckpoint: Send + Sync {
    fn last_sync(&self) -> Option<DateTime<Utc>>;

    fn record(&self, at: DateTime<Utc>) -> Result<(), SyncError>;
}

/// Process-local; forgotten on restart.
#[derive(Debug, Default)]
pub struct MemoryCheckpoint {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl SyncCheckpoint for MemoryCheckpoint {
    fn last_sync(&self) -> Option<DateTime<Utc>> {
        *self.last.lock().unwrap()
    }

    fn record(&self, at: DateTime<Utc>) -> Result<(), SyncError> {
        *self.last.lock().unwrap() = Some(at);
        Ok(())
    }
}

/// Mirrors the last sync time into the settings file so a restarted
/// process resumes from where it left off.
pub struct SettingsCheckpoint {
    store: SettingsStore,
    last: Mutex<Option<DateTime<Utc>>>,
}

impl SettingsCheckpoint {
    pub fn open(store: SettingsStore) -> Result<Self, SyncError> {
        let last = store.load()?.last_sync_time;
        Ok(Self {
            store,
            last: Mutex::new(last),
        })
    }
}

impl SyncCheckpoint for SettingsCheckpoint {
    fn last_sync(&self) -> Option<DateTime<Utc>> {
        *self.last.lock().unwrap()
    }

    fn record(&self, at: DateTime<Utc>) -> Result<(), SyncError> {
        *self.last.lock().unwrap() = Some(at);
        self.store.update(|s| s.last_sync_time = Some(at))?;
        Ok(())
    }
}
