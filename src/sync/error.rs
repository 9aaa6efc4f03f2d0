use thiserror::Error;

use crate::service::ServiceError;
use crate::settings::SettingsError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("tracking service error: {0}")]
    Service(#[from] ServiceError),
    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),
    #[error("sync worker already running")]
    AlreadyRunning,
}
