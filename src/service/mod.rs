mod error;
mod replay;

use async_trait::async_trait;

use crate::sync::{PageCursor, PositionPage, SyncWindow};

pub use error::ServiceError;
pub use replay::ReplayService;
#[cfg(test)]
pub use replay::TrackFile;

/// Largest page the cloud tracker hands out per request.
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct PositionQuery {
    pub tracker_name: String,
    pub device_id: Option<String>,
    pub window: SyncWindow,
    pub cursor: Option<PageCursor>,
    pub max_results: usize,
}

/// Paginated device position history.
#[async_trait]
pub trait TrackingService: Send + Sync {
    async fn list_device_positions(
        &self,
        query: &PositionQuery,
    ) -> Result<PositionPage, ServiceError>;
}
