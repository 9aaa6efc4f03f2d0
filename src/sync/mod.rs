mod checkpoint;
mod error;
mod synchronizer;
mod types;
mod worker;

pub use checkpoint::{MemoryCheckpoint, SettingsCheckpoint, SyncCheckpoint};
pub use synchronizer::{SyncOptions, TrackSynchronizer};
pub use types::{
    Coordinate, DevicePositionSample, PageCursor, PositionPage, SyncOutcome, SyncWindow,
};
pub use worker::{LocationUpdate, SyncWorker, UpdateFilter, DEFAULT_QUEUE_DEPTH};
