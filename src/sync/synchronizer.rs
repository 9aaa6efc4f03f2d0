use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;

use super::checkpoint::SyncCheckpoint;
use super::error::SyncError;
use super::types::{
    Coordinate, DevicePositionSample, PassReport, SyncMode, SyncOutcome, SyncStatus, SyncWindow,
};
use crate::clock::Clock;
use crate::render::MapRenderer;
use crate::service::{PositionQuery, TrackingService, MAX_PAGE_SIZE};
use crate::settings::SettingsStore;

pub const DEFAULT_LOOKBACK: Duration = Duration::hours(24);

/// Whether tracking is switched on. Owned by whoever starts and stops
/// tracking; the synchronizer asks it at the start of every pass.
pub trait TrackingSwitch: Send + Sync {
    fn is_active(&self) -> bool;
}

/// `track-sync start` and `stop` flip `tracking_active` in the settings
/// file, so a running session re-reads it on each pass.
impl TrackingSwitch for SettingsStore {
    fn is_active(&self) -> bool {
        match self.load() {
            Ok(settings) => settings.tracking_active,
            Err(e) => {
                log::warn!("Cannot read tracking state, treating as inactive: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
pub use flag::TrackingFlag;


#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub tracker_name: String,
    pub device_id: Option<String>,
    pub lookback: Duration,
    pub page_size: usize,
}

impl SyncOptions {
    pub fn new(tracker_name: impl Into<String>) -> Self {
        Self {
            tracker_name: tracker_name.into(),
            device_id: None,
            lookback: DEFAULT_LOOKBACK,
            page_size: MAX_PAGE_SIZE,
        }
    }
}

pub struct TrackSynchronizer {
    service: Arc<dyn TrackingService>,
    renderer: Arc<dyn MapRenderer>,
    checkpoint: Box<dyn SyncCheckpoint>,
    clock: Arc<dyn Clock>,
    active: Arc<dyn TrackingSwitch>,
    options: SyncOptions,
    in_flight: Mutex<()>,
    status: StdMutex<SyncStatus>,
}

impl TrackSynchronizer {
    pub fn new(
        service: Arc<dyn TrackingService>,
        renderer: Arc<dyn MapRenderer>,
        checkpoint: Box<dyn SyncCheckpoint>,
        clock: Arc<dyn Clock>,
        active: Arc<dyn TrackingSwitch>,
        options: SyncOptions,
    ) -> Self {
        let last_success = checkpoint.last_sync();
        Self {
            service,
            renderer,
            checkpoint,
            clock,
            active,
            options,
            in_flight: Mutex::new(()),
            status: StdMutex::new(SyncStatus {
                last_success,
                ..SyncStatus::default()
            }),
        }
    }

    pub fn status(&self) -> SyncStatus {
        self.status.lock().unwrap().clone()
    }

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.checkpoint.last_sync()
    }

    /// Runs one tracking pass. Failures are logged and reported through the
    /// returned outcome only.
    pub async fn sync(&self) -> SyncOutcome {
        if !self.active.is_active() {
            log::debug!("Tracking inactive, skipping sync");
            return SyncOutcome::Skipped;
        }

        let Ok(_guard) = self.in_flight.try_lock() else {
            log::debug!("Sync already in flight, dropping trigger");
            return SyncOutcome::Busy;
        };

        self.status.lock().unwrap().mode = SyncMode::Syncing;
        let result = self.run_pass().await;

        let mut status = self.status.lock().unwrap();
        status.mode = SyncMode::Idle;
        match result {
            Ok(report) => {
                log::info!(
                    "Sync pass done: {} page(s), {} point(s), {} dropped",
                    report.pages,
                    report.delivered,
                    report.dropped
                );
                status.passes += 1;
                status.points_delivered += report.delivered as u64;
                status.last_error = None;
                SyncOutcome::Completed(report)
            }
            Err(e) => {
                log::error!("Sync pass failed: {}", e);
                status.last_error = Some(e.to_string());
                SyncOutcome::Failed
            }
        }
    }

    async fn run_pass(&self) -> Result<PassReport, SyncError> {
        let window = SyncWindow::compute(
            self.clock.now(),
            self.options.lookback,
            self.checkpoint.last_sync(),
        );
        if window.is_inverted() {
            log::warn!(
                "Last sync at {} is older than the {} lookback; nothing can match {} .. {}",
                window.end,
                self.options.lookback,
                window.start,
                window.end
            );
        } else {
            log::debug!("Syncing window {} .. {}", window.start, window.end);
        }

        let mut query = PositionQuery {
            tracker_name: self.options.tracker_name.clone(),
            device_id: self.options.device_id.clone(),
            window,
            cursor: None,
            max_results: self.options.page_size,
        };
        let mut report = PassReport::default();

        loop {
            let page = self.service.list_device_positions(&query).await?;

            if report.pages == 0 {
                self.mark_success(self.clock.now());
            }
            report.pages += 1;

            let received = page.positions.len();
            let ordered = order_page(page.positions);
            report.dropped += received - ordered.len();

            let fresh: Vec<Coordinate> = ordered
                .into_iter()
                .filter(|c| !self.renderer.has_tracking_marker(c))
                .collect();
            report.delivered += fresh.len();
            self.renderer.render_track_points(&fresh);

            match page.next_cursor {
                Some(cursor) => query.cursor = Some(cursor),
                None => break,
            }
        }

        Ok(report)
    }

    fn mark_success(&self, at: DateTime<Utc>) {
        if let Err(e) = self.checkpoint.record(at) {
            log::warn!("Failed to persist last sync time: {}", e);
        }
        self.status.lock().unwrap().last_success = Some(at);
    }
}

/// Drops malformed samples and orders the rest by sample time. The sort is
/// stable, so equal timestamps keep their service order.
fn order_page(positions: Vec<DevicePositionSample>) -> Vec<Coordinate> {
    let mut timed: Vec<(DateTime<Utc>, Coordinate)> = positions
        .iter()
        .filter_map(|p| Some((p.sample_time?, p.coordinate()?)))
        .collect();
    timed.sort_by_key(|(t, _)| *t);
    timed.into_iter().map(|(_, c)| c).collect()
}
