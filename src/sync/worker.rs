use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::error::SyncError;
use super::synchronizer::TrackSynchronizer;
use super::types::{Coordinate, SyncStatus};

pub const DEFAULT_QUEUE_DEPTH: usize = 16;

/// A fresh user location reported by the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationUpdate {
    pub coordinate: Coordinate,
    pub at: DateTime<Utc>,
}

/// Decides which location updates are worth a pass. An update passes when
/// both the time since and the distance from the last accepted update reach
/// the configured minimums. The first update always passes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UpdateFilter {
    pub min_interval: Duration,
    pub min_distance_m: f64,
}

impl UpdateFilter {
    pub fn accepts(&self, last: Option<&LocationUpdate>, update: &LocationUpdate) -> bool {
        let Some(last) = last else {
            return true;
        };
        update.at - last.at >= self.min_interval
            && last.coordinate.distance_m(&update.coordinate) >= self.min_distance_m
    }
}

#[derive(Debug)]
struct WorkerHandle {
    trigger_tx: mpsc::Sender<LocationUpdate>,
    stop_tx: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

/// Feeds location updates to a synchronizer from a single consumer task.
///
/// Updates that arrive while a pass is running are folded into one
/// follow-up pass. Updates rejected by the filter trigger nothing.
pub struct SyncWorker {
    sync: Arc<TrackSynchronizer>,
    filter: UpdateFilter,
    worker: Option<WorkerHandle>,
}

impl SyncWorker {
    pub fn new(sync: Arc<TrackSynchronizer>, filter: UpdateFilter) -> Self {
        Self {
            sync,
            filter,
            worker: None,
        }
    }

    pub fn status(&self) -> SyncStatus {
        self.sync.status()
    }

    pub fn start(&mut self, queue_depth: usize) -> Result<(), SyncError> {
        if self.worker.is_some() {
            return Err(SyncError::AlreadyRunning);
        }

        let (trigger_tx, trigger_rx) = mpsc::channel(queue_depth.max(1));
        let (stop_tx, stop_rx) = oneshot::channel();
        let sync = self.sync.clone();

        let join = tokio::spawn(run_worker_loop(sync, self.filter, trigger_rx, stop_rx));

        self.worker = Some(WorkerHandle {
            trigger_tx,
            stop_tx,
            join,
        });
        Ok(())
    }

    /// Queues a location update. Returns false when the worker is not
    /// running or the queue is full; a full queue already guarantees a
    /// pending pass, so nothing is lost.
    pub fn trigger(&self, update: LocationUpdate) -> bool {
        match &self.worker {
            Some(worker) => worker.trigger_tx.try_send(update).is_ok(),
            None => false,
        }
    }

    pub async fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            let _ = worker.join.await;
        }
    }
}

async fn run_worker_loop(
    sync: Arc<TrackSynchronizer>,
    filter: UpdateFilter,
    mut trigger_rx: mpsc::Receiver<LocationUpdate>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut last_accepted: Option<LocationUpdate> = None;

    loop {
        // Queued updates are served before a stop request.
        let update = tokio::select! {
            biased;
            update = trigger_rx.recv() => match update {
                Some(update) => update,
                None => break,
            },
            _ = &mut stop_rx => break,
        };

        let mut burst = vec![update];
        while let Ok(next) = trigger_rx.try_recv() {
            burst.push(next);
        }

        let mut accepted = 0;
        for update in &burst {
            if filter.accepts(last_accepted.as_ref(), update) {
                last_accepted = Some(*update);
                accepted += 1;
            }
        }
        if accepted == 0 {
            log::debug!("{} location update(s) filtered out", burst.len());
            continue;
        }
        if let Some(latest) = &last_accepted {
            log::debug!(
                "Location update at {} ({}, {}), {} of {} accepted",
                latest.at,
                latest.coordinate.latitude,
                latest.coordinate.longitude,
                accepted,
                burst.len()
            );
        }

        sync.sync().await;
    }
    log::debug!("Sync worker stopped");
}
