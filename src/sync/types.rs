use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance in metres (haversine).
    pub fn distance_m(&self, other: &Coordinate) -> f64 {
        let (lat1, lat2) = (self.latitude.to_radians(), other.latitude.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (other.longitude - self.longitude).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().min(1.0).asin()
    }
}

/// One recorded device position as returned by the tracking service.
///
/// Every field may be absent on the wire. `position` is in the service's
/// `[longitude, latitude]` order.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DevicePositionSample {
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub position: Option<Vec<f64>>,
    #[serde(default)]
    pub sample_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub accuracy_m: Option<f64>,
}

impl DevicePositionSample {
    #[cfg(test)]
    pub fn new(longitude: f64, latitude: f64, sample_time: DateTime<Utc>) -> Self {
        Self {
            device_id: None,
            position: Some(vec![longitude, latitude]),
            sample_time: Some(sample_time),
            accuracy_m: None,
        }
    }

    /// `None` when fewer than two position components are present.
    pub fn coordinate(&self) -> Option<Coordinate> {
        match self.position.as_deref() {
            Some([longitude, latitude, ..]) => Some(Coordinate::new(*latitude, *longitude)),
            _ => None,
        }
    }

    pub fn is_well_formed(&self) -> bool {
        self.sample_time.is_some() && self.coordinate().is_some()
    }
}

/// Time bounds of one tracking pass, shared by every page of that pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SyncWindow {
    pub fn compute(
        now: DateTime<Utc>,
        lookback: Duration,
        last_success: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            start: now - lookback,
            end: last_success.unwrap_or(now),
        }
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t <= self.end
    }

    /// True when the last success is older than the lookback, so no sample
    /// can fall inside the window.
    pub fn is_inverted(&self) -> bool {
        self.start > self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageCursor(pub String);

impl PageCursor {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct PositionPage {
    pub positions: Vec<DevicePositionSample>,
    pub next_cursor: Option<PageCursor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum SyncMode {
    Idle,
    Syncing,
}

#[derive(Debug, Clone)]
pub struct SyncStatus {
    pub mode: SyncMode,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub passes: u64,
    pub points_delivered: u64,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            mode: SyncMode::Idle,
            last_success: None,
            last_error: None,
            passes: 0,
            points_delivered: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub pages: usize,
    pub delivered: usize,
    pub dropped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Tracking is inactive.
    Skipped,
    /// Another pass is still in flight; this trigger was dropped.
    Busy,
    Completed(PassReport),
    Failed,
}
