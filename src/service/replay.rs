use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use super::{PositionQuery, ServiceError, TrackingService, MAX_PAGE_SIZE};
use crate::sync::{DevicePositionSample, PageCursor, PositionPage};

/// Recorded device positions, stored as YAML (or JSON, which YAML accepts).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackFile {
    #[serde(default)]
    pub tracker_name: Option<String>,
    /// Shift the track so its newest sample lands at the moment it is opened.
    #[serde(default)]
    pub rebase: bool,
    #[serde(default)]
    pub positions: Vec<DevicePositionSample>,
}

impl TrackFile {
    pub fn from_str(content: &str) -> Result<Self, ServiceError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ServiceError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Offset that moves the newest sample to `now`.
    pub fn rebase_offset(&self, now: DateTime<Utc>) -> Duration {
        self.positions
            .iter()
            .filter_map(|p| p.sample_time)
            .max()
            .map(|newest| now - newest)
            .unwrap_or_else(Duration::zero)
    }

    fn malformed(&self) -> usize {
        self.positions.iter().filter(|p| !p.is_well_formed()).count()
    }

    fn shifted(mut self, offset: Duration) -> Self {
        for p in &mut self.positions {
            p.sample_time = p.sample_time.map(|t| t + offset);
        }
        self
    }
}

/// Serves a recorded track the way the cloud tracker pages its history.
///
/// The cursor is the offset of the next sample in the filtered result set.
/// When opened from a file, the file is re-read on every request so that a
/// track being appended to by another process shows up on the next pass.
pub struct ReplayService {
    path: Option<PathBuf>,
    offset: Duration,
    track: RwLock<TrackFile>,
}

impl ReplayService {
    pub fn new(track: TrackFile) -> Self {
        Self {
            path: None,
            offset: Duration::zero(),
            track: RwLock::new(track),
        }
    }

    pub fn open(path: PathBuf, now: DateTime<Utc>) -> Result<Self, ServiceError> {
        let track = TrackFile::from_file(&path)?;
        let offset = if track.rebase {
            track.rebase_offset(now)
        } else {
            Duration::zero()
        };
        if track.rebase {
            log::info!("Replaying {} shifted by {}", path.display(), offset);
        }
        let malformed = track.malformed();
        if malformed > 0 {
            log::warn!(
                "{} of {} samples in {} lack a time or position",
                malformed,
                track.positions.len(),
                path.display()
            );
        }
        Ok(Self {
            path: Some(path),
            offset,
            ..Self::new(track.shifted(offset))
        })
    }

    /// Once serving, a track that no longer reads or parses is a failed
    /// response rather than a bad input file.
    fn refresh(&self) -> Result<(), ServiceError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let track = TrackFile::from_file(path).map_err(|e| match e {
            ServiceError::Io(e) => ServiceError::Network(format!("{}: {}", path.display(), e)),
            ServiceError::Decode(e) => ServiceError::Malformed(e.to_string()),
            other => other,
        })?;
        *self.track.write().unwrap() = track.shifted(self.offset);
        Ok(())
    }

    fn matching(&self, query: &PositionQuery) -> Vec<DevicePositionSample> {
        let track = self.track.read().unwrap();
        track
            .positions
            .iter()
            .filter(|p| match &query.device_id {
                Some(id) => p.device_id.as_ref() == Some(id),
                None => true,
            })
            // Untimed samples are passed through; the caller decides what to do with them.
            .filter(|p| p.sample_time.is_none_or(|t| query.window.contains(t)))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TrackingService for ReplayService {
    async fn list_device_positions(
        &self,
        query: &PositionQuery,
    ) -> Result<PositionPage, ServiceError> {
        self.refresh()?;
        if let Some(tracker) = &self.track.read().unwrap().tracker_name {
            if tracker != &query.tracker_name {
                return Err(ServiceError::Unauthorized);
            }
        }

        let matching = self.matching(query);
        let offset = match &query.cursor {
            Some(cursor) => parse_cursor(cursor, matching.len())?,
            None => 0,
        };
        let page_size = query.max_results.clamp(1, MAX_PAGE_SIZE);
        let end = (offset + page_size).min(matching.len());

        let next_cursor = if end < matching.len() {
            Some(PageCursor(end.to_string()))
        } else {
            None
        };

        Ok(PositionPage {
            positions: matching[offset..end].to_vec(),
            next_cursor,
        })
    }
}

fn parse_cursor(cursor: &PageCursor, len: usize) -> Result<usize, ServiceError> {
    cursor
        .as_str()
        .parse::<usize>()
        .ok()
        .filter(|offset| *offset <= len)
        .ok_or_else(|| ServiceError::InvalidCursor(cursor.as_str().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::SyncWindow;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn query(cursor: Option<&str>, max_results: usize) -> PositionQuery {
        PositionQuery {
            tracker_name: "demo".into(),
            device_id: None,
            window: SyncWindow {
                start: at(0),
                end: at(1_000),
            },
            cursor: cursor.map(|c| PageCursor(c.to_string())),
            max_results,
        }
    }

    fn track(count: i64) -> TrackFile {
        TrackFile {
            tracker_name: Some("demo".into()),
            rebase: false,
            positions: (0..count)
                .map(|i| DevicePositionSample::new(-122.0, 37.0 + i as f64 * 0.01, at(i * 10)))
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_pages_until_exhausted() {
        let service = ReplayService::new(track(5));

        let first = service.list_device_positions(&query(None, 2)).await.unwrap();
        assert_eq!(first.positions.len(), 2);
        assert_eq!(first.next_cursor, Some(PageCursor("2".into())));

        let second = service
            .list_device_positions(&query(Some("2"), 2))
            .await
            .unwrap();
        assert_eq!(second.next_cursor, Some(PageCursor("4".into())));

        let last = service
            .list_device_positions(&query(Some("4"), 2))
            .await
            .unwrap();
        assert_eq!(last.positions.len(), 1);
        assert!(last.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_filters_by_window() {
        let mut file = track(3);
        file.positions
            .push(DevicePositionSample::new(-122.0, 38.0, at(5_000)));
        let service = ReplayService::new(file);

        let page = service.list_device_positions(&query(None, 100)).await.unwrap();
        assert_eq!(page.positions.len(), 3);
    }

    #[tokio::test]
    async fn test_rejects_bad_cursor() {
        let service = ReplayService::new(track(3));
        let err = service
            .list_device_positions(&query(Some("nope"), 2))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCursor(_)));

        let err = service
            .list_device_positions(&query(Some("9"), 2))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCursor(_)));
    }

    #[tokio::test]
    async fn test_rejects_other_tracker() {
        let service = ReplayService::new(track(1));
        let mut q = query(None, 10);
        q.tracker_name = "other".into();
        let err = service.list_device_positions(&q).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized));
    }

    #[tokio::test]
    async fn test_unreadable_track_fails_request() {
        let path = crate::settings::scratch_path("track.yaml");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            "tracker_name: demo\npositions:\n  - position: [-122.0, 37.0]\n    sample_time: 1970-01-01T00:00:10Z\n",
        )
        .unwrap();

        let service = ReplayService::open(path.clone(), at(0)).unwrap();
        let page = service.list_device_positions(&query(None, 10)).await.unwrap();
        assert_eq!(page.positions.len(), 1);

        std::fs::write(&path, "positions: [[[").unwrap();
        let err = service
            .list_device_positions(&query(None, 10))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Malformed(_)));

        std::fs::remove_file(&path).unwrap();
        let err = service
            .list_device_positions(&query(None, 10))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Network(_)));
    }

    #[test]
    fn test_open_rejects_bad_file() {
        let path = crate::settings::scratch_path("track.yaml");
        assert!(matches!(
            ReplayService::open(path.clone(), at(0)),
            Err(ServiceError::Io(_))
        ));

        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "positions: [[[").unwrap();
        assert!(matches!(
            ReplayService::open(path, at(0)),
            Err(ServiceError::Decode(_))
        ));
    }

    #[test]
    fn test_rebase_moves_newest_to_now() {
        let file = track(3);
        let now = at(10_000);
        let offset = file.rebase_offset(now);
        let shifted = file.shifted(offset);
        assert_eq!(shifted.positions[2].sample_time, Some(now));
        assert_eq!(shifted.positions[0].sample_time, Some(now - Duration::seconds(20)));
    }

    #[test]
    fn test_parses_json_track() {
        let json = r#"{
            "tracker_name": "demo",
            "positions": [
                {"device_id": "a", "position": [-122.0, 37.0], "sample_time": "2024-05-01T10:00:00Z"},
                {"position": [-122.1]}
            ]
        }"#;
        let file = TrackFile::from_str(json).unwrap();
        assert_eq!(file.positions.len(), 2);
        assert_eq!(file.malformed(), 1);
        assert!(file.positions[0].is_well_formed());
        assert!(!file.positions[1].is_well_formed());
    }
}
