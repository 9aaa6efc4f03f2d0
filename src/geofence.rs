//! Glue for geofence notifications. Enter/exit evaluation happens in the
//! cloud; this side only names the collection and decodes what arrives on
//! the device's pub/sub topic.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GeofenceError {
    #[error("invalid event payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("invalid event time: {0}")]
    EventTime(#[from] chrono::ParseError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, strum_macros::Display)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "lowercase")]
pub enum TrackerEventType {
    Enter,
    Exit,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingEvent {
    pub tracker_event_type: TrackerEventType,
    pub source: String,
    pub event_time: String,
    pub geofence_id: String,
}

impl TrackingEvent {
    pub fn from_payload(payload: &[u8]) -> Result<Self, GeofenceError> {
        Ok(serde_json::from_slice(payload)?)
    }

    pub fn event_time(&self) -> Result<DateTime<Utc>, GeofenceError> {
        Ok(DateTime::parse_from_rfc3339(&self.event_time)?.with_timezone(&Utc))
    }
}

/// Topic the cloud publishes a device's geofence events on.
pub fn tracker_topic(identity_id: &str) -> String {
    format!("{}/tracker", identity_id)
}

/// `arn:aws:geo:us-east-1:123:geofence-collection/Name` -> `Name`.
pub fn collection_name_from_arn(arn: &str) -> Option<String> {
    let resource = arn.split(':').next_back()?;
    let parts: Vec<&str> = resource.split('/').collect();
    if parts.len() < 2 {
        return None;
    }
    parts
        .last()
        .filter(|name| !name.is_empty())
        .map(|name| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_decode_enter_event() {
        let payload = br#"{
            "trackerEventType": "ENTER",
            "source": "aws.geo",
            "eventTime": "2024-05-01T10:00:00Z",
            "geofenceId": "home"
        }"#;
        let event = TrackingEvent::from_payload(payload).unwrap();
        assert_eq!(event.tracker_event_type, TrackerEventType::Enter);
        assert_eq!(event.geofence_id, "home");
        assert_eq!(
            event.event_time().unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
        );
        assert_eq!(event.tracker_event_type.to_string(), "enter");
    }

    #[test]
    fn test_unknown_event_type_rejected() {
        let payload = br#"{"trackerEventType":"DWELL","source":"x","eventTime":"t","geofenceId":"g"}"#;
        assert!(matches!(
            TrackingEvent::from_payload(payload),
            Err(GeofenceError::Payload(_))
        ));
    }

    #[test]
    fn test_bad_event_time() {
        let payload =
            br#"{"trackerEventType":"EXIT","source":"x","eventTime":"yesterday","geofenceId":"g"}"#;
        let event = TrackingEvent::from_payload(payload).unwrap();
        assert!(matches!(event.event_time(), Err(GeofenceError::EventTime(_))));
    }

    #[test]
    fn test_collection_name() {
        assert_eq!(
            collection_name_from_arn("arn:aws:geo:us-east-1:123456789012:geofence-collection/Fences"),
            Some("Fences".to_string())
        );
        assert_eq!(collection_name_from_arn("arn:aws:geo:us-east-1:123:Fences"), None);
        assert_eq!(collection_name_from_arn("geofence-collection/"), None);
    }

    #[test]
    fn test_topic() {
        assert_eq!(tracker_topic("us-east-1:abc"), "us-east-1:abc/tracker");
    }
}
