use std::sync::Mutex;

use super::MapRenderer;
use crate::sync::Coordinate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum MarkerCategory {
    /// A point from the device's recorded track.
    Tracking,
    /// The map-center pin placed after the user pans the map.
    LocationChange,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Marker {
    pub coordinate: Coordinate,
    pub category: MarkerCategory,
}

/// How two tracking points are judged to be the same marker.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DedupPolicy {
    /// Bit-exact latitude and longitude.
    #[default]
    Exact,
    /// Both axes within the given number of degrees.
    Tolerance(f64),
}

impl DedupPolicy {
    pub fn matches(&self, a: &Coordinate, b: &Coordinate) -> bool {
        match self {
            DedupPolicy::Exact => {
                a.latitude.to_bits() == b.latitude.to_bits()
                    && a.longitude.to_bits() == b.longitude.to_bits()
            }
            DedupPolicy::Tolerance(deg) => {
                (a.latitude - b.latitude).abs() <= *deg && (a.longitude - b.longitude).abs() <= *deg
            }
        }
    }
}

/// In-memory marker set standing in for a map widget's annotation list.
#[derive(Debug, Default)]
pub struct MarkerLayer {
    policy: DedupPolicy,
    markers: Mutex<Vec<Marker>>,
}

impl MarkerLayer {
    pub fn new(policy: DedupPolicy) -> Self {
        Self {
            policy,
            markers: Mutex::new(Vec::new()),
        }
    }

    pub fn markers(&self) -> Vec<Marker> {
        self.markers.lock().unwrap().clone()
    }

    pub fn tracking_points(&self) -> Vec<Coordinate> {
        self.markers
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.category == MarkerCategory::Tracking)
            .map(|m| m.coordinate)
            .collect()
    }

    /// Replaces the map-center pin. Only one exists at a time.
    pub fn set_location_change(&self, coordinate: Coordinate) {
        let mut markers = self.markers.lock().unwrap();
        markers.retain(|m| m.category != MarkerCategory::LocationChange);
        markers.push(Marker {
            coordinate,
            category: MarkerCategory::LocationChange,
        });
    }

    fn exists(markers: &[Marker], policy: DedupPolicy, coordinate: &Coordinate) -> bool {
        markers.iter().any(|m| {
            m.category == MarkerCategory::Tracking && policy.matches(&m.coordinate, coordinate)
        })
    }
}

impl MapRenderer for MarkerLayer {
    fn render_track_points(&self, coordinates: &[Coordinate]) {
        if coordinates.is_empty() {
            return;
        }

        let mut markers = self.markers.lock().unwrap();
        let before = markers.len();
        for coordinate in coordinates {
            if Self::exists(&markers, self.policy, coordinate) {
                continue;
            }
            markers.push(Marker {
                coordinate: *coordinate,
                category: MarkerCategory::Tracking,
            });
        }
        log::debug!(
            "Rendered {} of {} tracking points",
            markers.len() - before,
            coordinates.len()
        );
    }

    fn has_tracking_marker(&self, coordinate: &Coordinate) -> bool {
        let markers = self.markers.lock().unwrap();
        Self::exists(&markers, self.policy, coordinate)
    }
}
