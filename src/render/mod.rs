mod geojson;
mod layer;

pub use layer::{DedupPolicy, Marker, MarkerLayer};

use crate::sync::Coordinate;

/// Displays tracking points. Calls are additive; the renderer owns its own
/// de-duplication.
pub trait MapRenderer: Send + Sync {
    fn render_track_points(&self, coordinates: &[Coordinate]);

    fn has_tracking_marker(&self, coordinate: &Coordinate) -> bool;
}
