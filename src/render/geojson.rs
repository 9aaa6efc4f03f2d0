use serde_json::{json, Value};

use super::{Marker, MarkerLayer};

impl MarkerLayer {
    /// Markers as a GeoJSON `FeatureCollection`, tracking points in render order.
    pub fn to_geojson(&self) -> Value {
        let features: Vec<Value> = self.markers().iter().map(feature).collect();
        json!({
            "type": "FeatureCollection",
            "features": features,
        })
    }
}

fn feature(marker: &Marker) -> Value {
    json!({
        "type": "Feature",
        "geometry": {
            "type": "Point",
            "coordinates": [marker.coordinate.longitude, marker.coordinate.latitude],
        },
        "properties": {
            "category": marker.category.to_string(),
        },
    })
}

#[cfg(test)]
mod tests {
    use crate::render::{MapRenderer, MarkerLayer};
    use crate::sync::Coordinate;

    #[test]
    fn test_geojson_uses_lon_lat_order() {
        let layer = MarkerLayer::default();
        layer.render_track_points(&[Coordinate::new(37.0, -122.0)]);
        layer.set_location_change(Coordinate::new(1.0, 2.0));

        let doc = layer.to_geojson();
        let features = doc["features"].as_array().unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0]["geometry"]["coordinates"][0], -122.0);
        assert_eq!(features[0]["geometry"]["coordinates"][1], 37.0);
        assert_eq!(features[0]["properties"]["category"], "tracking");
        assert_eq!(features[1]["properties"]["category"], "location_change");
    }
}
