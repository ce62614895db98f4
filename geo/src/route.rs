use geojson::{Feature, Geometry, JsonObject, Value};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::Coordinate;

/// A driving route. Replaced as a whole, never edited.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Route {
    pub geometry: Vec<Coordinate>,
    pub distance_m: f64,
    pub duration_s: f64,
}

impl Route {
    pub fn new(geometry: Vec<Coordinate>, distance_m: f64, duration_s: f64) -> Self {
        Self {
            geometry,
            distance_m: distance_m.max(0.0),
            duration_s: duration_s.max(0.0),
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{:.1} km, {} min",
            self.distance_m / 1000.0,
            (self.duration_s / 60.0).round() as u64
        )
    }

    /// GeoJSON LineString feature (lon, lat axis order) for a map widget.
    pub fn to_feature(&self) -> Feature {
        let line = self
            .geometry
            .iter()
            .map(|c| vec![c.lon, c.lat])
            .collect::<Vec<_>>();
        let mut properties = JsonObject::new();
        properties.insert("distance".to_string(), json!(self.distance_m));
        properties.insert("duration".to_string(), json!(self.duration_s));
        Feature {
            geometry: Some(Geometry::new(Value::LineString(line))),
            properties: Some(properties),
            ..Default::default()
        }
    }
}
