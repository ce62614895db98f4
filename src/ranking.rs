use std::collections::BTreeSet;

use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value};
use havengeo::{Category, Coordinate, PointOfInterest};
use serde::Serialize;
use serde_json::json;

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RankedPoint {
    pub point: PointOfInterest,
    pub distance_m: f64,
}

/// Keeps the points whose category is allowed and orders them nearest first.
/// Equal distances keep their input order. `Unknown` never passes.
pub fn rank_and_filter(
    points: &[PointOfInterest],
    origin: &Coordinate,
    allowed: &BTreeSet<Category>,
) -> Vec<RankedPoint> {
    let mut ranked: Vec<RankedPoint> = points
        .iter()
        .filter(|p| p.category != Category::Unknown && allowed.contains(&p.category))
        .map(|p| RankedPoint {
            distance_m: origin.distance(&p.coord),
            point: p.clone(),
        })
        .collect();
    ranked.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));
    ranked
}

/// Marker layer for a map widget.
pub fn to_feature_collection(ranked: &[RankedPoint]) -> FeatureCollection {
    let features = ranked
        .iter()
        .map(|r| {
            let mut properties = JsonObject::new();
            properties.insert("id".to_string(), json!(r.point.id));
            properties.insert("name".to_string(), json!(r.point.display_name()));
            properties.insert("category".to_string(), json!(r.point.category));
            properties.insert("distance".to_string(), json!(r.distance_m));
            Feature {
                geometry: Some(Geometry::new(Value::Point(vec![
                    r.point.coord.lon,
                    r.point.coord.lat,
                ]))),
                properties: Some(properties),
                ..Default::default()
            }
        })
        .collect();
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}
