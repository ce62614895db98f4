use std::sync::Arc;

use havengeo::{Coordinate, PointOfInterest, RadiusQuery, Tags};
use log::{debug, info, warn};
use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;

use crate::http::HttpClient;

/// Server side execution limit, in seconds.
pub const QUERY_TIMEOUT_S: u32 = 25;

/// `(key, value)` selectors, one union member each.
const SELECTORS: [(&str, &str); 5] = [
    ("amenity", "hospital"),
    ("amenity", "police"),
    ("amenity", "fire_station"),
    ("emergency", "shelter"),
    ("amenity", "shelter"),
];

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("discovery request failed with HTTP status {0}")]
    Status(u16),
    #[error("discovery request failed: {0}")]
    Transport(String),
    #[error("malformed discovery response: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Deserialize, Debug)]
struct OverpassResponse {
    /// Decoded one by one so a malformed element only costs itself.
    #[serde(default)]
    elements: Vec<serde_json::Value>,
}

#[derive(Deserialize, Debug)]
struct OverpassElement {
    #[serde(rename = "type", default = "node")]
    element_type: String,
    id: u64,
    lat: Option<f64>,
    lon: Option<f64>,
    center: Option<Center>,
    #[serde(default)]
    tags: Tags,
}

#[derive(Deserialize, Debug)]
struct Center {
    lat: f64,
    lon: f64,
}

fn node() -> String {
    "node".to_string()
}

/// Overpass QL selecting every emergency facility within the query radius,
/// as one batch with centroids for ways and relations.
pub fn build_query(area: &RadiusQuery) -> String {
    let around = format!(
        "(around:{},{},{})",
        area.radius_m, area.center.lat, area.center.lon
    );
    let clauses: String = SELECTORS
        .iter()
        .map(|(key, value)| format!("  nwr[\"{}\"=\"{}\"]{};\n", key, value, around))
        .collect();
    format!(
        "[out:json][timeout:{}];\n(\n{});\nout center;",
        QUERY_TIMEOUT_S, clauses
    )
}

pub struct Overpass<C: HttpClient> {
    client: Arc<C>,
    endpoint: Url,
}

impl<C: HttpClient> Overpass<C> {
    pub fn new(client: Arc<C>, endpoint: Url) -> Self {
        Self { client, endpoint }
    }

    pub fn url(&self, area: &RadiusQuery) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("data", &build_query(area));
        url
    }

    pub async fn discover(&self, area: &RadiusQuery) -> Result<Vec<PointOfInterest>, DiscoveryError> {
        info!("Discovering within {} m of {}", area.radius_m, area.center);
        let response = self
            .client
            .get(self.url(area))
            .await
            .map_err(|e| DiscoveryError::Transport(e.to_string()))?;
        if !response.is_success() {
            warn!("discovery status {}", response.status);
            return Err(DiscoveryError::Status(response.status));
        }
        let points = parse(&response.body)?;
        info!("Discover {} -> {}", area.center, points.len());
        Ok(points)
    }
}

/// Elements that do not decode or lack a usable position are dropped rather
/// than passed on.
pub fn parse(body: &[u8]) -> Result<Vec<PointOfInterest>, DiscoveryError> {
    let response: OverpassResponse = serde_json::from_slice(body)?;
    let total = response.elements.len();
    let points: Vec<PointOfInterest> = response
        .elements
        .into_iter()
        .filter_map(|value| {
            let element = match serde_json::from_value::<OverpassElement>(value) {
                Ok(element) => element,
                Err(e) => {
                    debug!("dropping malformed element: {}", e);
                    return None;
                }
            };
            let id = format!("{}/{}", element.element_type, element.id);
            let (lat, lon) = match (element.lat, element.lon, &element.center) {
                (Some(lat), Some(lon), _) => (lat, lon),
                (_, _, Some(center)) => (center.lat, center.lon),
                _ => {
                    debug!("dropping {}: no position", id);
                    return None;
                }
            };
            match Coordinate::new(lat, lon) {
                Ok(coord) => Some(PointOfInterest::new(id, coord, element.tags)),
                Err(e) => {
                    debug!("dropping {}: {}", id, e);
                    None
                }
            }
        })
        .collect();
    if points.len() < total {
        warn!("Dropped {} of {} malformed elements", total - points.len(), total);
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use havengeo::Category;

    use super::*;
    use crate::http::tests::MockHttpClient;

    fn area() -> RadiusQuery {
        RadiusQuery::new(Coordinate { lat: 20.0, lon: 78.0 }, 2000)
    }

    fn overpass(mock: MockHttpClient) -> (Arc<MockHttpClient>, Overpass<MockHttpClient>) {
        let client = Arc::new(mock);
        let endpoint = Url::parse("http://overpass.test/api/interpreter").unwrap();
        (client.clone(), Overpass::new(client, endpoint))
    }

    #[test]
    fn test_build_query() {
        let query = build_query(&area());
        assert!(query.starts_with("[out:json][timeout:25];"));
        assert!(query.ends_with("out center;"));
        assert_eq!(query.matches("(around:2000,20,78)").count(), 5);
        for clause in [
            "nwr[\"amenity\"=\"hospital\"]",
            "nwr[\"amenity\"=\"police\"]",
            "nwr[\"amenity\"=\"fire_station\"]",
            "nwr[\"emergency\"=\"shelter\"]",
            "nwr[\"amenity\"=\"shelter\"]",
        ] {
            assert!(query.contains(clause), "{} missing in {}", clause, query);
        }
    }

    #[test]
    fn test_build_query_coerces_radius() {
        let area = RadiusQuery::new(Coordinate { lat: 1.5, lon: -2.25 }, -10);
        assert!(build_query(&area).contains("(around:2000,1.5,-2.25)"));
    }

    #[test]
    fn test_url_encodes_query() {
        let (_, overpass) = overpass(MockHttpClient::new());
        let url = overpass.url(&area());
        assert_eq!(url.path(), "/api/interpreter");
        let (key, value) = url.query_pairs().next().unwrap();
        assert_eq!(key, "data");
        assert_eq!(value, build_query(&area()));
        assert!(!url.query().unwrap().contains('"'));
    }

    #[test]
    fn test_parse() {
        let body = r#"{"version": 0.6, "elements": [
            {"type": "node", "id": 1, "lat": 20.001, "lon": 78.001, "tags": {"amenity": "hospital", "name": "City Hospital"}},
            {"type": "way", "id": 1, "center": {"lat": 20.002, "lon": 78.002}, "tags": {"amenity": "police"}},
            {"type": "node", "id": 3, "lat": 20.003, "lon": 78.003},
            {"type": "node", "id": 4, "tags": {"amenity": "fire_station"}},
            {"type": "node", "id": 5, "lat": 95.0, "lon": 78.0, "tags": {"amenity": "fire_station"}},
            {"type": "node", "lat": 20.004, "lon": 78.004, "tags": {"amenity": "police"}},
            {"type": "node", "id": "six", "lat": 20.005, "lon": 78.005, "tags": {"amenity": "police"}},
            {"type": "node", "id": 7, "lat": "20.006", "lon": 78.006, "tags": {"amenity": "police"}}
        ]}"#;
        let points = parse(body.as_bytes()).unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].id, "node/1");
        assert_eq!(points[0].category, Category::Hospital);
        assert_eq!(points[0].name.as_deref(), Some("City Hospital"));
        assert_eq!(points[1].id, "way/1");
        assert_eq!(points[1].coord, Coordinate { lat: 20.002, lon: 78.002 });
        assert_eq!(points[1].category, Category::Police);
        assert_eq!(points[2].category, Category::Unknown);
    }

    #[test]
    fn test_element_without_id_is_dropped() {
        let body = r#"{"elements": [
            {"type": "node", "id": 1, "lat": 20.001, "lon": 78.001, "tags": {"amenity": "hospital"}},
            {"type": "node", "lat": 20.002, "lon": 78.002, "tags": {"amenity": "police"}}
        ]}"#;
        let points = parse(body.as_bytes()).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].id, "node/1");
    }

    #[test]
    fn test_parse_without_elements() {
        assert!(parse(b"{}").unwrap().is_empty());
        assert!(parse(b"not json").is_err());
    }

    #[tokio::test]
    async fn test_discover() {
        let body = r#"{"elements": [
            {"type": "node", "id": 10, "lat": 20.001, "lon": 78.001, "tags": {"amenity": "hospital"}},
            {"type": "node", "id": 11, "lat": 20.0005, "lon": 78.0005, "tags": {"amenity": "restaurant"}}
        ]}"#;
        let (client, overpass) = overpass(MockHttpClient::new().respond(200, body));
        let points = overpass.discover(&area()).await.unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(client.requested().len(), 1);
    }

    #[tokio::test]
    async fn test_discover_http_error() {
        let (_, overpass) = overpass(MockHttpClient::new().respond(500, "busy"));
        match overpass.discover(&area()).await {
            Err(DiscoveryError::Status(500)) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_discover_network_error() {
        let (_, overpass) = overpass(MockHttpClient::new().fail("connection refused"));
        match overpass.discover(&area()).await {
            Err(DiscoveryError::Transport(message)) => assert!(message.contains("refused")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
