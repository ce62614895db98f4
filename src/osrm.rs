use std::sync::Arc;

use havengeo::{Coordinate, Route};
use log::{debug, info, warn};
use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;

use crate::http::HttpClient;
use crate::tracker::PositionReader;

#[derive(Error, Debug)]
pub enum RouteError {
    #[error("current location not available yet")]
    NoOrigin,
    #[error("routing request failed with HTTP status {0}")]
    Status(u16),
    #[error("routing request failed: {0}")]
    Transport(String),
    #[error("malformed routing response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed routing response: route geometry is not a line")]
    Geometry,
    #[error("no route found")]
    NoRouteFound,
}

#[derive(Deserialize, Debug)]
struct OsrmResponse {
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Deserialize, Debug)]
struct OsrmRoute {
    geometry: geojson::Geometry,
    distance: f64,
    duration: f64,
}

/// Driving directions from the current position.
pub struct Osrm<C: HttpClient> {
    client: Arc<C>,
    endpoint: Url,
    positions: PositionReader,
}

impl<C: HttpClient> Osrm<C> {
    pub fn new(client: Arc<C>, endpoint: Url, positions: PositionReader) -> Self {
        Self {
            client,
            endpoint,
            positions,
        }
    }

    /// The routing protocol wants `lon,lat`; this is the only place the axis
    /// order is swapped.
    pub fn url(&self, origin: &Coordinate, destination: &Coordinate) -> Result<Url, RouteError> {
        let base = self.endpoint.as_str().trim_end_matches('/');
        let raw = format!(
            "{}/{},{};{},{}",
            base, origin.lon, origin.lat, destination.lon, destination.lat
        );
        Url::parse_with_params(
            &raw,
            &[("overview", "full"), ("geometries", "geojson"), ("steps", "false")],
        )
        .map_err(|e| RouteError::Transport(e.to_string()))
    }

    pub async fn route(&self, destination: &Coordinate) -> Result<Route, RouteError> {
        let origin = self
            .positions
            .current()
            .map_err(|_| RouteError::NoOrigin)?
            .coord;
        self.route_between(&origin, destination).await
    }

    pub async fn route_between(&self, origin: &Coordinate, destination: &Coordinate) -> Result<Route, RouteError> {
        info!("Routing {} -> {}", origin, destination);
        let response = self
            .client
            .get(self.url(origin, destination)?)
            .await
            .map_err(|e| RouteError::Transport(e.to_string()))?;
        if !response.is_success() {
            warn!("routing status {}", response.status);
            return Err(RouteError::Status(response.status));
        }
        let route = parse(&response.body)?;
        info!("Route {}", route.summary());
        Ok(route)
    }
}

/// Takes the first (best) route of the response.
pub fn parse(body: &[u8]) -> Result<Route, RouteError> {
    let response: OsrmResponse = serde_json::from_slice(body)?;
    debug!("{} routes", response.routes.len());
    let best = response
        .routes
        .into_iter()
        .next()
        .ok_or(RouteError::NoRouteFound)?;
    let line = match best.geometry.value {
        geojson::Value::LineString(line) => line,
        _ => return Err(RouteError::Geometry),
    };
    let geometry = line
        .iter()
        .map(|position| match position.as_slice() {
            [lon, lat, ..] => Coordinate::new(*lat, *lon).map_err(|_| RouteError::Geometry),
            _ => Err(RouteError::Geometry),
        })
        .collect::<Result<Vec<Coordinate>, RouteError>>()?;
    Ok(Route::new(geometry, best.distance, best.duration))
}
