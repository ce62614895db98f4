use std::collections::BTreeSet;
use std::sync::Arc;

use havengeo::{Category, Coordinate, InvalidCoordinate, Position, RadiusQuery, Route};
use log::{debug, info, warn};
use serde::Serialize;
use thiserror::Error;

pub use geojson::FeatureCollection;

pub use crate::config::{Config, ConfigError};
pub use crate::events::{Event, EventSink, Events};
pub use crate::http::{HttpClient, HttpResponse, ReqwestClient, TransportError};
pub use crate::osrm::{Osrm, RouteError};
pub use crate::overpass::{build_query, DiscoveryError, Overpass};
pub use crate::ranking::{rank_and_filter, to_feature_collection, RankedPoint};
pub use crate::selection::{ClearOutcome, Resolution, Selection, SelectionCoordinator, SelectionState};
pub use crate::tracker::{
    ChannelLocation, FixedLocation, LocationError, LocationProvider, LocationTracker, NoLocation, PositionFeed,
    PositionReader, Subscription, WatchOptions,
};

use crate::cycle::Cycles;

pub mod config;
mod cycle;
pub mod events;
pub mod http;
pub mod osrm;
pub mod overpass;
pub mod ranking;
pub mod selection;
pub mod tracker;

#[derive(Error, Debug)]
pub enum Error {
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("http: {0}")]
    Transport(#[from] TransportError),
    #[error("{0}")]
    Location(#[from] LocationError),
    #[error("{0}")]
    Discovery(#[from] DiscoveryError),
    #[error("{0}")]
    Route(#[from] RouteError),
    #[error("{0}")]
    Coordinate(#[from] InvalidCoordinate),
    #[error("no point of interest `{0}` in the current results")]
    UnknownPoint(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Outcome of one discovery cycle as seen by its caller. Failures come back
/// as an empty list plus a status message.
#[derive(Serialize, Debug, Clone)]
pub struct Nearby {
    pub points: Vec<RankedPoint>,
    pub status: String,
    /// False when a newer cycle superseded this one and its outcome was dropped.
    pub applied: bool,
}

impl Nearby {
    fn unapplied(status: String) -> Self {
        Self {
            points: vec![],
            status,
            applied: false,
        }
    }
}

pub struct Engine<C: HttpClient = ReqwestClient> {
    tracker: LocationTracker,
    overpass: Overpass<C>,
    selection: SelectionCoordinator<C>,
    cycles: Cycles,
    events: EventSink,
    radius_m: u32,
    categories: BTreeSet<Category>,
}

impl Engine<ReqwestClient> {
    pub fn from_config(config: &Config) -> Result<(Self, Events), Error> {
        let client = ReqwestClient::new(&config.user_agent, config.http_timeout)?;
        Ok(Self::with_client(config, Arc::new(client)))
    }
}

impl<C: HttpClient> Engine<C> {
    pub fn with_client(config: &Config, client: Arc<C>) -> (Self, Events) {
        let (events, rx) = events::channel();
        let tracker = LocationTracker::new(config.watch);
        let overpass = Overpass::new(client.clone(), config.overpass_url.clone());
        let router = Osrm::new(client, config.osrm_url.clone(), tracker.positions());
        let engine = Self {
            selection: SelectionCoordinator::new(router, events.clone()),
            tracker,
            overpass,
            cycles: Cycles::new(),
            events,
            radius_m: config.radius_m,
            categories: config.categories.clone(),
        };
        (engine, rx)
    }

    /// Starts feeding `provider` into the current position. Location errors
    /// show up as status events; tracking stops when the subscription drops.
    pub fn track<P: LocationProvider + ?Sized>(&self, provider: &P) -> Subscription {
        let events = self.events.clone();
        let on_error = move |e: &LocationError| {
            let message = match e {
                LocationError::Unsupported => "Location is not supported on this device".to_string(),
                e => format!("Location unavailable: {}", e),
            };
            let _ = events.send(Event::Status(message));
        };
        self.tracker
            .start_tracking(provider, |p| debug!("now at {}", p.coord), on_error)
    }

    pub fn current_position(&self) -> Result<Position, LocationError> {
        self.tracker.current_position()
    }

    pub fn positions(&self) -> PositionReader {
        self.tracker.positions()
    }

    /// Runs one discovery cycle around the current position. `None` picks
    /// the configured radius or categories.
    pub async fn refresh_nearby(&self, radius_m: Option<u32>, categories: Option<&BTreeSet<Category>>) -> Nearby {
        let categories = categories.unwrap_or(&self.categories);
        if categories.iter().all(|c| *c == Category::Unknown) {
            let generation = self.cycles.begin("Searching");
            let message = "No categories selected".to_string();
            let applied = self.cycles.complete(generation, vec![], message.clone());
            if applied {
                self.emit(Event::Nearby(vec![]));
                self.emit(Event::Status(message.clone()));
            }
            return Nearby {
                points: vec![],
                status: message,
                applied,
            };
        }

        let position = match self.tracker.current_position() {
            Ok(p) => p,
            Err(e) => {
                warn!("Cannot search: {}", e);
                let message = "Location not available yet".to_string();
                self.cycles.set_message(&message);
                self.emit(Event::Status(message.clone()));
                return Nearby::unapplied(message);
            }
        };

        let area = RadiusQuery::new(position.coord, radius_m.unwrap_or(self.radius_m) as i64);
        let searching = "Searching for emergency services...";
        let generation = self.cycles.begin(searching);
        self.emit(Event::Status(searching.to_string()));
        info!("Cycle {}: {} m around {}", generation, area.radius_m, area.center);

        match self.overpass.discover(&area).await {
            Ok(points) => {
                let ranked = rank_and_filter(&points, &position.coord, categories);
                let message = match ranked.len() {
                    0 => "No emergency services found nearby".to_string(),
                    1 => "Found 1 emergency service".to_string(),
                    n => format!("Found {} emergency services", n),
                };
                let applied = self.cycles.complete(generation, ranked.clone(), message.clone());
                if applied {
                    self.emit(Event::Nearby(ranked.clone()));
                    self.emit(Event::Status(message.clone()));
                }
                Nearby {
                    points: ranked,
                    status: message,
                    applied,
                }
            }
            Err(e) => {
                warn!("Cycle {} failed: {}", generation, e);
                let message = format!("Could not load emergency services: {}", e);
                let applied = self.cycles.fail(generation, message.clone());
                if applied {
                    self.emit(Event::Status(message.clone()));
                }
                Nearby {
                    points: vec![],
                    status: message,
                    applied,
                }
            }
        }
    }

    /// The last successfully discovered result set.
    pub fn nearby(&self) -> Vec<RankedPoint> {
        self.cycles.points()
    }

    /// Latest discovery status message.
    pub fn status(&self) -> String {
        self.cycles.message()
    }

    pub async fn select_destination(&self, destination: Coordinate) -> Resolution {
        self.selection.select_destination(destination).await
    }

    /// Routes to a point of the displayed result set.
    pub async fn select_point(&self, id: &str) -> Result<Resolution, Error> {
        let point = self
            .cycles
            .points()
            .into_iter()
            .find(|r| r.point.id == id)
            .ok_or_else(|| Error::UnknownPoint(id.to_string()))?;
        info!("Selected {}", point.point);
        Ok(self.selection.select_destination(point.point.coord).await)
    }

    pub fn clear_route(&self) -> ClearOutcome {
        self.selection.clear_route()
    }

    pub fn selection_state(&self) -> SelectionState {
        self.selection.state()
    }

    pub fn active_route(&self) -> Option<Route> {
        self.selection.active_route()
    }

    fn emit(&self, event: Event) {
        let _ = self.events.send(event);
    }
}
