use havengeo::{Coordinate, Route};
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Serialize;

use crate::http::HttpClient;
use crate::osrm::{Osrm, RouteError};
use crate::{Event, EventSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionState {
    Idle,
    Requesting,
    Active,
}

/// Identifies one route request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

#[derive(Debug)]
pub enum Resolution {
    /// The route is now the active route.
    Active(Route),
    /// A clear arrived while the request was in flight; its route was thrown away.
    Cleared,
    /// A newer request was issued meanwhile; only its result counts.
    Superseded,
    Failed(RouteError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearOutcome {
    Removed,
    /// Applied when the in-flight request resolves.
    Deferred,
    NothingToClear,
}

/// The route slot and its state machine, without any I/O.
#[derive(Debug, Default)]
pub struct Selection {
    issued: u64,
    pending: Option<u64>,
    clear_pending: bool,
    active: Option<Route>,
    destination: Option<Coordinate>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SelectionState {
        match (self.pending, &self.active) {
            (Some(_), _) => SelectionState::Requesting,
            (None, Some(_)) => SelectionState::Active,
            (None, None) => SelectionState::Idle,
        }
    }

    pub fn active(&self) -> Option<&Route> {
        self.active.as_ref()
    }

    pub fn destination(&self) -> Option<Coordinate> {
        self.destination
    }

    /// Issues a request. Any active route is discarded right away and returned,
    /// and an earlier pending clear no longer applies.
    pub fn select(&mut self, destination: Coordinate) -> (Ticket, Option<Route>) {
        self.issued += 1;
        self.pending = Some(self.issued);
        self.clear_pending = false;
        self.destination = Some(destination);
        (Ticket(self.issued), self.active.take())
    }

    pub fn resolve(&mut self, ticket: Ticket, result: Result<Route, RouteError>) -> Resolution {
        if self.pending != Some(ticket.0) {
            debug!("route request {} superseded", ticket.0);
            return Resolution::Superseded;
        }
        self.pending = None;
        if self.clear_pending {
            self.clear_pending = false;
            self.destination = None;
            return Resolution::Cleared;
        }
        match result {
            Ok(route) => {
                self.active = Some(route.clone());
                Resolution::Active(route)
            }
            Err(e) => {
                self.destination = None;
                Resolution::Failed(e)
            }
        }
    }

    pub fn clear(&mut self) -> ClearOutcome {
        if self.pending.is_some() {
            self.clear_pending = true;
            return ClearOutcome::Deferred;
        }
        self.destination = None;
        match self.active.take() {
            Some(_) => ClearOutcome::Removed,
            None => ClearOutcome::NothingToClear,
        }
    }
}

/// Turns destination picks into route requests and owns the active route.
pub struct SelectionCoordinator<C: HttpClient> {
    router: Osrm<C>,
    slot: Mutex<Selection>,
    events: EventSink,
}

impl<C: HttpClient> SelectionCoordinator<C> {
    pub fn new(router: Osrm<C>, events: EventSink) -> Self {
        Self {
            router,
            slot: Mutex::new(Selection::new()),
            events,
        }
    }

    pub fn state(&self) -> SelectionState {
        self.slot.lock().state()
    }

    pub fn active_route(&self) -> Option<Route> {
        self.slot.lock().active().cloned()
    }

    pub async fn select_destination(&self, destination: Coordinate) -> Resolution {
        let (ticket, discarded) = self.slot.lock().select(destination);
        if discarded.is_some() {
            self.emit(Event::RouteRemoved);
        }
        self.emit(Event::Status(format!("Requesting route to {}", destination)));

        let result = self.router.route(&destination).await;

        let resolution = self.slot.lock().resolve(ticket, result);
        match &resolution {
            Resolution::Active(route) => {
                info!("Route to {}: {}", destination, route.summary());
                self.emit(Event::RouteAdded(route.clone()));
                self.emit(Event::Status(format!("Route: {}", route.summary())));
            }
            Resolution::Cleared => {
                info!("Route to {} discarded, cleared while requesting", destination);
                self.emit(Event::Status("Route cleared".to_string()));
            }
            Resolution::Superseded => {}
            Resolution::Failed(e) => {
                warn!("Route to {} failed: {}", destination, e);
                self.emit(Event::Status(failure_message(e)));
            }
        }
        resolution
    }

    pub fn clear_route(&self) -> ClearOutcome {
        let outcome = self.slot.lock().clear();
        match outcome {
            ClearOutcome::Removed => {
                self.emit(Event::RouteRemoved);
                self.emit(Event::Status("Route cleared".to_string()));
            }
            ClearOutcome::Deferred => {
                self.emit(Event::Status("Route will be cleared when the request completes".to_string()));
            }
            ClearOutcome::NothingToClear => {}
        }
        outcome
    }

    fn emit(&self, event: Event) {
        // the presentation side may have gone away
        let _ = self.events.send(event);
    }
}

fn failure_message(e: &RouteError) -> String {
    match e {
        RouteError::NoOrigin => "Location not available yet, cannot route".to_string(),
        RouteError::NoRouteFound => "No route found".to_string(),
        e => format!("Route unavailable: {}", e),
    }
}
