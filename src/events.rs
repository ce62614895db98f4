use havengeo::Route;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::ranking::RankedPoint;

/// What the presentation side gets told. Rendering is its business.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum Event {
    Status(String),
    /// The displayed result set, replaced wholesale.
    Nearby(Vec<RankedPoint>),
    RouteAdded(Route),
    RouteRemoved,
}

pub type EventSink = mpsc::UnboundedSender<Event>;
pub type Events = mpsc::UnboundedReceiver<Event>;

pub fn channel() -> (EventSink, Events) {
    mpsc::unbounded_channel()
}
