#[macro_use]
extern crate rocket;

use std::collections::BTreeSet;

use haven::{
    to_feature_collection, ChannelLocation, ClearOutcome, Config, Engine, Events, Nearby, PositionFeed, Resolution,
    RouteError, SelectionState, Subscription,
};
use haven::FeatureCollection;
use havengeo::{parse_radius, Category, Coordinate, Position, Route};
use log::{debug, warn};
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{Build, Rocket, State};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("config: {0}")]
    Config(#[from] haven::ConfigError),
    #[error("haven: {0}")]
    Haven(#[from] haven::Error),
    #[error("rocket: {0}")]
    Rocket(#[from] rocket::Error),
}

/// Engine plus the feed the browser pushes its position into.
struct Haven {
    engine: Engine,
    feed: PositionFeed,
    _tracking: Subscription,
}

#[derive(Serialize)]
struct Overview {
    status: String,
    selection: SelectionState,
    position: Option<Position>,
    results: usize,
}

#[derive(Deserialize)]
struct PositionInput {
    lat: f64,
    lon: f64,
    accuracy: Option<f64>,
}

#[derive(Serialize)]
struct RouteView {
    state: SelectionState,
    route: Option<Route>,
    message: Option<String>,
}

#[rocket::main]
async fn main() -> Result<(), Error> {
    env_logger::init();

    let config = Config::from_env()?;
    let _rocket = rocket(&config)?.launch().await?;

    Ok(())
}

fn rocket(config: &Config) -> Result<Rocket<Build>, haven::Error> {
    let (engine, events) = Engine::from_config(config)?;
    let (feed, provider) = ChannelLocation::new();
    let tracking = engine.track(&provider);
    tokio::spawn(log_events(events));

    Ok(rocket::build()
        .manage(Haven {
            engine,
            feed,
            _tracking: tracking,
        })
        .mount(
            "/",
            routes![
                index,
                position,
                nearby,
                nearby_geojson,
                route,
                route_to,
                route_to_point,
                clear_route
            ],
        ))
}

async fn log_events(mut events: Events) {
    while let Some(event) = events.recv().await {
        match serde_json::to_string(&event) {
            Ok(json) => debug!("event {}", json),
            Err(e) => warn!("unprintable event: {}", e),
        }
    }
}

#[get("/")]
fn index(haven: &State<Haven>) -> Json<Overview> {
    Json(Overview {
        status: haven.engine.status(),
        selection: haven.engine.selection_state(),
        position: haven.engine.current_position().ok(),
        results: haven.engine.nearby().len(),
    })
}

#[post("/position", data = "<input>")]
fn position(input: Json<PositionInput>, haven: &State<Haven>) -> (Status, String) {
    let coord = match Coordinate::new(input.lat, input.lon) {
        Ok(coord) => coord,
        Err(e) => return (Status::UnprocessableEntity, e.to_string()),
    };
    match haven
        .feed
        .send(Ok(Position::now(coord, input.accuracy.unwrap_or(0.0))))
    {
        Ok(()) => (Status::Accepted, coord.to_string()),
        Err(_) => (Status::ServiceUnavailable, "location tracking stopped".to_string()),
    }
}

#[get("/nearby?<radius>&<category>")]
async fn nearby(
    radius: Option<String>,
    category: Option<String>,
    haven: &State<Haven>,
) -> Result<Json<Nearby>, (Status, String)> {
    let categories = category
        .map(|c| Category::parse_list::<BTreeSet<Category>>(&c))
        .transpose()
        .map_err(|e| (Status::BadRequest, e.to_string()))?;
    let nearby = haven
        .engine
        .refresh_nearby(radius.as_deref().map(parse_radius), categories.as_ref())
        .await;
    Ok(Json(nearby))
}

#[get("/nearby.geojson")]
fn nearby_geojson(haven: &State<Haven>) -> Json<FeatureCollection> {
    Json(to_feature_collection(&haven.engine.nearby()))
}

#[get("/route")]
fn route(haven: &State<Haven>) -> Json<RouteView> {
    Json(RouteView {
        state: haven.engine.selection_state(),
        route: haven.engine.active_route(),
        message: None,
    })
}

#[post("/route", data = "<destination>")]
async fn route_to(destination: Json<Coordinate>, haven: &State<Haven>) -> (Status, Json<RouteView>) {
    let destination = match Coordinate::new(destination.lat, destination.lon) {
        Ok(c) => c,
        Err(e) => return view(haven, Status::UnprocessableEntity, Some(e.to_string())),
    };
    let resolution = haven.engine.select_destination(destination).await;
    respond(haven, resolution)
}

/// Points are addressed by their `<type>/<id>`.
#[post("/route/<kind>/<number>")]
async fn route_to_point(kind: &str, number: &str, haven: &State<Haven>) -> (Status, Json<RouteView>) {
    let id = format!("{}/{}", kind, number);
    match haven.engine.select_point(&id).await {
        Ok(resolution) => respond(haven, resolution),
        Err(e) => view(haven, Status::NotFound, Some(e.to_string())),
    }
}

#[delete("/route")]
fn clear_route(haven: &State<Haven>) -> Json<ClearOutcome> {
    Json(haven.engine.clear_route())
}

fn respond(haven: &Haven, resolution: Resolution) -> (Status, Json<RouteView>) {
    match resolution {
        Resolution::Active(_) => view(haven, Status::Ok, None),
        Resolution::Cleared => view(haven, Status::Ok, Some("route cleared".to_string())),
        Resolution::Superseded => view(haven, Status::Ok, Some("superseded by a newer request".to_string())),
        Resolution::Failed(e) => {
            let status = match e {
                RouteError::NoOrigin => Status::Conflict,
                RouteError::NoRouteFound => Status::NotFound,
                _ => Status::BadGateway,
            };
            view(haven, status, Some(e.to_string()))
        }
    }
}

fn view(haven: &Haven, status: Status, message: Option<String>) -> (Status, Json<RouteView>) {
    (
        status,
        Json(RouteView {
            state: haven.engine.selection_state(),
            route: haven.engine.active_route(),
            message,
        }),
    )
}
