use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use haven::{
    to_feature_collection, ChannelLocation, Config, Engine, Error, Event, Events, FixedLocation, PositionFeed,
    RankedPoint, Resolution,
};
use havengeo::{parse_radius, Category, Coordinate, Position};
use log::{debug, info};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(name = "haven", version, about = "Find and route to nearby emergency services")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List emergency services around a point, nearest first
    Nearby {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        /// Search radius in meters
        #[arg(long)]
        radius: Option<String>,
        /// hospital, police, fire or shelter; repeatable
        #[arg(long = "category")]
        categories: Vec<Category>,
        /// Print a GeoJSON FeatureCollection instead of a table
        #[arg(long)]
        geojson: bool,
    },
    /// Driving route between two points given as `lat,lon`
    Route {
        #[arg(long, allow_hyphen_values = true)]
        from: Coordinate,
        #[arg(long, allow_hyphen_values = true)]
        to: Coordinate,
        #[arg(long)]
        geojson: bool,
    },
    /// Read commands from stdin: pos, find, route, to, clear, status, quit
    Interactive,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    debug!("{:?}", config);

    match cli.command {
        Command::Nearby {
            lat,
            lon,
            radius,
            categories,
            geojson,
        } => {
            let here = Coordinate::new(lat, lon)?;
            let (engine, _events) = Engine::from_config(&config)?;
            let _subscription = locate(&engine, here).await?;
            let categories: BTreeSet<Category> = categories.into_iter().collect();
            let nearby = engine
                .refresh_nearby(
                    radius.as_deref().map(parse_radius),
                    (!categories.is_empty()).then_some(&categories),
                )
                .await;
            if geojson {
                println!("{}", serde_json::to_string(&to_feature_collection(&nearby.points))?);
            } else {
                eprintln!("{}", nearby.status);
                print_points(&nearby.points);
            }
        }
        Command::Route { from, to, geojson } => {
            let (engine, _events) = Engine::from_config(&config)?;
            let _subscription = locate(&engine, from).await?;
            match engine.select_destination(to).await {
                Resolution::Active(route) if geojson => println!("{}", serde_json::to_string(&route.to_feature())?),
                Resolution::Active(route) => println!("{}", route.summary()),
                Resolution::Failed(e) => return Err(e.into()),
                other => info!("route request ended with {:?}", other),
            }
        }
        Command::Interactive => interactive(&config).await?,
    }

    Ok(())
}

/// Pins the engine's position to `here` and waits until it is known.
async fn locate(engine: &Engine, here: Coordinate) -> Result<haven::Subscription, Error> {
    let mut reader = engine.positions();
    let subscription = engine.track(&FixedLocation {
        coord: here,
        accuracy: 0.0,
        interval: Duration::from_secs(60),
    });
    reader.changed().await?;
    Ok(subscription)
}

fn print_points(points: &[RankedPoint]) {
    for (i, r) in points.iter().enumerate() {
        println!(
            "{:>3}. {:<9} {:>7.0} m  {} ({})",
            i + 1,
            r.point.category.label(),
            r.distance_m,
            r.point.display_name(),
            r.point.id
        );
    }
}

async fn interactive(config: &Config) -> Result<(), Error> {
    let (engine, events) = Engine::from_config(config)?;
    let engine = Arc::new(engine);
    let (feed, provider) = ChannelLocation::new();
    let _subscription = engine.track(&provider);
    tokio::spawn(print_events(events));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let mut words = line.split_whitespace();
        match (words.next(), words.next()) {
            (Some("pos"), Some(coord)) => position(&feed, coord, words.next()),
            (Some("find"), radius) => {
                let categories = words.next().map(Category::parse_list::<BTreeSet<Category>>);
                match categories {
                    Some(Err(e)) => println!("{}", e),
                    Some(Ok(categories)) => {
                        let nearby = engine.refresh_nearby(radius.map(parse_radius), Some(&categories)).await;
                        print_points(&nearby.points);
                    }
                    None => {
                        let nearby = engine.refresh_nearby(radius.map(parse_radius), None).await;
                        print_points(&nearby.points);
                    }
                }
            }
            (Some("route"), Some(n)) => {
                let id = n
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| engine.nearby().get(n.wrapping_sub(1)).map(|r| r.point.id.clone()));
                match id {
                    Some(id) => {
                        // in the background, so `clear` can arrive while it runs
                        let engine = engine.clone();
                        tokio::spawn(async move { engine.select_point(&id).await });
                    }
                    None => println!("no result #{}", n),
                }
            }
            (Some("to"), Some(coord)) => match coord.parse::<Coordinate>() {
                Ok(destination) => {
                    let engine = engine.clone();
                    tokio::spawn(async move { engine.select_destination(destination).await });
                }
                Err(e) => println!("{}", e),
            },
            (Some("clear"), None) => {
                engine.clear_route();
            }
            (Some("status"), None) => println!("{} ({:?})", engine.status(), engine.selection_state()),
            (Some("quit"), None) => break,
            (None, _) => {}
            _ => println!("commands: pos <lat,lon> [accuracy] | find [radius] [categories] | route <n> | to <lat,lon> | clear | status | quit"),
        }
    }
    Ok(())
}

fn position(feed: &PositionFeed, coord: &str, accuracy: Option<&str>) {
    match coord.parse::<Coordinate>() {
        Ok(coord) => {
            let accuracy = accuracy.and_then(|a| a.parse().ok()).unwrap_or(0.0);
            let _ = feed.send(Ok(Position::now(coord, accuracy)));
        }
        Err(e) => println!("{}", e),
    }
}

async fn print_events(mut events: Events) {
    while let Some(event) = events.recv().await {
        match event {
            Event::Status(message) => println!("> {}", message),
            Event::Nearby(points) => println!("> {} results", points.len()),
            Event::RouteAdded(route) => println!("> route: {} ({} points)", route.summary(), route.geometry.len()),
            Event::RouteRemoved => println!("> route removed"),
        }
    }
}
