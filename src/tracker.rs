use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt};
use havengeo::{Coordinate, Position};
use log::{debug, info, warn};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocationError {
    #[error("location tracking is not supported on this platform")]
    Unsupported,
    #[error("location error: {0}")]
    Failed(String),
    #[error("current location not available yet")]
    NotAvailable,
}

/// Continuous position updates: accuracy over latency, and a cached reading
/// younger than `maximum_age` is good enough.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchOptions {
    pub high_accuracy: bool,
    pub maximum_age: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            maximum_age: Duration::from_secs(5),
        }
    }
}

pub type Readings = BoxStream<'static, Result<Position, LocationError>>;

pub trait LocationProvider: Send + Sync {
    /// `None` when the platform cannot deliver positions at all.
    fn watch(&self, options: &WatchOptions) -> Option<Readings>;
}

/// A platform without any location capability.
pub struct NoLocation;

impl LocationProvider for NoLocation {
    fn watch(&self, _options: &WatchOptions) -> Option<Readings> {
        None
    }
}

/// Reports the same coordinate every `interval`.
pub struct FixedLocation {
    pub coord: Coordinate,
    pub accuracy: f64,
    pub interval: Duration,
}

impl LocationProvider for FixedLocation {
    fn watch(&self, options: &WatchOptions) -> Option<Readings> {
        let coord = self.coord;
        let accuracy = self.accuracy;
        let interval = self.interval;
        let maximum_age =
            chrono::Duration::from_std(options.maximum_age).unwrap_or_else(|_| chrono::Duration::zero());
        let readings = stream::unfold(None::<Position>, move |cached| async move {
            if cached.is_some() {
                tokio::time::sleep(interval).await;
            }
            let now = Utc::now();
            let position = match cached {
                Some(p) if p.age(now) < maximum_age => p,
                _ => Position::new(coord, accuracy, now),
            };
            Some((Ok(position.clone()), Some(position)))
        });
        Some(readings.boxed())
    }
}

pub type PositionFeed = mpsc::UnboundedSender<Result<Position, LocationError>>;

/// Readings pushed from elsewhere (a browser, stdin, a test). The stream can
/// be watched once.
pub struct ChannelLocation {
    rx: Mutex<Option<mpsc::UnboundedReceiver<Result<Position, LocationError>>>>,
}

impl ChannelLocation {
    pub fn new() -> (PositionFeed, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx: Mutex::new(Some(rx)) })
    }
}

impl LocationProvider for ChannelLocation {
    fn watch(&self, _options: &WatchOptions) -> Option<Readings> {
        match self.rx.lock().take() {
            Some(rx) => {
                let readings = stream::unfold(rx, |mut rx| async move {
                    rx.recv().await.map(|reading| (reading, rx))
                });
                Some(readings.boxed())
            }
            None => {
                warn!("position channel is already being watched");
                Some(stream::empty().boxed())
            }
        }
    }
}

/// Read side of the current position slot.
#[derive(Clone)]
pub struct PositionReader {
    rx: watch::Receiver<Option<Position>>,
}

impl PositionReader {
    pub fn current(&self) -> Result<Position, LocationError> {
        self.rx.borrow().clone().ok_or(LocationError::NotAvailable)
    }

    /// Waits for the next accepted reading.
    pub async fn changed(&mut self) -> Result<Position, LocationError> {
        self.rx
            .changed()
            .await
            .map_err(|_| LocationError::NotAvailable)?;
        self.current()
    }
}

/// Ends the subscription when dropped.
pub struct Subscription {
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }

    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Owns the single "current position" slot.
pub struct LocationTracker {
    current: Arc<watch::Sender<Option<Position>>>,
    options: WatchOptions,
}

impl LocationTracker {
    pub fn new(options: WatchOptions) -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            current: Arc::new(tx),
            options,
        }
    }

    pub fn positions(&self) -> PositionReader {
        PositionReader {
            rx: self.current.subscribe(),
        }
    }

    pub fn current_position(&self) -> Result<Position, LocationError> {
        self.current
            .borrow()
            .clone()
            .ok_or(LocationError::NotAvailable)
    }

    /// Handles readings one at a time, in arrival order. Errors are reported
    /// and tracking carries on; a reading older than the current position is
    /// ignored. Must be called within a tokio runtime.
    pub fn start_tracking<P, U, E>(&self, provider: &P, mut on_update: U, mut on_error: E) -> Subscription
    where
        P: LocationProvider + ?Sized,
        U: FnMut(&Position) + Send + 'static,
        E: FnMut(&LocationError) + Send + 'static,
    {
        let Some(mut readings) = provider.watch(&self.options) else {
            warn!("Location tracking unsupported");
            on_error(&LocationError::Unsupported);
            return Subscription { handle: None };
        };
        info!(
            "Tracking location (high accuracy: {}, maximum age: {:?})",
            self.options.high_accuracy, self.options.maximum_age
        );
        let current = self.current.clone();
        let handle = tokio::spawn(async move {
            while let Some(reading) = readings.next().await {
                match reading {
                    Ok(position) => {
                        let outdated = current
                            .borrow()
                            .as_ref()
                            .map_or(false, |p| position.timestamp < p.timestamp);
                        if outdated {
                            debug!("ignoring outdated reading from {}", position.timestamp);
                            continue;
                        }
                        debug!("position {} ±{} m", position.coord, position.accuracy);
                        current.send_replace(Some(position.clone()));
                        on_update(&position);
                    }
                    Err(e) => {
                        warn!("{}", e);
                        on_error(&e);
                    }
                }
            }
            debug!("position stream ended");
        });
        Subscription {
            handle: Some(handle),
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    /// A tracker whose current position is already `coord`.
    pub async fn tracker_at(coord: Coordinate) -> (LocationTracker, Subscription) {
        let tracker = LocationTracker::new(WatchOptions::default());
        let (feed, provider) = ChannelLocation::new();
        let mut reader = tracker.positions();
        let subscription = tracker.start_tracking(&provider, |_| {}, |_| {});
        feed.send(Ok(Position::now(coord, 5.0))).unwrap();
        reader.changed().await.unwrap();
        (tracker, subscription)
    }

    #[tokio::test]
    async fn test_unsupported() {
        let tracker = LocationTracker::new(WatchOptions::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscription = tracker.start_tracking(
            &NoLocation,
            |_| panic!("no update expected"),
            move |e| tx.send(e.clone()).unwrap(),
        );
        assert_eq!(rx.recv().await, Some(LocationError::Unsupported));
        assert!(!subscription.is_active());
        assert_eq!(tracker.current_position(), Err(LocationError::NotAvailable));
    }

    #[tokio::test]
    async fn test_updates_replace_position_and_survive_errors() {
        let tracker = LocationTracker::new(WatchOptions::default());
        let (feed, provider) = ChannelLocation::new();
        let (update_tx, mut updates) = mpsc::unbounded_channel();
        let (error_tx, mut errors) = mpsc::unbounded_channel();
        let subscription = tracker.start_tracking(
            &provider,
            move |p| update_tx.send(p.clone()).unwrap(),
            move |e| error_tx.send(e.clone()).unwrap(),
        );
        assert!(subscription.is_active());

        let first = Position::now(Coordinate { lat: 20.0, lon: 78.0 }, 10.0);
        feed.send(Ok(first.clone())).unwrap();
        assert_eq!(updates.recv().await, Some(first.clone()));
        assert_eq!(tracker.current_position(), Ok(first));

        feed.send(Err(LocationError::Failed("timeout expired".to_string()))).unwrap();
        assert_eq!(
            errors.recv().await,
            Some(LocationError::Failed("timeout expired".to_string()))
        );

        let second = Position::now(Coordinate { lat: 20.01, lon: 78.01 }, 4.0);
        feed.send(Ok(second.clone())).unwrap();
        assert_eq!(updates.recv().await, Some(second.clone()));
        assert_eq!(tracker.current_position(), Ok(second));
    }

    #[tokio::test]
    async fn test_outdated_reading_ignored() {
        let tracker = LocationTracker::new(WatchOptions::default());
        let (feed, provider) = ChannelLocation::new();
        let (update_tx, mut updates) = mpsc::unbounded_channel();
        let _subscription = tracker.start_tracking(&provider, move |p| update_tx.send(p.clone()).unwrap(), |_| {});

        let now = Utc::now();
        let fresh = Position::new(Coordinate { lat: 1.0, lon: 1.0 }, 5.0, now);
        let old = Position::new(Coordinate { lat: 2.0, lon: 2.0 }, 5.0, now - chrono::Duration::seconds(30));
        let newer = Position::new(Coordinate { lat: 3.0, lon: 3.0 }, 5.0, now + chrono::Duration::seconds(1));
        feed.send(Ok(fresh.clone())).unwrap();
        feed.send(Ok(old)).unwrap();
        feed.send(Ok(newer.clone())).unwrap();

        assert_eq!(updates.recv().await, Some(fresh));
        assert_eq!(updates.recv().await, Some(newer.clone()));
        assert_eq!(tracker.current_position(), Ok(newer));
    }

    #[tokio::test]
    async fn test_channel_watched_once() {
        let (_feed, provider) = ChannelLocation::new();
        let options = WatchOptions::default();
        assert!(provider.watch(&options).is_some());
        let mut second = provider.watch(&options).unwrap();
        assert!(second.next().await.is_none());
    }

    #[tokio::test]
    async fn test_fixed_location_reuses_fresh_reading() {
        let provider = FixedLocation {
            coord: Coordinate { lat: 51.34, lon: 12.37 },
            accuracy: 8.0,
            interval: Duration::from_millis(5),
        };
        let cached = WatchOptions {
            high_accuracy: true,
            maximum_age: Duration::from_secs(3600),
        };
        let readings: Vec<_> = provider.watch(&cached).unwrap().take(2).collect().await;
        let (a, b) = (readings[0].clone().unwrap(), readings[1].clone().unwrap());
        assert_eq!(a.timestamp, b.timestamp);

        let uncached = WatchOptions {
            high_accuracy: true,
            maximum_age: Duration::ZERO,
        };
        let readings: Vec<_> = provider.watch(&uncached).unwrap().take(2).collect().await;
        let (a, b) = (readings[0].clone().unwrap(), readings[1].clone().unwrap());
        assert!(b.timestamp > a.timestamp);
        assert_eq!(b.coord, Coordinate { lat: 51.34, lon: 12.37 });
    }

    #[tokio::test]
    async fn test_reader_sees_changes() {
        let (tracker, _subscription) = tracker_at(Coordinate { lat: 20.0, lon: 78.0 }).await;
        let reader = tracker.positions();
        assert_eq!(reader.current().unwrap().coord, Coordinate { lat: 20.0, lon: 78.0 });
    }
}
