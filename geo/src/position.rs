use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Coordinate;

/// A single location reading. Each new reading supersedes the previous one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub coord: Coordinate,
    /// meters, never negative
    pub accuracy: f64,
    pub timestamp: DateTime<Utc>,
}

impl Position {
    pub fn new(coord: Coordinate, accuracy: f64, timestamp: DateTime<Utc>) -> Self {
        let accuracy = if accuracy.is_finite() { accuracy.max(0.0) } else { 0.0 };
        Self {
            coord,
            accuracy,
            timestamp,
        }
    }

    pub fn now(coord: Coordinate, accuracy: f64) -> Self {
        Self::new(coord, accuracy, Utc::now())
    }

    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accuracy_is_clamped() {
        let c = Coordinate { lat: 1.0, lon: 2.0 };
        assert_eq!(Position::now(c, -3.0).accuracy, 0.0);
        assert_eq!(Position::now(c, f64::NAN).accuracy, 0.0);
        assert_eq!(Position::now(c, 12.5).accuracy, 12.5);
    }

    #[test]
    fn test_age() {
        let ts = Utc::now();
        let p = Position::new(Coordinate { lat: 0.0, lon: 0.0 }, 5.0, ts);
        assert_eq!(p.age(ts + chrono::Duration::seconds(3)).num_seconds(), 3);
    }
}
