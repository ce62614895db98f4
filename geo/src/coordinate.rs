use std::{f64::consts::PI, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvalidCoordinate {
    #[error("latitude {0} outside [-90, 90]")]
    Latitude(f64),
    #[error("longitude {0} outside [-180, 180]")]
    Longitude(f64),
    #[error("cannot parse coordinate `{0}`, expected `lat,lon`")]
    Syntax(String),
}

/// A point on the earth, latitude first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.lat, self.lon)
    }
}

impl FromStr for Coordinate {
    type Err = InvalidCoordinate;

    /// Parses `lat,lon` (whitespace around either number is ignored).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let syntax = || InvalidCoordinate::Syntax(s.to_string());
        let (lat, lon) = s.split_once(',').ok_or_else(syntax)?;
        let lat = lat.trim().parse::<f64>().map_err(|_| syntax())?;
        let lon = lon.trim().parse::<f64>().map_err(|_| syntax())?;
        Self::new(lat, lon)
    }
}

impl Coordinate {
    // radius of earth in meters
    pub const EARTH_RADIUS: f64 = 6_371_000.0;

    pub fn new(lat: f64, lon: f64) -> Result<Self, InvalidCoordinate> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(InvalidCoordinate::Latitude(lat));
        }
        if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
            return Err(InvalidCoordinate::Longitude(lon));
        }
        Ok(Self { lat, lon })
    }

    /// The point `distance` meters away along `bearing` (degrees clockwise
    /// from north). Kept public for dependents placing points at known
    /// distances, such as test fixtures in the engine crate.
    pub fn project(&self, distance: f64, bearing: f64) -> Self {
        // see http://www.movable-type.co.uk/scripts/latlong.html
        // (all angles in radians)
        let lat_rad = self.lat * PI / 180.0;
        let lon_rad = self.lon * PI / 180.0;
        let bearing_rad = bearing * PI / 180.0;
        let angular = distance / Self::EARTH_RADIUS;

        let lat_rad2 = (lat_rad.sin() * angular.cos()
            + lat_rad.cos() * angular.sin() * bearing_rad.cos())
        .asin();
        let lon_rad2 = lon_rad
            + (bearing_rad.sin() * angular.sin() * lat_rad.cos())
                .atan2(angular.cos() - lat_rad.sin() * lat_rad2.sin());

        // The longitude can be normalised to −180…+180 using (lon+540)%360-180
        let lat2 = lat_rad2 * 180.0 / PI;
        let lon2 = (lon_rad2 * 180.0 / PI + 540.0) % 360.0 - 180.0;
        Coordinate {
            lat: lat2,
            lon: lon2,
        }
    }

    /// Great-circle (haversine) distance in meters.
    pub fn distance(&self, other: &Coordinate) -> f64 {
        let lat_rad1 = self.lat * PI / 180.0;
        let lat_rad2 = other.lat * PI / 180.0;
        let delta_lat = (other.lat - self.lat) * PI / 180.0;
        let delta_lon = (other.lon - self.lon) * PI / 180.0;

        let a = (delta_lat / 2.0).sin() * (delta_lat / 2.0).sin()
            + lat_rad1.cos() * lat_rad2.cos() * (delta_lon / 2.0).sin() * (delta_lon / 2.0).sin();
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        Self::EARTH_RADIUS * c // in metres
    }
}

pub fn distance(a: &Coordinate, b: &Coordinate) -> f64 {
    a.distance(b)
}
