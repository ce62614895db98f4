use serde::Serialize;

use crate::Coordinate;

/// Search radius used when none (or garbage) is given.
pub const DEFAULT_RADIUS_M: u32 = 2000;

/// Everything within `radius_m` meters of `center`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RadiusQuery {
    pub center: Coordinate,
    pub radius_m: u32,
}

impl RadiusQuery {
    pub fn new(center: Coordinate, radius_m: i64) -> Self {
        Self {
            center,
            radius_m: coerce_radius(radius_m),
        }
    }

    /// Takes the radius the way a user typed it.
    pub fn from_input(center: Coordinate, radius: Option<&str>) -> Self {
        Self {
            center,
            radius_m: radius.map(parse_radius).unwrap_or(DEFAULT_RADIUS_M),
        }
    }

    pub fn contains(&self, coord: &Coordinate) -> bool {
        self.center.distance(coord) <= self.radius_m as f64
    }
}

pub fn coerce_radius(radius_m: i64) -> u32 {
    if radius_m > 0 {
        u32::try_from(radius_m).unwrap_or(u32::MAX)
    } else {
        DEFAULT_RADIUS_M
    }
}

/// Leading integer part of the input, like a form field would be read;
/// anything that does not yield a positive integer means the default.
pub fn parse_radius(input: &str) -> u32 {
    match input.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 1.0 => coerce_radius(value.trunc() as i64),
        _ => DEFAULT_RADIUS_M,
    }
}
