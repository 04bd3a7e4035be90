//! Flights along a precomputed approach or departure path.

use crate::identifiers::FlightIdentifier;

/// A flight visible within the simulated area.
///
/// `acceleration` is positive for departures (accelerating from the runway)
/// and negative for arrivals (decelerating onto it).
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
pub struct Flight {
    pub id: FlightIdentifier,
    /// Path length in km
    pub length: f64,
    /// km per millisecond
    pub max_speed: f64,
    /// km per millisecond squared, signed
    pub acceleration: f64,
    /// When the flight starts moving along its path
    pub start: f64,
    /// When the flight becomes visible
    pub entry: f64,
    /// When the flight is removed
    pub end: f64,
}

impl Flight {
    pub fn is_visible_at(&self, now: f64) -> bool {
        self.entry <= now && now <= self.end
    }
}
