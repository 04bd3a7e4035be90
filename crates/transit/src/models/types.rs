//! Core data types and enums for transit data.

use crate::identifiers::*;

// ============================================================================
// Enums
// ============================================================================

/// Direction of travel along a railway's station list.
///
/// Ascending runs towards higher station indices, descending towards lower.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(rename_all = "lowercase"))]
pub enum RailDirection {
    Ascending,
    Descending,
}

impl RailDirection {
    /// Index step taken when moving one station in this direction
    pub fn step(self) -> isize {
        match self {
            Self::Ascending => 1,
            Self::Descending => -1,
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// A single stop in a timetable (arrival/departure at a station)
///
/// Times are milliseconds on the simulation clock's timebase. The first stop
/// usually has no arrival and the last stop no departure.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
pub struct StopEvent {
    pub station_id: StationIdentifier,
    #[cfg_attr(feature = "serde", serde(default))]
    pub arrival: Option<f64>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub departure: Option<f64>,
}

impl StopEvent {
    pub fn new(station_id: StationIdentifier, arrival: Option<f64>, departure: Option<f64>) -> Self {
        Self {
            station_id,
            arrival,
            departure,
        }
    }

    /// Departure time, falling back to the arrival time at terminal stops
    pub fn departure_or_arrival(&self) -> Option<f64> {
        self.departure.or(self.arrival)
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum TransitError {
    #[error("Station not found: {0}")]
    StationNotFound(StationIdentifier),

    #[error("Railway not found: {0}")]
    RailwayNotFound(RailwayIdentifier),

    #[error("Timetable not found: {0}")]
    TimetableNotFound(TimetableIdentifier),

    #[error("Trip not found: {0}")]
    TripNotFound(TripIdentifier),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Fetch failed: {0}")]
    FetchError(String),
}

pub type Result<T> = std::result::Result<T, TransitError>;
