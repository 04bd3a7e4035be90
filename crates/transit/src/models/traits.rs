//! Core traits for transit data.
//!
//! These traits define the public interface for transit data.
//! Implementations can be in-memory, database-backed, or remote.

use std::sync::Arc;

use crate::identifiers::*;
use crate::models::{bus::BusTrip, flight::Flight, railway::Railway, station::Station, timetable::Timetable};

// ============================================================================
// Provider Trait
// ============================================================================

/// Provider of a loaded dataset with lookup methods.
///
/// A provider is read-only; a dataset refresh replaces the provider wholesale.
pub trait TransitProvider: Send + Sync {
    // ---- Lookups ----
    fn get_station(&self, id: &StationIdentifier) -> Option<Arc<Station>>;
    fn get_railway(&self, id: &RailwayIdentifier) -> Option<Arc<Railway>>;
    fn get_timetable(&self, id: &TimetableIdentifier) -> Option<Arc<Timetable>>;
    fn get_bus_trip(&self, id: &TripIdentifier) -> Option<Arc<BusTrip>>;
    fn get_flight(&self, id: &FlightIdentifier) -> Option<Arc<Flight>>;

    /// Timetables operated by a train (one train may run several)
    fn timetables_for_train(&self, id: &TrainIdentifier) -> Vec<Arc<Timetable>>;

    // ---- Collections ----
    fn all_stations(&self) -> Vec<Arc<Station>>;
    fn all_railways(&self) -> Vec<Arc<Railway>>;
    fn all_timetables(&self) -> Vec<Arc<Timetable>>;
    fn all_bus_trips(&self) -> Vec<Arc<BusTrip>>;
    fn all_flights(&self) -> Vec<Arc<Flight>>;
}
