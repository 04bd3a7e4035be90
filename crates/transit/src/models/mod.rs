//! Transit data models, types, and traits.

pub mod bus;
pub mod flight;
pub mod railway;
pub mod station;
pub mod timetable;
pub mod traits;
pub mod types;

// Re-exports for convenience
pub use bus::BusTrip;
pub use flight::Flight;
pub use railway::Railway;
pub use station::Station;
pub use timetable::Timetable;
pub use traits::TransitProvider;
pub use types::{RailDirection, Result, StopEvent, TransitError};
