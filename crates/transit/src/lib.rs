//! # railtrack-transit
//!
//! Read-only transit data for the railtrack engine.
//!
//! ## Features
//!
//! - **Railways**: ordered stations with precomputed distance offsets
//! - **Timetables**: scheduled runs with through-service links
//! - **Buses and flights**: trips and paths for the other vehicle kinds
//! - **Station lookup**: fuzzy resolution of live feed station names
//! - **Pluggable networking**: implement your own data fetching
//!
//! ## Example
//!
//! ```
//! use railtrack_transit::prelude::*;
//! use geo::Point;
//!
//! let station = Station {
//!     id: StationIdentifier::new("tfl.victoria.940GZZLUBXN"),
//!     name: "Brixton Underground Station".into(),
//!     location: Point::new(-0.1146, 51.4627),
//! };
//!
//! let lookup = StationLookup::from_stations([&station]);
//! assert_eq!(lookup.resolve_name("BRIXTON"), Some(&station.id));
//! ```

pub mod identifiers;
pub mod lookup;
pub mod models;
pub mod network;
pub mod provider;

// Re-exports for convenience
pub mod prelude {
    pub use crate::identifiers::*;
    pub use crate::lookup::{normalize_station_key, StationLookup};
    pub use crate::models::{
        traits::*, types::*, BusTrip, Flight, Railway, Station, Timetable,
    };
    pub use crate::network::traits::*;
    pub use crate::provider::static_provider::StaticTransitProvider;
}

pub use prelude::*;
