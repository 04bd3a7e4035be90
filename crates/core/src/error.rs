use railtrack_transit::prelude::*;

use crate::vehicle::VehicleRef;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Railway not found: {0}")]
    UnknownRailway(RailwayIdentifier),

    #[error("Station {station} is not on railway {railway}")]
    StationNotOnRailway {
        station: StationIdentifier,
        railway: RailwayIdentifier,
    },

    #[error("Stop {stop} is not on trip {trip}")]
    StopNotOnTrip {
        stop: StationIdentifier,
        trip: TripIdentifier,
    },

    #[error("No section left to run for {0}")]
    EndOfRun(VehicleRef),

    #[error("{0} is already running")]
    AlreadyRunning(VehicleRef),

    #[error("Railway {0} is suspended")]
    RailwaySuspended(RailwayIdentifier),

    #[error("{0} is not confirmed by the realtime feed")]
    NotConfirmed(VehicleRef),

    #[error("Feed fetch failed: {0}")]
    FeedFetch(String),

    #[error("Feed decode failed: {0}")]
    FeedDecode(#[from] serde_json::Error),

    #[error(transparent)]
    Transit(#[from] TransitError),
}

impl EngineError {
    /// Refusals are expected outcomes of a start attempt, not data problems
    pub fn is_refusal(&self) -> bool {
        matches!(
            self,
            Self::AlreadyRunning(_) | Self::RailwaySuspended(_) | Self::NotConfirmed(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
