//! Live vehicles inferred from arrival prediction feeds.

mod estimator;
mod feed;
mod location;
mod prediction;

pub use estimator::{LiveTrackEstimator, LiveTrackRecord, UpdateSummary};
pub use feed::{ArrivalsFeed, HttpFetcher, LiveTracker, TFL_API_BASE};
pub use location::{parse_location, LocationHint};
pub use prediction::ArrivalPrediction;
