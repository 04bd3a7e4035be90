//! Bus trips over precomputed route shapes.

use std::sync::Arc;

use crate::identifiers::{StationIdentifier, TripIdentifier};

/// One scheduled bus trip.
///
/// `stop_offsets[i]` is the distance (km) along the trip's route shape at
/// `stops[i]`; `departure_times[i]` is the scheduled departure there.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
pub struct BusTrip {
    pub id: TripIdentifier,
    pub route: Arc<str>,
    pub stops: Vec<StationIdentifier>,
    pub stop_offsets: Vec<f64>,
    pub departure_times: Vec<f64>,
    /// Route is hidden from display and its buses never start
    #[cfg_attr(feature = "serde", serde(default))]
    pub hidden: bool,
}

impl BusTrip {
    pub fn start(&self) -> f64 {
        self.departure_times.first().copied().unwrap_or(0.0)
    }

    pub fn end(&self) -> f64 {
        self.departure_times.last().copied().unwrap_or(0.0)
    }

    pub fn is_running_at(&self, now: f64) -> bool {
        self.start() <= now && now <= self.end()
    }

    pub fn final_index(&self) -> usize {
        self.stops.len().saturating_sub(1)
    }

    /// Index of the stop most recently departed at `now`
    pub fn stop_index_at(&self, now: f64) -> usize {
        self.departure_times
            .iter()
            .rposition(|&t| t <= now)
            .unwrap_or(0)
    }

    pub fn position_of(&self, stop: &StationIdentifier) -> Option<usize> {
        self.stops.iter().position(|s| s == stop)
    }

    pub fn section_distance(&self, index: usize, length: usize) -> Option<f64> {
        let from = self.stop_offsets.get(index)?;
        let to = self.stop_offsets.get(index + length)?;
        Some((to - from).abs())
    }
}
