//! Train timetables and the through-service links between them.

use crate::identifiers::*;
use crate::models::types::{RailDirection, StopEvent};

/// One scheduled run of a railway in one direction.
///
/// `previous` and `next` link through-running continuations: a terminating
/// run may hand over to several next runs (branch splits), and a next run may
/// wait for several previous ones (joins).
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
pub struct Timetable {
    pub id: TimetableIdentifier,
    pub train_id: TrainIdentifier,
    pub railway_id: RailwayIdentifier,
    pub direction: RailDirection,
    pub stops: Vec<StopEvent>,
    /// Final destination if it lies beyond the last stop of this run
    #[cfg_attr(feature = "serde", serde(default))]
    pub destination: Option<StationIdentifier>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub previous: Vec<TimetableIdentifier>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub next: Vec<TimetableIdentifier>,
}

impl Timetable {
    /// First scheduled time of the run
    pub fn start(&self) -> f64 {
        self.stops
            .first()
            .and_then(StopEvent::departure_or_arrival)
            .unwrap_or(0.0)
    }

    /// Last scheduled time of the run
    pub fn end(&self) -> f64 {
        self.stops
            .last()
            .and_then(|stop| stop.arrival.or(stop.departure))
            .unwrap_or_else(|| self.start())
    }

    /// Whether `now` falls inside the run's delay-adjusted window
    pub fn is_running_at(&self, now: f64, delay: f64) -> bool {
        self.start() + delay <= now && now <= self.end() + delay
    }

    /// Index of the stop the train most recently departed at `now`
    pub fn stop_index_at(&self, now: f64, delay: f64) -> usize {
        self.stops
            .iter()
            .enumerate()
            .filter(|(_, stop)| stop.departure.is_some_and(|d| d + delay <= now))
            .map(|(i, _)| i)
            .last()
            .unwrap_or(0)
    }

    pub fn has_continuation(&self) -> bool {
        !self.next.is_empty()
    }
}
