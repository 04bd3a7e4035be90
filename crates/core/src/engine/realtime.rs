//! Realtime train information: which trains are actually running, their
//! delays, and per-railway service notices.

use std::fmt;
use std::sync::Arc;

use railtrack_transit::prelude::*;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{Engine, StartOptions};
use crate::clock::Clock;
use crate::vehicle::Train;

/// One train from the realtime train feed
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct RealtimeTrainReport {
    pub id: TrainIdentifier,
    /// Needed to run a train that has no timetable
    pub railway: Option<RailwayIdentifier>,
    pub direction: Option<RailDirection>,
    pub train_type: Option<String>,
    pub origin: Option<StationIdentifier>,
    pub destination: Option<StationIdentifier>,
    /// Last station the train was seen at
    pub from_station: Option<StationIdentifier>,
    /// Station the train is heading for
    pub to_station: Option<StationIdentifier>,
    /// Milliseconds
    pub delay: Option<f64>,
    pub car_composition: Option<u32>,
}

impl RealtimeTrainReport {
    /// Whether the running train no longer matches what is reported
    fn supersedes(&self, train: &Train) -> bool {
        let differs = |reported: &Option<StationIdentifier>, current: &Option<StationIdentifier>| {
            matches!((reported, current), (Some(a), Some(b)) if a != b)
        };

        self.train_type
            .as_deref()
            .is_some_and(|t| train.train_type.as_deref() != Some(t))
            || differs(&self.origin, &train.origin)
            || differs(&self.destination, &train.destination)
            || self
                .car_composition
                .is_some_and(|c| train.car_composition != Some(c))
            || self.delay.is_some_and(|d| d != train.delay)
    }

    fn apply_to(&self, train: &mut Train) {
        if let Some(train_type) = &self.train_type {
            train.train_type = Some(Arc::from(train_type.as_str()));
        }
        if self.origin.is_some() {
            train.origin = self.origin.clone();
        }
        if self.destination.is_some() {
            train.destination = self.destination.clone();
        }
        train.delay = self.delay.unwrap_or(0.0);
        train.car_composition = self.car_composition;
    }
}

/// Service notice for one railway
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct RailwayInfo {
    pub railway: RailwayIdentifier,
    pub status: Option<String>,
    pub text: Option<String>,
    pub suspended: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RailwayStatus {
    pub status: Option<String>,
    pub text: Option<String>,
    pub suspended: bool,
}

impl<C: Clock> Engine<C> {
    /// Apply one poll of the realtime train feed.
    ///
    /// Trains whose reported details changed are restarted (keeping the
    /// selection), timetabled trains whose window is not open yet wait in
    /// standby, and trains the feed no longer confirms are retired where the
    /// railway requires confirmation.
    pub fn apply_realtime_trains(&mut self, reports: &[RealtimeTrainReport], infos: &[RailwayInfo]) {
        let now = self.clock.now();

        self.railway_status.clear();
        for info in infos {
            if self.dataset.get_railway(&info.railway).is_none() {
                continue;
            }
            let status = self.railway_status.entry(info.railway.clone()).or_default();
            if info.status.is_some() {
                status.status = info.status.clone();
                status.text = info.text.clone();
            }
            if info.suspended {
                status.suspended = true;
            }
        }

        self.registry.standby.clear();
        self.registry.realtime_trains.clear();

        for report in reports {
            self.registry.realtime_trains.insert(report.id.clone());

            let mut options = StartOptions::default();
            if let Some(active) = self.registry.trains.get_mut(&report.id) {
                if !report.supersedes(active) {
                    if active.timetable.is_none() {
                        if report.from_station.is_some() {
                            active.from_station = report.from_station.clone();
                        }
                        if report.to_station.is_some() {
                            active.to_station = report.to_station.clone();
                        }
                    }
                    continue;
                }
                let vehicle = active.vehicle_ref();
                (options.marked, options.tracked) = self.selection.holds(&vehicle);
                debug!(%vehicle, "realtime details changed, restarting");
                self.stop_train(&report.id);
            }

            let timetables = self.dataset.timetables_for_train(&report.id);
            if !timetables.is_empty() {
                for timetable in timetables {
                    let mut train = Train::from_timetable(timetable.clone());
                    report.apply_to(&mut train);
                    if timetable.is_running_at(now, train.delay) {
                        let vehicle = train.vehicle_ref();
                        if let Err(error) = self.start_train(train, options) {
                            Self::log_start_failure(&vehicle, &error);
                        }
                    } else {
                        self.registry.standby.insert(timetable.id.clone(), train);
                    }
                }
                continue;
            }

            let (Some(railway), Some(direction)) = (&report.railway, report.direction) else {
                continue;
            };
            let mut train = Train::ad_hoc(report.id.clone(), railway.clone(), direction);
            report.apply_to(&mut train);
            train.from_station = report.from_station.clone();
            train.to_station = report.to_station.clone();
            let vehicle = train.vehicle_ref();
            if let Err(error) = self.start_train(train, options) {
                Self::log_start_failure(&vehicle, &error);
            }
        }

        let unconfirmed: Vec<TrainIdentifier> = self
            .registry
            .trains
            .values()
            .filter(|train| self.requires_retirement(train))
            .map(|train| train.id.clone())
            .collect();
        for id in unconfirmed {
            self.stop_train(&id);
        }

        self.refresh_trains();
    }

    /// The realtime feed could not be fetched; keep running on timetables
    pub fn realtime_feed_failed(&mut self, error: impl fmt::Display) {
        warn!(%error, "realtime train feed failed");
        self.refresh_trains();
    }

    fn requires_retirement(&self, train: &Train) -> bool {
        let status = self.railway_status.get(&train.railway_id);
        if status.is_some_and(|s| s.suspended) {
            return true;
        }
        let dynamic = self
            .dataset
            .get_railway(&train.railway_id)
            .is_some_and(|railway| railway.dynamic);
        let needs_confirmation =
            (status.is_some_and(|s| s.status.is_some()) && dynamic) || train.timetable.is_none();
        needs_confirmation && !self.registry.realtime_trains.contains(&train.id)
    }
}
