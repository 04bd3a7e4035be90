use std::collections::HashSet;
use std::iter;

use itertools::Itertools;
use railtrack_transit::prelude::*;
use tracing::{debug, warn};

use super::Engine;
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::events::LifecycleEvent;
use crate::kinematics::{solve, TimingWindow};
use crate::section::{assign_ad_hoc, assign_timetabled};
use crate::vehicle::{Leg, PendingStep, Train, VehicleRef};

/// Extra room a leg without a scheduled arrival may take beyond the next
/// departure less the standing time (ms)
const ARRIVAL_WINDOW: f64 = 60_000.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StartOptions {
    /// Timetable stop to start from instead of the one implied by the clock
    pub index: Option<usize>,
    pub marked: bool,
    pub tracked: bool,
}

impl<C: Clock> Engine<C> {
    /// Start a train.
    ///
    /// Refuses when the train's through-service chain is already running,
    /// when its railway is suspended, or when a railway with a status notice
    /// is dynamic and the train is not confirmed by the realtime feed.
    pub fn start_train(&mut self, mut train: Train, options: StartOptions) -> Result<()> {
        let railway = self
            .dataset
            .get_railway(&train.railway_id)
            .ok_or_else(|| EngineError::UnknownRailway(train.railway_id.clone()))?;

        match &train.timetable {
            Some(timetable) if self.chain_is_running(timetable) => {
                return Err(EngineError::AlreadyRunning(train.vehicle_ref()));
            }
            None if self.registry.trains.contains_key(&train.id) => {
                return Err(EngineError::AlreadyRunning(train.vehicle_ref()));
            }
            _ => {}
        }

        let status = self.railway_status.get(&railway.id);
        if status.is_some_and(|s| s.suspended) {
            return Err(EngineError::RailwaySuspended(railway.id.clone()));
        }
        if status.is_some_and(|s| s.status.is_some())
            && railway.dynamic
            && !self.registry.realtime_trains.contains(&train.id)
        {
            return Err(EngineError::NotConfirmed(train.vehicle_ref()));
        }

        let now = self.clock.now();
        match train.timetable {
            Some(_) => assign_timetabled(&mut train, &railway, options.index, now)?,
            None => assign_ad_hoc(&mut train, &railway, false)?,
        };

        let id = train.id.clone();
        let vehicle = train.vehicle_ref();
        if self.stop_train(&id).is_some() {
            debug!(%vehicle, "superseded by another run");
        }
        self.registry.trains.insert(id.clone(), train);
        self.emit(LifecycleEvent::Started {
            vehicle: vehicle.clone(),
            at: now,
        });

        if options.marked {
            self.selection.marked = Some(vehicle.clone());
        }
        if options.tracked {
            self.selection.tracked = Some(vehicle);
        }

        self.advance_train(&id, options.index);
        Ok(())
    }

    /// Move a train on to its next section, or decide what to do at the end
    /// of its run.
    ///
    /// `index` names the timetable stop the train departs from next; without
    /// it the stop is derived from the clock.
    pub(super) fn advance_train(&mut self, id: &TrainIdentifier, mut index: Option<usize>) {
        loop {
            let now = self.clock.now();
            let confirmed = self.registry.realtime_trains.contains(id);
            let Some(train) = self.registry.trains.get_mut(id) else {
                return;
            };
            let Some(railway) = self.dataset.get_railway(&train.railway_id) else {
                warn!(train = %id, railway = %train.railway_id, "railway disappeared");
                self.stop_train(id);
                return;
            };
            if let Some(timer) = train.timer.take() {
                self.clock.cancel(timer);
            }

            let assigned = match train.timetable {
                Some(_) => assign_timetabled(train, &railway, index, now),
                None => assign_ad_hoc(train, &railway, !confirmed),
            };
            if let Err(error @ EngineError::StationNotOnRailway { .. }) = &assigned {
                warn!(train = %id, %error, "section unresolved");
            }
            let final_leg = assigned.is_err();

            if final_leg {
                if let Some(timetable) = train.timetable.clone().filter(|t| t.has_continuation()) {
                    self.hand_over(&timetable);
                    return;
                }
            }

            let moving = match (final_leg, train.section) {
                (false, Some(section)) if section.length != 0 => Some(section),
                _ => None,
            };

            if let Some(section) = moving {
                let distance = railway
                    .section_distance(section.index, section.length)
                    .unwrap_or(0.0);
                let next_index = train.timetable.as_ref().map(|_| train.timetable_index + 1);
                let departure = departure_time(train, index, now, &self.config, self.clock.speed());
                let window = timing_window(train, departure, &self.config);
                let profile = solve(distance, &window, &self.config.train_limits);
                train.leg = Some(Leg {
                    start: departure,
                    profile,
                });
                let vehicle = train.vehicle_ref();

                if profile.is_stationary() {
                    self.emit(LifecycleEvent::Advanced {
                        vehicle,
                        section,
                        at: now,
                    });
                    index = next_index;
                    continue;
                }

                train.pending = PendingStep::Advance(next_index);
                train.timer = Some(
                    self.clock
                        .schedule_after(departure + profile.duration - now, vehicle.clone()),
                );
                self.emit(LifecycleEvent::Advanced {
                    vehicle,
                    section,
                    at: now,
                });
                return;
            }

            let wait = match &train.timetable {
                Some(_) => (train.departure_time.unwrap_or(now) - now)
                    .max(self.config.min_standing_duration),
                None if final_leg => self.config.min_standing_duration,
                None => self.config.realtime_check_interval,
            };
            train.pending = if final_leg {
                PendingStep::Retire
            } else {
                PendingStep::Advance(None)
            };
            train.timer = Some(self.clock.schedule_after(wait, train.vehicle_ref()));
            return;
        }
    }

    /// Through-service handover at the end of a run.
    ///
    /// The next runs start only once none of the runs feeding into them is
    /// still heading for a station. Until then nothing is scheduled; the last
    /// connecting train to arrive completes the handover.
    fn hand_over(&mut self, finished: &Timetable) {
        let Some(first) = finished.next.first().and_then(|id| self.dataset.get_timetable(id)) else {
            warn!(timetable = %finished.id, "continuation missing from dataset");
            self.stop_train(&finished.train_id);
            return;
        };

        let connecting: Vec<TrainIdentifier> = first
            .previous
            .iter()
            .filter_map(|id| self.dataset.get_timetable(id))
            .map(|timetable| timetable.train_id.clone())
            .collect();

        let waiting = connecting
            .iter()
            .filter_map(|id| self.registry.trains.get(id))
            .any(Train::has_pending_arrival);
        if waiting {
            debug!(timetable = %finished.id, "waiting for connecting trains");
            return;
        }

        let mut marked = false;
        let mut tracked = false;
        for id in connecting.iter().chain(iter::once(&finished.train_id)).unique() {
            let (was_marked, was_tracked) = self.selection.holds(&VehicleRef::Train(id.clone()));
            marked |= was_marked;
            tracked |= was_tracked;
            self.stop_train(id);
        }

        for (i, next_id) in finished.next.iter().enumerate() {
            let train = self
                .registry
                .standby
                .remove(next_id)
                .or_else(|| self.dataset.get_timetable(next_id).map(Train::from_timetable));
            let Some(train) = train else {
                warn!(timetable = %next_id, "continuation missing from dataset");
                continue;
            };
            let vehicle = train.vehicle_ref();
            let options = StartOptions {
                index: Some(0),
                marked: i == 0 && marked,
                tracked: i == 0 && tracked,
            };
            if let Err(error) = self.start_train(train, options) {
                Self::log_start_failure(&vehicle, &error);
            }
        }
    }

    /// Whether any run linked to `timetable` (itself included) is active
    pub(super) fn chain_is_running(&self, timetable: &Timetable) -> bool {
        self.chain_has_active(timetable, previous_links) || self.chain_has_active(timetable, next_links)
    }

    fn chain_has_active(
        &self,
        start: &Timetable,
        links: fn(&Timetable) -> &[TimetableIdentifier],
    ) -> bool {
        if self.is_running(start) {
            return true;
        }
        let mut visited = HashSet::from([start.id.clone()]);
        let mut queue = links(start).to_vec();
        while let Some(id) = queue.pop() {
            if !visited.insert(id.clone()) {
                continue;
            }
            let Some(timetable) = self.dataset.get_timetable(&id) else {
                continue;
            };
            if self.is_running(&timetable) {
                return true;
            }
            queue.extend_from_slice(links(&timetable));
        }
        false
    }

    fn is_running(&self, timetable: &Timetable) -> bool {
        self.registry
            .trains
            .get(&timetable.train_id)
            .is_some_and(|train| train.timetable_id() == Some(&timetable.id))
    }

    /// Retire a train: cancel its timer and release the selection
    pub fn stop_train(&mut self, id: &TrainIdentifier) -> Option<Train> {
        let train = self.registry.trains.remove(id)?;
        if let Some(timer) = train.timer {
            self.clock.cancel(timer);
        }
        let vehicle = train.vehicle_ref();
        self.selection.release(&vehicle);
        let at = self.clock.now();
        self.emit(LifecycleEvent::Retired { vehicle, at });
        Some(train)
    }

    /// Start every timetabled train whose window is open
    pub fn refresh_trains(&mut self) {
        let now = self.clock.now();
        for timetable in self.dataset.all_timetables() {
            if !timetable.is_running_at(now, 0.0)
                || self.registry.standby.contains_key(&timetable.id)
                || self.is_running(&timetable)
            {
                continue;
            }
            let train = Train::from_timetable(timetable);
            let vehicle = train.vehicle_ref();
            if let Err(error) = self.start_train(train, StartOptions::default()) {
                Self::log_start_failure(&vehicle, &error);
            }
        }
    }
}

fn previous_links(timetable: &Timetable) -> &[TimetableIdentifier] {
    &timetable.previous
}

fn next_links(timetable: &Timetable) -> &[TimetableIdentifier] {
    &timetable.next
}

/// When the next leg actually departs.
///
/// A train that has just arrived (`index` given) never leaves before its
/// delay-adjusted departure, and in real time stands for at least the
/// minimum standing duration.
fn departure_time(train: &Train, index: Option<usize>, now: f64, config: &EngineConfig, speed: f64) -> f64 {
    let Some(scheduled) = train.departure_time else {
        return now;
    };
    if index.is_none() {
        return scheduled + train.delay;
    }
    let standing = if speed == 1.0 {
        config.min_standing_duration
    } else {
        0.0
    };
    (scheduled + train.delay).max(now + standing)
}

/// How long the leg may take.
///
/// A scheduled arrival pins the duration so the train reaches the station at
/// exactly its delay-adjusted arrival time. Without one, only the next
/// departure bounds it.
fn timing_window(train: &Train, departure: f64, config: &EngineConfig) -> TimingWindow {
    let slack = train.delay - config.min_delay - departure;
    match train.arrival_time {
        Some(arrival) => {
            let exact = arrival + slack;
            TimingWindow {
                min_duration: Some(exact),
                max_duration: Some(exact),
            }
        }
        None => TimingWindow {
            min_duration: None,
            max_duration: train
                .next_departure_time
                .map(|next| next - config.min_standing_duration + ARRIVAL_WINDOW + slack),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fixtures::*;
    use approx::assert_relative_eq;

    fn through_service() -> std::sync::Arc<dyn TransitProvider> {
        let mut inbound = timetable(
            "t1",
            "a",
            RailDirection::Ascending,
            vec![stop("s0", None, Some(0.0)), stop("s1", Some(150_000.0), None)],
        );
        let mut branch = timetable(
            "t2",
            "b",
            RailDirection::Descending,
            vec![stop("s2", None, Some(0.0)), stop("s1", Some(240_000.0), None)],
        );
        let mut onward = timetable(
            "t3",
            "c",
            RailDirection::Ascending,
            vec![stop("s1", None, Some(300_000.0)), stop("s2", Some(420_000.0), None)],
        );
        inbound.next = vec![onward.id.clone()];
        branch.next = vec![onward.id.clone()];
        onward.previous = vec![inbound.id.clone(), branch.id.clone()];

        dataset(vec![line("line")], vec![inbound, branch, onward])
    }

    #[test]
    fn test_arrival_matches_timetable() {
        let data = dataset(
            vec![line("line")],
            vec![timetable(
                "t1",
                "A",
                RailDirection::Ascending,
                vec![
                    stop("s0", None, Some(0.0)),
                    stop("s1", Some(120_000.0), Some(180_000.0)),
                    stop("s2", Some(300_000.0), None),
                ],
            )],
        );
        let mut engine = engine(data);
        engine.refresh_trains();
        let id = TrainIdentifier::new("A");

        let leg = engine.registry().train(&id).unwrap().leg.unwrap();
        assert_relative_eq!(leg.start, 0.0);
        assert_relative_eq!(leg.end(), 120_000.0, epsilon = 1e-6);

        // Standing at s1 until the scheduled departure
        engine.run_until(150_000.0);
        let position = engine.position_of(&train("A")).unwrap();
        assert_eq!(position.section.index, 1);
        assert_eq!(position.progress, 0.0);

        let leg = engine.registry().train(&id).unwrap().leg.unwrap();
        assert_relative_eq!(leg.start, 180_000.0);
        assert_relative_eq!(leg.end(), 300_000.0, epsilon = 1e-6);

        // Stands at the terminal, then retires
        engine.run_until(300_000.0);
        assert!(engine.registry().train(&id).is_some());
        engine.run_until(330_000.0);
        assert!(engine.registry().train(&id).is_none());
    }

    #[test]
    fn test_delay_shifts_arrival() {
        let data = dataset(
            vec![line("line")],
            vec![timetable(
                "t1",
                "A",
                RailDirection::Ascending,
                vec![stop("s0", None, Some(0.0)), stop("s1", Some(120_000.0), None)],
            )],
        );
        let mut engine = engine(data);
        let timetable = engine.dataset().get_timetable(&TimetableIdentifier::new("t1")).unwrap();
        let mut train = Train::from_timetable(timetable);
        train.delay = 30_000.0;

        engine.clock_mut().set_time(10_000.0);
        engine.start_train(train, StartOptions::default()).unwrap();

        let leg = engine.registry().train(&TrainIdentifier::new("A")).unwrap().leg.unwrap();
        assert_relative_eq!(leg.start, 30_000.0);
        assert_relative_eq!(leg.end(), 150_000.0, epsilon = 1e-6);
    }

    #[test]
    fn test_rendezvous_waits_for_all_connecting_trains() {
        let mut engine = engine(through_service());
        engine.refresh_trains();
        engine.mark(Some(train("a")));
        assert!(engine.registry().train(&TrainIdentifier::new("a")).is_some());
        assert!(engine.registry().train(&TrainIdentifier::new("b")).is_some());

        // "a" arrives first and waits without a timer
        engine.run_until(200_000.0);
        let a = engine.registry().train(&TrainIdentifier::new("a")).unwrap();
        assert!(!a.has_pending_arrival());
        assert!(a.timer.is_none());
        assert!(engine.registry().train(&TrainIdentifier::new("c")).is_none());

        // "b" arrives: both retire and "c" starts, inheriting the mark
        engine.run_until(240_000.0);
        assert!(engine.registry().train(&TrainIdentifier::new("a")).is_none());
        assert!(engine.registry().train(&TrainIdentifier::new("b")).is_none());
        let c = engine.registry().train(&TrainIdentifier::new("c")).unwrap();
        assert_eq!(c.timetable_index, 0);
        assert_eq!(engine.selection().marked, Some(train("c")));

        let leg = c.leg.unwrap();
        assert_relative_eq!(leg.start, 300_000.0);
        assert_relative_eq!(leg.end(), 420_000.0, epsilon = 1e-6);
    }

    #[test]
    fn test_chain_blocks_duplicate_start() {
        let mut engine = engine(through_service());
        engine.refresh_trains();
        let onward = engine.dataset().get_timetable(&TimetableIdentifier::new("t3")).unwrap();

        // A previous run of the chain is active
        let result = engine.start_train(Train::from_timetable(onward), StartOptions::default());
        assert!(matches!(result, Err(EngineError::AlreadyRunning(_))));

        let first = engine.dataset().get_timetable(&TimetableIdentifier::new("t1")).unwrap();
        let result = engine.start_train(Train::from_timetable(first), StartOptions::default());
        assert!(matches!(result, Err(EngineError::AlreadyRunning(_))));
    }

    #[test]
    fn test_stop_cancels_timer_and_selection() {
        let mut engine = engine(through_service());
        engine.refresh_trains();
        engine.track(Some(train("a")));
        let pending = engine.clock().pending_timers();

        let stopped = engine.stop_train(&TrainIdentifier::new("a")).unwrap();
        assert_eq!(stopped.id, TrainIdentifier::new("a"));
        assert_eq!(engine.clock().pending_timers(), pending - 1);
        assert_eq!(engine.selection().tracked, None);
        assert!(engine.stop_train(&TrainIdentifier::new("a")).is_none());
    }

    #[test]
    fn test_unresolvable_section_does_not_start() {
        let data = dataset(
            vec![line("line")],
            vec![timetable(
                "t1",
                "A",
                RailDirection::Ascending,
                vec![stop("s0", None, Some(0.0)), stop("elsewhere", Some(60_000.0), None)],
            )],
        );
        let mut engine = engine(data);
        engine.refresh_trains();
        assert_eq!(engine.registry().active_count(), 0);
        assert!(engine.drain_events().is_empty());
    }

    #[test]
    fn test_zero_length_section_advances_immediately() {
        let mut railway = line("line");
        railway.station_offsets = vec![0.0, 0.0, 2.0, 4.0];
        let data = dataset(
            vec![railway],
            vec![timetable(
                "t1",
                "A",
                RailDirection::Ascending,
                vec![
                    stop("s0", None, Some(0.0)),
                    stop("s1", Some(0.0), Some(10_000.0)),
                    stop("s2", Some(120_000.0), None),
                ],
            )],
        );
        let mut engine = engine(data);
        engine.clock_mut().set_speed(60.0);
        engine.refresh_trains();

        let train = engine.registry().train(&TrainIdentifier::new("A")).unwrap();
        assert_eq!(train.timetable_index, 1);
        assert_relative_eq!(train.leg.unwrap().end(), 120_000.0, epsilon = 1e-6);
    }

    #[test]
    fn test_timing_window_pins_scheduled_arrival() {
        let mut train = Train::ad_hoc(
            TrainIdentifier::new("A"),
            RailwayIdentifier::new("line"),
            RailDirection::Ascending,
        );
        let config = EngineConfig::default();
        train.arrival_time = Some(100_000.0);
        train.next_departure_time = Some(400_000.0);

        let window = timing_window(&train, 0.0, &config);
        assert_eq!(window.min_duration, Some(100_000.0));
        assert_eq!(window.max_duration, Some(100_000.0));

        // Delay shifts the arrival, a late departure shortens the leg
        train.delay = 20_000.0;
        let window = timing_window(&train, 10_000.0, &config);
        assert_eq!(window.min_duration, Some(110_000.0));
        assert_eq!(window.max_duration, Some(110_000.0));

        // Only the next departure known
        train.delay = 0.0;
        train.arrival_time = None;
        let window = timing_window(&train, 0.0, &config);
        assert_eq!(window.min_duration, None);
        assert_eq!(window.max_duration, Some(430_000.0));
    }

    #[test]
    fn test_slow_profile_still_arrives_on_time() {
        // 2 km takes longer than the scheduled 110 s at the default limits
        let mut train = Train::ad_hoc(
            TrainIdentifier::new("A"),
            RailwayIdentifier::new("line"),
            RailDirection::Ascending,
        );
        let config = EngineConfig::default();
        train.arrival_time = Some(120_000.0);
        let natural = solve(2.0, &TimingWindow::unconstrained(), &config.train_limits);
        assert!(natural.duration > 110_000.0);

        let window = timing_window(&train, 10_000.0, &config);
        let profile = solve(2.0, &window, &config.train_limits);
        assert_relative_eq!(10_000.0 + profile.duration, 120_000.0, epsilon = 1e-6);
        assert_relative_eq!(profile.distance_at(profile.duration), 2.0, epsilon = 1e-6);
    }
}
