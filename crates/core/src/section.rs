//! Resolution of the section a vehicle runs next.
//!
//! Each function updates the vehicle in place and returns the new section,
//! or an error when there is nothing left to run (the vehicle's final leg)
//! or its stations cannot be found.

use railtrack_transit::prelude::*;

use crate::error::{EngineError, Result};
use crate::vehicle::{Bus, Section, Train};

/// Section of a timetabled train.
///
/// Without `index` the stop is the last one departed at `now` (delay
/// adjusted). The stop index and departure time are recorded even when the
/// run is over, so that the train can stand at its terminal.
pub fn assign_timetabled(
    train: &mut Train,
    railway: &Railway,
    index: Option<usize>,
    now: f64,
) -> Result<Section> {
    let Some(timetable) = train.timetable.clone() else {
        return Err(EngineError::EndOfRun(train.vehicle_ref()));
    };

    let stop_index = index.unwrap_or_else(|| timetable.stop_index_at(now, train.delay));
    let departure = timetable.stops.get(stop_index);
    let arrival = timetable.stops.get(stop_index + 1);

    train.timetable_index = stop_index;
    train.departure_station = departure.map(|stop| stop.station_id.clone());
    train.departure_time = departure.and_then(StopEvent::departure_or_arrival);

    let resolved = departure.zip(arrival).and_then(|(departure, arrival)| {
        let current = railway.index_of(&departure.station_id, train.direction, None)?;
        let next = railway.index_of(&arrival.station_id, train.direction, Some(current))?;
        Some((current, next, arrival))
    });

    match resolved {
        Some((current, next, arrival)) => {
            let section = Section::new(current, next as isize - current as isize);
            train.section = Some(section);
            train.arrival_station = Some(arrival.station_id.clone());
            train.arrival_time = arrival.arrival;
            train.next_departure_time = arrival.departure;
            Ok(section)
        }
        None => {
            train.arrival_station = None;
            train.arrival_time = None;
            match (departure, arrival) {
                (Some(departure), Some(arrival)) => {
                    let missing = if railway.stations.contains(&departure.station_id) {
                        arrival
                    } else {
                        departure
                    };
                    Err(EngineError::StationNotOnRailway {
                        station: missing.station_id.clone(),
                        railway: railway.id.clone(),
                    })
                }
                _ => Err(EngineError::EndOfRun(train.vehicle_ref())),
            }
        }
    }
}

/// Section of a train known only from realtime reports.
///
/// The train heads for its reported next station. Once it is no longer
/// confirmed (`final_leg`) it runs on to its destination, or the end of the
/// line, instead.
pub fn assign_ad_hoc(train: &mut Train, railway: &Railway, final_leg: bool) -> Result<Section> {
    let departure = train.from_station.clone().or_else(|| train.to_station.clone());
    let arrival = train.to_station.clone().or_else(|| train.from_station.clone());
    let direction = train.direction;

    let current = departure
        .as_ref()
        .and_then(|station| railway.index_of(station, direction, None));
    let mut next = arrival
        .as_ref()
        .and_then(|station| railway.index_of(station, direction, current));
    let final_index = train
        .destination
        .as_ref()
        .and_then(|station| railway.index_of(station, direction, current))
        .unwrap_or(match direction {
            RailDirection::Ascending => railway.station_count().saturating_sub(1),
            RailDirection::Descending => 0,
        });

    let actual = match train.section {
        None => {
            next = current;
            current
        }
        Some(section) => railway.checked_index(section.end()),
    };

    train.departure_station = departure.clone();

    let target = if final_leg { Some(final_index) } else { next };
    match (actual, target) {
        (Some(actual), Some(target)) if actual != final_index => {
            let section = Section::new(actual, target as isize - actual as isize);
            train.section = Some(section);
            train.arrival_station = if arrival == departure {
                railway
                    .checked_index(actual as isize + direction.step())
                    .and_then(|i| railway.station_at(i))
                    .cloned()
            } else {
                arrival
            };
            Ok(section)
        }
        _ => {
            train.arrival_station = None;
            train.arrival_time = None;
            match (current, departure) {
                (None, Some(station)) => Err(EngineError::StationNotOnRailway {
                    station,
                    railway: railway.id.clone(),
                }),
                _ => Err(EngineError::EndOfRun(train.vehicle_ref())),
            }
        }
    }
}

/// Section of a bus; always a single stop long.
///
/// Timetabled buses follow their departure times. Realtime buses follow the
/// stop reported by the feed, one stop at a time, until they are no longer
/// reported (`final_leg`).
pub fn assign_bus(bus: &mut Bus, index: Option<usize>, final_leg: bool, now: f64) -> Result<Section> {
    let trip = bus.trip.clone();
    let final_index = trip.final_index();

    let Some(stop) = bus.current_stop.clone() else {
        let current = index.unwrap_or_else(|| trip.stop_index_at(now));
        if current >= final_index {
            return Err(EngineError::EndOfRun(bus.vehicle_ref()));
        }
        let section = Section::new(current, 1);
        bus.section = Some(section);
        bus.departure_time = trip.departure_times.get(current).copied();
        bus.next_departure_time = trip.departure_times.get(current + 1).copied();
        return Ok(section);
    };

    let current = trip
        .position_of(&stop)
        .ok_or_else(|| EngineError::StopNotOnTrip {
            stop,
            trip: trip.id.clone(),
        })?;

    let (actual, next) = match bus.section {
        None => (current, current),
        Some(section) => {
            let actual = usize::try_from(section.end()).unwrap_or(0);
            (actual, (current + 1).min(final_index))
        }
    };

    if final_leg || actual == final_index {
        return Err(EngineError::EndOfRun(bus.vehicle_ref()));
    }
    let section = Section::new(actual, next as isize - actual as isize);
    bus.section = Some(section);
    Ok(section)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn railway() -> Railway {
        Railway {
            id: RailwayIdentifier::new("rw"),
            title: "Test Line".into(),
            stations: ["s0", "s1", "s2", "s3"].into_iter().map(StationIdentifier::new).collect(),
            station_offsets: vec![0.0, 2.0, 4.0, 7.0],
            ascending: "Up".into(),
            descending: "Down".into(),
            dynamic: false,
            altitude: None,
        }
    }

    fn timetable() -> Arc<Timetable> {
        let stop = |id: &str, arrival, departure| StopEvent::new(StationIdentifier::new(id), arrival, departure);
        Arc::new(Timetable {
            id: TimetableIdentifier::new("tt"),
            train_id: TrainIdentifier::new("A"),
            railway_id: RailwayIdentifier::new("rw"),
            direction: RailDirection::Descending,
            stops: vec![
                stop("s3", None, Some(0.0)),
                stop("s2", Some(100.0), Some(150.0)),
                stop("s0", Some(400.0), None),
            ],
            destination: None,
            previous: vec![],
            next: vec![],
        })
    }

    #[test]
    fn test_timetabled_section_from_time() {
        let railway = railway();
        let mut train = Train::from_timetable(timetable());

        let section = assign_timetabled(&mut train, &railway, None, 160.0).unwrap();
        assert_eq!(section, Section::new(2, -2));
        assert_eq!(train.timetable_index, 1);
        assert_eq!(train.departure_time, Some(150.0));
        assert_eq!(train.arrival_time, Some(400.0));
        assert_eq!(train.next_departure_time, None);
        assert_eq!(train.arrival_station, Some(StationIdentifier::new("s0")));
    }

    #[test]
    fn test_timetabled_delay_shifts_stop() {
        let railway = railway();
        let mut train = Train::from_timetable(timetable());
        train.delay = 50.0;

        let section = assign_timetabled(&mut train, &railway, None, 160.0).unwrap();
        assert_eq!(section, Section::new(3, -1));
    }

    #[test]
    fn test_timetabled_end_of_run() {
        let railway = railway();
        let mut train = Train::from_timetable(timetable());
        assign_timetabled(&mut train, &railway, Some(1), 0.0).unwrap();

        let result = assign_timetabled(&mut train, &railway, Some(2), 400.0);
        assert!(matches!(result, Err(EngineError::EndOfRun(_))));
        assert!(!train.has_pending_arrival());
        assert_eq!(train.departure_time, Some(400.0));
        // The last section is kept so the train stays at its terminal
        assert_eq!(train.section, Some(Section::new(2, -2)));
    }

    #[test]
    fn test_timetabled_unknown_station() {
        let railway = railway();
        let mut tt = (*timetable()).clone();
        tt.stops[1].station_id = StationIdentifier::new("elsewhere");
        let mut train = Train::from_timetable(Arc::new(tt));

        match assign_timetabled(&mut train, &railway, Some(0), 0.0) {
            Err(EngineError::StationNotOnRailway { station, .. }) => {
                assert_eq!(station.as_str(), "elsewhere")
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    fn ad_hoc(from: &str, to: &str) -> Train {
        let mut train = Train::ad_hoc(
            TrainIdentifier::new("X"),
            RailwayIdentifier::new("rw"),
            RailDirection::Ascending,
        );
        train.from_station = Some(StationIdentifier::new(from));
        train.to_station = Some(StationIdentifier::new(to));
        train
    }

    #[test]
    fn test_ad_hoc_starts_standing_then_moves() {
        let railway = railway();
        let mut train = ad_hoc("s0", "s1");

        assert_eq!(assign_ad_hoc(&mut train, &railway, false).unwrap(), Section::new(0, 0));
        assert_eq!(assign_ad_hoc(&mut train, &railway, false).unwrap(), Section::new(0, 1));
        // Arrived, waiting for the feed to move it on
        assert_eq!(assign_ad_hoc(&mut train, &railway, false).unwrap(), Section::new(1, 0));
    }

    #[test]
    fn test_ad_hoc_final_runs_to_end_of_line() {
        let railway = railway();
        let mut train = ad_hoc("s1", "s1");
        assign_ad_hoc(&mut train, &railway, false).unwrap();

        let section = assign_ad_hoc(&mut train, &railway, true).unwrap();
        assert_eq!(section, Section::new(1, 2));
        // Same departure and arrival station: arrival is the next one along
        assert_eq!(train.arrival_station, Some(StationIdentifier::new("s2")));

        let result = assign_ad_hoc(&mut train, &railway, true);
        assert!(matches!(result, Err(EngineError::EndOfRun(_))));
    }

    #[test]
    fn test_ad_hoc_destination_limits_final_leg() {
        let railway = railway();
        let mut train = ad_hoc("s0", "s1");
        train.destination = Some(StationIdentifier::new("s2"));
        assign_ad_hoc(&mut train, &railway, false).unwrap();

        assert_eq!(assign_ad_hoc(&mut train, &railway, true).unwrap(), Section::new(0, 2));
    }

    fn trip() -> Arc<BusTrip> {
        Arc::new(BusTrip {
            id: TripIdentifier::new("trip"),
            route: "25".into(),
            stops: ["b0", "b1", "b2"].into_iter().map(StationIdentifier::new).collect(),
            stop_offsets: vec![0.0, 0.4, 0.9],
            departure_times: vec![0.0, 60.0, 120.0],
            hidden: false,
        })
    }

    #[test]
    fn test_bus_timetabled_section() {
        let mut bus = Bus::new(trip());
        assert_eq!(assign_bus(&mut bus, None, false, 70.0).unwrap(), Section::new(1, 1));
        assert_eq!(bus.departure_time, Some(60.0));
        assert_eq!(bus.next_departure_time, Some(120.0));
        assert!(assign_bus(&mut bus, Some(2), false, 120.0).is_err());
    }

    #[test]
    fn test_bus_realtime_section() {
        let mut bus = Bus::new(trip());
        bus.current_stop = Some(StationIdentifier::new("b0"));

        assert_eq!(assign_bus(&mut bus, None, false, 0.0).unwrap(), Section::new(0, 0));
        assert_eq!(assign_bus(&mut bus, None, false, 0.0).unwrap(), Section::new(0, 1));
        assert!(assign_bus(&mut bus, None, true, 0.0).is_err());

        bus.current_stop = Some(StationIdentifier::new("nowhere"));
        assert!(matches!(
            assign_bus(&mut bus, None, false, 0.0),
            Err(EngineError::StopNotOnTrip { .. })
        ));
    }
}
