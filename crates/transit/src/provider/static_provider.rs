//! In-memory transit provider backed by a loaded dataset.
//!
//! This is the core implementation that stores all transit data in memory
//! with lookup maps for the ids the engine resolves on every refresh.

use std::collections::HashMap;
use std::sync::Arc;

use crate::identifiers::*;
use crate::models::{traits::*, types::*, BusTrip, Flight, Railway, Station, Timetable};

// ============================================================================
// Static Provider
// ============================================================================

/// In-memory transit provider
///
/// This type is cheap to clone since all data is stored in `Arc`s.
#[derive(Clone, Default)]
pub struct StaticTransitProvider {
    // Core data
    stations: Vec<Arc<Station>>,
    railways: Vec<Arc<Railway>>,
    timetables: Vec<Arc<Timetable>>,
    bus_trips: Vec<Arc<BusTrip>>,
    flights: Vec<Arc<Flight>>,

    // Lookup maps
    station_map: HashMap<StationIdentifier, Arc<Station>>,
    railway_map: HashMap<RailwayIdentifier, Arc<Railway>>,
    timetable_map: HashMap<TimetableIdentifier, Arc<Timetable>>,
    train_map: HashMap<TrainIdentifier, Vec<Arc<Timetable>>>,
    bus_trip_map: HashMap<TripIdentifier, Arc<BusTrip>>,
    flight_map: HashMap<FlightIdentifier, Arc<Flight>>,
}

impl StaticTransitProvider {
    /// Create a new empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Build provider from raw data (used by deserializer)
    ///
    /// Fails if a railway's offsets do not line up with its stations or a
    /// timetable references an unknown railway.
    pub fn from_data(
        stations: Vec<Station>,
        railways: Vec<Railway>,
        timetables: Vec<Timetable>,
        bus_trips: Vec<BusTrip>,
        flights: Vec<Flight>,
    ) -> Result<Self> {
        for railway in &railways {
            railway.validate()?;
        }

        let stations: Vec<Arc<Station>> = stations.into_iter().map(Arc::new).collect();
        let railways: Vec<Arc<Railway>> = railways.into_iter().map(Arc::new).collect();
        let timetables: Vec<Arc<Timetable>> = timetables.into_iter().map(Arc::new).collect();
        let bus_trips: Vec<Arc<BusTrip>> = bus_trips.into_iter().map(Arc::new).collect();
        let flights: Vec<Arc<Flight>> = flights.into_iter().map(Arc::new).collect();

        // Build lookup maps
        let station_map: HashMap<_, _> = stations
            .iter()
            .map(|s| (s.id.clone(), s.clone()))
            .collect();

        let railway_map: HashMap<_, _> = railways
            .iter()
            .map(|r| (r.id.clone(), r.clone()))
            .collect();

        let timetable_map: HashMap<_, _> = timetables
            .iter()
            .map(|t| (t.id.clone(), t.clone()))
            .collect();

        // Build train map
        let mut train_map: HashMap<TrainIdentifier, Vec<Arc<Timetable>>> = HashMap::new();
        for timetable in &timetables {
            if !railway_map.contains_key(&timetable.railway_id) {
                return Err(TransitError::RailwayNotFound(timetable.railway_id.clone()));
            }
            train_map
                .entry(timetable.train_id.clone())
                .or_default()
                .push(timetable.clone());
        }

        let bus_trip_map: HashMap<_, _> = bus_trips
            .iter()
            .map(|t| (t.id.clone(), t.clone()))
            .collect();

        let flight_map: HashMap<_, _> = flights
            .iter()
            .map(|f| (f.id.clone(), f.clone()))
            .collect();

        Ok(Self {
            stations,
            railways,
            timetables,
            bus_trips,
            flights,
            station_map,
            railway_map,
            timetable_map,
            train_map,
            bus_trip_map,
            flight_map,
        })
    }
}

impl TransitProvider for StaticTransitProvider {
    fn get_station(&self, id: &StationIdentifier) -> Option<Arc<Station>> {
        self.station_map.get(id).cloned()
    }

    fn get_railway(&self, id: &RailwayIdentifier) -> Option<Arc<Railway>> {
        self.railway_map.get(id).cloned()
    }

    fn get_timetable(&self, id: &TimetableIdentifier) -> Option<Arc<Timetable>> {
        self.timetable_map.get(id).cloned()
    }

    fn get_bus_trip(&self, id: &TripIdentifier) -> Option<Arc<BusTrip>> {
        self.bus_trip_map.get(id).cloned()
    }

    fn get_flight(&self, id: &FlightIdentifier) -> Option<Arc<Flight>> {
        self.flight_map.get(id).cloned()
    }

    fn timetables_for_train(&self, id: &TrainIdentifier) -> Vec<Arc<Timetable>> {
        self.train_map.get(id).cloned().unwrap_or_default()
    }

    fn all_stations(&self) -> Vec<Arc<Station>> {
        self.stations.clone()
    }

    fn all_railways(&self) -> Vec<Arc<Railway>> {
        self.railways.clone()
    }

    fn all_timetables(&self) -> Vec<Arc<Timetable>> {
        self.timetables.clone()
    }

    fn all_bus_trips(&self) -> Vec<Arc<BusTrip>> {
        self.bus_trips.clone()
    }

    fn all_flights(&self) -> Vec<Arc<Flight>> {
        self.flights.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Point;

    fn railway() -> Railway {
        Railway {
            id: RailwayIdentifier::new("rw"),
            title: "Test Line".into(),
            stations: vec![StationIdentifier::new("s1"), StationIdentifier::new("s2")],
            station_offsets: vec![0.0, 1.5],
            ascending: "Up".into(),
            descending: "Down".into(),
            dynamic: false,
            altitude: None,
        }
    }

    fn timetable(id: &str, train: &str, railway: &str) -> Timetable {
        Timetable {
            id: TimetableIdentifier::new(id),
            train_id: TrainIdentifier::new(train),
            railway_id: RailwayIdentifier::new(railway),
            direction: RailDirection::Ascending,
            stops: vec![
                StopEvent::new(StationIdentifier::new("s1"), None, Some(0.0)),
                StopEvent::new(StationIdentifier::new("s2"), Some(60_000.0), None),
            ],
            destination: None,
            previous: vec![],
            next: vec![],
        }
    }

    #[test]
    fn test_empty_provider() {
        let provider = StaticTransitProvider::new();
        assert_eq!(provider.all_stations().len(), 0);
        assert_eq!(provider.all_railways().len(), 0);
    }

    #[test]
    fn test_provider_lookups() {
        let station = Station {
            id: StationIdentifier::new("s1"),
            name: "Test Station".into(),
            location: Point::new(-0.14, 51.5),
        };

        let provider = StaticTransitProvider::from_data(
            vec![station],
            vec![railway()],
            vec![timetable("t1", "train", "rw"), timetable("t2", "train", "rw")],
            vec![],
            vec![],
        )
        .unwrap();

        assert!(provider.get_station(&StationIdentifier::new("s1")).is_some());
        assert!(provider.get_railway(&RailwayIdentifier::new("rw")).is_some());
        assert!(provider.get_timetable(&TimetableIdentifier::new("t2")).is_some());
        assert_eq!(provider.timetables_for_train(&TrainIdentifier::new("train")).len(), 2);
        assert!(provider.timetables_for_train(&TrainIdentifier::new("other")).is_empty());
    }

    #[test]
    fn test_unknown_railway_rejected() {
        let result = StaticTransitProvider::from_data(
            vec![],
            vec![railway()],
            vec![timetable("t1", "train", "missing")],
            vec![],
            vec![],
        );
        assert!(matches!(result, Err(TransitError::RailwayNotFound(_))));
    }

    #[test]
    fn test_backwards_offsets_rejected() {
        let backwards = Railway {
            station_offsets: vec![1.5, 0.0],
            ..railway()
        };
        let result = StaticTransitProvider::from_data(vec![], vec![backwards], vec![], vec![], vec![]);
        assert!(matches!(result, Err(TransitError::InvalidData(_))));
    }
}
