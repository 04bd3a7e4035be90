use std::collections::{HashMap, HashSet};

use railtrack_transit::prelude::*;

use crate::vehicle::{Bus, FlightState, Train, VehicleRef};

/// Active, standby and realtime-confirmed vehicles.
///
/// Owned by exactly one engine; renderers read it between turns.
#[derive(Debug, Default)]
pub struct VehicleRegistry {
    pub(crate) trains: HashMap<TrainIdentifier, Train>,
    /// Trains reported by the realtime feed whose window has not opened yet
    pub(crate) standby: HashMap<TimetableIdentifier, Train>,
    pub(crate) realtime_trains: HashSet<TrainIdentifier>,
    pub(crate) buses: HashMap<TripIdentifier, Bus>,
    pub(crate) realtime_buses: HashSet<TripIdentifier>,
    pub(crate) flights: HashMap<FlightIdentifier, FlightState>,
}

impl VehicleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn train(&self, id: &TrainIdentifier) -> Option<&Train> {
        self.trains.get(id)
    }

    pub fn trains(&self) -> impl Iterator<Item = &Train> {
        self.trains.values()
    }

    pub fn standby_train(&self, id: &TimetableIdentifier) -> Option<&Train> {
        self.standby.get(id)
    }

    pub fn is_confirmed(&self, id: &TrainIdentifier) -> bool {
        self.realtime_trains.contains(id)
    }

    pub fn bus(&self, id: &TripIdentifier) -> Option<&Bus> {
        self.buses.get(id)
    }

    pub fn buses(&self) -> impl Iterator<Item = &Bus> {
        self.buses.values()
    }

    pub fn flight(&self, id: &FlightIdentifier) -> Option<&FlightState> {
        self.flights.get(id)
    }

    pub fn flights(&self) -> impl Iterator<Item = &FlightState> {
        self.flights.values()
    }

    pub fn contains(&self, vehicle: &VehicleRef) -> bool {
        match vehicle {
            VehicleRef::Train(id) => self.trains.contains_key(id),
            VehicleRef::Bus(id) => self.buses.contains_key(id),
            VehicleRef::Flight(id) => self.flights.contains_key(id),
        }
    }

    pub fn active_count(&self) -> usize {
        self.trains.len() + self.buses.len() + self.flights.len()
    }

    pub(crate) fn clear(&mut self) {
        self.trains.clear();
        self.standby.clear();
        self.realtime_trains.clear();
        self.buses.clear();
        self.realtime_buses.clear();
        self.flights.clear();
    }
}

/// The vehicle shown in the detail popup and the one the camera follows
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Selection {
    pub marked: Option<VehicleRef>,
    pub tracked: Option<VehicleRef>,
}

impl Selection {
    /// Drop any reference to a retiring vehicle, reporting what it held
    pub(crate) fn release(&mut self, vehicle: &VehicleRef) -> (bool, bool) {
        let marked = self.marked.as_ref() == Some(vehicle);
        let tracked = self.tracked.as_ref() == Some(vehicle);
        if marked {
            self.marked = None;
        }
        if tracked {
            self.tracked = None;
        }
        (marked, tracked)
    }

    pub(crate) fn holds(&self, vehicle: &VehicleRef) -> (bool, bool) {
        (
            self.marked.as_ref() == Some(vehicle),
            self.tracked.as_ref() == Some(vehicle),
        )
    }
}
