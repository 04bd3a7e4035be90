//! Vehicle instances and the position they expose to renderers.

use std::fmt;
use std::sync::Arc;

use railtrack_transit::prelude::*;

use crate::clock::TimerToken;
use crate::kinematics::MotionProfile;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum VehicleKind {
    Train,
    Bus,
    Flight,
}

/// Stable reference to a vehicle instance in one of the registries
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum VehicleRef {
    Train(TrainIdentifier),
    Bus(TripIdentifier),
    Flight(FlightIdentifier),
}

impl VehicleRef {
    pub fn kind(&self) -> VehicleKind {
        match self {
            Self::Train(_) => VehicleKind::Train,
            Self::Bus(_) => VehicleKind::Bus,
            Self::Flight(_) => VehicleKind::Flight,
        }
    }
}

impl fmt::Display for VehicleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Train(id) => write!(f, "train:{id}"),
            Self::Bus(id) => write!(f, "bus:{id}"),
            Self::Flight(id) => write!(f, "flight:{id}"),
        }
    }
}

/// The leg a vehicle is travelling: from station index `index` across
/// `length` indices (negative when travelling towards lower indices)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Section {
    pub index: usize,
    pub length: isize,
}

impl Section {
    pub fn new(index: usize, length: isize) -> Self {
        Self { index, length }
    }

    /// Station index at the far end of the section
    pub fn end(&self) -> isize {
        self.index as isize + self.length
    }
}

/// Motion currently being animated
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Leg {
    /// Clock time at which the vehicle departs
    pub start: f64,
    pub profile: MotionProfile,
}

impl Leg {
    pub fn end(&self) -> f64 {
        self.start + self.profile.duration
    }

    pub fn progress_at(&self, now: f64) -> f64 {
        if now <= self.start && !self.profile.is_stationary() {
            return 0.0;
        }
        self.profile.progress_at(now - self.start)
    }
}

/// Where a vehicle is within its current section.
///
/// The renderer turns this into coordinates using the path the vehicle runs
/// on (railway, bus route shape or flight path).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SectionPosition {
    pub section: Section,
    /// 0 at the departure station, 1 at the arrival station
    pub progress: f64,
}

/// Anything that can report its interpolated position at a given time
pub trait Positioned {
    fn position_at(&self, now: f64) -> Option<SectionPosition>;
}

/// What happens when a vehicle's pending timer fires
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PendingStep {
    /// Move to the next section; `Some(i)` names the next timetable stop
    Advance(Option<usize>),
    Retire,
}

// ============================================================================
// Trains
// ============================================================================

/// A live train, either bound to a timetable or driven only by realtime data
#[derive(Clone, Debug)]
pub struct Train {
    pub id: TrainIdentifier,
    pub railway_id: RailwayIdentifier,
    pub direction: RailDirection,
    pub timetable: Option<Arc<Timetable>>,
    pub train_type: Option<Arc<str>>,
    pub origin: Option<StationIdentifier>,
    pub destination: Option<StationIdentifier>,
    /// Last station reported by the realtime feed (trains without timetable)
    pub from_station: Option<StationIdentifier>,
    /// Next station reported by the realtime feed (trains without timetable)
    pub to_station: Option<StationIdentifier>,
    pub delay: f64,
    pub car_composition: Option<u32>,

    pub section: Option<Section>,
    pub timetable_index: usize,
    pub departure_station: Option<StationIdentifier>,
    pub arrival_station: Option<StationIdentifier>,
    pub departure_time: Option<f64>,
    pub arrival_time: Option<f64>,
    pub next_departure_time: Option<f64>,
    pub leg: Option<Leg>,

    pub(crate) timer: Option<TimerToken>,
    pub(crate) pending: PendingStep,
}

impl Train {
    pub fn from_timetable(timetable: Arc<Timetable>) -> Self {
        let mut train = Self::bare(
            timetable.train_id.clone(),
            timetable.railway_id.clone(),
            timetable.direction,
        );
        train.destination = timetable.destination.clone();
        train.timetable = Some(timetable);
        train
    }

    /// A train known only from realtime reports
    pub fn ad_hoc(id: TrainIdentifier, railway_id: RailwayIdentifier, direction: RailDirection) -> Self {
        Self::bare(id, railway_id, direction)
    }

    fn bare(id: TrainIdentifier, railway_id: RailwayIdentifier, direction: RailDirection) -> Self {
        Self {
            id,
            railway_id,
            direction,
            timetable: None,
            train_type: None,
            origin: None,
            destination: None,
            from_station: None,
            to_station: None,
            delay: 0.0,
            car_composition: None,
            section: None,
            timetable_index: 0,
            departure_station: None,
            arrival_station: None,
            departure_time: None,
            arrival_time: None,
            next_departure_time: None,
            leg: None,
            timer: None,
            pending: PendingStep::Retire,
        }
    }

    pub fn vehicle_ref(&self) -> VehicleRef {
        VehicleRef::Train(self.id.clone())
    }

    pub fn timetable_id(&self) -> Option<&TimetableIdentifier> {
        self.timetable.as_ref().map(|t| &t.id)
    }

    /// Still heading for a station (not yet at the end of its run)
    pub fn has_pending_arrival(&self) -> bool {
        self.arrival_station.is_some()
    }
}

impl Positioned for Train {
    fn position_at(&self, now: f64) -> Option<SectionPosition> {
        let section = self.section?;
        let progress = self.leg.map_or(0.0, |leg| leg.progress_at(now));
        Some(SectionPosition { section, progress })
    }
}

// ============================================================================
// Buses
// ============================================================================

#[derive(Clone, Debug)]
pub struct Bus {
    pub trip: Arc<BusTrip>,
    /// Stop reported by the realtime feed; realtime buses ignore the timetable
    pub current_stop: Option<StationIdentifier>,
    pub section: Option<Section>,
    pub departure_time: Option<f64>,
    pub next_departure_time: Option<f64>,
    pub leg: Option<Leg>,

    pub(crate) timer: Option<TimerToken>,
    pub(crate) pending: PendingStep,
}

impl Bus {
    pub fn new(trip: Arc<BusTrip>) -> Self {
        Self {
            trip,
            current_stop: None,
            section: None,
            departure_time: None,
            next_departure_time: None,
            leg: None,
            timer: None,
            pending: PendingStep::Retire,
        }
    }

    pub fn vehicle_ref(&self) -> VehicleRef {
        VehicleRef::Bus(self.trip.id.clone())
    }

    pub fn is_realtime(&self) -> bool {
        self.current_stop.is_some()
    }
}

impl Positioned for Bus {
    fn position_at(&self, now: f64) -> Option<SectionPosition> {
        let section = self.section?;
        let progress = self.leg.map_or(0.0, |leg| leg.progress_at(now));
        Some(SectionPosition { section, progress })
    }
}

// ============================================================================
// Flights
// ============================================================================

#[derive(Clone, Debug)]
pub struct FlightState {
    pub flight: Arc<Flight>,
    pub leg: Leg,

    pub(crate) timer: Option<TimerToken>,
}

impl FlightState {
    pub fn vehicle_ref(&self) -> VehicleRef {
        VehicleRef::Flight(self.flight.id.clone())
    }
}

impl Positioned for FlightState {
    /// A flight path is a single section
    fn position_at(&self, now: f64) -> Option<SectionPosition> {
        Some(SectionPosition {
            section: Section::new(0, 1),
            progress: self.leg.progress_at(now),
        })
    }
}
