//! The vehicle lifecycle manager.
//!
//! The engine owns every active vehicle and the clock that drives them. All
//! mutation happens on one logical turn: either while dispatching due timers
//! (`run_until` / `tick`) or while applying a realtime report. Renderers read
//! positions between turns.

mod bus;
mod flight;
mod realtime;
mod registry;
mod train;

use std::collections::HashMap;
use std::sync::Arc;

use railtrack_transit::prelude::*;
use tracing::{debug, info, warn};

use crate::clock::{Clock, FiredTimer};
use crate::config::{ClockMode, EngineConfig};
use crate::error::EngineError;
use crate::events::LifecycleEvent;
use crate::vehicle::{PendingStep, Positioned, SectionPosition, VehicleRef};

pub use bus::RealtimeBusReport;
pub use realtime::{RailwayInfo, RailwayStatus, RealtimeTrainReport};
pub use registry::{Selection, VehicleRegistry};
pub use train::StartOptions;

/// What a periodic tick did, and what the caller should do next
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// Timetabled vehicles were refreshed (playback mode)
    pub refreshed: bool,
    /// The realtime feeds should be fetched and applied (realtime mode)
    pub realtime_check_due: bool,
}

/// Interpolated position of one active vehicle
#[derive(Clone, Debug, PartialEq)]
pub struct VehiclePosition {
    pub vehicle: VehicleRef,
    /// Railway for trains; buses and flights run on their own path
    pub railway: Option<RailwayIdentifier>,
    pub position: SectionPosition,
}

pub struct Engine<C: Clock> {
    clock: C,
    config: EngineConfig,
    dataset: Arc<dyn TransitProvider>,
    registry: VehicleRegistry,
    selection: Selection,
    railway_status: HashMap<RailwayIdentifier, RailwayStatus>,
    events: Vec<LifecycleEvent>,
    last_refresh: Option<i64>,
    last_realtime_check: Option<i64>,
}

impl<C: Clock> Engine<C> {
    pub fn new(clock: C, dataset: Arc<dyn TransitProvider>, config: EngineConfig) -> Self {
        Self::with_registry(clock, dataset, config, VehicleRegistry::new())
    }

    pub fn with_registry(
        clock: C,
        dataset: Arc<dyn TransitProvider>,
        config: EngineConfig,
        registry: VehicleRegistry,
    ) -> Self {
        Self {
            clock,
            config,
            dataset,
            registry,
            selection: Selection::default(),
            railway_status: HashMap::new(),
            events: Vec::new(),
            last_refresh: None,
            last_realtime_check: None,
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn dataset(&self) -> &Arc<dyn TransitProvider> {
        &self.dataset
    }

    pub fn registry(&self) -> &VehicleRegistry {
        &self.registry
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Mark an active vehicle (or clear the mark with `None`)
    pub fn mark(&mut self, vehicle: Option<VehicleRef>) -> bool {
        match vehicle {
            Some(vehicle) if !self.registry.contains(&vehicle) => false,
            vehicle => {
                self.selection.marked = vehicle;
                true
            }
        }
    }

    /// Track an active vehicle (or stop tracking with `None`)
    pub fn track(&mut self, vehicle: Option<VehicleRef>) -> bool {
        match vehicle {
            Some(vehicle) if !self.registry.contains(&vehicle) => false,
            vehicle => {
                self.selection.tracked = vehicle;
                true
            }
        }
    }

    /// Lifecycle events emitted since the last call
    pub fn drain_events(&mut self) -> Vec<LifecycleEvent> {
        std::mem::take(&mut self.events)
    }

    fn emit(&mut self, event: LifecycleEvent) {
        debug!(?event, "lifecycle");
        self.events.push(event);
    }

    // ========================================================================
    // Driving
    // ========================================================================

    /// Dispatch every timer due up to `t`, in deadline order
    pub fn run_until(&mut self, t: f64) {
        while let Some(fired) = self.clock.pop_due(t) {
            self.dispatch(fired);
        }
        self.clock.advance_to(t);
    }

    fn dispatch(&mut self, fired: FiredTimer) {
        match &fired.target {
            VehicleRef::Train(id) => {
                let Some(train) = self.registry.trains.get_mut(id) else {
                    return;
                };
                if train.timer != Some(fired.token) {
                    return;
                }
                train.timer = None;
                let step = train.pending;
                match step {
                    PendingStep::Advance(index) => self.advance_train(id, index),
                    PendingStep::Retire => {
                        self.stop_train(id);
                    }
                }
            }
            VehicleRef::Bus(id) => {
                let Some(bus) = self.registry.buses.get_mut(id) else {
                    return;
                };
                if bus.timer != Some(fired.token) {
                    return;
                }
                bus.timer = None;
                let step = bus.pending;
                match step {
                    PendingStep::Advance(index) => self.advance_bus(id, index),
                    PendingStep::Retire => {
                        self.stop_bus(id);
                    }
                }
            }
            VehicleRef::Flight(id) => {
                let due = self
                    .registry
                    .flights
                    .get(id)
                    .is_some_and(|flight| flight.timer == Some(fired.token));
                if due {
                    self.stop_flight(id);
                }
            }
        }
    }

    /// Periodic driver: dispatch due timers and run refreshes whose
    /// interval bucket changed
    pub fn tick(&mut self) -> TickOutcome {
        let now = self.clock.now();
        self.run_until(now);

        let mut outcome = TickOutcome::default();
        let shifted = now - self.config.min_delay;

        let bucket = (shifted / self.config.refresh_interval.max(1.0)).floor() as i64;
        if self.last_refresh != Some(bucket) {
            self.last_refresh = Some(bucket);
            if self.config.clock_mode == ClockMode::Playback {
                self.refresh();
                outcome.refreshed = true;
            }
        }

        let bucket = (shifted / self.config.realtime_check_interval.max(1.0)).floor() as i64;
        if self.last_realtime_check != Some(bucket) {
            self.last_realtime_check = Some(bucket);
            if self.config.clock_mode == ClockMode::Realtime {
                self.refresh_flights();
                self.refresh_buses();
                outcome.realtime_check_due = true;
            }
        }

        outcome
    }

    /// Start every timetabled vehicle whose window is open
    pub fn refresh(&mut self) {
        self.refresh_trains();
        self.refresh_flights();
        self.refresh_buses();
    }

    /// Retire every vehicle and forget all realtime state
    pub fn stop_all(&mut self) {
        let count = self.registry.active_count();

        let trains: Vec<_> = self.registry.trains.keys().cloned().collect();
        for id in trains {
            self.stop_train(&id);
        }
        let flights: Vec<_> = self.registry.flights.keys().cloned().collect();
        for id in flights {
            self.stop_flight(&id);
        }
        let buses: Vec<_> = self.registry.buses.keys().cloned().collect();
        for id in buses {
            self.stop_bus(&id);
        }
        self.registry.clear();
        self.last_refresh = None;
        self.last_realtime_check = None;

        info!(count, "stopped all vehicles");
    }

    /// Swap in a freshly loaded dataset (daily boundary or explicit refresh)
    pub fn replace_dataset(&mut self, dataset: Arc<dyn TransitProvider>) {
        self.stop_all();
        self.railway_status.clear();
        self.dataset = dataset;
        info!(
            railways = self.dataset.all_railways().len(),
            timetables = self.dataset.all_timetables().len(),
            "dataset replaced"
        );
    }

    // ========================================================================
    // Reading
    // ========================================================================

    pub fn position_of(&self, vehicle: &VehicleRef) -> Option<SectionPosition> {
        let now = self.clock.now();
        match vehicle {
            VehicleRef::Train(id) => self.registry.trains.get(id)?.position_at(now),
            VehicleRef::Bus(id) => self.registry.buses.get(id)?.position_at(now),
            VehicleRef::Flight(id) => self.registry.flights.get(id)?.position_at(now),
        }
    }

    /// Positions of every active vehicle at the clock's current time
    pub fn positions(&self) -> Vec<VehiclePosition> {
        let now = self.clock.now();
        let trains = self.registry.trains.values().filter_map(|train| {
            Some(VehiclePosition {
                vehicle: train.vehicle_ref(),
                railway: Some(train.railway_id.clone()),
                position: train.position_at(now)?,
            })
        });
        let buses = self.registry.buses.values().filter_map(|bus| {
            Some(VehiclePosition {
                vehicle: bus.vehicle_ref(),
                railway: None,
                position: bus.position_at(now)?,
            })
        });
        let flights = self.registry.flights.values().filter_map(|flight| {
            Some(VehiclePosition {
                vehicle: flight.vehicle_ref(),
                railway: None,
                position: flight.position_at(now)?,
            })
        });
        trains.chain(buses).chain(flights).collect()
    }

    pub fn railway_status(&self, id: &RailwayIdentifier) -> Option<&RailwayStatus> {
        self.railway_status.get(id)
    }

    fn log_start_failure(vehicle: &VehicleRef, error: &EngineError) {
        match error {
            EngineError::EndOfRun(_) => debug!(%vehicle, "nothing left to run"),
            error if error.is_refusal() => debug!(%vehicle, %error, "start refused"),
            error => warn!(%vehicle, %error, "vehicle not started"),
        }
    }
}
