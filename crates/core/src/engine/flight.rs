use std::sync::Arc;

use railtrack_transit::prelude::*;

use super::Engine;
use crate::clock::Clock;
use crate::error::{EngineError, Result};
use crate::events::LifecycleEvent;
use crate::kinematics::solve_flight;
use crate::vehicle::{FlightState, Leg, VehicleRef};

impl<C: Clock> Engine<C> {
    /// Start a flight; it is retired at its end time
    pub fn start_flight(&mut self, flight: Arc<Flight>) -> Result<()> {
        let vehicle = VehicleRef::Flight(flight.id.clone());
        if self.registry.flights.contains_key(&flight.id) {
            return Err(EngineError::AlreadyRunning(vehicle));
        }

        let now = self.clock.now();
        let profile = solve_flight(flight.length, flight.max_speed, flight.acceleration);
        let timer = self.clock.schedule_after(flight.end - now, vehicle.clone());
        let state = FlightState {
            leg: Leg {
                start: flight.start,
                profile,
            },
            flight,
            timer: Some(timer),
        };

        self.registry.flights.insert(state.flight.id.clone(), state);
        self.emit(LifecycleEvent::Started { vehicle, at: now });
        Ok(())
    }

    pub fn stop_flight(&mut self, id: &FlightIdentifier) -> Option<FlightState> {
        let flight = self.registry.flights.remove(id)?;
        if let Some(timer) = flight.timer {
            self.clock.cancel(timer);
        }
        let vehicle = flight.vehicle_ref();
        self.selection.release(&vehicle);
        let at = self.clock.now();
        self.emit(LifecycleEvent::Retired { vehicle, at });
        Some(flight)
    }

    /// Start every flight that is visible now
    pub fn refresh_flights(&mut self) {
        let now = self.clock.now();
        for flight in self.dataset.all_flights() {
            if flight.is_visible_at(now) && !self.registry.flights.contains_key(&flight.id) {
                let vehicle = VehicleRef::Flight(flight.id.clone());
                if let Err(error) = self.start_flight(flight) {
                    Self::log_start_failure(&vehicle, &error);
                }
            }
        }
    }
}
