use std::sync::Arc;

use railtrack_transit::prelude::*;
use serde::Deserialize;
use tracing::debug;

use super::Engine;
use crate::clock::Clock;
use crate::error::{EngineError, Result};
use crate::events::LifecycleEvent;
use crate::kinematics::{solve, TimingWindow};
use crate::section::assign_bus;
use crate::vehicle::{Bus, Leg, PendingStep};

/// Extra room a bus leg may take beyond the next departure (ms)
const DEPARTURE_WINDOW: f64 = 60_000.0;

/// One vehicle position from a bus realtime feed
#[derive(Clone, Debug, Deserialize)]
pub struct RealtimeBusReport {
    pub trip_id: TripIdentifier,
    /// Stop the bus is at or heading for
    #[serde(default)]
    pub stop: Option<StationIdentifier>,
    /// Distance along the route shape (km), used when no stop is reported
    #[serde(default)]
    pub route_offset: Option<f64>,
}

impl<C: Clock> Engine<C> {
    pub fn start_bus(&mut self, mut bus: Bus) -> Result<()> {
        if self.registry.buses.contains_key(&bus.trip.id) {
            return Err(EngineError::AlreadyRunning(bus.vehicle_ref()));
        }
        let now = self.clock.now();
        assign_bus(&mut bus, None, false, now)?;

        let id = bus.trip.id.clone();
        let vehicle = bus.vehicle_ref();
        self.registry.buses.insert(id.clone(), bus);
        self.emit(LifecycleEvent::Started { vehicle, at: now });
        self.advance_bus(&id, None);
        Ok(())
    }

    /// Move a bus on by one stop. Timetabled buses pass the stop index they
    /// depart from next; realtime buses follow their reported stop.
    pub(super) fn advance_bus(&mut self, id: &TripIdentifier, mut index: Option<usize>) {
        loop {
            let now = self.clock.now();
            let confirmed = self.registry.realtime_buses.contains(id);
            let Some(bus) = self.registry.buses.get_mut(id) else {
                return;
            };
            if let Some(timer) = bus.timer.take() {
                self.clock.cancel(timer);
            }

            let realtime = bus.is_realtime();
            let assigned = if realtime {
                assign_bus(bus, None, !confirmed, now)
            } else {
                assign_bus(bus, index, false, now)
            };
            let final_leg = assigned.is_err();
            let standing = self.config.min_bus_standing_duration;

            let moving = match (final_leg, bus.section) {
                (false, Some(section)) if section.length > 0 => Some(section),
                _ => None,
            };

            if let Some(section) = moving {
                let distance = bus
                    .trip
                    .section_distance(section.index, section.length.unsigned_abs())
                    .unwrap_or(0.0);
                let next_index = (!realtime).then_some(section.index + 1);
                let vehicle = bus.vehicle_ref();

                if distance <= 0.0 {
                    // Stops sharing coordinates on the route shape
                    debug!(%vehicle, index = section.index, "zero length bus section");
                    self.emit(LifecycleEvent::Advanced {
                        vehicle,
                        section,
                        at: now,
                    });
                    index = next_index;
                    continue;
                }

                let departure = match (index, bus.departure_time) {
                    (Some(_), Some(scheduled)) => {
                        let standing = if self.clock.speed() == 1.0 { standing } else { 0.0 };
                        scheduled.max(now + standing)
                    }
                    (None, Some(scheduled)) => scheduled,
                    (_, None) => now,
                };
                let window = TimingWindow {
                    min_duration: None,
                    max_duration: bus.next_departure_time.map(|next| {
                        next - standing + DEPARTURE_WINDOW - self.config.min_delay - departure
                    }),
                };
                let profile = solve(distance, &window, &self.config.bus_limits);
                bus.leg = Some(Leg {
                    start: departure,
                    profile,
                });
                bus.pending = PendingStep::Advance(next_index);
                bus.timer = Some(
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

            let wait = if !realtime {
                (bus.next_departure_time.unwrap_or(now) - now).max(standing)
            } else if final_leg {
                standing
            } else {
                self.config.realtime_check_interval
            };
            bus.pending = if final_leg {
                PendingStep::Retire
            } else {
                PendingStep::Advance(None)
            };
            bus.timer = Some(self.clock.schedule_after(wait, bus.vehicle_ref()));
            return;
        }
    }

    pub fn stop_bus(&mut self, id: &TripIdentifier) -> Option<Bus> {
        let bus = self.registry.buses.remove(id)?;
        if let Some(timer) = bus.timer {
            self.clock.cancel(timer);
        }
        let vehicle = bus.vehicle_ref();
        self.selection.release(&vehicle);
        let at = self.clock.now();
        self.emit(LifecycleEvent::Retired { vehicle, at });
        Some(bus)
    }

    /// Start every visible bus trip whose departures span the current time
    pub fn refresh_buses(&mut self) {
        let now = self.clock.now();
        for trip in self.dataset.all_bus_trips() {
            if trip.hidden || !trip.is_running_at(now) || self.registry.buses.contains_key(&trip.id) {
                continue;
            }
            let bus = Bus::new(trip);
            let vehicle = bus.vehicle_ref();
            if let Err(error) = self.start_bus(bus) {
                Self::log_start_failure(&vehicle, &error);
            }
        }
    }

    /// Apply a bus vehicle-position feed.
    ///
    /// Reported buses follow their reported stop; buses no longer reported
    /// finish their current leg and retire.
    pub fn apply_realtime_buses(&mut self, reports: &[RealtimeBusReport]) {
        self.registry.realtime_buses.clear();

        for report in reports {
            if report.stop.is_none() && report.route_offset.is_none() {
                continue;
            }
            self.registry.realtime_buses.insert(report.trip_id.clone());

            let Some(trip) = self.dataset.get_bus_trip(&report.trip_id) else {
                continue;
            };
            if trip.hidden {
                continue;
            }
            let stop = report
                .stop
                .clone()
                .or_else(|| report.route_offset.and_then(|offset| stop_near_offset(&trip, offset)));
            let Some(stop) = stop else {
                continue;
            };

            if let Some(bus) = self.registry.buses.get_mut(&trip.id) {
                bus.current_stop = Some(stop);
                continue;
            }
            let mut bus = Bus::new(trip);
            bus.current_stop = Some(stop);
            let vehicle = bus.vehicle_ref();
            if let Err(error) = self.start_bus(bus) {
                Self::log_start_failure(&vehicle, &error);
            }
        }
    }
}

/// The stop a bus at `offset` along its route is heading for
fn stop_near_offset(trip: &Arc<BusTrip>, offset: f64) -> Option<StationIdentifier> {
    let last = trip.stop_offsets.len().checked_sub(1)?;
    let index = trip
        .stop_offsets
        .iter()
        .rposition(|&stop_offset| stop_offset < offset)
        .map_or(0, |i| (i + 1).min(last));
    trip.stops.get(index).cloned()
}
