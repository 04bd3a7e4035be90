//! Lifecycle notifications for UI and selection bookkeeping.

use crate::vehicle::{Section, VehicleRef};

#[derive(Clone, Debug, PartialEq)]
pub enum LifecycleEvent {
    Started { vehicle: VehicleRef, at: f64 },
    Advanced { vehicle: VehicleRef, section: Section, at: f64 },
    Retired { vehicle: VehicleRef, at: f64 },
}

impl LifecycleEvent {
    pub fn vehicle(&self) -> &VehicleRef {
        match self {
            Self::Started { vehicle, .. }
            | Self::Advanced { vehicle, .. }
            | Self::Retired { vehicle, .. } => vehicle,
        }
    }
}
