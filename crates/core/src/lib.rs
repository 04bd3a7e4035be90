pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod kinematics;
pub mod live;
pub mod section;
pub mod vehicle;

// Re-export transit from the transit crate
pub use railtrack_transit as transit;

pub use clock::{Clock, SimulationClock, TimerToken, WallClock};
pub use config::{ClockMode, EngineConfig, LiveTrackConfig};
pub use engine::{Engine, TickOutcome, VehiclePosition};
pub use error::{EngineError, Result};
pub use events::LifecycleEvent;
pub use vehicle::{Positioned, Section, SectionPosition, VehicleKind, VehicleRef};
