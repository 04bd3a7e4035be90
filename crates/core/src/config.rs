//! Engine and live-tracking configuration.
//!
//! Engine durations are milliseconds of simulated time and distances are km.
//! Live-tracking durations are seconds, as delivered by the arrivals feed.

use serde::{Deserialize, Deserializer};

use crate::kinematics::MotionLimits;

/// How the engine's clock relates to wall time
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ClockMode {
    /// Clock follows wall time; trains are confirmed by realtime reports
    #[default]
    Realtime,
    /// Clock is replayed from an arbitrary time; trains follow timetables only
    Playback,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    #[serde(deserialize_with = "limits_from_kmh")]
    pub train_limits: MotionLimits,
    #[serde(deserialize_with = "limits_from_kmh")]
    pub bus_limits: MotionLimits,
    /// Slack subtracted from every scheduled arrival
    pub min_delay: f64,
    pub min_standing_duration: f64,
    pub min_bus_standing_duration: f64,
    /// Re-evaluation interval for vehicles without schedule data
    pub realtime_check_interval: f64,
    /// Refresh bucket size in playback mode
    pub refresh_interval: f64,
    pub clock_mode: ClockMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            train_limits: MotionLimits::from_kmh(80.0, 3.0),
            bus_limits: MotionLimits::from_kmh(40.0, 3.0),
            min_delay: 0.0,
            min_standing_duration: 30_000.0,
            min_bus_standing_duration: 20_000.0,
            realtime_check_interval: 15_000.0,
            refresh_interval: 60_000.0,
            clock_mode: ClockMode::Realtime,
        }
    }
}

/// Limits as written in a config file: `{ "max_speed": km/h, "acceleration": km/h/s }`
#[derive(Deserialize)]
struct LimitsKmh {
    max_speed: f64,
    acceleration: f64,
}

fn limits_from_kmh<'de, D: Deserializer<'de>>(deserializer: D) -> Result<MotionLimits, D::Error> {
    let raw = LimitsKmh::deserialize(deserializer)?;
    if !(raw.max_speed > 0.0 && raw.acceleration > 0.0) {
        return Err(serde::de::Error::custom("speed and acceleration must be positive"));
    }
    Ok(MotionLimits::from_kmh(raw.max_speed, raw.acceleration))
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct LiveTrackConfig {
    /// km/s used when no following prediction implies a speed
    pub default_speed: f64,
    pub min_implied_speed: f64,
    pub max_implied_speed: f64,
    /// Shortest duration (s) a section may be given
    pub min_section_duration: f64,
    /// The section duration is at least this multiple of the time to station
    pub arrival_margin: f64,
    /// Smallest time to station (s) used when computing progress
    pub min_time_to_station: f64,
    pub max_progress: f64,
    pub max_forward_correction: f64,
    /// Progress subtracted per rank among vehicles sharing a section
    pub overlap_spacing: f64,
    /// Records without an update for this long (ms) are retired
    pub stale_after: f64,
}

impl Default for LiveTrackConfig {
    fn default() -> Self {
        Self {
            default_speed: 0.012,
            min_implied_speed: 0.0015,
            max_implied_speed: 0.03,
            min_section_duration: 15.0,
            arrival_margin: 1.05,
            min_time_to_station: 0.1,
            max_progress: 0.99,
            max_forward_correction: 0.2,
            overlap_spacing: 0.02,
            stale_after: 30_000.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: EngineConfig = serde_json::from_str(
            r#"{ "min_standing_duration": 45000, "clock_mode": "playback" }"#,
        )
        .unwrap();
        assert_eq!(config.min_standing_duration, 45_000.0);
        assert_eq!(config.clock_mode, ClockMode::Playback);
        assert_eq!(config.train_limits, EngineConfig::default().train_limits);
    }

    #[test]
    fn test_limits_in_kmh() {
        let config: EngineConfig = serde_json::from_str(
            r#"{ "train_limits": { "max_speed": 36, "acceleration": 3.6 } }"#,
        )
        .unwrap();
        // 36 km/h = 0.00001 km/ms, reached in 10 s
        assert_relative_eq!(config.train_limits.max_speed, 0.00001, epsilon = 1e-15);
        assert_relative_eq!(config.train_limits.max_acceleration_time, 10_000.0, epsilon = 1e-6);
    }

    #[test]
    fn test_rejects_non_positive_limits() {
        let result: Result<EngineConfig, _> =
            serde_json::from_str(r#"{ "bus_limits": { "max_speed": 0, "acceleration": 1 } }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_live_track_defaults() {
        let config = LiveTrackConfig::default();
        assert_eq!(config.stale_after, 30_000.0);
        assert!(config.min_implied_speed < config.default_speed);
        assert!(config.default_speed < config.max_implied_speed);
    }

    #[test]
    fn test_clock_mode_parse() {
        assert_eq!("playback".parse::<ClockMode>().unwrap(), ClockMode::Playback);
        assert_eq!(ClockMode::Realtime.to_string(), "realtime");
    }
}
