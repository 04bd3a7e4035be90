//! Motion profiles for a single section.
//!
//! A vehicle accelerates, optionally cruises, and decelerates over a section
//! of known length. When the timetable dictates how long the section must
//! take, the profile is stretched or squeezed so that it still covers exactly
//! the section length in exactly the dictated time.
//!
//! Units are whatever the caller uses consistently; the engine uses km and
//! milliseconds.

use serde::Deserialize;

/// Physical limits of a vehicle kind
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct MotionLimits {
    pub max_speed: f64,
    pub acceleration: f64,
    /// Time needed to reach `max_speed` from standstill
    pub max_acceleration_time: f64,
}

impl MotionLimits {
    pub fn new(max_speed: f64, acceleration: f64) -> Self {
        Self {
            max_speed,
            acceleration,
            max_acceleration_time: max_speed / acceleration,
        }
    }

    /// Limits from km/h and km/h per second, expressed in km and milliseconds
    pub fn from_kmh(max_speed_kmh: f64, acceleration_kmh_per_s: f64) -> Self {
        Self::new(max_speed_kmh / 3_600_000.0, acceleration_kmh_per_s / 3_600_000.0 / 1000.0)
    }

    /// Distance covered while accelerating to full speed
    pub fn max_acc_distance(&self) -> f64 {
        self.acceleration * self.max_acceleration_time * self.max_acceleration_time / 2.0
    }
}

/// Bounds on how long a section may take
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TimingWindow {
    pub min_duration: Option<f64>,
    pub max_duration: Option<f64>,
}

impl TimingWindow {
    pub fn unconstrained() -> Self {
        Self::default()
    }

    pub fn between(min_duration: f64, max_duration: f64) -> Self {
        Self {
            min_duration: Some(min_duration),
            max_duration: Some(max_duration),
        }
    }

    /// A window whose upper bound has already passed constrains nothing
    pub fn is_active(&self) -> bool {
        match self.max_duration {
            Some(max) => max > 0.0,
            None => self.min_duration.is_some_and(|min| min > 0.0),
        }
    }

    /// Clamp into the window; the upper bound wins if the bounds cross
    pub fn clamp(&self, duration: f64) -> f64 {
        let lower = self.min_duration.unwrap_or(0.0).max(0.0);
        let upper = self.max_duration.unwrap_or(f64::INFINITY);
        duration.max(lower).min(upper)
    }
}

/// Accelerate / cruise / decelerate profile over one section
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MotionProfile {
    pub distance: f64,
    pub duration: f64,
    pub acceleration_time: f64,
    pub acceleration: f64,
    pub deceleration_time: f64,
    pub deceleration: f64,
    /// Cruise speed reached after `acceleration_time`
    pub max_speed: f64,
}

impl MotionProfile {
    /// The profile of a vehicle that does not move
    pub fn stationary() -> Self {
        Self {
            distance: 0.0,
            duration: 0.0,
            acceleration_time: 0.0,
            acceleration: 0.0,
            deceleration_time: 0.0,
            deceleration: 0.0,
            max_speed: 0.0,
        }
    }

    fn symmetric(distance: f64, duration: f64, acceleration_time: f64, acceleration: f64) -> Self {
        Self {
            distance,
            duration,
            acceleration_time,
            acceleration,
            deceleration_time: acceleration_time,
            deceleration: acceleration,
            max_speed: acceleration * acceleration_time,
        }
    }

    pub fn is_stationary(&self) -> bool {
        self.distance <= 0.0 || self.duration <= 0.0
    }

    /// Distance covered `t` after departure
    pub fn distance_at(&self, t: f64) -> f64 {
        if self.is_stationary() {
            return self.distance;
        }
        let t = t.clamp(0.0, self.duration);
        let remaining = self.duration - t;

        if t <= self.acceleration_time {
            self.acceleration * t * t / 2.0
        } else if remaining <= self.deceleration_time {
            self.distance - self.deceleration * remaining * remaining / 2.0
        } else {
            let accelerated = self.acceleration * self.acceleration_time * self.acceleration_time / 2.0;
            accelerated + self.max_speed * (t - self.acceleration_time)
        }
    }

    /// Fraction of the section covered `t` after departure
    pub fn progress_at(&self, t: f64) -> f64 {
        if self.is_stationary() {
            return 1.0;
        }
        (self.distance_at(t) / self.distance).clamp(0.0, 1.0)
    }
}

/// Solve the motion profile for a section of `distance`.
///
/// Without an active window the vehicle runs at its physical limits. With
/// one, the duration is clamped into it and the acceleration (and cruise
/// speed) re-derived so that `distance` is still covered exactly.
pub fn solve(distance: f64, window: &TimingWindow, limits: &MotionLimits) -> MotionProfile {
    if !(distance > 0.0) {
        return MotionProfile::stationary();
    }

    let max_acc_distance = limits.max_acc_distance();

    if distance <= max_acc_distance * 2.0 {
        // No room to reach full speed: triangular profile
        let mut acceleration = limits.acceleration;
        let mut duration = (distance / acceleration).sqrt() * 2.0;
        if window.is_active() {
            duration = window.clamp(duration);
            acceleration = distance * 4.0 / duration / duration;
        }
        return MotionProfile::symmetric(distance, duration, duration / 2.0, acceleration);
    }

    let mut acceleration = limits.acceleration;
    let mut max_speed = limits.max_speed;
    let mut duration =
        limits.max_acceleration_time * 2.0 + (distance - max_acc_distance * 2.0) / max_speed;

    if window.is_active() {
        duration = window.clamp(duration);
        let triangle_half = acceleration * duration * duration / 8.0;
        if distance >= triangle_half * 2.0 {
            // Even accelerating the whole first half at the current rate falls
            // short, so accelerate harder without cruising
            max_speed = distance * 2.0 / duration;
            acceleration = max_speed * 2.0 / duration;
        } else {
            max_speed = acceleration * duration / 2.0
                - (acceleration * (triangle_half * 2.0 - distance)).sqrt();
        }
    }

    MotionProfile::symmetric(distance, duration, max_speed / acceleration, acceleration)
}

/// Profile of a flight over its whole path.
///
/// A positive `acceleration` accelerates from standstill (departures), a
/// negative one decelerates to standstill at the end (arrivals).
pub fn solve_flight(distance: f64, max_speed: f64, acceleration: f64) -> MotionProfile {
    if !(distance > 0.0) || !(max_speed > 0.0) {
        return MotionProfile::stationary();
    }
    let (acc, dec) = if acceleration > 0.0 {
        (acceleration, 0.0)
    } else {
        (0.0, -acceleration)
    };
    let acceleration_time = if acc > 0.0 { max_speed / acc } else { 0.0 };
    let deceleration_time = if dec > 0.0 { max_speed / dec } else { 0.0 };

    MotionProfile {
        distance,
        duration: acceleration_time / 2.0 + distance / max_speed + deceleration_time / 2.0,
        acceleration_time,
        acceleration: acc,
        deceleration_time,
        deceleration: dec,
        max_speed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn limits() -> MotionLimits {
        // maxAccelerationTime = 10, maxAccDistance = 50
        MotionLimits::new(10.0, 1.0)
    }

    #[test]
    fn test_max_acc_distance() {
        assert_relative_eq!(limits().max_acc_distance(), 50.0);
        assert_relative_eq!(limits().max_acceleration_time, 10.0);
    }

    #[test]
    fn test_trapezoid_without_window() {
        let profile = solve(2000.0, &TimingWindow::unconstrained(), &limits());
        assert_relative_eq!(profile.duration, 20.0 + (2000.0 - 100.0) / 10.0);
        assert_relative_eq!(profile.acceleration_time, 10.0);
        assert_relative_eq!(profile.distance_at(profile.duration), 2000.0);
        assert_relative_eq!(profile.distance_at(10.0), 50.0);
        assert_relative_eq!(profile.distance_at(profile.duration / 2.0), 1000.0, epsilon = 1e-9);
    }

    #[test]
    fn test_triangle_without_window() {
        let profile = solve(64.0, &TimingWindow::unconstrained(), &limits());
        assert_relative_eq!(profile.duration, 16.0);
        assert_relative_eq!(profile.acceleration_time, 8.0);
        assert_relative_eq!(profile.distance_at(8.0), 32.0);
        assert_relative_eq!(profile.distance_at(16.0), 64.0);
    }

    #[test]
    fn test_triangle_stretched_into_window() {
        let window = TimingWindow::between(40.0, 100.0);
        let profile = solve(64.0, &window, &limits());
        assert_relative_eq!(profile.duration, 40.0);
        assert_relative_eq!(profile.acceleration, 4.0 * 64.0 / 1600.0, epsilon = 1e-12);
        assert_relative_eq!(profile.distance_at(20.0), 32.0, epsilon = 1e-9);
        assert_relative_eq!(profile.distance_at(40.0), 64.0);
    }

    #[test]
    fn test_trapezoid_squeezed_below_triangle() {
        // Natural duration is 210; squeeze to 60 where a = 1 cannot make it
        let window = TimingWindow::between(0.0, 60.0);
        let profile = solve(2000.0, &window, &limits());
        assert_relative_eq!(profile.duration, 60.0);
        assert_relative_eq!(profile.acceleration_time, 30.0, epsilon = 1e-9);
        assert_relative_eq!(profile.distance_at(30.0), 1000.0, epsilon = 1e-6);
        assert_relative_eq!(profile.distance_at(60.0), 2000.0);
    }

    #[test]
    fn test_trapezoid_stretched_with_cruise() {
        let window = TimingWindow::between(300.0, 360.0);
        let profile = solve(2000.0, &window, &limits());
        assert_relative_eq!(profile.duration, 300.0);
        assert!(profile.max_speed < 10.0);
        let cruise_end = profile.duration - profile.deceleration_time;
        assert_relative_eq!(
            profile.distance_at(cruise_end),
            2000.0 - profile.acceleration * profile.deceleration_time.powi(2) / 2.0,
            epsilon = 1e-6
        );
        // Cruise phase joins the acceleration phase continuously
        let joined = profile.acceleration * profile.acceleration_time.powi(2) / 2.0
            + profile.max_speed * (cruise_end - profile.acceleration_time);
        assert_relative_eq!(joined, profile.distance_at(cruise_end), epsilon = 1e-6);
    }

    #[test]
    fn test_window_always_respected() {
        let windows = [
            TimingWindow::between(5.0, 8.0),
            TimingWindow::between(100.0, 160.0),
            TimingWindow::between(250.0, 310.0),
            TimingWindow {
                min_duration: None,
                max_duration: Some(30.0),
            },
        ];
        for distance in [1.0, 64.0, 100.0, 500.0, 2000.0] {
            for window in &windows {
                let profile = solve(distance, window, &limits());
                let lower = window.min_duration.unwrap_or(0.0);
                let upper = window.max_duration.unwrap();
                assert!(profile.duration >= lower - 1e-9);
                assert!(profile.duration <= upper + 1e-9);
                assert_relative_eq!(
                    profile.distance_at(profile.duration),
                    distance,
                    epsilon = 1e-6
                );
                // Motion never runs backward
                let mut last = 0.0;
                for step in 0..=100 {
                    let d = profile.distance_at(profile.duration * step as f64 / 100.0);
                    assert!(d + 1e-9 >= last);
                    last = d;
                }
            }
        }
    }

    #[test]
    fn test_inactive_window_is_ignored() {
        let window = TimingWindow::between(0.0, -5.0);
        assert!(!window.is_active());
        let profile = solve(2000.0, &window, &limits());
        assert_relative_eq!(profile.duration, 210.0);
    }

    #[test]
    fn test_zero_distance() {
        let profile = solve(0.0, &TimingWindow::between(10.0, 20.0), &limits());
        assert!(profile.is_stationary());
        assert_eq!(profile.duration, 0.0);
        assert_eq!(profile.progress_at(0.0), 1.0);
    }

    #[test]
    fn test_flight_profiles() {
        let departure = solve_flight(100.0, 2.0, 0.1);
        assert_relative_eq!(departure.acceleration_time, 20.0);
        assert_relative_eq!(departure.duration, 10.0 + 50.0);
        assert_relative_eq!(departure.distance_at(departure.duration), 100.0);
        assert_relative_eq!(departure.distance_at(20.0), 20.0);

        let arrival = solve_flight(100.0, 2.0, -0.1);
        assert_relative_eq!(arrival.deceleration_time, 20.0);
        assert_relative_eq!(arrival.distance_at(10.0), 20.0);
        assert_relative_eq!(arrival.distance_at(arrival.duration), 100.0);
    }

    #[test]
    fn test_from_kmh() {
        let limits = MotionLimits::from_kmh(90.0, 3.0);
        assert_relative_eq!(limits.max_speed, 0.025 / 1000.0);
        assert_relative_eq!(limits.max_acceleration_time, 30_000.0, epsilon = 1e-6);
    }
}
