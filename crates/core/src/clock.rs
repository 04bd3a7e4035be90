//! The clock contract the engine is driven by.
//!
//! Timers deliver events instead of running callbacks: a fired timer names
//! the vehicle it belongs to, and the engine dispatches it. A cancelled
//! timer is never returned.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use chrono::{DateTime, Utc};

use crate::vehicle::VehicleRef;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(u64);

#[derive(Clone, Debug, PartialEq)]
pub struct FiredTimer {
    pub token: TimerToken,
    pub target: VehicleRef,
    pub deadline: f64,
}

pub trait Clock {
    /// Current simulated time in milliseconds
    fn now(&self) -> f64;

    /// Simulated milliseconds per wall-clock millisecond
    fn speed(&self) -> f64;

    /// Schedule a timer `duration` simulated milliseconds from now
    fn schedule_after(&mut self, duration: f64, target: VehicleRef) -> TimerToken;

    fn cancel(&mut self, token: TimerToken);

    /// Pop the earliest live timer due at or before `until`.
    ///
    /// Implementations that own their time advance `now` to the returned
    /// deadline so that dispatching observes the time the timer fired at.
    fn pop_due(&mut self, until: f64) -> Option<FiredTimer>;

    /// Move time forward to `t` once every due timer has been dispatched
    fn advance_to(&mut self, t: f64);
}

// ============================================================================
// Timer queue
// ============================================================================

#[derive(Debug)]
struct Scheduled {
    deadline: f64,
    token: TimerToken,
    target: VehicleRef,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    // Reversed so the max-heap yields the earliest deadline, ties in
    // scheduling order
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .total_cmp(&self.deadline)
            .then_with(|| other.token.cmp(&self.token))
    }
}

/// Cancellable timers ordered by deadline
#[derive(Debug, Default)]
pub struct TimerQueue {
    heap: BinaryHeap<Scheduled>,
    live: HashSet<TimerToken>,
    next_token: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, deadline: f64, target: VehicleRef) -> TimerToken {
        let token = TimerToken(self.next_token);
        self.next_token += 1;
        self.live.insert(token);
        self.heap.push(Scheduled {
            deadline,
            token,
            target,
        });
        token
    }

    pub fn cancel(&mut self, token: TimerToken) {
        self.live.remove(&token);
    }

    pub fn pop_due(&mut self, until: f64) -> Option<FiredTimer> {
        while let Some(head) = self.heap.peek() {
            if head.deadline > until {
                return None;
            }
            let Some(scheduled) = self.heap.pop() else {
                break;
            };
            if self.live.remove(&scheduled.token) {
                return Some(FiredTimer {
                    token: scheduled.token,
                    target: scheduled.target,
                    deadline: scheduled.deadline,
                });
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.live.clear();
    }
}

// ============================================================================
// Simulation clock
// ============================================================================

/// A clock whose time only moves when told to
#[derive(Debug)]
pub struct SimulationClock {
    now: f64,
    speed: f64,
    timers: TimerQueue,
}

impl SimulationClock {
    pub fn new(now: f64) -> Self {
        Self {
            now,
            speed: 1.0,
            timers: TimerQueue::new(),
        }
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    pub fn set_speed(&mut self, speed: f64) {
        self.speed = speed;
    }

    /// Jump to `t` without dispatching anything
    pub fn set_time(&mut self, t: f64) {
        self.now = t;
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }
}

impl Clock for SimulationClock {
    fn now(&self) -> f64 {
        self.now
    }

    fn speed(&self) -> f64 {
        self.speed
    }

    fn schedule_after(&mut self, duration: f64, target: VehicleRef) -> TimerToken {
        self.timers.schedule(self.now + duration.max(0.0), target)
    }

    fn cancel(&mut self, token: TimerToken) {
        self.timers.cancel(token);
    }

    fn pop_due(&mut self, until: f64) -> Option<FiredTimer> {
        let fired = self.timers.pop_due(until)?;
        self.now = self.now.max(fired.deadline);
        Some(fired)
    }

    fn advance_to(&mut self, t: f64) {
        self.now = self.now.max(t);
    }
}

// ============================================================================
// Wall clock
// ============================================================================

/// Simulated time derived from the system clock with an offset and speed.
///
/// Changing the speed re-bases the clock so that simulated time stays
/// continuous; timers already scheduled keep their simulated deadline.
#[derive(Debug)]
pub struct WallClock {
    base_wall: DateTime<Utc>,
    base_sim: f64,
    speed: f64,
    timers: TimerQueue,
}

impl WallClock {
    /// Simulated time equal to wall time (milliseconds since the epoch)
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            base_wall: now,
            base_sim: now.timestamp_millis() as f64,
            speed: 1.0,
            timers: TimerQueue::new(),
        }
    }

    /// Start simulated time at `start` and run at `speed`
    pub fn starting_at(start: f64, speed: f64) -> Self {
        Self {
            base_wall: Utc::now(),
            base_sim: start,
            speed,
            timers: TimerQueue::new(),
        }
    }

    pub fn set_speed(&mut self, speed: f64) {
        let now = self.now();
        self.base_wall = Utc::now();
        self.base_sim = now;
        self.speed = speed;
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for WallClock {
    fn now(&self) -> f64 {
        let elapsed = (Utc::now() - self.base_wall).num_milliseconds() as f64;
        self.base_sim + elapsed * self.speed
    }

    fn speed(&self) -> f64 {
        self.speed
    }

    fn schedule_after(&mut self, duration: f64, target: VehicleRef) -> TimerToken {
        let deadline = self.now() + duration.max(0.0);
        self.timers.schedule(deadline, target)
    }

    fn cancel(&mut self, token: TimerToken) {
        self.timers.cancel(token);
    }

    fn pop_due(&mut self, until: f64) -> Option<FiredTimer> {
        self.timers.pop_due(until.min(self.now()))
    }

    fn advance_to(&mut self, _t: f64) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use railtrack_transit::TrainIdentifier;

    fn train(id: &str) -> VehicleRef {
        VehicleRef::Train(TrainIdentifier::new(id))
    }

    #[test]
    fn test_timers_fire_in_deadline_order() {
        let mut clock = SimulationClock::new(0.0);
        clock.schedule_after(300.0, train("c"));
        clock.schedule_after(100.0, train("a"));
        clock.schedule_after(200.0, train("b"));

        let fired: Vec<_> = std::iter::from_fn(|| clock.pop_due(1000.0))
            .map(|f| f.target)
            .collect();
        assert_eq!(fired, vec![train("a"), train("b"), train("c")]);
        assert_eq!(clock.now(), 300.0);
    }

    #[test]
    fn test_cancelled_timer_never_fires() {
        let mut clock = SimulationClock::new(0.0);
        let token = clock.schedule_after(100.0, train("a"));
        clock.schedule_after(200.0, train("b"));
        clock.cancel(token);

        let fired = clock.pop_due(1000.0).unwrap();
        assert_eq!(fired.target, train("b"));
        assert!(clock.pop_due(1000.0).is_none());
    }

    #[test]
    fn test_pop_due_respects_limit() {
        let mut clock = SimulationClock::new(0.0);
        clock.schedule_after(500.0, train("a"));
        assert!(clock.pop_due(499.0).is_none());
        clock.advance_to(499.0);
        assert_eq!(clock.now(), 499.0);
        assert_eq!(clock.pending_timers(), 1);
        assert!(clock.pop_due(500.0).is_some());
    }

    #[test]
    fn test_equal_deadlines_keep_schedule_order() {
        let mut queue = TimerQueue::new();
        queue.schedule(10.0, train("first"));
        queue.schedule(10.0, train("second"));
        assert_eq!(queue.pop_due(10.0).unwrap().target, train("first"));
        assert_eq!(queue.pop_due(10.0).unwrap().target, train("second"));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_wall_clock_speed_rebase() {
        let mut clock = WallClock::starting_at(1_000.0, 60.0);
        let before = clock.now();
        clock.set_speed(1.0);
        assert!(clock.now() >= before);
        assert_eq!(clock.speed(), 1.0);
    }
}
