//! Room discovery bookkeeping.
//!
//! Keeps the set of rooms seen since the last sweep. The sweep is a single
//! global timer: once more than [`DEFAULT_SWEEP_INTERVAL`] has passed since
//! the previous clear, the whole set is dropped and every room is
//! rediscovered on its next frame.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::events::DiscoveryEvent;

/// Time between registry clears.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(600);

#[derive(Debug)]
struct RoomRegistry {
    known_rooms: HashSet<String>,
    last_clear: Instant,
}

/// Tracks which rooms have been announced with a discovery event.
#[derive(Debug)]
pub struct RoomTracker {
    registry: Mutex<RoomRegistry>,
    sweep_interval: Duration,
}

impl RoomTracker {
    /// Creates a tracker whose sweep window starts now.
    pub fn new() -> Self {
        Self::starting_at(Instant::now(), DEFAULT_SWEEP_INTERVAL)
    }

    /// Creates a tracker with an explicit window start and sweep interval.
    pub fn starting_at(last_clear: Instant, sweep_interval: Duration) -> Self {
        Self {
            registry: Mutex::new(RoomRegistry {
                known_rooms: HashSet::new(),
                last_clear,
            }),
            sweep_interval,
        }
    }

    /// Records a sighting of `room_id`.
    ///
    /// Returns a discovery event only for the first sighting since the last
    /// clear.
    pub fn on_room_seen(&self, room_id: &str) -> Option<DiscoveryEvent> {
        let mut registry = self.registry.lock();
        if registry.known_rooms.contains(room_id) {
            return None;
        }

        registry.known_rooms.insert(room_id.to_string());
        tracing::debug!("Discovered room {}", room_id);
        Some(DiscoveryEvent::new(room_id))
    }

    /// Clears the registry if the sweep interval has elapsed.
    ///
    /// Returns true if the registry was cleared.
    pub fn maintenance_tick(&self, now: Instant) -> bool {
        let mut registry = self.registry.lock();
        if now.saturating_duration_since(registry.last_clear) <= self.sweep_interval {
            return false;
        }

        let dropped = registry.known_rooms.len();
        registry.known_rooms.clear();
        registry.last_clear = now;
        tracing::debug!("Room registry swept ({} rooms dropped)", dropped);
        true
    }

    /// Number of rooms currently known.
    pub fn known_rooms(&self) -> usize {
        self.registry.lock().known_rooms.len()
    }

    /// Whether `room_id` has been seen since the last clear.
    pub fn is_known(&self, room_id: &str) -> bool {
        self.registry.lock().known_rooms.contains(room_id)
    }

    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }
}

impl Default for RoomTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn first_sighting_discovers() {
        let tracker = RoomTracker::new();
        let event = tracker.on_room_seen("123").unwrap();
        assert_eq!(event.room_id, "123");
        assert_eq!(event.user, "获取中...");
    }

    #[test]
    fn repeat_sighting_is_silent() {
        let tracker = RoomTracker::new();
        let events: Vec<_> = (0..2).filter_map(|_| tracker.on_room_seen("123")).collect();
        assert_eq!(events.len(), 1);
        assert_eq!(tracker.known_rooms(), 1);
    }

    #[test]
    fn distinct_rooms_each_discovered() {
        let tracker = RoomTracker::new();
        assert!(tracker.on_room_seen("1").is_some());
        assert!(tracker.on_room_seen("2").is_some());
        assert!(tracker.on_room_seen("1").is_none());
        assert_eq!(tracker.known_rooms(), 2);
    }

    #[test]
    fn sweep_after_interval_rediscovers() {
        let start = Instant::now();
        let tracker = RoomTracker::starting_at(start, DEFAULT_SWEEP_INTERVAL);
        assert!(tracker.on_room_seen("123").is_some());

        assert!(tracker.maintenance_tick(start + Duration::from_secs(601)));
        assert!(!tracker.is_known("123"));
        assert!(tracker.on_room_seen("123").is_some());
    }

    #[test]
    fn no_sweep_within_interval() {
        let start = Instant::now();
        let tracker = RoomTracker::starting_at(start, DEFAULT_SWEEP_INTERVAL);
        tracker.on_room_seen("123");

        assert!(!tracker.maintenance_tick(start + Duration::from_secs(300)));
        // Exactly the interval is not "more than" the interval.
        assert!(!tracker.maintenance_tick(start + DEFAULT_SWEEP_INTERVAL));
        assert!(tracker.on_room_seen("123").is_none());
    }

    #[test]
    fn sweep_resets_window() {
        let start = Instant::now();
        let tracker = RoomTracker::starting_at(start, DEFAULT_SWEEP_INTERVAL);

        let first = start + Duration::from_secs(601);
        assert!(tracker.maintenance_tick(first));
        tracker.on_room_seen("123");

        // The next window is measured from the previous clear.
        assert!(!tracker.maintenance_tick(first + Duration::from_secs(599)));
        assert!(tracker.is_known("123"));
        assert!(tracker.maintenance_tick(first + Duration::from_secs(601)));
        assert!(!tracker.is_known("123"));
    }

    #[test]
    fn tick_with_earlier_instant_is_noop() {
        let start = Instant::now() + Duration::from_secs(10);
        let tracker = RoomTracker::starting_at(start, DEFAULT_SWEEP_INTERVAL);
        tracker.on_room_seen("1");
        assert!(!tracker.maintenance_tick(Instant::now()));
        assert_eq!(tracker.known_rooms(), 1);
    }

    #[test]
    fn concurrent_sightings_discover_once() {
        let tracker = Arc::new(RoomTracker::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = tracker.clone();
                std::thread::spawn(move || tracker.on_room_seen("shared").is_some())
            })
            .collect();

        let discovered = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|found| *found)
            .count();
        assert_eq!(discovered, 1);
    }
}
