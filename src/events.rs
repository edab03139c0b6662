//! Event emission (spec §4.1 "Event emission" and §6 "Event payload").
//!
//! Listeners are called synchronously in registration order; a panic
//! or early return from one listener must not stop the others (the
//! listener itself can't panic across an FFI-free Rust call, but an
//! error-returning listener's error is swallowed and logged). Emission
//! is throttled per `(type, key)`: within a sliding window, only the
//! first event for a given pair is dispatched.

use crate::config::EventsConfig;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Set,
    Get,
    Remove,
    Clear,
    Expired,
    Error,
    Strategy,
}

/// `{type, key?, value?, engine, timestamp, error?, strategy?}` (spec §6).
#[derive(Debug, Clone)]
pub struct EventPayload {
    pub event_type: EventType,
    pub key: Option<String>,
    pub value: Option<String>,
    pub engine: Option<String>,
    pub timestamp: i64,
    pub error: Option<String>,
    pub strategy: Option<StrategyEventPayload>,
}

#[derive(Debug, Clone)]
pub struct StrategyEventPayload {
    pub reason: String,
    pub confidence: f64,
    pub data_size: usize,
    pub data_type: String,
    pub ttl: Option<Duration>,
}

type Listener = Box<dyn Fn(&EventPayload) + Send + Sync>;

struct Registration {
    id: u64,
    event_type: EventType,
    listener: Listener,
}

struct ThrottleState {
    buffer: VecDeque<(EventType, String)>,
    last_emitted: HashMap<(EventType, String), Instant>,
    capacity: usize,
    window: Duration,
}

impl ThrottleState {
    fn new(capacity: usize, window: Duration) -> Self {
        Self {
            buffer: VecDeque::new(),
            last_emitted: HashMap::new(),
            capacity,
            window,
        }
    }

    /// Returns `true` if this `(type, key)` should be dispatched now.
    fn should_dispatch(&mut self, event_type: EventType, key: &str) -> bool {
        let now = Instant::now();
        let map_key = (event_type, key.to_string());
        if let Some(last) = self.last_emitted.get(&map_key) {
            if now.duration_since(*last) < self.window {
                return false;
            }
        }
        self.last_emitted.insert(map_key.clone(), now);
        self.buffer.push_back(map_key);
        if self.buffer.len() > self.capacity {
            if let Some(oldest) = self.buffer.pop_front() {
                self.last_emitted.remove(&oldest);
            }
        }
        true
    }
}

/// The process-wide event bus a Cache Manager owns.
pub struct EventBus {
    listeners: Mutex<Vec<Registration>>,
    throttle: Mutex<ThrottleState>,
    next_id: AtomicU64,
}

/// Handle returned by [`EventBus::on`], passed to [`EventBus::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

impl EventBus {
    pub fn new(config: &EventsConfig) -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            throttle: Mutex::new(ThrottleState::new(config.throttle_buffer_size, config.throttle_window)),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn on(&self, event_type: EventType, listener: impl Fn(&EventPayload) + Send + Sync + 'static) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push(Registration {
            id,
            event_type,
            listener: Box::new(listener),
        });
        ListenerId(id)
    }

    pub fn off(&self, id: ListenerId) {
        self.listeners.lock().retain(|r| r.id != id.0);
    }

    /// Emit `payload`, subject to per-`(type, key)` throttling when a
    /// key is present. Events without a key (process-wide errors, for
    /// instance) are never throttled.
    pub fn emit(&self, payload: EventPayload) {
        if let Some(key) = &payload.key {
            let dispatch = self.throttle.lock().should_dispatch(payload.event_type, key);
            if !dispatch {
                return;
            }
        }

        let listeners = self.listeners.lock();
        for registration in listeners.iter() {
            if registration.event_type == payload.event_type {
                (registration.listener)(&payload);
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex as StdMutex};

    fn payload(event_type: EventType, key: Option<&str>) -> EventPayload {
        EventPayload {
            event_type,
            key: key.map(|k| k.to_string()),
            value: None,
            engine: Some("memory".to_string()),
            timestamp: 0,
            error: None,
            strategy: None,
        }
    }

    #[test]
    fn listeners_receive_events_of_their_type_in_order() {
        let bus = EventBus::new(&EventsConfig::default());
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let seen1 = Arc::clone(&seen);
        let seen2 = Arc::clone(&seen);
        bus.on(EventType::Set, move |_| seen1.lock().unwrap().push(1));
        bus.on(EventType::Set, move |_| seen2.lock().unwrap().push(2));
        bus.on(EventType::Get, move |_| panic!("should not fire for Set"));
        bus.emit(payload(EventType::Set, Some("k1")));
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn off_unregisters_a_listener() {
        let bus = EventBus::new(&EventsConfig::default());
        let seen = Arc::new(StdMutex::new(0));
        let seen_clone = Arc::clone(&seen);
        let id = bus.on(EventType::Set, move |_| *seen_clone.lock().unwrap() += 1);
        bus.off(id);
        bus.emit(payload(EventType::Set, Some("k1")));
        assert_eq!(*seen.lock().unwrap(), 0);
    }

    #[test]
    fn repeated_events_for_same_key_are_throttled() {
        let config = EventsConfig {
            throttle_buffer_size: 1024,
            throttle_window: Duration::from_millis(50),
        };
        let bus = EventBus::new(&config);
        let count = Arc::new(StdMutex::new(0));
        let count_clone = Arc::clone(&count);
        bus.on(EventType::Get, move |_| *count_clone.lock().unwrap() += 1);
        bus.emit(payload(EventType::Get, Some("k1")));
        bus.emit(payload(EventType::Get, Some("k1")));
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn distinct_keys_are_not_throttled_against_each_other() {
        let bus = EventBus::new(&EventsConfig::default());
        let count = Arc::new(StdMutex::new(0));
        let count_clone = Arc::clone(&count);
        bus.on(EventType::Get, move |_| *count_clone.lock().unwrap() += 1);
        bus.emit(payload(EventType::Get, Some("k1")));
        bus.emit(payload(EventType::Get, Some("k2")));
        assert_eq!(*count.lock().unwrap(), 2);
    }

    #[test]
    fn keyless_events_are_never_throttled() {
        let bus = EventBus::new(&EventsConfig::default());
        let count = Arc::new(StdMutex::new(0));
        let count_clone = Arc::clone(&count);
        bus.on(EventType::Error, move |_| *count_clone.lock().unwrap() += 1);
        bus.emit(payload(EventType::Error, None));
        bus.emit(payload(EventType::Error, None));
        assert_eq!(*count.lock().unwrap(), 2);
    }
}
