//! Process-wide heartbeat bus and the health supervisor that reads it.

mod supervisor;

pub use supervisor::{
    HealthSupervisor, SupervisorConfig, SupervisorEvent, ThreadStateProbe, WorkerThreadState,
};

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Instant;

/// Identifies a long-running worker for heartbeat and recovery purposes.
///
/// `AudioSource` carries the source index (0-based, < `N_max`) since the
/// mixer owns up to `N_max` source workers, each with its own slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadRole {
    AudioSource(u8),
    Mixer,
    /// The capture -> GPU encoder submission thread (component G/E).
    CaptureFeed,
    Supervisor,
    SaveWorker,
}

impl std::fmt::Display for ThreadRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThreadRole::AudioSource(idx) => write!(f, "audio-source-{idx}"),
            ThreadRole::Mixer => write!(f, "mixer"),
            ThreadRole::CaptureFeed => write!(f, "capture-feed"),
            ThreadRole::Supervisor => write!(f, "supervisor"),
            ThreadRole::SaveWorker => write!(f, "save-worker"),
        }
    }
}

/// The kind of stall the supervisor detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallKind {
    /// Only a buffer-producing worker (audio source / mixer / capture feed) is stalled.
    Buffer,
    /// Only the encoder submission path is stalled.
    Encoder,
    /// More than one role is stalled simultaneously.
    Multiple,
}

/// Process-wide `ThreadRole -> last-alive` registry.
///
/// Every worker publishes its own heartbeat once per loop iteration;
/// the supervisor is the only reader. Writes are independent per role so
/// one worker's heartbeat never blocks another's.
#[derive(Default)]
pub struct HeartbeatBus {
    slots: Mutex<HashMap<ThreadRole, Instant>>,
}

/// Abstracts "how old is this role's last heartbeat" so the supervisor can
/// be driven by a real `HeartbeatBus` in production and by a fixed fake in
/// tests, without sleeping through multi-second thresholds.
pub trait HeartbeatSource {
    fn ages(&self) -> Vec<(ThreadRole, std::time::Duration)>;
}

impl HeartbeatSource for HeartbeatBus {
    fn ages(&self) -> Vec<(ThreadRole, std::time::Duration)> {
        HeartbeatBus::ages(self)
    }
}

impl HeartbeatBus {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Publish a fresh heartbeat for `role`.
    pub fn beat(&self, role: ThreadRole) {
        self.slots.lock().insert(role, Instant::now());
    }

    /// Remove a role's slot, e.g. when its worker has shut down cleanly.
    pub fn clear(&self, role: ThreadRole) {
        self.slots.lock().remove(&role);
    }

    /// Age of `role`'s last heartbeat, or `None` if it has never beaten.
    pub fn age(&self, role: ThreadRole) -> Option<std::time::Duration> {
        self.slots.lock().get(&role).map(|t| t.elapsed())
    }

    /// Snapshot of every role with a heartbeat, and its age.
    pub fn ages(&self) -> Vec<(ThreadRole, std::time::Duration)> {
        self.slots
            .lock()
            .iter()
            .map(|(role, t)| (*role, t.elapsed()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn fresh_bus_has_no_age() {
        let bus = HeartbeatBus::new();
        assert!(bus.age(ThreadRole::Mixer).is_none());
    }

    #[test]
    fn beat_then_age_is_small() {
        let bus = HeartbeatBus::new();
        bus.beat(ThreadRole::Mixer);
        let age = bus.age(ThreadRole::Mixer).unwrap();
        assert!(age < Duration::from_millis(200));
    }

    #[test]
    fn age_grows_without_a_new_beat() {
        let bus = HeartbeatBus::new();
        bus.beat(ThreadRole::AudioSource(0));
        thread::sleep(Duration::from_millis(30));
        let age = bus.age(ThreadRole::AudioSource(0)).unwrap();
        assert!(age >= Duration::from_millis(30));
    }

    #[test]
    fn clear_removes_the_slot() {
        let bus = HeartbeatBus::new();
        bus.beat(ThreadRole::SaveWorker);
        bus.clear(ThreadRole::SaveWorker);
        assert!(bus.age(ThreadRole::SaveWorker).is_none());
    }
}
