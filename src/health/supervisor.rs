//! The health/recovery supervisor (component H).
//!
//! Watches per-thread heartbeats, differentiates a soft slowdown from a
//! hard stall, distinguishes a hung worker from a crashed one, and rate-
//! limits restarts (at most `max_recoveries` within `recovery_window`
//! before declaring permanent failure). The supervisor only *decides*;
//! it hands `SupervisorEvent`s back to its caller (the pipeline
//! controller) which owns the actual stop/restart/cleanup orchestration,
//! since only the controller holds the worker handles and the encoder
//! session.

use super::{HeartbeatSource, StallKind, ThreadRole};
use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

/// The result of probing a worker thread's state: `Running` (hung, must
/// not reclaim owned resources), `Exited` (clean), `Crashed` (non-zero
/// exit, resources are reclaimable). Rust's standard library has no
/// portable "is this OS thread still executing" query beyond `JoinHandle::
/// is_finished`, which cannot distinguish a clean return from a panic
/// without joining -- so implementations should join only once
/// `is_finished()` is true and classify by the join `Result`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerThreadState {
    Running,
    Exited,
    Crashed,
}

/// Queries the current state of the worker behind a given role.
pub trait ThreadStateProbe {
    fn state(&self, role: ThreadRole) -> WorkerThreadState;
}

#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorEvent {
    /// Heartbeat age exceeded the soft threshold; emitted once per stall episode.
    SoftWarning(ThreadRole),
    /// Heartbeat age exceeded the hard threshold.
    Stalled {
        kind: StallKind,
        states: Vec<(ThreadRole, WorkerThreadState)>,
    },
    /// A restart should be attempted; the caller performs it and then
    /// should not expect further `Stalled` events for the grace period.
    RestartRequested,
    /// `max_recoveries` restarts already happened within `window`; the
    /// pipeline stops and must not be restarted automatically again.
    PermanentFailure { recoveries: u32, window: Duration },
}

#[derive(Debug, Clone, Copy)]
pub struct SupervisorConfig {
    pub soft_threshold: Duration,
    pub hard_threshold: Duration,
    pub max_recoveries: u32,
    pub recovery_window: Duration,
    pub grace_period: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            soft_threshold: Duration::from_secs(2),
            hard_threshold: Duration::from_secs(5),
            max_recoveries: 3,
            recovery_window: Duration::from_secs(5 * 60),
            grace_period: Duration::from_secs(10),
        }
    }
}

pub struct HealthSupervisor {
    config: SupervisorConfig,
    restart_history: VecDeque<Instant>,
    warned: HashSet<ThreadRole>,
    suppressed_until: Option<Instant>,
    permanently_failed: bool,
}

impl HealthSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            restart_history: VecDeque::new(),
            warned: HashSet::new(),
            suppressed_until: None,
            permanently_failed: false,
        }
    }

    pub fn is_permanently_failed(&self) -> bool {
        self.permanently_failed
    }

    /// Number of restarts recorded within the recovery window, as of `now`.
    pub fn recent_recovery_count(&self, now: Instant) -> usize {
        self.restart_history
            .iter()
            .filter(|t| now.duration_since(**t) <= self.config.recovery_window)
            .count()
    }

    /// Run one check. `now` is threaded through explicitly so tests can
    /// simulate multi-second/multi-minute stalls without sleeping.
    pub fn tick(
        &mut self,
        now: Instant,
        source: &dyn HeartbeatSource,
        probe: &dyn ThreadStateProbe,
    ) -> Vec<SupervisorEvent> {
        let mut events = Vec::new();

        if self.permanently_failed {
            return events;
        }

        if let Some(until) = self.suppressed_until {
            if now < until {
                return events;
            }
            self.suppressed_until = None;
        }

        let ages = source.ages();
        let mut soft = Vec::new();
        let mut hard = Vec::new();
        for (role, age) in ages {
            if age > self.config.hard_threshold {
                hard.push(role);
            } else if age > self.config.soft_threshold {
                soft.push(role);
            }
        }

        for role in &soft {
            if self.warned.insert(*role) {
                crate::warn!("heartbeat stale for {role}, soft threshold exceeded");
                events.push(SupervisorEvent::SoftWarning(*role));
            }
        }
        // A role stops being "warned" once it recovers or escalates to hard,
        // so a later fresh stall on the same role warns again.
        self.warned.retain(|r| soft.contains(r));

        if hard.is_empty() {
            return events;
        }

        let kind = if hard.len() > 1 {
            StallKind::Multiple
        } else if hard[0] == ThreadRole::CaptureFeed {
            StallKind::Encoder
        } else {
            StallKind::Buffer
        };

        let states: Vec<_> = hard.iter().map(|r| (*r, probe.state(*r))).collect();
        crate::error!("pipeline stalled: kind={kind:?} states={states:?}");
        events.push(SupervisorEvent::Stalled {
            kind,
            states,
        });

        // Disable further monitoring until the restart decision below completes.
        self.restart_history
            .retain(|t| now.duration_since(*t) <= self.config.recovery_window);

        if self.restart_history.len() as u32 >= self.config.max_recoveries {
            self.permanently_failed = true;
            crate::error!(
                "permanent failure: {} recoveries within {:?}",
                self.restart_history.len(),
                self.config.recovery_window
            );
            events.push(SupervisorEvent::PermanentFailure {
                recoveries: self.restart_history.len() as u32,
                window: self.config.recovery_window,
            });
            return events;
        }

        self.restart_history.push_back(now);
        self.warned.clear();
        self.suppressed_until = Some(now + self.config.grace_period);
        events.push(SupervisorEvent::RestartRequested);
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeSource(Vec<(ThreadRole, Duration)>);
    impl HeartbeatSource for FakeSource {
        fn ages(&self) -> Vec<(ThreadRole, Duration)> {
            self.0.clone()
        }
    }

    struct AllRunning;
    impl ThreadStateProbe for AllRunning {
        fn state(&self, _role: ThreadRole) -> WorkerThreadState {
            WorkerThreadState::Running
        }
    }

    fn cfg() -> SupervisorConfig {
        SupervisorConfig {
            soft_threshold: Duration::from_secs(2),
            hard_threshold: Duration::from_secs(5),
            max_recoveries: 3,
            recovery_window: Duration::from_secs(300),
            grace_period: Duration::from_secs(10),
        }
    }

    #[test]
    fn healthy_bus_produces_no_events() {
        let mut sup = HealthSupervisor::new(cfg());
        let source = FakeSource(vec![(ThreadRole::Mixer, Duration::from_millis(10))]);
        let events = sup.tick(Instant::now(), &source, &AllRunning);
        assert!(events.is_empty());
    }

    #[test]
    fn soft_threshold_warns_once_per_episode() {
        let mut sup = HealthSupervisor::new(cfg());
        let source = FakeSource(vec![(ThreadRole::Mixer, Duration::from_millis(2500))]);
        let now = Instant::now();
        let first = sup.tick(now, &source, &AllRunning);
        assert_eq!(first, vec![SupervisorEvent::SoftWarning(ThreadRole::Mixer)]);
        let second = sup.tick(now, &source, &AllRunning);
        assert!(second.is_empty(), "soft warning should not repeat every tick");
    }

    #[test]
    fn hard_threshold_requests_restart_and_then_grace_periods() {
        let mut sup = HealthSupervisor::new(cfg());
        let source = FakeSource(vec![(ThreadRole::CaptureFeed, Duration::from_secs(6))]);
        let t0 = Instant::now();

        let events = sup.tick(t0, &source, &AllRunning);
        assert!(matches!(
            events[0],
            SupervisorEvent::Stalled { kind: StallKind::Encoder, .. }
        ));
        assert_eq!(events[1], SupervisorEvent::RestartRequested);

        // Within the grace period, monitoring is suppressed entirely.
        let during_grace = sup.tick(t0 + Duration::from_secs(5), &source, &AllRunning);
        assert!(during_grace.is_empty());

        // After the grace period, the still-stalled role is evaluated again.
        let after_grace = sup.tick(t0 + Duration::from_secs(11), &source, &AllRunning);
        assert!(!after_grace.is_empty());
    }

    #[test]
    fn three_recoveries_in_window_then_permanent_failure() {
        let mut sup = HealthSupervisor::new(cfg());
        let source = FakeSource(vec![(ThreadRole::Mixer, Duration::from_secs(6))]);
        let t0 = Instant::now();

        // Three stall/restart cycles, each just past the prior grace period.
        let mut now = t0;
        for _ in 0..3 {
            let events = sup.tick(now, &source, &AllRunning);
            assert!(events.contains(&SupervisorEvent::RestartRequested));
            now += Duration::from_secs(11);
        }
        assert!(!sup.is_permanently_failed());

        // A fourth stall within the 5-minute window is refused.
        let events = sup.tick(now, &source, &AllRunning);
        assert!(events
            .iter()
            .any(|e| matches!(e, SupervisorEvent::PermanentFailure { .. })));
        assert!(sup.is_permanently_failed());

        // Once permanently failed, the supervisor goes quiet.
        let quiet = sup.tick(now + Duration::from_secs(1), &source, &AllRunning);
        assert!(quiet.is_empty());
    }

    #[test]
    fn multiple_stalled_roles_report_multiple_kind() {
        let mut sup = HealthSupervisor::new(cfg());
        let source = FakeSource(vec![
            (ThreadRole::Mixer, Duration::from_secs(6)),
            (ThreadRole::CaptureFeed, Duration::from_secs(7)),
        ]);
        let events = sup.tick(Instant::now(), &source, &AllRunning);
        assert!(matches!(
            events[0],
            SupervisorEvent::Stalled { kind: StallKind::Multiple, .. }
        ));
    }

    #[test]
    fn recoveries_outside_the_window_do_not_count() {
        let mut sup = HealthSupervisor::new(cfg());
        let source = FakeSource(vec![(ThreadRole::Mixer, Duration::from_secs(6))]);
        let t0 = Instant::now();
        let mut now = t0;
        for _ in 0..3 {
            sup.tick(now, &source, &AllRunning);
            now += Duration::from_secs(11);
        }
        // Jump far past the 5-minute recovery window before the 4th stall.
        now += Duration::from_secs(301);
        let events = sup.tick(now, &source, &AllRunning);
        assert!(events.contains(&SupervisorEvent::RestartRequested));
        assert!(!sup.is_permanently_failed());
    }
}
