//! Periodic sweep enforcing timeouts and capacity ceilings.

use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use super::{EndCause, Engine, Outbox};
use crate::protocol::SessionId;

/// One independent step of a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    ExpireWaiting,
    IdleSessions,
    AbandonedSessions,
    StaleWindows,
    Capacity,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::ExpireWaiting,
        Phase::IdleSessions,
        Phase::AbandonedSessions,
        Phase::StaleWindows,
        Phase::Capacity,
    ];
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub expired_waiting: usize,
    pub idle_sessions: usize,
    pub abandoned_sessions: usize,
    pub purged_windows: usize,
    pub evicted_waiting: usize,
    pub evicted_sessions: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        *self == SweepReport::default()
    }
}

impl Engine {
    /// Runs every phase back to back.
    pub fn sweep(&mut self, now: Instant) -> (SweepReport, Outbox) {
        let mut report = SweepReport::default();
        let mut outbox = Vec::new();
        for phase in Phase::ALL {
            outbox.extend(self.run_phase(phase, now, &mut report));
        }
        (report, outbox)
    }

    pub fn run_phase(&mut self, phase: Phase, now: Instant, report: &mut SweepReport) -> Outbox {
        match phase {
            Phase::ExpireWaiting => {
                report.expired_waiting += self.expire_waiting(now);
                Vec::new()
            }
            Phase::IdleSessions => {
                let ids = self.rooms.idle(now, self.config.idle_timeout);
                report.idle_sessions += ids.len();
                self.end_all(ids, EndCause::IdleTimeout)
            }
            Phase::AbandonedSessions => {
                let connections = &self.connections;
                let ids = self
                    .rooms
                    .select(|session| session.handles().iter().all(|&handle| !connections.is_live(handle)));
                report.abandoned_sessions += ids.len();
                self.end_all(ids, EndCause::Abandoned)
            }
            Phase::StaleWindows => {
                report.purged_windows += self.limiter.purge_stale(now);
                Vec::new()
            }
            Phase::Capacity => {
                let evicted = self.queue.trim_to(self.config.max_waiting);
                for entry in &evicted {
                    debug!(handle = %entry.handle, "evicted from a full queue");
                }
                report.evicted_waiting += evicted.len();

                let ids = self.rooms.excess(self.config.max_sessions);
                report.evicted_sessions += ids.len();
                self.end_all(ids, EndCause::Capacity)
            }
        }
    }

    /// Drops entries past the queue timeout, and any whose connection is
    /// already gone. Nobody is told.
    fn expire_waiting(&mut self, now: Instant) -> usize {
        let mut removed = self.queue.expire(now, self.config.queue_timeout).len();

        let gone: Vec<_> = self
            .queue
            .handles()
            .filter(|&handle| !self.connections.is_live(handle))
            .collect();
        for handle in gone {
            self.queue.remove(handle);
            removed += 1;
        }
        removed
    }

    fn end_all(&mut self, ids: Vec<SessionId>, cause: EndCause) -> Outbox {
        ids.into_iter().flat_map(|id| self.end(id, cause)).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::{
        config::Config,
        profile::{Gender, Preference, ProfileForm},
        protocol::{ConnId, EndReason, MessageKind, ServerEvent},
    };

    fn form() -> ProfileForm {
        ProfileForm {
            name: "anon".to_owned(),
            gender: Gender::Male,
            looking_for: Preference::Any,
            interests: Vec::new(),
        }
    }

    fn engine(config: Config) -> Engine {
        Engine::with_rng(config, StdRng::seed_from_u64(9))
    }

    fn join(engine: &mut Engine, now: Instant) -> ConnId {
        let handle = ConnId::new();
        engine.connect(handle).unwrap();
        engine.find_match(handle, form(), now).unwrap();
        handle
    }

    #[test]
    fn old_waiting_entries_expire_silently() {
        let mut engine = engine(Config { queue_timeout: Duration::from_secs(60), ..Config::default() });
        let t0 = Instant::now();
        let a = join(&mut engine, t0);

        let (report, outbox) = engine.sweep(t0 + Duration::from_secs(60));
        assert_eq!(report.expired_waiting, 0);
        assert!(engine.is_waiting(a));

        let (report, outbox_later) = engine.sweep(t0 + Duration::from_secs(61));
        assert_eq!(report.expired_waiting, 1);
        assert!(outbox.is_empty() && outbox_later.is_empty());
        assert!(!engine.is_waiting(a));
        assert!(engine.is_connected(a));
    }

    #[test]
    fn idle_sessions_time_out() {
        let mut engine = engine(Config { idle_timeout: Duration::from_secs(30), ..Config::default() });
        let t0 = Instant::now();
        let a = join(&mut engine, t0);
        let b = join(&mut engine, t0);

        engine.relay_message(a, "still here".to_owned(), MessageKind::Text, t0 + Duration::from_secs(20)).unwrap();
        let (report, _) = engine.sweep(t0 + Duration::from_secs(45));
        assert_eq!(report.idle_sessions, 0);

        let (report, outbox) = engine.sweep(t0 + Duration::from_secs(51));
        assert_eq!(report.idle_sessions, 1);
        let ended = ServerEvent::SessionEnded { reason: EndReason::IdleTimeout };
        assert!(outbox.contains(&(a, ended.clone())));
        assert!(outbox.contains(&(b, ended)));
        assert_eq!(engine.stats().sessions, 0);
    }

    #[test]
    fn sessions_with_both_members_gone_are_dropped() {
        let mut engine = engine(Config::default());
        let now = Instant::now();
        let a = join(&mut engine, now);
        let b = join(&mut engine, now);
        // both disconnect cleanups were cut short
        engine.connections.remove(a);
        engine.connections.remove(b);

        let (report, outbox) = engine.sweep(now);
        assert_eq!(report.abandoned_sessions, 1);
        assert!(outbox.is_empty());
        assert_eq!(engine.stats().sessions, 0);
    }

    #[test]
    fn ceilings_evict_the_oldest() {
        let mut engine = engine(Config { max_waiting: 1, max_sessions: 1, ..Config::default() });
        let t0 = Instant::now();

        let first = [join(&mut engine, t0), join(&mut engine, t0)];
        let second = [
            join(&mut engine, t0 + Duration::from_secs(1)),
            join(&mut engine, t0 + Duration::from_secs(1)),
        ];
        assert_eq!(engine.stats().sessions, 2);

        // two women both looking for men can't be paired with each other
        let mut loners = Vec::new();
        for offset in 2..4 {
            let handle = ConnId::new();
            engine.connect(handle).unwrap();
            let wanting_men = ProfileForm { gender: Gender::Female, looking_for: Preference::Male, ..form() };
            engine.find_match(handle, wanting_men, t0 + Duration::from_secs(offset)).unwrap();
            loners.push(handle);
        }
        assert_eq!(engine.stats().waiting, 2);

        let (report, outbox) = engine.sweep(t0 + Duration::from_secs(5));

        assert_eq!(report.evicted_sessions, 1);
        let busy = ServerEvent::SessionEnded { reason: EndReason::ServerBusy };
        assert!(outbox.contains(&(first[0], busy.clone())));
        assert!(outbox.contains(&(first[1], busy)));
        assert!(engine.session_of(second[0]).is_some());
        assert_eq!(report.evicted_waiting, 1);
        assert!(!engine.is_waiting(loners[0]));
        assert!(engine.is_waiting(loners[1]));
        engine.check_consistency().unwrap();
    }

    #[test]
    fn stale_rate_windows_are_purged() {
        let mut engine = engine(Config::default());
        let now = Instant::now();
        let a = join(&mut engine, now);
        let _ = engine.relay_typing(a, true, now);

        let window = engine.config().message_limit.window;
        let (report, _) = engine.sweep(now + window * 3 + Duration::from_secs(1));
        assert_eq!(report.purged_windows, 1);
    }
}
