//! Two-party sessions ("rooms") and their bookkeeping.

use std::{
    collections::{BTreeSet, HashMap},
    time::Duration,
};

use tokio::time::Instant;
use uuid::Uuid;

use crate::{
    profile::Profile,
    protocol::{ConnId, SessionId},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub handle: ConnId,
    pub profile: Profile,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub members: [Member; 2],
    pub shared_interests: BTreeSet<String>,
    pub created_at: Instant,
    pub last_activity: Instant,
}

impl Session {
    pub fn has_member(&self, handle: ConnId) -> bool {
        self.members.iter().any(|member| member.handle == handle)
    }

    /// The member on the other side from `handle`.
    pub fn partner_of(&self, handle: ConnId) -> Option<&Member> {
        match &self.members {
            [a, b] if a.handle == handle => Some(b),
            [a, b] if b.handle == handle => Some(a),
            _ => None,
        }
    }

    pub fn handles(&self) -> [ConnId; 2] {
        [self.members[0].handle, self.members[1].handle]
    }
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, Session>,
}

impl SessionRegistry {
    /// Stores a new session. Both members have to be distinct connections.
    pub fn create(&mut self, a: Member, b: Member, now: Instant) -> Option<SessionId> {
        if a.handle == b.handle {
            return None;
        }

        let id = Uuid::now_v7();
        let shared_interests = a.profile.shared_interests(&b.profile);
        self.sessions.insert(
            id,
            Session {
                id,
                members: [a, b],
                shared_interests,
                created_at: now,
                last_activity: now,
            },
        );
        Some(id)
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn touch(&mut self, id: SessionId, now: Instant) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.last_activity = now;
        }
    }

    pub fn remove(&mut self, id: SessionId) -> Option<Session> {
        self.sessions.remove(&id)
    }

    pub fn idle(&self, now: Instant, timeout: Duration) -> Vec<SessionId> {
        self.sessions
            .values()
            .filter(|session| now.saturating_duration_since(session.last_activity) > timeout)
            .map(|session| session.id)
            .collect()
    }

    /// Sessions matching `pred`, e.g. ones whose members are all gone.
    pub fn select(&self, mut pred: impl FnMut(&Session) -> bool) -> Vec<SessionId> {
        self.sessions
            .values()
            .filter(|session| pred(session))
            .map(|session| session.id)
            .collect()
    }

    /// The oldest sessions beyond `cap`, oldest first.
    pub fn excess(&self, cap: usize) -> Vec<SessionId> {
        let excess = self.sessions.len().saturating_sub(cap);
        if excess == 0 {
            return Vec::new();
        }

        let mut by_age: Vec<&Session> = self.sessions.values().collect();
        by_age.sort_by_key(|session| (session.created_at, session.id));
        by_age.into_iter().take(excess).map(|session| session.id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
