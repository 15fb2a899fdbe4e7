//! Matchmaking and session coordination.
//!
//! [`Engine`] owns every piece of shared state: live connections, the
//! waiting queue, the session registry and the rate limiter. All of it is
//! plain in-memory bookkeeping; operations never wait on I/O. Instead of
//! sending anything themselves, operations return an [`Outbox`] of events
//! for the caller to hand to the transport.

mod connections;
mod limiter;
mod queue;
mod reaper;
mod relay;
mod rooms;

pub use connections::ConnectionRegistry;
pub use limiter::RateLimiter;
pub use queue::{WaitingEntry, WaitingQueue};
pub use reaper::{Phase, SweepReport};
pub use rooms::{Member, Session, SessionRegistry};

use std::sync::Arc;

use rand::{SeedableRng, rngs::StdRng};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    error::EngineError,
    profile::{Profile, ProfileForm},
    protocol::{ConnId, EndReason, ServerEvent, SessionId},
    validate::{ContentRules, Validator},
};

/// Events to deliver, in order, once an operation is done.
pub type Outbox = Vec<(ConnId, ServerEvent)>;

/// What brought a session down. Decides the reason each member is told.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndCause {
    Left(ConnId),
    Disconnected(ConnId),
    IdleTimeout,
    Capacity,
    /// Both members were already gone.
    Abandoned,
}

impl EndCause {
    pub fn reason_for(self, member: ConnId) -> EndReason {
        match self {
            EndCause::Left(by) if by == member => EndReason::YouLeft,
            EndCause::Left(_) => EndReason::EndedByPeer,
            EndCause::Disconnected(_) | EndCause::Abandoned => EndReason::PeerDisconnected,
            EndCause::IdleTimeout => EndReason::IdleTimeout,
            EndCause::Capacity => EndReason::ServerBusy,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub connections: usize,
    pub waiting: usize,
    pub sessions: usize,
}

pub struct Engine {
    config: Config,
    connections: ConnectionRegistry,
    queue: WaitingQueue,
    rooms: SessionRegistry,
    limiter: RateLimiter,
    rng: StdRng,
    validator: Arc<dyn Validator>,
}

impl Engine {
    pub fn new(config: Config) -> Self {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    /// Uses `rng` for tie-breaks, so a seeded generator makes matching repeatable.
    pub fn with_rng(config: Config, rng: StdRng) -> Self {
        let limiter = RateLimiter::new(config.message_limit, config.media_limit, config.stale_window_factor);
        let validator: Arc<dyn Validator> = Arc::new(ContentRules::new(config.content));
        Self {
            config,
            connections: ConnectionRegistry::default(),
            queue: WaitingQueue::default(),
            rooms: SessionRegistry::default(),
            limiter,
            rng,
            validator,
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn has_capacity(&self) -> bool {
        self.connections.len() < self.config.max_connections
    }

    pub fn connect(&mut self, handle: ConnId) -> Result<(), EngineError> {
        if !self.has_capacity() {
            return Err(EngineError::ServerFull);
        }
        self.connections.register(handle);
        Ok(())
    }

    /// Cascades a gone connection through the queue, its session and the limiter.
    pub fn disconnect(&mut self, handle: ConnId) -> Outbox {
        if self.queue.remove(handle).is_some() {
            debug!(%handle, "left the queue by disconnecting");
        }
        self.limiter.forget(handle);

        match self.connections.remove(handle) {
            Some(Some(session_id)) => self.end(session_id, EndCause::Disconnected(handle)),
            _ => Vec::new(),
        }
    }

    pub fn find_match(&mut self, handle: ConnId, form: ProfileForm, now: Instant) -> Result<Outbox, EngineError> {
        if !self.connections.is_live(handle) {
            return Err(EngineError::UnknownConnection);
        }
        if self.queue.contains(handle) {
            return Err(EngineError::AlreadyQueued);
        }
        if let Some(session_id) = self.connections.session_of(handle) {
            if self.rooms.contains(session_id) {
                return Err(EngineError::AlreadyInSession);
            }
            self.connections.unbind(handle, session_id);
        }

        let profile = Profile::parse(form)?;
        match self.try_match(handle, &profile, now) {
            Some(session_id) => Ok(self.matched_events(session_id)),
            None => {
                self.queue.push(WaitingEntry { handle, profile, enqueued_at: now });
                debug!(%handle, waiting = self.queue.len(), "queued");
                Ok(vec![(handle, ServerEvent::Searching)])
            }
        }
    }

    /// Looks for a partner for `handle` and, if one is found, takes it off
    /// the queue and binds both into a new session.
    ///
    /// A picked partner whose connection is already gone is discarded and
    /// `None` is returned, leaving the caller to queue the requester.
    pub fn try_match(&mut self, handle: ConnId, profile: &Profile, now: Instant) -> Option<SessionId> {
        if !self.connections.is_live(handle) {
            return None;
        }

        let candidate = self
            .queue
            .best_candidate(handle, profile, self.config.min_shared_interests, &mut self.rng)?;
        let entry = self.queue.remove(candidate)?;
        if !self.connections.is_live(entry.handle) {
            warn!(candidate = %entry.handle, "matched a connection that is already gone");
            return None;
        }

        let partner = entry.handle;
        let session_id = self.rooms.create(
            Member { handle, profile: profile.clone() },
            Member { handle: partner, profile: entry.profile },
            now,
        )?;
        self.connections.bind(handle, session_id);
        self.connections.bind(partner, session_id);

        info!(%session_id, a = %handle, b = %partner, "matched");
        Some(session_id)
    }

    fn matched_events(&self, session_id: SessionId) -> Outbox {
        let Some(session) = self.rooms.get(session_id) else {
            return Vec::new();
        };

        session
            .members
            .iter()
            .filter_map(|member| {
                let partner = session.partner_of(member.handle)?;
                Some((
                    member.handle,
                    ServerEvent::Matched {
                        session_id,
                        partner: partner.profile.public(),
                        shared_interests: session.shared_interests.clone(),
                    },
                ))
            })
            .collect()
    }

    pub fn leave_queue(&mut self, handle: ConnId) -> Result<Outbox, EngineError> {
        self.queue.remove(handle).ok_or(EngineError::NotQueued)?;
        debug!(%handle, "left the queue");
        Ok(vec![(handle, ServerEvent::QueueLeft)])
    }

    pub fn end_chat(&mut self, handle: ConnId) -> Result<Outbox, EngineError> {
        let session_id = self.connections.session_of(handle).ok_or(EngineError::NotInSession)?;
        if !self.rooms.contains(session_id) {
            self.connections.unbind(handle, session_id);
            return Ok(Vec::new());
        }
        Ok(self.end(session_id, EndCause::Left(handle)))
    }

    /// Tears a session down and tells every member still connected why.
    /// Unknown or already ended sessions are a no-op.
    pub fn end(&mut self, session_id: SessionId, cause: EndCause) -> Outbox {
        let Some(session) = self.rooms.remove(session_id) else {
            return Vec::new();
        };

        let mut outbox = Vec::new();
        for member in &session.members {
            self.connections.unbind(member.handle, session_id);
            if self.connections.is_live(member.handle) {
                outbox.push((
                    member.handle,
                    ServerEvent::SessionEnded { reason: cause.reason_for(member.handle) },
                ));
            }
        }

        info!(%session_id, ?cause, "session ended");
        outbox
    }

    pub fn lookup(&self, handle: ConnId) -> Option<&Session> {
        self.rooms.get(self.connections.session_of(handle)?)
    }

    pub fn is_connected(&self, handle: ConnId) -> bool {
        self.connections.is_live(handle)
    }

    pub fn is_waiting(&self, handle: ConnId) -> bool {
        self.queue.contains(handle)
    }

    pub fn session_of(&self, handle: ConnId) -> Option<SessionId> {
        self.connections.session_of(handle)
    }

    pub fn stats(&self) -> Stats {
        Stats {
            connections: self.connections.len(),
            waiting: self.queue.len(),
            sessions: self.rooms.len(),
        }
    }

    /// Cross-checks the queue, the bindings and the sessions against each other.
    pub fn check_consistency(&self) -> Result<(), String> {
        for handle in self.queue.handles() {
            if let Some(session_id) = self.connections.session_of(handle) {
                return Err(format!("{handle} is queued and bound to {session_id}"));
            }
            if self.queue.handles().filter(|&h| h == handle).count() > 1 {
                return Err(format!("{handle} is queued twice"));
            }
        }
        for handle in self.connections.handles() {
            let Some(session_id) = self.connections.session_of(handle) else {
                continue;
            };
            match self.rooms.get(session_id) {
                Some(session) if session.has_member(handle) => {}
                _ => return Err(format!("{handle} is bound to {session_id} which doesn't hold it")),
            }
        }
        for session in self.rooms.iter() {
            let [a, b] = session.handles();
            if a == b {
                return Err(format!("session {} pairs {a} with itself", session.id));
            }
            for handle in [a, b] {
                if self.connections.is_live(handle) && self.connections.session_of(handle) != Some(session.id) {
                    return Err(format!("{handle} is live in session {} but not bound to it", session.id));
                }
            }
        }
        Ok(())
    }
}
