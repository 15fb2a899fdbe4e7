//! Errors produced by engine operations.
//!
//! None of these are fatal; each is reported back to the requesting
//! connection as an `error` or `rate-limited` event.

use std::time::Duration;

use thiserror::Error;

use crate::protocol::{ServerEvent, TrafficClass};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("malformed event: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid profile: {0}")]
    InvalidProfile(String),
    #[error("invalid content: {0}")]
    InvalidContent(String),
    #[error("already waiting for a match")]
    AlreadyQueued,
    #[error("already in a chat")]
    AlreadyInSession,
    #[error("not waiting for a match")]
    NotQueued,
    #[error("not in a chat")]
    NotInSession,
    #[error("chat no longer exists")]
    SessionGone,
    #[error("{class:?} rate limit exceeded, retry in {retry_after:?}")]
    RateLimited {
        class: TrafficClass,
        retry_after: Duration,
    },
    #[error("unknown connection")]
    UnknownConnection,
    #[error("server is full")]
    ServerFull,
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        use EngineError::*;
        match self {
            Malformed(_) => "malformed-event",
            InvalidProfile(_) => "invalid-profile",
            InvalidContent(_) => "invalid-content",
            AlreadyQueued => "already-queued",
            AlreadyInSession => "already-in-session",
            NotQueued => "not-queued",
            NotInSession => "not-in-session",
            SessionGone => "session-gone",
            RateLimited { .. } => "rate-limited",
            UnknownConnection => "unknown-connection",
            ServerFull => "server-full",
        }
    }

    pub fn to_event(&self) -> ServerEvent {
        match self {
            EngineError::RateLimited { class, retry_after } => ServerEvent::RateLimited {
                class: *class,
                retry_after_ms: retry_after.as_millis() as u64,
            },
            _ => ServerEvent::Error {
                code: self.code().to_owned(),
                message: self.to_string(),
            },
        }
    }
}
