//! Wire types exchanged with clients over the socket.
//!
//! Every frame is `{"event": "<name>", "data": <payload>}`.

use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::profile::{ProfileForm, PublicProfile};

pub type SessionId = Uuid;
pub type MessageId = Uuid;

/// Opaque per-connection handle handed out at connect time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnId(Uuid);

impl ConnId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    Video,
}

impl MessageKind {
    pub fn class(self) -> TrafficClass {
        match self {
            MessageKind::Text => TrafficClass::Ordinary,
            MessageKind::Image | MessageKind::Video => TrafficClass::Media,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficClass {
    Ordinary,
    Media,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub id: MessageId,
    pub from: ConnId,
    pub content: String,
    pub kind: MessageKind,
    pub timestamp: u64,
}

impl Message {
    pub fn new(from: ConnId, content: String, kind: MessageKind) -> Self {
        Self {
            id: Uuid::now_v7(),
            from,
            content,
            kind,
            timestamp: crate::current_timestamp(),
        }
    }
}

/// Why a session went away. Clients branch on these values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndReason {
    YouLeft,
    EndedByPeer,
    PeerDisconnected,
    IdleTimeout,
    ServerBusy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

impl SignalKind {
    pub fn into_event(self, payload: Value, from: ConnId) -> ServerEvent {
        match self {
            SignalKind::Offer => ServerEvent::Offer { payload, from },
            SignalKind::Answer => ServerEvent::Answer { payload, from },
            SignalKind::IceCandidate => ServerEvent::IceCandidate { payload, from },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    FindMatch(ProfileForm),
    LeaveQueue,
    SendMessage {
        content: String,
        #[serde(default)]
        kind: MessageKind,
    },
    Typing {
        is_typing: bool,
    },
    EndChat,
    Offer(Value),
    Answer(Value),
    IceCandidate(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    Searching,
    QueueLeft,
    Matched {
        session_id: SessionId,
        partner: PublicProfile,
        shared_interests: BTreeSet<String>,
    },
    NewMessage(Message),
    PartnerTyping {
        is_typing: bool,
    },
    SessionEnded {
        reason: EndReason,
    },
    Offer {
        payload: Value,
        from: ConnId,
    },
    Answer {
        payload: Value,
        from: ConnId,
    },
    IceCandidate {
        payload: Value,
        from: ConnId,
    },
    RateLimited {
        class: TrafficClass,
        retry_after_ms: u64,
    },
    Error {
        code: String,
        message: String,
    },
}
