use serde_json::Value;
use tokio::time::Instant;

use super::{Engine, Outbox};
use crate::{
    error::EngineError,
    protocol::{ConnId, Message, MessageId, MessageKind, ServerEvent, SessionId, SignalKind, TrafficClass},
};

impl Engine {
    /// The sender's session, provided the rate limit allows the event and
    /// the session still exists. A stale binding is cleared on the way.
    fn relay_target(&mut self, handle: ConnId, class: TrafficClass, now: Instant) -> Result<SessionId, EngineError> {
        if !self.connections.is_live(handle) {
            return Err(EngineError::UnknownConnection);
        }
        self.limiter
            .check(handle, class, now)
            .map_err(|retry_after| EngineError::RateLimited { class, retry_after })?;

        let session_id = self.connections.session_of(handle).ok_or(EngineError::NotInSession)?;
        if !self.rooms.contains(session_id) {
            self.connections.unbind(handle, session_id);
            return Err(EngineError::SessionGone);
        }
        Ok(session_id)
    }

    /// Sends a chat message to both members, the sender included, and
    /// counts as activity for the idle timeout.
    pub fn relay_message(
        &mut self,
        handle: ConnId,
        content: String,
        kind: MessageKind,
        now: Instant,
    ) -> Result<(MessageId, Outbox), EngineError> {
        let session_id = self.relay_target(handle, kind.class(), now)?;
        self.validator.validate(kind, &content).map_err(EngineError::InvalidContent)?;

        let message = Message::new(handle, content, kind);
        let id = message.id;
        let event = ServerEvent::NewMessage(message);

        let outbox: Outbox = self
            .rooms
            .get(session_id)
            .map(|session| {
                session
                    .handles()
                    .into_iter()
                    .filter(|&member| self.connections.is_live(member))
                    .map(|member| (member, event.clone()))
                    .collect()
            })
            .unwrap_or_default();
        self.rooms.touch(session_id, now);

        Ok((id, outbox))
    }

    /// Typing state goes to the partner only and doesn't keep the session alive.
    pub fn relay_typing(&mut self, handle: ConnId, is_typing: bool, now: Instant) -> Result<Outbox, EngineError> {
        let session_id = self.relay_target(handle, TrafficClass::Ordinary, now)?;
        Ok(self.to_partner(session_id, handle, ServerEvent::PartnerTyping { is_typing }))
    }

    /// Forwards an opaque peer-connection negotiation payload to the partner.
    pub fn relay_signal(
        &mut self,
        handle: ConnId,
        kind: SignalKind,
        payload: Value,
        now: Instant,
    ) -> Result<Outbox, EngineError> {
        let session_id = self.relay_target(handle, TrafficClass::Ordinary, now)?;
        Ok(self.to_partner(session_id, handle, kind.into_event(payload, handle)))
    }

    fn to_partner(&self, session_id: SessionId, handle: ConnId, event: ServerEvent) -> Outbox {
        self.rooms
            .get(session_id)
            .and_then(|session| session.partner_of(handle))
            .filter(|partner| self.connections.is_live(partner.handle))
            .map(|partner| vec![(partner.handle, event)])
            .unwrap_or_default()
    }
}
