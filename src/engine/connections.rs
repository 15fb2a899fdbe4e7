use std::collections::HashMap;

use crate::protocol::{ConnId, SessionId};

/// Live connections and the session each one is bound to, if any.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    bindings: HashMap<ConnId, Option<SessionId>>,
}

impl ConnectionRegistry {
    pub fn register(&mut self, handle: ConnId) -> bool {
        if self.bindings.contains_key(&handle) {
            return false;
        }
        self.bindings.insert(handle, None);
        true
    }

    /// Forgets the connection, handing back whatever it was bound to.
    pub fn remove(&mut self, handle: ConnId) -> Option<Option<SessionId>> {
        self.bindings.remove(&handle)
    }

    pub fn is_live(&self, handle: ConnId) -> bool {
        self.bindings.contains_key(&handle)
    }

    pub fn session_of(&self, handle: ConnId) -> Option<SessionId> {
        self.bindings.get(&handle).copied().flatten()
    }

    /// Binds a live connection. Gone connections are left alone.
    pub fn bind(&mut self, handle: ConnId, session_id: SessionId) -> bool {
        match self.bindings.get_mut(&handle) {
            Some(slot) => {
                *slot = Some(session_id);
                true
            }
            None => false,
        }
    }

    /// Clears the binding only if it still points at `session_id`.
    pub fn unbind(&mut self, handle: ConnId, session_id: SessionId) {
        if let Some(slot) = self.bindings.get_mut(&handle) {
            if *slot == Some(session_id) {
                *slot = None;
            }
        }
    }

    pub fn handles(&self) -> impl Iterator<Item = ConnId> + '_ {
        self.bindings.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn bind_and_unbind() {
        let mut registry = ConnectionRegistry::default();
        let handle = ConnId::new();
        let session_id = Uuid::now_v7();

        assert!(registry.register(handle));
        assert!(!registry.register(handle));
        assert!(registry.bind(handle, session_id));
        assert_eq!(registry.session_of(handle), Some(session_id));

        // a stale unbind for some other session is ignored
        registry.unbind(handle, Uuid::now_v7());
        assert_eq!(registry.session_of(handle), Some(session_id));

        registry.unbind(handle, session_id);
        assert_eq!(registry.session_of(handle), None);
        assert!(registry.is_live(handle));
    }

    #[test]
    fn gone_connections_cannot_be_bound() {
        let mut registry = ConnectionRegistry::default();
        let handle = ConnId::new();
        registry.register(handle);
        assert_eq!(registry.remove(handle), Some(None));
        assert!(!registry.bind(handle, Uuid::now_v7()));
        assert!(registry.is_empty());
    }
}
