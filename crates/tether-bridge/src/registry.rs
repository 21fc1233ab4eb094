//! Session arena with a forward (session id) and reverse (native id) index.
//!
//! Sessions live in slots; both indices map to a slot and are updated
//! together, so a lookup through either one always finds the same session.

use rustc_hash::FxHashMap;
use tether_command::SessionId;

use crate::context::SessionState;
use crate::host::{NativeId, NativeSession, SessionInfo};

/// Errors from registering a session.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The session id is already registered.
    #[error("session {0} is already registered")]
    DuplicateId(SessionId),

    /// Another session already uses this native handle.
    #[error("{0} is already bound to session {1}")]
    DuplicateNative(NativeId, SessionId),
}

/// One registered session.
#[derive(Debug)]
pub struct Session<S> {
    /// Connection details from the network thread.
    pub info: SessionInfo,
    /// Authentication and upgrade state.
    pub state: SessionState,
    /// Host-side object.
    pub native: S,
}

impl<S: NativeSession> Session<S> {
    /// Wrap a freshly accepted native session.
    pub fn new(info: SessionInfo, native: S) -> Self {
        Self {
            info,
            state: SessionState::default(),
            native,
        }
    }

    /// Network id.
    pub fn id(&self) -> SessionId {
        self.info.id
    }
}

/// Arena of sessions. Main-thread only.
#[derive(Debug)]
pub struct SessionRegistry<S> {
    slots: Vec<Option<Session<S>>>,
    free: Vec<usize>,
    by_id: FxHashMap<SessionId, usize>,
    by_native: FxHashMap<NativeId, usize>,
}

impl<S> Default for SessionRegistry<S> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            by_id: FxHashMap::default(),
            by_native: FxHashMap::default(),
        }
    }
}

impl<S: NativeSession> SessionRegistry<S> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session under both its ids.
    ///
    /// On error the session is handed back untouched so the caller can close it.
    pub fn insert(&mut self, session: Session<S>) -> Result<(), (RegistryError, Session<S>)> {
        let id = session.id();
        if self.by_id.contains_key(&id) {
            return Err((RegistryError::DuplicateId(id), session));
        }
        let native_id = session.native.native_id();
        if let Some(&slot) = self.by_native.get(&native_id) {
            let owner = self.slots[slot].as_ref().map_or(id, Session::id);
            return Err((RegistryError::DuplicateNative(native_id, owner), session));
        }

        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(session);
                slot
            }
            None => {
                self.slots.push(Some(session));
                self.slots.len() - 1
            }
        };
        self.by_id.insert(id, slot);
        self.by_native.insert(native_id, slot);
        Ok(())
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: SessionId) -> bool {
        self.by_id.contains_key(&id)
    }

    /// Look up by session id.
    pub fn get(&self, id: SessionId) -> Option<&Session<S>> {
        let slot = *self.by_id.get(&id)?;
        self.slots[slot].as_ref()
    }

    /// Look up by session id, mutably.
    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session<S>> {
        let slot = *self.by_id.get(&id)?;
        self.slots[slot].as_mut()
    }

    /// Look up by native identity.
    pub fn get_by_native(&self, native_id: NativeId) -> Option<&Session<S>> {
        let slot = *self.by_native.get(&native_id)?;
        self.slots[slot].as_ref()
    }

    /// Look up by native identity, mutably.
    pub fn get_mut_by_native(&mut self, native_id: NativeId) -> Option<&mut Session<S>> {
        let slot = *self.by_native.get(&native_id)?;
        self.slots[slot].as_mut()
    }

    /// Session id bound to a native identity.
    pub fn id_of(&self, native_id: NativeId) -> Option<SessionId> {
        self.get_by_native(native_id).map(Session::id)
    }

    /// Detach a session from both indices and return it.
    pub fn remove(&mut self, id: SessionId) -> Option<Session<S>> {
        let slot = self.by_id.remove(&id)?;
        self.take_slot(slot)
    }

    /// Detach a session by its native identity.
    pub fn remove_by_native(&mut self, native_id: NativeId) -> Option<Session<S>> {
        let slot = *self.by_native.get(&native_id)?;
        let session = self.slots[slot].as_ref()?;
        self.by_id.remove(&session.id());
        self.take_slot(slot)
    }

    fn take_slot(&mut self, slot: usize) -> Option<Session<S>> {
        let session = self.slots[slot].take()?;
        self.by_native.remove(&session.native.native_id());
        self.free.push(slot);
        Some(session)
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether no session is registered.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Iterate over every session.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Session<S>> {
        self.slots.iter_mut().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SessionContext;
    use tether_wire::EncryptionResponse;

    #[derive(Debug)]
    struct Dummy(u64);

    impl NativeSession for Dummy {
        type Packet = ();

        fn native_id(&self) -> NativeId {
            NativeId(self.0)
        }
        fn handle_packet(&mut self, _: (), _: &mut SessionContext<'_>) {}
        fn begin_authentication(&mut self, _: &str, _: bool, _: &mut SessionContext<'_>) {}
        fn process_authentication(&mut self, _: EncryptionResponse, _: &mut SessionContext<'_>) {}
        fn handle_ack(&mut self, _: u32) {}
        fn close(&mut self, _: &str) {}
    }

    fn session(id: u32, native: u64) -> Session<Dummy> {
        Session::new(
            SessionInfo {
                id: SessionId(id),
                address: "127.0.0.1".to_string(),
                port: 50_000,
            },
            Dummy(native),
        )
    }

    #[test]
    fn test_insert_and_lookup_both_ways() {
        let mut registry = SessionRegistry::new();
        registry.insert(session(7, 100)).unwrap();

        assert_eq!(registry.get(SessionId(7)).unwrap().native.0, 100);
        assert_eq!(registry.id_of(NativeId(100)), Some(SessionId(7)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_clears_both_indices() {
        let mut registry = SessionRegistry::new();
        registry.insert(session(7, 100)).unwrap();

        assert!(registry.remove(SessionId(7)).is_some());
        assert!(registry.get(SessionId(7)).is_none());
        assert!(registry.get_by_native(NativeId(100)).is_none());
        assert!(registry.is_empty());
        assert!(registry.remove(SessionId(7)).is_none());
    }

    #[test]
    fn test_remove_by_native_clears_both_indices() {
        let mut registry = SessionRegistry::new();
        registry.insert(session(1, 10)).unwrap();
        registry.insert(session(2, 20)).unwrap();

        let removed = registry.remove_by_native(NativeId(20)).unwrap();
        assert_eq!(removed.id(), SessionId(2));
        assert!(!registry.contains(SessionId(2)));
        assert!(registry.contains(SessionId(1)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut registry = SessionRegistry::new();
        registry.insert(session(1, 10)).unwrap();
        let (err, rejected) = registry.insert(session(1, 11)).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateId(SessionId(1)));
        assert_eq!(rejected.native.0, 11);
        assert_eq!(registry.get(SessionId(1)).unwrap().native.0, 10);
    }

    #[test]
    fn test_duplicate_native_rejected() {
        let mut registry = SessionRegistry::new();
        registry.insert(session(1, 10)).unwrap();
        let (err, _) = registry.insert(session(2, 10)).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateNative(NativeId(10), SessionId(1)));
        assert!(!registry.contains(SessionId(2)));
    }

    #[test]
    fn test_slots_are_reused_and_ids_reusable() {
        let mut registry = SessionRegistry::new();
        registry.insert(session(1, 10)).unwrap();
        registry.remove(SessionId(1));
        registry.insert(session(1, 11)).unwrap();

        assert_eq!(registry.slots.len(), 1);
        assert_eq!(registry.id_of(NativeId(11)), Some(SessionId(1)));
        assert_eq!(registry.id_of(NativeId(10)), None);
    }

    #[test]
    fn test_iter_mut_skips_free_slots() {
        let mut registry = SessionRegistry::new();
        for i in 0..4 {
            registry.insert(session(i, u64::from(i))).unwrap();
        }
        registry.remove(SessionId(2));
        let mut ids: Vec<u32> = registry.iter_mut().map(|s| s.id().0).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1, 3]);
    }
}
