//! Token-to-session directory used to resolve inbound engine events.
//!
//! The directory holds non-owning references: a session is listed under its
//! token while it has at least one handler registered, and is never kept
//! alive by being listed. Reads come from engine threads during dispatch,
//! writes from registration calls; both go through the same concurrent map.

use std::sync::{Arc, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::session::SessionShared;
use crate::types::Token;

/// Process-wide index from token to the sessions that care about its events.
pub struct Directory {
    entries: DashMap<Token, Vec<Weak<SessionShared>>>,
}

impl Directory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// List `session` under `token`. Returns `false` if it was already listed.
    pub(crate) fn insert(&self, token: &Token, session: &Arc<SessionShared>) -> bool {
        let mut listed = self.entries.entry(token.clone()).or_default();
        if listed.iter().any(|weak| same_session(weak, session)) {
            return false;
        }
        listed.push(Arc::downgrade(session));
        true
    }

    /// Remove `session` from `token`'s entry, dropping the entry once it is empty.
    /// Returns `false` if it was not listed.
    pub(crate) fn remove(&self, token: &Token, session: &Arc<SessionShared>) -> bool {
        match self.entries.entry(token.clone()) {
            Entry::Occupied(mut entry) => {
                let listed = entry.get_mut();
                let before = listed.len();
                listed.retain(|weak| !same_session(weak, session) && weak.strong_count() > 0);
                let removed = listed.len() < before;
                if listed.is_empty() {
                    entry.remove();
                }
                removed
            }
            Entry::Vacant(_) => false,
        }
    }

    /// Live sessions listed under `token`.
    ///
    /// The returned list is a snapshot; the map is not locked while the
    /// caller works with it.
    pub(crate) fn lookup(&self, token: &str) -> Vec<Arc<SessionShared>> {
        self.entries
            .get(token)
            .map(|listed| listed.iter().filter_map(Weak::upgrade).collect())
            .unwrap_or_default()
    }

    /// Whether any session is listed under `token`.
    pub fn contains(&self, token: &str) -> bool {
        self.entries.contains_key(token)
    }

    /// Number of live sessions listed under `token`.
    pub fn sessions_for(&self, token: &str) -> usize {
        self.entries
            .get(token)
            .map(|listed| listed.iter().filter(|weak| weak.strong_count() > 0).count())
            .unwrap_or(0)
    }

    /// Number of tokens with at least one listed session.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tokens currently present, in no particular order.
    pub fn tokens(&self) -> Vec<Token> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}

fn same_session(weak: &Weak<SessionShared>, session: &Arc<SessionShared>) -> bool {
    std::ptr::eq(weak.as_ptr(), Arc::as_ptr(session))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatchConfig;
    use crate::dispatch::Dispatcher;
    use crate::loopback::LoopbackEngine;
    use crate::session::Session;

    fn dispatcher() -> Arc<Dispatcher> {
        Arc::new(Dispatcher::new(DispatchConfig::default()).unwrap())
    }

    #[test]
    fn test_new_directory_is_empty() {
        let directory = Directory::new();
        assert!(directory.is_empty());
        assert_eq!(directory.len(), 0);
        assert!(!directory.contains("A"));
        assert_eq!(directory.sessions_for("A"), 0);
        assert!(directory.lookup("A").is_empty());
    }

    #[test]
    fn test_removing_one_session_keeps_the_others() {
        let engine = LoopbackEngine::new();
        let dispatcher = dispatcher();
        let first = Session::with_dispatcher(&engine, "A", Arc::clone(&dispatcher)).unwrap();
        let second = Session::with_dispatcher(&engine, "A", Arc::clone(&dispatcher)).unwrap();
        let other = Session::with_dispatcher(&engine, "B", Arc::clone(&dispatcher)).unwrap();

        first.add_device_info_callback("d1", |_| {}).unwrap();
        second.add_device_info_callback("d1", |_| {}).unwrap();
        other.add_device_info_callback("d1", |_| {}).unwrap();

        let directory = dispatcher.directory();
        assert_eq!(directory.len(), 2);
        assert_eq!(directory.sessions_for("A"), 2);

        first.remove_all_device_info_callbacks("d1").unwrap();
        assert_eq!(directory.sessions_for("A"), 1);
        assert_eq!(directory.lookup("A").len(), 1);

        second.remove_all_device_info_callbacks("d1").unwrap();
        assert!(!directory.contains("A"));

        let mut tokens = directory.tokens();
        tokens.sort();
        assert_eq!(tokens, vec![Token::new("B")]);
    }

    #[test]
    fn test_insert_is_idempotent() {
        let engine = LoopbackEngine::new();
        let dispatcher = dispatcher();
        let session = Session::with_dispatcher(&engine, "A", Arc::clone(&dispatcher)).unwrap();

        session.add_ctrl_event_send_callback("d1", |_| {}).unwrap();
        session.add_ctrl_event_send_callback("d2", |_| {}).unwrap();
        session.add_device_disconnected_callback("d1", |_| {}).unwrap();
        assert_eq!(dispatcher.directory().sessions_for("A"), 1);
    }
}
