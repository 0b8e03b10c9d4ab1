//! Session pool: interns one live session per replica endpoint.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::session::RpcSession;

/// Concurrent endpoint → session map. Failed sessions are evicted lazily:
/// the next `get` for their endpoint builds a fresh, eagerly-connecting
/// replacement. The insert path is a per-key critical section; readers take
/// a lock-free fast path.
#[derive(Default)]
pub struct SessionPool {
    sessions: DashMap<String, Arc<RpcSession>>,
}

impl SessionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the live session for `endpoint`, creating one if none exists
    /// or the previous one has failed.
    pub fn get(&self, endpoint: &str) -> Arc<RpcSession> {
        if let Some(session) = self.sessions.get(endpoint) {
            if !session.is_failed() {
                return session.clone();
            }
        }
        match self.sessions.entry(endpoint.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_failed() {
                    let fresh = RpcSession::open(endpoint.to_string());
                    *occupied.get_mut() = fresh.clone();
                    fresh
                } else {
                    occupied.get().clone()
                }
            }
            Entry::Vacant(vacant) => {
                let session = RpcSession::open(endpoint.to_string());
                vacant.insert(session.clone());
                session
            }
        }
    }

    /// Number of interned sessions (live or not yet evicted).
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Close every session and forget them. Pending calls complete with
    /// `Cancelled`.
    pub fn close_all(&self) {
        for entry in self.sessions.iter() {
            entry.value().close();
        }
        self.sessions.clear();
    }
}
