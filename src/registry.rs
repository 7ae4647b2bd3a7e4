//! Authoritative mapping from socket identity to connection state.
//!
//! The registry is confined to the event-loop thread and needs no locking. Its
//! counts are mirrored into [`ConnectionStats`], a small set of atomics that other
//! threads (and several loops, if they share one instance) can read without touching
//! the map.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
};

use mio::Token;

use crate::{
    connection::{Connection, ConnectionId},
    error::{NetworkError, Result},
};

/// Connection counters readable from any thread.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    next_id: AtomicU64,
    active: AtomicUsize,
    total: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands out the next connection id. Ids start at 1 and are never reused.
    pub fn next_id(&self) -> ConnectionId {
        ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

/// A registered socket together with its connection state.
pub struct Entry<S, St> {
    pub socket: S,
    pub connection: Connection<St>,
}

pub struct ConnectionRegistry<S, St> {
    entries: HashMap<Token, Entry<S, St>>,
    stats: Arc<ConnectionStats>,
    created: u64,
}

impl<S, St> ConnectionRegistry<S, St> {
    pub fn new(stats: Arc<ConnectionStats>) -> Self {
        Self {
            entries: HashMap::new(),
            stats,
            created: 0,
        }
    }

    pub fn stats(&self) -> &Arc<ConnectionStats> {
        &self.stats
    }

    /// Adds an entry for `token`.
    ///
    /// Fails with [`NetworkError::DuplicateRegistration`] if the token is already
    /// present; the existing entry is left untouched and the rejected socket is dropped.
    pub fn register(&mut self, token: Token, socket: S, connection: Connection<St>) -> Result<()> {
        if self.entries.contains_key(&token) {
            return Err(NetworkError::DuplicateRegistration(token));
        }
        self.entries.insert(token, Entry { socket, connection });
        self.created += 1;
        self.stats.active.fetch_add(1, Ordering::Relaxed);
        self.stats.total.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Removes the entry for `token`, returning it. Removing an absent token is a no-op.
    pub fn unregister(&mut self, token: Token) -> Option<Entry<S, St>> {
        let entry = self.entries.remove(&token)?;
        self.stats.active.fetch_sub(1, Ordering::Relaxed);
        Some(entry)
    }

    pub fn get_mut(&mut self, token: Token) -> Option<&mut Entry<S, St>> {
        self.entries.get_mut(&token)
    }

    pub fn contains(&self, token: Token) -> bool {
        self.entries.contains_key(&token)
    }

    pub fn active_count(&self) -> usize {
        self.entries.len()
    }

    /// Connections registered through this registry since it was created.
    pub fn total_created_count(&self) -> u64 {
        self.created
    }

    /// Removes every entry for which `is_stale` returns true.
    pub fn sweep<F>(&mut self, mut is_stale: F) -> Vec<(Token, Entry<S, St>)>
    where
        F: FnMut(&mut Entry<S, St>) -> bool,
    {
        let stale: Vec<Token> = self
            .entries
            .iter_mut()
            .filter_map(|(token, entry)| is_stale(entry).then_some(*token))
            .collect();

        stale
            .into_iter()
            .filter_map(|token| self.unregister(token).map(|entry| (token, entry)))
            .collect()
    }

    /// Removes all entries, used when the loop shuts down.
    pub fn drain(&mut self) -> Vec<(Token, Entry<S, St>)> {
        let tokens: Vec<Token> = self.entries.keys().copied().collect();
        tokens
            .into_iter()
            .filter_map(|token| self.unregister(token).map(|entry| (token, entry)))
            .collect()
    }
}
