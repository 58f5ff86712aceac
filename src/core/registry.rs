//! # Client registry.
//!
//! Tracks which clients are attached to the engine. The registry itself is
//! plain data behind the daemon's registry mutex.
//!
//! ## Rules
//! - One entry per client id; registering twice keeps the first entry.
//! - Each entry owns a child of the engine session token. It is cancelled when
//!   the client leaves or when the engine crashes.
//! - Entries whose token was cancelled from outside are dead; readers skip them
//!   and [`Registry::purge_cancelled`] removes them.
//! - Entries remember their registration order (for [`Registry::first`]).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

/// One attached client.
#[derive(Debug)]
struct Registration {
    /// Cancelled when the client disconnects.
    token: CancellationToken,
    order: u64,
    since: Instant,
}

/// Registry of attached clients.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    clients: HashMap<Arc<str>, Registration>,
    next_order: u64,
}

impl Registry {
    pub(crate) fn len(&self) -> usize {
        self.clients.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Returns the id and token registered for `id`, creating the entry if absent.
    ///
    /// New tokens are children of `session`. The flag is `true` when the entry
    /// was created by this call.
    pub(crate) fn register(
        &mut self,
        id: &str,
        session: &CancellationToken,
    ) -> (Arc<str>, CancellationToken, bool) {
        if let Some((key, reg)) = self.clients.get_key_value(id) {
            return (Arc::clone(key), reg.token.clone(), false);
        }
        let key: Arc<str> = Arc::from(id);
        let token = session.child_token();
        self.clients.insert(
            Arc::clone(&key),
            Registration {
                token: token.clone(),
                order: self.next_order,
                since: Instant::now(),
            },
        );
        self.next_order += 1;
        (key, token, true)
    }

    /// Removes `id` and cancels its token. Returns `false` if it was absent.
    pub(crate) fn unregister(&mut self, id: &str) -> bool {
        match self.clients.remove(id) {
            Some(reg) => {
                tracing::debug!(client = id, attached_for = ?reg.since.elapsed(), "client unregistered");
                reg.token.cancel();
                true
            }
            None => false,
        }
    }

    /// True if `id` has a live entry.
    pub(crate) fn contains(&self, id: &str) -> bool {
        self.clients
            .get(id)
            .is_some_and(|reg| !reg.token.is_cancelled())
    }

    /// Removes entries whose token was cancelled from outside. Returns their ids.
    pub(crate) fn purge_cancelled(&mut self) -> Vec<Arc<str>> {
        let mut dead: Vec<(u64, Arc<str>)> = self
            .clients
            .iter()
            .filter(|(_, reg)| reg.token.is_cancelled())
            .map(|(id, reg)| (reg.order, Arc::clone(id)))
            .collect();
        dead.sort_unstable_by_key(|(order, _)| *order);
        for (_, id) in &dead {
            self.clients.remove(id);
        }
        dead.into_iter().map(|(_, id)| id).collect()
    }

    /// Removes every client, cancelling their tokens. Returns the removed ids.
    pub(crate) fn drain(&mut self) -> Vec<Arc<str>> {
        let mut ids: Vec<(u64, Arc<str>)> = self
            .clients
            .drain()
            .map(|(id, reg)| {
                reg.token.cancel();
                (reg.order, id)
            })
            .collect();
        ids.sort_unstable_by_key(|(order, _)| *order);
        ids.into_iter().map(|(_, id)| id).collect()
    }

    /// Earliest still-registered client.
    pub(crate) fn first(&self) -> Option<(Arc<str>, CancellationToken)> {
        self.clients
            .iter()
            .filter(|(_, reg)| !reg.token.is_cancelled())
            .min_by_key(|(_, reg)| reg.order)
            .map(|(id, reg)| (Arc::clone(id), reg.token.clone()))
    }

    /// Registered ids, sorted.
    pub(crate) fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .clients
            .iter()
            .filter(|(_, reg)| !reg.token.is_cancelled())
            .map(|(id, _)| id.to_string())
            .collect();
        ids.sort_unstable();
        ids
    }
}
