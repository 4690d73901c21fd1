//! Optimistic replica map
//!
//! Two maps sit behind one lock:
//!
//! ```text
//!            write / delete                    apply(inbound)
//!                  │                                 │
//!                  ▼                                 ▼
//!   ┌──────────────────────────┐   token match  ┌──────────────┐
//!   │ overlay: key → (token,   │ ◄───────────── │ clear pass   │
//!   │          Option<value>)  │                └──────────────┘
//!   └──────────────────────────┘                ┌──────────────┐
//!   ┌──────────────────────────┐ ◄───────────── │ confirm pass │
//!   │ confirmed: key → value   │  always        └──────────────┘
//!   └──────────────────────────┘
//! ```
//!
//! Reads consult the overlay first. An overlay entry is only retired by a
//! confirmation carrying its own token, so a confirmation of an older write
//! advances the confirmed store without hiding a newer local value.

use crate::sink::MutationSink;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use wirebind_core::{
    Change, InboundMutation, Mutation, MutationToken, RandomTokenSource, Result, SyncError,
    SyncMapConfig, TokenSource,
};

/// A speculative local write not yet retired by a confirmation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimisticEntry<V> {
    /// Token the write was sent with
    pub token: MutationToken,
    /// `Some` for a pending set, `None` for a pending delete
    pub payload: Option<V>,
}

impl<V> OptimisticEntry<V> {
    /// Whether this entry is a pending delete
    pub fn is_tombstone(&self) -> bool {
        self.payload.is_none()
    }
}

/// Outcome of reconciling one inbound batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Keys written to the confirmed store
    pub applied: usize,
    /// Overlay entries retired by a token match
    pub cleared: usize,
    /// Overlay entries kept because the batch token does not match the
    /// pending entry's token
    pub superseded: usize,
}

struct ReplicaState<K, V> {
    confirmed: HashMap<K, V>,
    overlay: HashMap<K, OptimisticEntry<V>>,
}

impl<K: Eq + Hash, V> ReplicaState<K, V> {
    fn new() -> Self {
        Self {
            confirmed: HashMap::new(),
            overlay: HashMap::new(),
        }
    }

    fn effective(&self, key: &K) -> Option<&V> {
        match self.overlay.get(key) {
            Some(entry) => entry.payload.as_ref(),
            None => self.confirmed.get(key),
        }
    }
}

/// Client-side key-value replica with optimistic local writes
///
/// Writes are visible to readers immediately and forwarded to the sink. The
/// authority's confirmations arrive through [`SyncMap::apply`] in any order.
/// All operations are atomic with respect to one another; the sink is always
/// called after the internal lock is released, so it may re-enter the map.
pub struct SyncMap<K, V> {
    state: Mutex<ReplicaState<K, V>>,
    sink: Arc<dyn MutationSink<K, V>>,
    tokens: Box<dyn TokenSource>,
}

impl<K, V> SyncMap<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: Clone,
{
    /// Create a map with random tokens
    pub fn new(sink: impl MutationSink<K, V> + 'static) -> Self {
        Self::with_token_source(sink, RandomTokenSource::new())
    }

    /// Create a map with the given token source
    pub fn with_token_source(
        sink: impl MutationSink<K, V> + 'static,
        tokens: impl TokenSource + 'static,
    ) -> Self {
        Self::from_parts(Arc::new(sink), Box::new(tokens))
    }

    /// Create a map with the token strategy selected by `config`
    pub fn from_config(
        sink: impl MutationSink<K, V> + 'static,
        config: &SyncMapConfig,
    ) -> Result<Self> {
        Ok(Self::from_parts(Arc::new(sink), config.token_source()?))
    }

    /// Create a map from a shared sink and a boxed token source
    pub fn from_parts(sink: Arc<dyn MutationSink<K, V>>, tokens: Box<dyn TokenSource>) -> Self {
        Self {
            state: Mutex::new(ReplicaState::new()),
            sink,
            tokens,
        }
    }

    /// Optimistically set `key` and send the intent
    ///
    /// Returns the token the intent was sent with. A sink failure is returned
    /// as-is; the optimistic value stays in place either way.
    pub fn write(&self, key: K, value: V) -> Result<MutationToken> {
        let token = self.tokens.next_token();
        self.state.lock().overlay.insert(
            key.clone(),
            OptimisticEntry {
                token,
                payload: Some(value.clone()),
            },
        );

        tracing::debug!(key = ?key, %token, "Optimistic write");
        self.sink.send(Mutation::set(token, key, value))?;
        Ok(token)
    }

    /// Optimistically delete `key` and send the intent
    ///
    /// Succeeds whether or not the key currently has a value.
    pub fn delete(&self, key: K) -> Result<MutationToken> {
        let token = self.tokens.next_token();
        self.state.lock().overlay.insert(
            key.clone(),
            OptimisticEntry {
                token,
                payload: None,
            },
        );

        tracing::debug!(key = ?key, %token, "Optimistic delete");
        self.sink.send(Mutation::delete(token, key))?;
        Ok(token)
    }

    /// Effective value of `key`, or [`SyncError::NotFound`]
    pub fn read(&self, key: &K) -> Result<V> {
        self.get(key).ok_or_else(|| SyncError::not_found(key))
    }

    /// Effective value of `key`, if any
    pub fn get(&self, key: &K) -> Option<V> {
        self.state.lock().effective(key).cloned()
    }

    /// Effective value of `key`, or `default`
    pub fn read_or(&self, key: &K, default: V) -> V {
        self.get(key).unwrap_or(default)
    }

    /// Whether `key` has an effective value
    pub fn contains(&self, key: &K) -> bool {
        self.state.lock().effective(key).is_some()
    }

    /// Reconcile one batch from the authority
    ///
    /// Overlay entries whose token equals the batch token are retired, each
    /// key independently. Every change is then written to the confirmed store
    /// regardless of the overlay.
    pub fn apply(&self, inbound: InboundMutation<K, V>) -> ApplyReport {
        let mut report = ApplyReport::default();
        let token = inbound.token;

        let mut guard = self.state.lock();
        let state = &mut *guard;

        for key in inbound.changes.keys() {
            match state.overlay.get(key).map(|entry| entry.token == token) {
                Some(true) => {
                    state.overlay.remove(key);
                    report.cleared += 1;
                    tracing::trace!(key = ?key, %token, "Confirmation retired optimistic entry");
                }
                Some(false) => {
                    report.superseded += 1;
                    tracing::trace!(key = ?key, %token, "Confirmation does not match pending local write");
                }
                None => {}
            }
        }

        for (key, change) in inbound.changes {
            match change {
                Change::Set(value) => {
                    state.confirmed.insert(key, value);
                }
                Change::Delete => {
                    state.confirmed.remove(&key);
                }
            }
            report.applied += 1;
        }
        drop(guard);

        tracing::debug!(
            %token,
            applied = report.applied,
            cleared = report.cleared,
            superseded = report.superseded,
            "Applied inbound mutation"
        );
        report
    }

    /// Discard every optimistic entry, keeping the confirmed store
    ///
    /// Nothing is sent to the sink. Returns the number of entries discarded.
    pub fn optimistic_reset(&self) -> usize {
        let discarded = {
            let mut state = self.state.lock();
            let n = state.overlay.len();
            state.overlay.clear();
            n
        };
        tracing::info!(discarded, "Optimistic state reset");
        discarded
    }

    /// Number of unconfirmed local mutations
    pub fn pending_len(&self) -> usize {
        self.state.lock().overlay.len()
    }

    /// Whether `key` has an unconfirmed local mutation
    pub fn is_pending(&self, key: &K) -> bool {
        self.state.lock().overlay.contains_key(key)
    }

    /// Token of the unconfirmed local mutation on `key`
    pub fn pending_token(&self, key: &K) -> Option<MutationToken> {
        self.state.lock().overlay.get(key).map(|entry| entry.token)
    }

    /// Unconfirmed local mutation on `key`
    pub fn pending_entry(&self, key: &K) -> Option<OptimisticEntry<V>> {
        self.state.lock().overlay.get(key).cloned()
    }

    /// Number of keys in the confirmed store
    pub fn confirmed_len(&self) -> usize {
        self.state.lock().confirmed.len()
    }

    /// Confirmed value of `key`, ignoring the overlay
    pub fn confirmed(&self, key: &K) -> Option<V> {
        self.state.lock().confirmed.get(key).cloned()
    }

    /// Copy of the confirmed store
    pub fn confirmed_snapshot(&self) -> HashMap<K, V> {
        self.state.lock().confirmed.clone()
    }

    /// Copy of the effective view: confirmed store with the overlay applied
    pub fn snapshot(&self) -> HashMap<K, V> {
        let state = self.state.lock();
        let mut view = state.confirmed.clone();
        for (key, entry) in &state.overlay {
            match &entry.payload {
                Some(value) => {
                    view.insert(key.clone(), value.clone());
                }
                None => {
                    view.remove(key);
                }
            }
        }
        view
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for SyncMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SyncMap")
            .field("confirmed", &state.confirmed)
            .field("pending", &state.overlay.len())
            .finish()
    }
}
