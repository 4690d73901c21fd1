//! Wirebind Sync: optimistic replica maps
//!
//! A [`SyncMap`] is a client-side key-value replica. Local writes and deletes
//! take effect immediately and are dispatched as intents to a remote
//! authority through a [`MutationSink`]. The authority's confirmations come
//! back through [`SyncMap::apply`], in any order and possibly for keys this
//! replica never touched.
//!
//! # Reconciliation
//!
//! Each local mutation carries a fresh [`MutationToken`]. A confirmation
//! retires a pending local entry only when the tokens match, and always
//! advances the confirmed store. A stale confirmation therefore never hides a
//! newer local write, and the authority never tracks per-client sequence
//! numbers.
//!
//! # Usage
//!
//! ```rust
//! use wirebind_sync::{NoOpSink, SyncMap};
//! use wirebind_core::Mutation;
//!
//! let map: SyncMap<String, u32> = SyncMap::new(NoOpSink);
//! let t1 = map.write("steps".to_string(), 10).unwrap();
//! let t2 = map.write("steps".to_string(), 20).unwrap();
//!
//! // Confirmation of the first write does not hide the second.
//! map.apply(Mutation::set(t1, "steps".to_string(), 10));
//! assert_eq!(map.read(&"steps".to_string()).unwrap(), 20);
//!
//! map.apply(Mutation::set(t2, "steps".to_string(), 20));
//! assert_eq!(map.pending_len(), 0);
//! ```
//!
//! [`SyncSession`] wires a map to a transport through Tokio channels and
//! resets optimistic state on reconnect.

#![forbid(unsafe_code)]

/// Optimistic replica map
pub mod map;

/// Transport session adapter
pub mod session;

/// Outbound mutation sinks
pub mod sink;

pub use map::{ApplyReport, OptimisticEntry, SyncMap};
pub use session::{pump_inbound, SyncSession, TransportEnds};
pub use sink::{ChannelSink, FnSink, LoggingSink, MutationSink, NoOpSink};

pub use wirebind_core::{
    Change, InboundMutation, Mutation, MutationToken, OutboundMutation, SyncError, SyncMapConfig,
};
