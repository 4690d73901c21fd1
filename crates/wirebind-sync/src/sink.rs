//! Outbound mutation sinks
//!
//! A [`SyncMap`](crate::SyncMap) hands every local write or delete to its sink
//! exactly once, after releasing its internal lock. Errors from the sink are
//! returned to the caller of `write`/`delete` unchanged; sinks never retry.

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt::Debug;
use std::hash::Hash;
use tokio::sync::mpsc;
use wirebind_core::wire::{self, WireFormat};
use wirebind_core::{OutboundMutation, Result, SyncError};

/// Receives outbound mutations from a replica
pub trait MutationSink<K, V>: Send + Sync {
    /// Deliver one mutation
    fn send(&self, mutation: OutboundMutation<K, V>) -> Result<()>;
}

/// Discards every mutation
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpSink;

impl<K, V> MutationSink<K, V> for NoOpSink {
    fn send(&self, _mutation: OutboundMutation<K, V>) -> Result<()> {
        Ok(())
    }
}

/// Logs every mutation and accepts it
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingSink;

impl<K: Debug, V: Debug> MutationSink<K, V> for LoggingSink {
    fn send(&self, mutation: OutboundMutation<K, V>) -> Result<()> {
        tracing::info!(
            token = %mutation.token,
            changes = ?mutation.changes,
            "Outbound mutation"
        );
        Ok(())
    }
}

/// Function-based sink wrapper
pub struct FnSink<F>(F);

impl<F> FnSink<F> {
    /// Wrap a closure as a sink
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<K, V, F> MutationSink<K, V> for FnSink<F>
where
    F: Fn(OutboundMutation<K, V>) -> Result<()> + Send + Sync,
{
    fn send(&self, mutation: OutboundMutation<K, V>) -> Result<()> {
        (self.0)(mutation)
    }
}

/// Encodes mutations and pushes the frames into a transport channel
///
/// The channel can be swapped with [`ChannelSink::rebind`] when the transport
/// reconnects; sends after the receiver is dropped fail with
/// [`SyncError::Sink`].
#[derive(Debug)]
pub struct ChannelSink {
    format: WireFormat,
    tx: Mutex<mpsc::UnboundedSender<Vec<u8>>>,
}

impl ChannelSink {
    /// Create a sink writing `format` frames into `tx`
    pub fn new(format: WireFormat, tx: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Self {
            format,
            tx: Mutex::new(tx),
        }
    }

    /// Replace the outbound channel, returning the previous sender
    pub fn rebind(&self, tx: mpsc::UnboundedSender<Vec<u8>>) -> mpsc::UnboundedSender<Vec<u8>> {
        std::mem::replace(&mut *self.tx.lock(), tx)
    }

    /// Frame encoding in use
    pub fn format(&self) -> WireFormat {
        self.format
    }
}

impl<K, V> MutationSink<K, V> for ChannelSink
where
    K: Serialize + Eq + Hash,
    V: Serialize,
{
    fn send(&self, mutation: OutboundMutation<K, V>) -> Result<()> {
        let frame = wire::encode(self.format, &mutation)?;
        self.tx
            .lock()
            .send(frame)
            .map_err(|_| SyncError::sink("outbound channel closed"))
    }
}
