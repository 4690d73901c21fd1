//! Transport session adapter
//!
//! Binds a shared [`SyncMap`] to one generation of a transport connection.
//! The transport itself is external: it drains [`TransportEnds::outbound`]
//! onto the wire and feeds received frames into [`TransportEnds::inbound`].
//!
//! ```text
//!  SyncMap::write ──► ChannelSink ──► outbound rx ──► (transport) ──► authority
//!  SyncMap::apply ◄── inbound pump ◄── inbound tx ◄── (transport) ◄── authority
//! ```
//!
//! On reconnect every unconfirmed local intent is void, so the map's overlay
//! is reset and fresh channel ends are handed out.

use crate::map::SyncMap;
use crate::sink::{ChannelSink, MutationSink};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use wirebind_core::wire::{self, WireFormat};
use wirebind_core::{Result, SyncMapConfig};

/// Channel halves driven by the external transport
#[derive(Debug)]
pub struct TransportEnds {
    /// Encoded outbound mutations to put on the wire
    pub outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    /// Received frames to hand to the replica
    pub inbound: mpsc::Sender<Vec<u8>>,
}

/// Decode inbound frames and apply them until the channel closes
///
/// Frames that fail to decode are logged and dropped. Returns the number of
/// batches applied.
pub async fn pump_inbound<K, V>(
    map: Arc<SyncMap<K, V>>,
    format: WireFormat,
    mut frames: mpsc::Receiver<Vec<u8>>,
) -> usize
where
    K: DeserializeOwned + Eq + Hash + Clone + Debug,
    V: DeserializeOwned + Clone,
{
    let mut applied = 0;
    while let Some(frame) = frames.recv().await {
        match wire::decode::<K, V>(format, &frame) {
            Ok(mutation) => {
                map.apply(mutation);
                applied += 1;
            }
            Err(e) => {
                tracing::warn!(error = %e, bytes = frame.len(), "Dropping undecodable inbound frame");
            }
        }
    }
    tracing::debug!(applied, "Inbound channel closed");
    applied
}

/// A replica map bound to the current transport generation
pub struct SyncSession<K, V> {
    map: Arc<SyncMap<K, V>>,
    sink: Arc<ChannelSink>,
    config: SyncMapConfig,
    generation: AtomicU64,
    pump: Mutex<Option<JoinHandle<usize>>>,
}

impl<K, V> SyncSession<K, V>
where
    K: Serialize + DeserializeOwned + Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Create a session and its first transport generation
    ///
    /// Must be called within a Tokio runtime; the inbound pump is spawned.
    pub fn connect(config: SyncMapConfig) -> Result<(Self, TransportEnds)> {
        config.validate()?;

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::channel(config.inbound_buffer);

        let sink = Arc::new(ChannelSink::new(config.wire_format, out_tx));
        let shared: Arc<dyn MutationSink<K, V>> = sink.clone();
        let map: Arc<SyncMap<K, V>> =
            Arc::new(SyncMap::from_parts(shared, config.token_source()?));
        let pump = tokio::spawn(pump_inbound(map.clone(), config.wire_format, in_rx));

        tracing::info!(wire_format = ?config.wire_format, "Sync session connected");

        let session = Self {
            map,
            sink,
            config,
            generation: AtomicU64::new(0),
            pump: Mutex::new(Some(pump)),
        };
        let ends = TransportEnds {
            outbound: out_rx,
            inbound: in_tx,
        };
        Ok((session, ends))
    }

    /// Start a new transport generation
    ///
    /// The previous generation's pump is stopped and its outbound channel
    /// closed. Pending optimistic entries are discarded; the confirmed store
    /// is kept.
    ///
    /// The sink is rebound before the overlay is reset. A `write` racing this
    /// call from another thread may land between the two steps: its frame goes
    /// out on the new channel but its optimistic entry is discarded, so the
    /// key shows the confirmed value until the authority echoes the write.
    pub fn reconnect(&self) -> TransportEnds {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::channel(self.config.inbound_buffer);

        self.stop_pump();
        drop(self.sink.rebind(out_tx));
        let discarded = self.map.optimistic_reset();

        let pump = tokio::spawn(pump_inbound(
            self.map.clone(),
            self.config.wire_format,
            in_rx,
        ));
        *self.pump.lock() = Some(pump);
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;

        tracing::info!(generation, discarded, "Sync session reconnected");
        TransportEnds {
            outbound: out_rx,
            inbound: in_tx,
        }
    }

    /// Stop applying inbound frames for the current generation
    pub fn disconnect(&self) {
        self.stop_pump();
        tracing::info!(generation = self.generation(), "Sync session disconnected");
    }

    fn stop_pump(&self) {
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
    }

    /// The shared replica map
    pub fn map(&self) -> &Arc<SyncMap<K, V>> {
        &self.map
    }

    /// Transport generation, starting at zero and bumped by each reconnect
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Session configuration
    pub fn config(&self) -> &SyncMapConfig {
        &self.config
    }
}

impl<K, V> Drop for SyncSession<K, V> {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.get_mut().take() {
            pump.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wirebind_core::{Mutation, MutationToken};

    #[tokio::test]
    async fn pump_applies_frames_and_skips_garbage() {
        let map: Arc<SyncMap<String, i32>> = Arc::new(SyncMap::new(crate::NoOpSink));
        let (tx, rx) = mpsc::channel(4);

        let good = wire::to_json(&Mutation::set(MutationToken(1), "a".to_string(), 1)).unwrap();
        tx.send(good).await.unwrap();
        tx.send(b"not a mutation".to_vec()).await.unwrap();
        drop(tx);

        let applied = pump_inbound(map.clone(), WireFormat::Json, rx).await;

        assert_eq!(applied, 1);
        assert_eq!(map.read(&"a".to_string()).unwrap(), 1);
    }

    #[tokio::test]
    async fn connect_rejects_invalid_config() {
        let config = SyncMapConfig {
            inbound_buffer: 0,
            ..SyncMapConfig::default()
        };
        assert!(SyncSession::<String, i32>::connect(config).is_err());
    }
}
