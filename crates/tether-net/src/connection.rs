//! Live login connections and their writer tasks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use tether_command::SessionId;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;

use crate::codec::FrameEncoder;

/// Atomic generator for session ids, starting at 1.
pub struct IdGenerator {
    next: AtomicU32,
}

impl IdGenerator {
    /// Create a new generator starting at 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
        }
    }

    /// Return the next unique [`SessionId`].
    pub fn next_id(&self) -> SessionId {
        SessionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// A stream upgrade requested by the main thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upgrade {
    /// Compressed frames from now on.
    Compression(u32),
    /// AES/CFB8 with this shared secret from now on.
    Encryption(Vec<u8>),
}

/// Work for a connection's writer task, applied in order.
#[derive(Debug)]
pub enum WriterOp {
    /// Frame and write one packet.
    Packet(Vec<u8>),
    /// Upgrade the outbound stream.
    Upgrade(Upgrade),
}

/// Handles to one connection's tasks.
///
/// Dropping both senders ends the connection: the writer flushes and shuts
/// the socket down, the reader stops without reporting a close.
pub struct Connection {
    ops: mpsc::UnboundedSender<WriterOp>,
    upgrades: mpsc::UnboundedSender<Upgrade>,
    writer: JoinHandle<()>,
}

impl Connection {
    /// Spawn the writer task for `socket`.
    ///
    /// `upgrades` is the sender half of the reader's upgrade queue.
    pub fn spawn(
        id: SessionId,
        socket: OwnedWriteHalf,
        upgrades: mpsc::UnboundedSender<Upgrade>,
    ) -> Self {
        let (ops, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(run_writer(id, socket, rx));
        Self {
            ops,
            upgrades,
            writer,
        }
    }

    /// Queue a packet for the client.
    pub fn send(&self, packet: Vec<u8>) {
        let _ = self.ops.send(WriterOp::Packet(packet));
    }

    /// Apply an upgrade to both directions.
    ///
    /// The reader switches immediately; the writer switches once every
    /// packet queued before the upgrade is on the wire.
    pub fn upgrade(&self, upgrade: Upgrade) {
        let _ = self.upgrades.send(upgrade.clone());
        let _ = self.ops.send(WriterOp::Upgrade(upgrade));
    }

    /// Drop the queues and wait for the writer to flush.
    pub async fn close(self) {
        let Self {
            ops,
            upgrades,
            writer,
        } = self;
        drop(ops);
        drop(upgrades);
        let _ = writer.await;
    }

    /// Stop the writer without flushing.
    pub fn abort(self) {
        self.writer.abort();
    }
}

async fn run_writer(
    id: SessionId,
    mut socket: OwnedWriteHalf,
    mut ops: mpsc::UnboundedReceiver<WriterOp>,
) {
    let mut encoder = FrameEncoder::new();
    while let Some(op) = ops.recv().await {
        let result = match op {
            WriterOp::Packet(packet) => match encoder.encode(&packet) {
                Ok(frame) => socket.write_all(&frame).await.map_err(Into::into),
                Err(e) => Err(e),
            },
            WriterOp::Upgrade(Upgrade::Compression(threshold)) => {
                encoder.set_compression(threshold);
                Ok(())
            }
            WriterOp::Upgrade(Upgrade::Encryption(secret)) => encoder.enable_encryption(&secret),
        };
        if let Err(e) = result {
            tracing::warn!("Writer for session {id} failed: {e}");
            break;
        }
    }
    let _ = socket.flush().await;
    let _ = socket.shutdown().await;
    tracing::trace!("Writer for session {id} finished");
}

/// Thread-safe map of login connections keyed by [`SessionId`].
#[derive(Default)]
pub struct ConnectionMap {
    inner: RwLock<HashMap<SessionId, Connection>>,
}

impl ConnectionMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection.
    pub async fn insert(&self, id: SessionId, connection: Connection) {
        self.inner.write().await.insert(id, connection);
    }

    /// Remove a connection by id.
    pub async fn remove(&self, id: SessionId) -> Option<Connection> {
        self.inner.write().await.remove(&id)
    }

    /// Run `f` against a connection if it is still registered.
    pub async fn with<R>(&self, id: SessionId, f: impl FnOnce(&Connection) -> R) -> Option<R> {
        self.inner.read().await.get(&id).map(f)
    }

    /// Remove every connection.
    pub async fn drain(&self) -> Vec<(SessionId, Connection)> {
        self.inner.write().await.drain().collect()
    }

    /// Return the number of active connections.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Return whether the map is empty.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
