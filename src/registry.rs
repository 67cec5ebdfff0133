//! Live device registry and command dispatcher.
//!
//! The registry maps a normalized device identifier to the connection that
//! most recently produced a valid frame for it (last-writer-wins: a device
//! may reconnect and replace its own entry). Removal is identity-checked so
//! a stale disconnect handler can never evict a newer reconnection.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tracing::{info, warn};

// ---

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to one accepted device connection.
///
/// Cloned into the registry; the connection task keeps the read half. The
/// numeric connection id distinguishes two connections from the same device
/// so registry removal can be identity-checked.
#[derive(Clone)]
pub struct ConnectionHandle {
    conn_id: u64,
    peer: SocketAddr,
    writer: Arc<tokio::sync::Mutex<OwnedWriteHalf>>,
}

impl ConnectionHandle {
    pub fn new(peer: SocketAddr, writer: OwnedWriteHalf) -> Self {
        ConnectionHandle {
            conn_id: NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed),
            peer,
            writer: Arc::new(tokio::sync::Mutex::new(writer)),
        }
    }

    pub fn conn_id(&self) -> u64 {
        self.conn_id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Write raw bytes to the device.
    ///
    /// Returns `Ok(true)` when the whole payload entered the socket buffer
    /// immediately, `Ok(false)` when the send buffer was full and the write
    /// was queued (backpressure; the data is delayed, not lost).
    pub async fn write(&self, bytes: &[u8]) -> io::Result<bool> {
        // ---
        let mut writer = self.writer.lock().await;
        match writer.try_write(bytes) {
            Ok(n) if n == bytes.len() => Ok(true),
            Ok(n) => {
                writer.write_all(&bytes[n..]).await?;
                Ok(false)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                writer.write_all(bytes).await?;
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

// ---

/// Concurrent map from device identifier to its live connection handle.
///
/// Callers must pass identifiers already normalized to lower case; the
/// decode path produces them that way.
#[derive(Default)]
pub struct DeviceRegistry {
    inner: Mutex<HashMap<String, ConnectionHandle>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert, last-writer-wins.
    pub fn register(&self, id: &str, handle: ConnectionHandle) {
        self.inner
            .lock()
            .unwrap()
            .insert(id.to_string(), handle);
    }

    pub fn lookup(&self, id: &str) -> Option<ConnectionHandle> {
        self.inner.lock().unwrap().get(id).cloned()
    }

    /// Remove the mapping only if it still points at connection `conn_id`.
    ///
    /// Returns whether an entry was removed. A delayed close handler for a
    /// replaced connection is a no-op here.
    pub fn remove(&self, id: &str, conn_id: u64) -> bool {
        // ---
        let mut map = self.inner.lock().unwrap();
        match map.get(id) {
            Some(current) if current.conn_id == conn_id => {
                map.remove(id);
                info!("device {id} disconnected");
                true
            }
            _ => false,
        }
    }

    pub fn connected_ids(&self) -> Vec<String> {
        self.inner.lock().unwrap().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---

/// Outcome of an outbound command dispatch.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Command accepted by the transport (possibly queued under
    /// backpressure, never lost).
    Sent,
    /// No live connection registered for the identifier.
    NotConnected,
    /// The write failed; the stale registry entry has been purged.
    WriteError(io::Error),
}

impl DispatchOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, DispatchOutcome::Sent)
    }
}

/// Looks up a device's connection and writes an outbound command to it.
#[derive(Clone)]
pub struct CommandDispatcher {
    registry: Arc<DeviceRegistry>,
}

impl CommandDispatcher {
    pub fn new(registry: Arc<DeviceRegistry>) -> Self {
        CommandDispatcher { registry }
    }

    /// Send raw command bytes to the device registered under `id`.
    ///
    /// A full socket buffer is backpressure, not an error: the write is
    /// queued by the transport, logged, and still reported as [`Sent`]
    /// since the command is delayed rather than lost.
    ///
    /// [`Sent`]: DispatchOutcome::Sent
    pub async fn send(&self, id: &str, command: &[u8]) -> DispatchOutcome {
        // ---
        let id = id.to_ascii_lowercase();
        let Some(handle) = self.registry.lookup(&id) else {
            return DispatchOutcome::NotConnected;
        };

        match handle.write(command).await {
            Ok(true) => DispatchOutcome::Sent,
            Ok(false) => {
                warn!("backpressure sending to {id}: socket buffer full, write queued");
                DispatchOutcome::Sent
            }
            Err(err) => {
                warn!("failed to send command to {id}: {err}");
                self.registry.remove(&id, handle.conn_id());
                DispatchOutcome::WriteError(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use tokio::net::{TcpListener, TcpStream};

    async fn socket_pair() -> (TcpStream, TcpStream) {
        // ---
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (client, server)
    }

    async fn handle_from(stream: TcpStream) -> ConnectionHandle {
        let peer = stream.peer_addr().unwrap();
        let (_read, write) = stream.into_split();
        ConnectionHandle::new(peer, write)
    }

    #[tokio::test]
    async fn lookup_after_registration() {
        // ---
        let registry = DeviceRegistry::new();
        let (client, _server) = socket_pair().await;
        let handle = handle_from(client).await;

        registry.register("aa:bb:cc:dd:ee:ff", handle.clone());
        let found = registry.lookup("aa:bb:cc:dd:ee:ff").unwrap();
        assert_eq!(found.conn_id(), handle.conn_id());
        assert!(registry.lookup("aa:bb:cc:dd:ee:00").is_none());
    }

    #[tokio::test]
    async fn removal_is_identity_checked() {
        // ---
        let registry = DeviceRegistry::new();
        let (conn_a, _srv_a) = socket_pair().await;
        let (conn_b, _srv_b) = socket_pair().await;
        let handle_a = handle_from(conn_a).await;
        let handle_b = handle_from(conn_b).await;

        // A registers, A closes: entry is gone
        registry.register("aa:bb:cc:dd:ee:ff", handle_a.clone());
        assert!(registry.remove("aa:bb:cc:dd:ee:ff", handle_a.conn_id()));
        assert!(registry.lookup("aa:bb:cc:dd:ee:ff").is_none());

        // B replaces the identifier, then A's delayed close handler fires:
        // the mapping must remain B's
        registry.register("aa:bb:cc:dd:ee:ff", handle_b.clone());
        assert!(!registry.remove("aa:bb:cc:dd:ee:ff", handle_a.conn_id()));
        let found = registry.lookup("aa:bb:cc:dd:ee:ff").unwrap();
        assert_eq!(found.conn_id(), handle_b.conn_id());
    }

    #[tokio::test]
    async fn reconnection_replaces_the_entry() {
        // ---
        let registry = DeviceRegistry::new();
        let (conn_a, _srv_a) = socket_pair().await;
        let (conn_b, _srv_b) = socket_pair().await;
        let handle_a = handle_from(conn_a).await;
        let handle_b = handle_from(conn_b).await;

        registry.register("aa:bb:cc:dd:ee:ff", handle_a);
        registry.register("aa:bb:cc:dd:ee:ff", handle_b.clone());
        assert_eq!(registry.len(), 1);
        let found = registry.lookup("aa:bb:cc:dd:ee:ff").unwrap();
        assert_eq!(found.conn_id(), handle_b.conn_id());
    }

    #[tokio::test]
    async fn dispatch_to_unknown_device_is_not_connected() {
        // ---
        let registry = Arc::new(DeviceRegistry::new());
        let dispatcher = CommandDispatcher::new(registry);
        let outcome = dispatcher.send("aa:bb:cc:dd:ee:ff", b"FAN1ON").await;
        assert!(matches!(outcome, DispatchOutcome::NotConnected));
    }

    #[tokio::test]
    async fn dispatch_writes_to_the_device_socket() {
        // ---
        use tokio::io::AsyncReadExt;

        let registry = Arc::new(DeviceRegistry::new());
        let dispatcher = CommandDispatcher::new(registry.clone());
        let (client, mut server) = socket_pair().await;
        let handle = handle_from(client).await;

        // Dispatcher normalizes the identifier before lookup
        registry.register("aa:bb:cc:dd:ee:ff", handle);
        let outcome = dispatcher.send("AA:BB:CC:DD:EE:FF", b"LOCKOPEN").await;
        assert!(outcome.is_sent());

        let mut buf = [0u8; 8];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"LOCKOPEN");
    }
}
