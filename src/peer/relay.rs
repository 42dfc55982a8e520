//! Relay server for daemons that cannot reach each other directly
//!
//! Every daemon keeps a stream link to the relay. A change signal received
//! from one connection is forwarded to all the others.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::is_peer_message;
use crate::error::Result;
use crate::types::PEER_MESSAGE;

/// Connection ID
pub type ConnectionId = String;

/// Tracks connected daemons and fans signals out between them
pub struct RelayHub {
    /// Carries the id of the connection that sent each signal
    tx: broadcast::Sender<ConnectionId>,
    clients: Arc<RwLock<HashSet<ConnectionId>>>,
}

impl RelayHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            tx,
            clients: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// Forward a signal from `from` to every other connection
    pub fn broadcast(&self, from: &str) {
        // No receivers just means nobody else is connected
        let _ = self.tx.send(from.to_string());
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionId> {
        self.tx.subscribe()
    }

    pub fn register_client(&self, id: ConnectionId) {
        self.clients.write().insert(id);
    }

    pub fn unregister_client(&self, id: &str) {
        self.clients.write().remove(id);
    }
}

impl Default for RelayHub {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for RelayHub {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            clients: self.clients.clone(),
        }
    }
}

/// TCP relay server
pub struct RelayServer {
    hub: RelayHub,
    listener: TcpListener,
}

impl RelayServer {
    /// Bind the relay on `addr`
    pub async fn bind(hub: RelayHub, addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { hub, listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the process ends
    pub async fn run(self) -> Result<()> {
        tracing::info!("Relay listening on {}", self.local_addr()?);

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let hub = self.hub.clone();
                    tokio::spawn(handle_connection(stream, peer, hub));
                }
                Err(e) => tracing::warn!("Accept failed: {}", e),
            }
        }
    }
}

/// Handle one connected daemon
async fn handle_connection(stream: TcpStream, peer: SocketAddr, hub: RelayHub) {
    let connection_id = Uuid::new_v4().to_string();
    hub.register_client(connection_id.clone());
    tracing::info!(
        "Peer connected: {} ({}), {} connected",
        peer,
        connection_id,
        hub.client_count()
    );

    let (read_half, mut write_half) = stream.into_split();
    let mut rx = hub.subscribe();

    // Forward signals from other connections to this one
    let conn_id = connection_id.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(from) if from == conn_id => continue,
                Ok(_) => {
                    if write_half.write_all(PEER_MESSAGE.as_bytes()).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // One signal is as good as many
                    tracing::debug!("Connection {} lagged by {}", conn_id, skipped);
                    if write_half.write_all(PEER_MESSAGE.as_bytes()).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Read signals from this connection
    let conn_id = connection_id.clone();
    let mgr = hub.clone();
    let mut recv_task = tokio::spawn(async move {
        let mut lines = BufReader::new(read_half).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if is_peer_message(line.as_bytes()) {
                tracing::info!("Update from {}, relaying", conn_id);
                mgr.broadcast(&conn_id);
            } else {
                tracing::debug!("Ignoring line from {}: {:?}", conn_id, line);
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {}
        _ = &mut recv_task => {}
    }
    send_task.abort();
    recv_task.abort();

    hub.unregister_client(&connection_id);
    tracing::info!(
        "Peer disconnected: {} ({}), {} connected",
        peer,
        connection_id,
        hub.client_count()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_hub_registry() {
        let hub = RelayHub::new();
        assert_eq!(hub.client_count(), 0);

        hub.register_client("a".to_string());
        assert_eq!(hub.client_count(), 1);

        hub.unregister_client("a");
        assert_eq!(hub.client_count(), 0);
    }

    async fn wait_for_clients(hub: &RelayHub, n: usize) {
        for _ in 0..500 {
            if hub.client_count() == n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} clients, have {}", n, hub.client_count());
    }

    #[tokio::test]
    async fn test_relay_forwards_to_others_only() {
        let hub = RelayHub::new();
        let server = RelayServer::bind(hub.clone(), "127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        let task = tokio::spawn(server.run());

        let mut sender = TcpStream::connect(addr).await.unwrap();
        let mut receiver = TcpStream::connect(addr).await.unwrap();
        wait_for_clients(&hub, 2).await;

        sender.write_all(b"Updated\n").await.unwrap();

        let mut buf = [0u8; 8];
        tokio::time::timeout(Duration::from_secs(5), receiver.read_exact(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf, b"Updated\n");

        let mut echo = [0u8; 1];
        let echoed =
            tokio::time::timeout(Duration::from_millis(200), sender.read(&mut echo)).await;
        assert!(echoed.is_err(), "sender should not receive its own signal");

        task.abort();
    }

    #[tokio::test]
    async fn test_disconnect_unregisters() {
        let hub = RelayHub::new();
        let server = RelayServer::bind(hub.clone(), "127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        let task = tokio::spawn(server.run());

        let client = TcpStream::connect(addr).await.unwrap();
        wait_for_clients(&hub, 1).await;
        drop(client);
        wait_for_clients(&hub, 0).await;

        task.abort();
    }
}
