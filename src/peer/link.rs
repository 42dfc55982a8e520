//! TCP link to the configured peer or relay

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};

use super::{is_peer_message, PeerTrigger};
use crate::error::{LoftusError, Result};

/// Delay between reconnection attempts
pub const RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// Shared handle to the write side of the peer connection.
///
/// `run` owns the connection; clones of the link use it to send while it
/// is up.
#[derive(Clone, Default)]
pub struct StreamLink {
    writer: Arc<Mutex<Option<OwnedWriteHalf>>>,
}

impl StreamLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_connected(&self) -> bool {
        self.writer.lock().await.is_some()
    }

    /// Write `payload` if connected. Returns false when there is no connection.
    pub async fn send(&self, payload: &[u8]) -> Result<bool> {
        let mut writer = self.writer.lock().await;
        let Some(stream) = writer.as_mut() else {
            return Ok(false);
        };

        if let Err(e) = stream.write_all(payload).await {
            *writer = None;
            return Err(LoftusError::Transport(format!("stream write failed: {}", e)));
        }
        Ok(true)
    }

    /// Keep a connection to `addr`, forwarding received signals as triggers.
    ///
    /// Reconnects after `retry` when the connection fails or closes. Returns
    /// when the trigger channel closes.
    pub async fn run(
        self,
        addr: String,
        triggers: mpsc::Sender<PeerTrigger>,
        retry: Duration,
    ) -> Result<()> {
        loop {
            match TcpStream::connect(&addr).await {
                Ok(stream) => {
                    tracing::info!("Connected to peer {}", addr);
                    let (read_half, write_half) = stream.into_split();
                    *self.writer.lock().await = Some(write_half);

                    let result = Self::read_signals(read_half, &triggers).await;
                    *self.writer.lock().await = None;

                    match result {
                        Ok(()) => tracing::info!("Peer {} closed the connection", addr),
                        Err(LoftusError::Channel(e)) => return Err(LoftusError::Channel(e)),
                        Err(e) => tracing::warn!("Peer {} connection error: {}", addr, e),
                    }
                }
                Err(e) => tracing::debug!("Could not connect to peer {}: {}", addr, e),
            }

            if triggers.is_closed() {
                return Err(LoftusError::Channel("peer trigger".to_string()));
            }
            tokio::time::sleep(retry).await;
        }
    }

    async fn read_signals(
        read_half: tokio::net::tcp::OwnedReadHalf,
        triggers: &mpsc::Sender<PeerTrigger>,
    ) -> Result<()> {
        let mut lines = BufReader::new(read_half).lines();
        while let Some(line) = lines.next_line().await? {
            if !is_peer_message(line.as_bytes()) {
                tracing::debug!("Ignoring stream line {:?}", line);
                continue;
            }
            tracing::info!("Remote update notification over stream");
            triggers
                .send(PeerTrigger::Stream)
                .await
                .map_err(|_| LoftusError::Channel("peer trigger".to_string()))?;
        }
        Ok(())
    }
}
