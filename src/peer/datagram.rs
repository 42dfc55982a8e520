//! UDP broadcast of the change signal

use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use super::{is_peer_message, PeerTrigger};
use crate::error::{LoftusError, Result};
use crate::types::PEER_MESSAGE;

/// Send one change signal to `target` (normally the broadcast address)
pub async fn send_datagram(target: SocketAddr) -> Result<()> {
    let bind: SocketAddr = if target.is_ipv4() {
        SocketAddr::from(([0, 0, 0, 0], 0))
    } else {
        SocketAddr::from(([0u16; 8], 0))
    };
    let socket = UdpSocket::bind(bind).await?;
    socket.set_broadcast(true)?;
    socket.send_to(PEER_MESSAGE.as_bytes(), target).await?;
    tracing::debug!("Sent update datagram to {}", target);
    Ok(())
}

/// Forward every change signal received on `socket` into `triggers`.
///
/// Runs until the trigger channel closes. Receive errors are logged and
/// skipped.
pub async fn listen_datagrams(socket: UdpSocket, triggers: mpsc::Sender<PeerTrigger>) -> Result<()> {
    if let Ok(addr) = socket.local_addr() {
        tracing::info!("Listening for update datagrams on {}", addr);
    }

    let mut buf = [0u8; 512];
    loop {
        let (n, from) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                tracing::warn!("Datagram receive error: {}", e);
                continue;
            }
        };

        if !is_peer_message(&buf[..n]) {
            tracing::debug!("Ignoring {} byte datagram from {}", n, from);
            continue;
        }

        tracing::info!("Remote update notification from {}", from);
        triggers
            .send(PeerTrigger::Datagram(from))
            .await
            .map_err(|_| LoftusError::Channel("peer trigger".to_string()))?;
    }
}
