//! Peer notifications
//!
//! After a push the daemon tells its peers "something changed" over a UDP
//! broadcast and over a TCP link to one configured peer (usually a relay
//! started with `loftus server`). Receiving the same signal on either
//! channel makes the local daemon sync right away.
//!
//! Delivery is best-effort: no acknowledgement, no retry, no ordering.

mod datagram;
mod link;
mod relay;

pub use datagram::{listen_datagrams, send_datagram};
pub use link::{StreamLink, RECONNECT_DELAY};
pub use relay::{RelayHub, RelayServer};

use std::net::SocketAddr;

use async_trait::async_trait;

use crate::error::{LoftusError, Result};
use crate::sync::PushHook;
use crate::types::PEER_MESSAGE;

/// Where a peer signal came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerTrigger {
    Datagram(SocketAddr),
    Stream,
}

/// Is this payload the peer "changed" signal
pub fn is_peer_message(payload: &[u8]) -> bool {
    let expected = PEER_MESSAGE.trim_end().as_bytes();
    let mut payload = payload;
    while let Some((last, rest)) = payload.split_last() {
        if *last == b'\n' || *last == b'\r' {
            payload = rest;
        } else {
            break;
        }
    }
    payload == expected
}

/// Fans the change signal out to peers after a successful push
pub struct PeerNotifier {
    broadcast_target: SocketAddr,
    link: StreamLink,
}

impl PeerNotifier {
    pub fn new(broadcast_target: SocketAddr, link: StreamLink) -> Self {
        Self {
            broadcast_target,
            link,
        }
    }

    /// Send the signal on both channels. Errors are collected, never retried.
    pub async fn announce(&self) -> Result<()> {
        let mut errors = Vec::new();

        if let Err(e) = send_datagram(self.broadcast_target).await {
            errors.push(format!("datagram to {}: {}", self.broadcast_target, e));
        }

        match self.link.send(PEER_MESSAGE.as_bytes()).await {
            Ok(true) => tracing::debug!("Sent update over stream link"),
            Ok(false) => tracing::debug!("Stream link down, skipped"),
            Err(e) => errors.push(format!("stream: {}", e)),
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(LoftusError::Transport(errors.join("; ")))
        }
    }
}

#[async_trait]
impl PushHook for PeerNotifier {
    async fn on_push(&self) -> Result<()> {
        self.announce().await
    }
}
