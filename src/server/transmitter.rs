//! Best-effort UDP data plane.
//!
//! One unconnected socket serves every consumer; each tick the encoded
//! frame is sent to every registered data address. Sends are
//! fire-and-forget: a failure is logged with the peer and dropped, it is
//! not an error and does not affect other peers.

use std::sync::Arc;

use tokio::net::UdpSocket;
use tracing::{trace, warn};

use crate::error::{Result, ScopeError};
use crate::server::registry::ClientRegistry;

pub(crate) struct Transmitter {
    socket: UdpSocket,
    registry: Arc<ClientRegistry>,
}

impl Transmitter {
    /// Bind the transmit socket on an ephemeral port.
    pub async fn bind(registry: Arc<ClientRegistry>) -> Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", 0)).await.map_err(|e| {
            ScopeError::connection_failed_with_source("binding transmit socket", Box::new(e))
        })?;
        Ok(Self { socket, registry })
    }

    /// Send one frame to every registered consumer.
    pub async fn broadcast(&self, frame: &[u8]) {
        for addr in self.registry.snapshot() {
            match self.socket.send_to(frame, addr).await {
                Ok(sent) => trace!(%addr, sent, "frame sent"),
                Err(e) => warn!(%addr, error = %e, "frame send failed"),
            }
        }
    }
}
