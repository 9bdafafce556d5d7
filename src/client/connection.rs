//! Consumer-side connection manager.
//!
//! Owns the control-socket lifecycle (header negotiation, heartbeats) and
//! the UDP ingest loop. Rendering code never touches sockets; it holds the
//! [`ScopeBuffers`] handle and reads under the draw lock.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{MissedTickBehavior, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::client::engine::{ScopeBuffers, ScopeEngine};
use crate::config::ClientConfig;
use crate::error::{Result, ScopeError};
use crate::protocol::{Command, Protocol};

/// A live consumer connection to a scope producer.
///
/// Created by [`ScopeClient::connect`]. Two background tasks run for the
/// connection's lifetime: a heartbeat writer on the control socket and the
/// UDP ingest loop. Dropping the client cancels both.
pub struct ScopeClient {
    buffers: Arc<ScopeBuffers>,
    control: Arc<AsyncMutex<OwnedWriteHalf>>,
    peer: SocketAddr,
    data_addr: SocketAddr,
    cancel: CancellationToken,
}

impl ScopeClient {
    /// Connect to a producer and start ingesting.
    ///
    /// Dials the control port, requests the header line, mirrors the
    /// protocol into a fresh ingestion engine, binds the local UDP data
    /// socket, then spawns the heartbeat and ingest tasks.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let control_addr = config.control_addr();

        let stream = TcpStream::connect(&control_addr).await.map_err(|e| {
            ScopeError::connection_failed_with_source(
                format!("control connect to {control_addr}"),
                Box::new(e),
            )
        })?;
        let peer = stream.peer_addr().map_err(|e| {
            ScopeError::connection_failed_with_source("resolving peer address", Box::new(e))
        })?;
        let (read_half, mut write_half) = stream.into_split();

        write_half
            .write_all(&[Command::HeaderRequest.as_byte()])
            .await
            .map_err(|e| ScopeError::session(peer, e))?;

        let mut reader = BufReader::new(read_half);
        let mut line = String::new();
        let read = timeout(config.header_timeout, reader.read_line(&mut line))
            .await
            .map_err(|_| ScopeError::Timeout { duration: config.header_timeout })?
            .map_err(|e| ScopeError::session(peer, e))?;
        if read == 0 {
            return Err(ScopeError::connection_failed("control socket closed before header"));
        }

        let protocol = Protocol::deserialize_header(&line)?;
        info!(
            peer = %peer,
            channels = protocol.channels().len(),
            frame_size = protocol.frame_size(),
            "negotiated scope protocol"
        );

        let mut engine = ScopeEngine::new(config.buffer_capacity);
        engine.accept_protocol(protocol);
        let buffers = engine.buffers();

        let socket =
            UdpSocket::bind(("0.0.0.0", config.data_port)).await.map_err(|e| {
                ScopeError::connection_failed_with_source(
                    format!("binding data socket on port {}", config.data_port),
                    Box::new(e),
                )
            })?;
        let data_addr = socket.local_addr().map_err(|e| {
            ScopeError::connection_failed_with_source("resolving data socket address", Box::new(e))
        })?;

        let control = Arc::new(AsyncMutex::new(write_half));
        let cancel = CancellationToken::new();

        tokio::spawn(heartbeat_loop(
            Arc::clone(&control),
            config.heartbeat_interval,
            peer,
            cancel.clone(),
        ));
        tokio::spawn(ingest_loop(socket, engine, cancel.clone()));

        Ok(Self { buffers, control, peer, data_addr, cancel })
    }

    /// Shared buffers for the render side.
    pub fn buffers(&self) -> Arc<ScopeBuffers> {
        Arc::clone(&self.buffers)
    }

    /// Address of the producer's control endpoint.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Local address of the UDP data socket.
    pub fn data_addr(&self) -> SocketAddr {
        self.data_addr
    }

    /// Tell the producer to drop this session and stop the background
    /// tasks. Dropping the client without calling this just stops
    /// heartbeating and lets the producer's read timeout evict us.
    pub async fn disconnect(self) {
        let mut control = self.control.lock().await;
        if let Err(e) = control.write_all(&[Command::Disconnect.as_byte()]).await {
            debug!(peer = %self.peer, error = %e, "disconnect write failed");
        }
    }
}

impl Drop for ScopeClient {
    fn drop(&mut self) {
        debug!(peer = %self.peer, "dropping scope client");
        self.cancel.cancel();
    }
}

async fn heartbeat_loop(
    control: Arc<AsyncMutex<OwnedWriteHalf>>,
    interval: std::time::Duration,
    peer: SocketAddr,
    cancel: CancellationToken,
) {
    let run = async {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let mut control = control.lock().await;
            if let Err(e) = control.write_all(&[Command::Heartbeat.as_byte()]).await {
                warn!(peer = %peer, error = %e, "heartbeat write failed, stopping");
                break;
            }
            trace!(peer = %peer, "heartbeat sent");
        }
    };
    cancel.run_until_cancelled(run).await;
    debug!(peer = %peer, "heartbeat task finished");
}

async fn ingest_loop(socket: UdpSocket, mut engine: ScopeEngine, cancel: CancellationToken) {
    let run = async {
        loop {
            match socket.recv_from(engine.scratch_mut()).await {
                Ok((len, from)) => match engine.accept_scratch(len) {
                    Ok(timestamp) => trace!(from = %from, timestamp, "frame ingested"),
                    // Truncated or short datagram, drop it
                    Err(e) => warn!(from = %from, len, error = %e, "dropping datagram"),
                },
                Err(e) => {
                    warn!(error = %e, "data socket receive failed, stopping ingest");
                    break;
                }
            }
        }
    };
    cancel.run_until_cancelled(run).await;
    debug!("ingest task finished");
}
