//! Control-plane TCP server.
//!
//! One session task per accepted connection. Sessions are isolated: a
//! misbehaving or dead peer affects only its own entry in the registry,
//! never the accept loop or other sessions.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::protocol::Command;
use crate::server::registry::ClientRegistry;

/// Shared context for the accept loop and its session tasks.
pub(crate) struct ControlPlane {
    /// Pre-serialized header line, written verbatim on each request.
    pub header: Arc<[u8]>,
    pub registry: Arc<ClientRegistry>,
    /// Idle limit per command read. Heartbeats rearm it.
    pub read_timeout: Duration,
    /// UDP port frames are addressed to on the peer's host.
    pub data_port: u16,
}

/// Why a session ended, for the close log line.
#[derive(Debug, PartialEq, Eq)]
enum CloseReason {
    Disconnect,
    Eof,
    TimedOut,
    Superseded,
    Io,
}

/// Accept connections until cancelled, spawning one session task each.
pub(crate) async fn accept_loop(
    listener: TcpListener,
    ctx: Arc<ControlPlane>,
    cancel: CancellationToken,
) {
    let run = async {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    tokio::spawn(session(stream, peer, Arc::clone(&ctx), cancel.child_token()));
                }
                Err(e) => {
                    // Transient accept errors (e.g. per-connection resets)
                    // must not take the listener down
                    warn!(error = %e, "accept failed");
                }
            }
        }
    };
    cancel.run_until_cancelled(run).await;
    debug!("control accept loop finished");
}

/// Run one session to completion: register, serve commands, deregister.
async fn session(
    stream: TcpStream,
    peer: SocketAddr,
    ctx: Arc<ControlPlane>,
    cancel: CancellationToken,
) {
    let data_addr = SocketAddr::new(peer.ip(), ctx.data_port);
    let id = ctx.registry.register(peer.ip(), data_addr, cancel.clone());
    info!(%peer, %data_addr, "client connected");

    let reason = match cancel.run_until_cancelled(drive_session(stream, peer, &ctx)).await {
        Some(reason) => reason,
        // Token cancelled: either superseded by a reconnect from the same
        // host or the producer is shutting down
        None => CloseReason::Superseded,
    };

    // A superseded session's registry entry already belongs to its
    // successor; the generation check makes this remove a no-op then
    let removed = ctx.registry.remove(peer.ip(), id);
    info!(%peer, ?reason, removed, "client session closed");
}

async fn drive_session(mut stream: TcpStream, peer: SocketAddr, ctx: &ControlPlane) -> CloseReason {
    loop {
        let byte = match timeout(ctx.read_timeout, stream.read_u8()).await {
            Err(_) => {
                debug!(%peer, timeout = ?ctx.read_timeout, "session read timed out");
                return CloseReason::TimedOut;
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return CloseReason::Eof;
            }
            Ok(Err(e)) => {
                warn!(%peer, error = %e, "session read failed");
                return CloseReason::Io;
            }
            Ok(Ok(byte)) => byte,
        };

        match Command::from_byte(byte) {
            Command::Heartbeat => {}
            Command::HeaderRequest => {
                if let Err(e) = stream.write_all(&ctx.header).await {
                    warn!(%peer, error = %e, "header write failed");
                    return CloseReason::Io;
                }
                debug!(%peer, "header sent");
            }
            Command::Disconnect => {
                debug!(%peer, byte, "disconnect command");
                return CloseReason::Disconnect;
            }
        }
    }
}
