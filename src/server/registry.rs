//! Registry of connected consumers, the sole owner of session lifecycle.
//!
//! Keyed by peer IP: a host runs at most one consumer, so a reconnect from
//! a registered IP supersedes the old session (last writer wins). Entries
//! carry a generation id so a superseded session's cleanup cannot evict
//! the session that replaced it.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio_util::sync::CancellationToken;
use tracing::debug;

struct SessionEntry {
    id: u64,
    data_addr: SocketAddr,
    cancel: CancellationToken,
}

/// Live consumer sessions, shared between the control plane (which
/// registers and removes) and the transmitter (which snapshots).
#[derive(Default)]
pub struct ClientRegistry {
    next_id: AtomicU64,
    entries: Mutex<HashMap<IpAddr, SessionEntry>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session for `ip`, superseding any existing one.
    ///
    /// The superseded session's token is cancelled before the new entry is
    /// visible; frames are never sent twice to one host. Returns the new
    /// session's generation id.
    pub fn register(&self, ip: IpAddr, data_addr: SocketAddr, cancel: CancellationToken) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(old) = entries.insert(ip, SessionEntry { id, data_addr, cancel }) {
            debug!(%ip, old_id = old.id, new_id = id, "superseding session");
            old.cancel.cancel();
        }
        id
    }

    /// Remove the session for `ip`, but only if it still belongs to the
    /// given generation. Returns whether an entry was removed.
    pub fn remove(&self, ip: IpAddr, id: u64) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(&ip) {
            Some(entry) if entry.id == id => {
                entries.remove(&ip);
                true
            }
            _ => false,
        }
    }

    /// Data addresses of every live session, for one broadcast pass.
    pub fn snapshot(&self) -> Vec<SocketAddr> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.values().map(|e| e.data_addr).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(ip: &str, port: u16) -> SocketAddr {
        format!("{ip}:{port}").parse().unwrap()
    }

    #[test]
    fn register_and_snapshot() {
        let registry = ClientRegistry::new();
        registry.register("10.0.0.1".parse().unwrap(), addr("10.0.0.1", 4010), CancellationToken::new());
        registry.register("10.0.0.2".parse().unwrap(), addr("10.0.0.2", 4010), CancellationToken::new());

        assert_eq!(registry.len(), 2);
        let mut snapshot = registry.snapshot();
        snapshot.sort();
        assert_eq!(snapshot, vec![addr("10.0.0.1", 4010), addr("10.0.0.2", 4010)]);
    }

    #[test]
    fn reconnect_supersedes_and_cancels_old() {
        let registry = ClientRegistry::new();
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        let old_token = CancellationToken::new();
        let old_id = registry.register(ip, addr("10.0.0.1", 4010), old_token.clone());

        let new_token = CancellationToken::new();
        let new_id = registry.register(ip, addr("10.0.0.1", 5010), new_token.clone());

        assert_ne!(old_id, new_id);
        assert!(old_token.is_cancelled());
        assert!(!new_token.is_cancelled());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.snapshot(), vec![addr("10.0.0.1", 5010)]);
    }

    #[test]
    fn stale_remove_cannot_evict_successor() {
        let registry = ClientRegistry::new();
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        let old_id = registry.register(ip, addr("10.0.0.1", 4010), CancellationToken::new());
        let new_id = registry.register(ip, addr("10.0.0.1", 4010), CancellationToken::new());

        // The superseded session cleaning up must not remove the new entry
        assert!(!registry.remove(ip, old_id));
        assert_eq!(registry.len(), 1);

        assert!(registry.remove(ip, new_id));
        assert!(registry.is_empty());
    }
}
