//! Error types for scope streaming.
//!
//! The taxonomy separates structural protocol errors (malformed headers,
//! undersized buffers, registration mistakes) from transport errors
//! (session I/O, connect failures, timeouts). Structural errors are never
//! retried and surface synchronously to the caller; transport errors are
//! contained within the affected session or connection attempt.
//!
//! Data-plane send failures are deliberately absent: delivery is
//! best-effort, so a failed send is logged and dropped rather than raised.

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

use crate::types::ChannelKind;

/// Result type alias for scope operations.
pub type Result<T, E = ScopeError> = std::result::Result<T, E>;

/// Main error type for scope streaming and ingestion.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ScopeError {
    #[error("malformed header segment '{segment}': {reason}")]
    MalformedHeader { segment: String, reason: String },

    #[error("frame buffer too small: need {needed} bytes, got {got}")]
    BufferTooSmall { needed: usize, got: usize },

    #[error("channel '{name}' is already registered")]
    DuplicateChannel { name: String },

    #[error("channel '{channel}' is {expected:?}, got a {got:?} value")]
    KindMismatch { channel: String, expected: ChannelKind, got: ChannelKind },

    #[error("no channel registered at index {index}")]
    UnknownChannel { index: usize },

    #[error("session I/O with {peer}")]
    Session {
        peer: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("connection failed: {reason}")]
    Connection {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("invalid configuration: {reason}")]
    Config { reason: String },
}

impl ScopeError {
    /// Returns whether this error is potentially recoverable through retry.
    ///
    /// Transport failures can succeed on reconnect; structural errors
    /// (bad header, undersized buffer, registration mistakes) cannot.
    pub fn is_retryable(&self) -> bool {
        match self {
            ScopeError::Session { .. } => true,
            ScopeError::Connection { .. } => true,
            ScopeError::Timeout { .. } => true,
            ScopeError::MalformedHeader { .. } => false,
            ScopeError::BufferTooSmall { .. } => false,
            ScopeError::DuplicateChannel { .. } => false,
            ScopeError::KindMismatch { .. } => false,
            ScopeError::UnknownChannel { .. } => false,
            ScopeError::Config { .. } => false,
        }
    }

    /// Helper constructor for malformed header segments.
    pub fn malformed_header(segment: impl Into<String>, reason: impl Into<String>) -> Self {
        ScopeError::MalformedHeader { segment: segment.into(), reason: reason.into() }
    }

    /// Helper constructor for connection errors.
    pub fn connection_failed(reason: impl Into<String>) -> Self {
        ScopeError::Connection { reason: reason.into(), source: None }
    }

    /// Helper constructor for connection errors with source.
    pub fn connection_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        ScopeError::Connection { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for session I/O errors with peer context.
    pub fn session(peer: SocketAddr, source: std::io::Error) -> Self {
        ScopeError::Session { peer, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_traits_validation() {
        // Compile-time check: ScopeError must be Send + Sync + 'static
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<ScopeError>();

        let error = ScopeError::connection_failed("test");
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn retryability_classification() {
        assert!(ScopeError::connection_failed("down").is_retryable());
        assert!(
            ScopeError::Timeout { duration: Duration::from_secs(10) }.is_retryable()
        );
        assert!(
            ScopeError::session(
                "127.0.0.1:4011".parse().unwrap(),
                std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"),
            )
            .is_retryable()
        );

        assert!(!ScopeError::malformed_header("x", "missing kind").is_retryable());
        assert!(!ScopeError::BufferTooSmall { needed: 16, got: 8 }.is_retryable());
        assert!(!ScopeError::DuplicateChannel { name: "rpm".into() }.is_retryable());
    }

    #[test]
    fn error_messages_contain_context() {
        let err = ScopeError::malformed_header("rpm", "missing kind index");
        assert!(err.to_string().contains("rpm"));
        assert!(err.to_string().contains("missing kind index"));

        let err = ScopeError::BufferTooSmall { needed: 33, got: 20 };
        assert!(err.to_string().contains("33"));
        assert!(err.to_string().contains("20"));
    }

    #[test]
    fn session_error_chains_source() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "read timed out");
        let err = ScopeError::session("10.0.0.2:4011".parse().unwrap(), io);
        let source = std::error::Error::source(&err).expect("source should be chained");
        assert!(source.to_string().contains("read timed out"));
    }
}
