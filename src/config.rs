//! Configuration for producers and consumers.
//!
//! Both configs are serde types with full defaults, so a YAML file only
//! needs the fields it overrides. Durations are written as seconds.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::DEFAULT_CAPACITY;
use crate::error::{Result, ScopeError};

/// Default TCP port for the control plane.
pub const DEFAULT_CONTROL_PORT: u16 = 4011;

/// Default UDP port frames are sent to on each client host.
pub const DEFAULT_DATA_PORT: u16 = 4010;

/// Producer-side configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the control listener binds to.
    pub bind_addr: String,
    /// TCP port for the control listener. 0 picks an ephemeral port.
    pub control_port: u16,
    /// UDP port frames are addressed to on each client's host.
    pub data_port: u16,
    /// Idle time after which a session is closed. Heartbeats rearm it.
    #[serde(with = "duration_secs")]
    pub read_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            control_port: DEFAULT_CONTROL_PORT,
            data_port: DEFAULT_DATA_PORT,
            read_timeout: Duration::from_secs(10),
        }
    }
}

impl ServerConfig {
    /// Parse a YAML document into a config. Unset fields take defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)
            .map_err(|e| ScopeError::Config { reason: e.to_string() })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.read_timeout.is_zero() {
            return Err(ScopeError::Config { reason: "read_timeout must be non-zero".into() });
        }
        Ok(())
    }
}

/// Consumer-side configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Producer host to connect to.
    pub host: String,
    /// Producer's control TCP port.
    pub control_port: u16,
    /// Local UDP port to receive frames on.
    pub data_port: u16,
    /// Interval between heartbeat bytes on the control socket. Must stay
    /// below the producer's read timeout.
    #[serde(with = "duration_secs")]
    pub heartbeat_interval: Duration,
    /// How long to wait for the header line after requesting it.
    #[serde(with = "duration_secs")]
    pub header_timeout: Duration,
    /// Per-channel history capacity in samples.
    pub buffer_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            control_port: DEFAULT_CONTROL_PORT,
            data_port: DEFAULT_DATA_PORT,
            heartbeat_interval: Duration::from_secs(2),
            header_timeout: Duration::from_secs(5),
            buffer_capacity: DEFAULT_CAPACITY,
        }
    }
}

impl ClientConfig {
    /// Parse a YAML document into a config. Unset fields take defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)
            .map_err(|e| ScopeError::Config { reason: e.to_string() })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity == 0 {
            return Err(ScopeError::Config { reason: "buffer_capacity must be non-zero".into() });
        }
        if self.heartbeat_interval.is_zero() {
            return Err(ScopeError::Config {
                reason: "heartbeat_interval must be non-zero".into(),
            });
        }
        Ok(())
    }

    /// Control endpoint as `host:port`.
    pub fn control_addr(&self) -> String {
        format!("{}:{}", self.host, self.control_port)
    }
}

/// Serde helper: durations as fractional seconds.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        // Rejects negative, non-finite, and over-range values
        Duration::try_from_secs_f64(secs)
            .map_err(|_| serde::de::Error::custom(format!("invalid duration: {secs}")))
    }
}
