//! Endpoint identity and records.
//!
//! An endpoint is identified by its host and transport kind. The port is
//! deliberately not part of the identity: discovery may hand out the same
//! host on a different port, and the registry must treat that as the same
//! endpoint (possibly migrating it) rather than as a new one.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Transport used to reach an endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Plain TCP.
    #[default]
    Tcp,
    /// WebSocket over TLS, the secure transport.
    WebSocket,
}

impl Transport {
    pub fn is_secure(self) -> bool {
        matches!(self, Self::WebSocket)
    }

    pub fn from_secure(secure: bool) -> Self {
        if secure {
            Self::WebSocket
        } else {
            Self::Tcp
        }
    }

    /// Short label used in log lines and the status API.
    pub fn label(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::WebSocket => "ws",
        }
    }
}

/// Dedup and lookup key for the registry: host plus transport kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointIdentity {
    pub host: String,
    pub secure: bool,
}

impl fmt::Display for EndpointIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.secure { "ws" } else { "tcp" };
        write!(f, "{}@{}", scheme, self.host)
    }
}

/// A candidate endpoint as seen by discovery or the persistence store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointRecord {
    pub host: String,
    pub port: u16,
    /// Locality (datacenter / cell) label reported by discovery. May be empty.
    pub locality: String,
    pub transport: Transport,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EndpointParseError {
    #[error("missing port in address {0:?}")]
    MissingPort(String),
    #[error("invalid port in address {0:?}")]
    InvalidPort(String),
    #[error("empty host in address {0:?}")]
    EmptyHost(String),
}

impl EndpointRecord {
    pub fn new(host: impl Into<String>, port: u16, locality: impl Into<String>, transport: Transport) -> Self {
        Self {
            host: host.into(),
            port,
            locality: locality.into(),
            transport,
        }
    }

    /// Parse a `host:port` address (IPv6 hosts in brackets).
    pub fn parse(
        address: &str,
        locality: impl Into<String>,
        transport: Transport,
    ) -> Result<Self, EndpointParseError> {
        let (host, port) = address
            .rsplit_once(':')
            .ok_or_else(|| EndpointParseError::MissingPort(address.to_string()))?;

        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(EndpointParseError::EmptyHost(address.to_string()));
        }

        let port: u16 = port
            .parse()
            .map_err(|_| EndpointParseError::InvalidPort(address.to_string()))?;

        Ok(Self::new(host, port, locality, transport))
    }

    pub fn identity(&self) -> EndpointIdentity {
        EndpointIdentity {
            host: self.host.clone(),
            secure: self.transport.is_secure(),
        }
    }

    /// `host:port`, bracketing IPv6 literals.
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for EndpointRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address())
    }
}
