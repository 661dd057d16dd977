//! Connection entity and related types
//!
//! A connection is one proxied TCP stream carried inside a session. The
//! control plane only records its endpoints, byte counters, and lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    Closed,
}

impl ConnectionStatus {
    /// Create from string representation
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "connected" => Some(Self::Connected),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a connection was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClosedReason {
    #[serde(rename = "unknown")]
    Unknown,
    #[serde(rename = "timed out")]
    TimedOut,
    #[serde(rename = "closed by end-user")]
    ClosedByUser,
    #[serde(rename = "cancelled")]
    Cancelled,
    #[serde(rename = "network error")]
    NetworkError,
    #[serde(rename = "system error")]
    SystemError,
}

impl ClosedReason {
    /// Create from string representation
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace(['_', '-'], " ").as_str() {
            "unknown" => Some(Self::Unknown),
            "timed out" => Some(Self::TimedOut),
            "closed by end user" => Some(Self::ClosedByUser),
            "cancelled" => Some(Self::Cancelled),
            "network error" => Some(Self::NetworkError),
            "system error" => Some(Self::SystemError),
            _ => None,
        }
    }

    /// Convert to the stored string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::TimedOut => "timed out",
            Self::ClosedByUser => "closed by end-user",
            Self::Cancelled => "cancelled",
            Self::NetworkError => "network error",
            Self::SystemError => "system error",
        }
    }
}

impl Default for ClosedReason {
    fn default() -> Self {
        Self::Unknown
    }
}

impl fmt::Display for ClosedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A proxied connection within a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub public_id: String,
    pub session_id: String,
    pub client_tcp_address: String,
    pub client_tcp_port: u16,
    pub endpoint_tcp_address: String,
    pub endpoint_tcp_port: u16,
    pub bytes_up: u64,
    pub bytes_down: u64,
    pub closed_reason: Option<ClosedReason>,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One entry in a connection's append-only status history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub connection_id: String,
    pub status: ConnectionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

/// Parameters for recording a new connection
#[derive(Debug, Clone, Default)]
pub struct ConnectWith {
    pub session_id: String,
    pub client_tcp_address: String,
    pub client_tcp_port: u16,
    pub endpoint_tcp_address: String,
    pub endpoint_tcp_port: u16,
}

impl ConnectWith {
    /// Reason this request is invalid, if it is
    pub(crate) fn validate(&self) -> Option<&'static str> {
        if self.session_id.is_empty() {
            Some("missing session id")
        } else if self.client_tcp_address.is_empty() {
            Some("missing client address")
        } else if self.client_tcp_port == 0 {
            Some("missing client port")
        } else if self.endpoint_tcp_address.is_empty() {
            Some("missing endpoint address")
        } else if self.endpoint_tcp_port == 0 {
            Some("missing endpoint port")
        } else {
            None
        }
    }
}

/// Parameters for closing one connection in a batch
#[derive(Debug, Clone, Default)]
pub struct CloseWith {
    pub connection_id: String,
    pub connection_version: u32,
    pub bytes_up: u64,
    pub bytes_down: u64,
    pub closed_reason: ClosedReason,
}

/// Result of closing one connection: the updated row and its history, current first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseConnectionResp {
    pub connection: Connection,
    pub states: Vec<ConnectionState>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect_with() -> ConnectWith {
        ConnectWith {
            session_id: "s_1234567890".to_string(),
            client_tcp_address: "127.0.0.1".to_string(),
            client_tcp_port: 22,
            endpoint_tcp_address: "127.0.0.1".to_string(),
            endpoint_tcp_port: 2222,
        }
    }

    #[test]
    fn test_connect_with_validate() {
        assert_eq!(connect_with().validate(), None);

        let mut c = connect_with();
        c.client_tcp_port = 0;
        assert_eq!(c.validate(), Some("missing client port"));

        let mut c = connect_with();
        c.endpoint_tcp_address.clear();
        assert_eq!(c.validate(), Some("missing endpoint address"));

        let mut c = connect_with();
        c.session_id.clear();
        assert_eq!(c.validate(), Some("missing session id"));
    }

    #[test]
    fn test_closed_reason_strings() {
        assert_eq!(ClosedReason::NetworkError.as_str(), "network error");
        assert_eq!(
            ClosedReason::from_str("network_error"),
            Some(ClosedReason::NetworkError)
        );
        assert_eq!(ClosedReason::from_str("connection limit"), None);
        assert_eq!(
            ConnectionStatus::from_str("closed"),
            Some(ConnectionStatus::Closed)
        );
    }
}
