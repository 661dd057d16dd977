//! Session entity and related types
//!
//! Defines the core Session type, its lifecycle statuses, and the reasons a
//! session can end with.

use crate::domain::worker::WorkerType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Session status indicating where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created, waiting for a worker to claim it
    Pending,
    /// Claimed by a worker, connections may be proxied
    Active,
    /// Cancel requested, connections are being wound down
    Cancelling,
    /// Ended; no further transitions
    Terminated,
}

impl SessionStatus {
    /// Create from string representation
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "active" => Some(Self::Active),
            "cancelling" => Some(Self::Cancelling),
            "terminated" => Some(Self::Terminated),
            _ => None,
        }
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Cancelling => "cancelling",
            Self::Terminated => "terminated",
        }
    }

    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Active)
                | (Self::Pending, Self::Cancelling)
                | (Self::Pending, Self::Terminated)
                | (Self::Active, Self::Cancelling)
                | (Self::Active, Self::Terminated)
                | (Self::Cancelling, Self::Terminated)
        )
    }

    /// Check if the session has reached its terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a session was terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
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
    #[serde(rename = "connection limit")]
    ConnectionLimit,
}

impl TerminationReason {
    /// Create from string representation
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace(['_', '-'], " ").as_str() {
            "unknown" => Some(Self::Unknown),
            "timed out" => Some(Self::TimedOut),
            "closed by end user" => Some(Self::ClosedByUser),
            "cancelled" => Some(Self::Cancelled),
            "network error" => Some(Self::NetworkError),
            "system error" => Some(Self::SystemError),
            "connection limit" => Some(Self::ConnectionLimit),
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
            Self::ConnectionLimit => "connection limit",
        }
    }
}

impl Default for TerminationReason {
    fn default() -> Self {
        Self::Unknown
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The identity and target a session grants access for
///
/// Every field is required; the ids come from the identity and target
/// catalogs and are not interpreted here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposedOf {
    pub user_id: String,
    pub host_id: String,
    pub target_id: String,
    pub host_set_id: String,
    pub auth_token_id: String,
    pub scope_id: String,
}

impl ComposedOf {
    /// Name of the first empty required field, if any
    pub(crate) fn missing_field(&self) -> Option<&'static str> {
        [
            ("user id", &self.user_id),
            ("host id", &self.host_id),
            ("target id", &self.target_id),
            ("host set id", &self.host_set_id),
            ("auth token id", &self.auth_token_id),
            ("scope id", &self.scope_id),
        ]
        .into_iter()
        .find(|(_, value)| value.is_empty())
        .map(|(name, _)| name)
    }
}

/// A granted, time-bounded permission for a user to reach a target host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Public identifier, assigned at creation
    pub public_id: String,

    pub scope_id: String,
    pub user_id: String,
    pub target_id: String,
    pub host_id: String,
    pub host_set_id: String,
    pub auth_token_id: String,

    /// Address the worker proxies to
    pub endpoint: String,

    /// Optimistic concurrency counter; 1 after creation
    pub version: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Set when the session is terminated
    pub termination_reason: Option<TerminationReason>,

    /// Trust-on-first-use token presented by the worker at activation
    #[serde(skip)]
    pub tofu_token: Option<Vec<u8>>,

    /// Worker the session was activated on
    pub worker_id: Option<String>,
    pub worker_type: Option<WorkerType>,

    /// Kms key version the signing key was derived under
    pub key_id: String,

    /// Ed25519 public half of the session signing key
    #[serde(with = "hex_bytes")]
    pub public_key: Vec<u8>,
}

impl Session {
    /// Build an unsaved session; the repository assigns the id and keys
    pub fn new(composed_of: ComposedOf, endpoint: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            public_id: String::new(),
            scope_id: composed_of.scope_id,
            user_id: composed_of.user_id,
            target_id: composed_of.target_id,
            host_id: composed_of.host_id,
            host_set_id: composed_of.host_set_id,
            auth_token_id: composed_of.auth_token_id,
            endpoint: endpoint.into(),
            version: 0,
            created_at: now,
            updated_at: now,
            termination_reason: None,
            tofu_token: None,
            worker_id: None,
            worker_type: None,
            key_id: String::new(),
            public_key: Vec::new(),
        }
    }

    /// The identity and target fields of this session
    pub fn composed_of(&self) -> ComposedOf {
        ComposedOf {
            user_id: self.user_id.clone(),
            host_id: self.host_id.clone(),
            target_id: self.target_id.clone(),
            host_set_id: self.host_set_id.clone(),
            auth_token_id: self.auth_token_id.clone(),
            scope_id: self.scope_id.clone(),
        }
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
