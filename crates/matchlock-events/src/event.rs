//! Event schema published on the sandbox event bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Network-layer event, emitted once per proxied HTTP/HTTPS request or
/// per passthrough connection decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkEvent {
    /// HTTP method, or `"CONNECT"`/`"TCP"` for passthrough.
    pub method: String,
    /// Full request URL as seen from the guest.
    pub url: String,
    /// Effective host used for the policy decision.
    pub host: String,
    /// Upstream status code, if the request reached an upstream.
    pub status_code: Option<u16>,
    /// Bytes in the request as sent upstream.
    pub request_bytes: u64,
    /// Bytes in the response as received from upstream.
    pub response_bytes: u64,
    /// Wall-clock duration of the round trip, in milliseconds.
    pub duration_ms: u64,
    /// Whether policy blocked this request.
    pub blocked: bool,
    /// Human-readable reason when `blocked` is true.
    pub block_reason: Option<String>,
}

/// Filesystem-layer event, emitted by the hook engine's event sink after
/// every VFS call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEvent {
    /// The VFS operation name (e.g. `"write"`, `"mkdir"`).
    pub op: String,
    /// Cleaned path the operation targeted.
    pub path: String,
    /// Bytes involved (write length, or file size for stat-like ops).
    pub size: u64,
    /// POSIX mode bits, when meaningful for the operation.
    pub mode: u32,
    /// Caller uid, as seen by the VFS protocol server.
    pub uid: u32,
    /// Caller gid, as seen by the VFS protocol server.
    pub gid: u32,
}

/// Exec-layer event, emitted once a relayed command finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecEvent {
    /// The command line that was executed.
    pub command: String,
    /// Process exit code.
    pub exit_code: i32,
}

/// A tagged event published on the sandbox event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchlockEvent {
    /// A proxied or passthrough network decision/result.
    Network {
        /// Wall-clock time the event was published.
        timestamp: DateTime<Utc>,
        /// Event payload.
        payload: NetworkEvent,
    },
    /// A VFS operation observed by the hook engine.
    File {
        /// Wall-clock time the event was published.
        timestamp: DateTime<Utc>,
        /// Event payload.
        payload: FileEvent,
    },
    /// A relayed exec session finished.
    Exec {
        /// Wall-clock time the event was published.
        timestamp: DateTime<Utc>,
        /// Event payload.
        payload: ExecEvent,
    },
}

impl MatchlockEvent {
    /// Short event-type tag, for logging and metrics.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Network { .. } => "network",
            Self::File { .. } => "file",
            Self::Exec { .. } => "exec",
        }
    }

    /// Build a network event stamped with the current time.
    #[must_use]
    pub fn network(payload: NetworkEvent) -> Self {
        Self::Network {
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Build a file event stamped with the current time.
    #[must_use]
    pub fn file(payload: FileEvent) -> Self {
        Self::File {
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Build an exec event stamped with the current time.
    #[must_use]
    pub fn exec(payload: ExecEvent) -> Self {
        Self::Exec {
            timestamp: Utc::now(),
            payload,
        }
    }
}
