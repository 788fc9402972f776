//! Error types for remote HTTP access.

use std::fmt;

use chrono::{DateTime, Utc};

/// Broad class of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Connect,
    Timeout,
    Request,
    Body,
    Decode,
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connect => "Connect",
            Self::Timeout => "Timeout",
            Self::Request => "Request",
            Self::Body => "Body",
            Self::Decode => "Decode",
            Self::Other => "Other",
        };
        f.write_str(name)
    }
}

/// Failure reported by an HTTP delegate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    /// No pooled connection became available in time. Reflects local
    /// pressure, not the health of the remote.
    #[error("PoolTimeout: connection pool exhausted")]
    PoolTimeout,

    /// The remote's certificate could not be verified.
    #[error("Untrusted: {0}")]
    Untrusted(String),

    #[error("{kind}: {message}")]
    Transport { kind: TransportErrorKind, message: String },
}

impl NetworkError {
    pub fn transport(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        NetworkError::Transport { kind, message: message.into() }
    }

    /// Whether this failure says anything about the remote's availability.
    pub fn is_remote_unavailable(&self) -> bool {
        !matches!(self, NetworkError::PoolTimeout)
    }

    /// Reason recorded on an unavailable status.
    pub fn reason(&self) -> String {
        match self {
            NetworkError::Untrusted(_) => "Untrusted Remote".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        let message = err.to_string();
        if err.is_timeout() {
            NetworkError::transport(TransportErrorKind::Timeout, message)
        } else if err.is_connect() {
            if mentions_certificate(&err) {
                NetworkError::Untrusted(message)
            } else {
                NetworkError::transport(TransportErrorKind::Connect, message)
            }
        } else if err.is_request() {
            NetworkError::transport(TransportErrorKind::Request, message)
        } else if err.is_body() {
            NetworkError::transport(TransportErrorKind::Body, message)
        } else if err.is_decode() {
            NetworkError::transport(TransportErrorKind::Decode, message)
        } else {
            NetworkError::transport(TransportErrorKind::Other, message)
        }
    }
}

fn mentions_certificate(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.to_string().to_lowercase().contains("certificate") {
            return true;
        }
        current = e.source();
    }
    false
}

/// Errors surfaced by a circuit-breaking client.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("REMOTE_BLOCKED: remote manually blocked")]
    ManuallyBlocked,

    #[error("REMOTE_BLOCKED: remote auto-blocked until {until}")]
    AutoBlocked { until: DateTime<Utc> },

    /// The delegate's own error, unchanged.
    #[error(transparent)]
    Network(#[from] NetworkError),
}

impl RemoteError {
    /// True for errors synthesized before any network attempt.
    pub fn is_blocked(&self) -> bool {
        matches!(self, RemoteError::ManuallyBlocked | RemoteError::AutoBlocked { .. })
    }
}
