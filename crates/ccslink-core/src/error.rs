//! Shared error type across ccslink crates.

use thiserror::Error;

/// Stable error codes (used in logs, metrics labels and tests).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Transport could not be established.
    ConnectFailed,
    /// Credentials rejected by the server.
    AuthFailed,
    /// No live session to send on.
    NotConnected,
    /// Extension element missing, mismatched or empty.
    MalformedEnvelope,
    /// Envelope content is not a usable JSON message.
    InvalidPayload,
    /// JSON encoding failed.
    Serialization,
    /// Registration registry append failed.
    RegistryWrite,
    /// Invalid configuration.
    Config,
    /// Internal runtime error.
    Internal,
}

impl ErrorCode {
    /// String representation used in logs and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::ConnectFailed => "CONNECT_FAILED",
            ErrorCode::AuthFailed => "AUTH_FAILED",
            ErrorCode::NotConnected => "NOT_CONNECTED",
            ErrorCode::MalformedEnvelope => "MALFORMED_ENVELOPE",
            ErrorCode::InvalidPayload => "INVALID_PAYLOAD",
            ErrorCode::Serialization => "SERIALIZATION",
            ErrorCode::RegistryWrite => "REGISTRY_WRITE",
            ErrorCode::Config => "CONFIG",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

/// Which stage of transport setup failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectKind {
    Network,
    Tls,
    Timeout,
}

impl ConnectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectKind::Network => "network",
            ConnectKind::Tls => "tls",
            ConnectKind::Timeout => "timeout",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, CcsError>;

/// Unified error type used by core and client.
#[derive(Debug, Error)]
pub enum CcsError {
    #[error("connect failed ({}): {detail}", .kind.as_str())]
    Connect { kind: ConnectKind, detail: String },
    #[error("auth failed: {0}")]
    AuthFailed(String),
    #[error("not connected")]
    NotConnected,
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("serialization: {0}")]
    Serialization(String),
    #[error("registry write: {0}")]
    RegistryWrite(String),
    #[error("config: {0}")]
    Config(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl CcsError {
    /// Shorthand for a transport setup failure.
    pub fn connect(kind: ConnectKind, detail: impl Into<String>) -> Self {
        CcsError::Connect {
            kind,
            detail: detail.into(),
        }
    }

    /// Map to a stable code.
    pub fn code(&self) -> ErrorCode {
        match self {
            CcsError::Connect { .. } => ErrorCode::ConnectFailed,
            CcsError::AuthFailed(_) => ErrorCode::AuthFailed,
            CcsError::NotConnected => ErrorCode::NotConnected,
            CcsError::MalformedEnvelope(_) => ErrorCode::MalformedEnvelope,
            CcsError::InvalidPayload(_) => ErrorCode::InvalidPayload,
            CcsError::Serialization(_) => ErrorCode::Serialization,
            CcsError::RegistryWrite(_) => ErrorCode::RegistryWrite,
            CcsError::Config(_) => ErrorCode::Config,
            CcsError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Errors that end the current `connect` attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CcsError::Connect { .. } | CcsError::AuthFailed(_))
    }
}
