//! Error types for the tick publisher
//!
//! The state machine never surfaces errors to a caller: every failure is
//! handled by regressing the connection state and is reported through the
//! returned [`Step`](crate::publisher::Step) for logging and metrics. Only
//! startup failures (configuration, client id, runtime setup) are fatal.

use crate::publisher::{ClientToken, ConnectionState};
use thiserror::Error;

/// Main error type for publisher operations
#[derive(Debug, Error)]
pub enum PublisherError {
    #[error("Broker client initialization failed: {0}")]
    ConnectInitFailure(String),

    #[error("Broker client {token} failed: {reason}")]
    AsyncClientError { token: ClientToken, reason: String },

    #[error("Publish failed: {0}")]
    PublishFailure(String),

    #[error("Unexpected event: {0}")]
    UnexpectedEvent(#[from] Anomaly),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Client id error: {0}")]
    ClientId(#[from] crate::publisher::ClientIdError),

    #[error("Runtime error: {message}")]
    Runtime { message: String },
}

/// Events that do not fit the current state; logged, never fatal
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Anomaly {
    #[error("network-up received while {state}")]
    UnexpectedNetworkUp { state: ConnectionState },

    #[error("client handle {token} still held on network-up")]
    HandleHeldOnNetworkUp { token: ClientToken },

    #[error("notification for {token} which is not the held client (state {state})")]
    UnknownClient {
        token: ClientToken,
        state: ConnectionState,
    },

    #[error("connected without a client handle")]
    MissingHandle,
}

impl PublisherError {
    /// Create connect initialization error
    pub fn connect_init_failure<S: Into<String>>(message: S) -> Self {
        Self::ConnectInitFailure(message.into())
    }

    /// Create publish failure error
    pub fn publish_failure<S: Into<String>>(message: S) -> Self {
        Self::PublishFailure(message.into())
    }

    /// Create runtime error
    pub fn runtime<S: Into<String>>(message: S) -> Self {
        Self::Runtime {
            message: message.into(),
        }
    }

    /// Short category name used as a structured log field and metrics key
    pub fn kind(&self) -> &'static str {
        match self {
            PublisherError::ConnectInitFailure(_) => "connect_init_failure",
            PublisherError::AsyncClientError { .. } => "async_client_error",
            PublisherError::PublishFailure(_) => "publish_failure",
            PublisherError::UnexpectedEvent(_) => "unexpected_event",
            PublisherError::Config(_) => "config",
            PublisherError::ClientId(_) => "client_id",
            PublisherError::Runtime { .. } => "runtime",
        }
    }
}

/// Result type for publisher operations
pub type PublisherResult<T> = Result<T, PublisherError>;
