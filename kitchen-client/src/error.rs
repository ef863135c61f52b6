//! Client error types

use shared::order::{OrderId, OrderStatus};
use thiserror::Error;

/// Client error type
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure: connect, timeout, broken body stream
    #[error("Network error: {0}")]
    Network(String),

    /// Non-2xx response from the backend
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Backend refused the status change (e.g. another display already advanced it)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Status change rejected locally, no request was sent
    #[error("Invalid transition for order {order_id}: {from} -> {to}")]
    InvalidTransition {
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },

    /// Order unknown locally or to the backend
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid response format
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Realtime channel failure
    #[error("Channel error: {0}")]
    Channel(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),
}

impl ClientError {
    /// Whether retrying the same call later may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Channel(_) => true,
            Self::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return Self::InvalidResponse(e.to_string());
        }
        match e.status() {
            Some(status) => Self::Server {
                status: status.as_u16(),
                message: e.to_string(),
            },
            None => Self::Network(e.to_string()),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Channel(e.to_string())
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;
