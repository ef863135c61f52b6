//! Realtime channel message types
//!
//! Every frame is a JSON text frame of the shape
//! `{"event": "<name>", "data": <payload>}`. These types are shared between
//! the client library and any server or fake that speaks the protocol.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::order::Order;

pub mod payload;
pub use payload::*;

/// Room the kitchen display joins
pub const KITCHEN_ROOM: &str = "kitchen";

/// Events pushed by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A new order was placed
    CreatedOrder(Order),
    /// Items or general info of an order changed (status included)
    UpdatedOrderItems(Order),
    /// An order was removed from the day's list
    DeletedOrder(DeletedOrderPayload),
    /// Liveness reply
    Pong,
}

impl ServerEvent {
    /// Parse a text frame
    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Encode as a text frame
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::CreatedOrder(_) => "created_order",
            Self::UpdatedOrderItems(_) => "updated_order_items",
            Self::DeletedOrder(_) => "deleted_order",
            Self::Pong => "pong",
        }
    }
}

impl fmt::Display for ServerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Frames sent by the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Room join handshake
    Join(JoinPayload),
    /// Liveness probe
    Ping,
}

impl ClientFrame {
    pub fn join(room: impl Into<String>) -> Self {
        Self::Join(JoinPayload::room(room))
    }

    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
