use serde::{Deserialize, Serialize};

use crate::order::DailyOrderNumber;

/// Room join payload (client -> server)
///
/// Sent once right after the connection opens; the server only pushes order
/// events to sockets that joined the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinPayload {
    /// Logical room, `kitchen` for the kitchen display
    pub room: String,
    /// Client unique id (UUID), regenerated on every connection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_version: Option<String>,
}

impl JoinPayload {
    pub fn room(room: impl Into<String>) -> Self {
        Self {
            room: room.into(),
            client_id: None,
            client_name: None,
            client_version: None,
        }
    }
}

/// Deletion payload (server -> client)
///
/// The backend has sent both a bare number and an object over time; both
/// are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeletedOrderPayload {
    Number(DailyOrderNumber),
    #[serde(rename_all = "camelCase")]
    Object {
        daily_order_number: DailyOrderNumber,
    },
}

impl DeletedOrderPayload {
    pub fn daily_order_number(&self) -> DailyOrderNumber {
        match *self {
            Self::Number(n) => n,
            Self::Object { daily_order_number } => daily_order_number,
        }
    }
}

impl From<DailyOrderNumber> for DeletedOrderPayload {
    fn from(n: DailyOrderNumber) -> Self {
        Self::Object {
            daily_order_number: n,
        }
    }
}
