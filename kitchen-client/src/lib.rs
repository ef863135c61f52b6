//! Kitchen Client - live order board for kitchen displays
//!
//! Keeps a local order list consistent with the backend by combining a REST
//! snapshot, pushed realtime events and staff-triggered status changes.

pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod logger;
pub mod mutator;
pub mod realtime;
pub mod snapshot;
pub mod store;

pub use client::{KitchenClient, KitchenClientBuilder};
pub use config::{KitchenConfig, SyncConfig};
pub use error::{ClientError, ClientResult};
pub use http::{InMemoryOrderApi, NetworkOrderApi, OrderApi};
pub use mutator::StatusMutator;
pub use realtime::{
    ChannelConnection, ConnectionState, Inbound, Lifecycle, MemoryChannel, OrderNotice,
    RealtimeChannel, WsChannel,
};
pub use snapshot::SnapshotLoader;
pub use store::{BoardView, OrderRepository, OrderStore, UpsertOutcome};

// Re-export shared types for convenience
pub use shared::message::{ClientFrame, ServerEvent};
pub use shared::order::{Order, OrderId, OrderStatus, StatusFilter, TransitionTable, UpdateOrderInfo};
