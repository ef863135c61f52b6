//! Shared types for the kitchen display
//!
//! Order records, the status lifecycle and the realtime channel envelope,
//! used by the client library and by anything that talks to it (fakes in
//! tests, tooling).

pub mod message;
pub mod order;

// Re-exports
pub use message::{ClientFrame, ServerEvent};
pub use order::{Order, OrderId, OrderStatus};
