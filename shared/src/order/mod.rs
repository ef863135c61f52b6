//! Order model shared by the kitchen display and its tooling
//!
//! - `types`: the order record as served by the backend
//! - `status`: status lifecycle, transition table and board filters

pub mod status;
pub mod types;

// Re-exports
pub use status::{OrderStatus, StatusFilter, TransitionTable};
pub use types::*;
