//! Realtime event adapter
//!
//! - [`channel`]: transport seam (`RealtimeChannel` / `ChannelConnection`)
//!   with a WebSocket and an in-memory implementation
//! - [`adapter`]: applies server events to the order store
//! - [`worker`]: connection loop with backoff, liveness and resync
//!
//! The connection lifecycle itself is the pure [`ConnectionMachine`] below;
//! the worker only executes the [`Action`]s it returns.

pub mod adapter;
pub mod channel;
pub mod worker;

pub use adapter::{EventAdapter, OrderNotice};
pub use channel::{ChannelConnection, Inbound, MemoryChannel, RealtimeChannel, WsChannel};
pub use worker::{Lifecycle, RealtimeWorker, WorkerHandle};

use std::fmt;
use std::time::Duration;

/// Connectivity indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        })
    }
}

/// Side effect requested by a state transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Send the room join frame
    JoinRoom,
    /// Run one snapshot refresh
    Refetch,
    /// Try again after the delay
    ScheduleReconnect(Duration),
    /// Try again right away, skipping any pending backoff
    ReconnectNow,
}

/// Connection state machine with exponential backoff
#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    state: ConnectionState,
    consecutive_failures: u32,
    initial_delay: Duration,
    max_delay: Duration,
}

impl ConnectionMachine {
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            consecutive_failures: 0,
            initial_delay,
            max_delay: max_delay.max(initial_delay),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// `initial · 2^(failures-1)`, capped
    pub fn backoff_delay(&self) -> Duration {
        let exponent = self.consecutive_failures.saturating_sub(1).min(31);
        self.initial_delay
            .checked_mul(1u32 << exponent)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Disconnected → Connecting
    pub fn on_connect_started(&mut self) {
        self.state = ConnectionState::Connecting;
    }

    /// Connecting → Connected; resets the failure counter
    pub fn on_connected(&mut self) -> [Action; 2] {
        self.state = ConnectionState::Connected;
        self.consecutive_failures = 0;
        [Action::JoinRoom, Action::Refetch]
    }

    /// Handshake failed: Connecting → Disconnected
    pub fn on_connect_failed(&mut self) -> Action {
        self.state = ConnectionState::Disconnected;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        Action::ScheduleReconnect(self.backoff_delay())
    }

    /// Transport dropped: Connected → Disconnected
    ///
    /// `None` when not connected, so a late drop notification cannot double
    /// count a failure.
    pub fn on_dropped(&mut self) -> Option<Action> {
        if self.state != ConnectionState::Connected {
            return None;
        }
        self.state = ConnectionState::Disconnected;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        Some(Action::ScheduleReconnect(self.backoff_delay()))
    }

    /// Connection closed on request: Connected → Disconnected
    ///
    /// Not a failure, the backoff counter is left alone.
    pub fn on_closed(&mut self) {
        self.state = ConnectionState::Disconnected;
    }

    /// The display became visible again
    pub fn on_visible(&mut self) -> Vec<Action> {
        match self.state {
            ConnectionState::Disconnected => vec![Action::ReconnectNow, Action::Refetch],
            _ => Vec::new(),
        }
    }
}
