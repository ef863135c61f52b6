//! Client configuration

use shared::message::KITCHEN_ROOM;
use shared::order::{StatusFilter, TransitionTable};
use std::time::Duration;

/// Connection configuration for the kitchen backend
///
/// # Environment variables
///
/// | Variable | Default | Meaning |
/// |----------|---------|---------|
/// | KDS_API_URL | http://localhost:3000/api | REST base URL |
/// | KDS_WS_URL | derived from KDS_API_URL | realtime channel URL |
/// | KDS_ROOM | kitchen | room joined after connecting |
/// | KDS_TOKEN | unset | bearer token |
/// | KDS_REQUEST_TIMEOUT_SECS | 10 | REST timeout |
/// | KDS_LOG_LEVEL | info | log level |
/// | KDS_LOG_JSON | false | JSON console logs |
/// | KDS_LOG_DIR | unset | daily rotating log files |
#[derive(Debug, Clone)]
pub struct KitchenConfig {
    /// REST base URL (e.g., "http://localhost:3000/api")
    pub base_url: String,

    /// Realtime channel URL (e.g., "ws://localhost:3000/ws")
    pub ws_url: String,

    /// Room joined after the channel handshake
    pub room: String,

    /// Bearer token, if the backend requires one
    pub token: Option<String>,

    /// Request timeout in seconds
    pub timeout: u64,

    pub log_level: String,
    pub log_json: bool,
    pub log_dir: Option<String>,

    /// Timing knobs for the reconciliation core
    pub sync: SyncConfig,
}

impl KitchenConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            ws_url: derive_ws_url(&base_url),
            base_url,
            room: KITCHEN_ROOM.to_string(),
            token: None,
            timeout: 10,
            log_level: "info".to_string(),
            log_json: false,
            log_dir: None,
            sync: SyncConfig::default(),
        }
    }

    /// Load from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let mut config =
            Self::new(std::env::var("KDS_API_URL").unwrap_or_else(|_| "http://localhost:3000/api".into()));

        if let Ok(ws_url) = std::env::var("KDS_WS_URL") {
            config.ws_url = ws_url;
        }
        if let Ok(room) = std::env::var("KDS_ROOM") {
            config.room = room;
        }
        config.token = std::env::var("KDS_TOKEN").ok().filter(|t| !t.is_empty());
        config.timeout = std::env::var("KDS_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);
        config.log_level = std::env::var("KDS_LOG_LEVEL").unwrap_or_else(|_| "info".into());
        config.log_json = std::env::var("KDS_LOG_JSON")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(false);
        config.log_dir = std::env::var("KDS_LOG_DIR").ok().filter(|d| !d.is_empty());
        config
    }

    /// Set the realtime channel URL
    pub fn with_ws_url(mut self, ws_url: impl Into<String>) -> Self {
        self.ws_url = ws_url.into();
        self
    }

    /// Set the room joined after connecting
    pub fn with_room(mut self, room: impl Into<String>) -> Self {
        self.room = room.into();
        self
    }

    /// Set the bearer token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = seconds;
        self
    }

    pub fn with_sync(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }
}

impl Default for KitchenConfig {
    fn default() -> Self {
        Self::new("http://localhost:3000/api")
    }
}

/// `http://host/api` -> `ws://host/ws`, `https://host/api` -> `wss://host/ws`
fn derive_ws_url(base_url: &str) -> String {
    let ws = base_url
        .replacen("https://", "wss://", 1)
        .replacen("http://", "ws://", 1);
    let ws = ws.trim_end_matches('/');
    let root = ws.strip_suffix("/api").unwrap_or(ws);
    format!("{root}/ws")
}

/// Timing and policy knobs of the reconciliation core
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// First reconnect delay
    pub reconnect_delay: Duration,
    /// Exponential backoff cap
    pub max_reconnect_delay: Duration,
    /// Liveness ping interval (zero disables pings)
    pub ping_interval: Duration,
    /// Extra silence tolerated after a ping before the link counts as dropped
    pub pong_timeout: Duration,
    /// Delay between a deletion event and removal from the board
    pub deletion_grace: Duration,
    /// Clock tick for elapsed-time displays
    pub clock_tick: Duration,
    /// Cooking orders older than this are flagged as delayed
    pub delayed_after: Duration,
    /// Orders younger than this are flagged as new
    pub new_window: Duration,
    /// Status changes staff may request
    pub transitions: TransitionTable,
    /// Statuses shown as "in progress"
    pub in_progress: StatusFilter,
    /// Statuses shown as "ready"
    pub ready: StatusFilter,
}

impl Default for SyncConfig {
    /// Local network profile
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_millis(500),
            max_reconnect_delay: Duration::from_secs(10),
            ping_interval: Duration::from_secs(25),
            pong_timeout: Duration::from_secs(5),
            deletion_grace: Duration::from_secs(4),
            clock_tick: Duration::from_secs(1),
            delayed_after: Duration::from_secs(12 * 60),
            new_window: Duration::from_secs(10),
            transitions: TransitionTable::default(),
            in_progress: StatusFilter::in_progress(),
            ready: StatusFilter::ready(),
        }
    }
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Local network profile (default)
    pub fn lan() -> Self {
        Self::default()
    }

    /// Internet profile: slower backoff, fewer pings
    pub fn wan() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(60),
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(10),
            ..Self::default()
        }
    }

    pub fn with_reconnect_delay(mut self, initial: Duration, max: Duration) -> Self {
        self.reconnect_delay = initial;
        self.max_reconnect_delay = max.max(initial);
        self
    }

    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    pub fn with_pong_timeout(mut self, timeout: Duration) -> Self {
        self.pong_timeout = timeout;
        self
    }

    pub fn with_deletion_grace(mut self, grace: Duration) -> Self {
        self.deletion_grace = grace;
        self
    }

    pub fn with_clock_tick(mut self, tick: Duration) -> Self {
        self.clock_tick = tick;
        self
    }

    pub fn with_transitions(mut self, transitions: TransitionTable) -> Self {
        self.transitions = transitions;
        self
    }

    pub fn with_filters(mut self, in_progress: StatusFilter, ready: StatusFilter) -> Self {
        self.in_progress = in_progress;
        self.ready = ready;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_url_derivation() {
        assert_eq!(derive_ws_url("http://localhost:3000/api"), "ws://localhost:3000/ws");
        assert_eq!(derive_ws_url("https://kds.example.com/api/"), "wss://kds.example.com/ws");
        assert_eq!(derive_ws_url("http://10.0.0.2:8080"), "ws://10.0.0.2:8080/ws");
    }

    #[test]
    fn test_config_builder() {
        let config = KitchenConfig::new("http://10.0.0.2/api")
            .with_room("bar")
            .with_token("secret")
            .with_timeout(3);
        assert_eq!(config.ws_url, "ws://10.0.0.2/ws");
        assert_eq!(config.room, "bar");
        assert_eq!(config.token.as_deref(), Some("secret"));
        assert_eq!(config.timeout, 3);
    }

    #[test]
    fn test_sync_defaults() {
        let sync = SyncConfig::default();
        assert_eq!(sync.reconnect_delay, Duration::from_millis(500));
        assert_eq!(sync.max_reconnect_delay, Duration::from_secs(10));
        assert_eq!(sync.delayed_after, Duration::from_secs(720));
        assert_eq!(sync.new_window, Duration::from_secs(10));
    }

    #[test]
    fn test_backoff_cap_never_below_initial() {
        let sync = SyncConfig::new()
            .with_reconnect_delay(Duration::from_secs(5), Duration::from_secs(1));
        assert_eq!(sync.max_reconnect_delay, Duration::from_secs(5));
    }
}
