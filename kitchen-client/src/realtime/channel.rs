//! Realtime channel transports

use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use shared::message::{ClientFrame, ServerEvent};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::{ClientError, ClientResult, KitchenConfig};

/// Opens connections to the push channel
#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    async fn connect(&self) -> ClientResult<Box<dyn ChannelConnection>>;
}

/// Anything the server sent
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Event(ServerEvent),
    /// A frame that carries no event (protocol ping/pong, unknown or
    /// malformed text). It still proves the link is alive.
    Heartbeat,
}

/// One open connection
#[async_trait]
pub trait ChannelConnection: Send {
    async fn send(&mut self, frame: &ClientFrame) -> ClientResult<()>;

    /// Next inbound frame, `None` once the connection is closed
    async fn next_frame(&mut self) -> Option<ClientResult<Inbound>>;

    /// Next server event, skipping heartbeats
    async fn next_event(&mut self) -> Option<ClientResult<ServerEvent>> {
        loop {
            match self.next_frame().await? {
                Ok(Inbound::Event(event)) => return Some(Ok(event)),
                Ok(Inbound::Heartbeat) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }

    async fn close(&mut self);
}

/// Decode a text frame; unknown events become heartbeats
fn decode_frame(text: &str) -> Inbound {
    match ServerEvent::from_text(text) {
        Ok(event) => Inbound::Event(event),
        Err(e) => {
            tracing::warn!(error = %e, frame = %truncate(text, 200), "Skipping unrecognised frame");
            Inbound::Heartbeat
        }
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// ============================================================================
// WebSocket
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport
#[derive(Debug, Clone)]
pub struct WsChannel {
    url: String,
    token: Option<String>,
}

impl WsChannel {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
        }
    }

    pub fn from_config(config: &KitchenConfig) -> Self {
        Self {
            url: config.ws_url.clone(),
            token: config.token.clone(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RealtimeChannel for WsChannel {
    async fn connect(&self) -> ClientResult<Box<dyn ChannelConnection>> {
        let mut request = self.url.as_str().into_client_request()?;
        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ClientError::Config(format!("Invalid token: {e}")))?;
            request.headers_mut().insert("Authorization", value);
        }

        let (stream, _response) = tokio_tungstenite::connect_async(request).await?;
        tracing::debug!(url = %self.url, "WebSocket connected");
        Ok(Box::new(WsConnection { stream }))
    }
}

struct WsConnection {
    stream: WsStream,
}

#[async_trait]
impl ChannelConnection for WsConnection {
    async fn send(&mut self, frame: &ClientFrame) -> ClientResult<()> {
        let text = frame.to_text()?;
        self.stream.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<ClientResult<Inbound>> {
        match self.stream.next().await? {
            Ok(Message::Text(text)) => Some(Ok(decode_frame(text.as_str()))),
            Ok(Message::Close(frame)) => {
                tracing::debug!(?frame, "WebSocket closed by server");
                None
            }
            // Protocol ping/pong and binary frames; tungstenite answers pings itself
            Ok(_) => Some(Ok(Inbound::Heartbeat)),
            Err(e) => Some(Err(e.into())),
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}

// ============================================================================
// In-memory
// ============================================================================

enum MemoryFrame {
    Event(ServerEvent),
    Raw(String),
}

#[derive(Default)]
struct MemoryState {
    refuse: bool,
    manual_pong: bool,
    sent: Vec<ClientFrame>,
    live: Option<(mpsc::UnboundedSender<MemoryFrame>, CancellationToken)>,
}

/// In-process channel
///
/// The handle doubles as the server side: it pushes events to the live
/// connection, drops it, refuses new ones, and records what the client sent.
/// Pings are answered with a pong unless [`MemoryChannel::set_manual_pong`]
/// is on.
#[derive(Clone)]
pub struct MemoryChannel {
    state: Arc<Mutex<MemoryState>>,
    connects: Arc<watch::Sender<usize>>,
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryChannel {
    pub fn new() -> Self {
        let (connects, _) = watch::channel(0);
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            connects: Arc::new(connects),
        }
    }

    /// Make connection attempts fail
    pub fn set_refuse(&self, refuse: bool) {
        self.state.lock().refuse = refuse;
    }

    /// Stop answering pings
    pub fn set_manual_pong(&self, manual: bool) {
        self.state.lock().manual_pong = manual;
    }

    /// Successful connections so far
    pub fn connect_count(&self) -> usize {
        *self.connects.borrow()
    }

    /// Wait until at least `count` connections were accepted
    pub async fn wait_for_connects(&self, count: usize) {
        let mut rx = self.connects.subscribe();
        let _ = rx.wait_for(|n| *n >= count).await;
    }

    pub fn is_connected(&self) -> bool {
        self.state
            .lock()
            .live
            .as_ref()
            .is_some_and(|(tx, token)| !tx.is_closed() && !token.is_cancelled())
    }

    /// Push an event to the live connection; `false` if there is none
    pub fn push(&self, event: ServerEvent) -> bool {
        self.push_frame(MemoryFrame::Event(event))
    }

    /// Push a raw text frame to the live connection
    pub fn push_raw(&self, text: impl Into<String>) -> bool {
        self.push_frame(MemoryFrame::Raw(text.into()))
    }

    fn push_frame(&self, frame: MemoryFrame) -> bool {
        match &self.state.lock().live {
            Some((tx, _)) => tx.send(frame).is_ok(),
            None => false,
        }
    }

    /// Close the live connection from the server side
    pub fn drop_connection(&self) -> bool {
        match self.state.lock().live.take() {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Every frame the client sent, across connections
    pub fn sent_frames(&self) -> Vec<ClientFrame> {
        self.state.lock().sent.clone()
    }
}

#[async_trait]
impl RealtimeChannel for MemoryChannel {
    async fn connect(&self) -> ClientResult<Box<dyn ChannelConnection>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let closed = CancellationToken::new();
        {
            let mut state = self.state.lock();
            if state.refuse {
                return Err(ClientError::Channel("connection refused".into()));
            }
            if let Some((_, old)) = state.live.replace((tx.clone(), closed.clone())) {
                old.cancel();
            }
        }
        self.connects.send_modify(|n| *n += 1);

        Ok(Box::new(MemoryConnection {
            state: self.state.clone(),
            tx,
            rx,
            closed,
        }))
    }
}

struct MemoryConnection {
    state: Arc<Mutex<MemoryState>>,
    tx: mpsc::UnboundedSender<MemoryFrame>,
    rx: mpsc::UnboundedReceiver<MemoryFrame>,
    closed: CancellationToken,
}

#[async_trait]
impl ChannelConnection for MemoryConnection {
    async fn send(&mut self, frame: &ClientFrame) -> ClientResult<()> {
        if self.closed.is_cancelled() {
            return Err(ClientError::Channel("connection closed".into()));
        }
        let auto_pong = {
            let mut state = self.state.lock();
            state.sent.push(frame.clone());
            !state.manual_pong
        };
        if auto_pong && *frame == ClientFrame::Ping {
            let _ = self.tx.send(MemoryFrame::Event(ServerEvent::Pong));
        }
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<ClientResult<Inbound>> {
        let frame = tokio::select! {
            biased;
            _ = self.closed.cancelled() => return None,
            frame = self.rx.recv() => frame?,
        };
        Some(Ok(match frame {
            MemoryFrame::Event(event) => Inbound::Event(event),
            MemoryFrame::Raw(text) => decode_frame(&text),
        }))
    }

    async fn close(&mut self) {
        self.closed.cancel();
        let mut state = self.state.lock();
        let is_current = state
            .live
            .as_ref()
            .is_some_and(|(_, token)| token.is_cancelled());
        if is_current {
            state.live = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::order::Order;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("añb", 2), "añ");
        assert_eq!(truncate("ab", 5), "ab");
    }

    #[tokio::test]
    async fn test_memory_channel_delivers_and_skips_garbage() {
        let channel = MemoryChannel::new();
        let mut conn = channel.connect().await.unwrap();

        assert!(channel.push_raw("not json"));
        assert!(channel.push_raw(r#"{"event":"mystery","data":1}"#));
        assert!(channel.push(ServerEvent::CreatedOrder(Order::new(1, 1))));

        match conn.next_event().await {
            Some(Ok(ServerEvent::CreatedOrder(order))) => assert_eq!(order.order_id, 1),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_garbage_frames_surface_as_heartbeats() {
        let channel = MemoryChannel::new();
        let mut conn = channel.connect().await.unwrap();

        channel.push_raw("not json");
        channel.push(ServerEvent::Pong);

        assert!(matches!(conn.next_frame().await, Some(Ok(Inbound::Heartbeat))));
        assert!(matches!(
            conn.next_frame().await,
            Some(Ok(Inbound::Event(ServerEvent::Pong)))
        ));
    }

    #[tokio::test]
    async fn test_memory_channel_answers_ping_and_records_frames() {
        let channel = MemoryChannel::new();
        let mut conn = channel.connect().await.unwrap();

        conn.send(&ClientFrame::join("kitchen")).await.unwrap();
        conn.send(&ClientFrame::Ping).await.unwrap();

        assert!(matches!(conn.next_event().await, Some(Ok(ServerEvent::Pong))));
        assert_eq!(
            channel.sent_frames(),
            vec![ClientFrame::join("kitchen"), ClientFrame::Ping]
        );
    }

    #[tokio::test]
    async fn test_memory_channel_drop_and_refuse() {
        let channel = MemoryChannel::new();
        let mut conn = channel.connect().await.unwrap();
        assert!(channel.is_connected());

        assert!(channel.drop_connection());
        assert!(conn.next_event().await.is_none());
        assert!(!channel.push(ServerEvent::Pong));

        channel.set_refuse(true);
        assert!(channel.connect().await.is_err());
        assert_eq!(channel.connect_count(), 1);
    }
}
