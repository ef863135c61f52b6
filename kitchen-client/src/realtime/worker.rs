//! RealtimeWorker - keeps the push channel alive and the board in sync
//!
//! 1. Connect to the channel
//! 2. Join the room and refetch the snapshot on every (re)connect
//! 3. Apply incoming events in arrival order
//! 4. Ping on an interval; treat a silent link as dropped
//! 5. Reconnect with exponential backoff on disconnect
//! 6. Visibility regained while disconnected: reconnect now and refetch

use std::sync::Arc;
use std::time::Duration;

use shared::message::{ClientFrame, JoinPayload};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{
    Action, ChannelConnection, ConnectionMachine, ConnectionState, EventAdapter, Inbound,
    RealtimeChannel,
};
use crate::config::SyncConfig;
use crate::snapshot::SnapshotLoader;

/// Signals from the host application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// The display came back to the foreground
    VisibilityRegained,
    /// Drop the current connection (if any) and connect again right away
    Reconnect,
}

/// Handle for talking to a worker that has been moved onto a task
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    signals: mpsc::UnboundedSender<Lifecycle>,
    state: watch::Receiver<ConnectionState>,
}

impl WorkerHandle {
    /// Returns `false` once the worker is gone
    pub fn signal(&self, signal: Lifecycle) -> bool {
        self.signals.send(signal).is_ok()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }
}

enum SessionEnd {
    Shutdown,
    Dropped,
    ReconnectRequested,
}

pub struct RealtimeWorker {
    channel: Arc<dyn RealtimeChannel>,
    adapter: EventAdapter,
    loader: SnapshotLoader,
    room: String,
    ping_interval: Duration,
    pong_timeout: Duration,
    machine: ConnectionMachine,
    state_tx: watch::Sender<ConnectionState>,
    signals_tx: mpsc::UnboundedSender<Lifecycle>,
    signals: mpsc::UnboundedReceiver<Lifecycle>,
    shutdown: CancellationToken,
}

impl RealtimeWorker {
    pub fn new(
        channel: Arc<dyn RealtimeChannel>,
        adapter: EventAdapter,
        loader: SnapshotLoader,
        sync: &SyncConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (signals_tx, signals) = mpsc::unbounded_channel();
        Self {
            channel,
            adapter,
            loader,
            room: shared::message::KITCHEN_ROOM.to_string(),
            ping_interval: sync.ping_interval,
            pong_timeout: sync.pong_timeout,
            machine: ConnectionMachine::new(sync.reconnect_delay, sync.max_reconnect_delay),
            state_tx,
            signals_tx,
            signals,
            shutdown,
        }
    }

    pub fn with_room(mut self, room: impl Into<String>) -> Self {
        self.room = room.into();
        self
    }

    pub fn handle(&self) -> WorkerHandle {
        WorkerHandle {
            signals: self.signals_tx.clone(),
            state: self.state_tx.subscribe(),
        }
    }

    /// Main run loop - connect, run a session, back off, repeat until shutdown
    pub async fn run(mut self) {
        tracing::info!(room = %self.room, "Realtime worker started");

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            self.machine.on_connect_started();
            self.publish();

            let connected = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                result = self.channel.connect() => result,
            };

            let delay = match connected {
                Ok(conn) => match self.run_session(conn).await {
                    SessionEnd::Shutdown => break,
                    SessionEnd::ReconnectRequested => {
                        self.machine.on_closed();
                        self.publish();
                        continue;
                    }
                    SessionEnd::Dropped => match self.machine.on_dropped() {
                        Some(Action::ScheduleReconnect(delay)) => delay,
                        _ => self.machine.backoff_delay(),
                    },
                },
                Err(e) => match self.machine.on_connect_failed() {
                    Action::ScheduleReconnect(delay) => {
                        tracing::warn!(
                            error = %e,
                            failures = self.machine.consecutive_failures(),
                            "Realtime connection failed"
                        );
                        delay
                    }
                    _ => self.machine.backoff_delay(),
                },
            };
            self.publish();

            if !self.wait_backoff(delay).await {
                break;
            }
        }

        self.state_tx.send_replace(ConnectionState::Disconnected);
        tracing::info!("Realtime worker stopped");
    }

    fn publish(&self) {
        let state = self.machine.state();
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            tracing::info!(%state, "Connection state changed");
        }
    }

    fn join_frame(&self) -> ClientFrame {
        ClientFrame::Join(JoinPayload {
            room: self.room.clone(),
            client_id: Some(uuid::Uuid::new_v4().to_string()),
            client_name: Some(env!("CARGO_PKG_NAME").to_string()),
            client_version: Some(env!("CARGO_PKG_VERSION").to_string()),
        })
    }

    /// Reload the snapshot; `false` when shutdown cut it short
    async fn refetch(&self) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            // Failures are recorded in the store by the loader
            _ = self.loader.refresh() => true,
        }
    }

    /// Sleep for the backoff delay; a visibility or reconnect signal cuts it
    /// short. Returns `false` on shutdown.
    async fn wait_backoff(&mut self, delay: Duration) -> bool {
        tracing::debug!(delay_ms = delay.as_millis() as u64, "Waiting before reconnect");
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return false,
                _ = &mut sleep => return true,
                Some(signal) = self.signals.recv() => match signal {
                    Lifecycle::VisibilityRegained => {
                        let actions = self.machine.on_visible();
                        if actions.contains(&Action::Refetch) && !self.refetch().await {
                            return false;
                        }
                        if actions.contains(&Action::ReconnectNow) {
                            tracing::info!("Visible again, reconnecting now");
                            return true;
                        }
                    }
                    Lifecycle::Reconnect => return true,
                },
            }
        }
    }

    /// One connected session, until the link drops or shutdown
    async fn run_session(&mut self, mut conn: Box<dyn ChannelConnection>) -> SessionEnd {
        let actions = self.machine.on_connected();
        self.publish();
        for action in actions {
            match action {
                Action::JoinRoom => {
                    if let Err(e) = conn.send(&self.join_frame()).await {
                        tracing::warn!(error = %e, "Room join failed");
                        return SessionEnd::Dropped;
                    }
                }
                Action::Refetch => {
                    if !self.refetch().await {
                        conn.close().await;
                        return SessionEnd::Shutdown;
                    }
                }
                _ => {}
            }
        }
        tracing::info!(room = %self.room, "Joined room");

        let ping_enabled = !self.ping_interval.is_zero();
        let liveness_window = self.ping_interval + self.pong_timeout;
        let mut ping = tokio::time::interval(self.ping_interval.max(Duration::from_millis(1)));
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ping.tick().await; // skip immediate tick
        let deadline = tokio::time::sleep(liveness_window);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    conn.close().await;
                    return SessionEnd::Shutdown;
                }

                Some(signal) = self.signals.recv() => match signal {
                    Lifecycle::Reconnect => {
                        tracing::info!("Reconnect requested");
                        conn.close().await;
                        return SessionEnd::ReconnectRequested;
                    }
                    // Connected and pushing, nothing to catch up on
                    Lifecycle::VisibilityRegained => {}
                },

                _ = ping.tick(), if ping_enabled => {
                    if let Err(e) = conn.send(&ClientFrame::Ping).await {
                        tracing::warn!(error = %e, "Ping failed, disconnecting");
                        return SessionEnd::Dropped;
                    }
                }

                _ = &mut deadline, if ping_enabled => {
                    tracing::warn!(
                        window_ms = liveness_window.as_millis() as u64,
                        "No frame within liveness window, disconnecting"
                    );
                    conn.close().await;
                    return SessionEnd::Dropped;
                }

                frame = conn.next_frame() => match frame {
                    Some(Ok(inbound)) => {
                        deadline.as_mut().reset(Instant::now() + liveness_window);
                        if let Inbound::Event(event) = inbound {
                            self.adapter.apply(event);
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Realtime channel error, disconnecting");
                        return SessionEnd::Dropped;
                    }
                    None => {
                        tracing::info!("Realtime channel closed");
                        return SessionEnd::Dropped;
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::InMemoryOrderApi;
    use crate::realtime::MemoryChannel;
    use crate::store::OrderStore;
    use shared::message::ServerEvent;
    use shared::order::Order;

    struct Harness {
        api: Arc<InMemoryOrderApi>,
        channel: MemoryChannel,
        store: OrderStore,
        handle: WorkerHandle,
        shutdown: CancellationToken,
    }

    fn spawn(sync: SyncConfig) -> Harness {
        let api = Arc::new(InMemoryOrderApi::new(vec![Order::new(1, 1)]));
        let channel = MemoryChannel::new();
        let store = OrderStore::new();
        let shutdown = CancellationToken::new();
        let adapter = EventAdapter::new(store.clone(), Duration::ZERO, shutdown.clone());
        let loader = SnapshotLoader::new(api.clone(), store.clone());
        let worker = RealtimeWorker::new(
            Arc::new(channel.clone()),
            adapter,
            loader,
            &sync,
            shutdown.clone(),
        );
        let handle = worker.handle();
        tokio::spawn(worker.run());
        Harness {
            api,
            channel,
            store,
            handle,
            shutdown,
        }
    }

    async fn wait_for_state(handle: &WorkerHandle, state: ConnectionState) {
        let mut rx = handle.subscribe_state();
        rx.wait_for(|s| *s == state).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_joins_room_and_loads_snapshot() {
        let h = spawn(SyncConfig::default());
        wait_for_state(&h.handle, ConnectionState::Connected).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(h.api.fetch_count(), 1);
        assert_eq!(h.store.len(), 1);
        match h.channel.sent_frames().first() {
            Some(ClientFrame::Join(join)) => {
                assert_eq!(join.room, "kitchen");
                assert!(join.client_id.is_some());
            }
            other => panic!("expected join frame, got {other:?}"),
        }
        h.shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_link_is_dropped_and_reconnected() {
        let sync = SyncConfig::default()
            .with_ping_interval(Duration::from_secs(1))
            .with_pong_timeout(Duration::from_secs(1));
        let h = spawn(sync);
        h.channel.set_manual_pong(true);
        h.channel.wait_for_connects(1).await;

        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(h.channel.connect_count() >= 2);
        assert!(h.channel.sent_frames().contains(&ClientFrame::Ping));
        h.shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_pongs_keep_link_alive() {
        let sync = SyncConfig::default()
            .with_ping_interval(Duration::from_secs(1))
            .with_pong_timeout(Duration::from_millis(500));
        let h = spawn(sync);
        h.channel.wait_for_connects(1).await;

        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(h.channel.connect_count(), 1);
        assert_eq!(h.handle.state(), ConnectionState::Connected);
        h.shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_any_inbound_frame_keeps_link_alive() {
        let sync = SyncConfig::default()
            .with_ping_interval(Duration::from_secs(1))
            .with_pong_timeout(Duration::from_secs(1));
        let h = spawn(sync);
        h.channel.set_manual_pong(true);
        h.channel.wait_for_connects(1).await;

        for _ in 0..6 {
            tokio::time::sleep(Duration::from_secs(1)).await;
            h.channel.push_raw("keepalive");
        }

        assert_eq!(h.channel.connect_count(), 1);
        assert_eq!(h.handle.state(), ConnectionState::Connected);
        h.shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_requested_reconnect_keeps_initial_backoff() {
        let sync = SyncConfig::default()
            .with_reconnect_delay(Duration::from_millis(500), Duration::from_secs(10));
        let h = spawn(sync);
        h.channel.wait_for_connects(1).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        // The immediate attempt after the reconnect request is refused
        h.channel.set_refuse(true);
        let requested_at = Instant::now();
        assert!(h.handle.signal(Lifecycle::Reconnect));
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.channel.set_refuse(false);

        h.channel.wait_for_connects(2).await;
        let waited = requested_at.elapsed();
        assert!(waited >= Duration::from_millis(500) && waited < Duration::from_secs(1));
        h.shutdown.cancel();
    }

    /// Snapshot endpoint that never answers
    struct StalledApi;

    #[async_trait::async_trait]
    impl crate::http::OrderApi for StalledApi {
        async fn fetch_daily_orders(&self) -> crate::ClientResult<Vec<Order>> {
            std::future::pending().await
        }

        async fn update_order_info(
            &self,
            order_id: shared::order::OrderId,
            _info: &shared::order::UpdateOrderInfo,
        ) -> crate::ClientResult<Order> {
            Err(crate::ClientError::NotFound(format!("order {order_id}")))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_stalled_refetch() {
        let channel = MemoryChannel::new();
        let store = OrderStore::new();
        let shutdown = CancellationToken::new();
        let adapter = EventAdapter::new(store.clone(), Duration::ZERO, shutdown.clone());
        let loader = SnapshotLoader::new(Arc::new(StalledApi), store);
        let worker = RealtimeWorker::new(
            Arc::new(channel.clone()),
            adapter,
            loader,
            &SyncConfig::default(),
            shutdown.clone(),
        );
        let task = tokio::spawn(worker.run());
        channel.wait_for_connects(1).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("worker should stop without waiting for the fetch")
            .unwrap();
        assert!(!channel.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_apply_in_arrival_order() {
        let h = spawn(SyncConfig::default());
        wait_for_state(&h.handle, ConnectionState::Connected).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        h.channel.push(ServerEvent::CreatedOrder(Order::new(2, 2)));
        h.channel.push(ServerEvent::CreatedOrder(Order::new(3, 3)));
        h.channel.push(ServerEvent::DeletedOrder(2.into()));
        tokio::time::sleep(Duration::from_millis(10)).await;

        let ids: Vec<i64> = h.store.orders().iter().map(|o| o.order_id).collect();
        assert_eq!(ids, vec![3, 1]);
        h.shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_publishes_disconnected() {
        let h = spawn(SyncConfig::default());
        wait_for_state(&h.handle, ConnectionState::Connected).await;

        h.shutdown.cancel();
        wait_for_state(&h.handle, ConnectionState::Disconnected).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!h.handle.signal(Lifecycle::Reconnect));
    }
}
