//! KitchenClient - wires the reconciliation core together
//!
//! The client owns one [`OrderStore`] and the components that write to it:
//! the snapshot loader, the status mutator and the realtime worker. The host
//! application reads [`BoardView`]s, calls the mutator, and forwards
//! visibility changes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::clock::ClockSource;
use crate::config::KitchenConfig;
use crate::http::{NetworkOrderApi, OrderApi};
use crate::mutator::StatusMutator;
use crate::realtime::worker::WorkerHandle;
use crate::realtime::{
    ConnectionState, EventAdapter, Lifecycle, OrderNotice, RealtimeChannel, RealtimeWorker,
    WsChannel,
};
use crate::snapshot::SnapshotLoader;
use crate::store::{BoardView, OrderStore};
use crate::{ClientError, ClientResult};

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`KitchenClient`]
///
/// # Example
///
/// ```no_run
/// use kitchen_client::{KitchenClient, KitchenConfig};
///
/// # async fn run() -> kitchen_client::ClientResult<()> {
/// let client = KitchenClient::builder(KitchenConfig::from_env()).build()?;
/// client.start()?;
/// let mut board = client.subscribe_board();
/// board.changed().await.ok();
/// client.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct KitchenClientBuilder {
    config: KitchenConfig,
    api: Option<Arc<dyn OrderApi>>,
    channel: Option<Arc<dyn RealtimeChannel>>,
}

impl KitchenClientBuilder {
    pub fn new(config: KitchenConfig) -> Self {
        Self {
            config,
            api: None,
            channel: None,
        }
    }

    /// Use a custom REST implementation instead of [`NetworkOrderApi`]
    pub fn api(mut self, api: Arc<dyn OrderApi>) -> Self {
        self.api = Some(api);
        self
    }

    /// Use a custom channel instead of [`WsChannel`]
    pub fn channel(mut self, channel: Arc<dyn RealtimeChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// # Errors
    ///
    /// Returns `ClientError::Config` if the HTTP client cannot be created.
    pub fn build(self) -> ClientResult<KitchenClient> {
        let config = self.config;
        let api: Arc<dyn OrderApi> = match self.api {
            Some(api) => api,
            None => Arc::new(NetworkOrderApi::new(&config)?),
        };
        let channel: Arc<dyn RealtimeChannel> = self
            .channel
            .unwrap_or_else(|| Arc::new(WsChannel::from_config(&config)));

        let shutdown = CancellationToken::new();
        let store = OrderStore::new();
        let loader = SnapshotLoader::new(api.clone(), store.clone());
        let mutator = StatusMutator::new(api, store.clone(), config.sync.transitions.clone());
        let adapter = EventAdapter::new(store.clone(), config.sync.deletion_grace, shutdown.clone());
        let worker = RealtimeWorker::new(
            channel,
            adapter.clone(),
            loader.clone(),
            &config.sync,
            shutdown.clone(),
        )
        .with_room(config.room.clone());

        Ok(KitchenClient {
            worker_handle: worker.handle(),
            worker: Mutex::new(Some(worker)),
            task: Mutex::new(None),
            config,
            store,
            loader,
            mutator,
            adapter,
            shutdown,
        })
    }
}

// ============================================================================
// Client
// ============================================================================

pub struct KitchenClient {
    config: KitchenConfig,
    store: OrderStore,
    loader: SnapshotLoader,
    mutator: StatusMutator,
    adapter: EventAdapter,
    worker: Mutex<Option<RealtimeWorker>>,
    worker_handle: WorkerHandle,
    task: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for KitchenClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KitchenClient")
            .field("base_url", &self.config.base_url)
            .field("ws_url", &self.config.ws_url)
            .field("state", &self.connection_state())
            .finish()
    }
}

impl KitchenClient {
    pub fn builder(config: KitchenConfig) -> KitchenClientBuilder {
        KitchenClientBuilder::new(config)
    }

    /// Spawn the realtime worker
    ///
    /// The worker connects, joins the room and loads the first snapshot.
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` when called twice.
    pub fn start(&self) -> ClientResult<()> {
        let worker = self
            .worker
            .lock()
            .take()
            .ok_or_else(|| ClientError::Config("client already started".into()))?;
        tracing::info!(
            base_url = %self.config.base_url,
            ws_url = %self.config.ws_url,
            "Kitchen client starting"
        );
        *self.task.lock() = Some(tokio::spawn(worker.run()));
        Ok(())
    }

    /// Cancel background tasks and wait for the worker to stop
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            tracing::error!(error = %e, "Realtime worker task failed");
        }
        tracing::info!("Kitchen client stopped");
    }

    pub fn config(&self) -> &KitchenConfig {
        &self.config
    }

    pub fn store(&self) -> &OrderStore {
        &self.store
    }

    pub fn mutator(&self) -> &StatusMutator {
        &self.mutator
    }

    pub fn loader(&self) -> &SnapshotLoader {
        &self.loader
    }

    // ========== Presentation surface ==========

    pub fn subscribe_board(&self) -> watch::Receiver<Arc<BoardView>> {
        self.store.subscribe()
    }

    pub fn board(&self) -> Arc<BoardView> {
        self.store.view()
    }

    pub fn notices(&self) -> broadcast::Receiver<OrderNotice> {
        self.adapter.subscribe_notices()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.worker_handle.state()
    }

    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionState> {
        self.worker_handle.subscribe_state()
    }

    /// A ticking clock for elapsed-time displays, stopped on shutdown
    pub fn subscribe_clock(&self) -> watch::Receiver<DateTime<Utc>> {
        ClockSource::spawn(self.config.sync.clock_tick, self.shutdown.child_token())
    }

    // ========== Lifecycle signals ==========

    /// The display came back to the foreground
    pub fn visibility_regained(&self) {
        if !self.worker_handle.signal(Lifecycle::VisibilityRegained) {
            tracing::debug!("Visibility signal ignored, worker not running");
        }
    }

    /// Force a reconnect right away
    pub fn reconnect(&self) {
        if !self.worker_handle.signal(Lifecycle::Reconnect) {
            tracing::debug!("Reconnect signal ignored, worker not running");
        }
    }

    /// Manual snapshot refresh
    pub async fn refresh(&self) -> ClientResult<usize> {
        self.loader.refresh().await
    }
}

impl Drop for KitchenClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
