//! Snapshot loader - full refetch of the day's orders

use std::sync::Arc;

use shared::order::Order;

use crate::http::OrderApi;
use crate::store::OrderStore;
use crate::ClientResult;

/// Fetches the authoritative order list and overwrites the store with it
///
/// Every refresh is a total overwrite, so calling it again after missed or
/// duplicated realtime events heals the board.
#[derive(Clone)]
pub struct SnapshotLoader {
    api: Arc<dyn OrderApi>,
    store: OrderStore,
}

impl SnapshotLoader {
    pub fn new(api: Arc<dyn OrderApi>, store: OrderStore) -> Self {
        Self { api, store }
    }

    /// Fetch without touching the store
    pub async fn fetch_snapshot(&self) -> ClientResult<Vec<Order>> {
        self.api.fetch_daily_orders().await
    }

    /// Fetch and replace the store content
    ///
    /// On failure the current orders stay on the board and the error is
    /// recorded in the store's snapshot error state.
    pub async fn refresh(&self) -> ClientResult<usize> {
        match self.fetch_snapshot().await {
            Ok(orders) => {
                let count = orders.len();
                self.store.replace_all(orders);
                tracing::info!(count, "Snapshot loaded");
                Ok(count)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Snapshot fetch failed, keeping current board");
                self.store.set_snapshot_error(e.to_string());
                Err(e)
            }
        }
    }
}
