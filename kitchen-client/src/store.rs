//! Order repository - the single source of truth for the board
//!
//! [`OrderRepository`] is the plain in-memory state with synchronous mutation
//! primitives. [`OrderStore`] is the owned handle the rest of the client
//! mutates it through; after every mutation it publishes an immutable
//! [`BoardView`] to observers over a watch channel. Presentation code only
//! ever sees views.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use shared::order::{DailyOrderNumber, Order, OrderId, StatusFilter};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tokio::sync::watch;

/// Result of an [`OrderRepository::upsert`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// New order, prepended
    Inserted,
    /// Existing order replaced in place
    Replaced,
    /// Identical to the stored order
    Unchanged,
}

/// In-memory order state
#[derive(Debug, Clone, Default)]
pub struct OrderRepository {
    /// Newest first
    orders: Vec<Order>,
    multi_select_mode: bool,
    selected: BTreeSet<OrderId>,
    /// Orders inside their deletion grace window
    leaving: BTreeSet<DailyOrderNumber>,
    snapshot_error: Option<String>,
    last_refreshed_at: Option<DateTime<Utc>>,
}

impl OrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    // ========== Orders ==========

    /// Overwrite the whole list with a fetched snapshot
    ///
    /// Selections and leaving flags of orders missing from the snapshot are
    /// dropped; the snapshot error is cleared.
    pub fn replace_all(&mut self, orders: Vec<Order>) {
        let mut seen = HashSet::with_capacity(orders.len());
        let mut unique = Vec::with_capacity(orders.len());
        for order in orders {
            if seen.insert(order.order_id) {
                unique.push(order);
            } else {
                tracing::warn!(order_id = order.order_id, "Duplicate order in snapshot, keeping first");
            }
        }

        self.orders = unique;
        self.selected.retain(|id| seen.contains(id));
        let daily: HashSet<DailyOrderNumber> =
            self.orders.iter().map(|o| o.daily_order_number).collect();
        self.leaving.retain(|n| daily.contains(n));
        self.snapshot_error = None;
        self.last_refreshed_at = Some(Utc::now());
    }

    /// Replace in place when the order id is known, otherwise prepend
    ///
    /// A status that would move the stored order backward is not applied;
    /// the rest of the record still is.
    pub fn upsert(&mut self, mut order: Order) -> UpsertOutcome {
        let position = self.orders.iter().position(|o| o.order_id == order.order_id);
        let Some(index) = position else {
            self.orders.insert(0, order);
            return UpsertOutcome::Inserted;
        };
        let existing = &mut self.orders[index];

        if !existing.order_status.can_become(order.order_status) {
            tracing::warn!(
                order_id = order.order_id,
                stored = %existing.order_status,
                incoming = %order.order_status,
                "Ignoring backward status change"
            );
            order.order_status = existing.order_status;
        }

        if *existing == order {
            return UpsertOutcome::Unchanged;
        }
        *existing = order;
        UpsertOutcome::Replaced
    }

    /// Replace an order that is already on the board; absent ids are left out
    ///
    /// Same backward-status rule as [`upsert`](Self::upsert), but never
    /// inserts. Returns `None` when the order is not on the board.
    pub fn replace_existing(&mut self, order: Order) -> Option<UpsertOutcome> {
        self.get(order.order_id)?;
        Some(self.upsert(order))
    }

    /// Remove the first order with this daily number; absent is a no-op
    pub fn remove(&mut self, daily_order_number: DailyOrderNumber) -> Option<Order> {
        self.leaving.remove(&daily_order_number);
        let index = self
            .orders
            .iter()
            .position(|o| o.daily_order_number == daily_order_number)?;
        let removed = self.orders.remove(index);
        self.selected.remove(&removed.order_id);
        Some(removed)
    }

    /// Flag an order as leaving; returns whether it is on the board
    pub fn mark_leaving(&mut self, daily_order_number: DailyOrderNumber) -> bool {
        let present = self.find_by_daily_number(daily_order_number).is_some();
        if present {
            self.leaving.insert(daily_order_number);
        }
        present
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn get(&self, order_id: OrderId) -> Option<&Order> {
        self.orders.iter().find(|o| o.order_id == order_id)
    }

    pub fn find_by_daily_number(&self, daily_order_number: DailyOrderNumber) -> Option<&Order> {
        self.orders
            .iter()
            .find(|o| o.daily_order_number == daily_order_number)
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn is_leaving(&self, daily_order_number: DailyOrderNumber) -> bool {
        self.leaving.contains(&daily_order_number)
    }

    // ========== Multi-select ==========

    pub fn enter_multi_select(&mut self) {
        self.multi_select_mode = true;
        self.selected.clear();
    }

    pub fn exit_multi_select(&mut self) {
        self.multi_select_mode = false;
        self.selected.clear();
    }

    /// Returns whether the order is selected afterwards
    pub fn toggle_select(&mut self, order_id: OrderId) -> bool {
        if self.selected.remove(&order_id) {
            false
        } else {
            self.selected.insert(order_id);
            true
        }
    }

    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }

    pub fn deselect(&mut self, order_ids: &[OrderId]) {
        for id in order_ids {
            self.selected.remove(id);
        }
    }

    pub fn multi_select_mode(&self) -> bool {
        self.multi_select_mode
    }

    pub fn selected_order_ids(&self) -> &BTreeSet<OrderId> {
        &self.selected
    }

    // ========== Snapshot state ==========

    pub fn set_snapshot_error(&mut self, error: impl Into<String>) {
        self.snapshot_error = Some(error.into());
    }

    pub fn snapshot_error(&self) -> Option<&str> {
        self.snapshot_error.as_deref()
    }

    /// Immutable copy for observers
    pub fn view(&self, revision: u64) -> BoardView {
        BoardView {
            revision,
            orders: self.orders.clone(),
            multi_select_mode: self.multi_select_mode,
            selected_order_ids: self.selected.clone(),
            leaving: self.leaving.clone(),
            snapshot_error: self.snapshot_error.clone(),
            last_refreshed_at: self.last_refreshed_at,
        }
    }
}

/// Read-only board state handed to presentation
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BoardView {
    /// Bumped on every change
    pub revision: u64,
    /// Newest first
    pub orders: Vec<Order>,
    pub multi_select_mode: bool,
    pub selected_order_ids: BTreeSet<OrderId>,
    /// Daily numbers inside their deletion grace window
    pub leaving: BTreeSet<DailyOrderNumber>,
    /// Last snapshot failure, cleared by the next successful snapshot
    pub snapshot_error: Option<String>,
    pub last_refreshed_at: Option<DateTime<Utc>>,
}

impl BoardView {
    pub fn filter<'a>(&'a self, filter: &'a StatusFilter) -> impl Iterator<Item = &'a Order> + 'a {
        self.orders
            .iter()
            .filter(move |o| filter.matches(o.order_status))
    }

    pub fn is_selected(&self, order_id: OrderId) -> bool {
        self.selected_order_ids.contains(&order_id)
    }

    pub fn is_leaving(&self, daily_order_number: DailyOrderNumber) -> bool {
        self.leaving.contains(&daily_order_number)
    }
}

struct StoreInner {
    repo: OrderRepository,
    revision: u64,
}

/// Owned handle over the repository
///
/// Cloning the handle shares the same state. The lock is only held for the
/// duration of one synchronous mutation and never across an `.await`.
#[derive(Clone)]
pub struct OrderStore {
    inner: Arc<Mutex<StoreInner>>,
    view_tx: Arc<watch::Sender<Arc<BoardView>>>,
}

impl std::fmt::Debug for OrderStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("OrderStore")
            .field("orders", &inner.repo.len())
            .field("revision", &inner.revision)
            .finish()
    }
}

impl Default for OrderStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderStore {
    pub fn new() -> Self {
        let (view_tx, _) = watch::channel(Arc::new(BoardView::default()));
        Self {
            inner: Arc::new(Mutex::new(StoreInner {
                repo: OrderRepository::new(),
                revision: 0,
            })),
            view_tx: Arc::new(view_tx),
        }
    }

    /// Run one mutation and publish the resulting view
    fn mutate<R>(&self, f: impl FnOnce(&mut OrderRepository) -> R) -> R {
        self.mutate_if(f, |_| true)
    }

    /// Run one mutation, publishing only when `changed` holds for its result
    fn mutate_if<R>(
        &self,
        f: impl FnOnce(&mut OrderRepository) -> R,
        changed: impl FnOnce(&R) -> bool,
    ) -> R {
        let mut inner = self.inner.lock();
        let result = f(&mut inner.repo);
        if changed(&result) {
            inner.revision += 1;
            let view = Arc::new(inner.repo.view(inner.revision));
            self.view_tx.send_replace(view);
        }
        result
    }

    /// Receive a new view after every change
    pub fn subscribe(&self) -> watch::Receiver<Arc<BoardView>> {
        self.view_tx.subscribe()
    }

    /// Latest published view
    pub fn view(&self) -> Arc<BoardView> {
        self.view_tx.borrow().clone()
    }

    pub fn replace_all(&self, orders: Vec<Order>) {
        let count = orders.len();
        self.mutate(|repo| repo.replace_all(orders));
        tracing::debug!(count, "Board replaced from snapshot");
    }

    pub fn upsert(&self, order: Order) -> UpsertOutcome {
        self.mutate_if(
            |repo| repo.upsert(order),
            |outcome| *outcome != UpsertOutcome::Unchanged,
        )
    }

    /// Update an order in place; `None` when it is no longer on the board
    pub fn replace_existing(&self, order: Order) -> Option<UpsertOutcome> {
        self.mutate_if(
            |repo| repo.replace_existing(order),
            |outcome| matches!(outcome, Some(o) if *o != UpsertOutcome::Unchanged),
        )
    }

    pub fn remove(&self, daily_order_number: DailyOrderNumber) -> Option<Order> {
        self.mutate_if(|repo| repo.remove(daily_order_number), Option::is_some)
    }

    pub fn mark_leaving(&self, daily_order_number: DailyOrderNumber) -> bool {
        self.mutate_if(|repo| repo.mark_leaving(daily_order_number), |present| *present)
    }

    pub fn enter_multi_select(&self) {
        self.mutate(OrderRepository::enter_multi_select)
    }

    pub fn exit_multi_select(&self) {
        self.mutate(OrderRepository::exit_multi_select)
    }

    pub fn toggle_select(&self, order_id: OrderId) -> bool {
        self.mutate(|repo| repo.toggle_select(order_id))
    }

    pub fn clear_selection(&self) {
        self.mutate(OrderRepository::clear_selection)
    }

    pub fn deselect(&self, order_ids: &[OrderId]) {
        self.mutate(|repo| repo.deselect(order_ids))
    }

    pub fn set_snapshot_error(&self, error: impl Into<String>) {
        let error = error.into();
        self.mutate(|repo| repo.set_snapshot_error(error))
    }

    pub fn get(&self, order_id: OrderId) -> Option<Order> {
        self.inner.lock().repo.get(order_id).cloned()
    }

    pub fn find_by_daily_number(&self, daily_order_number: DailyOrderNumber) -> Option<Order> {
        self.inner
            .lock()
            .repo
            .find_by_daily_number(daily_order_number)
            .cloned()
    }

    pub fn orders(&self) -> Vec<Order> {
        self.inner.lock().repo.orders().to_vec()
    }

    pub fn selected_order_ids(&self) -> Vec<OrderId> {
        self.inner
            .lock()
            .repo
            .selected_order_ids()
            .iter()
            .copied()
            .collect()
    }

    pub fn multi_select_mode(&self) -> bool {
        self.inner.lock().repo.multi_select_mode()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().repo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().repo.is_empty()
    }
}
