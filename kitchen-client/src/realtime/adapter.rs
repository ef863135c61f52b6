//! Applies server events to the order store

use std::time::Duration;

use shared::message::ServerEvent;
use shared::order::{DailyOrderNumber, Order};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::store::{OrderStore, UpsertOutcome};

/// Notice capacity; slow subscribers lag instead of blocking the adapter
const NOTICE_CAPACITY: usize = 64;

/// Side-effect hook for sound, toasts and similar
#[derive(Debug, Clone, PartialEq)]
pub enum OrderNotice {
    Created(Order),
    Updated(Order),
    /// Order entered its grace window and will leave the board
    Deleted(DailyOrderNumber),
}

/// Translates server events into store mutations
///
/// Events are applied synchronously in the order they are passed in.
/// Deletions first flag the order as leaving and remove it after the grace
/// delay on a spawned timer that ends early on shutdown.
#[derive(Clone)]
pub struct EventAdapter {
    store: OrderStore,
    notices: broadcast::Sender<OrderNotice>,
    deletion_grace: Duration,
    shutdown: CancellationToken,
}

impl EventAdapter {
    pub fn new(store: OrderStore, deletion_grace: Duration, shutdown: CancellationToken) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            store,
            notices,
            deletion_grace,
            shutdown,
        }
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<OrderNotice> {
        self.notices.subscribe()
    }

    pub fn apply(&self, event: ServerEvent) {
        match event {
            ServerEvent::CreatedOrder(order) => {
                tracing::info!(
                    order_id = order.order_id,
                    daily_order_number = order.daily_order_number,
                    "Order created"
                );
                self.store.upsert(order.clone());
                self.notify(OrderNotice::Created(order));
            }
            ServerEvent::UpdatedOrderItems(order) => {
                let outcome = self.store.upsert(order.clone());
                tracing::debug!(order_id = order.order_id, ?outcome, "Order updated");
                if outcome != UpsertOutcome::Unchanged {
                    self.notify(OrderNotice::Updated(order));
                }
            }
            ServerEvent::DeletedOrder(payload) => {
                self.schedule_removal(payload.daily_order_number());
            }
            ServerEvent::Pong => {}
        }
    }

    fn schedule_removal(&self, daily_order_number: DailyOrderNumber) {
        if !self.store.mark_leaving(daily_order_number) {
            tracing::debug!(daily_order_number, "Deletion for order not on the board");
            return;
        }
        self.notify(OrderNotice::Deleted(daily_order_number));

        if self.deletion_grace.is_zero() {
            self.store.remove(daily_order_number);
            return;
        }

        let store = self.store.clone();
        let shutdown = self.shutdown.clone();
        let grace = self.deletion_grace;
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep(grace) => {
                    if store.remove(daily_order_number).is_some() {
                        tracing::debug!(daily_order_number, "Order removed after grace delay");
                    }
                }
            }
        });
    }

    fn notify(&self, notice: OrderNotice) {
        // No subscribers is fine
        let _ = self.notices.send(notice);
    }
}
