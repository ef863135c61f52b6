//! Status mutator - staff-triggered status changes
//!
//! Every request is checked against the local [`TransitionTable`] before it
//! leaves the client. Only the server's confirmed order is written to the
//! store; a failed request leaves the store untouched.

use std::sync::Arc;

use futures::future::join_all;
use shared::order::{Order, OrderId, OrderStatus, TransitionTable, UpdateOrderInfo};

use crate::http::OrderApi;
use crate::store::OrderStore;
use crate::{ClientError, ClientResult};

/// Per-order outcome of a batch request
pub type BatchOutcome = Vec<(OrderId, ClientResult<Order>)>;

#[derive(Clone)]
pub struct StatusMutator {
    api: Arc<dyn OrderApi>,
    store: OrderStore,
    transitions: TransitionTable,
}

impl StatusMutator {
    pub fn new(api: Arc<dyn OrderApi>, store: OrderStore, transitions: TransitionTable) -> Self {
        Self {
            api,
            store,
            transitions,
        }
    }

    pub fn transitions(&self) -> &TransitionTable {
        &self.transitions
    }

    /// Local legality check, no request is sent
    fn check(&self, order_id: OrderId, next: OrderStatus) -> ClientResult<()> {
        let order = self
            .store
            .get(order_id)
            .ok_or_else(|| ClientError::NotFound(format!("order {order_id}")))?;
        if !self.transitions.allows(order.order_status, next) {
            return Err(ClientError::InvalidTransition {
                order_id,
                from: order.order_status,
                to: next,
            });
        }
        Ok(())
    }

    /// Request `order_id → next` and apply the confirmed order
    pub async fn advance_status(&self, order_id: OrderId, next: OrderStatus) -> ClientResult<Order> {
        if let Err(e) = self.check(order_id, next) {
            tracing::debug!(order_id, to = %next, error = %e, "Status change rejected locally");
            return Err(e);
        }

        let order = self
            .api
            .update_order_info(order_id, &UpdateOrderInfo::status(next))
            .await
            .inspect_err(|e| {
                tracing::warn!(order_id, to = %next, error = %e, "Status change failed");
            })?;

        tracing::info!(order_id, status = %order.order_status, "Status change confirmed");
        if self.store.replace_existing(order.clone()).is_none() {
            tracing::debug!(order_id, "Order left the board before confirmation, not restored");
        }
        Ok(order)
    }

    /// Advance along the primary step out of the current status
    pub async fn advance(&self, order_id: OrderId) -> ClientResult<Order> {
        let current = self
            .store
            .get(order_id)
            .ok_or_else(|| ClientError::NotFound(format!("order {order_id}")))?
            .order_status;
        let next = self
            .transitions
            .next_step(current)
            .ok_or(ClientError::InvalidTransition {
                order_id,
                from: current,
                to: current,
            })?;
        self.advance_status(order_id, next).await
    }

    /// Same transition for every id, each request independent
    ///
    /// Results keep the order of `order_ids`. A failure never rolls back the
    /// orders that succeeded.
    pub async fn advance_batch(&self, order_ids: &[OrderId], next: OrderStatus) -> BatchOutcome {
        let results = join_all(
            order_ids
                .iter()
                .map(|&order_id| self.advance_status(order_id, next)),
        )
        .await;
        order_ids.iter().copied().zip(results).collect()
    }

    /// Batch over the current multi-select selection
    ///
    /// Orders that changed are deselected; failed ones stay selected so staff
    /// can retry them. Multi-select mode ends once everything succeeded.
    pub async fn advance_selected(&self, next: OrderStatus) -> BatchOutcome {
        let selected = self.store.selected_order_ids();
        if selected.is_empty() {
            return Vec::new();
        }

        let outcome = self.advance_batch(&selected, next).await;
        let succeeded: Vec<OrderId> = outcome
            .iter()
            .filter(|(_, result)| result.is_ok())
            .map(|(id, _)| *id)
            .collect();
        let failed = outcome.len() - succeeded.len();

        if failed == 0 {
            self.store.exit_multi_select();
        } else {
            self.store.deselect(&succeeded);
        }
        tracing::info!(
            to = %next,
            succeeded = succeeded.len(),
            failed,
            "Batch status change finished"
        );
        outcome
    }
}
