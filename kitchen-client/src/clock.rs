//! Clock source and elapsed-time helpers for order cards

use chrono::{DateTime, Utc};
use shared::order::{Order, OrderStatus};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Publishes the current time on a fixed tick until cancelled
pub struct ClockSource;

impl ClockSource {
    /// Spawn the ticking task and return the receiving side
    ///
    /// The receiver holds the time of the latest tick. When the token is
    /// cancelled the task ends and the receiver keeps its last value.
    pub fn spawn(tick: Duration, shutdown: CancellationToken) -> watch::Receiver<DateTime<Utc>> {
        let (tx, rx) = watch::channel(Utc::now());
        let tick = tick.max(Duration::from_millis(10));

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        if tx.send(Utc::now()).is_err() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("Clock source stopped");
        });

        rx
    }
}

/// `HH:MM:SS`, hours are not wrapped at 24
pub fn format_elapsed(elapsed: chrono::Duration) -> String {
    let total = elapsed.num_seconds().max(0);
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

/// Time since the order was created, zero if its timestamp is in the future
pub fn elapsed_since(order: &Order, now: DateTime<Utc>) -> chrono::Duration {
    (now - order.created_at).max(chrono::Duration::zero())
}

/// Cooking for longer than `threshold`
pub fn is_delayed(order: &Order, now: DateTime<Utc>, threshold: Duration) -> bool {
    order.order_status == OrderStatus::Cooking && exceeds(elapsed_since(order, now), threshold)
}

/// Created within the last `window`
pub fn is_new(order: &Order, now: DateTime<Utc>, window: Duration) -> bool {
    !exceeds(elapsed_since(order, now), window)
}

fn exceeds(elapsed: chrono::Duration, limit: Duration) -> bool {
    // Out-of-range limits can never be exceeded.
    chrono::Duration::from_std(limit).is_ok_and(|limit| elapsed > limit)
}
