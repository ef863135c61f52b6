use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use kitchen_client::clock::{elapsed_since, format_elapsed, is_delayed, is_new};
use kitchen_client::logger::init_logger;
use kitchen_client::{BoardView, KitchenClient, KitchenConfig, SyncConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment and logging
    dotenv::dotenv().ok();
    let config = KitchenConfig::from_env();
    init_logger(&config.log_level, config.log_json, config.log_dir.as_deref())?;

    tracing::info!("Kitchen display starting...");

    // 2. Client
    let client = KitchenClient::builder(config).build()?;
    client.start()?;

    let mut board = client.subscribe_board();
    let mut connection = client.subscribe_connection();
    let mut notices = client.notices();

    // 3. Render until Ctrl-C
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl-C received, shutting down");
                break;
            }
            changed = board.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = board.borrow_and_update().clone();
                println!("{}", render(&view, &client.config().sync, Utc::now()));
            }
            changed = connection.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *connection.borrow_and_update();
                println!("[connection] {state}");
            }
            notice = notices.recv() => {
                if let Ok(notice) = notice {
                    tracing::debug!(?notice, "Order notice");
                }
            }
        }
    }

    client.shutdown().await;
    Ok(())
}

fn render(view: &BoardView, sync: &SyncConfig, now: DateTime<Utc>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "==== board r{} ({} orders) ====", view.revision, view.orders.len());
    if let Some(error) = &view.snapshot_error {
        let _ = writeln!(out, "!! snapshot failed: {error}");
    }

    for (title, filter) in [("IN PROGRESS", &sync.in_progress), ("READY", &sync.ready)] {
        let _ = writeln!(out, "-- {title} --");
        for order in view.filter(filter) {
            let mut flags = Vec::new();
            if is_new(order, now, sync.new_window) {
                flags.push("NEW");
            }
            if is_delayed(order, now, sync.delayed_after) {
                flags.push("DELAYED");
            }
            if view.is_leaving(order.daily_order_number) {
                flags.push("LEAVING");
            }
            if view.is_selected(order.order_id) {
                flags.push("SELECTED");
            }
            let _ = writeln!(
                out,
                "#{:<4} {:<9} {:<11} {} {}",
                order.daily_order_number,
                order.order_type,
                order.order_status,
                format_elapsed(elapsed_since(order, now)),
                flags.join(" ")
            );
            for item in &order.items {
                let _ = writeln!(out, "       {} x {}", item.quantity, item.product_name);
            }
            let actions: Vec<String> = sync
                .transitions
                .targets(order.order_status)
                .map(|status| status.to_string())
                .collect();
            if !actions.is_empty() {
                let _ = writeln!(out, "       -> {}", actions.join(" | "));
            }
        }
    }
    out
}
