//! End-to-end reconciliation tests over the in-memory backend and channel

use std::sync::Arc;
use std::time::Duration;

use kitchen_client::{
    ClientError, ConnectionState, InMemoryOrderApi, KitchenClient, KitchenConfig, MemoryChannel,
    Order, OrderNotice, OrderStatus, ServerEvent, SyncConfig,
};
use tokio::time::Instant;

struct Fixture {
    api: Arc<InMemoryOrderApi>,
    channel: MemoryChannel,
    client: KitchenClient,
}

fn fixture(orders: Vec<Order>, sync: SyncConfig) -> Fixture {
    let api = Arc::new(InMemoryOrderApi::new(orders));
    let channel = MemoryChannel::new();
    let client = KitchenClient::builder(KitchenConfig::default().with_sync(sync))
        .api(api.clone())
        .channel(Arc::new(channel.clone()))
        .build()
        .unwrap();
    Fixture {
        api,
        channel,
        client,
    }
}

/// Let spawned tasks run to their next timer
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

fn board_ids(client: &KitchenClient) -> Vec<i64> {
    client.board().orders.iter().map(|o| o.order_id).collect()
}

#[tokio::test(start_paused = true)]
async fn created_then_deleted_leaves_no_order() {
    let f = fixture(vec![], SyncConfig::default());
    f.client.start().unwrap();
    f.channel.wait_for_connects(1).await;
    settle().await;

    f.channel.push(ServerEvent::CreatedOrder(Order::new(10, 4)));
    f.channel.push(ServerEvent::DeletedOrder(4.into()));
    settle().await;

    let view = f.client.board();
    assert_eq!(view.orders.len(), 1);
    assert!(view.is_leaving(4));

    tokio::time::sleep(SyncConfig::default().deletion_grace).await;

    assert!(f.client.board().orders.is_empty());
    f.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn created_order_goes_before_snapshot_orders() {
    let f = fixture(vec![Order::new(1, 1)], SyncConfig::default());
    f.client.start().unwrap();
    f.channel.wait_for_connects(1).await;
    settle().await;
    assert_eq!(board_ids(&f.client), vec![1]);

    f.channel.push(ServerEvent::CreatedOrder(Order::new(2, 2)));
    settle().await;

    assert_eq!(board_ids(&f.client), vec![2, 1]);
    f.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn reconnect_refetches_once_and_resets_backoff() {
    let sync = SyncConfig::default()
        .with_reconnect_delay(Duration::from_millis(500), Duration::from_secs(10));
    let f = fixture(vec![Order::new(1, 1)], sync);
    f.client.start().unwrap();
    f.channel.wait_for_connects(1).await;
    settle().await;
    assert_eq!(f.api.fetch_count(), 1);

    // Order created while the link is down only arrives via the refetch
    f.channel.drop_connection();
    f.api.set_orders(vec![Order::new(2, 2), Order::new(1, 1)]);
    f.channel.wait_for_connects(2).await;
    settle().await;

    assert_eq!(f.api.fetch_count(), 2);
    assert_eq!(board_ids(&f.client), vec![2, 1]);
    assert_eq!(f.client.connection_state(), ConnectionState::Connected);

    // Failure counter was reset: the next drop waits the initial delay again
    f.channel.drop_connection();
    let dropped_at = Instant::now();
    f.channel.wait_for_connects(3).await;
    let waited = dropped_at.elapsed();
    assert!(waited >= Duration::from_millis(500) && waited < Duration::from_secs(1));
    f.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn backoff_grows_while_connections_fail() {
    let sync = SyncConfig::default()
        .with_reconnect_delay(Duration::from_millis(500), Duration::from_secs(10));
    let f = fixture(vec![], sync);
    f.channel.set_refuse(true);
    f.client.start().unwrap();
    settle().await;
    assert_eq!(f.client.connection_state(), ConnectionState::Disconnected);

    // Failed attempts at 0, 0.5, 1.5 and 3.5 s; allow the next one at 7.5 s
    tokio::time::sleep(Duration::from_secs(7)).await;
    f.channel.set_refuse(false);
    assert_eq!(f.channel.connect_count(), 0);

    let before = Instant::now();
    f.channel.wait_for_connects(1).await;
    assert!(before.elapsed() <= Duration::from_millis(500));
    f.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn visibility_while_disconnected_reconnects_now() {
    let sync = SyncConfig::default()
        .with_reconnect_delay(Duration::from_secs(60), Duration::from_secs(60));
    let f = fixture(vec![Order::new(1, 1)], sync);
    f.channel.set_refuse(true);
    f.client.start().unwrap();
    settle().await;
    assert_eq!(f.api.fetch_count(), 0);

    f.channel.set_refuse(false);
    f.client.visibility_regained();

    tokio::time::timeout(Duration::from_secs(1), f.channel.wait_for_connects(1))
        .await
        .expect("reconnect should not wait for the backoff timer");
    settle().await;

    // One refetch for visibility, one for the connect
    assert_eq!(f.api.fetch_count(), 2);
    assert_eq!(board_ids(&f.client), vec![1]);
    f.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn visibility_while_connected_does_nothing() {
    let f = fixture(vec![Order::new(1, 1)], SyncConfig::default());
    f.client.start().unwrap();
    f.channel.wait_for_connects(1).await;
    settle().await;

    f.client.visibility_regained();
    settle().await;

    assert_eq!(f.channel.connect_count(), 1);
    assert_eq!(f.api.fetch_count(), 1);
    f.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failed_snapshot_keeps_board() {
    let f = fixture(vec![Order::new(1, 1)], SyncConfig::default());
    f.client.start().unwrap();
    f.channel.wait_for_connects(1).await;
    settle().await;

    f.api.fail_next_fetch(ClientError::Network("connection reset".into()));
    let err = f.client.refresh().await.unwrap_err();

    assert!(matches!(err, ClientError::Network(_)));
    let view = f.client.board();
    assert_eq!(board_ids(&f.client), vec![1]);
    assert!(view.snapshot_error.as_deref().unwrap().contains("connection reset"));

    f.client.refresh().await.unwrap();
    assert!(f.client.board().snapshot_error.is_none());
    f.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn malformed_frames_do_not_break_the_link() {
    let f = fixture(vec![], SyncConfig::default());
    f.client.start().unwrap();
    f.channel.wait_for_connects(1).await;
    settle().await;

    f.channel.push_raw("{{{");
    f.channel.push_raw(r#"{"event":"printer_jam","data":{}}"#);
    f.channel.push(ServerEvent::CreatedOrder(Order::new(5, 5)));
    settle().await;

    assert_eq!(board_ids(&f.client), vec![5]);
    assert_eq!(f.channel.connect_count(), 1);
    f.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn status_change_then_echo_is_stable() {
    let order = Order::new(1, 1).with_status(OrderStatus::Cooking);
    let f = fixture(vec![order], SyncConfig::default());
    f.client.start().unwrap();
    f.channel.wait_for_connects(1).await;
    settle().await;

    let confirmed = f.client.mutator().advance(1).await.unwrap();
    assert_eq!(confirmed.order_status, OrderStatus::Packing);

    // The backend echoes the change to every display
    let before = f.client.board().orders.clone();
    f.channel.push(ServerEvent::UpdatedOrderItems(confirmed));
    settle().await;
    assert_eq!(f.client.board().orders, before);

    // A stale echo never moves the card backward
    f.channel.push(ServerEvent::UpdatedOrderItems(
        Order::new(1, 1).with_status(OrderStatus::Cooking),
    ));
    settle().await;
    assert_eq!(f.client.store().get(1).unwrap().order_status, OrderStatus::Packing);
    f.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn illegal_status_change_sends_nothing() {
    let order = Order::new(1, 1).with_status(OrderStatus::Packing);
    let f = fixture(vec![order], SyncConfig::default());
    f.client.start().unwrap();
    f.channel.wait_for_connects(1).await;
    settle().await;

    let err = f
        .client
        .mutator()
        .advance_status(1, OrderStatus::Cooking)
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::InvalidTransition { .. }));
    assert!(f.api.updates().is_empty());
    f.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn batch_over_selection() {
    let orders = vec![
        Order::new(1, 1).with_status(OrderStatus::Cooked),
        Order::new(2, 2).with_status(OrderStatus::Cooked),
        Order::new(3, 3).with_status(OrderStatus::Cooked),
    ];
    let f = fixture(orders, SyncConfig::default());
    f.client.start().unwrap();
    f.channel.wait_for_connects(1).await;
    settle().await;

    let store = f.client.store();
    store.enter_multi_select();
    store.toggle_select(1);
    store.toggle_select(3);

    let outcome = f.client.mutator().advance_selected(OrderStatus::Completed).await;

    assert_eq!(outcome.len(), 2);
    assert!(outcome.iter().all(|(_, r)| r.is_ok()));
    let view = f.client.board();
    assert!(!view.multi_select_mode);
    let statuses: Vec<OrderStatus> = view.orders.iter().map(|o| o.order_status).collect();
    assert_eq!(
        statuses,
        vec![OrderStatus::Completed, OrderStatus::Cooked, OrderStatus::Completed]
    );
    f.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn notices_follow_events() {
    let f = fixture(vec![], SyncConfig::default());
    let mut notices = f.client.notices();
    f.client.start().unwrap();
    f.channel.wait_for_connects(1).await;
    settle().await;

    let order = Order::new(7, 7);
    f.channel.push(ServerEvent::CreatedOrder(order.clone()));
    f.channel.push(ServerEvent::DeletedOrder(7.into()));
    settle().await;

    assert_eq!(notices.recv().await.unwrap(), OrderNotice::Created(order));
    assert_eq!(notices.recv().await.unwrap(), OrderNotice::Deleted(7));
    f.client.shutdown().await;
}
