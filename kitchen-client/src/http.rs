//! REST client for the kitchen backend

use crate::{ClientError, ClientResult, KitchenConfig};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use shared::order::{Order, OrderId, UpdateOrderInfo};

/// Error body returned by the backend, `message` is a string or a list of strings
#[derive(serde::Deserialize)]
struct ApiErrorResponse {
    message: ApiErrorMessage,
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum ApiErrorMessage {
    One(String),
    Many(Vec<String>),
}

impl ApiErrorMessage {
    fn into_string(self) -> String {
        match self {
            Self::One(message) => message,
            Self::Many(messages) => messages.join("; "),
        }
    }
}

/// Backend operations the reconciliation core depends on
#[async_trait]
pub trait OrderApi: Send + Sync {
    /// `GET /orders/daily` - every order of the current business day
    async fn fetch_daily_orders(&self) -> ClientResult<Vec<Order>>;

    /// `PATCH /orders/{id}/info` - returns the updated order
    async fn update_order_info(&self, order_id: OrderId, info: &UpdateOrderInfo)
    -> ClientResult<Order>;
}

/// Network REST client
#[derive(Debug, Clone)]
pub struct NetworkOrderApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl NetworkOrderApi {
    pub fn new(config: &KitchenConfig) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout))
            .build()
            .map_err(|e| ClientError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn auth_header(&self) -> Option<String> {
        self.token.as_ref().map(|t| format!("Bearer {}", t))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let mut req = self.client.get(self.url(path));
        if let Some(auth) = self.auth_header() {
            req = req.header(reqwest::header::AUTHORIZATION, auth);
        }
        let response = req.send().await?;
        Self::handle_response(response).await
    }

    async fn patch<T: DeserializeOwned, B: serde::Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> ClientResult<T> {
        let mut req = self.client.patch(self.url(path)).json(body);
        if let Some(auth) = self.auth_header() {
            req = req.header(reqwest::header::AUTHORIZATION, auth);
        }
        let response = req.send().await?;
        Self::handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> ClientResult<T> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await?;
            let message = serde_json::from_str::<ApiErrorResponse>(&text)
                .map(|body| body.message.into_string())
                .unwrap_or(text);
            return Err(match status {
                StatusCode::NOT_FOUND => ClientError::NotFound(message),
                StatusCode::CONFLICT => ClientError::Conflict(message),
                _ => ClientError::Server {
                    status: status.as_u16(),
                    message,
                },
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl OrderApi for NetworkOrderApi {
    async fn fetch_daily_orders(&self) -> ClientResult<Vec<Order>> {
        self.get("orders/daily").await
    }

    async fn update_order_info(
        &self,
        order_id: OrderId,
        info: &UpdateOrderInfo,
    ) -> ClientResult<Order> {
        self.patch(&format!("orders/{}/info", order_id), info).await
    }
}

/// In-process backend double
///
/// Keeps the day's orders in memory and applies status updates to them the
/// way the backend does, rejecting backward changes with a conflict. Counts
/// calls so callers can assert on traffic.
#[derive(Debug, Default)]
pub struct InMemoryOrderApi {
    orders: parking_lot::Mutex<Vec<Order>>,
    fetch_failures: parking_lot::Mutex<std::collections::VecDeque<ClientError>>,
    update_failures: parking_lot::Mutex<std::collections::HashMap<OrderId, ClientError>>,
    updates: parking_lot::Mutex<Vec<(OrderId, UpdateOrderInfo)>>,
    fetches: std::sync::atomic::AtomicUsize,
}

impl InMemoryOrderApi {
    pub fn new(orders: Vec<Order>) -> Self {
        Self {
            orders: parking_lot::Mutex::new(orders),
            ..Default::default()
        }
    }

    /// Replace what the next snapshot returns
    pub fn set_orders(&self, orders: Vec<Order>) {
        *self.orders.lock() = orders;
    }

    /// Make the next snapshot fetch fail with `error`
    pub fn fail_next_fetch(&self, error: ClientError) {
        self.fetch_failures.lock().push_back(error);
    }

    /// Make the next update of `order_id` fail with `error`
    pub fn fail_next_update(&self, order_id: OrderId, error: ClientError) {
        self.update_failures.lock().insert(order_id, error);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Every update request received, in order
    pub fn updates(&self) -> Vec<(OrderId, UpdateOrderInfo)> {
        self.updates.lock().clone()
    }
}

#[async_trait]
impl OrderApi for InMemoryOrderApi {
    async fn fetch_daily_orders(&self) -> ClientResult<Vec<Order>> {
        self.fetches.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if let Some(error) = self.fetch_failures.lock().pop_front() {
            return Err(error);
        }
        Ok(self.orders.lock().clone())
    }

    async fn update_order_info(
        &self,
        order_id: OrderId,
        info: &UpdateOrderInfo,
    ) -> ClientResult<Order> {
        self.updates.lock().push((order_id, info.clone()));
        if let Some(error) = self.update_failures.lock().remove(&order_id) {
            return Err(error);
        }

        let mut orders = self.orders.lock();
        let order = orders
            .iter_mut()
            .find(|o| o.order_id == order_id)
            .ok_or_else(|| ClientError::NotFound(format!("order {order_id}")))?;

        if let Some(status) = info.order_status {
            if !order.order_status.can_become(status) {
                return Err(ClientError::Conflict(format!(
                    "order {order_id} is already {}",
                    order.order_status
                )));
            }
            order.order_status = status;
        }
        if let Some(printed) = info.printed {
            order.printed = printed;
        }
        Ok(order.clone())
    }
}
