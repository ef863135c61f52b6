//! Order record as served by the kitchen backend

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::status::OrderStatus;

/// Backend-assigned order identity
pub type OrderId = i64;

/// Per-day order number shown on the display
pub type DailyOrderNumber = i64;

// ============================================================================
// Enums
// ============================================================================

/// How the order is served
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    #[default]
    Table,
    Delivery,
    Pickup,
    Counter,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Table => "table",
            Self::Delivery => "delivery",
            Self::Pickup => "pickup",
            Self::Counter => "counter",
        })
    }
}

/// Where the order was placed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OrderSource {
    #[serde(rename = "online")]
    Online,
    #[serde(rename = "inHouse", alias = "in-house", alias = "in_house")]
    InHouse,
}

// ============================================================================
// Line Items
// ============================================================================

/// One variant of a line item (e.g. `{"Sopa": "Pollo"}` plus a note)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct OrderVariant {
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Line item of an order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: i64,
    #[serde(default)]
    pub product_name: String,
    pub quantity: u32,
    /// Kitchen product code printed on the card
    pub code: i64,
    #[serde(default)]
    pub variants: Vec<OrderVariant>,
}

// ============================================================================
// Order
// ============================================================================

/// Full order record
///
/// This is the shape returned by the snapshot endpoint, the status update
/// endpoint, and carried by `created_order` / `updated_order_items` events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub order_id: OrderId,
    pub daily_order_number: DailyOrderNumber,
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    /// Server-assigned creation time, normalised to UTC
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub order_type: OrderType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_source: Option<OrderSource>,
    #[serde(default)]
    pub order_status: OrderStatus,
    #[serde(default)]
    pub printed: bool,
    #[serde(default)]
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Create a pending order with no items
    pub fn new(order_id: OrderId, daily_order_number: DailyOrderNumber) -> Self {
        Self {
            order_id,
            daily_order_number,
            customer_name: String::new(),
            phone: String::new(),
            address: String::new(),
            created_at: Utc::now(),
            order_type: OrderType::default(),
            order_source: None,
            order_status: OrderStatus::Pending,
            printed: false,
            items: Vec::new(),
        }
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.order_status = status;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_item(mut self, item: OrderItem) -> Self {
        self.items.push(item);
        self
    }

    /// Total number of units across all line items
    pub fn total_quantity(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }
}

/// Partial update accepted by `PATCH /orders/{id}/info`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_type: Option<OrderType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_status: Option<OrderStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub printed: Option<bool>,
}

impl UpdateOrderInfo {
    /// Status-only update
    pub fn status(status: OrderStatus) -> Self {
        Self {
            order_status: Some(status),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_from_backend_json() {
        let json = r#"{
            "orderId": 17,
            "dailyOrderNumber": 3,
            "customerName": "Ana",
            "phone": "600000000",
            "address": "Mesa 4",
            "createdAt": "2025-03-01T12:30:00-05:00",
            "orderType": "table",
            "orderSource": "in-house",
            "orderStatus": "inDelivery",
            "printed": true,
            "items": [{
                "productId": 9,
                "productName": "Sopa",
                "quantity": 2,
                "code": 12,
                "variants": [{ "attributes": { "Sopa": "Pollo" }, "note": "sin sal" }]
            }]
        }"#;

        let order: Order = serde_json::from_str(json).unwrap();
        assert_eq!(order.order_id, 17);
        assert_eq!(order.daily_order_number, 3);
        assert_eq!(order.order_source, Some(OrderSource::InHouse));
        assert_eq!(order.order_status, OrderStatus::InDelivery);
        assert_eq!(order.created_at.to_rfc3339(), "2025-03-01T17:30:00+00:00");
        assert_eq!(order.items[0].variants[0].attributes["Sopa"], "Pollo");
        assert_eq!(order.items[0].variants[0].note.as_deref(), Some("sin sal"));
        assert_eq!(order.total_quantity(), 2);
    }

    #[test]
    fn test_order_defaults_for_missing_fields() {
        let json = r#"{"orderId": 1, "dailyOrderNumber": 1, "createdAt": "2025-03-01T12:00:00Z"}"#;
        let order: Order = serde_json::from_str(json).unwrap();
        assert_eq!(order.order_status, OrderStatus::Pending);
        assert_eq!(order.order_type, OrderType::Table);
        assert!(order.items.is_empty());
        assert!(!order.printed);
    }

    #[test]
    fn test_status_update_body() {
        let body = serde_json::to_value(UpdateOrderInfo::status(OrderStatus::Cooking)).unwrap();
        assert_eq!(body, serde_json::json!({ "orderStatus": "cooking" }));
    }
}
