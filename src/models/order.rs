//! Order lifecycle types shared by adapters, services and handlers
//!
//! Status progresses: pending → preparing → ready → delivering → delivered
//!                           ↘ rejected

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::entities::orders;

/// Default rejection reason when the operator leaves it blank
pub const DEFAULT_REJECTION_REASON: &str = "Rechazado por el restaurante";

/// Default preparation time in minutes
pub const DEFAULT_PREPARATION_TIME: i32 = 15;

/// Accepted preparation time range in minutes
pub const MIN_PREPARATION_TIME: i32 = 5;
pub const MAX_PREPARATION_TIME: i32 = 120;

/// Internal canonical lifecycle stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Preparing,
    Ready,
    Delivering,
    Delivered,
    Rejected,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::Delivering,
        OrderStatus::Delivered,
        OrderStatus::Rejected,
    ];

    /// Statuses that still expect upstream movement
    pub const ACTIVE: [OrderStatus; 4] = [
        OrderStatus::Pending,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::Delivering,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::Delivering => "delivering",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Rejected => "rejected",
        }
    }

    /// Transition table for the guided kitchen flow. Accept and reject
    /// consult it; `update_status` does not.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::Preparing)
                | (OrderStatus::Pending, OrderStatus::Rejected)
                | (OrderStatus::Preparing, OrderStatus::Ready)
                | (OrderStatus::Ready, OrderStatus::Delivering)
                | (OrderStatus::Delivering, OrderStatus::Delivered)
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "preparing" => Ok(OrderStatus::Preparing),
            "ready" => Ok(OrderStatus::Ready),
            "delivering" => Ok(OrderStatus::Delivering),
            "delivered" => Ok(OrderStatus::Delivered),
            "rejected" => Ok(OrderStatus::Rejected),
            _ => Err(format!("Unknown order status: {}", s)),
        }
    }
}

/// Audit log action tags
pub mod log_actions {
    pub const ORDER_CREATED: &str = "order_created";
    pub const CONFIRMED: &str = "confirmed";
    pub const REJECTED: &str = "rejected";
    pub const STATUS_UPDATE: &str = "status_update";
}

/// A value an adapter may or may not have been able to extract
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedField<T> {
    Present(T),
    Absent,
}

impl<T> ParsedField<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            ParsedField::Present(v) => Some(v),
            ParsedField::Absent => None,
        }
    }

    pub fn unwrap_or(self, default: T) -> T {
        self.into_option().unwrap_or(default)
    }

    pub fn unwrap_or_default(self) -> T
    where
        T: Default,
    {
        self.into_option().unwrap_or_default()
    }
}

impl ParsedField<String> {
    /// Blank strings count as not extracted
    pub fn from_text(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if !v.is_empty() => ParsedField::Present(v.to_string()),
            _ => ParsedField::Absent,
        }
    }
}

impl<T> From<Option<T>> for ParsedField<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => ParsedField::Present(v),
            None => ParsedField::Absent,
        }
    }
}

/// Single line item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub name: String,
    pub quantity: u32,
    pub price: Decimal,
}

impl OrderItem {
    pub fn total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// Normalized order produced by a platform adapter
#[derive(Debug, Clone)]
pub struct OrderCreateRequest {
    pub platform_order_id: String,
    pub customer_name: ParsedField<String>,
    pub customer_phone: ParsedField<String>,
    pub customer_address: ParsedField<String>,
    pub customer_location: ParsedField<(f64, f64)>,
    pub items: Vec<OrderItem>,
    /// Upstream-declared total; the item sum is used when absent
    pub total_amount: ParsedField<Decimal>,
    /// Raw upstream status label, if the payload carried one
    pub platform_status: ParsedField<String>,
}

impl OrderCreateRequest {
    pub fn new(platform_order_id: impl Into<String>) -> Self {
        Self {
            platform_order_id: platform_order_id.into(),
            customer_name: ParsedField::Absent,
            customer_phone: ParsedField::Absent,
            customer_address: ParsedField::Absent,
            customer_location: ParsedField::Absent,
            items: Vec::new(),
            total_amount: ParsedField::Absent,
            platform_status: ParsedField::Absent,
        }
    }

    pub fn items_total(&self) -> Decimal {
        self.items.iter().map(OrderItem::total).sum()
    }

    /// Total stored at creation: must equal the item sum when items exist
    pub fn resolved_total(&self) -> Decimal {
        if self.items.is_empty() {
            self.total_amount.clone().unwrap_or(Decimal::ZERO)
        } else {
            self.items_total()
        }
    }
}

/// Order as returned to callers (entity + resolved platform name)
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: i32,
    pub platform: String,
    pub platform_order_id: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_address: String,
    pub customer_lat: Option<f64>,
    pub customer_lng: Option<f64>,
    pub items: Vec<OrderItem>,
    pub total_amount: Decimal,
    pub preparation_time: i32,
    pub status: OrderStatus,
    pub platform_status: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn from_model(model: orders::Model, platform: String) -> Self {
        let items: Vec<OrderItem> = serde_json::from_value(model.items).unwrap_or_default();
        // Unknown labels in the table are treated as the initial stage
        let status = model.status.parse().unwrap_or(OrderStatus::Pending);

        Self {
            id: model.id,
            platform,
            platform_order_id: model.platform_order_id,
            customer_name: model.customer_name,
            customer_phone: model.customer_phone,
            customer_address: model.customer_address,
            customer_lat: model.customer_lat,
            customer_lng: model.customer_lng,
            items,
            total_amount: model.total_amount,
            preparation_time: model.preparation_time,
            status,
            platform_status: model.platform_status,
            confirmed_at: model.confirmed_at,
            rejected_at: model.rejected_at,
            rejection_reason: model.rejection_reason,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }

    pub fn customer_location(&self) -> Option<(f64, f64)> {
        match (self.customer_lat, self.customer_lng) {
            (Some(lat), Some(lng)) => Some((lat, lng)),
            _ => None,
        }
    }
}

/// Filter for order listing
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub statuses: Vec<OrderStatus>,
    pub platform: Option<String>,
    pub updated_before: Option<DateTime<Utc>>,
    pub updated_after: Option<DateTime<Utc>>,
    /// Least recently reconciled first, then oldest update
    pub reconcile_order: bool,
    pub limit: Option<u64>,
}

/// Query parameters for GET /orders
#[derive(Debug, Clone, Deserialize)]
pub struct OrderListQuery {
    /// Comma separated statuses
    pub status: Option<String>,
    pub platform: Option<String>,
    pub limit: Option<u64>,
}

impl OrderListQuery {
    pub fn into_filter(self) -> Result<OrderFilter, String> {
        let statuses = match self.status {
            Some(raw) => raw
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(str::parse)
                .collect::<Result<Vec<OrderStatus>, _>>()?,
            None => Vec::new(),
        };

        if let Some(limit) = self.limit {
            if limit == 0 || limit > 500 {
                return Err("limit must be between 1 and 500".to_string());
            }
        }

        Ok(OrderFilter {
            statuses,
            platform: self.platform.map(|p| p.to_lowercase()),
            limit: Some(self.limit.unwrap_or(100)),
            ..Default::default()
        })
    }
}

/// Body for POST /orders/{id}/accept
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AcceptOrderRequest {
    pub preparation_time: Option<i32>,
}

/// Body for POST /orders/{id}/reject
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RejectOrderRequest {
    pub reason: Option<String>,
}

/// Body for PATCH /orders/{id}/status
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}
