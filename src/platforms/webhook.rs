//! Rappi: JSON webhook deliveries

use serde_json::Value;

use super::{json_decimal, json_f64, json_items, json_text, PlatformAdapter, StatusVocabulary};
use crate::errors::PlatformError;
use crate::models::order::{OrderCreateRequest, OrderStatus, ParsedField};

const VOCABULARY: StatusVocabulary = &[
    ("created", OrderStatus::Pending),
    ("sent", OrderStatus::Pending),
    ("pending", OrderStatus::Pending),
    ("taken", OrderStatus::Preparing),
    ("accepted", OrderStatus::Preparing),
    ("in_preparation", OrderStatus::Preparing),
    ("ready_for_pickup", OrderStatus::Ready),
    ("ready", OrderStatus::Ready),
    ("picked_up", OrderStatus::Delivering),
    ("on_the_way", OrderStatus::Delivering),
    ("in_transit", OrderStatus::Delivering),
    ("delivered", OrderStatus::Delivered),
    ("finished", OrderStatus::Delivered),
    ("canceled", OrderStatus::Rejected),
    ("cancelled", OrderStatus::Rejected),
    ("rejected", OrderStatus::Rejected),
];

pub struct WebhookAdapter;

impl PlatformAdapter for WebhookAdapter {
    fn name(&self) -> &'static str {
        "rappi"
    }

    fn vocabulary(&self) -> StatusVocabulary {
        VOCABULARY
    }

    fn normalize_order(&self, payload: &Value) -> Result<OrderCreateRequest, PlatformError> {
        // Envelope `{"event": ..., "order": {...}}` or the bare order
        let order = payload.get("order").filter(|o| o.is_object()).unwrap_or(payload);

        let platform_order_id = json_text(order, &["order_id", "id"])
            .ok_or_else(|| PlatformError::Malformed("webhook payload has no order id".to_string()))?;

        let customer = order.get("customer").cloned().unwrap_or_default();
        let location = match (
            json_f64(&customer, &["lat", "latitude"]),
            json_f64(&customer, &["lng", "lon", "longitude"]),
        ) {
            (Some(lat), Some(lng)) => ParsedField::Present((lat, lng)),
            _ => ParsedField::Absent,
        };

        Ok(OrderCreateRequest {
            platform_order_id,
            customer_name: json_text(&customer, &["name", "first_name"]).into(),
            customer_phone: json_text(&customer, &["phone", "phone_number"]).into(),
            customer_address: json_text(&customer, &["address"]).into(),
            customer_location: location,
            items: json_items(order, &["items", "products"]),
            total_amount: json_decimal(order, &["total", "total_amount", "total_value"]).into(),
            platform_status: json_text(order, &["status", "state"])
                .or_else(|| json_text(payload, &["status", "event"]))
                .into(),
        })
    }
}
