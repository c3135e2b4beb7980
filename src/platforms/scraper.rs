//! Uber Eats: order cards scraped from the restaurant panel
//!
//! The browser worker posts `{"order_id", "status_text", "card_html"}`. The card
//! markup tags each value with a `data-field` attribute.

use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

use super::{json_text, parse_money, PlatformAdapter, StatusVocabulary};
use crate::errors::PlatformError;
use crate::models::order::{OrderCreateRequest, OrderItem, OrderStatus, ParsedField};

const VOCABULARY: StatusVocabulary = &[
    ("nuevo", OrderStatus::Pending),
    ("pendiente", OrderStatus::Pending),
    ("new order", OrderStatus::Pending),
    ("aceptado", OrderStatus::Preparing),
    ("preparando", OrderStatus::Preparing),
    ("en preparación", OrderStatus::Preparing),
    ("preparing", OrderStatus::Preparing),
    ("listo para recoger", OrderStatus::Ready),
    ("listo", OrderStatus::Ready),
    ("ready for pickup", OrderStatus::Ready),
    ("recogido", OrderStatus::Delivering),
    ("en camino", OrderStatus::Delivering),
    ("on the way", OrderStatus::Delivering),
    ("entregado", OrderStatus::Delivered),
    ("delivered", OrderStatus::Delivered),
    ("cancelado", OrderStatus::Rejected),
    ("rechazado", OrderStatus::Rejected),
    ("cancelled", OrderStatus::Rejected),
];

pub struct ScraperAdapter;

impl PlatformAdapter for ScraperAdapter {
    fn name(&self) -> &'static str {
        "ubereats"
    }

    fn vocabulary(&self) -> StatusVocabulary {
        VOCABULARY
    }

    fn normalize_order(&self, payload: &Value) -> Result<OrderCreateRequest, PlatformError> {
        let html = json_text(payload, &["card_html", "html"]).unwrap_or_default();
        let document = Html::parse_fragment(&html);

        let platform_order_id = json_text(payload, &["order_id", "id"])
            .or_else(|| card_order_id(&document))
            .ok_or_else(|| PlatformError::Malformed("scraped card has no order id".to_string()))?;

        let location = match (field_text(&document, "customer-lat"), field_text(&document, "customer-lng")) {
            (Some(lat), Some(lng)) => match (lat.parse(), lng.parse()) {
                (Ok(lat), Ok(lng)) => ParsedField::Present((lat, lng)),
                _ => ParsedField::Absent,
            },
            _ => ParsedField::Absent,
        };

        let status = json_text(payload, &["status_text", "status"]).or_else(|| field_text(&document, "status"));

        Ok(OrderCreateRequest {
            platform_order_id,
            customer_name: field_text(&document, "customer-name").into(),
            customer_phone: field_text(&document, "customer-phone").into(),
            customer_address: field_text(&document, "customer-address").into(),
            customer_location: location,
            items: card_items(&document),
            total_amount: field_text(&document, "total").as_deref().and_then(parse_money).into(),
            platform_status: status.into(),
        })
    }
}

fn field_selector(field: &str) -> Option<Selector> {
    Selector::parse(&format!("[data-field='{}']", field)).ok()
}

fn element_text(element: ElementRef<'_>) -> Option<String> {
    let text = element.text().collect::<Vec<_>>().join(" ");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

fn field_text(document: &Html, field: &str) -> Option<String> {
    let selector = field_selector(field)?;
    document.select(&selector).next().and_then(element_text)
}

fn card_order_id(document: &Html) -> Option<String> {
    let selector = Selector::parse("[data-order-id]").ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("data-order-id"))
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
}

/// `<li data-field="item" data-quantity="2" data-price="3.50">Name</li>`
fn card_items(document: &Html) -> Vec<OrderItem> {
    let Some(selector) = field_selector("item") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|el| {
            let name = element_text(el)?;
            let quantity = el
                .value()
                .attr("data-quantity")
                .and_then(|q| q.trim().parse::<u32>().ok())
                .filter(|q| *q > 0)
                .unwrap_or(1);
            let price = el.value().attr("data-price").and_then(parse_money).unwrap_or_default();
            Some(OrderItem { name, quantity, price })
        })
        .collect()
}
