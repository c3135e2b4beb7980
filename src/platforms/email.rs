//! PedidosYa: order notification emails
//!
//! The mail worker posts `{"subject", "body"}` with the plain-text body. Orders
//! come as `Key: value` lines plus `2 x Product $price` item lines.

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use super::{json_text, parse_money, PlatformAdapter, StatusVocabulary};
use crate::errors::PlatformError;
use crate::models::order::{OrderCreateRequest, OrderItem, OrderStatus, ParsedField};

lazy_static! {
    static ref ORDER_ID_REGEX: Regex =
        Regex::new(r"(?i)pedido\s*(?:n[°º.]|nro\.?|n[uú]mero|#)\s*:?\s*([A-Z0-9][A-Z0-9-]*)").unwrap();
    static ref KEY_VALUE_REGEX: Regex = Regex::new(r"(?m)^\s*([^\s:\d][^:\n]{0,40}?)\s*:\s*(.+?)\s*$").unwrap();
    static ref ITEM_LINE_REGEX: Regex =
        Regex::new(r"(?m)^\s*(\d+)\s*[xX×]\s+(.+?)\s+\$?\s*([\d.,]+)\s*$").unwrap();
    static ref COORDINATES_REGEX: Regex = Regex::new(r"(-?\d{1,3}\.\d+)\s*,\s*(-?\d{1,3}\.\d+)").unwrap();
}

const VOCABULARY: StatusVocabulary = &[
    ("pendiente", OrderStatus::Pending),
    ("recibido", OrderStatus::Pending),
    ("confirmado", OrderStatus::Preparing),
    ("en preparación", OrderStatus::Preparing),
    ("en preparacion", OrderStatus::Preparing),
    ("listo", OrderStatus::Ready),
    ("en camino", OrderStatus::Delivering),
    ("despachado", OrderStatus::Delivering),
    ("entregado", OrderStatus::Delivered),
    ("cancelado", OrderStatus::Rejected),
    ("rechazado", OrderStatus::Rejected),
];

pub struct EmailAdapter;

impl PlatformAdapter for EmailAdapter {
    fn name(&self) -> &'static str {
        "pedidosya"
    }

    fn vocabulary(&self) -> StatusVocabulary {
        VOCABULARY
    }

    fn normalize_order(&self, payload: &Value) -> Result<OrderCreateRequest, PlatformError> {
        let subject = json_text(payload, &["subject"]).unwrap_or_default();
        let body = json_text(payload, &["body", "text"]).unwrap_or_default();

        let platform_order_id = json_text(payload, &["order_id"])
            .or_else(|| order_id_from(&subject))
            .or_else(|| order_id_from(&body))
            .ok_or_else(|| PlatformError::Malformed("email has no order number".to_string()))?;

        let fields = key_values(&body);
        let field = |keys: &[&str]| keys.iter().find_map(|k| fields.get(*k).cloned());

        let location: ParsedField<(f64, f64)> = field(&["ubicación", "ubicacion", "coordenadas"])
            .and_then(|raw| {
                let caps = COORDINATES_REGEX.captures(&raw)?;
                Some((caps[1].parse::<f64>().ok()?, caps[2].parse::<f64>().ok()?))
            })
            .into();

        Ok(OrderCreateRequest {
            platform_order_id,
            customer_name: ParsedField::from_text(field(&["cliente", "nombre"]).as_deref()),
            customer_phone: ParsedField::from_text(field(&["teléfono", "telefono"]).as_deref()),
            customer_address: ParsedField::from_text(field(&["dirección", "direccion"]).as_deref()),
            customer_location: location,
            items: item_lines(&body),
            total_amount: field(&["total"]).as_deref().and_then(parse_money).into(),
            platform_status: ParsedField::from_text(field(&["estado"]).as_deref()),
        })
    }
}

fn order_id_from(text: &str) -> Option<String> {
    ORDER_ID_REGEX.captures(text).map(|caps| caps[1].to_string())
}

/// Lowercased keys; first occurrence wins
fn key_values(body: &str) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    for caps in KEY_VALUE_REGEX.captures_iter(body) {
        fields
            .entry(caps[1].trim().to_lowercase())
            .or_insert_with(|| caps[2].to_string());
    }
    fields
}

fn item_lines(body: &str) -> Vec<OrderItem> {
    ITEM_LINE_REGEX
        .captures_iter(body)
        .filter_map(|caps| {
            let quantity = caps[1].parse::<u32>().ok().filter(|q| *q > 0)?;
            Some(OrderItem {
                name: caps[2].trim().to_string(),
                quantity,
                price: parse_money(&caps[3])?,
            })
        })
        .collect()
}
