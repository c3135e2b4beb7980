//! Platform adapters
//!
//! Each upstream marketplace delivers orders in its own shape (JSON webhooks,
//! scraped panel cards, parsed emails). Adapters turn those payloads into an
//! `OrderCreateRequest` and translate the platform's status vocabulary into
//! `OrderStatus`.

pub mod email;
pub mod gateway;
pub mod ingest;
pub mod scraper;
pub mod webhook;

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::errors::PlatformError;
use crate::models::order::{OrderCreateRequest, OrderItem, OrderStatus};

pub use email::EmailAdapter;
pub use scraper::ScraperAdapter;
pub use webhook::WebhookAdapter;

/// Per-platform status labels, in match priority order
pub type StatusVocabulary = &'static [(&'static str, OrderStatus)];

pub trait PlatformAdapter: Send + Sync {
    /// Lowercase platform name as stored in the `platforms` table
    fn name(&self) -> &'static str;

    fn vocabulary(&self) -> StatusVocabulary;

    /// Extract an order from a raw payload. Only a missing upstream order id
    /// fails; every other field degrades to `ParsedField::Absent`.
    fn normalize_order(&self, payload: &Value) -> Result<OrderCreateRequest, PlatformError>;

    fn map_status(&self, raw: &str) -> OrderStatus {
        map_status_with(self.vocabulary(), raw)
    }
}

/// Translate an upstream label: exact match, then substring containment in
/// either direction (first declared key wins), then `Pending`.
pub fn map_status_with(vocabulary: &[(&str, OrderStatus)], raw: &str) -> OrderStatus {
    let normalized = raw.trim().to_lowercase();
    if normalized.is_empty() {
        return OrderStatus::Pending;
    }

    if let Some((_, status)) = vocabulary.iter().find(|(key, _)| *key == normalized) {
        return *status;
    }

    vocabulary
        .iter()
        .find(|(key, _)| normalized.contains(key) || key.contains(normalized.as_str()))
        .map(|(_, status)| *status)
        .unwrap_or(OrderStatus::Pending)
}

/// Name → adapter lookup
#[derive(Clone, Default)]
pub struct PlatformRegistry {
    adapters: HashMap<&'static str, Arc<dyn PlatformAdapter>>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the adapters for the seeded platforms
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(WebhookAdapter));
        registry.register(Arc::new(ScraperAdapter));
        registry.register(Arc::new(EmailAdapter));
        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn PlatformAdapter>) {
        self.adapters.insert(adapter.name(), adapter);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn PlatformAdapter>> {
        self.adapters.get(name.trim().to_lowercase().as_str()).cloned()
    }

    /// Unknown platforms map everything to `Pending`
    pub fn map_status(&self, platform: &str, raw: &str) -> OrderStatus {
        match self.get(platform) {
            Some(adapter) => adapter.map_status(raw),
            None => OrderStatus::Pending,
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.adapters.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

// Lenient JSON field readers shared by the adapters

/// First non-blank string (or number rendered as string) under any of `keys`
pub(crate) fn json_text(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match value.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

pub(crate) fn json_f64(value: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| match value.get(*key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

pub(crate) fn json_decimal(value: &Value, keys: &[&str]) -> Option<Decimal> {
    keys.iter().find_map(|key| match value.get(*key)? {
        Value::Number(n) => n.as_f64().and_then(Decimal::from_f64).map(|d| d.round_dp(2)),
        Value::String(s) => parse_money(s),
        _ => None,
    })
}

/// Read an `items` array; entries without a name are skipped
pub(crate) fn json_items(value: &Value, keys: &[&str]) -> Vec<OrderItem> {
    let Some(entries) = keys.iter().find_map(|key| value.get(*key).and_then(Value::as_array)) else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            let name = json_text(entry, &["name", "title", "product"])?;
            let quantity = json_f64(entry, &["quantity", "qty", "units"])
                .filter(|q| *q >= 1.0)
                .map(|q| q as u32)
                .unwrap_or(1);
            let price = json_decimal(entry, &["price", "unit_price"]).unwrap_or(Decimal::ZERO);
            Some(OrderItem { name, quantity, price })
        })
        .collect()
}

/// Parse a money label such as `$12.50`, `12,50` or `$2.500`.
///
/// A single separator followed by exactly three digits is a thousands
/// separator; with both present the right-most one is the decimal point.
pub(crate) fn parse_money(text: &str) -> Option<Decimal> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let last_dot = cleaned.rfind('.');
    let last_comma = cleaned.rfind(',');
    let canonical = match (last_dot, last_comma) {
        (Some(dot), Some(comma)) => {
            if dot > comma {
                cleaned.replace(',', "")
            } else {
                cleaned.replace('.', "").replace(',', ".")
            }
        }
        (Some(sep), None) | (None, Some(sep)) => {
            let separator = cleaned.as_bytes()[sep] as char;
            let occurrences = cleaned.matches(separator).count();
            let decimals = cleaned.len() - sep - 1;
            if occurrences > 1 || decimals == 3 {
                cleaned.replace(separator, "")
            } else {
                cleaned.replace(',', ".")
            }
        }
        (None, None) => cleaned,
    };

    canonical.parse::<Decimal>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_map_status_fallback_order() {
        let vocabulary = [("ready", OrderStatus::Ready)];
        assert_eq!(map_status_with(&vocabulary, "ready"), OrderStatus::Ready);
        assert_eq!(map_status_with(&vocabulary, "almost_ready_now"), OrderStatus::Ready);
        assert_eq!(map_status_with(&vocabulary, "xyz_unknown"), OrderStatus::Pending);
        assert_eq!(map_status_with(&vocabulary, "   "), OrderStatus::Pending);
    }

    #[test]
    fn test_exact_match_beats_earlier_substring() {
        let vocabulary = [
            ("delivered", OrderStatus::Delivered),
            ("not_delivered", OrderStatus::Rejected),
        ];
        assert_eq!(map_status_with(&vocabulary, "NOT_DELIVERED"), OrderStatus::Rejected);
        assert_eq!(map_status_with(&vocabulary, "delivered_late"), OrderStatus::Delivered);
    }

    #[test]
    fn test_key_containing_raw_matches() {
        let vocabulary = [("on_the_way", OrderStatus::Delivering)];
        assert_eq!(map_status_with(&vocabulary, "the_way"), OrderStatus::Delivering);
    }

    #[test]
    fn test_registry_lookup_is_case_insensitive() {
        let registry = PlatformRegistry::with_defaults();
        assert!(registry.get("Rappi").is_some());
        assert!(registry.get("glovo").is_none());
        assert_eq!(registry.map_status("glovo", "delivered"), OrderStatus::Pending);
        assert_eq!(registry.names(), vec!["pedidosya", "rappi", "ubereats"]);
    }

    #[test]
    fn test_parse_money_formats() {
        assert_eq!(parse_money("$12.50"), Some(dec!(12.50)));
        assert_eq!(parse_money("12,50"), Some(dec!(12.50)));
        assert_eq!(parse_money("$2.500"), Some(dec!(2500)));
        assert_eq!(parse_money("1.234.567"), Some(dec!(1234567)));
        assert_eq!(parse_money("1,234.50"), Some(dec!(1234.50)));
        assert_eq!(parse_money("1.234,50"), Some(dec!(1234.50)));
        assert_eq!(parse_money("gratis"), None);
    }

    #[test]
    fn test_json_items_defaults() {
        let payload = serde_json::json!({
            "items": [
                { "name": "Pizza", "quantity": 2, "price": "8.90" },
                { "name": "Agua" },
                { "quantity": 3, "price": 1 }
            ]
        });
        let items = json_items(&payload, &["items"]);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].total(), dec!(17.80));
        assert_eq!(items[1].quantity, 1);
        assert_eq!(items[1].price, Decimal::ZERO);
    }
}
