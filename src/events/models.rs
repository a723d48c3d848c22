use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of storefront interaction recorded by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ProductView,
    AddToCart,
    AddToCartFailure,
    Purchase,
    ReturnItem,
    SubmitReview,
}

impl EventType {
    pub const ALL: [EventType; 6] = [
        EventType::ProductView,
        EventType::AddToCart,
        EventType::AddToCartFailure,
        EventType::Purchase,
        EventType::ReturnItem,
        EventType::SubmitReview,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ProductView => "product_view",
            EventType::AddToCart => "add_to_cart",
            EventType::AddToCartFailure => "add_to_cart_failure",
            EventType::Purchase => "purchase",
            EventType::ReturnItem => "return_item",
            EventType::SubmitReview => "submit_review",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        EventType::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single immutable entry of the event log.
///
/// Field names follow the upstream feed so NDJSON batches deserialize as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub event_timestamp: DateTime<Utc>,
    pub event_type: EventType,
    pub user_id: String,
    pub session_id: String,
    pub product_id: String,
    /// Absent on views; present on cart, purchase and return events.
    #[serde(default)]
    pub sale_price: Option<f64>,
    /// Returns carry a negative quantity in the upstream feed.
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    #[serde(default)]
    pub on_sale: bool,
    #[serde(default)]
    pub rating: Option<i64>,
    #[serde(default)]
    pub source: Option<String>,
}

fn default_quantity() -> i64 {
    1
}

impl Event {
    /// `sale_price * quantity`, or `None` when the event has no price.
    pub fn line_revenue(&self) -> Option<f64> {
        self.sale_price.map(|price| price * self.quantity as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_round_trips_through_str() {
        for event_type in EventType::ALL {
            assert_eq!(EventType::parse(event_type.as_str()), Some(event_type));
        }
        assert_eq!(EventType::parse("checkout"), None);
    }

    #[test]
    fn test_deserialize_upstream_view_payload() {
        // Views are published without sale_price and rating
        let json = r#"{
            "event_id": "evt-1",
            "event_timestamp": "2025-07-26T18:04:11.123456+00:00",
            "user_id": "user-12",
            "session_id": "session-a",
            "event_type": "product_view",
            "product_id": "SKU-LAP-1A2B",
            "on_sale": false,
            "quantity": 1,
            "source": "google"
        }"#;
        let event: Event = serde_json::from_str(json).unwrap();
        assert_eq!(event.event_type, EventType::ProductView);
        assert_eq!(event.sale_price, None);
        assert_eq!(event.line_revenue(), None);
        assert_eq!(event.source.as_deref(), Some("google"));
    }

    #[test]
    fn test_line_revenue_uses_quantity() {
        let json = r#"{
            "event_id": "evt-2",
            "event_timestamp": "2025-07-26T10:00:00Z",
            "user_id": "user-1",
            "session_id": "session-b",
            "event_type": "purchase",
            "product_id": "P1",
            "sale_price": 25.5,
            "quantity": 2,
            "on_sale": true
        }"#;
        let event: Event = serde_json::from_str(json).unwrap();
        assert_eq!(event.line_revenue(), Some(51.0));
        assert!(event.on_sale);
    }
}
