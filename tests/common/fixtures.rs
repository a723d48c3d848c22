//! Event and catalog builders.

#![allow(dead_code)]

use chrono::{DateTime, Duration, NaiveDate, Utc};
use commerce_metrics_engine::catalog::Product;
use commerce_metrics_engine::events::{Event, EventType};

fn ts(rfc3339: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(rfc3339)
        .unwrap()
        .with_timezone(&Utc)
}

fn event(
    event_id: &str,
    event_type: EventType,
    product_id: &str,
    at: DateTime<Utc>,
    sale_price: Option<f64>,
    quantity: i64,
) -> Event {
    Event {
        event_id: event_id.to_string(),
        event_timestamp: at,
        event_type,
        user_id: format!("user-{}", event_id),
        session_id: format!("session-{}", event_id),
        product_id: product_id.to_string(),
        sale_price,
        quantity,
        on_sale: false,
        rating: None,
        source: Some("direct".to_string()),
    }
}

pub fn product(id: &str, avg_rating: f64) -> Product {
    Product {
        product_id: id.to_string(),
        product_name: format!("Product {}", id),
        category: "kitchen".to_string(),
        regular_price: 25.0,
        avg_rating,
        review_count: 12,
        in_stock: true,
    }
}

pub fn purchase(event_id: &str, product_id: &str, at: &str, price: f64, quantity: i64) -> Event {
    event(
        event_id,
        EventType::Purchase,
        product_id,
        ts(at),
        Some(price),
        quantity,
    )
}

pub fn view(event_id: &str, product_id: &str, at: &str) -> Event {
    event(event_id, EventType::ProductView, product_id, ts(at), None, 1)
}

pub fn return_item(event_id: &str, product_id: &str, at: &str) -> Event {
    event(
        event_id,
        EventType::ReturnItem,
        product_id,
        ts(at),
        Some(25.0),
        -1,
    )
}

/// `per_day[i]` views of `product_id` on consecutive days ending at `last_day`.
pub fn days_of_views(product_id: &str, last_day: NaiveDate, per_day: &[i64]) -> Vec<Event> {
    let first_day = last_day - Duration::days(per_day.len() as i64 - 1);
    let mut events = Vec::new();
    for (offset, &count) in per_day.iter().enumerate() {
        let day = first_day + Duration::days(offset as i64);
        let at = day.and_hms_opt(12, 0, 0).unwrap().and_utc();
        for n in 0..count {
            events.push(event(
                &format!("{}-{}-{}", product_id, day, n),
                EventType::ProductView,
                product_id,
                at,
                None,
                1,
            ));
        }
    }
    events
}
