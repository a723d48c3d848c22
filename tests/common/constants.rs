//! Shared identifiers for the seeded catalog.

#![allow(dead_code)]

pub const PRODUCT_1_ID: &str = "P1";
pub const PRODUCT_2_ID: &str = "P2";
pub const PRODUCT_3_ID: &str = "P3";

pub const PRODUCT_1_RATING: f64 = 4.5;
pub const PRODUCT_2_RATING: f64 = 3.5;
pub const PRODUCT_3_RATING: f64 = 4.0;

pub const ALL_JOB_IDS: [&str; 5] = [
    "daily_revenue",
    "hourly_revenue",
    "product_health",
    "product_kpis",
    "trending_scores",
];
