use chrono::{DateTime, Duration, DurationRound, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Width of a revenue bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Hourly,
    Daily,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Hourly => "hourly",
            Granularity::Daily => "daily",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hourly" => Some(Granularity::Hourly),
            "daily" => Some(Granularity::Daily),
            _ => None,
        }
    }

    pub fn width(&self) -> Duration {
        match self {
            Granularity::Hourly => Duration::hours(1),
            Granularity::Daily => Duration::days(1),
        }
    }

    /// Start of the bucket containing `ts`. Daily buckets are UTC calendar days.
    pub fn truncate(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        // Both widths divide a day evenly and the epoch starts at midnight, so
        // rounding on the epoch grid matches calendar truncation.
        ts.duration_trunc(self.width()).unwrap_or(ts)
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Revenue of all purchases whose timestamp falls in
/// `[bucket_start, bucket_start + width)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueBucket {
    pub bucket_start: DateTime<Utc>,
    pub total_revenue: f64,
}

/// Lifetime per-product summary, one row per catalog product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductKpi {
    pub product_id: String,
    pub product_name: String,
    pub category: String,
    pub avg_rating: f64,
    pub review_count: i64,
    pub total_revenue: f64,
    pub units_sold: i64,
    /// Unweighted mean of `sale_price` over purchase line items.
    pub average_selling_price: Option<f64>,
    pub discounted_units_sold: i64,
    pub number_of_orders: i64,
    pub number_of_views: i64,
    pub view_to_sale_conversion_rate: Option<f64>,
    pub discount_effectiveness_ratio: Option<f64>,
}

/// Composite health of a product that sold at least one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductHealthScore {
    pub product_id: String,
    pub product_name: String,
    pub total_revenue: f64,
    pub avg_rating: f64,
    pub units_sold: i64,
    pub number_of_returns: i64,
    pub return_rate: Option<f64>,
    pub sales_rank_score: f64,
    pub rating_rank_score: f64,
    pub return_rank_score: f64,
    pub health_score: f64,
}

/// Latest-day view momentum for a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendingScore {
    pub product_id: String,
    pub view_date: NaiveDate,
    pub daily_views: i64,
    pub seven_day_avg_views: f64,
    pub twenty_eight_day_avg_views: f64,
    /// `None` when there is no baseline activity to compare against.
    pub trending_score: Option<f64>,
}
