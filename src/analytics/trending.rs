use super::models::TrendingScore;
use super::safe_div;
use crate::events::{Event, EventType};
use anyhow::{bail, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Trailing window lengths, counted in observed view days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendWindows {
    pub short_days: usize,
    pub long_days: usize,
}

impl Default for TrendWindows {
    fn default() -> Self {
        Self {
            short_days: 7,
            long_days: 28,
        }
    }
}

impl TrendWindows {
    pub fn validate(&self) -> Result<()> {
        if self.short_days == 0 || self.long_days == 0 {
            bail!("Trend windows must be at least one day");
        }
        if self.short_days > self.long_days {
            bail!(
                "Short trend window ({}) must not exceed long window ({})",
                self.short_days,
                self.long_days
            );
        }
        Ok(())
    }
}

/// Count `product_view` events per product and UTC calendar day.
pub fn daily_view_counts(events: &[Event]) -> BTreeMap<String, BTreeMap<NaiveDate, i64>> {
    let mut counts: BTreeMap<String, BTreeMap<NaiveDate, i64>> = BTreeMap::new();
    for event in events
        .iter()
        .filter(|e| e.event_type == EventType::ProductView)
    {
        *counts
            .entry(event.product_id.clone())
            .or_default()
            .entry(event.event_timestamp.date_naive())
            .or_insert(0) += 1;
    }
    counts
}

fn trailing_mean(series: &[i64], window: usize) -> f64 {
    let tail = &series[series.len().saturating_sub(window)..];
    if tail.is_empty() {
        return 0.0;
    }
    tail.iter().sum::<i64>() as f64 / tail.len() as f64
}

/// Score each product's most recent view day against its trailing baseline.
///
/// Windows slide over the days a product was actually viewed; days without
/// any view are not rows of the series. Products with no views are omitted.
pub fn detect_trends(events: &[Event], windows: &TrendWindows) -> Vec<TrendingScore> {
    daily_view_counts(events)
        .into_iter()
        .filter_map(|(product_id, days)| {
            let (&view_date, &daily_views) = days.iter().next_back()?;
            let series: Vec<i64> = days.into_values().collect();
            let short = trailing_mean(&series, windows.short_days);
            let long = trailing_mean(&series, windows.long_days);
            Some(TrendingScore {
                product_id,
                view_date,
                daily_views,
                seven_day_avg_views: short,
                twenty_eight_day_avg_views: long,
                trending_score: safe_div(short, long),
            })
        })
        .collect()
}
