//! Composite product health score.
//!
//! Three metrics are normalized into percent ranks across the products that
//! sold at least one unit:
//! - **Sales**: lifetime `total_revenue`, higher is better
//! - **Rating**: catalog `avg_rating`, higher is better
//! - **Returns**: `number_of_returns / units_sold`, lower is better (rank inverted)
//!
//! The weighted sum is scaled to [0, 100] and rounded to two decimals.

use super::models::{ProductHealthScore, ProductKpi};
use super::{round_to, safe_div};
use crate::events::{Event, EventType};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthWeights {
    pub sales: f64,
    pub rating: f64,
    pub returns: f64,
}

impl Default for HealthWeights {
    fn default() -> Self {
        Self {
            sales: 0.50,
            rating: 0.30,
            returns: 0.20,
        }
    }
}

impl HealthWeights {
    /// Weights must be non-negative and sum to 1 so scores stay in [0, 100].
    pub fn validate(&self) -> Result<()> {
        for (name, weight) in [
            ("sales", self.sales),
            ("rating", self.rating),
            ("returns", self.returns),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                bail!("Health weight '{}' must be a non-negative number, got {}", name, weight);
            }
        }
        let sum = self.sales + self.rating + self.returns;
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            bail!("Health weights must sum to 1.0, got {}", sum);
        }
        Ok(())
    }
}

/// Ascending percent rank of each value, in input order.
///
/// `rank = 1 + #{strictly smaller values}`, so ties share the lowest rank,
/// and the result is `(rank - 1) / (n - 1)`. A population of one ranks 0.
pub fn percent_rank(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n <= 1 {
        return vec![0.0; n];
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let denominator = (n - 1) as f64;

    values
        .iter()
        .map(|value| {
            let smaller = sorted.partition_point(|candidate| candidate < value);
            smaller as f64 / denominator
        })
        .collect()
}

/// Count of `return_item` events per product.
pub fn returns_by_product(events: &[Event]) -> HashMap<&str, i64> {
    let mut returns: HashMap<&str, i64> = HashMap::new();
    for event in events
        .iter()
        .filter(|e| e.event_type == EventType::ReturnItem)
    {
        *returns.entry(event.product_id.as_str()).or_insert(0) += 1;
    }
    returns
}

/// Score every KPI row with `units_sold > 0`.
///
/// Output is ordered by `health_score` descending, then by `product_id`.
pub fn score_products(
    kpis: &[ProductKpi],
    return_events: &[Event],
    weights: &HealthWeights,
) -> Vec<ProductHealthScore> {
    let returns = returns_by_product(return_events);
    let eligible: Vec<&ProductKpi> = kpis.iter().filter(|k| k.units_sold > 0).collect();

    let number_of_returns: Vec<i64> = eligible
        .iter()
        .map(|k| returns.get(k.product_id.as_str()).copied().unwrap_or(0))
        .collect();
    let return_rates: Vec<Option<f64>> = eligible
        .iter()
        .zip(&number_of_returns)
        .map(|(k, &n)| safe_div(n as f64, k.units_sold as f64))
        .collect();

    let revenues: Vec<f64> = eligible.iter().map(|k| k.total_revenue).collect();
    let ratings: Vec<f64> = eligible.iter().map(|k| k.avg_rating).collect();
    let rates: Vec<f64> = return_rates.iter().map(|r| r.unwrap_or(0.0)).collect();

    let sales_ranks = percent_rank(&revenues);
    let rating_ranks = percent_rank(&ratings);
    let return_ranks = percent_rank(&rates);

    let mut scores: Vec<ProductHealthScore> = eligible
        .iter()
        .enumerate()
        .map(|(i, kpi)| {
            let sales_rank_score = sales_ranks[i];
            let rating_rank_score = rating_ranks[i];
            let return_rank_score = 1.0 - return_ranks[i];
            let composite = sales_rank_score * weights.sales
                + rating_rank_score * weights.rating
                + return_rank_score * weights.returns;

            ProductHealthScore {
                product_id: kpi.product_id.clone(),
                product_name: kpi.product_name.clone(),
                total_revenue: kpi.total_revenue,
                avg_rating: kpi.avg_rating,
                units_sold: kpi.units_sold,
                number_of_returns: number_of_returns[i],
                return_rate: return_rates[i],
                sales_rank_score,
                rating_rank_score,
                return_rank_score,
                health_score: round_to(composite * 100.0, 2),
            }
        })
        .collect();

    scores.sort_by(|a, b| {
        b.health_score
            .partial_cmp(&a.health_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.product_id.cmp(&b.product_id))
    });
    scores
}
