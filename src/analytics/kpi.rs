use super::models::ProductKpi;
use super::safe_div;
use crate::catalog::Product;
use crate::events::{Event, EventType};
use std::collections::{HashMap, HashSet};

#[derive(Default)]
struct SalesAggregate<'a> {
    total_revenue: f64,
    units_sold: i64,
    price_sum: f64,
    priced_lines: i64,
    discounted_units_sold: i64,
    sessions: HashSet<&'a str>,
}

fn sales_by_product(events: &[Event]) -> HashMap<&str, SalesAggregate<'_>> {
    let mut sales: HashMap<&str, SalesAggregate> = HashMap::new();
    for event in events
        .iter()
        .filter(|e| e.event_type == EventType::Purchase)
    {
        let agg = sales.entry(event.product_id.as_str()).or_default();
        agg.total_revenue += event.line_revenue().unwrap_or(0.0);
        agg.units_sold += event.quantity;
        if let Some(price) = event.sale_price {
            agg.price_sum += price;
            agg.priced_lines += 1;
        }
        if event.on_sale {
            agg.discounted_units_sold += event.quantity;
        }
        agg.sessions.insert(event.session_id.as_str());
    }
    sales
}

fn views_by_product(events: &[Event]) -> HashMap<&str, i64> {
    let mut views: HashMap<&str, i64> = HashMap::new();
    for event in events
        .iter()
        .filter(|e| e.event_type == EventType::ProductView)
    {
        *views.entry(event.product_id.as_str()).or_insert(0) += 1;
    }
    views
}

/// Lifetime KPIs for every catalog product, sorted by `product_id`.
///
/// Activity for products missing from the catalog is dropped; catalog
/// products without activity get zero counts and `None` ratios.
pub fn rollup_kpis(purchases: &[Event], views: &[Event], catalog: &[Product]) -> Vec<ProductKpi> {
    let sales = sales_by_product(purchases);
    let views = views_by_product(views);

    let mut kpis: Vec<ProductKpi> = catalog
        .iter()
        .map(|product| {
            let number_of_views = views.get(product.product_id.as_str()).copied().unwrap_or(0);
            let agg = sales.get(product.product_id.as_str());
            let units_sold = agg.map_or(0, |a| a.units_sold);
            let discounted_units_sold = agg.map_or(0, |a| a.discounted_units_sold);
            let number_of_orders = agg.map_or(0, |a| a.sessions.len() as i64);

            ProductKpi {
                product_id: product.product_id.clone(),
                product_name: product.product_name.clone(),
                category: product.category.clone(),
                avg_rating: product.avg_rating,
                review_count: product.review_count,
                total_revenue: agg.map_or(0.0, |a| a.total_revenue),
                units_sold,
                average_selling_price: agg
                    .and_then(|a| safe_div(a.price_sum, a.priced_lines as f64)),
                discounted_units_sold,
                number_of_orders,
                number_of_views,
                view_to_sale_conversion_rate: safe_div(
                    number_of_orders as f64,
                    number_of_views as f64,
                ),
                discount_effectiveness_ratio: safe_div(
                    discounted_units_sold as f64,
                    units_sold as f64,
                ),
            }
        })
        .collect();

    kpis.sort_by(|a, b| a.product_id.cmp(&b.product_id));
    kpis
}
