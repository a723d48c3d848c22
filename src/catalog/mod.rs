//! Product catalog snapshots.
//!
//! The catalog is maintained outside the engine; a run only needs a complete,
//! consistent snapshot keyed by `product_id`.

mod csv_catalog;
mod models;
mod schema;
mod sqlite_catalog_store;

pub use csv_catalog::{read_products_csv, CsvCatalog};
pub use models::Product;
pub use schema::CATALOG_VERSIONED_SCHEMAS;
pub use sqlite_catalog_store::SqliteCatalogStore;

use anyhow::Result;

pub trait CatalogSource: Send + Sync {
    /// Read the full current catalog.
    fn read_catalog(&self) -> Result<Vec<Product>>;
}
