use super::models::Product;
use super::schema::CATALOG_VERSIONED_SCHEMAS;
use super::CatalogSource;
use crate::sqlite_persistence::open_versioned_db;
use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

/// Catalog snapshot kept in `catalog.db`.
pub struct SqliteCatalogStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCatalogStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_db(db_path, CATALOG_VERSIONED_SCHEMAS, "catalog")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Catalog database connection lock poisoned"))
    }

    /// Replace the whole snapshot in one transaction.
    pub fn replace_products(&self, products: &[Product]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM products", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO products
                 (product_id, product_name, category, regular_price, avg_rating, review_count, in_stock)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for p in products {
                stmt.execute(params![
                    p.product_id,
                    p.product_name,
                    p.category,
                    p.regular_price,
                    p.avg_rating,
                    p.review_count,
                    p.in_stock as i64,
                ])
                .with_context(|| format!("Failed to insert product {}", p.product_id))?;
            }
        }
        tx.commit()?;
        info!("Catalog snapshot replaced with {} products", products.len());
        Ok(products.len())
    }
}

impl CatalogSource for SqliteCatalogStore {
    fn read_catalog(&self) -> Result<Vec<Product>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT product_id, product_name, category, regular_price, avg_rating, review_count, in_stock
             FROM products ORDER BY product_id",
        )?;
        let products = stmt
            .query_map([], |row| {
                Ok(Product {
                    product_id: row.get(0)?,
                    product_name: row.get(1)?,
                    category: row.get(2)?,
                    regular_price: row.get(3)?,
                    avg_rating: row.get(4)?,
                    review_count: row.get(5)?,
                    in_stock: row.get::<_, i64>(6)? != 0,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read catalog")?;
        Ok(products)
    }
}
