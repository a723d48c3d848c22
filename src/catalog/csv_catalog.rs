use super::models::Product;
use super::CatalogSource;
use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Catalog read straight from a `products.csv` export.
///
/// The file is re-read on every call so each run sees the current snapshot.
pub struct CsvCatalog {
    path: PathBuf,
}

impl CsvCatalog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl CatalogSource for CsvCatalog {
    fn read_catalog(&self) -> Result<Vec<Product>> {
        let file = File::open(&self.path)
            .with_context(|| format!("Failed to open catalog file {:?}", self.path))?;
        read_products_csv(file).with_context(|| format!("Invalid catalog file {:?}", self.path))
    }
}

/// Parse a headered products CSV. Any malformed row fails the whole read:
/// a partial catalog would silently drop products from the KPI table.
/// `product_id` must be unique across the file.
pub fn read_products_csv<R: Read>(reader: R) -> Result<Vec<Product>> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut products = Vec::new();
    let mut first_seen: HashMap<String, usize> = HashMap::new();
    for (idx, record) in csv_reader.deserialize::<Product>().enumerate() {
        // +2: one for the header, one for 1-based numbering
        let row = idx + 2;
        let product = record.with_context(|| format!("Malformed catalog row {}", row))?;
        if let Some(first) = first_seen.insert(product.product_id.clone(), row) {
            bail!(
                "Duplicate product_id '{}' in catalog row {} (first seen in row {})",
                product.product_id,
                row,
                first
            );
        }
        products.push(product);
    }
    Ok(products)
}
