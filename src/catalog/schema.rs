use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP};

const PRODUCTS_TABLE_V1: Table = Table {
    name: "products",
    columns: &[
        sqlite_column!("product_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("product_name", &SqlType::Text, non_null = true),
        sqlite_column!("category", &SqlType::Text, non_null = true),
        sqlite_column!("regular_price", &SqlType::Real, non_null = true),
        sqlite_column!("avg_rating", &SqlType::Real, non_null = true),
        sqlite_column!("review_count", &SqlType::Integer, non_null = true),
        sqlite_column!("in_stock", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "imported_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_products_category", "category")],
    unique_constraints: &[],
};

pub const CATALOG_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[PRODUCTS_TABLE_V1],
    migration: None,
}];
