//! SQLite schema for the metrics database.
//!
//! Holds every derived table the engine owns, the pipeline state (revenue
//! watermarks) and the background job bookkeeping.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP};

// =============================================================================
// Version 1 - Job runs, pipeline state, revenue buckets
// =============================================================================

const JOB_RUNS_TABLE_V1: Table = Table {
    name: "job_runs",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("job_id", &SqlType::Text, non_null = true),
        sqlite_column!("started_at", &SqlType::Text, non_null = true),
        sqlite_column!("finished_at", &SqlType::Text),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("error_message", &SqlType::Text),
        sqlite_column!("triggered_by", &SqlType::Text, non_null = true),
    ],
    indices: &[
        ("idx_job_runs_job_id_started", "job_id, started_at DESC"),
        ("idx_job_runs_status", "status"),
    ],
    unique_constraints: &[],
};

const JOB_SCHEDULES_TABLE_V1: Table = Table {
    name: "job_schedules",
    columns: &[
        sqlite_column!("job_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("next_run_at", &SqlType::Text, non_null = true),
        sqlite_column!("last_run_at", &SqlType::Text),
    ],
    indices: &[],
    unique_constraints: &[],
};

/// Key-value state owned by the pipeline, e.g. revenue watermarks.
const PIPELINE_STATE_TABLE_V1: Table = Table {
    name: "pipeline_state",
    columns: &[
        sqlite_column!("key", &SqlType::Text, is_primary_key = true),
        sqlite_column!("value", &SqlType::Text, non_null = true),
        sqlite_column!(
            "updated_at",
            &SqlType::Text,
            non_null = true,
            default_value = Some("(datetime('now'))")
        ),
    ],
    indices: &[],
    unique_constraints: &[],
};

// bucket_start is unix seconds of the UTC bucket start
const REVENUE_HOURLY_TABLE_V1: Table = Table {
    name: "revenue_hourly",
    columns: &[
        sqlite_column!("bucket_start", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("total_revenue", &SqlType::Real, non_null = true),
        sqlite_column!(
            "updated_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[],
    unique_constraints: &[],
};

const REVENUE_DAILY_TABLE_V1: Table = Table {
    name: "revenue_daily",
    columns: &[
        sqlite_column!("bucket_start", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("total_revenue", &SqlType::Real, non_null = true),
        sqlite_column!(
            "updated_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[],
    unique_constraints: &[],
};

// =============================================================================
// Version 2 - Product snapshots
// =============================================================================

const PRODUCT_KPIS_TABLE_V2: Table = Table {
    name: "product_kpis",
    columns: &[
        sqlite_column!("product_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("product_name", &SqlType::Text, non_null = true),
        sqlite_column!("category", &SqlType::Text, non_null = true),
        sqlite_column!("avg_rating", &SqlType::Real, non_null = true),
        sqlite_column!("review_count", &SqlType::Integer, non_null = true),
        sqlite_column!("total_revenue", &SqlType::Real, non_null = true),
        sqlite_column!("units_sold", &SqlType::Integer, non_null = true),
        sqlite_column!("average_selling_price", &SqlType::Real),
        sqlite_column!("discounted_units_sold", &SqlType::Integer, non_null = true),
        sqlite_column!("number_of_orders", &SqlType::Integer, non_null = true),
        sqlite_column!("number_of_views", &SqlType::Integer, non_null = true),
        sqlite_column!("view_to_sale_conversion_rate", &SqlType::Real),
        sqlite_column!("discount_effectiveness_ratio", &SqlType::Real),
    ],
    indices: &[("idx_product_kpis_category", "category")],
    unique_constraints: &[],
};

const PRODUCT_HEALTH_SCORES_TABLE_V2: Table = Table {
    name: "product_health_scores",
    columns: &[
        sqlite_column!("product_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("product_name", &SqlType::Text, non_null = true),
        sqlite_column!("total_revenue", &SqlType::Real, non_null = true),
        sqlite_column!("avg_rating", &SqlType::Real, non_null = true),
        sqlite_column!("units_sold", &SqlType::Integer, non_null = true),
        sqlite_column!("number_of_returns", &SqlType::Integer, non_null = true),
        sqlite_column!("return_rate", &SqlType::Real),
        sqlite_column!("sales_rank_score", &SqlType::Real, non_null = true),
        sqlite_column!("rating_rank_score", &SqlType::Real, non_null = true),
        sqlite_column!("return_rank_score", &SqlType::Real, non_null = true),
        sqlite_column!("health_score", &SqlType::Real, non_null = true),
    ],
    indices: &[("idx_product_health_scores_score", "health_score DESC")],
    unique_constraints: &[],
};

const TRENDING_SCORES_TABLE_V2: Table = Table {
    name: "trending_scores",
    columns: &[
        sqlite_column!("product_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("view_date", &SqlType::Text, non_null = true), // YYYY-MM-DD
        sqlite_column!("daily_views", &SqlType::Integer, non_null = true),
        sqlite_column!("seven_day_avg_views", &SqlType::Real, non_null = true),
        sqlite_column!("twenty_eight_day_avg_views", &SqlType::Real, non_null = true),
        sqlite_column!("trending_score", &SqlType::Real),
    ],
    indices: &[],
    unique_constraints: &[],
};

fn migrate_v1_to_v2(conn: &rusqlite::Connection) -> anyhow::Result<()> {
    for table in [
        &PRODUCT_KPIS_TABLE_V2,
        &PRODUCT_HEALTH_SCORES_TABLE_V2,
        &TRENDING_SCORES_TABLE_V2,
    ] {
        table.create(conn)?;
    }
    Ok(())
}

// =============================================================================
// Versioned Schema Definition
// =============================================================================

/// Version 1: job bookkeeping, pipeline state, revenue buckets
/// Version 2: product KPI, health and trending snapshots
pub const METRICS_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 1,
        tables: &[
            JOB_RUNS_TABLE_V1,
            JOB_SCHEDULES_TABLE_V1,
            PIPELINE_STATE_TABLE_V1,
            REVENUE_HOURLY_TABLE_V1,
            REVENUE_DAILY_TABLE_V1,
        ],
        migration: None,
    },
    VersionedSchema {
        version: 2,
        tables: &[
            JOB_RUNS_TABLE_V1,
            JOB_SCHEDULES_TABLE_V1,
            PIPELINE_STATE_TABLE_V1,
            REVENUE_HOURLY_TABLE_V1,
            REVENUE_DAILY_TABLE_V1,
            PRODUCT_KPIS_TABLE_V2,
            PRODUCT_HEALTH_SCORES_TABLE_V2,
            TRENDING_SCORES_TABLE_V2,
        ],
        migration: Some(migrate_v1_to_v2),
    },
];
