//! Database schema for impressions.db.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

const IMPRESSION_COUNTERS_TABLE_V0: Table = Table {
    name: "impression_counters",
    columns: &[
        sqlite_column!("subject_id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "impressions",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        // Unix millis of the last increment.
        sqlite_column!("updated_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[],
};

pub const IMPRESSIONS_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[IMPRESSION_COUNTERS_TABLE_V0],
    migration: None,
}];
