//! Database Schema Definitions
//!
//! Contains schema versions and the SQL applied for each migration.

/// Current database schema version
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Schema migration versions
pub const MIGRATION_VERSIONS: &[i32] = &[1];

/// Check if database needs migration
pub fn needs_migration(current_version: i32) -> bool {
    current_version < CURRENT_SCHEMA_VERSION
}

/// Get pending migrations
pub fn get_pending_migrations(current_version: i32) -> Vec<i32> {
    MIGRATION_VERSIONS
        .iter()
        .filter(|&&v| v > current_version)
        .cloned()
        .collect()
}

/// SQL applied by a migration
pub fn migration_sql(version: i32) -> Option<&'static str> {
    match version {
        1 => Some(include_str!("schema.sql")),
        _ => None,
    }
}
