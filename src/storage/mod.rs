//! Import of the legacy SQLite history.

pub mod migration;

pub use migration::{legacy_tables, LegacyTable, MigrationReport, Migrator, TableLayout, DEFAULT_BATCH_SIZE};
