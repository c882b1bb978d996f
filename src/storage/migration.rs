use chrono::{TimeZone, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;

use crate::devices::{kaco, Measurement, Values};
use crate::output::{Point, TimeSeriesBackend};
use crate::utils::error::SolarError;

pub const DEFAULT_BATCH_SIZE: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableLayout {
    /// `(timestamp, total_power_active)`
    Meter,
    /// `(timestamp, status, <8 inverter values>)`
    Inverter,
}

/// One legacy table and the measurement name its rows are written under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyTable {
    pub table: String,
    pub measurement: String,
    pub layout: TableLayout,
}

impl LegacyTable {
    pub fn new(table: &str, measurement: &str, layout: TableLayout) -> Self {
        Self {
            table: table.to_string(),
            measurement: measurement.to_string(),
            layout,
        }
    }
}

/// Tables of the old SolarPi.db.
pub fn legacy_tables() -> Vec<LegacyTable> {
    vec![
        LegacyTable::new("sdm630", "sdm630", TableLayout::Meter),
        LegacyTable::new("WR1", "WR Garage", TableLayout::Inverter),
        LegacyTable::new("WR2", "WR Schipf", TableLayout::Inverter),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// `(table, rows)` in migration order.
    pub tables: Vec<(String, usize)>,
}

impl MigrationReport {
    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|(_, rows)| rows).sum()
    }
}

/// Copies rows from a legacy SQLite database into a time-series backend.
pub struct Migrator {
    pool: SqlitePool,
    batch_size: usize,
}

impl Migrator {
    /// Opens `path` read-only.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, SolarError> {
        let path = path.as_ref();
        info!("🗄️  Opening legacy database {}", path.display());
        let options = SqliteConnectOptions::new().filename(path).read_only(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub async fn run<B: TimeSeriesBackend>(
        &self,
        tables: &[LegacyTable],
        backend: &mut B,
        bucket: &str,
    ) -> Result<MigrationReport, SolarError> {
        backend.open().await?;
        info!("🚚 Migrating {} table(s) to {}", tables.len(), backend.destination());

        let mut report = MigrationReport { tables: Vec::new() };
        for table in tables {
            let rows = self.migrate_table(table, backend, bucket).await?;
            info!("✅ {} -> {}: {} row(s)", table.table, table.measurement, rows);
            report.tables.push((table.table.clone(), rows));
        }

        info!("🏁 Migration finished: {} row(s)", report.total_rows());
        Ok(report)
    }

    async fn migrate_table<B: TimeSeriesBackend>(
        &self,
        table: &LegacyTable,
        backend: &mut B,
        bucket: &str,
    ) -> Result<usize, SolarError> {
        let query = format!("SELECT * FROM \"{}\"", table.table.replace('"', "\"\""));
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        let mut batch = Vec::with_capacity(self.batch_size);
        for row in &rows {
            batch.push(row_to_point(table, row)?);
            if batch.len() == self.batch_size {
                debug!("Writing batch of {} from {}", batch.len(), table.table);
                backend.write_batch(bucket, std::mem::take(&mut batch)).await?;
            }
        }
        if !batch.is_empty() {
            backend.write_batch(bucket, batch).await?;
        }
        Ok(rows.len())
    }
}

fn row_to_point(table: &LegacyTable, row: &SqliteRow) -> Result<Point, SolarError> {
    let seconds = column_f64(row, 0)? as i64;
    let timestamp = Utc
        .timestamp_opt(seconds, 0)
        .single()
        .ok_or_else(|| SolarError::InvalidData(format!("Bad timestamp {} in {}", seconds, table.table)))?;

    let mut values = Values::new();
    match table.layout {
        TableLayout::Meter => values.insert("total_power_active", column_f64(row, 1)?),
        TableLayout::Inverter => {
            for (index, name) in kaco::field_names().enumerate() {
                let value = column_f64(row, index + 1)?;
                if index == 0 {
                    values.insert(name, value as i64);
                } else {
                    values.insert(name, value);
                }
            }
        }
    }

    Ok(Point::from_measurement(&Measurement::new(
        table.measurement.as_str(),
        values,
        timestamp,
    )))
}

/// The legacy schema has no declared column types; values may be stored as
/// REAL, INTEGER or TEXT.
fn column_f64(row: &SqliteRow, index: usize) -> Result<f64, SolarError> {
    if let Ok(value) = row.try_get::<f64, _>(index) {
        return Ok(value);
    }
    if let Ok(value) = row.try_get::<i64, _>(index) {
        return Ok(value as f64);
    }
    let text: String = row.try_get(index)?;
    text.trim()
        .parse()
        .map_err(|_| SolarError::InvalidData(format!("Column {} is not numeric: {:?}", index, text)))
}
