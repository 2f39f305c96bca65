//! Local SQLite cache for fetched metric series.
//!
//! Historical valuation rows never change once published, so a series
//! fetched for `(code, start, end)` can be replayed from disk on later
//! runs without touching the gateway. Cache writes are best-effort; a
//! failed save is logged and the in-memory series is used as-is.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;
use tokio::sync::Mutex;

use super::{MetricPoint, MetricSeries};

/// Local storage configuration.
#[derive(Debug, Clone)]
pub struct LocalStorageConfig {
    /// SQLite database file path
    pub db_path: PathBuf,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        let dir = dirs::home_dir()
            .map_or_else(|| PathBuf::from(".meanrev"), |home| home.join(".meanrev"));
        Self {
            db_path: dir.join("cache.db"),
        }
    }
}

/// Cache usage statistics.
#[derive(Debug, Clone, Copy)]
pub struct LocalStorageStats {
    /// Number of cached series ranges
    pub series_count: u64,
    /// Number of cached metric points
    pub point_count: u64,
}

/// SQLite-backed metric series cache.
pub struct LocalStorage {
    conn: Mutex<Connection>,
}

impl LocalStorage {
    /// Open (or create) the cache database and initialize the schema.
    pub fn open(config: &LocalStorageConfig) -> Result<Self> {
        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create cache dir {}", parent.display()))?;
        }

        let conn = Connection::open(&config.db_path)
            .with_context(|| format!("Failed to open cache db {}", config.db_path.display()))?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory cache (used by tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory cache")?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS metric_series (
                code        TEXT NOT NULL,
                range_start TEXT NOT NULL,
                range_end   TEXT NOT NULL,
                fetched_at  TEXT NOT NULL,
                PRIMARY KEY (code, range_start, range_end)
            );

            CREATE TABLE IF NOT EXISTS metric_points (
                code        TEXT NOT NULL,
                range_start TEXT NOT NULL,
                range_end   TEXT NOT NULL,
                date        TEXT NOT NULL,
                pe_ttm      REAL,
                pb_mrq      REAL,
                PRIMARY KEY (code, range_start, range_end, date)
            );
            "#,
        )
        .context("Failed to initialize cache schema")?;
        Ok(())
    }

    /// Persist a fetched series under its requested range.
    pub async fn save_metric_series(&self, series: &MetricSeries) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().context("Failed to begin cache tx")?;

        let start = series.start.to_string();
        let end = series.end.to_string();

        tx.execute(
            "INSERT OR REPLACE INTO metric_series (code, range_start, range_end, fetched_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                series.code,
                start,
                end,
                chrono::Utc::now().to_rfc3339()
            ],
        )?;

        tx.execute(
            "DELETE FROM metric_points WHERE code = ?1 AND range_start = ?2 AND range_end = ?3",
            params![series.code, start, end],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO metric_points (code, range_start, range_end, date, pe_ttm, pb_mrq)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for point in series.iter() {
                stmt.execute(params![
                    series.code,
                    start,
                    end,
                    point.date.to_string(),
                    point.pe_ttm,
                    point.pb_mrq,
                ])?;
            }
        }

        tx.commit().context("Failed to commit cached series")?;
        Ok(())
    }

    /// Load a previously cached series for the exact requested range.
    pub async fn load_metric_series(
        &self,
        code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<MetricSeries>> {
        let conn = self.conn.lock().await;

        let exists: Option<String> = conn
            .query_row(
                "SELECT fetched_at FROM metric_series
                 WHERE code = ?1 AND range_start = ?2 AND range_end = ?3",
                params![code, start.to_string(), end.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        if exists.is_none() {
            return Ok(None);
        }

        let mut stmt = conn.prepare(
            "SELECT date, pe_ttm, pb_mrq FROM metric_points
             WHERE code = ?1 AND range_start = ?2 AND range_end = ?3
             ORDER BY date ASC",
        )?;

        let points = stmt
            .query_map(params![code, start.to_string(), end.to_string()], |row| {
                let date: String = row.get(0)?;
                Ok((date, row.get::<_, Option<f64>>(1)?, row.get::<_, Option<f64>>(2)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .filter_map(|(date, pe_ttm, pb_mrq)| {
                let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").ok()?;
                Some(MetricPoint {
                    date,
                    pe_ttm,
                    pb_mrq,
                })
            })
            .collect();

        Ok(Some(MetricSeries::new(code, start, end, points)))
    }

    /// Cache usage counts for diagnostics.
    pub async fn stats(&self) -> Result<LocalStorageStats> {
        let conn = self.conn.lock().await;

        let series_count: u64 =
            conn.query_row("SELECT COUNT(*) FROM metric_series", [], |row| row.get(0))?;
        let point_count: u64 =
            conn.query_row("SELECT COUNT(*) FROM metric_points", [], |row| row.get(0))?;

        Ok(LocalStorageStats {
            series_count,
            point_count,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
