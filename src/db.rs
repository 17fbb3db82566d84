// src/db.rs
//
// SQLite persistence for the experiment record. Runs are created
// idempotently by name; zone metrics rows are append-only — existing
// rows are never updated in place. A persistence failure is the one
// error class that must propagate to the caller: silently dropping
// computed metrics would corrupt the experiment record.

use crate::types::ZoneMetrics;
use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use std::path::Path;
use tracing::info;

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("failed to open SQLite database {}", db_path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let db = Self { conn };
        db.create_tables()?;
        info!("database ready at {}", db_path.display());
        Ok(db)
    }

    #[cfg(test)]
    fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let db = Self { conn };
        db.create_tables()?;
        Ok(db)
    }

    fn create_tables(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS runs (
                     id INTEGER PRIMARY KEY AUTOINCREMENT,
                     run_name TEXT UNIQUE
                 );
                 CREATE TABLE IF NOT EXISTS zone_metrics (
                     id INTEGER PRIMARY KEY AUTOINCREMENT,
                     run_id INTEGER,
                     run_name TEXT,
                     zone_name TEXT,
                     avg_small_count REAL,
                     avg_medium_count REAL,
                     avg_large_count REAL,
                     avg_small_velocity REAL,
                     avg_medium_velocity REAL,
                     avg_large_velocity REAL,
                     FOREIGN KEY (run_id) REFERENCES runs(id)
                 );",
            )
            .context("failed to create tables")?;
        Ok(())
    }

    /// Idempotent upsert keyed by name: calling twice with the same name
    /// returns the same id.
    pub fn insert_run(&self, run_name: &str) -> Result<i64> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO runs (run_name) VALUES (?1)",
                params![run_name],
            )
            .with_context(|| format!("failed to insert run '{run_name}'"))?;

        let run_id: i64 = self
            .conn
            .query_row(
                "SELECT id FROM runs WHERE run_name = ?1",
                params![run_name],
                |row| row.get(0),
            )
            .with_context(|| format!("failed to look up run '{run_name}'"))?;
        Ok(run_id)
    }

    /// Append-only insert; one row per pipeline execution per zone.
    pub fn insert_zone_metrics(&self, run_id: i64, metrics: &ZoneMetrics) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO zone_metrics (
                     run_id, run_name, zone_name,
                     avg_small_count, avg_medium_count, avg_large_count,
                     avg_small_velocity, avg_medium_velocity, avg_large_velocity
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    run_id,
                    metrics.run_name,
                    metrics.zone_name,
                    metrics.avg_small_count,
                    metrics.avg_medium_count,
                    metrics.avg_large_count,
                    metrics.avg_small_velocity,
                    metrics.avg_medium_velocity,
                    metrics.avg_large_velocity,
                ],
            )
            .with_context(|| {
                format!(
                    "failed to insert metrics for {} / {}",
                    metrics.run_name, metrics.zone_name
                )
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(run: &str, zone: &str) -> ZoneMetrics {
        ZoneMetrics {
            run_name: run.into(),
            zone_name: zone.into(),
            avg_small_count: 1.5,
            avg_medium_count: 0.5,
            avg_large_count: 0.0,
            avg_small_velocity: 0.15,
            avg_medium_velocity: 0.0,
            avg_large_velocity: 0.0,
        }
    }

    #[test]
    fn insert_run_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let first = db.insert_run("R1").unwrap();
        let second = db.insert_run("R1").unwrap();
        assert_eq!(first, second);

        let other = db.insert_run("R2").unwrap();
        assert_ne!(first, other);
    }

    #[test]
    fn zone_metrics_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let run_id = db.insert_run("R1").unwrap();
        db.insert_zone_metrics(run_id, &metrics("R1", "SU")).unwrap();

        let (zone, small_count, small_vel): (String, f64, f64) = db
            .conn
            .query_row(
                "SELECT zone_name, avg_small_count, avg_small_velocity
                 FROM zone_metrics WHERE run_id = ?1",
                params![run_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(zone, "SU");
        assert_eq!(small_count, 1.5);
        assert_eq!(small_vel, 0.15);
    }

    #[test]
    fn zone_metrics_are_append_only() {
        let db = Database::open_in_memory().unwrap();
        let run_id = db.insert_run("R1").unwrap();
        db.insert_zone_metrics(run_id, &metrics("R1", "SU")).unwrap();
        db.insert_zone_metrics(run_id, &metrics("R1", "SU")).unwrap();

        let rows: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM zone_metrics", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 2);
    }
}
