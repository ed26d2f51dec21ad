//! SQLite metrics store
//!
//! Three append-only tables: aggregate cycle metrics, per-container stat rows
//! and per-process stat rows. Each insert is its own statement; there is no
//! transaction spanning a cycle.
//!
//! Memory columns hold whatever unit the recorder hands over. The recorder
//! divides stat rows by `stat_memory_divisor` (1 by default, so raw bytes);
//! aggregate rows always carry the snapshot's host totals unchanged.

use crate::error::{FleetError, Result};
use crate::models::{ContainerStatRow, MetricsRow, ProcessStatRow};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS metrics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp INTEGER NOT NULL,
    total_ram INTEGER,
    free_ram INTEGER,
    used_ram INTEGER,
    container_count INTEGER,
    process_count INTEGER,
    deleted_count INTEGER
);

CREATE TABLE IF NOT EXISTS container_stats (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp INTEGER NOT NULL,
    container_id TEXT,
    container_name TEXT,
    pid INTEGER,
    process_name TEXT,
    ram_usage INTEGER,
    cpu_usage INTEGER
);

CREATE TABLE IF NOT EXISTS process_stats (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp INTEGER NOT NULL,
    pid INTEGER,
    name TEXT,
    ram_usage INTEGER,
    cpu_usage INTEGER
);

CREATE INDEX IF NOT EXISTS idx_metrics_timestamp ON metrics(timestamp);
"#;

/// Aggregate view over the `metrics` table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSummary {
    pub cycles: i64,
    pub total_deleted: i64,
    pub first_timestamp: Option<i64>,
    pub last_timestamp: Option<i64>,
}

/// Single-connection metrics store
#[derive(Debug)]
pub struct MetricsStore {
    conn: Mutex<Connection>,
}

impl MetricsStore {
    /// Open (or create) the database and ensure the schema exists
    ///
    /// A failure here is the one fatal error of the governor.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| FleetError::StoreLocation {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let conn = Connection::open(path)?;
        let journal: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.execute_batch(SCHEMA)?;
        info!(path = %path.display(), journal = %journal, "Metrics store ready");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an existing database for reading only
    ///
    /// Neither the schema nor the journal mode is touched, and a missing file
    /// is an error rather than a fresh database.
    pub fn open_read_only(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store, schema included
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn insert_metrics(&self, row: &MetricsRow) -> Result<()> {
        self.conn().execute(
            "INSERT INTO metrics(timestamp, total_ram, free_ram, used_ram, container_count, process_count, deleted_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                row.timestamp,
                row.total_ram,
                row.free_ram,
                row.used_ram,
                row.container_count,
                row.process_count,
                row.deleted_count
            ],
        )?;
        Ok(())
    }

    pub fn insert_container_stat(&self, row: &ContainerStatRow) -> Result<()> {
        self.conn().execute(
            "INSERT INTO container_stats(timestamp, container_id, container_name, pid, process_name, ram_usage, cpu_usage)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                row.timestamp,
                row.container_id,
                row.container_name,
                row.pid,
                row.process_name,
                row.ram_usage,
                row.cpu_usage
            ],
        )?;
        Ok(())
    }

    pub fn insert_process_stat(&self, row: &ProcessStatRow) -> Result<()> {
        self.conn().execute(
            "INSERT INTO process_stats(timestamp, pid, name, ram_usage, cpu_usage)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![row.timestamp, row.pid, row.name, row.ram_usage, row.cpu_usage],
        )?;
        Ok(())
    }

    /// Most recent metrics rows, newest first
    pub fn recent_metrics(&self, limit: usize) -> Result<Vec<MetricsRow>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT timestamp, total_ram, free_ram, used_ram, container_count, process_count, deleted_count
             FROM metrics ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit_param(limit)], |row| {
                Ok(MetricsRow {
                    timestamp: row.get(0)?,
                    total_ram: row.get::<_, Option<i64>>(1)?.unwrap_or_default(),
                    free_ram: row.get::<_, Option<i64>>(2)?.unwrap_or_default(),
                    used_ram: row.get::<_, Option<i64>>(3)?.unwrap_or_default(),
                    container_count: row.get::<_, Option<i64>>(4)?.unwrap_or_default(),
                    process_count: row.get::<_, Option<i64>>(5)?.unwrap_or_default(),
                    deleted_count: row.get::<_, Option<i64>>(6)?.unwrap_or_default(),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Most recent container stat rows, newest first
    pub fn recent_container_stats(&self, limit: usize) -> Result<Vec<ContainerStatRow>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT timestamp, container_id, container_name, pid, process_name, ram_usage, cpu_usage
             FROM container_stats ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit_param(limit)], |row| {
                Ok(ContainerStatRow {
                    timestamp: row.get(0)?,
                    container_id: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    container_name: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    pid: row.get::<_, Option<i64>>(3)?.unwrap_or_default(),
                    process_name: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                    ram_usage: row.get::<_, Option<i64>>(5)?.unwrap_or_default(),
                    cpu_usage: row.get::<_, Option<i64>>(6)?.unwrap_or_default(),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Most recent process stat rows, newest first
    pub fn recent_process_stats(&self, limit: usize) -> Result<Vec<ProcessStatRow>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT timestamp, pid, name, ram_usage, cpu_usage
             FROM process_stats ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit_param(limit)], |row| {
                Ok(ProcessStatRow {
                    timestamp: row.get(0)?,
                    pid: row.get::<_, Option<i64>>(1)?.unwrap_or_default(),
                    name: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    ram_usage: row.get::<_, Option<i64>>(3)?.unwrap_or_default(),
                    cpu_usage: row.get::<_, Option<i64>>(4)?.unwrap_or_default(),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Cycle count, total evictions and covered time range
    pub fn metrics_summary(&self) -> Result<MetricsSummary> {
        let conn = self.conn();
        let summary = conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(deleted_count), 0), MIN(timestamp), MAX(timestamp) FROM metrics",
                [],
                |row| {
                    Ok(MetricsSummary {
                        cycles: row.get(0)?,
                        total_deleted: row.get(1)?,
                        first_timestamp: row.get(2)?,
                        last_timestamp: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(summary.unwrap_or_default())
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        // Statements never panic while holding the lock; recover the guard if one did
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_metrics_row_reads_back_exactly() {
        let store = MetricsStore::open_in_memory().unwrap();
        let row = MetricsRow {
            timestamp: 1_700_000_000_000,
            total_ram: 1000,
            free_ram: 400,
            used_ram: 600,
            container_count: 4,
            process_count: 12,
            deleted_count: 1,
        };

        store.insert_metrics(&row).unwrap();

        let rows = store.recent_metrics(10).unwrap();
        assert_eq!(rows, vec![row]);
    }

    #[test]
    fn test_large_values_survive() {
        let store = MetricsStore::open_in_memory().unwrap();
        let row = ProcessStatRow {
            timestamp: 1,
            pid: 4_194_304,
            name: "java".to_string(),
            ram_usage: i64::MAX,
            cpu_usage: 0,
        };
        store.insert_process_stat(&row).unwrap();
        assert_eq!(store.recent_process_stats(1).unwrap()[0], row);
    }

    #[test]
    fn test_recent_rows_newest_first_and_limited() {
        let store = MetricsStore::open_in_memory().unwrap();
        for ts in 1..=5 {
            store
                .insert_container_stat(&ContainerStatRow {
                    timestamp: ts,
                    container_id: format!("c{ts}"),
                    container_name: "so1_low".to_string(),
                    pid: ts,
                    process_name: "sleep".to_string(),
                    ram_usage: 10,
                    cpu_usage: 0,
                })
                .unwrap();
        }

        let rows = store.recent_container_stats(2).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].timestamp, 5);
        assert_eq!(rows[1].container_id, "c4");
    }

    #[test]
    fn test_summary() {
        let store = MetricsStore::open_in_memory().unwrap();
        assert_eq!(store.metrics_summary().unwrap().cycles, 0);

        for (ts, deleted) in [(100, 2), (200, 0), (300, 3)] {
            store
                .insert_metrics(&MetricsRow {
                    timestamp: ts,
                    total_ram: 0,
                    free_ram: 0,
                    used_ram: 0,
                    container_count: 0,
                    process_count: 0,
                    deleted_count: deleted,
                })
                .unwrap();
        }

        let summary = store.metrics_summary().unwrap();
        assert_eq!(summary.cycles, 3);
        assert_eq!(summary.total_deleted, 5);
        assert_eq!(summary.first_timestamp, Some(100));
        assert_eq!(summary.last_timestamp, Some(300));
    }

    #[test]
    fn test_open_creates_file_and_is_reopenable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("metrics.db");

        {
            let store = MetricsStore::open(&path).unwrap();
            store
                .insert_process_stat(&ProcessStatRow {
                    timestamp: 1,
                    pid: 1,
                    name: "init".to_string(),
                    ram_usage: 1,
                    cpu_usage: 0,
                })
                .unwrap();
        }

        let reopened = MetricsStore::open(&path).unwrap();
        assert_eq!(reopened.recent_process_stats(10).unwrap().len(), 1);
    }

    #[test]
    fn test_read_only_store_reads_but_rejects_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metrics.db");
        let row = MetricsRow {
            timestamp: 10,
            total_ram: 100,
            free_ram: 40,
            used_ram: 60,
            container_count: 2,
            process_count: 9,
            deleted_count: 0,
        };
        MetricsStore::open(&path).unwrap().insert_metrics(&row).unwrap();

        let store = MetricsStore::open_read_only(&path).unwrap();
        assert_eq!(store.recent_metrics(5).unwrap(), vec![row.clone()]);
        assert!(store.insert_metrics(&row).is_err());
        assert_eq!(store.metrics_summary().unwrap().cycles, 1);
    }

    #[test]
    fn test_read_only_open_never_creates_a_database() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.db");

        let err = MetricsStore::open_read_only(&path).unwrap_err();
        assert!(matches!(err, FleetError::Persistence(_)), "got {err:?}");
        assert!(!path.exists());
    }
}
