use crate::error::{Result, TimekeepError};
use crate::model::{CommitRecord, ProjectReport};
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

pub const CACHE_SCHEMA_VERSION: u32 = 1;

/// SQLite store for finished project reports and the export ledger.
pub struct Cache {
    conn: Connection,
}

impl Cache {
    pub fn new<CP: AsRef<Path>>(cache_path: Option<CP>) -> Result<Self> {
        let cache_dir = match cache_path {
            Some(path) => path.as_ref().to_path_buf(),
            None => default_dir()?,
        };
        std::fs::create_dir_all(&cache_dir)?;
        let conn = Connection::open(cache_dir.join("cache.db"))?;
        let mut cache = Self { conn };
        cache.initialize()?;
        Ok(cache)
    }

    pub fn in_memory() -> Result<Self> {
        let mut cache = Self {
            conn: Connection::open_in_memory()?,
        };
        cache.initialize()?;
        Ok(cache)
    }

    fn initialize(&mut self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS reports (
                project TEXT NOT NULL,
                day TEXT NOT NULL,
                fingerprint TEXT NOT NULL,
                report TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (project, day)
            );
            CREATE TABLE IF NOT EXISTS exports (
                project TEXT NOT NULL,
                day TEXT NOT NULL,
                task_id TEXT NOT NULL,
                entry TEXT NOT NULL,
                hours REAL NOT NULL,
                exported_at INTEGER NOT NULL,
                PRIMARY KEY (project, day, task_id, entry)
            );
            ",
        )?;
        self.check_schema_version()?;
        Ok(())
    }

    fn check_schema_version(&mut self) -> Result<()> {
        let user_version: i64 = self
            .conn
            .query_row("PRAGMA user_version;", [], |row| row.get(0))?;

        if user_version == 0 {
            let set_stmt = format!("PRAGMA user_version = {CACHE_SCHEMA_VERSION};");
            self.conn.execute_batch(&set_stmt)?;
        } else if user_version != CACHE_SCHEMA_VERSION as i64 {
            return Err(TimekeepError::Cache(format!(
                "Schema version mismatch: expected {}, found {}",
                CACHE_SCHEMA_VERSION, user_version
            )));
        }

        Ok(())
    }

    /// Stored report for `project` on `day`, if it was built from the same
    /// commit set and cap.
    pub fn get_report(&self, project: &str, day: NaiveDate, fingerprint: &str) -> Result<Option<ProjectReport>> {
        let stored: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT fingerprint, report FROM reports WHERE project = ? AND day = ?",
                params![project, day.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match stored {
            Some((stored_fingerprint, json)) if stored_fingerprint == fingerprint => {
                Ok(Some(serde_json::from_str(&json)?))
            }
            _ => Ok(None),
        }
    }

    pub fn store_report(
        &mut self,
        project: &str,
        day: NaiveDate,
        fingerprint: &str,
        report: &ProjectReport,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO reports (project, day, fingerprint, report, created_at)
             VALUES (?, ?, ?, ?, ?)",
            params![
                project,
                day.to_string(),
                fingerprint,
                serde_json::to_string(report)?,
                Utc::now().timestamp()
            ],
        )?;
        Ok(())
    }

    /// Hours already booked for one ledger entry, if any.
    pub fn booked_hours(&self, project: &str, day: NaiveDate, task_id: &str, entry: &str) -> Result<Option<f64>> {
        let hours = self
            .conn
            .query_row(
                "SELECT hours FROM exports WHERE project = ? AND day = ? AND task_id = ? AND entry = ?",
                params![project, day.to_string(), task_id, entry],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hours)
    }

    pub fn record_export(
        &mut self,
        project: &str,
        day: NaiveDate,
        task_id: &str,
        entry: &str,
        hours: f64,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO exports (project, day, task_id, entry, hours, exported_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![project, day.to_string(), task_id, entry, hours, Utc::now().timestamp()],
        )?;
        Ok(())
    }
}

fn default_dir() -> Result<PathBuf> {
    dirs::cache_dir()
        .map(|dir| dir.join("timekeep"))
        .ok_or_else(|| TimekeepError::Cache("could not determine cache directory".to_string()))
}

/// SHA-256 over the sorted commit ids, the daily cap and the estimator key.
pub fn fingerprint(commits: &[CommitRecord], daily_cap: f64, estimator_key: &str) -> String {
    let mut ids: Vec<&str> = commits.iter().map(|c| c.id.as_str()).collect();
    ids.sort_unstable();

    let mut hasher = Sha256::new();
    for id in ids {
        hasher.update(id.as_bytes());
        hasher.update(b"\n");
    }
    hasher.update(daily_cap.to_bits().to_le_bytes());
    hasher.update(estimator_key.as_bytes());

    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
