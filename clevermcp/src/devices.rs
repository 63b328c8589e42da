//! Device inventory store
//!
//! `apps_on_device` reads installed applications from a tabular store. The
//! production store is a SQLite database with two tables:
//! - `applications`: one row per known application (name, vendor)
//! - `device_apps`: one row per install on a device, with version and
//!   update status

use std::path::Path;

use async_trait::async_trait;
use rusqlite::{params, Connection};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::{Error, Result};

/// An application installed on a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledApp {
    pub application_name: String,
    pub vendor: String,
    pub app_version: String,
    pub install_date: Option<String>,
    pub last_update: Option<String>,
    pub needs_update: bool,
}

/// Read access to installed applications, keyed by device identifier
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// Installed applications for a device, in store order.
    /// An unknown device yields an empty list, not an error.
    async fn apps_for_device(&self, device_id: &str) -> Result<Vec<InstalledApp>>;
}

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS applications (
        app_id  INTEGER PRIMARY KEY,
        name    TEXT NOT NULL,
        vendor  TEXT NOT NULL DEFAULT ''
    );
    CREATE TABLE IF NOT EXISTS device_apps (
        device_id     TEXT NOT NULL,
        app_id        INTEGER NOT NULL REFERENCES applications(app_id),
        app_version   TEXT NOT NULL DEFAULT '',
        install_date  TEXT,
        last_update   TEXT,
        needs_update  INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (device_id, app_id)
    );
    CREATE INDEX IF NOT EXISTS idx_device_apps_device ON device_apps(device_id);
"#;

const APPS_FOR_DEVICE: &str = r#"
    SELECT a.name AS application_name, a.vendor, da.app_version,
           da.install_date, da.last_update, da.needs_update
    FROM device_apps da
    JOIN applications a ON da.app_id = a.app_id
    WHERE da.device_id = ?
    ORDER BY a.name COLLATE NOCASE, a.app_id
"#;

/// SQLite-backed device store
pub struct SqliteDeviceStore {
    conn: Mutex<Connection>,
}

impl SqliteDeviceStore {
    /// Open (or create) the store at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert or replace an application record
    pub async fn upsert_application(&self, app_id: i64, name: &str, vendor: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO applications (app_id, name, vendor) VALUES (?, ?, ?)",
            params![app_id, name, vendor],
        )?;
        Ok(())
    }

    /// Record an install of `app_id` on `device_id`
    pub async fn record_install(
        &self,
        device_id: &str,
        app_id: i64,
        app_version: &str,
        needs_update: bool,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO device_apps
                (device_id, app_id, app_version, install_date, last_update, needs_update)
             VALUES (?, ?, ?, date('now'), date('now'), ?)",
            params![device_id, app_id, app_version, needs_update],
        )?;
        Ok(())
    }
}

#[async_trait]
impl DeviceStore for SqliteDeviceStore {
    async fn apps_for_device(&self, device_id: &str) -> Result<Vec<InstalledApp>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare_cached(APPS_FOR_DEVICE)
            .map_err(|e| Error::Store(e.to_string()))?;

        let rows = stmt
            .query_map(params![device_id], |row| {
                Ok(InstalledApp {
                    application_name: row.get(0)?,
                    vendor: row.get(1)?,
                    app_version: row.get(2)?,
                    install_date: row.get(3)?,
                    last_update: row.get(4)?,
                    needs_update: row.get::<_, i64>(5)? != 0,
                })
            })
            .map_err(|e| Error::Store(e.to_string()))?;

        let apps = rows
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Store(e.to_string()))?;
        Ok(apps)
    }
}
