use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::{Connection, params};

use super::models::*;

/// Async-safe handle to the dispatch database.
///
/// Wraps `DispatchDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, preventing synchronous SQLite
/// I/O from tying up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<DispatchDb>>,
}

impl DbHandle {
    pub fn new(db: DispatchDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&DispatchDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }
}

/// Single-connection SQLite store for incidents, callers, and response logs.
///
/// Every public operation is one round trip; none of them retry, and no
/// caching sits in front of the store.
pub struct DispatchDb {
    conn: Connection,
}

impl DispatchDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS callers (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    first_name TEXT NOT NULL DEFAULT 'Unknown',
                    last_name TEXT NOT NULL DEFAULT 'Caller',
                    phone_number TEXT NOT NULL,
                    role TEXT NOT NULL DEFAULT 'caller',
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS incidents (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    caller_id INTEGER NOT NULL REFERENCES callers(id),
                    latitude REAL NOT NULL,
                    longitude REAL NOT NULL,
                    initial_level TEXT NOT NULL,
                    current_level TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'Pending Dispatch',
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS response_logs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    incident_id INTEGER NOT NULL REFERENCES incidents(id) ON DELETE CASCADE,
                    action_type TEXT NOT NULL,
                    details TEXT NOT NULL DEFAULT '',
                    performed_by TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE INDEX IF NOT EXISTS idx_callers_phone ON callers(phone_number);
                CREATE INDEX IF NOT EXISTS idx_incidents_caller ON incidents(caller_id);
                CREATE INDEX IF NOT EXISTS idx_response_logs_incident ON response_logs(incident_id);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Callers ───────────────────────────────────────────────────────

    /// Look up a caller by phone number. Must be called before
    /// `create_caller` so repeat reports reuse the existing row.
    pub fn find_caller_by_phone(&self, phone: &str) -> Result<Option<Caller>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, first_name, last_name, phone_number, role, created_at
                 FROM callers WHERE phone_number = ?1 ORDER BY id LIMIT 1",
            )
            .context("Failed to prepare find_caller_by_phone")?;
        let mut rows = stmt
            .query_map(params![phone], Self::map_caller)
            .context("Failed to query caller by phone")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read caller row")?)),
            None => Ok(None),
        }
    }

    pub fn create_caller(&self, first_name: &str, last_name: &str, phone: &str) -> Result<Caller> {
        self.conn
            .execute(
                "INSERT INTO callers (first_name, last_name, phone_number) VALUES (?1, ?2, ?3)",
                params![first_name, last_name, phone],
            )
            .context("Failed to insert caller")?;
        let id = self.conn.last_insert_rowid();
        self.get_caller(id)?.context("Caller not found after insert")
    }

    pub fn get_caller(&self, id: i64) -> Result<Option<Caller>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, first_name, last_name, phone_number, role, created_at
                 FROM callers WHERE id = ?1",
            )
            .context("Failed to prepare get_caller")?;
        let mut rows = stmt
            .query_map(params![id], Self::map_caller)
            .context("Failed to query caller")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read caller row")?)),
            None => Ok(None),
        }
    }

    pub fn list_callers(&self) -> Result<Vec<Caller>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, first_name, last_name, phone_number, role, created_at
                 FROM callers ORDER BY id",
            )
            .context("Failed to prepare list_callers")?;
        let rows = stmt
            .query_map([], Self::map_caller)
            .context("Failed to query callers")?;
        let mut callers = Vec::new();
        for row in rows {
            callers.push(row.context("Failed to read caller row")?);
        }
        Ok(callers)
    }

    fn map_caller(row: &rusqlite::Row<'_>) -> rusqlite::Result<Caller> {
        Ok(Caller {
            id: row.get(0)?,
            first_name: row.get(1)?,
            last_name: row.get(2)?,
            phone_number: row.get(3)?,
            role: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    // ── Incidents ─────────────────────────────────────────────────────

    pub fn create_incident(
        &self,
        caller_id: i64,
        latitude: f64,
        longitude: f64,
        level: &AlarmLevel,
        status: &IncidentStatus,
    ) -> Result<Incident> {
        self.conn
            .execute(
                "INSERT INTO incidents (caller_id, latitude, longitude, initial_level, current_level, status)
                 VALUES (?1, ?2, ?3, ?4, ?4, ?5)",
                params![caller_id, latitude, longitude, level.as_str(), status.as_str()],
            )
            .context("Failed to insert incident")?;
        let id = self.conn.last_insert_rowid();
        self.get_incident(id)?
            .context("Incident not found after insert")
    }

    pub fn get_incident(&self, id: i64) -> Result<Option<Incident>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, caller_id, latitude, longitude, initial_level, current_level, status, created_at
                 FROM incidents WHERE id = ?1",
            )
            .context("Failed to prepare get_incident")?;
        let mut rows = stmt
            .query_map(params![id], Self::map_incident_row)
            .context("Failed to query incident")?;
        match rows.next() {
            Some(row) => {
                let r = row.context("Failed to read incident row")?;
                Ok(Some(r.into_incident()?))
            }
            None => Ok(None),
        }
    }

    pub fn list_incidents(&self) -> Result<Vec<Incident>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, caller_id, latitude, longitude, initial_level, current_level, status, created_at
                 FROM incidents ORDER BY id DESC",
            )
            .context("Failed to prepare list_incidents")?;
        let rows = stmt
            .query_map([], Self::map_incident_row)
            .context("Failed to query incidents")?;
        let mut incidents = Vec::new();
        for row in rows {
            let r = row.context("Failed to read incident row")?;
            incidents.push(r.into_incident()?);
        }
        Ok(incidents)
    }

    /// Mutate the current alarm level of an existing incident. The initial
    /// level is never rewritten.
    pub fn update_alarm_level(&self, id: i64, new_level: &AlarmLevel) -> Result<Incident> {
        let count = self
            .conn
            .execute(
                "UPDATE incidents SET current_level = ?1 WHERE id = ?2",
                params![new_level.as_str(), id],
            )
            .context("Failed to update alarm level")?;
        if count == 0 {
            anyhow::bail!("Incident {} not found", id);
        }
        self.get_incident(id)?
            .context("Incident not found after alarm level update")
    }

    pub fn get_incident_detail(&self, id: i64) -> Result<Option<IncidentDetail>> {
        let incident = match self.get_incident(id)? {
            Some(incident) => incident,
            None => return Ok(None),
        };
        let caller = self
            .get_caller(incident.caller_id)?
            .context("Incident references a missing caller")?;
        let logs = self.list_logs_for_incident(id)?;
        Ok(Some(IncidentDetail {
            incident,
            caller,
            logs,
        }))
    }

    fn map_incident_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<IncidentRow> {
        Ok(IncidentRow {
            id: row.get(0)?,
            caller_id: row.get(1)?,
            latitude: row.get(2)?,
            longitude: row.get(3)?,
            initial_level: row.get(4)?,
            current_level: row.get(5)?,
            status: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    // ── Response logs ─────────────────────────────────────────────────

    pub fn append_log(
        &self,
        incident_id: i64,
        action_type: &str,
        details: &str,
        performed_by: &str,
    ) -> Result<ResponseLogEntry> {
        self.conn
            .execute(
                "INSERT INTO response_logs (incident_id, action_type, details, performed_by)
                 VALUES (?1, ?2, ?3, ?4)",
                params![incident_id, action_type, details, performed_by],
            )
            .context("Failed to insert response log")?;
        let id = self.conn.last_insert_rowid();
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, incident_id, action_type, details, performed_by, created_at
                 FROM response_logs WHERE id = ?1",
            )
            .context("Failed to prepare log read-back")?;
        let mut rows = stmt
            .query_map(params![id], Self::map_log)
            .context("Failed to query response log")?;
        match rows.next() {
            Some(row) => row.context("Failed to read response log row"),
            None => anyhow::bail!("Response log not found after insert"),
        }
    }

    pub fn list_logs_for_incident(&self, incident_id: i64) -> Result<Vec<ResponseLogEntry>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, incident_id, action_type, details, performed_by, created_at
                 FROM response_logs WHERE incident_id = ?1 ORDER BY id",
            )
            .context("Failed to prepare list_logs_for_incident")?;
        let rows = stmt
            .query_map(params![incident_id], Self::map_log)
            .context("Failed to query response logs")?;
        let mut logs = Vec::new();
        for row in rows {
            logs.push(row.context("Failed to read response log row")?);
        }
        Ok(logs)
    }

    fn map_log(row: &rusqlite::Row<'_>) -> rusqlite::Result<ResponseLogEntry> {
        Ok(ResponseLogEntry {
            id: row.get(0)?,
            incident_id: row.get(1)?,
            action_type: row.get(2)?,
            details: row.get(3)?,
            performed_by: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

/// Raw row shape before level/status text is parsed into enums.
struct IncidentRow {
    id: i64,
    caller_id: i64,
    latitude: f64,
    longitude: f64,
    initial_level: String,
    current_level: String,
    status: String,
    created_at: String,
}

impl IncidentRow {
    fn into_incident(self) -> Result<Incident> {
        Ok(Incident {
            id: self.id,
            caller_id: self.caller_id,
            latitude: self.latitude,
            longitude: self.longitude,
            initial_level: AlarmLevel::from_str(&self.initial_level)
                .map_err(|e| anyhow::anyhow!(e))?,
            current_level: AlarmLevel::from_str(&self.current_level)
                .map_err(|e| anyhow::anyhow!(e))?,
            status: IncidentStatus::from_str(&self.status).map_err(|e| anyhow::anyhow!(e))?,
            created_at: self.created_at,
        })
    }
}
