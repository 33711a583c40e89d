//! Database module for Return Desk
//!
//! Persists session records (when the SQLite session backend is selected)
//! and created returns.

mod schema;

pub use schema::*;

use crate::flow::{SelectionCode, SessionRecord};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Corrupt record: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Return not found: {0}")]
    ReturnNotFound(String),
    #[error("Session {thread_id} changed underneath version {version}")]
    StaleSession { thread_id: String, version: u64 },
    #[error("Database lock poisoned")]
    LockPoisoned,
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn conn(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::LockPoisoned)
    }

    // ==================== Session Operations ====================

    /// Load a session, creating an empty one if none exists
    pub fn get_or_create_session(&self, thread_id: &str) -> DbResult<SessionRecord> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let record = load_or_insert_session(&tx, thread_id)?;
        tx.commit()?;
        Ok(record)
    }

    /// Read-modify-write a session inside one transaction.
    ///
    /// `update` sees the committed record and returns its replacement. An
    /// error from `update` rolls everything back, including the insert of a
    /// brand-new session.
    pub fn update_session<E, F>(&self, thread_id: &str, update: F) -> Result<SessionRecord, E>
    where
        E: From<DbError>,
        F: FnOnce(&SessionRecord) -> Result<SessionRecord, E>,
    {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(DbError::from)?;
        let current = load_or_insert_session(&tx, thread_id)?;
        let next = update(&current)?;

        let record_json = serde_json::to_string(&next).map_err(DbError::from)?;
        let changed = tx
            .execute(
                "UPDATE sessions SET version = ?1, flow_step = ?2, record = ?3, updated_at = ?4
                 WHERE thread_id = ?5 AND version = ?6",
                params![
                    next.version,
                    next.flow_step.as_str(),
                    record_json,
                    Utc::now().to_rfc3339(),
                    thread_id,
                    current.version
                ],
            )
            .map_err(DbError::from)?;
        if changed != 1 {
            return Err(DbError::StaleSession {
                thread_id: thread_id.to_string(),
                version: current.version,
            }
            .into());
        }
        tx.commit().map_err(DbError::from)?;
        Ok(next)
    }

    // ==================== Return Operations ====================

    /// Persist a newly created return
    pub fn insert_return(&self, stored: &StoredReturn) -> DbResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO returns (return_id, thread_id, customer_id, items, reason_code, resolution_code,
                                  shipping_code, status, refund_cents, restocking_fee_cents,
                                  store_credit_bonus_cents, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                stored.return_id,
                stored.thread_id,
                stored.customer_id,
                serde_json::to_string(&stored.items)?,
                stored.reason_code.as_str(),
                stored.resolution_code.as_str(),
                stored.shipping_code.as_str(),
                stored.status,
                stored.refund_cents,
                stored.restocking_fee_cents,
                stored.store_credit_bonus_cents,
                stored.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Get a return by ID
    pub fn get_return(&self, return_id: &str) -> DbResult<StoredReturn> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("{RETURN_COLUMNS} WHERE return_id = ?1"))?;
        stmt.query_row(params![return_id], parse_return_row)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    DbError::ReturnNotFound(return_id.to_string())
                }
                other => DbError::Sqlite(other),
            })
    }

    /// Returns created from one conversation, oldest first
    pub fn list_returns_for_thread(&self, thread_id: &str) -> DbResult<Vec<StoredReturn>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare(&format!("{RETURN_COLUMNS} WHERE thread_id = ?1 ORDER BY created_at"))?;
        let rows = stmt.query_map(params![thread_id], parse_return_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Every return filed by a customer, newest first
    pub fn list_returns_for_customer(&self, customer_id: &str) -> DbResult<Vec<StoredReturn>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{RETURN_COLUMNS} WHERE customer_id = ?1 ORDER BY created_at DESC"
        ))?;
        let rows = stmt.query_map(params![customer_id], parse_return_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }
}

const RETURN_COLUMNS: &str = "SELECT return_id, thread_id, customer_id, items, reason_code, resolution_code,
        shipping_code, status, refund_cents, restocking_fee_cents, store_credit_bonus_cents, created_at
 FROM returns";

fn load_or_insert_session(tx: &Transaction<'_>, thread_id: &str) -> DbResult<SessionRecord> {
    let existing: Option<String> = tx
        .query_row(
            "SELECT record FROM sessions WHERE thread_id = ?1",
            params![thread_id],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(json) = existing {
        return Ok(serde_json::from_str(&json)?);
    }

    let record = SessionRecord::new(thread_id);
    let now = Utc::now().to_rfc3339();
    tx.execute(
        "INSERT INTO sessions (thread_id, version, flow_step, record, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        params![
            thread_id,
            record.version,
            record.flow_step.as_str(),
            serde_json::to_string(&record)?,
            now
        ],
    )?;
    tracing::debug!(thread_id = %thread_id, "Created session row");
    Ok(record)
}

fn parse_return_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredReturn> {
    let items_json: String = row.get(3)?;
    let items = serde_json::from_str(&items_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(StoredReturn {
        return_id: row.get(0)?,
        thread_id: row.get(1)?,
        customer_id: row.get(2)?,
        items,
        reason_code: parse_code(row, 4)?,
        resolution_code: parse_code(row, 5)?,
        shipping_code: parse_code(row, 6)?,
        status: row.get(7)?,
        refund_cents: row.get(8)?,
        restocking_fee_cents: row.get(9)?,
        store_credit_bonus_cents: row.get(10)?,
        created_at: parse_datetime(&row.get::<_, String>(11)?),
    })
}

fn parse_code<C: SelectionCode>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<C> {
    let raw: String = row.get(idx)?;
    C::parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("unknown code {raw}").into(),
        )
    })
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
