//! Local SQLite transport for development and tests.
//!
//! Mirrors the remote transport's request model: the database file is
//! opened for each call and closed when the call returns, so no state
//! survives between requests except what was committed to disk.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::SecondsFormat;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{ffi, Connection, ErrorCode, InterruptHandle, OpenFlags};
use wicket_types::Value;

use super::{QueryResponse, Row, Statement, Transport, TransportError};

/// Transport backed by a SQLite file.
#[derive(Debug, Clone)]
pub struct SqliteTransport {
    path: PathBuf,
    timeout: Duration,
}

impl SqliteTransport {
    /// A transport for the file at `path`. The file is created on first use.
    pub fn new(path: PathBuf, timeout: Duration) -> Self {
        Self { path, timeout }
    }

    /// Runs `work` on a fresh connection on the blocking pool.
    ///
    /// On timeout the running statement is interrupted and the worker is
    /// awaited, so an open transaction has rolled back before `Timeout` is
    /// returned. Work that completes anyway reports its real result.
    async fn with_connection<T, F>(&self, work: F) -> Result<T, TransportError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let path = self.path.clone();
        let timeout = self.timeout;
        let cancel = Arc::new(Mutex::new(Cancel::default()));
        let worker_cancel = Arc::clone(&cancel);
        let mut task = tokio::task::spawn_blocking(move || {
            let mut conn = open_connection(&path, timeout).map_err(|e| {
                TransportError::Local(format!("failed to open {}: {e}", path.display()))
            })?;
            {
                let mut cancel = lock(&worker_cancel);
                if cancel.requested {
                    return Err(TransportError::Timeout(timeout));
                }
                cancel.handle = Some(conn.get_interrupt_handle());
            }
            work(&mut conn).map_err(map_sqlite_error)
        });

        match tokio::time::timeout(timeout, &mut task).await {
            Ok(Err(join)) => Err(TransportError::Local(format!("query worker failed: {join}"))),
            Ok(Ok(result)) => result,
            Err(_) => {
                {
                    let mut cancel = lock(&cancel);
                    cancel.requested = true;
                    if let Some(handle) = &cancel.handle {
                        handle.interrupt();
                    }
                }
                match task.await {
                    Ok(Ok(value)) => {
                        tracing::warn!(
                            timeout_ms = timeout.as_millis() as u64,
                            "sqlite request finished after its deadline"
                        );
                        Ok(value)
                    }
                    Ok(Err(_)) | Err(_) => Err(TransportError::Timeout(timeout)),
                }
            }
        }
    }
}

/// Cancellation state shared between a request and its worker.
#[derive(Default)]
struct Cancel {
    requested: bool,
    handle: Option<InterruptHandle>,
}

fn lock(cancel: &Mutex<Cancel>) -> MutexGuard<'_, Cancel> {
    cancel.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl Transport for SqliteTransport {
    async fn query(&self, statement: &Statement) -> Result<QueryResponse, TransportError> {
        let statement = statement.clone();
        self.with_connection(move |conn| run_statement(conn, &statement))
            .await
    }

    async fn transaction(
        &self,
        statements: &[Statement],
    ) -> Result<Vec<QueryResponse>, TransportError> {
        let statements = statements.to_vec();
        self.with_connection(move |conn| {
            let tx = conn.transaction()?;
            let mut responses = Vec::with_capacity(statements.len());
            for statement in &statements {
                responses.push(run_statement(&tx, statement)?);
            }
            tx.commit()?;
            Ok(responses)
        })
        .await
    }
}

/// Opens a connection with foreign keys enforced.
fn open_connection(path: &std::path::Path, busy_timeout: Duration) -> rusqlite::Result<Connection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let conn = Connection::open_with_flags(path, flags)?;
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(conn)
}

fn run_statement(conn: &Connection, statement: &Statement) -> rusqlite::Result<QueryResponse> {
    let mut stmt = conn.prepare(&statement.sql)?;
    let params = rusqlite::params_from_iter(statement.params.iter().map(to_sql_value));

    if stmt.column_count() == 0 {
        let affected = stmt.execute(params)?;
        return Ok(QueryResponse {
            rows: Vec::new(),
            row_count: affected as u64,
        });
    }

    let names: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    let mut rows = stmt.query(params)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut map = Row::new();
        for (i, name) in names.iter().enumerate() {
            map.insert(name.clone(), to_json(row.get_ref(i)?));
        }
        out.push(map);
    }

    let row_count = out.len() as u64;
    Ok(QueryResponse {
        rows: out,
        row_count,
    })
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(v) => SqlValue::Integer(i64::from(*v)),
        Value::Int(v) => SqlValue::Integer(*v),
        Value::Float(v) => SqlValue::Real(*v),
        Value::Text(v) => SqlValue::Text(v.clone()),
        Value::Timestamp(v) => SqlValue::Text(v.to_rfc3339_opts(SecondsFormat::Micros, true)),
        Value::Json(v) => SqlValue::Text(v.to_string()),
    }
}

fn to_json(cell: ValueRef<'_>) -> serde_json::Value {
    match cell {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(v) => serde_json::Value::from(v),
        ValueRef::Real(v) => serde_json::Number::from_f64(v)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        ValueRef::Text(bytes) => {
            serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
        ValueRef::Blob(bytes) => serde_json::Value::String(hex::encode(bytes)),
    }
}

/// Maps SQLite constraint failures onto the SQLSTATE codes Postgres uses,
/// so callers see one error vocabulary regardless of backend.
fn map_sqlite_error(err: rusqlite::Error) -> TransportError {
    if let rusqlite::Error::SqliteFailure(failure, message) = &err {
        if failure.code == ErrorCode::ConstraintViolation {
            let code = match failure.extended_code {
                ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => "23505",
                ffi::SQLITE_CONSTRAINT_FOREIGNKEY => "23503",
                ffi::SQLITE_CONSTRAINT_NOTNULL => "23502",
                ffi::SQLITE_CONSTRAINT_CHECK => "23514",
                _ => "23000",
            };
            return TransportError::Database {
                code: Some(code.to_string()),
                message: message.clone().unwrap_or_else(|| err.to_string()),
            };
        }
    }

    TransportError::Database {
        code: None,
        message: err.to_string(),
    }
}
