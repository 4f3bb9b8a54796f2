//! SQL execution engine
//!
//! A thin layer over SQLite that opens shard files, executes statements, runs
//! transactions and marshals rows into [`Record`]s. The shard logic above it
//! only observes success or failure and the returned rows; SQLite error codes
//! are folded into the crate's error taxonomy here.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, Transaction, TransactionBehavior};

use crate::error::{Error, Result};

/// One result row: column name to textual column value
///
/// Integers and floats are rendered as text. NULL and BLOB columns are left out.
pub type Record = BTreeMap<String, String>;

/// An open connection to one shard file
#[derive(Debug)]
pub struct SqlEngine {
    conn: Connection,
    path: PathBuf,
    /// File the connection was opened on, where the platform can tell
    identity: Option<FileIdentity>,
}

/// (device, inode) pair of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileIdentity {
    dev: u64,
    ino: u64,
}

#[cfg(unix)]
fn file_identity(path: &Path) -> Option<FileIdentity> {
    use std::os::unix::fs::MetadataExt;
    std::fs::metadata(path).ok().map(|meta| FileIdentity {
        dev: meta.dev(),
        ino: meta.ino(),
    })
}

// Open files cannot be renamed here, so a connection never loses its path
#[cfg(not(unix))]
fn file_identity(_path: &Path) -> Option<FileIdentity> {
    None
}

impl SqlEngine {
    /// Open a shard file for reading and writing, creating it if missing
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| Error::open(path, e.to_string()))?;
        Self::configure(conn, path, busy_timeout)
    }

    /// Open an existing shard file, failing instead of creating it
    ///
    /// The connection is read-write so a hot journal left by a crashed
    /// writer is rolled back on first read.
    pub fn open_existing(path: &Path, busy_timeout: Duration) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX
            | OpenFlags::SQLITE_OPEN_URI;
        let conn = Connection::open_with_flags(path, flags)
            .map_err(|e| Error::open(path, e.to_string()))?;
        Self::configure(conn, path, busy_timeout)
    }

    fn configure(conn: Connection, path: &Path, busy_timeout: Duration) -> Result<Self> {
        conn.busy_timeout(busy_timeout)
            .map_err(|e| Error::open(path, e.to_string()))?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
            identity: file_identity(path),
        })
    }

    /// Path of the underlying file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the file at [`path`](Self::path) is no longer the one this
    /// connection has open, because it was renamed or replaced
    pub fn has_moved(&self) -> bool {
        match (self.identity, file_identity(&self.path)) {
            (Some(opened), Some(current)) => opened != current,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// Execute one or more statements outside an explicit transaction
    pub fn execute(&self, statement: &str) -> Result<()> {
        self.conn
            .execute_batch(statement)
            .map_err(|e| Error::exec(0, statement, e.to_string()))
    }

    /// Run a read statement and collect every row
    pub fn query(&self, statement: &str) -> Result<Vec<Record>> {
        query_records(&self.conn, statement)
    }

    /// Begin an immediate transaction
    ///
    /// The returned guard rolls back when dropped without [`EngineTransaction::commit`].
    pub fn transaction(&mut self) -> Result<EngineTransaction<'_>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| Error::transaction(format!("begin failed: {}", e)))?;
        Ok(EngineTransaction { tx })
    }
}

/// An open transaction on a [`SqlEngine`]
pub struct EngineTransaction<'conn> {
    tx: Transaction<'conn>,
}

impl EngineTransaction<'_> {
    /// Execute a statement inside the transaction
    pub fn execute(&self, statement: &str) -> Result<()> {
        self.tx
            .execute_batch(statement)
            .map_err(|e| Error::exec(0, statement, e.to_string()))
    }

    /// Execute statements in order, stopping at the first failure
    ///
    /// The error carries the position of the failing statement in the batch.
    pub fn execute_all<I, S>(&self, statements: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut executed = 0;
        for (index, statement) in statements.into_iter().enumerate() {
            let statement = statement.as_ref();
            self.tx
                .execute_batch(statement)
                .map_err(|e| Error::exec(index, statement, e.to_string()))?;
            executed += 1;
        }
        Ok(executed)
    }

    /// Run a read statement inside the transaction
    pub fn query(&self, statement: &str) -> Result<Vec<Record>> {
        query_records(&self.tx, statement)
    }

    /// Commit the transaction
    pub fn commit(self) -> Result<()> {
        self.tx
            .commit()
            .map_err(|e| Error::transaction(format!("commit failed: {}", e)))
    }
}

fn query_records(conn: &Connection, statement: &str) -> Result<Vec<Record>> {
    let mut stmt = conn
        .prepare(statement)
        .map_err(|e| Error::query(format!("prepare failed: {}", e)))?;

    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let mut rows = stmt
        .query([])
        .map_err(|e| Error::query(format!("step failed: {}", e)))?;

    let mut records = Vec::new();
    while let Some(row) = rows
        .next()
        .map_err(|e| Error::query(format!("step failed: {}", e)))?
    {
        let mut record = Record::new();
        for (i, column) in columns.iter().enumerate() {
            let value = row
                .get_ref(i)
                .map_err(|e| Error::query(format!("column {} unreadable: {}", column, e)))?;
            if let Some(text) = value_to_text(value) {
                record.insert(column.clone(), text);
            }
        }
        records.push(record);
    }

    Ok(records)
}

fn value_to_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(format!("{:.6}", f)),
        ValueRef::Text(t) => Some(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Null | ValueRef::Blob(_) => None,
    }
}
