//! Shard schema
//!
//! Creates the FILE, REGISTRY, NETWORK and PROCESS tables with their indexes,
//! plus the VERSION table holding the single schema sentinel row. Creation runs
//! inside one transaction, so a shard is either fully initialized or carries no
//! tables at all.

use crate::engine::SqlEngine;
use crate::error::{Error, Result};

/// Schema generation written into every shard's VERSION table
pub const SCHEMA_VERSION: &str = "Thread_hunting_ver1";

/// Domain tables every shard carries
pub const DOMAIN_TABLES: [&str; 4] = ["FILE", "REGISTRY", "NETWORK", "PROCESS"];

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS FILE (
    id INTEGER PRIMARY KEY NOT NULL,
    file_name TEXT COLLATE NOCASE,
    file_path TEXT COLLATE NOCASE,
    file_hash_md5 TEXT COLLATE NOCASE,
    file_hash_sha256 TEXT COLLATE NOCASE,
    file_hash_sha1 TEXT COLLATE NOCASE,
    file_signature TEXT COLLATE NOCASE,
    created_time INTEGER,
    modified_time INTEGER
);
CREATE INDEX IF NOT EXISTS IdxNode_File ON FILE(file_path, file_name, file_signature);

CREATE TABLE IF NOT EXISTS REGISTRY (
    id INTEGER PRIMARY KEY NOT NULL,
    reg_path TEXT,
    reg_key TEXT,
    reg_value TEXT,
    created_time INTEGER,
    modified_time INTEGER,
    detected_time INTEGER
);
CREATE INDEX IF NOT EXISTS IdxNode_Registry ON REGISTRY(reg_path, reg_key);

CREATE TABLE IF NOT EXISTS NETWORK (
    id INTEGER PRIMARY KEY NOT NULL,
    target_ip TEXT,
    target_domain TEXT,
    process_id INTEGER,
    process_path TEXT,
    connected_time INTEGER
);
CREATE INDEX IF NOT EXISTS IdxNode_Network ON NETWORK(target_ip, process_id);

CREATE TABLE IF NOT EXISTS PROCESS (
    id INTEGER PRIMARY KEY NOT NULL,
    parent_process_path TEXT,
    parent_process_id INTEGER,
    parent_cmdline TEXT,
    process_path TEXT,
    process_id INTEGER,
    cmdline TEXT,
    user_name TEXT,
    integrity TEXT,
    start_time INTEGER,
    end_time INTEGER
);
CREATE INDEX IF NOT EXISTS IdxNode_Process ON PROCESS(process_path, process_id);

CREATE TABLE IF NOT EXISTS VERSION (
    id INTEGER PRIMARY KEY NOT NULL,
    version TEXT
);
"#;

/// Create all tables, indexes and the version row in one transaction
///
/// Running this on an already initialized shard changes nothing.
pub fn initialize(engine: &mut SqlEngine) -> Result<()> {
    let tx = engine
        .transaction()
        .map_err(|e| Error::schema(format!("beginning schema transaction failed: {}", e)))?;

    tx.execute(SCHEMA_SQL)
        .map_err(|e| Error::schema(format!("creating tables failed: {}", e)))?;

    // SCHEMA_VERSION contains no quotes
    tx.execute(&format!(
        "INSERT INTO VERSION(version) SELECT '{v}' WHERE NOT EXISTS (SELECT 1 FROM VERSION);",
        v = SCHEMA_VERSION
    ))
    .map_err(|e| Error::schema(format!("writing version sentinel failed: {}", e)))?;

    tx.commit()
        .map_err(|e| Error::schema(format!("committing schema failed: {}", e)))
}

/// Check the version sentinel of an open shard
///
/// A shard is valid when VERSION holds exactly one row equal to
/// [`SCHEMA_VERSION`]. Any read failure counts as invalid.
pub fn validate(engine: &SqlEngine) -> Result<()> {
    let rows = engine
        .query("SELECT version FROM VERSION")
        .map_err(|e| Error::validation(engine.path(), format!("cannot read VERSION: {}", e)))?;

    match rows.as_slice() {
        [row] => match row.get("version") {
            Some(v) if v == SCHEMA_VERSION => Ok(()),
            Some(v) => Err(Error::validation(
                engine.path(),
                format!("version {:?} does not match {:?}", v, SCHEMA_VERSION),
            )),
            None => Err(Error::validation(engine.path(), "version row is NULL")),
        },
        [] => Err(Error::validation(engine.path(), "VERSION table is empty")),
        rows => Err(Error::validation(
            engine.path(),
            format!("VERSION table holds {} rows", rows.len()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn open(dir: &std::path::Path) -> Result<SqlEngine> {
        SqlEngine::open(&dir.join("database_2305.db"), Duration::from_secs(1))
    }

    #[test]
    fn test_initialize_creates_tables_and_sentinel() -> Result<()> {
        let temp_dir = tempdir()?;
        let mut engine = open(temp_dir.path())?;

        initialize(&mut engine)?;
        validate(&engine)?;

        let tables = engine.query("SELECT name FROM sqlite_master WHERE type = 'table'")?;
        let names: Vec<_> = tables.iter().map(|r| r["name"].as_str()).collect();
        for table in DOMAIN_TABLES.iter().chain(["VERSION"].iter()) {
            assert!(names.contains(table), "missing table {}", table);
        }

        let indexes = engine.query("SELECT name FROM sqlite_master WHERE type = 'index'")?;
        assert_eq!(indexes.len(), 4);

        Ok(())
    }

    #[test]
    fn test_initialize_is_idempotent() -> Result<()> {
        let temp_dir = tempdir()?;
        let mut engine = open(temp_dir.path())?;

        initialize(&mut engine)?;
        initialize(&mut engine)?;

        assert_eq!(engine.query("SELECT version FROM VERSION")?.len(), 1);
        validate(&engine)
    }

    #[test]
    fn test_validate_rejects_bad_sentinels() -> Result<()> {
        let temp_dir = tempdir()?;
        let mut engine = open(temp_dir.path())?;

        // No VERSION table at all
        assert!(matches!(validate(&engine), Err(Error::Validation { .. })));

        initialize(&mut engine)?;

        engine.execute("UPDATE VERSION SET version = 'Thread_hunting_ver0'")?;
        assert!(matches!(validate(&engine), Err(Error::Validation { .. })));

        engine.execute(&format!(
            "UPDATE VERSION SET version = '{v}'; INSERT INTO VERSION(version) VALUES ('{v}');",
            v = SCHEMA_VERSION
        ))?;
        assert!(matches!(validate(&engine), Err(Error::Validation { .. })));

        engine.execute("DELETE FROM VERSION")?;
        assert!(matches!(validate(&engine), Err(Error::Validation { .. })));

        Ok(())
    }
}
