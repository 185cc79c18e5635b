use factfeed_core::db::migrations::{current_user_version, latest_version};
use factfeed_core::db::{open_db, open_db_in_memory, DbError};
use factfeed_core::{FeedConfig, RepoError, SqliteDeliveryLedger};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(current_user_version(&conn).unwrap(), latest_version());
    for table in [
        "content_items",
        "user_accounts",
        "user_preferences",
        "delivery_records",
    ] {
        assert_table_exists(&conn, table);
    }
    let foreign_keys: i64 = conn
        .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(foreign_keys, 1);
}

#[test]
fn reopening_file_database_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("factfeed.db");
    let config = FeedConfig::default();

    let first = open_db(&path, &config).unwrap();
    assert_eq!(current_user_version(&first).unwrap(), latest_version());
    drop(first);

    let second = open_db(&path, &config).unwrap();
    assert_eq!(current_user_version(&second).unwrap(), latest_version());
    assert_table_exists(&second, "delivery_records");
}

#[test]
fn newer_schema_version_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    match open_db(&path, &FeedConfig::default()).unwrap_err() {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn repositories_refuse_unmigrated_connections() {
    let conn = Connection::open_in_memory().unwrap();
    match SqliteDeliveryLedger::try_new(&conn) {
        Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        }) => {
            assert_eq!(expected_version, latest_version());
            assert_eq!(actual_version, 0);
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("unmigrated connection must be rejected"),
    }
}

#[test]
fn delivery_records_reject_duplicate_pairs_at_schema_level() {
    let conn = open_db_in_memory().unwrap();
    conn.execute(
        "INSERT INTO content_items (
            uuid, content_type, exam_type, title, description,
            date_from, date_to, created_at
        ) VALUES ('c1', 'fact', 'UPSC', 't', 'd', '2025-03-01', '2025-03-01', 1);",
        [],
    )
    .unwrap();
    let insert = "INSERT INTO delivery_records (user_uuid, content_uuid, delivered_at, status)
                  VALUES ('u1', 'c1', 1, 'sent');";
    conn.execute(insert, []).unwrap();
    assert!(conn.execute(insert, []).is_err());
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
