// End-to-end runs against a real SQLite file
use sqlbridge::executor::MAX_BUFFER;
use sqlbridge::{
    BulkLoadOptions, ConnectionConfig, Database, DatabaseError, Materialized, Params, RowSource, RunOptions, Value,
    record,
};
use std::path::PathBuf;
use tempfile::TempDir;

fn open(dir: &TempDir) -> Database {
    let path = dir.path().join("test.db");
    Database::new(ConnectionConfig::sqlite(path.to_string_lossy())).unwrap()
}

fn with_users(dir: &TempDir) -> Database {
    let mut db = open(dir);
    db.run_script(
        "CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL UNIQUE, age INTEGER);",
        Params::None,
    )
    .unwrap();
    db
}

fn count(db: &mut Database, table: &str) -> i64 {
    let rows = db
        .fetch_rows(&format!("SELECT COUNT(*) FROM {table}"), Params::None, Some(1))
        .unwrap();
    match rows {
        Materialized::Single(row) => row[0].as_int().unwrap(),
        other => panic!("unexpected count result {other:?}"),
    }
}

#[test]
fn test_insert_returns_generated_ids() {
    let dir = TempDir::new().unwrap();
    let mut db = with_users(&dir);

    let first = db.insert("users", &record([("name", "ann")]), true).unwrap();
    let second = db.insert("users", &record([("name", "bob")]), true).unwrap();
    assert_eq!(first, Some(Value::Integer(1)));
    assert_eq!(second, Some(Value::Integer(2)));
}

#[test]
fn test_every_placeholder_style_reaches_the_same_rows() {
    let dir = TempDir::new().unwrap();
    let mut db = with_users(&dir);
    db.run_script(
        "INSERT INTO users (name, age) VALUES (%s, %s), (%s, %s)",
        vec![Value::from("ann"), Value::Integer(30), Value::from("bob"), Value::Integer(40)],
    )
    .unwrap();

    let scripts = [
        ("SELECT name FROM users WHERE age = %(age)s", Params::from(record([("age", 40)]))),
        ("SELECT name FROM users WHERE age = :age", Params::from(record([("age", 40)]))),
        ("SELECT name FROM users WHERE age = ?", Params::from(Value::Integer(40))),
        ("SELECT name FROM users WHERE age = %s", Params::from(Value::Integer(40))),
    ];
    for (script, params) in scripts {
        let rows = db.fetch_rows(script, params, None).unwrap().into_vec();
        assert_eq!(rows, vec![vec![Value::from("bob")]], "{script}");
    }
}

#[test]
fn test_quoted_markers_are_left_alone() {
    let dir = TempDir::new().unwrap();
    let mut db = with_users(&dir);
    db.run_script("INSERT INTO users (name) VALUES ('what? :no %s')", Params::None)
        .unwrap();

    let rows = db
        .fetch_rows("SELECT name FROM users WHERE name LIKE %s", Value::from("what?%"), None)
        .unwrap()
        .into_vec();
    assert_eq!(rows, vec![vec![Value::from("what? :no %s")]]);
}

#[test]
fn test_portable_spellings_are_rewritten() {
    let dir = TempDir::new().unwrap();
    let mut db = with_users(&dir);
    db.run_script("INSERT INTO users (name) VALUES ('Ann')", Params::None)
        .unwrap();

    let result = db
        .run_script("SELECT name, CURRENT_DATE AS today FROM users WHERE name ILIKE 'ann'", Params::None)
        .unwrap();
    assert_eq!(result.len(), 1);
    assert!(matches!(result.get(0, "today"), Some(Value::Text(_))));
}

#[test]
fn test_failed_statement_rolls_back_open_transaction() {
    let dir = TempDir::new().unwrap();
    let mut db = with_users(&dir);

    db.execute("INSERT INTO users (name) VALUES ('ann')", Params::None, false)
        .unwrap();
    let err = db
        .execute("INSERT INTO missing (name) VALUES ('bob')", Params::None, false)
        .unwrap_err();
    match &err {
        DatabaseError::Execution { script, params, .. } => {
            assert!(script.contains("missing"));
            assert_eq!(params, "None");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(matches!(err.root_cause(), DatabaseError::Sqlite(_)));
    assert_eq!(count(&mut db, "users"), 0);
}

#[test]
fn test_ignore_error_logs_and_continues() {
    let dir = TempDir::new().unwrap();
    let mut db = with_users(&dir);
    db.insert("users", &record([("name", "ann")]), false).unwrap();

    let result = db
        .run_script_with(
            "INSERT INTO users (name) VALUES (%s)",
            Value::from("ann"),
            RunOptions::default().ignoring_errors(),
        )
        .unwrap();
    assert!(result.is_none());
    assert_eq!(count(&mut db, "users"), 1);
}

#[test]
fn test_batch_of_named_records() {
    let dir = TempDir::new().unwrap();
    let mut db = with_users(&dir);

    let rows = vec![
        record([("name", Value::from("ann")), ("age", Value::Integer(30))]),
        record([("age", Value::Integer(40)), ("name", Value::from("bob"))]),
    ];
    db.run_script("INSERT INTO users (name, age) VALUES (:name, :age)", rows)
        .unwrap();

    let records = db
        .fetch_records("SELECT name, age FROM users ORDER BY name", Params::None, None)
        .unwrap()
        .into_vec();
    assert_eq!(records[1]["name"], Value::from("bob"));
    assert_eq!(records[1]["age"], Value::Integer(40));
}

#[test]
fn test_limit_one_and_empty_marker() {
    let dir = TempDir::new().unwrap();
    let mut db = with_users(&dir);

    let none = db
        .fetch_records("SELECT * FROM users WHERE name = %s", Value::from("nobody"), Some(1))
        .unwrap();
    assert_eq!(none, Materialized::Empty);

    db.insert("users", &record([("name", "ann")]), false).unwrap();
    let one = db
        .fetch_records("SELECT * FROM users WHERE name = %s", Value::from("ann"), Some(1))
        .unwrap();
    assert_eq!(one.single().map(|r| r["name"].clone()), Some(Value::from("ann")));
}

#[test]
fn test_schema_reports_keys_and_nullability() {
    let dir = TempDir::new().unwrap();
    let mut db = open(&dir);
    db.run_script(
        "CREATE TABLE parent (id INTEGER PRIMARY KEY, label TEXT DEFAULT 'x');
         CREATE TABLE child (id INTEGER PRIMARY KEY, parent_id INTEGER NOT NULL REFERENCES parent(id));",
        Params::None,
    )
    .unwrap();

    let schema = db.schema().unwrap();
    assert_eq!(schema.len(), 4);

    let parent_id = schema
        .iter()
        .find(|c| c.table == "child" && c.name == "parent_id")
        .unwrap();
    assert!(!parent_id.nullable);
    assert!(!parent_id.primary_key);
    let fk = parent_id.foreign_key.as_ref().unwrap();
    assert_eq!((fk.referenced_table.as_str(), fk.referenced_column.as_str()), ("parent", "id"));

    let label = schema.iter().find(|c| c.name == "label").unwrap();
    assert!(label.nullable);
    assert_eq!(label.default.as_deref(), Some("'x'"));
    assert!(schema.iter().filter(|c| c.name == "id").all(|c| c.primary_key));
}

#[test]
fn test_bulk_load_keeps_good_buffers_and_saves_the_bad_one() {
    let dir = TempDir::new().unwrap();
    let mut db = open(&dir);
    db.run_script("CREATE TABLE items (n INTEGER UNIQUE)", Params::None)
        .unwrap();
    db.run_script("INSERT INTO items (n) VALUES (2500)", Params::None)
        .unwrap();

    let source = RowSource::Frame {
        columns: vec!["n".to_string()],
        rows: (0..4501).map(|i| vec![Value::Integer(i)]).collect(),
    };
    let error_file = dir.path().join("error.csv");
    let options = BulkLoadOptions::default().with_error_file(&error_file);

    let results: Vec<_> = db.bulk_load("items", source, options).collect();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].as_ref().unwrap().rows, MAX_BUFFER);
    let err = results[1].as_ref().unwrap_err();
    assert!(matches!(err, DatabaseError::BulkLoad { buffer: 1, .. }));
    assert!(matches!(err.root_cause(), DatabaseError::Sqlite(_)));

    // First buffer plus the pre-existing row; the failed buffer left nothing behind.
    assert_eq!(count(&mut db, "items"), 2001);
    let saved = std::fs::read_to_string(&error_file).unwrap();
    assert_eq!(saved.lines().count(), MAX_BUFFER + 1);
}

#[test]
fn test_insert_many_from_query_result() {
    let dir = TempDir::new().unwrap();
    let mut db = with_users(&dir);
    db.run_script("CREATE TABLE archive (name TEXT, age INTEGER)", Params::None)
        .unwrap();
    db.run_script(
        "INSERT INTO users (name, age) VALUES (?, ?)",
        vec![vec![Value::from("ann"), Value::Integer(1)], vec![Value::from("bob"), Value::Null]],
    )
    .unwrap();

    let snapshot = db.run_script("SELECT name, age FROM users", Params::None).unwrap();
    let options = BulkLoadOptions::default().with_buffer_size(1);
    let loaded = db.insert_many_with("archive", snapshot, options).unwrap();
    assert_eq!(loaded, 2);
    assert_eq!(count(&mut db, "archive"), 2);
}

#[test]
fn test_run_as_batch_slices_rows() {
    let dir = TempDir::new().unwrap();
    let mut db = with_users(&dir);
    let names: Vec<Vec<Value>> = (0..10).map(|i| vec![Value::from(format!("u{i}"))]).collect();
    db.run_script("INSERT INTO users (name) VALUES (?)", names).unwrap();

    let batches: Vec<usize> = db
        .run_as_batch("SELECT name FROM users ORDER BY id", Params::None, 4, None)
        .unwrap()
        .map(|b| b.len())
        .collect();
    assert_eq!(batches, vec![4, 4, 2]);
}

#[test]
fn test_export_and_script_file() {
    let dir = TempDir::new().unwrap();
    let mut db = with_users(&dir);

    let script: PathBuf = dir.path().join("seed.sql");
    std::fs::write(&script, "INSERT INTO users (name, age) VALUES ('ann', 30);\nINSERT INTO users (name) VALUES ('bob');\n")
        .unwrap();
    db.run_script_file(&script, Params::None).unwrap();

    let out = dir.path().join("users.csv");
    db.export_csv("SELECT name, age FROM users ORDER BY id", Params::None, Some(&out), b';')
        .unwrap();
    assert_eq!(std::fs::read_to_string(&out).unwrap(), "name;age\nann;30\nbob;\n");
}

#[test]
fn test_moving_to_another_thread_reconnects() {
    let dir = TempDir::new().unwrap();
    let mut db = with_users(&dir);
    db.insert("users", &record([("name", "ann")]), false).unwrap();
    assert_eq!(db.connect_count(), 1);

    let (db, n) = std::thread::spawn(move || {
        let n = count(&mut db, "users");
        (db, n)
    })
    .join()
    .unwrap();
    assert_eq!(n, 1);
    assert_eq!(db.connect_count(), 2);
}
