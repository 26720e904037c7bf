/// Portable spellings rewritten to SQLite built-ins.
pub const REWRITES: &[(&str, &str)] = &[
    ("CURRENT_DATE", "DATE()"),
    ("NOW()", "DATETIME('now')"),
    ("ILIKE", "LIKE"),
];

/// Column metadata for every user table.
///
/// `notnull` is inverted into `nullable` and `pk` collapsed to 0/1 so the
/// rows line up with the PostgreSQL query.
pub const SCHEMA_QUERY: &str = r#"
WITH tables AS (
    SELECT name AS tableName
    FROM sqlite_master
    WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
),
foreign_key_table AS (
    SELECT
        m.name AS table_name,
        p."from" AS field,
        p."table" AS foreign_table_name,
        p."to" AS foreign_column_name
    FROM sqlite_master m
    CROSS JOIN pragma_foreign_key_list(m.name) p
    WHERE m.type = 'table'
)
SELECT
    fields.name AS columnName,
    fields.type AS type,
    tables.tableName AS tableName,
    fields.dflt_value AS columnDefault,
    CASE WHEN fields."notnull" = 0 THEN 1 ELSE 0 END AS nullable,
    CASE WHEN fields.pk > 0 THEN 1 ELSE 0 END AS is_primary_key,
    ft.foreign_table_name,
    ft.foreign_column_name
FROM tables
CROSS JOIN pragma_table_info(tables.tableName) fields
LEFT JOIN foreign_key_table ft
    ON fields.name = ft.field AND tables.tableName = ft.table_name
ORDER BY tables.tableName, fields.cid
"#;

/// Query returning the id generated by the last insert on this connection.
#[must_use]
pub fn last_insert_id_query(table: Option<&str>) -> String {
    match table {
        Some(table) => format!("SELECT last_insert_rowid() FROM {table} LIMIT 1"),
        None => "SELECT last_insert_rowid()".to_string(),
    }
}

/// Statements that make the driver open a transaction first.
///
/// Everything else runs in autocommit, so plain reads never hold a write lock.
#[must_use]
pub fn starts_transaction(sql: &str) -> bool {
    let head: String = sql
        .trim_start()
        .chars()
        .take_while(char::is_ascii_alphabetic)
        .collect::<String>()
        .to_ascii_uppercase();
    matches!(
        head.as_str(),
        "INSERT" | "UPDATE" | "DELETE" | "REPLACE" | "CREATE" | "DROP" | "ALTER"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_insert_id_query() {
        assert_eq!(last_insert_id_query(None), "SELECT last_insert_rowid()");
        assert_eq!(
            last_insert_id_query(Some("users")),
            "SELECT last_insert_rowid() FROM users LIMIT 1"
        );
    }

    #[test]
    fn test_starts_transaction() {
        assert!(starts_transaction("  insert into t values (1)"));
        assert!(starts_transaction("CREATE TABLE t (id INTEGER)"));
        assert!(!starts_transaction("SELECT 1"));
        assert!(!starts_transaction("WITH x AS (SELECT 1) SELECT * FROM x"));
    }
}
