use super::placeholders::{Marker, Piece, lex, positional_count};
use super::{Dialect, Injection};
use crate::core::Value;
use crate::parser::normalize::is_ident_char;
use crate::parser::quotes::token_marker;
use indexmap::IndexMap;

/// Portable spellings rewritten to PostgreSQL built-ins.
pub const REWRITES: &[(&str, &str)] = &[("IFNULL", "COALESCE"), ("DATE()", "CURRENT_DATE")];

/// Column metadata for every base table outside the system schemas.
pub const SCHEMA_QUERY: &str = r"
WITH fields AS (
    SELECT
        column_name::text AS columnName,
        data_type::text AS type,
        table_name::text AS tableName,
        table_schema::text AS tableSchema,
        column_default::text AS columnDefault,
        CASE WHEN is_nullable = 'YES' THEN 1 ELSE 0 END AS nullable,
        ordinal_position::int AS position
    FROM information_schema.columns
),
primary_field AS (
    SELECT
        pg_attribute.attname::text AS field,
        pg_class.relname::text AS table_name
    FROM pg_index, pg_class, pg_attribute, pg_namespace
    WHERE indrelid = pg_class.oid
        AND nspname = 'public'
        AND pg_class.relnamespace = pg_namespace.oid
        AND pg_attribute.attrelid = pg_class.oid
        AND pg_attribute.attnum = ANY(pg_index.indkey)
        AND indisprimary
),
foreign_key_table AS (
    SELECT
        tc.table_name::text AS table_name,
        kcu.column_name::text AS field,
        ccu.table_name::text AS foreign_table_name,
        ccu.column_name::text AS foreign_column_name
    FROM information_schema.table_constraints AS tc
    JOIN information_schema.key_column_usage AS kcu
        ON tc.constraint_name = kcu.constraint_name
        AND tc.table_schema = kcu.table_schema
    JOIN information_schema.constraint_column_usage AS ccu
        ON ccu.constraint_name = tc.constraint_name
    WHERE tc.constraint_type = 'FOREIGN KEY'
)
SELECT
    f.columnName,
    f.type,
    f.tableName,
    f.columnDefault,
    f.nullable,
    CASE WHEN p.field IS NULL THEN 0 ELSE 1 END AS is_primary_key,
    ft.foreign_table_name,
    ft.foreign_column_name
FROM fields f
JOIN information_schema.tables t
    ON t.table_name = f.tableName AND t.table_schema = f.tableSchema
LEFT JOIN primary_field p
    ON f.columnName = p.field AND f.tableName = p.table_name
LEFT JOIN foreign_key_table ft
    ON f.columnName = ft.field AND f.tableName = ft.table_name
WHERE t.table_type = 'BASE TABLE'
    AND t.table_schema NOT IN ('pg_catalog', 'information_schema')
ORDER BY f.tableName, f.position
";

/// True when `before` ends with `LIKE` or `ILIKE` preceded by whitespace.
fn follows_like(before: &str) -> bool {
    let trimmed = before.trim_end();
    let word_start = trimmed
        .char_indices()
        .rev()
        .find(|(_, c)| !is_ident_char(*c))
        .map_or(0, |(i, c)| i + c.len_utf8());
    let word = &trimmed[word_start..];
    (word.eq_ignore_ascii_case("like") || word.eq_ignore_ascii_case("ilike"))
        && trimmed[..word_start].ends_with(char::is_whitespace)
}

/// Lifts single-quoted pattern literals containing `%` that follow
/// `LIKE`/`ILIKE` out of the text and into the parameter set.
///
/// The literal becomes `%s` (or `%(<token>)s` when the script already uses
/// named markers) and its content is queued as an injection at the slot that
/// marker will occupy.
pub fn extract_like_literals(
    text: &mut String,
    quotes: &mut IndexMap<String, String>,
    injections: &mut Vec<Injection>,
) {
    let named = lex(Dialect::Postgres, text)
        .iter()
        .any(|p| matches!(p, Piece::Marker(Marker::Name { .. })));
    // `%s` markers are numbered after the highest `$n` anywhere in the script.
    let (_, max_number) = positional_count(Dialect::Postgres, text);

    let candidates: Vec<(String, String)> = quotes
        .iter()
        .filter(|(_, q)| q.len() >= 2 && q.starts_with('\'') && q.contains('%'))
        .map(|(t, q)| (t.clone(), q.clone()))
        .collect();

    for (token, original) in candidates {
        let marker = token_marker(&token);
        let Some(at) = text.find(&marker) else {
            continue;
        };
        if !follows_like(&text[..at]) {
            continue;
        }

        let value = Value::Text(original[1..original.len() - 1].to_string());
        let replacement = if named {
            let replacement = format!("%({token})s");
            injections.push(Injection::Named { name: token.clone(), value });
            replacement
        } else {
            let (next, _) = positional_count(Dialect::Postgres, &text[..at]);
            injections.push(Injection::Positional { index: max_number + next, value });
            "%s".to_string()
        };
        text.replace_range(at..at + marker.len(), &replacement);
        quotes.shift_remove(&token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_follows_like() {
        assert!(follows_like("WHERE name LIKE "));
        assert!(follows_like("WHERE name not ilike"));
        assert!(!follows_like("WHERE name = "));
        assert!(!follows_like("LIKE "));
        assert!(!follows_like("WHERE unlike "));
    }
}
