use crate::core::{DatabaseError, Params, Record, Result, Value};
use crate::dialect::placeholders::is_slice_colon;

pub(crate) const fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Whether `text` contains a named marker for `key`, either `:key` or `%(key)s`.
///
/// `::key` is a cast and `[1:key]` a slice bound, not markers. `text` must already be quote-scanned so
/// literals cannot produce false matches.
#[must_use]
pub fn has_named_marker(text: &str, key: &str) -> bool {
    if key.is_empty() {
        return false;
    }
    if text.contains(&format!("%({key})")) {
        return true;
    }
    let needle = format!(":{key}");
    text.match_indices(&needle).any(|(at, _)| {
        let before = text[..at].chars().next_back();
        let after = text[at + needle.len()..].chars().next();
        before != Some(':') && !is_slice_colon(&text[..at]) && !after.is_some_and(is_ident_char)
    })
}

/// True when any of `keys` has a named marker in `text`.
pub fn named_markers_match<'a>(text: &str, mut keys: impl Iterator<Item = &'a str>) -> bool {
    keys.any(|k| has_named_marker(text, k))
}

/// Values of `row` in the given key order; keys the row lacks are left out.
fn values_in_order(row: &Record, order: &[&str]) -> Vec<Value> {
    order.iter().filter_map(|k| row.get(*k).cloned()).collect()
}

/// Reshapes `params` to match the placeholder style used by `text`.
///
/// - Named sets stay named when `text` has a marker for one of their keys;
///   otherwise they become positional in key insertion order.
/// - In a batch the first row decides both the style and the key order, and
///   every later row is laid out with that same order.
/// - Positional sets, and the absence of parameters, pass through.
///
/// A batch row that ends up with a different number of values than the
/// first row is a `ShapeMismatch`. Rows are never reordered to make them fit.
pub fn normalize(text: &str, params: &Params) -> Result<Params> {
    match params {
        Params::None => Ok(Params::None),
        Params::Positional(values) => Ok(Params::Positional(values.clone())),
        Params::Named(record) => {
            if record.is_empty() || named_markers_match(text, record.keys().map(String::as_str)) {
                Ok(Params::Named(record.clone()))
            } else {
                Ok(Params::Positional(record.values().cloned().collect()))
            }
        }
        Params::Batch(rows) => normalize_batch(text, rows),
    }
}

fn normalize_batch(text: &str, rows: &[Params]) -> Result<Params> {
    let Some(first) = rows.first() else {
        return Ok(Params::Batch(Vec::new()));
    };

    if let Params::Named(first_row) = first {
        if named_markers_match(text, first_row.keys().map(String::as_str)) {
            return Ok(Params::Batch(rows.to_vec()));
        }
    }

    let order: Vec<&str> = match first {
        Params::Named(r) => r.keys().map(String::as_str).collect(),
        _ => Vec::new(),
    };

    let mut out = Vec::with_capacity(rows.len());
    let mut expected = None;
    for (index, row) in rows.iter().enumerate() {
        let values = match row {
            Params::Named(r) if order.is_empty() => r.values().cloned().collect(),
            Params::Named(r) => values_in_order(r, &order),
            Params::Positional(v) => v.clone(),
            Params::None => Vec::new(),
            Params::Batch(_) => {
                return Err(DatabaseError::ParseError(format!(
                    "batch row {index} is itself a batch"
                )));
            }
        };
        let want = *expected.get_or_insert(values.len());
        if values.len() != want {
            return Err(DatabaseError::ShapeMismatch {
                row: index,
                expected: want,
                found: values.len(),
            });
        }
        out.push(Params::Positional(values));
    }
    Ok(Params::Batch(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record;

    fn ints(values: &[i64]) -> Params {
        Params::Positional(values.iter().copied().map(Value::Integer).collect())
    }

    #[test]
    fn test_named_marker_detection() {
        assert!(has_named_marker("SELECT * FROM t WHERE id = :id", "id"));
        assert!(has_named_marker("SELECT * FROM t WHERE id = %(id)s", "id"));
        assert!(!has_named_marker("SELECT * FROM t WHERE id = :identity", "id"));
        assert!(!has_named_marker("SELECT x::id FROM t", "id"));
        assert!(!has_named_marker("SELECT arr[1:id] FROM t", "id"));
        assert!(!has_named_marker("SELECT * FROM t WHERE id = ?", "id"));
    }

    #[test]
    fn test_named_kept_for_named_script() {
        let p = Params::Named(record([("id", 1)]));
        let out = normalize("SELECT * FROM t WHERE id = :id", &p).unwrap();
        assert_eq!(out, p);
    }

    #[test]
    fn test_named_to_positional_for_positional_script() {
        let p = Params::Named(record([("b", 2), ("a", 1)]));
        let out = normalize("INSERT INTO t (b, a) VALUES (?, ?)", &p).unwrap();
        assert_eq!(out, ints(&[2, 1]));
    }

    #[test]
    fn test_order_is_stable_across_calls() {
        let p = Params::Named(record([("x", 3), ("y", 4), ("z", 5)]));
        let first = normalize("VALUES (?, ?, ?)", &p).unwrap();
        for _ in 0..5 {
            assert_eq!(normalize("VALUES (?, ?, ?)", &p).unwrap(), first);
        }
    }

    #[test]
    fn test_batch_alignment_uses_first_row_order() {
        let p = Params::from(vec![
            record([("a", 1), ("b", 2)]),
            record([("b", 4), ("a", 3)]),
        ]);
        let out = normalize("INSERT INTO t (a, b) VALUES (%s, %s)", &p).unwrap();
        assert_eq!(out, Params::Batch(vec![ints(&[1, 2]), ints(&[3, 4])]));
    }

    #[test]
    fn test_batch_simple_alignment() {
        let p = Params::from(vec![record([("a", 1), ("b", 2)]), record([("a", 3), ("b", 4)])]);
        let out = normalize("INSERT INTO t VALUES (?, ?)", &p).unwrap();
        assert_eq!(out, Params::Batch(vec![ints(&[1, 2]), ints(&[3, 4])]));
    }

    #[test]
    fn test_batch_missing_key_is_shape_mismatch() {
        let p = Params::from(vec![record([("a", 1), ("b", 2)]), record([("a", 3)])]);
        let err = normalize("INSERT INTO t VALUES (?, ?)", &p).unwrap_err();
        assert!(matches!(
            err,
            DatabaseError::ShapeMismatch { row: 1, expected: 2, found: 1 }
        ));
    }

    #[test]
    fn test_batch_extra_keys_are_ignored() {
        let p = Params::from(vec![
            record([("a", 1)]),
            record([("c", 9), ("a", 2)]),
        ]);
        let out = normalize("INSERT INTO t (a) VALUES (?)", &p).unwrap();
        assert_eq!(out, Params::Batch(vec![ints(&[1]), ints(&[2])]));
    }

    #[test]
    fn test_named_batch_passes_through() {
        let p = Params::from(vec![record([("a", 1)]), record([("a", 2)])]);
        let out = normalize("INSERT INTO t (a) VALUES (:a)", &p).unwrap();
        assert_eq!(out, p);
    }

    #[test]
    fn test_positional_batch_arity_checked() {
        let p = Params::from(vec![
            vec![Value::Integer(1), Value::Integer(2)],
            vec![Value::Integer(3)],
        ]);
        assert!(normalize("VALUES (?, ?)", &p).is_err());
    }

    #[test]
    fn test_passthrough() {
        assert_eq!(normalize("SELECT 1", &Params::None).unwrap(), Params::None);
        assert_eq!(normalize("SELECT ?", &ints(&[1])).unwrap(), ints(&[1]));
        let scalar = Params::from(Value::Integer(7));
        assert_eq!(normalize("SELECT ?", &scalar).unwrap(), ints(&[7]));
    }
}
