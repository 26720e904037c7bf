use super::Dialect;
use crate::core::{Arguments, DatabaseError, Params, Result, Value};
use crate::parser::normalize::is_ident_char;

/// A parameter marker found in quote-scanned text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    /// `%s`, or `?` on the embedded backend.
    Next,
    /// `$3`, or `?3` on the embedded backend.
    Number(usize),
    /// `%(name)s`, `:name`, and on the embedded backend `@name` / `$name`.
    Name { name: String, sigil: char },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece {
    Text(String),
    Marker(Marker),
}

fn push_text(pieces: &mut Vec<Piece>, s: &str) {
    if let Some(Piece::Text(last)) = pieces.last_mut() {
        last.push_str(s);
    } else {
        pieces.push(Piece::Text(s.to_string()));
    }
}

fn take_digits(rest: &str) -> &str {
    let end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    &rest[..end]
}

fn take_ident(rest: &str) -> &str {
    if !rest.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        return "";
    }
    let end = rest.find(|c: char| !is_ident_char(c)).unwrap_or(rest.len());
    &rest[..end]
}

/// A `:` right after `[` or a digit is an array slice bound (`arr[1:n]`).
pub(crate) fn is_slice_colon(before: &str) -> bool {
    before
        .chars()
        .next_back()
        .is_some_and(|c| c == '[' || c.is_ascii_digit())
}

/// Splits scanned text into literal text and parameter markers.
///
/// `%%` is an escaped percent sign and `::` a cast; both are literal text,
/// as is the colon of an array slice.
#[must_use]
pub fn lex(dialect: Dialect, text: &str) -> Vec<Piece> {
    let embedded = dialect == Dialect::Sqlite;
    let mut pieces = Vec::new();
    let mut i = 0;

    while i < text.len() {
        let rest = &text[i..];
        let mut chars = rest.chars();
        let Some(c) = chars.next() else { break };
        let next = chars.next();

        let (consumed, marker) = match (c, next) {
            ('%', Some('%')) => {
                push_text(&mut pieces, "%");
                (2, None)
            }
            ('%', Some('s')) => (2, Some(Marker::Next)),
            ('%', Some('(')) => match rest[2..].find(")s") {
                Some(close) if !rest[2..2 + close].is_empty() => {
                    let name = rest[2..2 + close].to_string();
                    (close + 4, Some(Marker::Name { name, sigil: '%' }))
                }
                _ => (0, None),
            },
            (':', Some(':')) => {
                push_text(&mut pieces, "::");
                (2, None)
            }
            (':', _) => {
                let name = take_ident(&rest[1..]);
                if name.is_empty() || is_slice_colon(&text[..i]) {
                    (0, None)
                } else {
                    let marker = Marker::Name { name: name.to_string(), sigil: ':' };
                    (1 + name.len(), Some(marker))
                }
            }
            ('?', _) if embedded => {
                let digits = take_digits(&rest[1..]);
                match digits.parse::<usize>() {
                    Ok(n) => (1 + digits.len(), Some(Marker::Number(n))),
                    Err(_) => (1, Some(Marker::Next)),
                }
            }
            ('$', _) => {
                let digits = take_digits(&rest[1..]);
                let name = take_ident(&rest[1..]);
                if let Ok(n) = digits.parse::<usize>() {
                    (1 + digits.len(), Some(Marker::Number(n)))
                } else if embedded && !name.is_empty() {
                    let marker = Marker::Name { name: name.to_string(), sigil: '$' };
                    (1 + name.len(), Some(marker))
                } else {
                    (0, None)
                }
            }
            ('@', _) if embedded => {
                let name = take_ident(&rest[1..]);
                if name.is_empty() {
                    (0, None)
                } else {
                    let marker = Marker::Name { name: name.to_string(), sigil: '@' };
                    (1 + name.len(), Some(marker))
                }
            }
            _ => (0, None),
        };

        match (consumed, marker) {
            (0, _) => {
                push_text(&mut pieces, &rest[..c.len_utf8()]);
                i += c.len_utf8();
            }
            (n, Some(marker)) => {
                pieces.push(Piece::Marker(marker));
                i += n;
            }
            (n, None) => i += n,
        }
    }
    pieces
}

/// Number of positional slots opened before the end of `text`, and the
/// highest explicit number seen.
#[must_use]
pub fn positional_count(dialect: Dialect, text: &str) -> (usize, usize) {
    lex(dialect, text)
        .iter()
        .fold((0, 0), |(next, max), piece| match piece {
            Piece::Marker(Marker::Next) => (next + 1, max),
            Piece::Marker(Marker::Number(n)) => (next, max.max(*n)),
            _ => (next, max),
        })
}

/// How normalized parameters map onto the driver's arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Plan {
    /// Values go through in order.
    Positional,
    /// Each distinct name becomes the next numbered slot.
    NamesToSlots(Vec<String>),
    /// The driver binds by name; `(marker, key)`.
    ByName(Vec<(String, String)>),
}

/// SQL text with native placeholders plus the arguments to bind.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStatement {
    pub sql: String,
    pub args: Bound,
}

/// One argument set, or one per row of a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Bound {
    Single(Arguments),
    Many(Vec<Arguments>),
}

impl Bound {
    #[must_use]
    pub fn rows(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Many(rows) => rows.len(),
        }
    }
}

fn render(dialect: Dialect, pieces: &[Piece]) -> (String, Plan) {
    let max_number = pieces
        .iter()
        .filter_map(|p| match p {
            Piece::Marker(Marker::Number(n)) => Some(*n),
            _ => None,
        })
        .max()
        .unwrap_or(0);

    let mut sql = String::new();
    let mut next_slot = max_number;
    let mut names: Vec<String> = Vec::new();
    let mut bindings: Vec<(String, String)> = Vec::new();

    for piece in pieces {
        match (dialect, piece) {
            (_, Piece::Text(t)) => sql.push_str(t),
            (Dialect::Postgres, Piece::Marker(Marker::Next)) => {
                next_slot += 1;
                sql.push_str(&format!("${next_slot}"));
            }
            (Dialect::Postgres, Piece::Marker(Marker::Number(n))) => sql.push_str(&format!("${n}")),
            (Dialect::Postgres, Piece::Marker(Marker::Name { name, .. })) => {
                let slot = match names.iter().position(|n| n == name) {
                    Some(i) => i + 1,
                    None => {
                        names.push(name.clone());
                        names.len()
                    }
                };
                sql.push_str(&format!("${slot}"));
            }
            (Dialect::Sqlite, Piece::Marker(Marker::Next)) => sql.push('?'),
            (Dialect::Sqlite, Piece::Marker(Marker::Number(n))) => sql.push_str(&format!("?{n}")),
            (Dialect::Sqlite, Piece::Marker(Marker::Name { name, sigil })) => {
                let sigil = if *sigil == '%' { ':' } else { *sigil };
                let marker = format!("{sigil}{name}");
                sql.push_str(&marker);
                if !bindings.iter().any(|(m, _)| *m == marker) {
                    bindings.push((marker, name.clone()));
                }
            }
        }
    }

    let plan = if !names.is_empty() {
        Plan::NamesToSlots(names)
    } else if !bindings.is_empty() {
        Plan::ByName(bindings)
    } else {
        Plan::Positional
    };
    (sql, plan)
}

fn lookup(params: &Params, key: &str) -> Result<Value> {
    match params {
        Params::Named(record) => record
            .get(key)
            .cloned()
            .ok_or_else(|| DatabaseError::MissingParameter(key.to_string())),
        _ => Err(DatabaseError::MissingParameter(key.to_string())),
    }
}

fn bind(plan: &Plan, params: &Params) -> Result<Arguments> {
    let args = match (plan, params) {
        (_, Params::None) => Arguments::Empty,
        (_, Params::Batch(_)) => {
            return Err(DatabaseError::ParseError("nested batch parameters".to_string()));
        }
        (_, Params::Positional(values)) => Arguments::Positional(values.clone()),
        (Plan::Positional, Params::Named(record)) => {
            Arguments::Positional(record.values().cloned().collect())
        }
        (Plan::NamesToSlots(names), named) => Arguments::Positional(
            names.iter().map(|n| lookup(named, n)).collect::<Result<_>>()?,
        ),
        (Plan::ByName(bindings), named) => Arguments::Named(
            bindings
                .iter()
                .map(|(marker, key)| Ok((marker.clone(), lookup(named, key)?)))
                .collect::<Result<_>>()?,
        ),
    };
    Ok(args)
}

/// Rewrites markers to the backend's native style and lays out the arguments.
pub fn compile(dialect: Dialect, text: &str, params: &Params) -> Result<CompiledStatement> {
    let (sql, plan) = render(dialect, &lex(dialect, text));
    let args = match params {
        Params::Batch(rows) => {
            Bound::Many(rows.iter().map(|row| bind(&plan, row)).collect::<Result<_>>()?)
        }
        single => Bound::Single(bind(&plan, single)?),
    };
    Ok(CompiledStatement { sql, args })
}
