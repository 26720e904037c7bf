use crate::connection::{Cursor, Driver};
use crate::core::{Params, Result};
use crate::dialect::{Bound, Dialect};
use crate::parser::{DEFAULT_QUOTES, normalize, scan_quotes};

/// A script compiled for one backend, ready to hand to its driver.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedStatement {
    pub sql: String,
    pub args: Bound,
    /// More than one `;`-separated statement outside quotes.
    pub multi: bool,
}

fn has_several_statements(scanned_text: &str) -> bool {
    scanned_text.trim().trim_end_matches(';').contains(';')
}

/// Scan quotes, rewrite for the dialect, normalize and compile.
pub fn prepare(dialect: Dialect, script: &str, params: &Params) -> Result<PreparedStatement> {
    let scanned = scan_quotes(script, DEFAULT_QUOTES);
    let rewrite = dialect.rewrite(&scanned);
    let params = rewrite.inject(normalize(&rewrite.text, params)?);
    let compiled = dialect.compile(&rewrite, &params)?;
    Ok(PreparedStatement {
        sql: compiled.sql,
        args: compiled.args,
        multi: has_several_statements(&scanned.text),
    })
}

/// Sends a prepared statement through the single-row, multi-row or script
/// primitive of the driver.
pub fn run(driver: &mut dyn Driver, prepared: &PreparedStatement) -> Result<Cursor> {
    match &prepared.args {
        Bound::Many(rows) => {
            log::debug!("execute_many ({} rows): {}", rows.len(), prepared.sql);
            let affected = driver.execute_many(&prepared.sql, rows)?;
            Ok(Cursor::affected(affected, None))
        }
        Bound::Single(args) if args.is_empty() && prepared.multi => {
            log::debug!("execute_script: {}", prepared.sql);
            driver.execute_script(&prepared.sql)?;
            Ok(Cursor::default())
        }
        Bound::Single(args) => {
            log::debug!("execute: {} {:?}", prepared.sql, args);
            driver.execute(&prepared.sql, args)
        }
    }
}
