//! Positional `?` placeholder scanning and backend-specific rewriting.
//!
//! Callers always write `?`. Before a statement reaches a backend its placeholders are
//! counted (a count mismatch never reaches the server) and, where the native client
//! expects another syntax, rewritten. Quoted literals, bracketed identifiers,
//! comments and dollar-quoted blocks are skipped by a small state machine; it is
//! not a SQL parser, so operators spelled with `?` (e.g. `PostgreSQL`'s `?|`) are
//! still taken for placeholders.

use std::borrow::Cow;
use std::fmt::Write;

mod scanner;

use scanner::{State, at, dollar_closer, dollar_opener, quote_closer};

/// Native placeholder syntax of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `?` (`SQLite`): left untouched.
    Question,
    /// `$1, $2, ...` (`PostgreSQL`).
    Dollar,
    /// `@P1, @P2, ...` (SQL Server).
    AtP,
}

/// Byte offsets of every positional placeholder in `sql`.
///
/// `[...]` is treated as a quoted identifier only for SQL Server; elsewhere brackets
/// are array syntax and may hold placeholders.
#[must_use]
pub fn placeholder_positions(sql: &str, style: PlaceholderStyle) -> Vec<usize> {
    let brackets_quote = style == PlaceholderStyle::AtP;
    let bytes = sql.as_bytes();
    let mut positions = Vec::new();
    let mut state = State::Normal;
    let mut idx = 0;

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => {
                if let Some(closer) = quote_closer(b, brackets_quote) {
                    state = State::Quoted(closer);
                } else if b == b'?' {
                    positions.push(idx);
                } else if at(bytes, idx, b"--") {
                    state = State::LineComment;
                    idx += 1;
                } else if at(bytes, idx, b"/*") {
                    state = State::BlockComment(1);
                    idx += 1;
                } else if b == b'$' {
                    if let Some((tag, opener_end)) = dollar_opener(bytes, idx) {
                        state = State::DollarQuoted(tag);
                        idx = opener_end;
                    }
                }
            }
            State::Quoted(closer) => {
                if b == closer {
                    if bytes.get(idx + 1) == Some(&closer) {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                if at(bytes, idx, b"/*") {
                    state = State::BlockComment(depth + 1);
                    idx += 1;
                } else if at(bytes, idx, b"*/") {
                    state = if depth == 1 {
                        State::Normal
                    } else {
                        State::BlockComment(depth - 1)
                    };
                    idx += 1;
                }
            }
            State::DollarQuoted(ref tag) => {
                if dollar_closer(bytes, idx, tag) {
                    idx += tag.len() + 1;
                    state = State::Normal;
                }
            }
        }
        idx += 1;
    }

    positions
}

/// Number of positional placeholders in `sql` as seen by a backend using `style`.
#[must_use]
pub fn count_placeholders(sql: &str, style: PlaceholderStyle) -> usize {
    placeholder_positions(sql, style).len()
}

/// Rewrite `?` placeholders into `style`. Borrows when nothing changes.
#[must_use]
pub fn rewrite_placeholders(sql: &str, style: PlaceholderStyle) -> Cow<'_, str> {
    let prefix = match style {
        PlaceholderStyle::Question => return Cow::Borrowed(sql),
        PlaceholderStyle::Dollar => "$",
        PlaceholderStyle::AtP => "@P",
    };
    let positions = placeholder_positions(sql, style);
    if positions.is_empty() {
        return Cow::Borrowed(sql);
    }

    let mut out = String::with_capacity(sql.len() + positions.len() * 3);
    let mut last = 0;
    for (n, pos) in positions.iter().enumerate() {
        out.push_str(&sql[last..*pos]);
        // writing to a String cannot fail
        let _ = write!(out, "{prefix}{}", n + 1);
        last = pos + 1;
    }
    out.push_str(&sql[last..]);
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_bare_placeholders() {
        let q = PlaceholderStyle::Question;
        assert_eq!(count_placeholders("select * from t where a = ? and b = ?", q), 2);
        assert_eq!(count_placeholders("select 1", q), 0);
    }

    #[test]
    fn skips_literals_and_comments() {
        let sql = "select '?', \"?\", [a?] -- ?\n/* ? /* ? */ */ from t where a = ?";
        assert_eq!(count_placeholders(sql, PlaceholderStyle::AtP), 1);
        assert_eq!(count_placeholders(sql, PlaceholderStyle::Dollar), 2);
    }

    #[test]
    fn skips_escaped_quotes() {
        let q = PlaceholderStyle::Question;
        assert_eq!(count_placeholders("select 'it''s ?' , ?", q), 1);
        assert_eq!(count_placeholders(r"select 'C:\', ?", q), 1);
    }

    #[test]
    fn skips_dollar_quoted_blocks() {
        let sql = "select $body$ ? $body$, ? , $$ ? $$";
        assert_eq!(count_placeholders(sql, PlaceholderStyle::Dollar), 1);
    }

    #[test]
    fn array_brackets_hold_placeholders_outside_sql_server() {
        let res = rewrite_placeholders("select ARRAY[?, ?]", PlaceholderStyle::Dollar);
        assert_eq!(res, "select ARRAY[$1, $2]");
    }

    #[test]
    fn rewrites_to_dollar() {
        let res = rewrite_placeholders("insert into t values(?, ?)", PlaceholderStyle::Dollar);
        assert_eq!(res, "insert into t values($1, $2)");
    }

    #[test]
    fn rewrites_to_at_p() {
        let res = rewrite_placeholders(
            "update t set a = ? where b = '?' and c = ?",
            PlaceholderStyle::AtP,
        );
        assert_eq!(res, "update t set a = @P1 where b = '?' and c = @P2");
    }

    #[test]
    fn question_style_borrows() {
        let sql = "select ?";
        let res = rewrite_placeholders(sql, PlaceholderStyle::Question);
        assert!(matches!(res, Cow::Borrowed(_)));
        let res = rewrite_placeholders("select 1", PlaceholderStyle::Dollar);
        assert!(matches!(res, Cow::Borrowed(_)));
    }
}
