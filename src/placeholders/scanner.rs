//! Lexical states and byte lookaheads for the placeholder scanner.

#[derive(Clone)]
pub(super) enum State {
    Normal,
    /// Inside `'...'`, `"..."` or (SQL Server only) `[...]`; holds the closing byte.
    /// A doubled closer is an escaped one.
    Quoted(u8),
    LineComment,
    BlockComment(u32),
    DollarQuoted(String),
}

/// Closing byte for a quote opened by `b`, if `b` opens one.
pub(super) fn quote_closer(b: u8, brackets_quote: bool) -> Option<u8> {
    match b {
        b'\'' => Some(b'\''),
        b'"' => Some(b'"'),
        b'[' if brackets_quote => Some(b']'),
        _ => None,
    }
}

/// True when `pat` occurs at `idx`.
pub(super) fn at(bytes: &[u8], idx: usize, pat: &[u8]) -> bool {
    bytes.get(idx..idx + pat.len()) == Some(pat)
}

/// Recognise the `$tag$` (or `$$`) opener of a dollar-quoted block at `start`.
/// Returns the tag and the index of the opener's closing `$`. `$1` is not an opener,
/// since a tag cannot start with a digit.
pub(super) fn dollar_opener(bytes: &[u8], start: usize) -> Option<(String, usize)> {
    let rest = bytes.get(start + 1..)?;
    let len = rest
        .iter()
        .enumerate()
        .take_while(|&(i, &b)| tag_byte(b, i == 0))
        .count();
    if rest.get(len) != Some(&b'$') {
        return None;
    }
    let tag = std::str::from_utf8(&rest[..len]).ok()?;
    Some((tag.to_owned(), start + 1 + len))
}

fn tag_byte(b: u8, first: bool) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || (!first && b.is_ascii_digit())
}

/// True when the `$tag$` closer of a dollar-quoted block starts at `idx`.
pub(super) fn dollar_closer(bytes: &[u8], idx: usize, tag: &str) -> bool {
    bytes.get(idx) == Some(&b'$')
        && at(bytes, idx + 1, tag.as_bytes())
        && bytes.get(idx + 1 + tag.len()) == Some(&b'$')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dollar_openers() {
        assert_eq!(dollar_opener(b"$$ x", 0), Some((String::new(), 1)));
        assert_eq!(dollar_opener(b"$fn_1$", 0), Some(("fn_1".to_owned(), 5)));
        assert_eq!(dollar_opener(b"$1, $2", 0), None);
        assert_eq!(dollar_opener(b"$tag", 0), None);
    }

    #[test]
    fn brackets_quote_only_when_asked() {
        assert_eq!(quote_closer(b'[', true), Some(b']'));
        assert_eq!(quote_closer(b'[', false), None);
        assert!(dollar_closer(b"x $a$", 2, "a"));
        assert!(!dollar_closer(b"x $a", 2, "a"));
    }
}
