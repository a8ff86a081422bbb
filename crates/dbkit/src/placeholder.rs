//! `?` placeholder scanning and dialect rewriting.
//!
//! Statements are assembled with `?` placeholders. Quoted strings, quoted identifiers,
//! dollar-quoted bodies and comments are skipped, so a literal `'?'` is never counted
//! or rewritten.

use serde::Deserialize;
use std::borrow::Cow;

/// Placeholder syntax of the target database.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placeholder {
    /// `?` (MySQL, SQLite)
    #[default]
    Question,
    /// `$1, $2, ...` (PostgreSQL)
    Dollar,
}

#[derive(Clone)]
enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    LineComment,
    BlockComment(u32),
    DollarQuoted(String),
}

fn is_line_comment_start(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'-') && bytes.get(idx + 1) == Some(&b'-')
}

fn is_block_comment_start(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'/') && bytes.get(idx + 1) == Some(&b'*')
}

fn is_block_comment_end(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'*') && bytes.get(idx + 1) == Some(&b'/')
}

fn try_start_dollar_quote(bytes: &[u8], start: usize) -> Option<(String, usize)> {
    let mut idx = start + 1;
    while idx < bytes.len() && bytes[idx] != b'$' {
        let b = bytes[idx];
        if !(b.is_ascii_alphanumeric() || b == b'_') || (idx == start + 1 && b.is_ascii_digit()) {
            return None;
        }
        idx += 1;
    }
    if idx < bytes.len() {
        let tag = String::from_utf8(bytes[start + 1..idx].to_vec()).ok()?;
        Some((tag, idx))
    } else {
        None
    }
}

fn closes_dollar_quote(bytes: &[u8], idx: usize, tag: &str) -> bool {
    let end = idx + 1 + tag.len();
    bytes[idx] == b'$'
        && end < bytes.len()
        && &bytes[idx + 1..end] == tag.as_bytes()
        && bytes[end] == b'$'
}

/// Byte offsets of every `?` placeholder outside literals and comments.
pub fn placeholder_offsets(sql: &str) -> Vec<usize> {
    let bytes = sql.as_bytes();
    let mut offsets = Vec::new();
    let mut state = State::Normal;
    let mut idx = 0;

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => match b {
                b'\'' => state = State::SingleQuoted,
                b'"' => state = State::DoubleQuoted,
                b'?' => offsets.push(idx),
                _ if is_line_comment_start(bytes, idx) => state = State::LineComment,
                _ if is_block_comment_start(bytes, idx) => {
                    state = State::BlockComment(1);
                    idx += 1;
                }
                b'$' => {
                    if let Some((tag, end)) = try_start_dollar_quote(bytes, idx) {
                        state = State::DollarQuoted(tag);
                        idx = end;
                    }
                }
                _ => {}
            },
            State::SingleQuoted => {
                if b == b'\'' {
                    if bytes.get(idx + 1) == Some(&b'\'') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                } else if b == b'\\' {
                    // MySQL-style escape inside a string literal
                    idx += 1;
                }
            }
            State::DoubleQuoted => {
                if b == b'"' {
                    if bytes.get(idx + 1) == Some(&b'"') {
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
                if is_block_comment_start(bytes, idx) {
                    state = State::BlockComment(depth + 1);
                    idx += 1;
                } else if is_block_comment_end(bytes, idx) {
                    state = if depth == 1 {
                        State::Normal
                    } else {
                        State::BlockComment(depth - 1)
                    };
                    idx += 1;
                }
            }
            State::DollarQuoted(ref tag) => {
                if closes_dollar_quote(bytes, idx, tag) {
                    idx += tag.len() + 1;
                    state = State::Normal;
                }
            }
        }
        idx += 1;
    }
    offsets
}

/// Number of `?` placeholders outside literals and comments.
pub fn count_placeholders(sql: &str) -> usize {
    placeholder_offsets(sql).len()
}

/// Replace each placeholder, in order, with the text produced by `f(index)`.
pub(crate) fn replace_placeholders<'a, F>(sql: &'a str, mut f: F) -> Cow<'a, str>
where
    F: FnMut(usize) -> Cow<'a, str>,
{
    let offsets = placeholder_offsets(sql);
    if offsets.is_empty() {
        return Cow::Borrowed(sql);
    }
    let mut out = String::with_capacity(sql.len() + offsets.len() * 2);
    let mut last = 0;
    for (index, offset) in offsets.into_iter().enumerate() {
        out.push_str(&sql[last..offset]);
        out.push_str(&f(index));
        last = offset + 1;
    }
    out.push_str(&sql[last..]);
    Cow::Owned(out)
}

/// Rewrite `?` placeholders into the target syntax.
///
/// ```ignore
/// assert_eq!(rewrite("a = ? AND b = '?'", Placeholder::Dollar), "a = $1 AND b = '?'");
/// ```
pub fn rewrite(sql: &str, style: Placeholder) -> Cow<'_, str> {
    match style {
        Placeholder::Question => Cow::Borrowed(sql),
        Placeholder::Dollar => {
            replace_placeholders(sql, |index| Cow::Owned(format!("${}", index + 1)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_skip_literals_and_comments() {
        assert_eq!(count_placeholders("a = ? AND b = ?"), 2);
        assert_eq!(count_placeholders("a = '?' AND b = ?"), 1);
        assert_eq!(count_placeholders(r#"a = "col?" AND b = ?"#), 1);
        assert_eq!(count_placeholders("a = ? -- b = ?\n AND c = ?"), 2);
        assert_eq!(count_placeholders("a = ? /* ? /* ? */ */ AND c = ?"), 2);
        assert_eq!(count_placeholders("a = $tag$ ? $tag$ AND b = ?"), 1);
        assert_eq!(count_placeholders("a = 'it''s ?' AND b = ?"), 1);
    }

    #[test]
    fn test_rewrite_to_dollar() {
        assert_eq!(
            rewrite("SELECT * FROM t WHERE a = ? AND b = '?' AND c IN(?,?)", Placeholder::Dollar),
            "SELECT * FROM t WHERE a = $1 AND b = '?' AND c IN($2,$3)"
        );
    }

    #[test]
    fn test_rewrite_question_is_borrowed() {
        assert!(matches!(
            rewrite("a = ?", Placeholder::Question),
            Cow::Borrowed("a = ?")
        ));
    }

    #[test]
    fn test_positional_parameters_are_not_dollar_quotes() {
        assert_eq!(count_placeholders("a = $1 AND b = ?"), 1);
    }
}
