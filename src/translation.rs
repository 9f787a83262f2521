use std::borrow::Cow;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Placeholder style the caller writes statements in.
///
/// Everything is rewritten to PostgreSQL-style `$N` before it reaches the driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderStyle {
    /// printf-style `%s`, numbered left to right. `%%` becomes a literal percent sign
    /// anywhere in the statement, quoted text included; `%s` inside quotes, comments
    /// and dollar-quoted bodies is kept as written.
    #[default]
    Format,
    /// SQLite-style `?N`.
    Numbered,
    /// Already `$N`; no rewriting.
    Native,
}

/// Rewrite `sql` so its placeholders are PostgreSQL-style `$N`.
///
/// Placeholders inside quoted strings, quoted identifiers, comments and dollar-quoted
/// bodies are left alone. Returns a borrowed `Cow` when no changes are needed.
#[must_use]
pub fn translate_placeholders(sql: &str, style: PlaceholderStyle) -> Cow<'_, str> {
    if style == PlaceholderStyle::Native {
        return Cow::Borrowed(sql);
    }

    let mut out: Option<String> = None;
    let mut copied_until = 0;
    let mut next_format_index = 1usize;
    let mut state = State::Normal;
    let mut idx = 0;
    let bytes = sql.as_bytes();

    while idx < bytes.len() {
        let b = bytes[idx];
        // `%%` is a literal percent everywhere, including quotes and comments
        if style == PlaceholderStyle::Format && b == b'%' && bytes.get(idx + 1) == Some(&b'%') {
            let buf = out.get_or_insert_with(|| String::with_capacity(sql.len()));
            buf.push_str(&sql[copied_until..=idx]);
            idx += 2;
            copied_until = idx;
            continue;
        }
        match state {
            State::Normal => match b {
                b'\'' => state = State::SingleQuoted,
                b'"' => state = State::DoubleQuoted,
                b'-' if bytes.get(idx + 1) == Some(&b'-') => {
                    state = State::LineComment;
                    idx += 1;
                }
                b'/' if bytes.get(idx + 1) == Some(&b'*') => {
                    state = State::BlockComment(1);
                    idx += 1;
                }
                b'$' => {
                    if let Some((tag, advance)) = try_start_dollar_quote(bytes, idx) {
                        state = State::DollarQuoted(tag);
                        idx = advance;
                    }
                }
                b'%' if style == PlaceholderStyle::Format && bytes.get(idx + 1) == Some(&b's') => {
                    let buf = out.get_or_insert_with(|| String::with_capacity(sql.len() + 8));
                    buf.push_str(&sql[copied_until..idx]);
                    buf.push('$');
                    buf.push_str(&next_format_index.to_string());
                    next_format_index += 1;
                    idx += 1;
                    copied_until = idx + 1;
                }
                b'?' if style == PlaceholderStyle::Numbered => {
                    if let Some(digits_end) = scan_digits(bytes, idx + 1) {
                        let buf = out.get_or_insert_with(|| String::with_capacity(sql.len()));
                        buf.push_str(&sql[copied_until..idx]);
                        buf.push('$');
                        buf.push_str(&sql[idx + 1..digits_end]);
                        idx = digits_end - 1;
                        copied_until = digits_end;
                    }
                }
                _ => {}
            },
            State::SingleQuoted => {
                if b == b'\'' {
                    if bytes.get(idx + 1) == Some(&b'\'') {
                        idx += 1; // escaped quote
                    } else {
                        state = State::Normal;
                    }
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
                if b == b'/' && bytes.get(idx + 1) == Some(&b'*') {
                    state = State::BlockComment(depth + 1);
                    idx += 1;
                } else if b == b'*' && bytes.get(idx + 1) == Some(&b'/') {
                    state = if depth == 1 {
                        State::Normal
                    } else {
                        State::BlockComment(depth - 1)
                    };
                    idx += 1;
                }
            }
            State::DollarQuoted(ref tag) => {
                if b == b'$' && matches_tag(bytes, idx, tag) {
                    idx += tag.len() + 1;
                    state = State::Normal;
                }
            }
        }
        idx += 1;
    }

    match out {
        Some(mut buf) => {
            buf.push_str(&sql[copied_until.min(sql.len())..]);
            Cow::Owned(buf)
        }
        None => Cow::Borrowed(sql),
    }
}

/// Upper-cased leading keyword of a statement, used to name outcome events.
#[must_use]
pub fn statement_verb(sql: &str) -> String {
    sql.split_whitespace()
        .next()
        .map(|word| {
            word.trim_end_matches(';')
                .trim_start_matches('(')
                .to_ascii_uppercase()
        })
        .filter(|word| !word.is_empty())
        .unwrap_or_else(|| "QUERY".to_string())
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

fn scan_digits(bytes: &[u8], start: usize) -> Option<usize> {
    let mut idx = start;
    while idx < bytes.len() && bytes[idx].is_ascii_digit() {
        idx += 1;
    }
    (idx != start).then_some(idx)
}

fn try_start_dollar_quote(bytes: &[u8], start: usize) -> Option<(String, usize)> {
    let mut idx = start + 1;
    while idx < bytes.len() && bytes[idx] != b'$' {
        let b = bytes[idx];
        if !(b.is_ascii_alphabetic() || b == b'_' || (idx > start + 1 && b.is_ascii_digit())) {
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

/// True when `bytes[idx..]` is the closing `$tag$` of a dollar-quoted body.
fn matches_tag(bytes: &[u8], idx: usize, tag: &str) -> bool {
    let end = idx + 1 + tag.len();
    end < bytes.len() && &bytes[idx + 1..end] == tag.as_bytes() && bytes[end] == b'$'
}
