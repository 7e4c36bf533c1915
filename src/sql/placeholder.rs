//! `?` placeholder scanning.
//!
//! Placeholders inside quoted literals, quoted identifiers and comments are not
//! placeholders and are left alone. Scanning follows the backend's lexical rules:
//! MySQL treats a backslash inside a quoted literal as an escape, and on
//! PostgreSQL `??` stands for a literal `?` (the jsonb `?`, `?|` and `?&`
//! operators), which [`renumber`] writes back as a single `?`.

use crate::models::DatabaseType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Placeholder(usize),
    /// `??` on PostgreSQL, starting at the given offset.
    Escaped(usize),
}

fn scan(sql: &str, db_type: DatabaseType) -> Vec<Mark> {
    let bytes = sql.as_bytes();
    let backslash_escapes = db_type == DatabaseType::MySQL;
    let question_escapes = db_type == DatabaseType::PostgreSQL;
    let mut marks = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'?' if question_escapes && bytes.get(i + 1) == Some(&b'?') => {
                marks.push(Mark::Escaped(i));
                i += 2;
            }
            b'?' => {
                marks.push(Mark::Placeholder(i));
                i += 1;
            }
            quote @ (b'\'' | b'"' | b'`') => {
                i += 1;
                while i < bytes.len() {
                    if backslash_escapes && quote != b'`' && bytes[i] == b'\\' {
                        i += 2;
                        continue;
                    }
                    if bytes[i] == quote {
                        // doubled quote is an escaped quote
                        if bytes.get(i + 1) == Some(&quote) {
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    i += 1;
                }
                i += 1;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i < bytes.len() && !(bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/')) {
                    i += 1;
                }
                i += 2;
            }
            _ => i += 1,
        }
    }
    marks
}

fn placeholder_offsets(sql: &str, db_type: DatabaseType) -> impl Iterator<Item = usize> {
    scan(sql, db_type).into_iter().filter_map(|mark| match mark {
        Mark::Placeholder(offset) => Some(offset),
        Mark::Escaped(_) => None,
    })
}

/// Number of `?` placeholders in `sql`.
pub fn count_placeholders(sql: &str, db_type: DatabaseType) -> usize {
    placeholder_offsets(sql, db_type).count()
}

/// Replace the first placeholder of `template` with `count` comma-joined `?`s.
///
/// Returns `None` when the template has no placeholder. With `count == 0` the
/// placeholder becomes the literal `NULL`.
pub fn expand_first(template: &str, count: usize, db_type: DatabaseType) -> Option<String> {
    let first = placeholder_offsets(template, db_type).next()?;
    let replacement = if count == 0 {
        "NULL".to_string()
    } else {
        vec!["?"; count].join(", ")
    };
    let mut out = String::with_capacity(template.len() + replacement.len());
    out.push_str(&template[..first]);
    out.push_str(&replacement);
    out.push_str(&template[first + 1..]);
    Some(out)
}

/// Rewrite `?` placeholders as `$1, $2, ...` and `??` as `?` (PostgreSQL style).
pub fn renumber(sql: &str) -> String {
    let marks = scan(sql, DatabaseType::PostgreSQL);
    if marks.is_empty() {
        return sql.to_string();
    }
    let mut out = String::with_capacity(sql.len() + marks.len() * 2);
    let mut last = 0;
    let mut n = 0;
    for mark in marks {
        match mark {
            Mark::Placeholder(offset) => {
                n += 1;
                out.push_str(&sql[last..offset]);
                out.push('$');
                out.push_str(&n.to_string());
                last = offset + 1;
            }
            Mark::Escaped(offset) => {
                out.push_str(&sql[last..offset]);
                out.push('?');
                last = offset + 2;
            }
        }
    }
    out.push_str(&sql[last..]);
    out
}
