use super::{Fragment, NormalizeOptions, Where};
use crate::error::{OrmError, OrmResult};
use crate::placeholder::{count_placeholders, replace_placeholders};
use crate::value::Value;
use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

/// A bare column reference such as `id`, `u.id` or `order-no`.
static FIELD_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w.\-]+$").expect("valid field name regex"));

/// A key ending in a comparison operator, e.g. `age >=`.
static LAST_OPERATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[<>=]+\s*$").expect("valid operator regex"));

/// A key ending in a keyword operator, e.g. `name like`, `id not in`.
static KEYWORD_OPERATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s(?:not\s+)?(like|ilike|in|between)\s*$").expect("valid keyword regex")
});

/// Column shorthand for `Raw` conditions: a bare column, optionally followed by an operator.
static COLUMN_SHORTHAND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[\w.\-]+(?:\s*[<>=!]+|\s+(?:not\s+)?(?:like|ilike|in|between))?\s*$")
        .expect("valid shorthand regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Suffix {
    Compare,
    Like,
    In,
    Between,
}

fn operator_suffix(key: &str) -> Option<Suffix> {
    if LAST_OPERATOR.is_match(key) {
        return Some(Suffix::Compare);
    }
    let caps = KEYWORD_OPERATOR.captures(key)?;
    match caps.get(1)?.as_str().to_ascii_lowercase().as_str() {
        "like" | "ilike" => Some(Suffix::Like),
        "in" => Some(Suffix::In),
        "between" => Some(Suffix::Between),
        _ => None,
    }
}

/// Normalize one condition and its positional arguments.
///
/// The returned fragment has exactly one argument per `?`, in order. List arguments are
/// expanded into `?,?,?` (an empty list becomes `NULL`); byte strings are never expanded.
pub fn normalize(
    condition: &Where,
    args: &[Value],
    options: NormalizeOptions,
) -> OrmResult<Fragment> {
    let fragment = normalize_shape(condition, args, options)?;
    Ok(expand_lists(fragment))
}

fn normalize_shape(
    condition: &Where,
    args: &[Value],
    options: NormalizeOptions,
) -> OrmResult<Fragment> {
    match condition {
        Where::Empty => {
            if args.is_empty() {
                Ok(Fragment::default())
            } else {
                Err(OrmError::malformed(format!(
                    "{} argument(s) supplied without a condition",
                    args.len()
                )))
            }
        }
        Where::Raw(sql) => normalize_raw(sql, args),
        Where::Map(entries) => normalize_entries("key/value", entries, args, options),
        Where::Record { type_name, entries } => {
            normalize_entries(type_name, entries, args, options)
        }
        Where::Seq(items) => normalize_seq(items, args, options),
    }
}

fn normalize_raw(sql: &str, args: &[Value]) -> OrmResult<Fragment> {
    let text = sql.trim();
    if text.is_empty() {
        if args.is_empty() {
            return Ok(Fragment::default());
        }
        return Err(OrmError::malformed(format!(
            "{} argument(s) supplied to an empty condition",
            args.len()
        )));
    }

    let holders = count_placeholders(text);
    if holders == 0 && args.len() == 1 && COLUMN_SHORTHAND.is_match(text) {
        // Where("uid", 1), Where("age >=", 18), Where("id", vec![1, 2])
        return entry_fragment(text, &args[0]);
    }
    // Query("age BETWEEN ? AND ?", vec![1, 5]): the list is the argument list
    if let [Value::List(items)] = args
        && holders > 1
        && items.len() == holders
    {
        return Ok(Fragment::new(text, args.to_vec()));
    }
    if args.len() == holders {
        return Ok(Fragment::new(text, args.to_vec()));
    }
    if args.len() < holders {
        return Err(OrmError::malformed(format!(
            "template '{}' has {} '?', but {} values provided",
            text,
            holders,
            args.len()
        )));
    }

    // Surplus leading arguments fill the printf-style directives first.
    let directives = count_directives(text);
    if directives == 0 || directives > args.len() {
        return Err(OrmError::malformed(format!(
            "template '{}' has {} '?' and {} format directive(s), but {} values provided",
            text,
            holders,
            directives,
            args.len()
        )));
    }
    let (template_args, bind) = args.split_at(directives);
    let formatted = format_template(text, template_args);
    let remaining = count_placeholders(&formatted);
    if remaining != bind.len() {
        return Err(OrmError::malformed(format!(
            "template '{}' has {} '?', but {} values provided",
            formatted,
            remaining,
            bind.len()
        )));
    }
    Ok(Fragment::new(formatted, bind.to_vec()))
}

/// Number of `%s`, `%d` and `%v` directives (`%%` is a literal percent).
fn count_directives(text: &str) -> usize {
    let mut count = 0;
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '%' {
            match chars.next() {
                Some('s' | 'd' | 'v') => count += 1,
                _ => {}
            }
        }
    }
    count
}

fn format_template(text: &str, args: &[Value]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut args = args.iter();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('%') => {
                chars.next();
                out.push('%');
            }
            Some('s' | 'd' | 'v') => {
                chars.next();
                if let Some(arg) = args.next() {
                    out.push_str(&arg.to_string());
                }
            }
            _ => out.push('%'),
        }
    }
    out
}

fn normalize_entries(
    source: &str,
    entries: &[(String, Value)],
    args: &[Value],
    options: NormalizeOptions,
) -> OrmResult<Fragment> {
    if !args.is_empty() {
        return Err(OrmError::malformed(format!(
            "{} positional argument(s) supplied to a {source} condition",
            args.len()
        )));
    }
    let mut out = Fragment::default();
    for (key, value) in entries {
        if options.omit_empty && value.is_empty() {
            continue;
        }
        let entry = entry_fragment(key, value)?;
        if !out.sql.is_empty() {
            out.sql.push_str(" AND ");
        }
        out.sql.push_str(&entry.sql);
        out.args.extend(entry.args);
    }
    Ok(out)
}

/// One `"column [operator]" => value` entry.
fn entry_fragment(key: &str, value: &Value) -> OrmResult<Fragment> {
    let key = key.trim();
    if key.is_empty() {
        return Err(OrmError::malformed("condition key is empty"));
    }
    let holders = count_placeholders(key);

    match value {
        Value::List(items) => {
            if holders > 0 && holders == items.len() {
                // "a BETWEEN ? AND ?" => [1, 5]
                return Ok(Fragment::new(key, items.clone()));
            }
            if holders > 0 {
                return Ok(Fragment::new(key, vec![value.clone()]));
            }
            match operator_suffix(key) {
                Some(Suffix::Between) => {
                    if items.len() != 2 {
                        return Err(OrmError::malformed(format!(
                            "'{key}' needs exactly two values, got {}",
                            items.len()
                        )));
                    }
                    Ok(Fragment::new(format!("{key} ? AND ?"), items.clone()))
                }
                Some(Suffix::In) => Ok(Fragment::new(format!("{key}(?)"), vec![value.clone()])),
                Some(Suffix::Compare | Suffix::Like) => Err(OrmError::malformed(format!(
                    "'{key}' cannot compare against a list"
                ))),
                None => Ok(Fragment::new(format!("{key} IN(?)"), vec![value.clone()])),
            }
        }
        Value::Null => {
            if FIELD_NAME.is_match(key) {
                Ok(Fragment::new(format!("{key} IS NULL"), Vec::new()))
            } else {
                // "age > 16" => NULL is appended as written
                Ok(Fragment::new(key, Vec::new()))
            }
        }
        _ => {
            if holders > 0 {
                return Ok(Fragment::new(key, vec![value.clone()]));
            }
            let sql = match operator_suffix(key) {
                Some(Suffix::Compare | Suffix::Like) => format!("{key} ?"),
                Some(Suffix::In) => format!("{key}(?)"),
                Some(Suffix::Between) => {
                    return Err(OrmError::malformed(format!(
                        "'{key}' needs a two-element list"
                    )));
                }
                None => format!("{key}=?"),
            };
            Ok(Fragment::new(sql, vec![value.clone()]))
        }
    }
}

/// Placeholders a condition consumes from a shared argument list.
fn arity(condition: &Where) -> usize {
    match condition {
        Where::Raw(sql) => count_placeholders(sql),
        Where::Seq(items) => items.iter().map(arity).sum(),
        Where::Empty | Where::Map(_) | Where::Record { .. } => 0,
    }
}

fn normalize_seq(
    items: &[Where],
    args: &[Value],
    options: NormalizeOptions,
) -> OrmResult<Fragment> {
    let mut parts = Vec::with_capacity(items.len());
    let mut cursor = 0;
    for item in items {
        let end = cursor + arity(item);
        if end > args.len() {
            return Err(OrmError::malformed(format!(
                "sequence condition needs at least {} argument(s), got {}",
                end,
                args.len()
            )));
        }
        let fragment = normalize_shape(item, &args[cursor..end], options)?;
        cursor = end;
        if !fragment.is_empty() {
            parts.push(fragment);
        }
    }
    if cursor != args.len() {
        return Err(OrmError::malformed(format!(
            "{} unused argument(s) after sequence condition",
            args.len() - cursor
        )));
    }

    let grouped = parts.len() > 1;
    let mut out = Fragment::default();
    for part in parts {
        if !out.sql.is_empty() {
            out.sql.push_str(" AND ");
        }
        if grouped && part.sql.to_ascii_uppercase().contains(" OR ") {
            out.sql.push('(');
            out.sql.push_str(&part.sql);
            out.sql.push(')');
        } else {
            out.sql.push_str(&part.sql);
        }
        out.args.extend(part.args);
    }
    Ok(out)
}

pub(crate) fn expand_lists(fragment: Fragment) -> Fragment {
    if !fragment.args.iter().any(|arg| matches!(arg, Value::List(_))) {
        return fragment;
    }
    let Fragment { sql, args } = fragment;

    // A lone list matching the placeholder count is used as the argument list itself.
    if let [Value::List(items)] = args.as_slice()
        && count_placeholders(&sql) == items.len()
    {
        return Fragment::new(sql, items.clone());
    }

    let expanded = replace_placeholders(&sql, |index| match args.get(index) {
        Some(Value::List(items)) if items.is_empty() => Cow::Borrowed("NULL"),
        Some(Value::List(items)) => Cow::Owned(vec!["?"; items.len()].join(",")),
        _ => Cow::Borrowed("?"),
    })
    .into_owned();

    let mut flat = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            Value::List(items) => flat.extend(items),
            other => flat.push(other),
        }
    }
    Fragment::new(expanded, flat)
}
