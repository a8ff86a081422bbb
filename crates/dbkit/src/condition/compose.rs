use super::{NormalizeOptions, Where, normalize};
use crate::error::OrmResult;
use crate::value::Value;
use regex::Regex;
use std::sync::LazyLock;

static WHERE_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bwhere\b").expect("valid WHERE regex"));

/// How a condition joins the conditions before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Joiner {
    Where,
    And,
    Or,
}

impl Joiner {
    fn keyword(self) -> &'static str {
        match self {
            Joiner::Where | Joiner::And => "AND",
            Joiner::Or => "OR",
        }
    }
}

/// One accumulated condition with its joiner and positional arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct WhereHolder {
    pub joiner: Joiner,
    pub condition: Where,
    pub args: Vec<Value>,
}

impl WhereHolder {
    pub fn new(joiner: Joiner, condition: impl Into<Where>, args: Vec<Value>) -> Self {
        Self {
            joiner,
            condition: condition.into(),
            args,
        }
    }
}

/// The folded predicate of a holder chain.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ComposedWhere {
    /// Predicate text without the leading `WHERE`.
    pub predicate: String,
    pub args: Vec<Value>,
    /// Whether any caller condition contributed (the soft-delete filter does not count).
    pub has_user_predicate: bool,
    /// Whether the raw SQL this predicate is appended to already has a `WHERE`.
    pub prefix_has_where: bool,
}

impl ComposedWhere {
    pub fn is_empty(&self) -> bool {
        self.predicate.is_empty()
    }

    /// `" WHERE p"`, `" AND p"` after a prefix with its own `WHERE`, or `""`.
    pub fn to_clause(&self) -> String {
        if self.predicate.is_empty() {
            String::new()
        } else if self.prefix_has_where {
            format!(" AND {}", self.predicate)
        } else {
            format!(" WHERE {}", self.predicate)
        }
    }
}

/// Fold holders into one predicate.
///
/// The first non-empty condition is the base. Each later one is appended with its joiner,
/// parenthesizing the accumulated text unless it already starts with `(`:
/// `[WHERE a=1, OR b=2, AND c=3]` gives `(a=1) OR (b=2) AND (c=3)`. The soft-delete clause
/// is appended last with AND. Composition does not consume the holders, so calling it again
/// yields the same result.
pub fn compose(
    holders: &[WhereHolder],
    soft_delete: Option<&str>,
    raw_prefix: Option<&str>,
    options: NormalizeOptions,
) -> OrmResult<ComposedWhere> {
    let mut predicate = String::new();
    let mut args = Vec::new();

    for holder in holders {
        let fragment = normalize(&holder.condition, &holder.args, options)?;
        if fragment.is_empty() {
            continue;
        }
        if predicate.is_empty() {
            predicate = fragment.sql;
        } else if predicate.starts_with('(') {
            predicate = format!("{} {} ({})", predicate, holder.joiner.keyword(), fragment.sql);
        } else {
            predicate = format!("({}) {} ({})", predicate, holder.joiner.keyword(), fragment.sql);
        }
        args.extend(fragment.args);
    }

    let has_user_predicate = !predicate.is_empty();
    if let Some(clause) = soft_delete.filter(|clause| !clause.is_empty()) {
        predicate = if predicate.is_empty() {
            clause.to_string()
        } else {
            format!("({predicate}) AND {clause}")
        };
        tracing::trace!(target: "dbkit.condition", clause, "soft-delete filter applied");
    }

    Ok(ComposedWhere {
        predicate,
        args,
        has_user_predicate,
        prefix_has_where: raw_prefix.is_some_and(|sql| WHERE_KEYWORD.is_match(sql)),
    })
}

/// Rewrite a primary-key value into a condition.
///
/// With a primary key, a scalar becomes `pk=?` and a list becomes `pk IN(?,?)`. Without
/// one the value is used as condition text.
pub fn primary_key_condition(primary_key: Option<&str>, value: Value) -> Where {
    match primary_key {
        Some(pk) => Where::Map(vec![(pk.to_string(), value)]),
        None => match value {
            Value::Null => Where::Empty,
            Value::Text(sql) => Where::Raw(sql),
            other => Where::Raw(other.to_string()),
        },
    }
}
