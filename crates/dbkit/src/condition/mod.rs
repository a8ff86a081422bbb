//! WHERE condition building.
//!
//! A [`Where`] is one caller-supplied condition in any of the accepted shapes. The
//! [`normalize`] step turns one condition plus its positional arguments into a
//! [`Fragment`]: SQL with `?` placeholders and the matching argument list. The
//! [`compose`] step folds a chain of [`WhereHolder`]s, joined by AND/OR, into the final
//! predicate and injects the soft-delete filter.
//!
//! ```ignore
//! use dbkit::{Where, where_map};
//!
//! Where::from("status = ? AND age > ?");        // template, args supplied separately
//! Where::from("%s < ? AND %s > ?");             // leading args fill %s, the rest bind
//! where_map! { "status" => "active", "age >=" => 18, "id" => vec![1, 2, 3] };
//! Where::record(&filter);                       // tagged record fields as key/values
//! ```

mod compose;
mod normalize;

pub use compose::{ComposedWhere, Joiner, WhereHolder, compose, primary_key_condition};
pub use normalize::normalize;
pub(crate) use normalize::expand_lists;

use crate::record::Record;
use crate::value::{ToValue, Value};
use std::collections::{BTreeMap, HashMap};

/// A condition in one of the accepted shapes.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Where {
    /// No condition.
    #[default]
    Empty,
    /// SQL text with `?` placeholders and optional `%s`/`%d`/`%v` template directives.
    Raw(String),
    /// Ordered `"column [operator]" => value` entries, joined by AND.
    Map(Vec<(String, Value)>),
    /// Independent conditions consuming positional arguments in order, joined by AND.
    Seq(Vec<Where>),
    /// Field entries read from a record instance.
    Record {
        type_name: &'static str,
        entries: Vec<(String, Value)>,
    },
}

impl Where {
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::Raw(sql.into())
    }

    /// Key/value entries, in iteration order.
    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToValue,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.to_value()))
                .collect(),
        )
    }

    /// Entries from a record's mappable fields, using the same tags as scanning.
    pub fn record<T: Record>(record: &T) -> Self {
        let descriptor = T::descriptor();
        Self::Record {
            type_name: descriptor.type_name(),
            entries: descriptor.entries(record),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Where::Empty => true,
            Where::Raw(sql) => sql.trim().is_empty(),
            Where::Map(entries) | Where::Record { entries, .. } => entries.is_empty(),
            Where::Seq(items) => items.iter().all(Where::is_empty),
        }
    }
}

impl From<&str> for Where {
    fn from(sql: &str) -> Self {
        Self::Raw(sql.to_string())
    }
}

impl From<String> for Where {
    fn from(sql: String) -> Self {
        Self::Raw(sql)
    }
}

impl From<Vec<Where>> for Where {
    fn from(items: Vec<Where>) -> Self {
        Self::Seq(items)
    }
}

impl<K: Into<String>, V: ToValue> From<Vec<(K, V)>> for Where {
    fn from(entries: Vec<(K, V)>) -> Self {
        Self::map(entries)
    }
}

impl<K: Into<String>, V: ToValue> From<BTreeMap<K, V>> for Where {
    fn from(entries: BTreeMap<K, V>) -> Self {
        Self::map(entries)
    }
}

/// Hash maps have no order; entries are sorted by key so the SQL is stable.
impl<K: Into<String>, V: ToValue, S> From<HashMap<K, V, S>> for Where {
    fn from(entries: HashMap<K, V, S>) -> Self {
        let mut entries: Vec<(String, Value)> = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.to_value()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Self::Map(entries)
    }
}

/// Normalized SQL with `?` placeholders and one argument per placeholder.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Fragment {
    pub sql: String,
    pub args: Vec<Value>,
}

impl Fragment {
    pub fn new(sql: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            args,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }
}

/// Options applied while normalizing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// Drop key/value entries whose value is empty (null, zero, `""`, `false`, `[]`).
    pub omit_empty: bool,
}
