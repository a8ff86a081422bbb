//! Soft-delete column handling.

use crate::value::Value;
use chrono::Utc;
use serde::Deserialize;

/// How a soft-delete column marks a row as deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoftDeleteKind {
    /// Nullable timestamp; set to the deletion time.
    #[default]
    Timestamp,
    /// Integer flag; `0` is live, `1` is deleted.
    Flag,
    /// Integer unix seconds; `0` is live.
    UnixSeconds,
}

/// A soft-delete column.
///
/// Reads and updates get [`filter_clause`](Self::filter_clause) appended to their
/// predicate. Deletes become updates that [`mark_deleted`](Self::mark_deleted).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SoftDelete {
    pub column: String,
    #[serde(default)]
    pub kind: SoftDeleteKind,
}

impl SoftDelete {
    pub fn new(column: impl Into<String>, kind: SoftDeleteKind) -> Self {
        Self {
            column: column.into(),
            kind,
        }
    }

    /// `deleted_at` as a nullable timestamp.
    pub fn timestamp(column: impl Into<String>) -> Self {
        Self::new(column, SoftDeleteKind::Timestamp)
    }

    /// Predicate matching rows that are not deleted.
    pub fn filter_clause(&self) -> String {
        match self.kind {
            SoftDeleteKind::Timestamp => format!("{} IS NULL", self.column),
            SoftDeleteKind::Flag | SoftDeleteKind::UnixSeconds => format!("{}=0", self.column),
        }
    }

    /// Column and value written by a soft delete.
    pub fn mark_deleted(&self) -> (String, Value) {
        let now = Utc::now();
        let value = match self.kind {
            SoftDeleteKind::Timestamp => Value::TimestampTz(now),
            SoftDeleteKind::Flag => Value::Int(1),
            SoftDeleteKind::UnixSeconds => Value::Int(now.timestamp()),
        };
        (self.column.clone(), value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_clause() {
        assert_eq!(SoftDelete::timestamp("deleted_at").filter_clause(), "deleted_at IS NULL");
        assert_eq!(
            SoftDelete::new("is_deleted", SoftDeleteKind::Flag).filter_clause(),
            "is_deleted=0"
        );
    }

    #[test]
    fn test_mark_deleted() {
        let (column, value) = SoftDelete::new("is_deleted", SoftDeleteKind::Flag).mark_deleted();
        assert_eq!(column, "is_deleted");
        assert_eq!(value, Value::Int(1));

        let (_, value) = SoftDelete::timestamp("deleted_at").mark_deleted();
        assert!(matches!(value, Value::TimestampTz(_)));

        let (_, value) = SoftDelete::new("deleted", SoftDeleteKind::UnixSeconds).mark_deleted();
        assert!(matches!(value, Value::Int(n) if n > 0));
    }
}
