//! Creation and update timestamp columns.

use crate::value::Value;
use chrono::Utc;
use serde::Deserialize;

/// Value written to a timestamp column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampKind {
    /// `timestamptz`, written as `Utc::now()`.
    #[default]
    DateTimeUtc,
    /// `timestamp` without zone, written as UTC wall time.
    NaiveDateTime,
    /// Integer unix seconds.
    UnixSeconds,
}

impl TimestampKind {
    pub fn now(self) -> Value {
        let now = Utc::now();
        match self {
            TimestampKind::DateTimeUtc => Value::TimestampTz(now),
            TimestampKind::NaiveDateTime => Value::Timestamp(now.naive_utc()),
            TimestampKind::UnixSeconds => Value::Int(now.timestamp()),
        }
    }
}

/// Columns stamped on INSERT and UPDATE.
///
/// An insert fills `created` and `updated`, an update fills `updated`. A column the
/// caller already set to a non-null value is left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AutoTime {
    pub created: Option<String>,
    pub updated: Option<String>,
    pub kind: TimestampKind,
}

impl AutoTime {
    pub fn new(created: impl Into<String>, updated: impl Into<String>) -> Self {
        Self {
            created: Some(created.into()),
            updated: Some(updated.into()),
            kind: TimestampKind::default(),
        }
    }

    pub fn with_kind(mut self, kind: TimestampKind) -> Self {
        self.kind = kind;
        self
    }

    pub(crate) fn stamp_insert(&self, data: &mut Vec<(String, Value)>) {
        let now = self.kind.now();
        for column in [&self.created, &self.updated].into_iter().flatten() {
            stamp(data, column, &now);
        }
    }

    pub(crate) fn stamp_update(&self, data: &mut Vec<(String, Value)>) {
        if let Some(column) = &self.updated {
            stamp(data, column, &self.kind.now());
        }
    }
}

fn stamp(data: &mut Vec<(String, Value)>, column: &str, now: &Value) {
    match data.iter_mut().find(|(name, _)| name == column) {
        Some((_, value)) if value.is_null() => *value = now.clone(),
        Some(_) => {}
        None => data.push((column.to_string(), now.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_fills_missing_and_null_columns() {
        let mut data = vec![
            ("name".to_string(), Value::Text("ann".into())),
            ("updated_at".to_string(), Value::Null),
        ];
        AutoTime::new("created_at", "updated_at").stamp_insert(&mut data);

        let columns: Vec<_> = data.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(columns, vec!["name", "updated_at", "created_at"]);
        assert!(matches!(data[1].1, Value::TimestampTz(_)));
        assert!(matches!(data[2].1, Value::TimestampTz(_)));
    }

    #[test]
    fn test_explicit_values_are_kept() {
        let mut data = vec![("updated_at".to_string(), Value::Int(5))];
        AutoTime::new("created_at", "updated_at")
            .with_kind(TimestampKind::UnixSeconds)
            .stamp_update(&mut data);
        assert_eq!(data, vec![("updated_at".to_string(), Value::Int(5))]);
    }

    #[test]
    fn test_update_only_touches_updated_column() {
        let mut data = vec![("name".to_string(), Value::Text("bob".into()))];
        AutoTime::new("created_at", "updated_at")
            .with_kind(TimestampKind::NaiveDateTime)
            .stamp_update(&mut data);
        assert_eq!(data.len(), 2);
        assert_eq!(data[1].0, "updated_at");
        assert!(matches!(data[1].1, Value::Timestamp(_)));

        let mut data = Vec::new();
        AutoTime::default().stamp_insert(&mut data);
        assert!(data.is_empty());
    }
}
