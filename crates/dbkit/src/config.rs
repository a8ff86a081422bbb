use crate::auto_time::AutoTime;
use crate::placeholder::Placeholder;
use crate::soft_delete::SoftDelete;
use serde::Deserialize;
use std::collections::HashMap;

/// Configuration for a [`Session`](crate::Session).
///
/// Every field has a default, so a partial document deserializes:
///
/// ```ignore
/// let config: SessionConfig = serde_json::from_str(r#"{
///     "soft_deletes": { "user": { "column": "deleted_at" } },
///     "default_auto_time": { "created": "created_at", "updated": "updated_at" },
///     "default_primary_key": "id"
/// }"#)?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Reuse scan plans across queries. Default `true`.
    pub plan_cache: bool,
    /// Soft-delete column per table.
    pub soft_deletes: HashMap<String, SoftDelete>,
    /// Soft-delete column for tables not listed in `soft_deletes`. Only set this when
    /// every table has the column.
    pub default_soft_delete: Option<SoftDelete>,
    /// Creation and update timestamp columns per table.
    pub auto_times: HashMap<String, AutoTime>,
    /// Timestamp columns for tables not listed in `auto_times`.
    pub default_auto_time: Option<AutoTime>,
    /// Primary key column per table, used by `where_pri`.
    pub primary_keys: HashMap<String, String>,
    /// Primary key column for tables not listed in `primary_keys`.
    pub default_primary_key: Option<String>,
    /// Placeholder syntax the driver expects.
    pub placeholder: Placeholder,
    /// Drop empty values from map and record conditions.
    pub omit_empty: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            plan_cache: true,
            soft_deletes: HashMap::new(),
            default_soft_delete: None,
            auto_times: HashMap::new(),
            default_auto_time: None,
            primary_keys: HashMap::new(),
            default_primary_key: None,
            placeholder: Placeholder::Question,
            omit_empty: false,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plan_cache(mut self, enabled: bool) -> Self {
        self.plan_cache = enabled;
        self
    }

    /// Enable soft delete for one table.
    pub fn with_soft_delete(mut self, table: impl Into<String>, soft_delete: SoftDelete) -> Self {
        self.soft_deletes.insert(table.into(), soft_delete);
        self
    }

    pub fn with_default_soft_delete(mut self, soft_delete: SoftDelete) -> Self {
        self.default_soft_delete = Some(soft_delete);
        self
    }

    /// Maintain creation and update timestamps for one table.
    pub fn with_auto_time(mut self, table: impl Into<String>, auto_time: AutoTime) -> Self {
        self.auto_times.insert(table.into(), auto_time);
        self
    }

    pub fn with_default_auto_time(mut self, auto_time: AutoTime) -> Self {
        self.default_auto_time = Some(auto_time);
        self
    }

    /// Set the primary key column for one table.
    pub fn with_primary_key(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.primary_keys.insert(table.into(), column.into());
        self
    }

    pub fn with_default_primary_key(mut self, column: impl Into<String>) -> Self {
        self.default_primary_key = Some(column.into());
        self
    }

    pub fn with_placeholder(mut self, placeholder: Placeholder) -> Self {
        self.placeholder = placeholder;
        self
    }

    pub fn with_omit_empty(mut self, omit_empty: bool) -> Self {
        self.omit_empty = omit_empty;
        self
    }

    /// The primary key column for `table`: its own entry, else the default.
    pub fn primary_key_for(&self, table: &str) -> Option<&str> {
        self.primary_keys
            .get(table)
            .or(self.default_primary_key.as_ref())
            .map(String::as_str)
    }

    /// The soft-delete column of `table`, if it has one.
    pub fn soft_delete_for(&self, table: &str) -> Option<&SoftDelete> {
        self.soft_deletes
            .get(table)
            .or(self.default_soft_delete.as_ref())
    }

    pub fn auto_time_for(&self, table: &str) -> Option<&AutoTime> {
        self.auto_times.get(table).or(self.default_auto_time.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soft_delete::SoftDeleteKind;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::new();
        assert!(config.plan_cache);
        assert!(config.soft_delete_for("user").is_none());
        assert!(config.auto_time_for("user").is_none());
        assert_eq!(config.placeholder, Placeholder::Question);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: SessionConfig = serde_json::from_str(
            r#"{
                "soft_deletes": { "user": { "column": "is_deleted", "kind": "flag" } },
                "default_auto_time": { "created": "created_at" },
                "primary_keys": { "user": "uid" },
                "default_primary_key": "id",
                "placeholder": "dollar"
            }"#,
        )
        .unwrap();

        assert!(config.plan_cache);
        assert_eq!(
            config.soft_delete_for("user"),
            Some(&SoftDelete::new("is_deleted", SoftDeleteKind::Flag))
        );
        assert_eq!(config.soft_delete_for("audit_log"), None);
        let auto_time = config.auto_time_for("order").unwrap();
        assert_eq!(auto_time.created.as_deref(), Some("created_at"));
        assert_eq!(auto_time.updated, None);
        assert_eq!(config.placeholder, Placeholder::Dollar);
        assert_eq!(config.primary_key_for("user"), Some("uid"));
        assert_eq!(config.primary_key_for("order"), Some("id"));
    }

    #[test]
    fn test_builder() {
        let config = SessionConfig::new()
            .with_plan_cache(false)
            .with_primary_key("user", "uid")
            .with_omit_empty(true);
        assert!(!config.plan_cache);
        assert!(config.omit_empty);
        assert_eq!(config.primary_key_for("user"), Some("uid"));
        assert_eq!(config.primary_key_for("order"), None);
    }

    #[test]
    fn test_soft_delete_per_table_with_default() {
        let config = SessionConfig::new()
            .with_soft_delete("user", SoftDelete::new("is_deleted", SoftDeleteKind::Flag))
            .with_auto_time("user", AutoTime::new("created_at", "updated_at"));
        assert_eq!(config.soft_delete_for("user").unwrap().column, "is_deleted");
        assert!(config.soft_delete_for("audit_log").is_none());
        assert!(config.auto_time_for("audit_log").is_none());

        let config = config.with_default_soft_delete(SoftDelete::timestamp("deleted_at"));
        assert_eq!(config.soft_delete_for("user").unwrap().column, "is_deleted");
        assert_eq!(config.soft_delete_for("audit_log").unwrap().column, "deleted_at");
    }
}
