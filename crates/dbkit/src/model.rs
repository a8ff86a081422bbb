//! Statement builder.
//!
//! A [`Model`] accumulates table, fields, conditions and modifiers, then renders one
//! [`Statement`] per verb. Rendering does not consume the model's conditions, so the same
//! model can produce a page of rows and the matching count:
//!
//! ```ignore
//! let model = session
//!     .model("user")
//!     .where_("status", args!["active"])
//!     .or_where("%s > ?", args!["score", 90])
//!     .order_by("id DESC")
//!     .page(2, 20);
//!
//! let rows = model.select_statement()?;
//! let total = model.count_statement()?;
//! ```

use crate::auto_time::AutoTime;
use crate::cache::CacheOption;
use crate::condition::{
    ComposedWhere, Fragment, Joiner, NormalizeOptions, Where, WhereHolder, compose,
    expand_lists, normalize, primary_key_condition,
};
use crate::error::{OrmError, OrmResult};
use crate::placeholder::Placeholder;
use crate::record::Record;
use crate::session::Session;
use crate::soft_delete::SoftDelete;
use crate::value::{ToValue, Value};

/// Statement verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Count,
    Insert,
    Update,
    /// A delete. With soft delete enabled the SQL is an `UPDATE`.
    Delete,
    Raw,
}

/// A rendered statement with `?` placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    pub sql: String,
    pub args: Vec<Value>,
    pub cache: Option<CacheOption>,
}

impl Statement {
    pub fn new(kind: StatementKind, sql: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            kind,
            sql: sql.into(),
            args,
            cache: None,
        }
    }

    /// Whether the statement returns rows.
    pub fn is_query(&self) -> bool {
        matches!(
            self.kind,
            StatementKind::Select | StatementKind::Count | StatementKind::Raw
        )
    }
}

/// Row locking for selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// `FOR UPDATE`
    Update,
    /// `FOR SHARE` (PostgreSQL) or `LOCK IN SHARE MODE`
    Share,
}

impl LockMode {
    fn clause(self, placeholder: Placeholder) -> &'static str {
        match (self, placeholder) {
            (LockMode::Update, _) => " FOR UPDATE",
            (LockMode::Share, Placeholder::Dollar) => " FOR SHARE",
            (LockMode::Share, Placeholder::Question) => " LOCK IN SHARE MODE",
        }
    }
}

#[derive(Debug, Clone)]
enum Source {
    Table(String),
    Raw { sql: String, args: Vec<Value> },
}

/// Column helpers joined with AND and with OR, one pair per operator template.
macro_rules! column_conditions {
    ($($(#[$doc:meta])* $and:ident, $or:ident => $template:literal;)+) => {
        $(
            $(#[$doc])*
            pub fn $and(self, column: &str, value: impl ToValue) -> Self {
                let condition = format!($template, column);
                self.push_condition(Joiner::Where, condition, vec![value.to_value()])
            }

            pub fn $or(self, column: &str, value: impl ToValue) -> Self {
                let condition = format!($template, column);
                self.push_condition(Joiner::Or, condition, vec![value.to_value()])
            }
        )+
    };
}

/// Statement builder bound to a [`Session`].
#[derive(Debug)]
pub struct Model<'s> {
    session: &'s Session,
    source: Source,
    fields: Vec<String>,
    holders: Vec<WhereHolder>,
    group_by: Option<String>,
    having: Option<(Where, Vec<Value>)>,
    order_by: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
    lock: Option<LockMode>,
    unscoped: bool,
    omit_empty: bool,
    data: Vec<(String, Value)>,
    allow_all: bool,
    primary_key: Option<String>,
    cache: Option<CacheOption>,
    /// Record type selected by `fields_of` that maps no columns.
    mapping_error: Option<String>,
}

impl<'s> Model<'s> {
    fn with_source(session: &'s Session, source: Source) -> Self {
        Self {
            session,
            source,
            fields: Vec::new(),
            holders: Vec::new(),
            group_by: None,
            having: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
            lock: None,
            unscoped: false,
            omit_empty: session.config().omit_empty,
            data: Vec::new(),
            allow_all: false,
            primary_key: None,
            cache: None,
            mapping_error: None,
        }
    }

    pub(crate) fn table(session: &'s Session, table: impl Into<String>) -> Self {
        Self::with_source(session, Source::Table(table.into()))
    }

    pub(crate) fn raw(session: &'s Session, sql: impl Into<String>, args: Vec<Value>) -> Self {
        Self::with_source(
            session,
            Source::Raw {
                sql: sql.into(),
                args,
            },
        )
    }

    pub fn session(&self) -> &'s Session {
        self.session
    }

    /// Table name, `None` for raw models.
    pub fn table_name(&self) -> Option<&str> {
        match &self.source {
            Source::Table(table) => Some(table),
            Source::Raw { .. } => None,
        }
    }

    // ==================== Fields ====================

    /// Select these columns (comma separated, expressions allowed).
    pub fn fields(mut self, fields: &str) -> Self {
        self.fields.extend(
            fields
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(str::to_string),
        );
        self
    }

    /// Select the columns `T` maps to.
    ///
    /// A record without mappable fields makes rendering fail with `MappingEmpty`.
    pub fn fields_of<T: Record>(mut self) -> Self {
        let descriptor = T::descriptor();
        let columns = descriptor.column_names();
        if columns.is_empty() {
            self.mapping_error
                .get_or_insert_with(|| descriptor.type_name().to_string());
        }
        self.fields.extend(columns.into_iter().map(str::to_string));
        self
    }

    // ==================== Conditions ====================

    fn push_condition(
        mut self,
        joiner: Joiner,
        condition: impl Into<Where>,
        args: Vec<Value>,
    ) -> Self {
        self.holders.push(WhereHolder::new(joiner, condition, args));
        self
    }

    /// Add a condition. Later `where_` calls are joined with AND.
    pub fn where_(self, condition: impl Into<Where>, args: Vec<Value>) -> Self {
        self.push_condition(Joiner::Where, condition, args)
    }

    pub fn and_where(self, condition: impl Into<Where>, args: Vec<Value>) -> Self {
        self.push_condition(Joiner::And, condition, args)
    }

    pub fn or_where(self, condition: impl Into<Where>, args: Vec<Value>) -> Self {
        self.push_condition(Joiner::Or, condition, args)
    }

    /// Filter by primary key: a scalar gives `pk=?`, a list gives `pk IN(...)`.
    pub fn where_pri(self, value: impl ToValue) -> Self {
        let condition = primary_key_condition(self.primary_key_column(), value.to_value());
        self.push_condition(Joiner::Where, condition, Vec::new())
    }

    column_conditions! {
        /// `column < ?`
        where_lt, where_or_lt => "{} < ?";
        /// `column <= ?`
        where_lte, where_or_lte => "{} <= ?";
        /// `column > ?`
        where_gt, where_or_gt => "{} > ?";
        /// `column >= ?`
        where_gte, where_or_gte => "{} >= ?";
        /// `column != ?`
        where_not, where_or_not => "{} != ?";
        where_like, where_or_like => "{} LIKE ?";
        where_not_like, where_or_not_like => "{} NOT LIKE ?";
        /// `column IN(?,?,...)`. An empty list matches nothing.
        where_in, where_or_in => "{} IN(?)";
        where_not_in, where_or_not_in => "{} NOT IN(?)";
    }

    fn push_range(
        self,
        joiner: Joiner,
        template: &str,
        column: &str,
        min: impl ToValue,
        max: impl ToValue,
    ) -> Self {
        let condition = template.replacen("{}", column, 1);
        self.push_condition(joiner, condition, vec![min.to_value(), max.to_value()])
    }

    /// `column BETWEEN ? AND ?`
    pub fn where_between(self, column: &str, min: impl ToValue, max: impl ToValue) -> Self {
        self.push_range(Joiner::Where, "{} BETWEEN ? AND ?", column, min, max)
    }

    pub fn where_or_between(self, column: &str, min: impl ToValue, max: impl ToValue) -> Self {
        self.push_range(Joiner::Or, "{} BETWEEN ? AND ?", column, min, max)
    }

    pub fn where_not_between(self, column: &str, min: impl ToValue, max: impl ToValue) -> Self {
        self.push_range(Joiner::Where, "{} NOT BETWEEN ? AND ?", column, min, max)
    }

    pub fn where_or_not_between(
        self,
        column: &str,
        min: impl ToValue,
        max: impl ToValue,
    ) -> Self {
        self.push_range(Joiner::Or, "{} NOT BETWEEN ? AND ?", column, min, max)
    }

    fn push_nulls(mut self, joiner: Joiner, columns: &[&str], suffix: &str) -> Self {
        for column in columns {
            self = self.push_condition(joiner, format!("{column} {suffix}"), Vec::new());
        }
        self
    }

    /// `column IS NULL` for each column.
    pub fn where_null(self, columns: &[&str]) -> Self {
        self.push_nulls(Joiner::Where, columns, "IS NULL")
    }

    pub fn where_or_null(self, columns: &[&str]) -> Self {
        self.push_nulls(Joiner::Or, columns, "IS NULL")
    }

    pub fn where_not_null(self, columns: &[&str]) -> Self {
        self.push_nulls(Joiner::Where, columns, "IS NOT NULL")
    }

    pub fn where_or_not_null(self, columns: &[&str]) -> Self {
        self.push_nulls(Joiner::Or, columns, "IS NOT NULL")
    }

    /// Override the primary key column used by [`where_pri`](Self::where_pri).
    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = Some(column.into());
        self
    }

    fn primary_key_column(&self) -> Option<&str> {
        if let Some(pk) = &self.primary_key {
            return Some(pk);
        }
        let config = self.session.config();
        match &self.source {
            Source::Table(table) => config.primary_key_for(table),
            Source::Raw { .. } => config.default_primary_key.as_deref(),
        }
    }

    // ==================== Modifiers ====================

    pub fn group_by(mut self, group_by: &str) -> Self {
        self.group_by = Some(group_by.to_string());
        self
    }

    pub fn having(mut self, condition: impl Into<Where>, args: Vec<Value>) -> Self {
        self.having = Some((condition.into(), args));
        self
    }

    pub fn order_by(mut self, order_by: &str) -> Self {
        self.order_by.push(order_by.to_string());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// One-based page of `size` rows. Pages below 1 are treated as 1.
    pub fn page(mut self, page: u64, size: u64) -> Self {
        let page = page.max(1);
        self.limit = Some(size);
        self.offset = Some(page.saturating_sub(1).saturating_mul(size));
        self
    }

    pub fn lock(mut self, mode: LockMode) -> Self {
        self.lock = Some(mode);
        self
    }

    /// Ignore the soft-delete and timestamp columns: no filter, deletes are physical and
    /// nothing is stamped.
    pub fn unscoped(mut self) -> Self {
        self.unscoped = true;
        self
    }

    /// Drop empty values from map and record conditions and from data.
    pub fn omit_empty(mut self) -> Self {
        self.omit_empty = true;
        self
    }

    /// Permit UPDATE and DELETE without a condition.
    pub fn allow_all(mut self) -> Self {
        self.allow_all = true;
        self
    }

    /// Cache the select result.
    pub fn cache(mut self, option: CacheOption) -> Self {
        self.cache = Some(option);
        self
    }

    // ==================== Data ====================

    /// Columns and values for INSERT and UPDATE.
    pub fn data<K, V>(mut self, entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: ToValue,
    {
        self.data
            .extend(entries.into_iter().map(|(k, v)| (k.into(), v.to_value())));
        self
    }

    /// Columns and values read from a record.
    pub fn data_record<T: Record>(mut self, record: &T) -> Self {
        self.data.extend(T::descriptor().entries(record));
        self
    }

    // ==================== Rendering ====================

    fn options(&self) -> NormalizeOptions {
        NormalizeOptions {
            omit_empty: self.omit_empty,
        }
    }

    fn check_build(&self) -> OrmResult<()> {
        match &self.mapping_error {
            Some(record) => Err(OrmError::mapping_empty(record.clone())),
            None => Ok(()),
        }
    }

    fn soft_delete(&self) -> Option<&'s SoftDelete> {
        match &self.source {
            Source::Table(table) if !self.unscoped => {
                self.session.config().soft_delete_for(table)
            }
            _ => None,
        }
    }

    fn auto_time(&self) -> Option<&'s AutoTime> {
        match &self.source {
            Source::Table(table) if !self.unscoped => self.session.config().auto_time_for(table),
            _ => None,
        }
    }

    fn soft_delete_clause(&self) -> Option<String> {
        self.soft_delete().map(SoftDelete::filter_clause)
    }

    fn composed(&self) -> OrmResult<ComposedWhere> {
        let soft_delete = self.soft_delete_clause();
        let raw_prefix = match &self.source {
            Source::Raw { sql, .. } => Some(sql.as_str()),
            Source::Table(_) => None,
        };
        compose(
            &self.holders,
            soft_delete.as_deref(),
            raw_prefix,
            self.options(),
        )
    }

    fn require_table(&self, verb: &str) -> OrmResult<&str> {
        match &self.source {
            Source::Table(table) => Ok(table),
            Source::Raw { .. } => Err(OrmError::validation(format!(
                "{verb} needs a table model, not raw SQL"
            ))),
        }
    }

    fn guard(&self, verb: &str, composed: &ComposedWhere) -> OrmResult<()> {
        if composed.has_user_predicate || self.allow_all {
            Ok(())
        } else {
            Err(OrmError::missing_guard(verb))
        }
    }

    fn data_entries(&self, verb: &str) -> OrmResult<Vec<(String, Value)>> {
        let entries: Vec<_> = self
            .data
            .iter()
            .filter(|(_, value)| !(self.omit_empty && value.is_empty()))
            .cloned()
            .collect();
        if entries.is_empty() {
            return Err(OrmError::validation(format!("{verb} has no data")));
        }
        Ok(entries)
    }

    fn field_list(&self) -> String {
        if self.fields.is_empty() {
            "*".to_string()
        } else {
            self.fields.join(",")
        }
    }

    /// `FROM ...` plus the WHERE, GROUP BY and HAVING clauses.
    fn from_clause(&self, sql: &mut String, args: &mut Vec<Value>) -> OrmResult<()> {
        let composed = self.composed()?;
        match &self.source {
            Source::Table(table) => {
                sql.push_str(" FROM ");
                sql.push_str(table);
            }
            Source::Raw { sql: raw, args: raw_args } => {
                let raw = expand_lists(Fragment::new(raw.as_str(), raw_args.clone()));
                sql.push_str(&raw.sql);
                args.extend(raw.args);
            }
        }
        sql.push_str(&composed.to_clause());
        args.extend(composed.args);

        if let Some(group_by) = &self.group_by {
            sql.push_str(" GROUP BY ");
            sql.push_str(group_by);
        }
        if let Some((condition, having_args)) = &self.having {
            let fragment = normalize(condition, having_args, self.options())?;
            if !fragment.is_empty() {
                sql.push_str(" HAVING ");
                sql.push_str(&fragment.sql);
                args.extend(fragment.args);
            }
        }
        Ok(())
    }

    fn finish(&self, statement: Statement) -> OrmResult<Statement> {
        self.session.hooks().run(statement)
    }

    /// Render the SELECT.
    ///
    /// For raw models the accumulated conditions are appended to the raw SQL, with `AND`
    /// when it already has a `WHERE`.
    pub fn select_statement(&self) -> OrmResult<Statement> {
        self.check_build()?;
        let mut sql = String::new();
        let mut args = Vec::new();
        let kind = match &self.source {
            Source::Table(_) => {
                sql.push_str("SELECT ");
                sql.push_str(&self.field_list());
                StatementKind::Select
            }
            Source::Raw { .. } => StatementKind::Raw,
        };
        self.from_clause(&mut sql, &mut args)?;

        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by.join(","));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }
        if let Some(lock) = self.lock {
            sql.push_str(lock.clause(self.session.config().placeholder));
        }

        let mut statement = Statement::new(kind, sql, args);
        statement.cache = self.cache.clone();
        self.finish(statement)
    }

    /// Render a `COUNT` over the same rows the select would return, ignoring paging.
    pub fn count_statement(&self) -> OrmResult<Statement> {
        self.check_build()?;
        let mut inner = String::new();
        let mut args = Vec::new();
        let grouped = self.group_by.is_some() || matches!(self.source, Source::Raw { .. });

        if grouped {
            if let Source::Table(_) = self.source {
                inner.push_str("SELECT ");
                inner.push_str(&self.field_list());
            }
            self.from_clause(&mut inner, &mut args)?;
            let sql = format!("SELECT COUNT(1) FROM ({inner}) AS dbkit_count");
            return self.finish(Statement::new(StatementKind::Count, sql, args));
        }

        let counted = match self.fields.as_slice() {
            [field] if field != "*" => field.as_str(),
            _ => "1",
        };
        let mut sql = format!("SELECT COUNT({counted})");
        self.from_clause(&mut sql, &mut args)?;
        self.finish(Statement::new(StatementKind::Count, sql, args))
    }

    /// Render the INSERT of [`data`](Self::data).
    pub fn insert_statement(&self) -> OrmResult<Statement> {
        self.check_build()?;
        let table = self.require_table("insert")?;
        let mut entries = self.data_entries("insert")?;
        if let Some(auto_time) = self.auto_time() {
            auto_time.stamp_insert(&mut entries);
        }

        let columns: Vec<&str> = entries.iter().map(|(column, _)| column.as_str()).collect();
        let holders = vec!["?"; entries.len()].join(",");
        let sql = format!(
            "INSERT INTO {table}({}) VALUES({holders})",
            columns.join(",")
        );
        let args = entries.into_iter().map(|(_, value)| value).collect();
        self.finish(Statement::new(StatementKind::Insert, sql, args))
    }

    /// Render the UPDATE of [`data`](Self::data). Requires a condition or `allow_all`.
    pub fn update_statement(&self) -> OrmResult<Statement> {
        self.check_build()?;
        let table = self.require_table("update")?;
        let mut entries = self.data_entries("update")?;
        let composed = self.composed()?;
        self.guard("update", &composed)?;
        if let Some(auto_time) = self.auto_time() {
            auto_time.stamp_update(&mut entries);
        }

        let sets: Vec<String> = entries
            .iter()
            .map(|(column, _)| format!("{column}=?"))
            .collect();
        let mut args: Vec<Value> = entries.into_iter().map(|(_, value)| value).collect();
        let sql = format!(
            "UPDATE {table} SET {}{}",
            sets.join(","),
            composed.to_clause()
        );
        args.extend(composed.args);
        self.finish(Statement::new(StatementKind::Update, sql, args))
    }

    /// Render the DELETE. Requires a condition or `allow_all`.
    ///
    /// With soft delete enabled (and not [`unscoped`](Self::unscoped)) this is an
    /// `UPDATE` that marks the matching live rows deleted.
    pub fn delete_statement(&self) -> OrmResult<Statement> {
        self.check_build()?;
        let table = self.require_table("delete")?;
        let composed = self.composed()?;
        self.guard("delete", &composed)?;

        let statement = match self.soft_delete() {
            Some(soft) => {
                let (column, value) = soft.mark_deleted();
                let mut args = vec![value];
                args.extend(composed.args.iter().cloned());
                let sql = format!("UPDATE {table} SET {column}=?{}", composed.to_clause());
                Statement::new(StatementKind::Delete, sql, args)
            }
            None => {
                let sql = format!("DELETE FROM {table}{}", composed.to_clause());
                Statement::new(StatementKind::Delete, sql, composed.args.clone())
            }
        };
        self.finish(statement)
    }
}
