//! The entry point: configuration plus the shared registry, plan cache and hooks.

use crate::cache::ResultCache;
use crate::condition::{ComposedWhere, NormalizeOptions, WhereHolder, compose};
use crate::config::SessionConfig;
use crate::convert::ConversionRegistry;
use crate::error::OrmResult;
use crate::hook::{Hook, HookChain};
use crate::model::Model;
use crate::record::Record;
use crate::row::{ColumnMeta, RowCursor};
use crate::scan::{
    ScanDestination, ScanPlan, ScanPlanCache, materialize_many, materialize_many_boxed,
    materialize_one, materialize_opt,
};
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// Configuration, conversion registry, scan-plan cache, hooks and result cache.
///
/// Cloning is cheap and clones share the registry and caches.
///
/// ```ignore
/// let session = Session::with_config(
///     SessionConfig::new().with_soft_delete("user", SoftDelete::timestamp("deleted_at")),
/// )
/// .with_hook(TracingHook::new());
///
/// let users: Vec<User> = session.scan_all(&mut rows.cursor())?;
/// ```
#[derive(Clone)]
pub struct Session {
    config: SessionConfig,
    registry: Arc<ConversionRegistry>,
    plans: Arc<ScanPlanCache>,
    hooks: HookChain,
    result_cache: Option<Arc<dyn ResultCache>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("plans", &self.plans.len())
            .field("hooks", &self.hooks)
            .field("result_cache", &self.result_cache.is_some())
            .finish()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::with_config(SessionConfig::default())
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SessionConfig) -> Self {
        Self {
            config,
            registry: Arc::new(ConversionRegistry::new()),
            plans: Arc::new(ScanPlanCache::new()),
            hooks: HookChain::new(),
            result_cache: None,
        }
    }

    /// Share a conversion registry, e.g. one with custom converters.
    pub fn with_registry(mut self, registry: Arc<ConversionRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Share a scan-plan cache between sessions.
    pub fn with_plan_cache(mut self, plans: Arc<ScanPlanCache>) -> Self {
        self.plans = plans;
        self
    }

    /// Append a statement hook.
    pub fn with_hook<H: Hook + 'static>(mut self, hook: H) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn with_result_cache(mut self, cache: Arc<dyn ResultCache>) -> Self {
        self.result_cache = Some(cache);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn registry(&self) -> &ConversionRegistry {
        &self.registry
    }

    pub fn plan_cache(&self) -> &ScanPlanCache {
        &self.plans
    }

    pub fn hooks(&self) -> &HookChain {
        &self.hooks
    }

    pub fn result_cache(&self) -> Option<&Arc<dyn ResultCache>> {
        self.result_cache.as_ref()
    }

    /// Start a statement on `table`.
    pub fn model(&self, table: impl Into<String>) -> Model<'_> {
        Model::table(self, table)
    }

    /// Start a statement from raw SQL. Conditions added later are appended to it.
    pub fn raw(&self, sql: impl Into<String>, args: Vec<Value>) -> Model<'_> {
        Model::raw(self, sql, args)
    }

    /// Scan plan for `T` over `columns`, cached unless disabled by config.
    pub fn plan<T: Record>(&self, columns: &[ColumnMeta]) -> OrmResult<Arc<ScanPlan>> {
        if self.config.plan_cache {
            self.plans
                .get_or_build(T::descriptor(), columns, &self.registry)
        } else {
            ScanPlan::build(T::descriptor(), columns, &self.registry).map(Arc::new)
        }
    }

    /// Scan rows into `destination`, returning the number of rows written.
    pub fn scan_into<D, C>(&self, destination: &mut D, cursor: &mut C) -> OrmResult<usize>
    where
        D: ScanDestination,
        C: RowCursor + ?Sized,
    {
        let plan = self.plan::<D::Record>(cursor.columns())?;
        destination.fill(&plan, cursor)
    }

    /// Exactly one row; an empty cursor is `NoRows`.
    pub fn scan_one<T: Record, C: RowCursor + ?Sized>(&self, cursor: &mut C) -> OrmResult<T> {
        let plan = self.plan::<T>(cursor.columns())?;
        materialize_one(&plan, cursor)
    }

    /// At most one row.
    pub fn scan_opt<T: Record, C: RowCursor + ?Sized>(
        &self,
        cursor: &mut C,
    ) -> OrmResult<Option<T>> {
        let plan = self.plan::<T>(cursor.columns())?;
        materialize_opt(&plan, cursor)
    }

    /// Every row; an empty cursor gives an empty vector.
    pub fn scan_all<T: Record, C: RowCursor + ?Sized>(&self, cursor: &mut C) -> OrmResult<Vec<T>> {
        let plan = self.plan::<T>(cursor.columns())?;
        materialize_many(&plan, cursor)
    }

    pub fn scan_all_boxed<T: Record, C: RowCursor + ?Sized>(
        &self,
        cursor: &mut C,
    ) -> OrmResult<Vec<Box<T>>> {
        let plan = self.plan::<T>(cursor.columns())?;
        materialize_many_boxed(&plan, cursor)
    }

    /// Compose `holders` into a predicate, with the soft-delete filter of `table` if it
    /// has one.
    ///
    /// Pure: the same holders always give the same predicate and arguments.
    pub fn build_condition(
        &self,
        table: &str,
        holders: &[WhereHolder],
    ) -> OrmResult<ComposedWhere> {
        let soft_delete = self.config.soft_delete_for(table).map(|s| s.filter_clause());
        compose(
            holders,
            soft_delete.as_deref(),
            None,
            NormalizeOptions {
                omit_empty: self.config.omit_empty,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;
    use crate::condition::Joiner;
    use crate::soft_delete::SoftDelete;

    #[test]
    fn test_build_condition_uses_the_table_soft_delete() {
        let session = Session::with_config(
            SessionConfig::new().with_soft_delete("user", SoftDelete::timestamp("deleted_at")),
        );
        let holders = vec![WhereHolder::new(Joiner::Where, "id", args![1])];

        let composed = session.build_condition("user", &holders).unwrap();
        assert_eq!(composed.predicate, "(id=?) AND deleted_at IS NULL");
        assert_eq!(composed.args, args![1]);
        assert_eq!(session.build_condition("user", &holders).unwrap(), composed);

        let composed = session.build_condition("audit_log", &holders).unwrap();
        assert_eq!(composed.predicate, "id=?");
    }
}
