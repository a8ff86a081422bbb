use super::ScanPlan;
use crate::convert::ConversionRegistry;
use crate::error::OrmResult;
use crate::record::RecordDescriptor;
use crate::row::ColumnMeta;
use std::any::TypeId;
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PlanKey {
    record: TypeId,
    fingerprint: u64,
}

fn fingerprint(columns: &[ColumnMeta]) -> u64 {
    let mut hasher = DefaultHasher::new();
    columns.len().hash(&mut hasher);
    for column in columns {
        column.name.hash(&mut hasher);
        column.db_type.hash(&mut hasher);
    }
    hasher.finish()
}

/// Concurrent cache of scan plans keyed by record type and column set.
///
/// Lookups take a read lock only. Plans are built outside any lock; when two callers race
/// on the same key the first insert wins and both receive the same `Arc`. Failed builds
/// are never stored, so a later call with a fixed registry can succeed.
#[derive(Debug, Default)]
pub struct ScanPlanCache {
    plans: RwLock<HashMap<PlanKey, Arc<ScanPlan>>>,
}

impl ScanPlanCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_build(
        &self,
        record: &'static RecordDescriptor,
        columns: &[ColumnMeta],
        registry: &ConversionRegistry,
    ) -> OrmResult<Arc<ScanPlan>> {
        let key = PlanKey {
            record: record.type_id(),
            fingerprint: fingerprint(columns),
        };

        {
            let plans = self.plans.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(plan) = plans.get(&key) {
                if plan.matches_columns(columns) {
                    return Ok(Arc::clone(plan));
                }
                // Fingerprint collision: serve a fresh plan without touching the entry.
                drop(plans);
                tracing::debug!(
                    target: "dbkit.scan",
                    record = record.type_name(),
                    "column fingerprint collision, building uncached plan"
                );
                return ScanPlan::build(record, columns, registry).map(Arc::new);
            }
        }

        let plan = Arc::new(ScanPlan::build(record, columns, registry)?);
        tracing::trace!(
            target: "dbkit.scan",
            record = record.type_name(),
            columns = columns.len(),
            mapped = plan.mappings().len(),
            "scan plan built"
        );

        let mut plans = self.plans.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(plans.entry(key).or_insert(plan)))
    }

    pub fn len(&self) -> usize {
        self.plans.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.plans
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
