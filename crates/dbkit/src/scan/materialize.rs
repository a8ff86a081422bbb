use super::{ScanPlan, ScanTarget};
use crate::error::{OrmError, OrmResult};
use crate::record::Record;
use crate::row::RowCursor;
use crate::value::Value;
use std::any::{Any, TypeId};

fn check_record<T: Record>(plan: &ScanPlan) -> OrmResult<()> {
    if plan.record().type_id() == TypeId::of::<T>() {
        Ok(())
    } else {
        Err(OrmError::Other(format!(
            "scan plan for `{}` used to materialize `{}`",
            plan.record().type_name(),
            std::any::type_name::<T>()
        )))
    }
}

fn check_columns<C: RowCursor + ?Sized>(plan: &ScanPlan, cursor: &C) -> OrmResult<()> {
    if plan.matches_columns(cursor.columns()) {
        Ok(())
    } else {
        Err(OrmError::decode(
            "*",
            "cursor columns differ from the columns the scan plan was built for",
        ))
    }
}

/// Fill `record` from the row already read into `buffer`.
fn apply_row(plan: &ScanPlan, buffer: &[Value], record: &mut dyn Any) -> OrmResult<()> {
    for (target, value) in plan.targets().iter().zip(buffer) {
        let ScanTarget::Field(index) = *target else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        let mapping = &plan.mappings()[index];
        mapping
            .assign(record, value)
            .map_err(|err| mapping.conversion_error(value, err))?;
    }
    Ok(())
}

/// Row reader that reuses one buffer of raw values across rows.
struct RowReader<'p> {
    plan: &'p ScanPlan,
    buffer: Vec<Value>,
}

impl<'p> RowReader<'p> {
    fn new(plan: &'p ScanPlan) -> Self {
        Self {
            plan,
            buffer: vec![Value::Null; plan.columns().len()],
        }
    }

    fn next<T: Record, C: RowCursor + ?Sized>(&mut self, cursor: &mut C) -> OrmResult<Option<T>> {
        if !cursor.advance()? {
            return Ok(None);
        }
        cursor.read_into(&mut self.buffer)?;
        let mut record = T::default();
        apply_row(self.plan, &self.buffer, &mut record)?;
        Ok(Some(record))
    }
}

/// Consume exactly one row. An empty cursor is [`OrmError::NoRows`].
pub fn materialize_one<T: Record, C: RowCursor + ?Sized>(
    plan: &ScanPlan,
    cursor: &mut C,
) -> OrmResult<T> {
    materialize_opt(plan, cursor)?.ok_or(OrmError::NoRows)
}

/// Consume at most one row.
pub fn materialize_opt<T: Record, C: RowCursor + ?Sized>(
    plan: &ScanPlan,
    cursor: &mut C,
) -> OrmResult<Option<T>> {
    check_record::<T>(plan)?;
    check_columns(plan, cursor)?;
    RowReader::new(plan).next(cursor)
}

/// Consume every row. An empty cursor yields an empty vector.
pub fn materialize_many<T: Record, C: RowCursor + ?Sized>(
    plan: &ScanPlan,
    cursor: &mut C,
) -> OrmResult<Vec<T>> {
    let mut out = Vec::new();
    extend_from(plan, cursor, &mut out)?;
    Ok(out)
}

/// [`materialize_many`] with boxed elements.
pub fn materialize_many_boxed<T: Record, C: RowCursor + ?Sized>(
    plan: &ScanPlan,
    cursor: &mut C,
) -> OrmResult<Vec<Box<T>>> {
    check_record::<T>(plan)?;
    check_columns(plan, cursor)?;
    let mut reader = RowReader::new(plan);
    let mut out = Vec::new();
    while let Some(record) = reader.next::<T, C>(cursor)? {
        out.push(Box::new(record));
    }
    Ok(out)
}

fn extend_from<T: Record, C: RowCursor + ?Sized>(
    plan: &ScanPlan,
    cursor: &mut C,
    out: &mut Vec<T>,
) -> OrmResult<usize> {
    check_record::<T>(plan)?;
    check_columns(plan, cursor)?;
    let mut reader = RowReader::new(plan);
    let start = out.len();
    while let Some(record) = reader.next(cursor)? {
        out.push(record);
    }
    let written = out.len() - start;
    tracing::trace!(target: "dbkit.scan", rows = written, "rows materialized");
    Ok(written)
}

/// A value rows can be scanned into.
///
/// | destination | empty cursor | rows |
/// |---|---|---|
/// | `Vec<T>` | `Ok(0)` | appends every row |
/// | `Option<T>` | `Ok(0)`, set to `None` | first row |
/// | `Box<T>` | `Err(NoRows)`, untouched | first row |
pub trait ScanDestination {
    type Record: Record;

    /// Materialize rows into `self`, returning how many were written.
    fn fill<C: RowCursor + ?Sized>(&mut self, plan: &ScanPlan, cursor: &mut C)
    -> OrmResult<usize>;
}

impl<T: Record> ScanDestination for Vec<T> {
    type Record = T;

    fn fill<C: RowCursor + ?Sized>(
        &mut self,
        plan: &ScanPlan,
        cursor: &mut C,
    ) -> OrmResult<usize> {
        extend_from(plan, cursor, self)
    }
}

impl<T: Record> ScanDestination for Option<T> {
    type Record = T;

    fn fill<C: RowCursor + ?Sized>(
        &mut self,
        plan: &ScanPlan,
        cursor: &mut C,
    ) -> OrmResult<usize> {
        *self = materialize_opt(plan, cursor)?;
        Ok(usize::from(self.is_some()))
    }
}

impl<T: Record> ScanDestination for Box<T> {
    type Record = T;

    fn fill<C: RowCursor + ?Sized>(
        &mut self,
        plan: &ScanPlan,
        cursor: &mut C,
    ) -> OrmResult<usize> {
        **self = materialize_one(plan, cursor)?;
        Ok(1)
    }
}
