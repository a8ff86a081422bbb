//! Struct-relational mapping: scan plans and row materialization.
//!
//! A [`ScanPlan`] records, once per record type and column set, which column feeds which
//! field and how its value is converted. [`ScanPlanCache`] keeps plans for reuse, and the
//! materializer functions apply a plan to every row of a [`RowCursor`](crate::RowCursor).
//!
//! ```ignore
//! let plan = cache.get_or_build(User::descriptor(), rows.columns(), &registry)?;
//! let users: Vec<User> = materialize_many(&plan, &mut rows.cursor())?;
//! ```

mod cache;
mod materialize;
mod plan;

pub use cache::ScanPlanCache;
pub use materialize::{
    ScanDestination, materialize_many, materialize_many_boxed, materialize_one, materialize_opt,
};
pub use plan::{FieldMapping, ScanPlan, ScanTarget};
