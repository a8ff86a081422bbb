//! Convenient imports for typical `dbkit` usage.
//!
//! ```ignore
//! use dbkit::prelude::*;
//! ```

pub use crate::{
    AutoTime, CacheOption, GenericClient, LockMode, OrmError, OrmResult, Record, ResultSet,
    Session, SessionConfig, SoftDelete, ToValue, Value, Where, args, where_map,
};
