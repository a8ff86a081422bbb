//! # dbkit
//!
//! Record mapping and condition building for relational databases.
//!
//! ## Features
//!
//! - **Row → struct scanning**: columns are matched to fields by tag, exact name, then a
//!   case- and underscore-insensitive name, through flattened embedded records of any depth
//! - **Cached scan plans**: the column → field mapping is computed once per record type and
//!   result shape, and shared across threads
//! - **Conversion registry**: driver values are converted per (field type, column type),
//!   and custom types plug in with a closure or the [`Scanner`] trait
//! - **Flexible conditions**: raw fragments, key/value maps, positional pairs and records
//!   all normalize into one `WHERE` clause with bind arguments
//! - **Soft delete**: filters and delete-to-update rewriting from one config entry
//! - **Safe defaults**: UPDATE and DELETE require a WHERE clause unless told otherwise
//! - **Hooks**: observe, rewrite or abort every statement before it runs
//!
//! ## Scanning
//!
//! ```ignore
//! use dbkit::{Record, Session};
//!
//! #[derive(Debug, Default, Record)]
//! struct User {
//!     #[orm(primary)]
//!     id: i64,
//!     #[orm(column = "user_name")]
//!     name: String,
//!     #[orm(flatten)]
//!     profile: Option<Profile>,
//! }
//!
//! let session = Session::new();
//! let users: Vec<User> = session.scan_all(&mut rows.cursor())?;
//! ```
//!
//! ## Statements
//!
//! ```ignore
//! use dbkit::{AutoTime, Session, SessionConfig, SoftDelete, args};
//!
//! let session = Session::with_config(
//!     SessionConfig::new()
//!         .with_soft_delete("user", SoftDelete::timestamp("deleted_at"))
//!         .with_auto_time("user", AutoTime::new("created_at", "updated_at")),
//! );
//!
//! let users: Vec<User> = session
//!     .model("user")
//!     .where_("status", args!["active"])
//!     .or_where("%s > ?", args!["score", 90])
//!     .order_by("id DESC")
//!     .page(1, 20)
//!     .all(&client)
//!     .await?;
//!
//! // UPDATE user SET deleted_at=$1 WHERE (id=$2) AND deleted_at IS NULL
//! session.model("user").where_pri(7).delete(&client).await?;
//! ```

extern crate self as dbkit;

pub mod auto_time;
pub mod cache;
pub mod client;
pub mod condition;
pub mod config;
pub mod convert;
pub mod error;
pub mod hook;
pub mod model;
#[cfg(feature = "postgres")]
pub mod pg;
pub mod placeholder;
pub mod prelude;
pub mod record;
pub mod row;
pub mod scan;
pub mod session;
pub mod soft_delete;
pub mod value;

pub use auto_time::{AutoTime, TimestampKind};
pub use cache::{CacheOption, MemoryResultCache, ResultCache};
pub use client::GenericClient;
pub use condition::{ComposedWhere, Joiner, NormalizeOptions, Where, WhereHolder};
pub use config::SessionConfig;
pub use convert::{ConversionRegistry, ConvertError, ConvertFn};
pub use error::{OrmError, OrmResult};
pub use hook::{Hook, HookChain, Next, TracingHook};
pub use model::{LockMode, Model, Statement, StatementKind};
pub use placeholder::Placeholder;
pub use record::{FieldDescriptor, FieldKind, Record, RecordDescriptor, Scanner, TableMeta};
pub use row::{ColumnMeta, ResultSet, RowCursor};
pub use scan::{ScanDestination, ScanPlan, ScanPlanCache};
pub use session::Session;
pub use soft_delete::{SoftDelete, SoftDeleteKind};
pub use value::{ToValue, Value};

#[cfg(feature = "derive")]
pub use dbkit_derive::Record;
