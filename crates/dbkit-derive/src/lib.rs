//! Derive macros for dbkit
//!
//! Provides `#[derive(Record)]`.

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod common;
mod record;

/// Derive `Record` for a struct with named fields.
///
/// # Example
///
/// ```ignore
/// use dbkit::Record;
///
/// #[derive(Debug, Default, Record)]
/// #[orm(table = "user")]
/// struct User {
///     #[orm(primary)]
///     id: i64,
///     #[orm(column = "user_name")]
///     name: String,
///     #[orm(flatten)]
///     profile: Option<Box<Profile>>,
///     #[orm(with = "uid=id")]
///     orders: Vec<Order>,
/// }
/// ```
///
/// # Attributes
///
/// - `#[orm(table = "name")]` - Table name, on the struct or on a `TableMeta` field
///   (defaults to the snake_case struct name)
/// - `#[orm(column = "name")]` - Explicit column; takes precedence over `#[serde(rename)]`
/// - `#[orm(primary)]` - Primary key, used by `where_pri`
/// - `#[orm(flatten)]` / `#[serde(flatten)]` - Map the fields of a nested record
///   (`T`, `Box<T>`, `Option<T>` or `Option<Box<T>>`)
/// - `#[orm(skip)]` / `#[serde(skip)]` - Ignore the field
/// - `#[orm(with = "...")]` - Relation loaded elsewhere; never mapped
/// - `#[orm(scan)]` - Convert with the field type's `Scanner` impl
/// - `#[orm(json)]` - Store as JSON through serde
///
/// Trait-object fields are never mapped. The struct must implement `Default`.
#[proc_macro_derive(Record, attributes(orm))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    record::expand(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
