//! Field-descriptor arena for records.
//!
//! `#[derive(Record)]` builds one [`RecordDescriptor`] per struct the first time it is asked
//! for. Descriptors carry field names, tags, type identities and plain `fn` accessors, so
//! scan planning and condition building walk data, not live type information, and the
//! per-row path only follows accessor chains.
//!
//! ```ignore
//! use dbkit::Record;
//!
//! #[derive(Debug, Default, Record)]
//! #[orm(table = "user")]
//! struct User {
//!     id: i64,
//!     #[orm(column = "user_name")]
//!     name: String,
//!     #[orm(flatten)]
//!     profile: Option<Box<Profile>>,
//! }
//! ```

use crate::convert::ConvertError;
use crate::value::{ToValue, Value};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::any::{Any, TypeId, type_name};

/// Borrow a field (or embedded record) out of its parent.
pub type GetFn = fn(&dyn Any) -> Option<&dyn Any>;

/// Mutably borrow a field out of its parent, allocating optional levels on the way.
pub type GetMutFn = fn(&mut dyn Any) -> Option<&mut dyn Any>;

/// Field-owned conversion from a driver value.
pub type ScanFn = fn(&Value, &mut dyn Any) -> Result<(), ConvertError>;

/// Read a field as a bind argument.
pub type ToValueFn = fn(&dyn Any) -> Option<Value>;

/// A struct that can be scanned from rows and used as a condition.
pub trait Record: Any + Default {
    fn descriptor() -> &'static RecordDescriptor;
}

/// A field type that converts driver values into itself.
///
/// Fields marked `#[orm(scan)]` use this instead of the conversion registry.
pub trait Scanner {
    fn scan(&mut self, value: &Value) -> Result<(), ConvertError>;
}

/// Metadata-only marker field. Never mapped to a column.
///
/// ```ignore
/// #[derive(Default, Record)]
/// struct User {
///     #[orm(table = "user")]
///     meta: TableMeta,
///     id: i64,
/// }
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableMeta;

/// Static description of one record type.
#[derive(Debug)]
pub struct RecordDescriptor {
    type_name: &'static str,
    type_id: TypeId,
    table: Option<&'static str>,
    fields: Vec<FieldDescriptor>,
}

impl RecordDescriptor {
    pub fn new<T: 'static>(fields: Vec<FieldDescriptor>) -> Self {
        Self {
            type_name: type_name::<T>(),
            type_id: TypeId::of::<T>(),
            table: None,
            fields,
        }
    }

    pub fn with_table(mut self, table: &'static str) -> Self {
        self.table = Some(table);
        self
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn table(&self) -> Option<&'static str> {
        self.table
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Column names of every mappable field, embedded records flattened, in declaration order.
    pub fn column_names(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns(&self, out: &mut Vec<&'static str>) {
        for field in &self.fields {
            match field.kind {
                FieldKind::Value { .. } => out.push(field.column_name()),
                FieldKind::Embedded { descriptor, .. } => descriptor().collect_columns(out),
                FieldKind::Relation | FieldKind::Meta | FieldKind::Opaque => {}
            }
        }
    }

    /// `(column, value)` pairs read from a record instance.
    ///
    /// Embedded records are flattened; an absent optional embedded record contributes
    /// nothing.
    pub fn entries(&self, record: &dyn Any) -> Vec<(String, Value)> {
        let mut out = Vec::new();
        self.collect_entries(record, &mut out);
        out
    }

    fn collect_entries(&self, record: &dyn Any, out: &mut Vec<(String, Value)>) {
        for field in &self.fields {
            match field.kind {
                FieldKind::Value { get, to_value, .. } => {
                    if let Some(value) = get(record).and_then(to_value) {
                        out.push((field.column_name().to_string(), value));
                    }
                }
                FieldKind::Embedded {
                    descriptor, get, ..
                } => {
                    if let Some(inner) = get(record) {
                        descriptor().collect_entries(inner, out);
                    }
                }
                FieldKind::Relation | FieldKind::Meta | FieldKind::Opaque => {}
            }
        }
    }

    /// First field marked `#[orm(primary)]`, searching embedded records too.
    pub fn primary_key(&self) -> Option<&'static str> {
        self.fields.iter().find_map(|field| match field.kind {
            FieldKind::Value { .. } if field.primary => Some(field.column_name()),
            FieldKind::Embedded { descriptor, .. } => descriptor().primary_key(),
            _ => None,
        })
    }
}

/// Static description of one struct field.
#[derive(Debug)]
pub struct FieldDescriptor {
    name: &'static str,
    orm_tag: Option<&'static str>,
    serde_tag: Option<&'static str>,
    primary: bool,
    kind: FieldKind,
}

/// What a field is, and how to reach it.
#[derive(Debug)]
pub enum FieldKind {
    /// A scalar mapped to one column.
    Value {
        type_id: TypeId,
        type_name: &'static str,
        /// Conversion owned by the field type; `None` defers to the registry.
        scan: Option<ScanFn>,
        to_value: ToValueFn,
        get: GetFn,
        get_mut: GetMutFn,
    },
    /// A flattened record whose fields map to columns of their own.
    Embedded {
        descriptor: fn() -> &'static RecordDescriptor,
        get: GetFn,
        get_mut: GetMutFn,
    },
    /// A relation (`#[orm(with = "...")]`); never mapped.
    Relation,
    /// A [`TableMeta`] marker; never mapped.
    Meta,
    /// A trait object; never mapped.
    Opaque,
}

fn value_of<F: ToValue + 'static>(field: &dyn Any) -> Option<Value> {
    field.downcast_ref::<F>().map(ToValue::to_value)
}

fn scan_with<F: Scanner + 'static>(value: &Value, field: &mut dyn Any) -> Result<(), ConvertError> {
    match field.downcast_mut::<F>() {
        Some(slot) => slot.scan(value),
        None => Err(ConvertError::destination::<F>()),
    }
}

fn json_value_of<F: Serialize + 'static>(field: &dyn Any) -> Option<Value> {
    let field = field.downcast_ref::<F>()?;
    Some(match serde_json::to_value(field) {
        Ok(json) => Value::Json(json),
        Err(_) => Value::Null,
    })
}

fn scan_json<F: DeserializeOwned + 'static>(
    value: &Value,
    field: &mut dyn Any,
) -> Result<(), ConvertError> {
    let slot = field
        .downcast_mut::<F>()
        .ok_or_else(ConvertError::destination::<F>)?;
    let parsed = match value {
        Value::Json(json) => serde_json::from_value(json.clone()),
        Value::Text(text) => serde_json::from_str(text),
        Value::Bytes(bytes) => serde_json::from_slice(bytes),
        other => return Err(ConvertError::unsupported(other, type_name::<F>())),
    };
    *slot = parsed.map_err(|e| ConvertError::new(e.to_string()))?;
    Ok(())
}

impl FieldDescriptor {
    fn with_kind(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            orm_tag: None,
            serde_tag: None,
            primary: false,
            kind,
        }
    }

    /// A scalar field converted through the registry.
    pub fn value<F: ToValue + 'static>(name: &'static str, get: GetFn, get_mut: GetMutFn) -> Self {
        Self::with_kind(
            name,
            FieldKind::Value {
                type_id: TypeId::of::<F>(),
                type_name: type_name::<F>(),
                scan: None,
                to_value: value_of::<F>,
                get,
                get_mut,
            },
        )
    }

    /// A scalar field whose type implements [`Scanner`].
    pub fn scanned<F: Scanner + ToValue + 'static>(
        name: &'static str,
        get: GetFn,
        get_mut: GetMutFn,
    ) -> Self {
        Self::with_kind(
            name,
            FieldKind::Value {
                type_id: TypeId::of::<F>(),
                type_name: type_name::<F>(),
                scan: Some(scan_with::<F>),
                to_value: value_of::<F>,
                get,
                get_mut,
            },
        )
    }

    /// A field stored as JSON and (de)serialized with serde.
    pub fn json<F: Serialize + DeserializeOwned + 'static>(
        name: &'static str,
        get: GetFn,
        get_mut: GetMutFn,
    ) -> Self {
        Self::with_kind(
            name,
            FieldKind::Value {
                type_id: TypeId::of::<F>(),
                type_name: type_name::<F>(),
                scan: Some(scan_json::<F>),
                to_value: json_value_of::<F>,
                get,
                get_mut,
            },
        )
    }

    /// A flattened record field.
    pub fn embedded<E: Record>(name: &'static str, get: GetFn, get_mut: GetMutFn) -> Self {
        Self::with_kind(
            name,
            FieldKind::Embedded {
                descriptor: E::descriptor,
                get,
                get_mut,
            },
        )
    }

    pub fn relation(name: &'static str) -> Self {
        Self::with_kind(name, FieldKind::Relation)
    }

    pub fn meta(name: &'static str) -> Self {
        Self::with_kind(name, FieldKind::Meta)
    }

    pub fn opaque(name: &'static str) -> Self {
        Self::with_kind(name, FieldKind::Opaque)
    }

    pub fn orm_tag(mut self, tag: &'static str) -> Self {
        self.orm_tag = Some(tag);
        self
    }

    pub fn serde_tag(mut self, tag: &'static str) -> Self {
        self.serde_tag = Some(tag);
        self
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The explicit column name: the ORM tag, else the serialization tag.
    pub fn tag(&self) -> Option<&'static str> {
        self.orm_tag.or(self.serde_tag)
    }

    /// The column this field is written to when used as a condition or selected.
    pub fn column_name(&self) -> &'static str {
        self.tag().unwrap_or(self.name)
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Inner {
        email: String,
    }

    impl Record for Inner {
        fn descriptor() -> &'static RecordDescriptor {
            static D: std::sync::OnceLock<RecordDescriptor> = std::sync::OnceLock::new();
            D.get_or_init(|| {
                fn get(r: &dyn Any) -> Option<&dyn Any> {
                    r.downcast_ref::<Inner>().map(|r| &r.email as &dyn Any)
                }
                fn get_mut(r: &mut dyn Any) -> Option<&mut dyn Any> {
                    r.downcast_mut::<Inner>().map(|r| &mut r.email as &mut dyn Any)
                }
                RecordDescriptor::new::<Inner>(vec![
                    FieldDescriptor::value::<String>("email", get, get_mut).serde_tag("mail"),
                ])
            })
        }
    }

    #[derive(Debug, Default)]
    struct Outer {
        id: i64,
        inner: Option<Inner>,
    }

    impl Record for Outer {
        fn descriptor() -> &'static RecordDescriptor {
            static D: std::sync::OnceLock<RecordDescriptor> = std::sync::OnceLock::new();
            D.get_or_init(|| {
                fn get_id(r: &dyn Any) -> Option<&dyn Any> {
                    r.downcast_ref::<Outer>().map(|r| &r.id as &dyn Any)
                }
                fn get_id_mut(r: &mut dyn Any) -> Option<&mut dyn Any> {
                    r.downcast_mut::<Outer>().map(|r| &mut r.id as &mut dyn Any)
                }
                fn get_inner(r: &dyn Any) -> Option<&dyn Any> {
                    r.downcast_ref::<Outer>()
                        .and_then(|r| r.inner.as_ref())
                        .map(|e| e as &dyn Any)
                }
                fn get_inner_mut(r: &mut dyn Any) -> Option<&mut dyn Any> {
                    r.downcast_mut::<Outer>()
                        .map(|r| r.inner.get_or_insert_with(Default::default) as &mut dyn Any)
                }
                RecordDescriptor::new::<Outer>(vec![
                    FieldDescriptor::value::<i64>("id", get_id, get_id_mut).primary(),
                    FieldDescriptor::embedded::<Inner>("inner", get_inner, get_inner_mut),
                    FieldDescriptor::relation("orders"),
                ])
                .with_table("outer")
            })
        }
    }

    #[test]
    fn test_column_names_flatten_embedded() {
        assert_eq!(Outer::descriptor().column_names(), vec!["id", "mail"]);
        assert_eq!(Outer::descriptor().table(), Some("outer"));
        assert_eq!(Outer::descriptor().primary_key(), Some("id"));
    }

    #[test]
    fn test_entries_skip_absent_embedded() {
        let outer = Outer { id: 7, inner: None };
        assert_eq!(
            Outer::descriptor().entries(&outer),
            vec![("id".to_string(), Value::Int(7))]
        );

        let outer = Outer {
            id: 7,
            inner: Some(Inner {
                email: "a@b.c".into(),
            }),
        };
        assert_eq!(Outer::descriptor().entries(&outer).len(), 2);
    }

    #[test]
    fn test_get_mut_allocates_optional_level() {
        let mut outer = Outer::default();
        let FieldKind::Embedded { get_mut, .. } = *Outer::descriptor().fields()[1].kind() else {
            panic!("expected embedded field");
        };
        assert!(get_mut(&mut outer).is_some());
        assert!(outer.inner.is_some());
    }
}
