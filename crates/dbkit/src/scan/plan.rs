use crate::convert::{ConversionRegistry, ConvertError, ConvertFn};
use crate::error::{OrmError, OrmResult};
use crate::record::{FieldDescriptor, FieldKind, GetMutFn, RecordDescriptor, ScanFn};
use crate::row::ColumnMeta;
use crate::value::Value;
use std::any::{Any, TypeId};
use std::fmt;

#[derive(Clone)]
enum Converter {
    Own(ScanFn),
    Registry(ConvertFn),
}

/// One resolved column-to-field correspondence.
#[derive(Clone)]
pub struct FieldMapping {
    pub column: String,
    pub ordinal: usize,
    pub column_meta: ColumnMeta,
    /// Field indices from the record root, through embedded records, to the field.
    pub path: Vec<usize>,
    pub field_name: &'static str,
    pub field_type: &'static str,
    /// The field type converts itself (`Scanner` or JSON) instead of using the registry.
    pub user_converted: bool,
    accessors: Vec<GetMutFn>,
    converter: Converter,
}

impl fmt::Debug for FieldMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldMapping")
            .field("column", &self.column)
            .field("ordinal", &self.ordinal)
            .field("path", &self.path)
            .field("field_name", &self.field_name)
            .field("field_type", &self.field_type)
            .field("user_converted", &self.user_converted)
            .finish()
    }
}

impl FieldMapping {
    /// Write `value` into the field of `record`, allocating optional parents.
    pub(crate) fn assign(&self, record: &mut dyn Any, value: &Value) -> Result<(), ConvertError> {
        let mut target = record;
        for get_mut in &self.accessors {
            target = get_mut(target).ok_or_else(|| {
                ConvertError::new(format!("field path {:?} is not reachable", self.path))
            })?;
        }
        match &self.converter {
            Converter::Own(scan) => scan(value, target),
            Converter::Registry(convert) => convert(value, target),
        }
    }

    pub(crate) fn conversion_error(&self, value: &Value, err: ConvertError) -> OrmError {
        OrmError::Conversion {
            column: self.column.clone(),
            db_type: self.column_meta.db_type.clone(),
            field: self.field_name.to_string(),
            field_type: self.field_type.to_string(),
            value: render_value(value),
            message: err.message().to_string(),
        }
    }
}

fn render_value(value: &Value) -> String {
    const MAX: usize = 64;
    let text = match value {
        Value::Text(s) => format!("{s:?}"),
        other => other.to_string(),
    };
    if text.chars().count() > MAX {
        let cut: String = text.chars().take(MAX).collect();
        format!("{cut}...")
    } else {
        text
    }
}

/// What happens to one column's raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanTarget {
    /// Materialized through `mappings[i]`.
    Field(usize),
    /// Read from the driver and dropped.
    Discard,
}

/// Reusable column-to-field mapping for one record type and column set.
#[derive(Debug)]
pub struct ScanPlan {
    record: &'static RecordDescriptor,
    columns: Vec<ColumnMeta>,
    mappings: Vec<FieldMapping>,
    targets: Vec<ScanTarget>,
}

/// A mappable scalar field found while flattening the descriptor tree.
struct Leaf<'a> {
    field: &'a FieldDescriptor,
    path: Vec<usize>,
    accessors: Vec<GetMutFn>,
}

fn collect_leaves<'a>(
    descriptor: &'a RecordDescriptor,
    path: &[usize],
    accessors: &[GetMutFn],
    out: &mut Vec<Leaf<'a>>,
) {
    for (index, field) in descriptor.fields().iter().enumerate() {
        let mut field_path = path.to_vec();
        field_path.push(index);
        match *field.kind() {
            FieldKind::Value { get_mut, .. } => {
                let mut chain = accessors.to_vec();
                chain.push(get_mut);
                out.push(Leaf {
                    field,
                    path: field_path,
                    accessors: chain,
                });
            }
            FieldKind::Embedded {
                descriptor: nested,
                get_mut,
                ..
            } => {
                let mut chain = accessors.to_vec();
                chain.push(get_mut);
                collect_leaves(nested(), &field_path, &chain, out);
            }
            FieldKind::Relation | FieldKind::Meta | FieldKind::Opaque => {}
        }
    }
}

/// Claim the first unclaimed column accepted by `predicate`.
fn claim(
    columns: &[ColumnMeta],
    claimed: &mut [bool],
    predicate: impl Fn(&ColumnMeta) -> bool,
) -> Option<usize> {
    let position = columns
        .iter()
        .enumerate()
        .position(|(i, column)| !claimed[i] && predicate(column))?;
    claimed[position] = true;
    Some(position)
}

/// Lower-cased name with everything but letters and digits removed.
fn fuzzy_key(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

impl ScanPlan {
    /// Resolve which column feeds which field of `record`.
    ///
    /// Columns are matched per field by, in order: the ORM tag (else the serialization
    /// tag), the exact field name, then a case- and symbol-insensitive comparison against
    /// the columns nobody claimed yet. Each tier runs over every field before the next, and
    /// a claimed column is never matched again.
    pub fn build(
        record: &'static RecordDescriptor,
        columns: &[ColumnMeta],
        registry: &ConversionRegistry,
    ) -> OrmResult<Self> {
        let mut leaves = Vec::new();
        collect_leaves(record, &[], &[], &mut leaves);

        let mut claimed = vec![false; columns.len()];
        let mut matched: Vec<Option<usize>> = vec![None; leaves.len()];

        for (leaf, slot) in leaves.iter().zip(matched.iter_mut()) {
            if let Some(tag) = leaf.field.tag() {
                *slot = claim(columns, &mut claimed, |column| column.name == tag);
            }
        }
        for (leaf, slot) in leaves.iter().zip(matched.iter_mut()) {
            if slot.is_none() {
                let name = leaf.field.name();
                *slot = claim(columns, &mut claimed, |column| column.name == name);
            }
        }
        for (leaf, slot) in leaves.iter().zip(matched.iter_mut()) {
            if slot.is_none() {
                let key = fuzzy_key(leaf.field.name());
                *slot = claim(columns, &mut claimed, |column| fuzzy_key(&column.name) == key);
            }
        }

        let mut pairs: Vec<(usize, &Leaf<'_>)> = leaves
            .iter()
            .zip(&matched)
            .filter_map(|(leaf, column)| column.map(|c| (c, leaf)))
            .collect();
        if pairs.is_empty() {
            return Err(OrmError::mapping_empty(record.type_name()));
        }
        pairs.sort_by_key(|(column, _)| *column);

        let mut mappings = Vec::with_capacity(pairs.len());
        let mut targets = vec![ScanTarget::Discard; columns.len()];
        for (ordinal, leaf) in pairs {
            let column = &columns[ordinal];
            let FieldKind::Value {
                type_id,
                type_name,
                scan,
                ..
            } = *leaf.field.kind()
            else {
                continue;
            };
            let (converter, user_converted) = match scan {
                Some(scan) => (Converter::Own(scan), true),
                None => (
                    Converter::Registry(resolve_converter(
                        registry, type_id, type_name, leaf.field, column,
                    )?),
                    false,
                ),
            };
            targets[ordinal] = ScanTarget::Field(mappings.len());
            mappings.push(FieldMapping {
                column: column.name.clone(),
                ordinal,
                column_meta: column.clone(),
                path: leaf.path.clone(),
                field_name: leaf.field.name(),
                field_type: type_name,
                user_converted,
                accessors: leaf.accessors.clone(),
                converter,
            });
        }

        let plan = Self {
            record,
            columns: columns.to_vec(),
            mappings,
            targets,
        };
        let discarded: Vec<&str> = plan.discarded_columns().collect();
        if !discarded.is_empty() {
            tracing::debug!(
                target: "dbkit.scan",
                record = record.type_name(),
                ?discarded,
                "columns without a field are discarded"
            );
        }
        Ok(plan)
    }

    pub fn record(&self) -> &'static RecordDescriptor {
        self.record
    }

    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    /// Mappings in column order.
    pub fn mappings(&self) -> &[FieldMapping] {
        &self.mappings
    }

    /// One target per column.
    pub fn targets(&self) -> &[ScanTarget] {
        &self.targets
    }

    pub fn mapping_for(&self, column: &str) -> Option<&FieldMapping> {
        self.mappings.iter().find(|m| m.column == column)
    }

    /// Columns that are read but never materialized.
    pub fn discarded_columns(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .zip(&self.targets)
            .filter(|(_, target)| **target == ScanTarget::Discard)
            .map(|(column, _)| column.name.as_str())
    }

    /// Whether this plan was built for exactly these columns.
    pub fn matches_columns(&self, columns: &[ColumnMeta]) -> bool {
        self.columns.len() == columns.len()
            && self
                .columns
                .iter()
                .zip(columns)
                .all(|(a, b)| a.name == b.name && a.db_type == b.db_type)
    }
}

fn resolve_converter(
    registry: &ConversionRegistry,
    type_id: TypeId,
    type_name: &'static str,
    field: &FieldDescriptor,
    column: &ColumnMeta,
) -> OrmResult<ConvertFn> {
    registry
        .resolve(type_id, &column.db_type)
        .ok_or_else(|| OrmError::Conversion {
            column: column.name.clone(),
            db_type: column.db_type.clone(),
            field: field.name().to_string(),
            field_type: type_name.to_string(),
            value: "-".to_string(),
            message: "no conversion registered for this field type".to_string(),
        })
}
