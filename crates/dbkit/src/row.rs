//! Column metadata and the row cursor seam.
//!
//! A query-execution collaborator hands back a [`RowCursor`]: column metadata plus a
//! forward-only cursor. [`ResultSet`] is the in-memory implementation used by the
//! PostgreSQL adapter, the result cache and tests.

use crate::error::{OrmError, OrmResult};
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Metadata for one result column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub ordinal: usize,
    /// Declared database type name, as reported by the driver.
    pub db_type: String,
    /// `None` when the driver does not report nullability.
    pub nullable: Option<bool>,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, db_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ordinal: 0,
            db_type: db_type.into(),
            nullable: None,
        }
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = Some(nullable);
        self
    }

    /// Lower-cased type name without size parameters or `unsigned`.
    ///
    /// `DECIMAL(10,2)` becomes `decimal`, `INT(11) UNSIGNED` becomes `int`.
    pub fn normalized_type(&self) -> String {
        normalize_db_type(&self.db_type)
    }
}

pub(crate) fn normalize_db_type(db_type: &str) -> String {
    let lower = db_type.trim().to_ascii_lowercase();
    let base = match lower.find('(') {
        Some(pos) => &lower[..pos],
        None => lower.as_str(),
    };
    base.trim_end_matches("unsigned").trim().to_string()
}

/// A forward-only row cursor.
pub trait RowCursor {
    /// Metadata for every column, in result order.
    fn columns(&self) -> &[ColumnMeta];

    /// Move to the next row. Returns `false` once exhausted.
    fn advance(&mut self) -> OrmResult<bool>;

    /// Copy the current row into `targets`, one slot per column.
    fn read_into(&mut self, targets: &mut [Value]) -> OrmResult<()>;
}

impl<C: RowCursor + ?Sized> RowCursor for &mut C {
    fn columns(&self) -> &[ColumnMeta] {
        (**self).columns()
    }

    fn advance(&mut self) -> OrmResult<bool> {
        (**self).advance()
    }

    fn read_into(&mut self, targets: &mut [Value]) -> OrmResult<()> {
        (**self).read_into(targets)
    }
}

/// A fully buffered result set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    columns: Vec<ColumnMeta>,
    rows: Vec<Vec<Value>>,
}

impl ResultSet {
    /// Create an empty result set; column ordinals are assigned by position.
    pub fn new(columns: impl IntoIterator<Item = ColumnMeta>) -> Self {
        let columns = columns
            .into_iter()
            .enumerate()
            .map(|(ordinal, mut column)| {
                column.ordinal = ordinal;
                column
            })
            .collect();
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row. Its width must match the column count.
    pub fn push_row(&mut self, row: Vec<Value>) -> OrmResult<()> {
        if row.len() != self.columns.len() {
            return Err(OrmError::decode(
                "*",
                format!(
                    "row has {} values but the result set has {} columns",
                    row.len(),
                    self.columns.len()
                ),
            ));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Builder form of [`push_row`](Self::push_row).
    pub fn with_row(mut self, row: Vec<Value>) -> OrmResult<Self> {
        self.push_row(row)?;
        Ok(self)
    }

    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn cursor(&self) -> ResultSetCursor<'_> {
        ResultSetCursor {
            set: self,
            next: 0,
            current: None,
        }
    }
}

/// Cursor over a borrowed [`ResultSet`].
#[derive(Debug)]
pub struct ResultSetCursor<'a> {
    set: &'a ResultSet,
    next: usize,
    current: Option<usize>,
}

impl RowCursor for ResultSetCursor<'_> {
    fn columns(&self) -> &[ColumnMeta] {
        &self.set.columns
    }

    fn advance(&mut self) -> OrmResult<bool> {
        if self.next < self.set.rows.len() {
            self.current = Some(self.next);
            self.next += 1;
            Ok(true)
        } else {
            self.current = None;
            Ok(false)
        }
    }

    fn read_into(&mut self, targets: &mut [Value]) -> OrmResult<()> {
        let Some(index) = self.current else {
            return Err(OrmError::decode("*", "read_into called without a current row"));
        };
        let row = &self.set.rows[index];
        if targets.len() != row.len() {
            return Err(OrmError::decode(
                "*",
                format!(
                    "{} scan targets for {} columns",
                    targets.len(),
                    row.len()
                ),
            ));
        }
        for (target, value) in targets.iter_mut().zip(row) {
            target.clone_from(value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_type() {
        assert_eq!(ColumnMeta::new("a", "DECIMAL(10,2)").normalized_type(), "decimal");
        assert_eq!(ColumnMeta::new("a", "int(11) unsigned").normalized_type(), "int");
        assert_eq!(ColumnMeta::new("a", " JSONB ").normalized_type(), "jsonb");
    }

    #[test]
    fn test_cursor_walks_rows() {
        let set = ResultSet::new([ColumnMeta::new("id", "int8"), ColumnMeta::new("name", "text")])
            .with_row(vec![Value::Int(1), Value::Text("a".into())])
            .unwrap();
        assert_eq!(set.columns()[1].ordinal, 1);

        let mut cursor = set.cursor();
        let mut buf = vec![Value::Null; 2];
        assert!(cursor.read_into(&mut buf).is_err());
        assert!(cursor.advance().unwrap());
        cursor.read_into(&mut buf).unwrap();
        assert_eq!(buf[1], Value::Text("a".into()));
        assert!(!cursor.advance().unwrap());
    }

    #[test]
    fn test_push_row_checks_width() {
        let mut set = ResultSet::new([ColumnMeta::new("id", "int8")]);
        assert!(set.push_row(vec![]).is_err());
    }
}
