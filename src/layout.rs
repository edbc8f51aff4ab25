use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;

use crate::error::{MappingError, ValueError};
use crate::flattener::HeaderField;
use crate::value::{ScalarType, Value};

pub(crate) type ReadFn<T> = Arc<dyn Fn(&T) -> Value + Send + Sync>;
pub(crate) type WriteFn<T> = Arc<dyn Fn(&mut T, Value) -> Result<(), ValueError> + Send + Sync>;

/// One output column: its name, the field path it was derived from and the
/// accessors that read and write it on a `T`.
pub struct Column<T> {
    name: String,
    path: Vec<&'static str>,
    scalar_type: ScalarType,
    read: ReadFn<T>,
    write: WriteFn<T>,
}

impl<T> Column<T> {
    pub(crate) fn new(
        name: String,
        path: Vec<&'static str>,
        scalar_type: ScalarType,
        read: ReadFn<T>,
        write: WriteFn<T>,
    ) -> Self {
        Self {
            name,
            path,
            scalar_type,
            read,
            write,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field identifiers from the root record down to the scalar.
    pub fn path(&self) -> &[&'static str] {
        &self.path
    }

    pub fn path_string(&self) -> String {
        self.path.join(".")
    }

    pub fn scalar_type(&self) -> ScalarType {
        self.scalar_type
    }

    pub fn read(&self, record: &T) -> Value {
        (self.read)(record)
    }

    pub fn write(&self, record: &mut T, value: Value) -> Result<(), ValueError> {
        (self.write)(record, value)
    }

    fn renamed(&self, name: String) -> Self {
        Self {
            name,
            ..self.clone()
        }
    }
}

impl<T> Clone for Column<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            path: self.path.clone(),
            scalar_type: self.scalar_type,
            read: Arc::clone(&self.read),
            write: Arc::clone(&self.write),
        }
    }
}

/// Accessors are bound to the field path, so two columns with equal name,
/// path and type read and write the same field.
impl<T> PartialEq for Column<T> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.path == other.path && self.scalar_type == other.scalar_type
    }
}

impl<T> Eq for Column<T> {}

impl<T> fmt::Debug for Column<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("scalar_type", &self.scalar_type)
            .finish()
    }
}

/// Ordered, name-unique list of columns for one record type.
pub struct FieldLayout<T> {
    columns: Vec<Column<T>>,
    by_name: AHashMap<String, usize>,
}

impl<T> FieldLayout<T> {
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
            by_name: AHashMap::new(),
        }
    }

    /// Builds a layout from columns already known to have distinct names.
    pub(crate) fn from_unique(columns: Vec<Column<T>>) -> Self {
        let by_name = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();
        Self { columns, by_name }
    }

    pub fn columns(&self) -> &[Column<T>] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column<T>> {
        self.by_name.get(name).map(|&i| &self.columns[i])
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.columns.iter().map(|c| c.name())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Appends a column, rejecting a name that is already taken.
    pub fn push(&mut self, column: Column<T>) -> Result<(), MappingError> {
        if let Some(&existing) = self.by_name.get(column.name()) {
            return Err(MappingError::ColumnNameConflict {
                column: column.name.clone(),
                first: self.columns[existing].path_string(),
                second: column.path_string(),
            });
        }
        self.by_name.insert(column.name.clone(), self.columns.len());
        self.columns.push(column);
        Ok(())
    }

    /// Appends every column of `other`, in order.
    pub fn merge(&mut self, other: FieldLayout<T>) -> Result<(), MappingError> {
        for column in other.columns {
            self.push(column)?;
        }
        Ok(())
    }

    /// Copy of this layout with `prefix` and `separator` in front of every
    /// column name. Prefixing is injective, so names stay unique.
    pub fn prefixed(&self, prefix: &str, separator: &str) -> Self {
        let columns = self
            .columns
            .iter()
            .map(|c| c.renamed(format!("{prefix}{separator}{}", c.name)))
            .collect();
        Self::from_unique(columns)
    }

    pub fn header(&self) -> Vec<HeaderField> {
        self.columns
            .iter()
            .map(|c| HeaderField {
                name: c.name.clone(),
                scalar_type: c.scalar_type,
            })
            .collect()
    }

    /// Values of `record` in column order.
    pub fn extract(&self, record: &T) -> Vec<Value> {
        self.columns.iter().map(|c| c.read(record)).collect()
    }
}

impl<T> Default for FieldLayout<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for FieldLayout<T> {
    fn clone(&self) -> Self {
        Self {
            columns: self.columns.clone(),
            by_name: self.by_name.clone(),
        }
    }
}

impl<T> PartialEq for FieldLayout<T> {
    fn eq(&self, other: &Self) -> bool {
        self.columns == other.columns
    }
}

impl<T> Eq for FieldLayout<T> {}

impl<T> fmt::Debug for FieldLayout<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.columns).finish()
    }
}
