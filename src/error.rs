use thiserror::Error;

use crate::registry::SessionKey;
use crate::value::ScalarType;

/// Errors raised while building, merging or resolving mappings.
///
/// All of these describe a mapping definition that has to be fixed; none of
/// them is transient.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    #[error("field `{field}` of `{record}` has a kind that cannot be flattened; ignore it or map it explicitly")]
    UnsupportedFieldKind {
        record: &'static str,
        field: &'static str,
    },

    #[error("field `{field}` of `{record}` already has a reference override")]
    DuplicateOverride {
        record: &'static str,
        field: &'static str,
    },

    #[error("column `{column}` is produced by both `{first}` and `{second}`")]
    ColumnNameConflict {
        column: String,
        first: String,
        second: String,
    },

    #[error("no mapping registered for `{record}` in {session}")]
    UnresolvedMapping {
        session: SessionKey,
        record: &'static str,
    },

    #[error("`{record}` has no field `{field}`")]
    UnknownField { record: &'static str, field: String },

    #[error("field `{field}` of `{record}` is not a nested record")]
    NotNestedField {
        record: &'static str,
        field: &'static str,
    },

    #[error("field `{field}` of `{record}` is not a scalar")]
    NotScalarField {
        record: &'static str,
        field: &'static str,
    },

    #[error("field `{field}` of `{record}` holds `{expected}`, but the definition maps `{found}`")]
    ChildTypeMismatch {
        record: &'static str,
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("field `{field}` of `{record}` is already configured")]
    DuplicateMember {
        record: &'static str,
        field: &'static str,
    },

    #[error("invalid column prefix {prefix:?} for `{record}` columns")]
    InvalidPrefix { record: &'static str, prefix: String },

    #[error("`{record}` contains itself and cannot be auto-mapped")]
    RecursiveType { record: &'static str },
}

/// Conversion failures between [`crate::Value`] and typed fields.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("expected {expected} value, found {found}")]
    TypeMismatch {
        expected: ScalarType,
        found: &'static str,
    },

    #[error("value {value} does not fit in {target}")]
    OutOfRange { value: String, target: &'static str },

    #[error("null value for non-optional {expected} field")]
    UnexpectedNull { expected: ScalarType },
}

/// Failures reported by row sinks.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("row receiver disconnected")]
    Disconnected,

    #[error("row written before header")]
    HeaderMissing,

    #[error("header written twice")]
    HeaderRewritten,

    #[error("row has {found} values, header has {expected}")]
    RowWidth { expected: usize, found: usize },

    #[error("column `{column}` expects {expected} values, got {found}")]
    TypeMismatch {
        column: String,
        expected: ScalarType,
        found: &'static str,
    },

    #[error("column `{column}` has unsupported array type {data_type}")]
    UnsupportedArray { column: String, data_type: String },

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow2::error::Error),
}

/// Errors on the write and read paths of [`crate::RowWriter`].
#[derive(Error, Debug)]
pub enum RowError {
    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("header is missing column `{column}`")]
    MissingColumn { column: String },

    #[error("header names column `{column}` more than once")]
    DuplicateColumn { column: String },

    #[error("row {row} has {found} values, header has {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("column `{column}`: {source}")]
    Value {
        column: String,
        #[source]
        source: ValueError,
    },
}
