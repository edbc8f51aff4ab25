//! Declarative flattening of nested records into tabular rows.
//!
//! A record type describes its fields once with [`record!`]. A
//! [`MappingDefinition`] (usually a [`ClassMap`]) turns that description into
//! a [`FieldLayout`]: an ordered list of uniquely named scalar columns. Nested
//! records are expanded either by the derived layout or by a reference
//! override that reuses another definition under a prefix, so the same
//! `Address` map can produce both `Home.Street` and `Office.Street`.
//!
//! Layouts are resolved per session in a [`MappingRegistry`] and consumed by a
//! [`RowWriter`], which feeds any [`RowSink`]: an in-memory [`RowBuffer`], a
//! crossbeam [`ChannelSink`] or an arrow2 [`ArrowSink`].

pub mod auto;
pub mod columnar;
pub mod config;
pub mod definition;
pub mod descriptor;
pub mod error;
pub mod flattener;
pub mod layout;
pub mod overrides;
pub mod registry;
pub mod value;

#[cfg(test)]
mod testing;

pub use auto::AutoMapper;
pub use columnar::{chunk_rows, schema_for, write_parquet, ArrowSink};
pub use config::{MapperConfig, UnsupportedFieldPolicy};
pub use definition::{ClassMap, MappingDefinition};
pub use descriptor::{FieldDescriptor, FieldKind, Record, TypeDescriptor};
pub use error::{MappingError, RowError, SinkError, ValueError};
pub use flattener::{ChannelSink, HeaderField, RowBuffer, RowMessage, RowSink, RowWriter};
pub use layout::{Column, FieldLayout};
pub use overrides::{ReferenceOverride, ReferenceOverrideTable};
pub use registry::{MappingRegistry, SessionKey};
pub use value::{Scalar, ScalarType, Value};
