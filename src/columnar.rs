//! arrow2 adapter: flattened rows into a columnar `Chunk`, chunks back into
//! rows, and parquet encoding of a chunk.

use std::io::Write;

use arrow2::array::{
    Array, BooleanArray, MutableBooleanArray, MutablePrimitiveArray, MutableUtf8Array,
    PrimitiveArray, Utf8Array,
};
use arrow2::chunk::Chunk;
use arrow2::datatypes::{DataType, Field, Schema};
use arrow2::io::parquet::write::{
    transverse, CompressionOptions, Encoding, FileWriter, RowGroupIterator, Version, WriteOptions,
};

use crate::error::SinkError;
use crate::flattener::{HeaderField, RowSink};
use crate::value::{ScalarType, Value};

const WRITE_OPTIONS: WriteOptions = WriteOptions {
    write_statistics: true,
    compression: CompressionOptions::Uncompressed,
    version: Version::V2,
    data_pagesize_limit: None,
};

pub fn data_type(scalar_type: ScalarType) -> DataType {
    match scalar_type {
        ScalarType::Boolean => DataType::Boolean,
        ScalarType::Int => DataType::Int64,
        ScalarType::UInt => DataType::UInt64,
        ScalarType::Float => DataType::Float64,
        ScalarType::Text => DataType::Utf8,
    }
}

/// Arrow schema for a header; every column is nullable.
pub fn schema_for(header: &[HeaderField]) -> Schema {
    Schema::from(
        header
            .iter()
            .map(|h| Field::new(h.name.clone(), data_type(h.scalar_type), true))
            .collect::<Vec<_>>(),
    )
}

enum ColumnBuilder {
    Boolean(MutableBooleanArray),
    Int(MutablePrimitiveArray<i64>),
    UInt(MutablePrimitiveArray<u64>),
    Float(MutablePrimitiveArray<f64>),
    Text(MutableUtf8Array<i32>),
}

impl ColumnBuilder {
    fn new(scalar_type: ScalarType) -> Self {
        match scalar_type {
            ScalarType::Boolean => ColumnBuilder::Boolean(MutableBooleanArray::new()),
            ScalarType::Int => ColumnBuilder::Int(MutablePrimitiveArray::new()),
            ScalarType::UInt => ColumnBuilder::UInt(MutablePrimitiveArray::new()),
            ScalarType::Float => ColumnBuilder::Float(MutablePrimitiveArray::new()),
            ScalarType::Text => ColumnBuilder::Text(MutableUtf8Array::new()),
        }
    }

    fn push(&mut self, value: Value, field: &HeaderField) -> Result<(), SinkError> {
        match (self, value) {
            (ColumnBuilder::Boolean(col), Value::Null) => col.push(None),
            (ColumnBuilder::Int(col), Value::Null) => col.push(None),
            (ColumnBuilder::UInt(col), Value::Null) => col.push(None),
            (ColumnBuilder::Float(col), Value::Null) => col.push(None),
            (ColumnBuilder::Text(col), Value::Null) => col.push(None::<&str>),
            (ColumnBuilder::Boolean(col), Value::Boolean(v)) => col.push(Some(v)),
            (ColumnBuilder::Int(col), Value::Int(v)) => col.push(Some(v)),
            (ColumnBuilder::UInt(col), Value::UInt(v)) => col.push(Some(v)),
            (ColumnBuilder::Float(col), Value::Float(v)) => col.push(Some(v)),
            (ColumnBuilder::Text(col), Value::Text(v)) => col.push(Some(v)),
            (_, other) => {
                return Err(SinkError::TypeMismatch {
                    column: field.name.clone(),
                    expected: field.scalar_type,
                    found: other.kind(),
                })
            }
        }
        Ok(())
    }

    fn finish(self) -> Box<dyn Array> {
        match self {
            ColumnBuilder::Boolean(col) => BooleanArray::from(col).boxed(),
            ColumnBuilder::Int(col) => PrimitiveArray::<i64>::from(col).boxed(),
            ColumnBuilder::UInt(col) => PrimitiveArray::<u64>::from(col).boxed(),
            ColumnBuilder::Float(col) => PrimitiveArray::<f64>::from(col).boxed(),
            ColumnBuilder::Text(col) => <Utf8Array<i32> as From<_>>::from(col).boxed(),
        }
    }
}

/// Collects rows into arrow2 column builders.
#[derive(Default)]
pub struct ArrowSink {
    header: Option<Vec<HeaderField>>,
    builders: Vec<ColumnBuilder>,
    rows: usize,
}

impl ArrowSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn finish(self) -> Result<(Schema, Chunk<Box<dyn Array>>), SinkError> {
        let header = self.header.ok_or(SinkError::HeaderMissing)?;
        let arrays = self.builders.into_iter().map(ColumnBuilder::finish).collect();
        Ok((schema_for(&header), Chunk::try_new(arrays)?))
    }
}

impl RowSink for ArrowSink {
    fn write_header(&mut self, header: &[HeaderField]) -> Result<(), SinkError> {
        if self.header.is_some() {
            return Err(SinkError::HeaderRewritten);
        }
        self.builders = header.iter().map(|h| ColumnBuilder::new(h.scalar_type)).collect();
        self.header = Some(header.to_vec());
        Ok(())
    }

    fn write_row(&mut self, row: Vec<Value>) -> Result<(), SinkError> {
        let header = self.header.as_ref().ok_or(SinkError::HeaderMissing)?;
        if row.len() != header.len() {
            return Err(SinkError::RowWidth {
                expected: header.len(),
                found: row.len(),
            });
        }
        // a rejected row must not reach any builder
        for (value, field) in row.iter().zip(header) {
            check_value(value, field)?;
        }
        for ((value, builder), field) in row.into_iter().zip(&mut self.builders).zip(header) {
            builder.push(value, field)?;
        }
        self.rows += 1;
        Ok(())
    }
}

fn check_value(value: &Value, field: &HeaderField) -> Result<(), SinkError> {
    let fits = matches!(
        (field.scalar_type, value),
        (_, Value::Null)
            | (ScalarType::Boolean, Value::Boolean(_))
            | (ScalarType::Int, Value::Int(_))
            | (ScalarType::UInt, Value::UInt(_))
            | (ScalarType::Float, Value::Float(_))
            | (ScalarType::Text, Value::Text(_))
    );
    if fits {
        Ok(())
    } else {
        Err(SinkError::TypeMismatch {
            column: field.name.clone(),
            expected: field.scalar_type,
            found: value.kind(),
        })
    }
}

fn unsupported(field: &Field) -> SinkError {
    SinkError::UnsupportedArray {
        column: field.name.clone(),
        data_type: format!("{:?}", field.data_type),
    }
}

macro_rules! read_column {
    ($array:expr, $field:expr, $ty:ty, |$v:ident| $convert:expr) => {{
        let typed = $array
            .as_any()
            .downcast_ref::<$ty>()
            .ok_or_else(|| unsupported($field))?;
        typed
            .iter()
            .map(|item| match item {
                Some($v) => $convert,
                None => Value::Null,
            })
            .collect::<Vec<_>>()
    }};
}

fn read_array(field: &Field, array: &dyn Array) -> Result<(ScalarType, Vec<Value>), SinkError> {
    Ok(match field.data_type {
        DataType::Boolean => (
            ScalarType::Boolean,
            read_column!(array, field, BooleanArray, |v| Value::Boolean(v)),
        ),
        DataType::Int64 => (
            ScalarType::Int,
            read_column!(array, field, PrimitiveArray<i64>, |v| Value::Int(*v)),
        ),
        DataType::UInt64 => (
            ScalarType::UInt,
            read_column!(array, field, PrimitiveArray<u64>, |v| Value::UInt(*v)),
        ),
        DataType::Float64 => (
            ScalarType::Float,
            read_column!(array, field, PrimitiveArray<f64>, |v| Value::Float(*v)),
        ),
        DataType::Utf8 => (
            ScalarType::Text,
            read_column!(array, field, Utf8Array<i32>, |v| Value::Text(v.to_string())),
        ),
        _ => return Err(unsupported(field)),
    })
}

/// Reads a chunk back into a header and rows.
pub fn chunk_rows(
    schema: &Schema,
    chunk: &Chunk<Box<dyn Array>>,
) -> Result<(Vec<HeaderField>, Vec<Vec<Value>>), SinkError> {
    let mut header = Vec::with_capacity(schema.fields.len());
    let mut columns = Vec::with_capacity(schema.fields.len());
    for (field, array) in schema.fields.iter().zip(chunk.arrays()) {
        let (scalar_type, values) = read_array(field, array.as_ref())?;
        header.push(HeaderField {
            name: field.name.clone(),
            scalar_type,
        });
        columns.push(values);
    }

    let rows = (0..chunk.len())
        .map(|i| {
            columns
                .iter_mut()
                .map(|column| std::mem::take(&mut column[i]))
                .collect()
        })
        .collect();
    Ok((header, rows))
}

/// Encodes `chunk` as a single-row-group parquet file. Returns the number of
/// bytes written.
pub fn write_parquet<W: Write>(
    schema: &Schema,
    chunk: Chunk<Box<dyn Array>>,
    writer: W,
) -> Result<u64, SinkError> {
    let encodings = schema
        .fields
        .iter()
        .map(|f| transverse(&f.data_type, |_| Encoding::Plain))
        .collect();
    let row_groups =
        RowGroupIterator::try_new(vec![Ok(chunk)].into_iter(), schema, WRITE_OPTIONS, encodings)?;

    let mut writer = FileWriter::try_new(writer, schema.clone(), WRITE_OPTIONS)?;
    for group in row_groups {
        writer.write(group?)?;
    }
    Ok(writer.end(None)?)
}
