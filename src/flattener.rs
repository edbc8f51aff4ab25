//! Pushing records through a resolved layout into row sinks, and back.

use ahash::AHashSet;
use crossbeam::channel::{self, Receiver, Sender};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::descriptor::Record;
use crate::error::{RowError, SinkError};
use crate::layout::{Column, FieldLayout};
use crate::registry::MappingRegistry;
use crate::value::{ScalarType, Value};

/// Name and type of one output column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HeaderField {
    pub name: String,
    pub scalar_type: ScalarType,
}

/// Consumer of flattened rows: one header, then rows of values in header
/// order. Encoding is entirely up to the sink.
pub trait RowSink {
    fn write_header(&mut self, header: &[HeaderField]) -> Result<(), SinkError>;

    fn write_row(&mut self, row: Vec<Value>) -> Result<(), SinkError>;
}

/// Rows kept in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowBuffer {
    header: Option<Vec<HeaderField>>,
    rows: Vec<Vec<Value>>,
}

impl RowBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects everything sent through a [`ChannelSink`] until all senders
    /// are dropped.
    pub fn drain(receiver: &Receiver<RowMessage>) -> Result<Self, SinkError> {
        let mut buffer = Self::new();
        for message in receiver.iter() {
            match message {
                RowMessage::Header(header) => buffer.write_header(&header)?,
                RowMessage::Row(row) => buffer.write_row(row)?,
            }
        }
        Ok(buffer)
    }

    pub fn header(&self) -> &[HeaderField] {
        self.header.as_deref().unwrap_or_default()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.header().iter().map(|h| h.name.as_str()).collect()
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn into_parts(self) -> (Vec<HeaderField>, Vec<Vec<Value>>) {
        (self.header.unwrap_or_default(), self.rows)
    }
}

impl RowSink for RowBuffer {
    fn write_header(&mut self, header: &[HeaderField]) -> Result<(), SinkError> {
        if self.header.is_some() {
            return Err(SinkError::HeaderRewritten);
        }
        self.header = Some(header.to_vec());
        Ok(())
    }

    fn write_row(&mut self, row: Vec<Value>) -> Result<(), SinkError> {
        let width = self.header.as_ref().ok_or(SinkError::HeaderMissing)?.len();
        if row.len() != width {
            return Err(SinkError::RowWidth {
                expected: width,
                found: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowMessage {
    Header(Vec<HeaderField>),
    Row(Vec<Value>),
}

/// Streams rows to another thread over a crossbeam channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<RowMessage>,
}

impl ChannelSink {
    pub fn bounded(capacity: usize) -> (Self, Receiver<RowMessage>) {
        let (sender, receiver) = channel::bounded(capacity);
        (Self { sender }, receiver)
    }

    pub fn unbounded() -> (Self, Receiver<RowMessage>) {
        let (sender, receiver) = channel::unbounded();
        (Self { sender }, receiver)
    }
}

impl RowSink for ChannelSink {
    fn write_header(&mut self, header: &[HeaderField]) -> Result<(), SinkError> {
        self.sender
            .send(RowMessage::Header(header.to_vec()))
            .map_err(|_| SinkError::Disconnected)
    }

    fn write_row(&mut self, row: Vec<Value>) -> Result<(), SinkError> {
        self.sender
            .send(RowMessage::Row(row))
            .map_err(|_| SinkError::Disconnected)
    }
}

/// Writes and reads records of any type registered in one session.
#[derive(Debug, Clone, Copy)]
pub struct RowWriter<'r> {
    registry: &'r MappingRegistry,
}

impl<'r> RowWriter<'r> {
    pub fn new(registry: &'r MappingRegistry) -> Self {
        Self { registry }
    }

    /// Writes the header of `T`'s registered layout followed by one row per
    /// record, in input order. Returns the number of rows written.
    pub fn write_records<T, S>(&self, sink: &mut S, records: &[T]) -> Result<usize, RowError>
    where
        T: Record,
        S: RowSink + ?Sized,
    {
        let layout = self.registry.resolve::<T>()?;
        sink.write_header(&layout.header())?;

        if records.len() >= self.registry.config().parallel_threshold {
            let rows: Vec<Vec<Value>> = records.par_iter().map(|r| layout.extract(r)).collect();
            for row in rows {
                sink.write_row(row)?;
            }
        } else {
            for record in records {
                sink.write_row(layout.extract(record))?;
            }
        }

        debug!(
            session = %self.registry.session(),
            record = T::NAME,
            rows = records.len(),
            "records written"
        );
        Ok(records.len())
    }

    /// Rebuilds records from rows. Header names are matched against the
    /// registered layout of `T`; unknown header columns are ignored.
    pub fn read_records<T, I>(&self, header: &[HeaderField], rows: I) -> Result<Vec<T>, RowError>
    where
        T: Record + Default,
        I: IntoIterator<Item = Vec<Value>>,
    {
        let layout = self.registry.resolve::<T>()?;
        let bindings = bind_header(&layout, header)?;

        let mut records = Vec::new();
        for (index, row) in rows.into_iter().enumerate() {
            if row.len() != bindings.len() {
                return Err(RowError::RowWidth {
                    row: index,
                    expected: bindings.len(),
                    found: row.len(),
                });
            }
            let mut record = T::default();
            for (value, column) in row.into_iter().zip(&bindings) {
                if let Some(column) = column {
                    column
                        .write(&mut record, value)
                        .map_err(|source| RowError::Value {
                            column: column.name().to_string(),
                            source,
                        })?;
                }
            }
            records.push(record);
        }

        debug!(
            session = %self.registry.session(),
            record = T::NAME,
            rows = records.len(),
            "records read"
        );
        Ok(records)
    }
}

/// For each header position, the layout column it feeds, if any.
fn bind_header<'l, T>(
    layout: &'l FieldLayout<T>,
    header: &[HeaderField],
) -> Result<Vec<Option<&'l Column<T>>>, RowError> {
    let mut seen = AHashSet::with_capacity(header.len());
    if let Some(repeated) = header.iter().find(|h| !seen.insert(h.name.as_str())) {
        return Err(RowError::DuplicateColumn {
            column: repeated.name.clone(),
        });
    }
    if let Some(missing) = layout
        .columns()
        .iter()
        .find(|c| !header.iter().any(|h| h.name == c.name()))
    {
        return Err(RowError::MissingColumn {
            column: missing.name().to_string(),
        });
    }
    Ok(header.iter().map(|h| layout.column(&h.name)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapperConfig;
    use crate::definition::ClassMap;
    use crate::error::ValueError;
    use crate::testing::{address_map, people, Contact, Person};

    fn registry(config: MapperConfig) -> MappingRegistry {
        let mut registry = MappingRegistry::new(config).expect("valid config");
        let map = ClassMap::<Person>::auto()
            .reference("home_address", address_map(), "Home")
            .and_then(|m| m.reference("office_address", address_map(), "Office"))
            .expect("people map");
        registry.register(&map).expect("register");
        registry
    }

    #[test]
    fn buffer_round_trip() {
        let registry = registry(MapperConfig::default());
        let writer = RowWriter::new(&registry);
        let mut buffer = RowBuffer::new();
        assert_eq!(writer.write_records(&mut buffer, &people()).expect("write"), 2);
        assert_eq!(
            buffer.column_names(),
            ["Name", "Home.Street", "Home.Town", "Office.Street", "Office.Town"]
        );
        assert_eq!(buffer.rows()[1][4], Value::Text("New York".into()));

        let (header, rows) = buffer.into_parts();
        let back: Vec<Person> = writer.read_records(&header, rows).expect("read");
        assert_eq!(back, people());
    }

    #[test]
    fn parallel_extraction_keeps_order() {
        let registry = registry(MapperConfig::default().with_parallel_threshold(1));
        let records: Vec<Person> = (0..64)
            .map(|i| Person {
                name: format!("P{i}"),
                ..Person::default()
            })
            .collect();
        let mut buffer = RowBuffer::new();
        RowWriter::new(&registry)
            .write_records(&mut buffer, &records)
            .expect("write");
        let names: Vec<_> = buffer.rows().iter().map(|r| r[0].to_string()).collect();
        let expected: Vec<_> = (0..64).map(|i| format!("P{i}")).collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn unregistered_type_is_reported() {
        let registry = registry(MapperConfig::default());
        let mut buffer = RowBuffer::new();
        let err = RowWriter::new(&registry)
            .write_records(&mut buffer, &[Contact::default()])
            .unwrap_err();
        assert!(matches!(
            err,
            RowError::Mapping(crate::MappingError::UnresolvedMapping {
                record: "Contact",
                ..
            })
        ));
        assert!(buffer.header().is_empty());
    }

    #[test]
    fn reading_needs_every_layout_column() {
        let registry = registry(MapperConfig::default());
        let header = vec![HeaderField {
            name: "Name".into(),
            scalar_type: ScalarType::Text,
        }];
        let err = RowWriter::new(&registry)
            .read_records::<Person, _>(&header, Vec::new())
            .unwrap_err();
        assert!(matches!(err, RowError::MissingColumn { column } if column == "Home.Street"));
    }

    #[test]
    fn reading_rejects_repeated_header_names() {
        let registry = registry(MapperConfig::default());
        let mut header = registry.resolve::<Person>().expect("layout").header();
        header.push(header[1].clone());
        let err = RowWriter::new(&registry)
            .read_records::<Person, _>(&header, Vec::new())
            .unwrap_err();
        assert!(matches!(err, RowError::DuplicateColumn { column } if column == "Home.Street"));
    }

    #[test]
    fn reading_ignores_extra_columns_and_reports_bad_values() {
        let registry = registry(MapperConfig::default());
        let writer = RowWriter::new(&registry);
        let mut header = registry.resolve::<Person>().expect("layout").header();
        header.push(HeaderField {
            name: "Comment".into(),
            scalar_type: ScalarType::Text,
        });
        let text = |s: &str| Value::Text(s.into());
        let good = vec![text("Jon"), text("a"), text("b"), text("c"), text("d"), text("x")];
        let bad = vec![text("Jon"), Value::Int(3), text("b"), text("c"), text("d"), Value::Null];

        let read: Vec<Person> = writer
            .read_records(&header, vec![good.clone()])
            .expect("good row");
        assert_eq!(read[0].office_address.town, "d");

        let err = writer
            .read_records::<Person, _>(&header, vec![good, bad])
            .unwrap_err();
        assert!(matches!(
            err,
            RowError::Value {
                ref column,
                source: ValueError::TypeMismatch { .. }
            } if column == "Home.Street"
        ));

        let err = writer
            .read_records::<Person, _>(&header, vec![vec![text("short")]])
            .unwrap_err();
        assert!(matches!(err, RowError::RowWidth { row: 0, expected: 6, found: 1 }));
    }

    #[test]
    fn buffer_enforces_header_first_and_row_width() {
        let mut buffer = RowBuffer::new();
        assert!(matches!(
            buffer.write_row(vec![Value::Null]),
            Err(SinkError::HeaderMissing)
        ));
        let header = [HeaderField {
            name: "A".into(),
            scalar_type: ScalarType::Int,
        }];
        buffer.write_header(&header).expect("header");
        assert!(matches!(
            buffer.write_header(&header),
            Err(SinkError::HeaderRewritten)
        ));
        assert!(matches!(
            buffer.write_row(vec![]),
            Err(SinkError::RowWidth { expected: 1, found: 0 })
        ));
    }

    #[test]
    fn channel_sink_streams_to_another_thread() {
        let registry = registry(MapperConfig::default());
        let (mut sink, receiver) = ChannelSink::bounded(1);
        let consumer = std::thread::spawn(move || RowBuffer::drain(&receiver));
        RowWriter::new(&registry)
            .write_records(&mut sink, &people())
            .expect("write");
        drop(sink);
        let buffer = consumer.join().expect("consumer thread").expect("drain");
        assert_eq!(buffer.rows().len(), 2);
        assert_eq!(buffer.rows()[0][0], Value::Text("Jon".into()));
    }

    #[test]
    fn channel_sink_reports_a_dropped_receiver() {
        let (mut sink, receiver) = ChannelSink::unbounded();
        drop(receiver);
        assert!(matches!(
            sink.write_header(&[]),
            Err(SinkError::Disconnected)
        ));
    }
}
