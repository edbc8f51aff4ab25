mod log;

use std::fs::File;
use std::io::{BufWriter, Write};

use anyhow::Context;
use record_flatten::{
    chunk_rows, record, write_parquet, ArrowSink, ClassMap, MapperConfig, MappingRegistry,
    RowWriter,
};
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq)]
struct Address {
    street: String,
    town: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Person {
    name: String,
    home_address: Address,
    office_address: Address,
}

record! {
    Address {
        "Street" => street: scalar String,
        "Town" => town: scalar String,
    }
}

record! {
    Person {
        "Name" => name: scalar String,
        "HomeAddress" => home_address: nested Address,
        "OfficeAddress" => office_address: nested Address,
    }
}

fn address(street: &str, town: &str) -> Address {
    Address {
        street: street.to_string(),
        town: town.to_string(),
    }
}

fn address_map() -> anyhow::Result<ClassMap<Address>> {
    Ok(ClassMap::new().map("street", "Street")?.map("town", "Town")?)
}

fn main() -> anyhow::Result<()> {
    let log_dir = std::env::var("RECORD_FLATTEN_LOG_DIR").ok();
    let _guard = log::init_tracing(log_dir.as_deref());

    let output = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "people.parquet".to_string());
    let config = MapperConfig::load("record_flatten").context("loading mapper config")?;

    let people = vec![
        Person {
            name: "Jon".into(),
            home_address: address("Downing St", "London"),
            office_address: address("Farm track", "Worcester"),
        },
        Person {
            name: "Paul".into(),
            home_address: address("Pleasant Drive", "York"),
            office_address: address("Village Way", "New York"),
        },
    ];

    let mut registry = MappingRegistry::new(config)?;
    let person_map = ClassMap::<Person>::auto()
        .clear_references()
        .reference("home_address", address_map()?, "Home")?
        .reference("office_address", address_map()?, "Office")?;
    let layout = registry.register(&person_map)?;
    info!(columns = ?layout.names().collect::<Vec<_>>(), "person layout");

    let writer = RowWriter::new(&registry);
    let mut sink = ArrowSink::new();
    writer.write_records(&mut sink, &people)?;
    let (schema, chunk) = sink.finish()?;

    let (header, rows) = chunk_rows(&schema, &chunk)?;
    let file = File::create(&output).with_context(|| format!("creating {output}"))?;
    let mut out = BufWriter::new(file);
    let bytes = write_parquet(&schema, chunk, &mut out)?;
    out.flush()?;
    info!(path = %output, bytes, rows = people.len(), "parquet written");

    let back: Vec<Person> = writer.read_records(&header, rows)?;
    for person in &back {
        info!(?person, "read back");
    }
    anyhow::ensure!(back == people, "records changed on the way through the chunk");
    Ok(())
}
