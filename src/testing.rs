//! Record fixtures shared by the unit tests.

use crate::definition::ClassMap;
use crate::record;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Address {
    pub street: String,
    pub town: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Person {
    pub name: String,
    pub home_address: Address,
    pub office_address: Address,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Contact {
    pub email: String,
    pub postal: Option<Address>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Node {
    pub label: String,
    pub next: Option<Box<Node>>,
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

record! {
    Contact {
        "Email" => email: scalar String,
        "Postal" => postal: optional Address,
        "Tags" => tags: unsupported,
    }
}

record! {
    Node {
        "Label" => label: scalar String,
        "Next" => next: boxed Node,
    }
}

pub fn address_map() -> ClassMap<Address> {
    ClassMap::new()
        .map("street", "Street")
        .and_then(|m| m.map("town", "Town"))
        .expect("address map")
}

fn person(name: &str, home: (&str, &str), office: (&str, &str)) -> Person {
    Person {
        name: name.to_string(),
        home_address: Address {
            street: home.0.to_string(),
            town: home.1.to_string(),
        },
        office_address: Address {
            street: office.0.to_string(),
            town: office.1.to_string(),
        },
    }
}

pub fn people() -> Vec<Person> {
    vec![
        person("Jon", ("Downing St", "London"), ("Farm track", "Worcester")),
        person("Paul", ("Pleasant Drive", "York"), ("Village Way", "New York")),
    ]
}
