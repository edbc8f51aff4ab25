use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;

use crate::auto::AutoMapper;
use crate::definition::MappingDefinition;
use crate::descriptor::{FieldKind, Record, TypeDescriptor};
use crate::error::MappingError;
use crate::layout::FieldLayout;

type BuildFn<T> =
    Arc<dyn Fn(&mut AutoMapper<'_>) -> Result<FieldLayout<T>, MappingError> + Send + Sync>;

fn build_fn<T, F>(f: F) -> BuildFn<T>
where
    F: Fn(&mut AutoMapper<'_>) -> Result<FieldLayout<T>, MappingError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A child definition bound to one nested field of `T`, with its prefix.
pub struct ReferenceOverride<T> {
    field: &'static str,
    child: &'static str,
    prefix: String,
    build: BuildFn<T>,
}

impl<T> ReferenceOverride<T> {
    pub fn field(&self) -> &'static str {
        self.field
    }

    /// Record name of the child definition.
    pub fn child(&self) -> &'static str {
        self.child
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Child layout, prefixed and lifted onto `T`.
    pub fn build(&self, mapper: &mut AutoMapper<'_>) -> Result<FieldLayout<T>, MappingError> {
        (self.build)(mapper)
    }
}

impl<T> Clone for ReferenceOverride<T> {
    fn clone(&self) -> Self {
        Self {
            field: self.field,
            child: self.child,
            prefix: self.prefix.clone(),
            build: Arc::clone(&self.build),
        }
    }
}

impl<T> fmt::Debug for ReferenceOverride<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceOverride")
            .field("field", &self.field)
            .field("child", &self.child)
            .field("prefix", &self.prefix)
            .finish()
    }
}

/// Nested-field overrides of one parent mapping, keyed by field identifier.
///
/// Keys are unordered; where an override lands in the parent layout is
/// decided by the parent's declared field order.
pub struct ReferenceOverrideTable<T> {
    entries: AHashMap<&'static str, ReferenceOverride<T>>,
}

impl<T: Record> ReferenceOverrideTable<T> {
    pub fn new() -> Self {
        Self {
            entries: AHashMap::new(),
        }
    }

    /// Binds `definition`, parameterized with `prefix`, to the nested field
    /// `field` of `T`.
    pub fn insert<C, D>(
        &mut self,
        descriptor: &TypeDescriptor<T>,
        field: &str,
        definition: D,
        prefix: String,
    ) -> Result<(), MappingError>
    where
        C: Record,
        D: MappingDefinition<C> + 'static,
    {
        let target = descriptor.require(field)?;
        let ident = target.ident();
        let FieldKind::Nested(binding) = target.kind() else {
            return Err(MappingError::NotNestedField {
                record: descriptor.name(),
                field: ident,
            });
        };
        let lens = binding
            .lens::<C>()
            .ok_or(MappingError::ChildTypeMismatch {
                record: descriptor.name(),
                field: ident,
                expected: binding.child_name(),
                found: C::NAME,
            })?;
        if prefix.is_empty() {
            return Err(MappingError::InvalidPrefix {
                record: C::NAME,
                prefix,
            });
        }
        if self.entries.contains_key(ident) {
            return Err(MappingError::DuplicateOverride {
                record: descriptor.name(),
                field: ident,
            });
        }

        let child_prefix = prefix.clone();
        let build = build_fn(move |mapper| {
            let child = definition.build(Some(&child_prefix), mapper)?;
            Ok(lens.lift(ident, &child))
        });
        self.entries.insert(
            ident,
            ReferenceOverride {
                field: ident,
                child: C::NAME,
                prefix,
                build,
            },
        );
        Ok(())
    }

    pub fn get(&self, field: &str) -> Option<&ReferenceOverride<T>> {
        self.entries.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.entries.contains_key(field)
    }

    pub fn remove(&mut self, field: &str) -> Option<ReferenceOverride<T>> {
        self.entries.remove(field)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReferenceOverride<T>> + '_ {
        self.entries.values()
    }
}

impl<T: Record> Default for ReferenceOverrideTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for ReferenceOverrideTable<T> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<T> fmt::Debug for ReferenceOverrideTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapperConfig;
    use crate::definition::ClassMap;
    use crate::testing::{address_map, Address, Contact, Person};

    #[test]
    fn rejects_unknown_and_scalar_fields() {
        let descriptor = Person::descriptor();
        let mut table = ReferenceOverrideTable::new();
        assert!(matches!(
            table.insert(&descriptor, "work_address", address_map(), "Work".into()),
            Err(MappingError::UnknownField { .. })
        ));
        assert_eq!(
            table.insert(&descriptor, "name", address_map(), "Name".into()),
            Err(MappingError::NotNestedField {
                record: "Person",
                field: "name"
            })
        );
        assert!(table.is_empty());
    }

    #[test]
    fn rejects_definitions_for_another_record() {
        let descriptor = Person::descriptor();
        let mut table = ReferenceOverrideTable::new();
        assert_eq!(
            table.insert(
                &descriptor,
                "home_address",
                ClassMap::<Contact>::auto(),
                "Home".into()
            ),
            Err(MappingError::ChildTypeMismatch {
                record: "Person",
                field: "home_address",
                expected: "Address",
                found: "Contact",
            })
        );
    }

    #[test]
    fn second_override_for_a_field_fails_loudly() {
        let descriptor = Person::descriptor();
        let mut table = ReferenceOverrideTable::new();
        table
            .insert(&descriptor, "home_address", address_map(), "Home".into())
            .expect("first override");
        assert_eq!(
            table.insert(&descriptor, "home_address", address_map(), "Office".into()),
            Err(MappingError::DuplicateOverride {
                record: "Person",
                field: "home_address"
            })
        );
        assert_eq!(table.get("home_address").map(|o| o.prefix()), Some("Home"));
    }

    #[test]
    fn empty_prefix_is_invalid() {
        let descriptor = Person::descriptor();
        let mut table = ReferenceOverrideTable::new();
        assert!(matches!(
            table.insert(&descriptor, "home_address", address_map(), String::new()),
            Err(MappingError::InvalidPrefix { record: "Address", .. })
        ));
    }

    #[test]
    fn built_override_is_prefixed_and_lifted() {
        let descriptor = Person::descriptor();
        let mut table = ReferenceOverrideTable::new();
        table
            .insert(&descriptor, "office_address", address_map(), "Office".into())
            .expect("override");
        let config = MapperConfig::default();
        let mut mapper = AutoMapper::new(&config);
        let layout = table
            .get("office_address")
            .expect("entry")
            .build(&mut mapper)
            .expect("build");
        assert_eq!(layout.names().collect::<Vec<_>>(), ["Office.Street", "Office.Town"]);
        assert_eq!(layout.columns()[1].path(), ["office_address", "town"]);

        let person = Person {
            office_address: Address {
                street: "Farm track".into(),
                town: "Worcester".into(),
            },
            ..Person::default()
        };
        assert_eq!(
            layout.columns()[0].read(&person),
            crate::Value::Text("Farm track".into())
        );
    }

    #[test]
    fn remove_and_clear_drop_entries() {
        let descriptor = Person::descriptor();
        let mut table = ReferenceOverrideTable::new();
        table
            .insert(&descriptor, "home_address", address_map(), "Home".into())
            .expect("home");
        table
            .insert(&descriptor, "office_address", address_map(), "Office".into())
            .expect("office");
        assert_eq!(table.len(), 2);
        assert!(table.remove("home_address").is_some());
        assert!(!table.contains("home_address"));
        table.clear();
        assert!(table.is_empty());
    }
}
