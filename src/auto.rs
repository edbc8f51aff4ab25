//! Default layouts derived from field descriptors.
//!
//! Derived base layouts only depend on the record type and the naming
//! configuration, so they are built once per process and shared.

use std::any::{Any, TypeId};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use tracing::trace;

use crate::config::{MapperConfig, UnsupportedFieldPolicy};
use crate::definition::{ClassMap, MappingDefinition};
use crate::descriptor::Record;
use crate::error::MappingError;
use crate::layout::FieldLayout;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BaseKey {
    record: TypeId,
    separator: String,
    unsupported_fields: UnsupportedFieldPolicy,
}

type BaseLayouts = DashMap<BaseKey, Arc<dyn Any + Send + Sync>, ahash::RandomState>;

fn base_layouts() -> &'static BaseLayouts {
    static BASE_LAYOUTS: OnceLock<BaseLayouts> = OnceLock::new();
    BASE_LAYOUTS.get_or_init(|| DashMap::with_hasher(ahash::RandomState::new()))
}

/// Resolution context handed to every [`MappingDefinition`].
///
/// Carries the naming configuration and the chain of records currently being
/// auto-derived, which is how self-containing records are caught.
pub struct AutoMapper<'c> {
    config: &'c MapperConfig,
    active: Vec<TypeId>,
}

impl<'c> AutoMapper<'c> {
    pub fn new(config: &'c MapperConfig) -> Self {
        Self {
            config,
            active: Vec::new(),
        }
    }

    pub fn config(&self) -> &MapperConfig {
        self.config
    }

    pub fn separator(&self) -> &str {
        &self.config.separator
    }

    /// The derived layout of `T`: one column per scalar field in declared
    /// order, nested records expanded under their field name.
    pub fn map<T: Record>(&mut self) -> Result<Arc<FieldLayout<T>>, MappingError> {
        let record = TypeId::of::<T>();
        let key = BaseKey {
            record,
            separator: self.config.separator.clone(),
            unsupported_fields: self.config.unsupported_fields,
        };

        let cached = base_layouts().get(&key).map(|entry| Arc::clone(entry.value()));
        if let Some(layout) = cached.and_then(|hit| hit.downcast::<FieldLayout<T>>().ok()) {
            trace!(record = T::NAME, "auto layout cache hit");
            return Ok(layout);
        }

        if self.active.contains(&record) {
            return Err(MappingError::RecursiveType { record: T::NAME });
        }
        self.active.push(record);
        let built = ClassMap::<T>::auto().layout(self);
        self.active.pop();

        let layout = Arc::new(built?);
        trace!(record = T::NAME, columns = layout.len(), "auto layout built");
        // first insert wins; a concurrent build of the same key is equal
        let shared = {
            let entry = base_layouts()
                .entry(key)
                .or_insert_with(|| Arc::clone(&layout) as Arc<dyn Any + Send + Sync>);
            Arc::clone(entry.value())
        };
        Ok(shared.downcast::<FieldLayout<T>>().unwrap_or(layout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Address, Node, Person};
    use crate::value::ScalarType;

    #[test]
    fn scalar_only_record_maps_field_names_in_order() {
        let config = MapperConfig::default();
        let layout = AutoMapper::new(&config).map::<Address>().expect("layout");
        assert_eq!(layout.names().collect::<Vec<_>>(), ["Street", "Town"]);
        assert!(layout
            .columns()
            .iter()
            .all(|c| c.scalar_type() == ScalarType::Text));
    }

    #[test]
    fn nested_records_are_prefixed_with_the_field_name() {
        let config = MapperConfig::default();
        let layout = AutoMapper::new(&config).map::<Person>().expect("layout");
        assert_eq!(
            layout.names().collect::<Vec<_>>(),
            [
                "Name",
                "HomeAddress.Street",
                "HomeAddress.Town",
                "OfficeAddress.Street",
                "OfficeAddress.Town"
            ]
        );
        assert_eq!(layout.columns()[3].path(), ["office_address", "street"]);
    }

    #[test]
    fn separator_comes_from_config() {
        let config = MapperConfig::default().with_separator("_");
        let layout = AutoMapper::new(&config).map::<Person>().expect("layout");
        assert_eq!(layout.columns()[1].name(), "HomeAddress_Street");
    }

    #[test]
    fn cached_layouts_are_shared() {
        let config = MapperConfig::default();
        let first = AutoMapper::new(&config).map::<Address>().expect("first");
        let second = AutoMapper::new(&config).map::<Address>().expect("second");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn self_containing_records_are_rejected() {
        let config = MapperConfig::default();
        assert_eq!(
            AutoMapper::new(&config).map::<Node>(),
            Err(MappingError::RecursiveType { record: "Node" })
        );
    }
}
