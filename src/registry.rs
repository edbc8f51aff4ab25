use std::any::{Any, TypeId};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ahash::AHashMap;
use config::ConfigError;
use tracing::debug;

use crate::auto::AutoMapper;
use crate::config::MapperConfig;
use crate::definition::MappingDefinition;
use crate::descriptor::Record;
use crate::error::MappingError;
use crate::layout::FieldLayout;

/// Identifies one serialization session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey(u64);

impl SessionKey {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        SessionKey(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session {}", self.0)
    }
}

struct Registered {
    record: &'static str,
    /// Always an `Arc<FieldLayout<T>>` for the keyed record type.
    layout: Arc<dyn Any + Send + Sync>,
}

/// Layouts in use by one session, keyed by root record type.
///
/// A registry is the session: it owns its [`SessionKey`] and every layout
/// registered through it, and dropping it ends the session. Nothing is
/// shared between registries except the immutable auto-layout cache.
pub struct MappingRegistry {
    session: SessionKey,
    config: MapperConfig,
    layouts: AHashMap<TypeId, Registered>,
}

impl MappingRegistry {
    /// Opens a session. Fails if `config` does not validate, so a
    /// hand-built config gets the same checks as a loaded one.
    pub fn new(config: MapperConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let session = SessionKey::next();
        debug!(%session, "mapping session opened");
        Ok(Self {
            session,
            config,
            layouts: AHashMap::new(),
        })
    }

    pub fn session(&self) -> SessionKey {
        self.session
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    /// Resolves `definition` and makes it the layout of `T` for this
    /// session, replacing any earlier registration. On error the registry is
    /// left unchanged.
    pub fn register<T, D>(&mut self, definition: &D) -> Result<Arc<FieldLayout<T>>, MappingError>
    where
        T: Record,
        D: MappingDefinition<T> + ?Sized,
    {
        let mut mapper = AutoMapper::new(&self.config);
        let layout = Arc::new(definition.build(None, &mut mapper)?);
        let previous = self.layouts.insert(
            TypeId::of::<T>(),
            Registered {
                record: T::NAME,
                layout: Arc::clone(&layout) as Arc<dyn Any + Send + Sync>,
            },
        );
        if previous.is_some() {
            debug!(session = %self.session, record = T::NAME, columns = layout.len(), "mapping replaced");
        } else {
            debug!(session = %self.session, record = T::NAME, columns = layout.len(), "mapping registered");
        }
        Ok(layout)
    }

    pub fn resolve<T: Record>(&self) -> Result<Arc<FieldLayout<T>>, MappingError> {
        self.layouts
            .get(&TypeId::of::<T>())
            .and_then(|entry| Arc::clone(&entry.layout).downcast::<FieldLayout<T>>().ok())
            .ok_or(MappingError::UnresolvedMapping {
                session: self.session,
                record: T::NAME,
            })
    }

    pub fn contains<T: Record>(&self) -> bool {
        self.layouts.contains_key(&TypeId::of::<T>())
    }

    /// Forgets the layout of `T`; returns whether one was registered.
    pub fn unregister<T: Record>(&mut self) -> bool {
        self.layouts.remove(&TypeId::of::<T>()).is_some()
    }

    /// Names of the registered root records, sorted.
    pub fn records(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.layouts.values().map(|r| r.record).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }
}

impl Drop for MappingRegistry {
    fn drop(&mut self) {
        debug!(session = %self.session, layouts = self.layouts.len(), "mapping session closed");
    }
}

impl fmt::Debug for MappingRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingRegistry")
            .field("session", &self.session)
            .field("records", &self.records())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::ClassMap;
    use crate::testing::{address_map, Address, Person};

    fn people_map() -> ClassMap<Person> {
        ClassMap::auto()
            .reference("home_address", address_map(), "Home")
            .and_then(|m| m.reference("office_address", address_map(), "Office"))
            .expect("people map")
    }

    #[test]
    fn empty_separator_does_not_open_a_session() {
        let config = MapperConfig::default().with_separator("");
        assert!(matches!(
            MappingRegistry::new(config),
            Err(ConfigError::Message(_))
        ));
    }

    #[test]
    fn resolve_before_register_is_unresolved() {
        let registry = MappingRegistry::new(MapperConfig::default()).expect("valid config");
        assert_eq!(
            registry.resolve::<Person>(),
            Err(MappingError::UnresolvedMapping {
                session: registry.session(),
                record: "Person",
            })
        );
    }

    #[test]
    fn resolving_twice_gives_identical_layouts() {
        let mut registry = MappingRegistry::new(MapperConfig::default()).expect("valid config");
        registry.register(&people_map()).expect("register");
        let first = registry.resolve::<Person>().expect("first");
        let second = registry.resolve::<Person>().expect("second");
        assert_eq!(first, second);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn re_registration_replaces_the_layout() {
        let mut registry = MappingRegistry::new(MapperConfig::default()).expect("valid config");
        registry.register(&ClassMap::<Person>::auto()).expect("auto");
        registry.register(&people_map()).expect("prefixed");
        let layout = registry.resolve::<Person>().expect("layout");
        assert_eq!(layout.columns()[1].name(), "Home.Street");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn failed_registration_keeps_the_previous_entry() {
        let mut registry = MappingRegistry::new(MapperConfig::default()).expect("valid config");
        registry.register(&people_map()).expect("prefixed");
        let clashing = ClassMap::<Person>::auto()
            .reference("home_address", address_map(), "Same")
            .and_then(|m| m.reference("office_address", address_map(), "Same"))
            .expect("definition");
        assert!(matches!(
            registry.register(&clashing),
            Err(MappingError::ColumnNameConflict { .. })
        ));
        let layout = registry.resolve::<Person>().expect("still registered");
        assert_eq!(layout.columns()[3].name(), "Office.Street");
    }

    #[test]
    fn sessions_do_not_see_each_other() {
        let mut plain = MappingRegistry::new(MapperConfig::default()).expect("valid config");
        let mut prefixed = MappingRegistry::new(MapperConfig::default()).expect("valid config");
        assert_ne!(plain.session(), prefixed.session());

        plain.register(&ClassMap::<Person>::auto()).expect("plain");
        prefixed.register(&people_map()).expect("prefixed");
        assert_ne!(
            plain.resolve::<Person>().expect("plain"),
            prefixed.resolve::<Person>().expect("prefixed")
        );
        assert!(!plain.contains::<Address>());

        prefixed.register(&address_map()).expect("address");
        assert!(prefixed.contains::<Address>());
        assert!(!plain.contains::<Address>());
        assert_eq!(prefixed.records(), ["Address", "Person"]);
    }

    #[test]
    fn unregister_forgets_the_layout() {
        let mut registry = MappingRegistry::new(MapperConfig::default()).expect("valid config");
        registry.register(&address_map()).expect("address");
        assert!(registry.unregister::<Address>());
        assert!(!registry.unregister::<Address>());
        assert!(registry.is_empty());
    }
}
