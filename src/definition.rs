use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;
use tracing::warn;

use crate::auto::AutoMapper;
use crate::config::UnsupportedFieldPolicy;
use crate::descriptor::{FieldKind, Record};
use crate::error::MappingError;
use crate::layout::FieldLayout;
use crate::overrides::ReferenceOverrideTable;

/// A recipe producing the column layout of `T`.
///
/// Implementors only describe the unprefixed layout; [`build`] applies the
/// parameterization so that every produced name carries the prefix.
///
/// [`build`]: MappingDefinition::build
pub trait MappingDefinition<T: Record>: Send + Sync {
    fn layout(&self, mapper: &mut AutoMapper<'_>) -> Result<FieldLayout<T>, MappingError>;

    fn build(
        &self,
        prefix: Option<&str>,
        mapper: &mut AutoMapper<'_>,
    ) -> Result<FieldLayout<T>, MappingError> {
        if prefix == Some("") {
            return Err(MappingError::InvalidPrefix {
                record: T::NAME,
                prefix: String::new(),
            });
        }
        let layout = self.layout(mapper)?;
        Ok(match prefix {
            Some(prefix) => layout.prefixed(prefix, mapper.separator()),
            None => layout,
        })
    }
}

impl<T: Record, D: MappingDefinition<T> + ?Sized> MappingDefinition<T> for Arc<D> {
    fn layout(&self, mapper: &mut AutoMapper<'_>) -> Result<FieldLayout<T>, MappingError> {
        (**self).layout(mapper)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum MemberMap {
    Named(String),
    Ignored,
}

/// Configurable mapping for one record type.
///
/// `ClassMap::auto()` starts from the derived layout and lets single members
/// be renamed, ignored or replaced; `ClassMap::new()` emits only what is
/// configured. Either way columns follow the declared field order.
pub struct ClassMap<T: Record> {
    auto: bool,
    members: AHashMap<&'static str, MemberMap>,
    references: ReferenceOverrideTable<T>,
}

impl<T: Record> ClassMap<T> {
    /// Explicit map with no columns yet.
    pub fn new() -> Self {
        Self {
            auto: false,
            members: AHashMap::new(),
            references: ReferenceOverrideTable::new(),
        }
    }

    /// Map seeded with the auto-derived layout.
    pub fn auto() -> Self {
        Self {
            auto: true,
            ..Self::new()
        }
    }

    pub fn is_auto(&self) -> bool {
        self.auto
    }

    /// Emits scalar field `field` under `column`.
    pub fn map(mut self, field: &str, column: impl Into<String>) -> Result<Self, MappingError> {
        let descriptor = T::descriptor();
        let target = descriptor.require(field)?;
        if !matches!(target.kind(), FieldKind::Scalar(_)) {
            return Err(MappingError::NotScalarField {
                record: T::NAME,
                field: target.ident(),
            });
        }
        self.configure(target.ident(), MemberMap::Named(column.into()))?;
        Ok(self)
    }

    /// Leaves `field` out of the layout. This is the way to accept an
    /// unsupported field on an auto map.
    pub fn ignore(mut self, field: &str) -> Result<Self, MappingError> {
        let descriptor = T::descriptor();
        let ident = descriptor.require(field)?.ident();
        if self.references.contains(ident) {
            return Err(MappingError::DuplicateMember {
                record: T::NAME,
                field: ident,
            });
        }
        self.configure(ident, MemberMap::Ignored)?;
        Ok(self)
    }

    /// Expands nested field `field` with `definition`, every column prefixed
    /// by `prefix`.
    pub fn reference<C, D>(
        mut self,
        field: &str,
        definition: D,
        prefix: impl Into<String>,
    ) -> Result<Self, MappingError>
    where
        C: Record,
        D: MappingDefinition<C> + 'static,
    {
        let descriptor = T::descriptor();
        if let Some(ident) = descriptor.field(field).map(|f| f.ident()) {
            if self.members.contains_key(ident) {
                return Err(MappingError::DuplicateMember {
                    record: T::NAME,
                    field: ident,
                });
            }
        }
        self.references
            .insert(&descriptor, field, definition, prefix.into())?;
        Ok(self)
    }

    pub fn references(&self) -> &ReferenceOverrideTable<T> {
        &self.references
    }

    /// Drops every reference override, falling back to the derived
    /// sub-layouts (auto maps) or to nothing (explicit maps).
    pub fn clear_references(mut self) -> Self {
        self.references.clear();
        self
    }

    fn configure(&mut self, ident: &'static str, member: MemberMap) -> Result<(), MappingError> {
        if self.members.contains_key(ident) {
            return Err(MappingError::DuplicateMember {
                record: T::NAME,
                field: ident,
            });
        }
        self.members.insert(ident, member);
        Ok(())
    }
}

impl<T: Record> MappingDefinition<T> for ClassMap<T> {
    fn layout(&self, mapper: &mut AutoMapper<'_>) -> Result<FieldLayout<T>, MappingError> {
        let descriptor = T::descriptor();
        let mut layout = FieldLayout::new();

        for field in descriptor.fields() {
            let member = self.members.get(field.ident());
            if member == Some(&MemberMap::Ignored) {
                continue;
            }
            match field.kind() {
                FieldKind::Scalar(binding) => {
                    let name = match member {
                        Some(MemberMap::Named(name)) => name.clone(),
                        _ if self.auto => field.name().to_string(),
                        _ => continue,
                    };
                    layout.push(binding.column(name, field.ident()))?;
                }
                FieldKind::Nested(binding) => {
                    let sub = match self.references.get(field.ident()) {
                        Some(reference) => reference.build(mapper)?,
                        None if self.auto => binding.auto_layout(mapper, field.name())?,
                        None => continue,
                    };
                    layout.merge(sub)?;
                }
                FieldKind::Unsupported if self.auto => match mapper.config().unsupported_fields {
                    UnsupportedFieldPolicy::Error => {
                        return Err(MappingError::UnsupportedFieldKind {
                            record: descriptor.name(),
                            field: field.ident(),
                        });
                    }
                    UnsupportedFieldPolicy::Skip => {
                        warn!(
                            record = descriptor.name(),
                            field = field.ident(),
                            "skipping field that cannot be flattened"
                        );
                    }
                },
                FieldKind::Unsupported => {}
            }
        }

        Ok(layout)
    }
}

impl<T: Record> Default for ClassMap<T> {
    fn default() -> Self {
        Self::auto()
    }
}

impl<T: Record> Clone for ClassMap<T> {
    fn clone(&self) -> Self {
        Self {
            auto: self.auto,
            members: self.members.clone(),
            references: self.references.clone(),
        }
    }
}

impl<T: Record> fmt::Debug for ClassMap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassMap")
            .field("record", &T::NAME)
            .field("auto", &self.auto)
            .field("members", &self.members)
            .field("references", &self.references)
            .finish()
    }
}
