//! Field descriptors: the compile-time description of a record's shape.
//!
//! A record type lists its fields once, in declaration order, through the
//! [`record!`](crate::record) macro. Mapping definitions only ever look at
//! these descriptors; there is no runtime reflection.

use std::any::{Any, TypeId};
use std::sync::Arc;

use crate::auto::AutoMapper;
use crate::error::MappingError;
use crate::layout::{Column, FieldLayout, ReadFn, WriteFn};
use crate::value::{Scalar, ScalarType, Value};

/// A record type that can be flattened into rows.
pub trait Record: Sized + Send + Sync + 'static {
    /// Name used in error messages and logs.
    const NAME: &'static str;

    fn descriptor() -> TypeDescriptor<Self>;
}

/// Ordered field list of one record type.
pub struct TypeDescriptor<T> {
    name: &'static str,
    fields: Vec<FieldDescriptor<T>>,
}

impl<T: Record> TypeDescriptor<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            fields: Vec::new(),
        }
    }

    pub fn with(mut self, field: FieldDescriptor<T>) -> Self {
        self.fields.push(field);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn fields(&self) -> &[FieldDescriptor<T>] {
        &self.fields
    }

    pub fn field(&self, ident: &str) -> Option<&FieldDescriptor<T>> {
        self.fields.iter().find(|f| f.ident == ident)
    }

    /// Looks a field up, failing with [`MappingError::UnknownField`].
    pub(crate) fn require(&self, ident: &str) -> Result<&FieldDescriptor<T>, MappingError> {
        self.field(ident).ok_or_else(|| MappingError::UnknownField {
            record: self.name,
            field: ident.to_string(),
        })
    }
}

/// One field of a record: its Rust identifier, its default column name and
/// how it is accessed.
pub struct FieldDescriptor<T> {
    ident: &'static str,
    name: &'static str,
    kind: FieldKind<T>,
}

pub enum FieldKind<T> {
    Scalar(ScalarBinding<T>),
    Nested(NestedBinding<T>),
    /// Collections, unions and anything else without a column shape.
    Unsupported,
}

impl<T: Record> FieldDescriptor<T> {
    pub fn scalar<S: Scalar>(
        ident: &'static str,
        name: &'static str,
        get: fn(&T) -> &S,
        get_mut: fn(&mut T) -> &mut S,
    ) -> Self {
        let read: ReadFn<T> = Arc::new(move |record: &T| get(record).to_value());
        let write: WriteFn<T> = Arc::new(move |record: &mut T, value: Value| {
            *get_mut(record) = S::from_value(value)?;
            Ok(())
        });
        Self {
            ident,
            name,
            kind: FieldKind::Scalar(ScalarBinding {
                scalar_type: S::TYPE,
                read,
                write,
            }),
        }
    }

    /// A nested record that is always present.
    pub fn nested<C: Record>(
        ident: &'static str,
        name: &'static str,
        get: fn(&T) -> &C,
        get_mut: fn(&mut T) -> &mut C,
    ) -> Self {
        let lens = Lens::new(move |record: &T| Some(get(record)), get_mut);
        Self::from_lens(ident, name, lens)
    }

    /// A nested record behind an `Option`. Absent records read as nulls; a
    /// row with values for it materializes `C::default()` before writing.
    pub fn optional<C: Record + Default>(
        ident: &'static str,
        name: &'static str,
        get: fn(&T) -> &Option<C>,
        get_mut: fn(&mut T) -> &mut Option<C>,
    ) -> Self {
        let lens = Lens::new(
            move |record: &T| get(record).as_ref(),
            move |record: &mut T| get_mut(record).get_or_insert_with(C::default),
        );
        Self::from_lens(ident, name, lens)
    }

    /// A boxed optional child, the shape self-referencing records take.
    pub fn boxed<C: Record + Default>(
        ident: &'static str,
        name: &'static str,
        get: fn(&T) -> &Option<Box<C>>,
        get_mut: fn(&mut T) -> &mut Option<Box<C>>,
    ) -> Self {
        let lens = Lens::new(
            move |record: &T| get(record).as_deref(),
            move |record: &mut T| &mut **get_mut(record).get_or_insert_with(|| Box::new(C::default())),
        );
        Self::from_lens(ident, name, lens)
    }

    pub fn unsupported(ident: &'static str, name: &'static str) -> Self {
        Self {
            ident,
            name,
            kind: FieldKind::Unsupported,
        }
    }

    fn from_lens<C: Record>(ident: &'static str, name: &'static str, lens: Lens<T, C>) -> Self {
        let lens = Arc::new(lens);
        let auto_lens = Arc::clone(&lens);
        let auto = auto_fn(move |mapper, prefix| {
            let child = mapper.map::<C>()?;
            let prefixed = child.prefixed(prefix, mapper.separator());
            Ok(auto_lens.lift(ident, &prefixed))
        });
        Self {
            ident,
            name,
            kind: FieldKind::Nested(NestedBinding {
                child_type: TypeId::of::<C>(),
                child_name: C::NAME,
                lens,
                auto,
            }),
        }
    }

    pub fn ident(&self) -> &'static str {
        self.ident
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> &FieldKind<T> {
        &self.kind
    }
}

pub struct ScalarBinding<T> {
    scalar_type: ScalarType,
    read: ReadFn<T>,
    write: WriteFn<T>,
}

impl<T> ScalarBinding<T> {
    pub fn scalar_type(&self) -> ScalarType {
        self.scalar_type
    }

    pub(crate) fn column(&self, name: String, ident: &'static str) -> Column<T> {
        Column::new(
            name,
            vec![ident],
            self.scalar_type,
            Arc::clone(&self.read),
            Arc::clone(&self.write),
        )
    }
}

type AutoFn<T> = Arc<
    dyn Fn(&mut AutoMapper<'_>, &str) -> Result<FieldLayout<T>, MappingError> + Send + Sync,
>;

fn auto_fn<T, F>(f: F) -> AutoFn<T>
where
    F: Fn(&mut AutoMapper<'_>, &str) -> Result<FieldLayout<T>, MappingError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

pub struct NestedBinding<T> {
    child_type: TypeId,
    child_name: &'static str,
    /// Always a `Lens<T, C>` for the child type `C`.
    lens: Arc<dyn Any + Send + Sync>,
    auto: AutoFn<T>,
}

impl<T: Record> NestedBinding<T> {
    pub fn child_type(&self) -> TypeId {
        self.child_type
    }

    pub fn child_name(&self) -> &'static str {
        self.child_name
    }

    /// The accessor pair for this field, if the child really is a `C`.
    pub(crate) fn lens<C: Record>(&self) -> Option<Arc<Lens<T, C>>> {
        Arc::clone(&self.lens).downcast::<Lens<T, C>>().ok()
    }

    /// Auto-derived sub-layout, with every column prefixed by `prefix`.
    pub(crate) fn auto_layout(
        &self,
        mapper: &mut AutoMapper<'_>,
        prefix: &str,
    ) -> Result<FieldLayout<T>, MappingError> {
        (self.auto)(mapper, prefix)
    }
}

type GetFn<P, C> = Arc<dyn Fn(&P) -> Option<&C> + Send + Sync>;
type GetMutFn<P, C> = Arc<dyn Fn(&mut P) -> &mut C + Send + Sync>;

/// Reaches a child record `C` inside a parent `P`.
pub(crate) struct Lens<P, C> {
    get: GetFn<P, C>,
    get_mut: GetMutFn<P, C>,
}

impl<P: 'static, C: 'static> Lens<P, C> {
    fn new<G, M>(get: G, get_mut: M) -> Self
    where
        G: Fn(&P) -> Option<&C> + Send + Sync + 'static,
        M: Fn(&mut P) -> &mut C + Send + Sync + 'static,
    {
        Self {
            get: Arc::new(get),
            get_mut: Arc::new(get_mut),
        }
    }

    /// Re-roots a child layout onto the parent. Names are kept as they are;
    /// field paths gain `field` in front.
    pub(crate) fn lift(&self, field: &'static str, child: &FieldLayout<C>) -> FieldLayout<P> {
        let columns = child
            .columns()
            .iter()
            .map(|column| {
                let get = Arc::clone(&self.get);
                let inner = column.clone();
                let read: ReadFn<P> = Arc::new(move |parent: &P| match get(parent) {
                    Some(child) => inner.read(child),
                    None => Value::Null,
                });

                let get = Arc::clone(&self.get);
                let get_mut = Arc::clone(&self.get_mut);
                let inner = column.clone();
                let write: WriteFn<P> = Arc::new(move |parent: &mut P, value: Value| {
                    // nulls must not materialize an absent optional child
                    if value.is_null() && get(&*parent).is_none() {
                        return Ok(());
                    }
                    inner.write(get_mut(parent), value)
                });

                let mut path = Vec::with_capacity(column.path().len() + 1);
                path.push(field);
                path.extend_from_slice(column.path());
                Column::new(
                    column.name().to_string(),
                    path,
                    column.scalar_type(),
                    read,
                    write,
                )
            })
            .collect();
        FieldLayout::from_unique(columns)
    }
}

/// Implements [`Record`] for a struct by listing its fields in order.
///
/// ```
/// use record_flatten::record;
///
/// #[derive(Default)]
/// struct Address {
///     street: String,
///     town: String,
/// }
///
/// #[derive(Default)]
/// struct Person {
///     name: String,
///     home_address: Address,
///     previous_address: Option<Address>,
///     nicknames: Vec<String>,
/// }
///
/// record! {
///     Address {
///         "Street" => street: scalar String,
///         "Town" => town: scalar String,
///     }
/// }
///
/// record! {
///     Person {
///         "Name" => name: scalar String,
///         "HomeAddress" => home_address: nested Address,
///         "PreviousAddress" => previous_address: optional Address,
///         "Nicknames" => nicknames: unsupported,
///     }
/// }
/// ```
#[macro_export]
macro_rules! record {
    (@field $record:ident, $name:literal, $field:ident, scalar, $inner:ty) => {
        $crate::FieldDescriptor::<$record>::scalar::<$inner>(
            stringify!($field),
            $name,
            |r: &$record| &r.$field,
            |r: &mut $record| &mut r.$field,
        )
    };
    (@field $record:ident, $name:literal, $field:ident, nested, $inner:ty) => {
        $crate::FieldDescriptor::<$record>::nested::<$inner>(
            stringify!($field),
            $name,
            |r: &$record| &r.$field,
            |r: &mut $record| &mut r.$field,
        )
    };
    (@field $record:ident, $name:literal, $field:ident, optional, $inner:ty) => {
        $crate::FieldDescriptor::<$record>::optional::<$inner>(
            stringify!($field),
            $name,
            |r: &$record| &r.$field,
            |r: &mut $record| &mut r.$field,
        )
    };
    (@field $record:ident, $name:literal, $field:ident, boxed, $inner:ty) => {
        $crate::FieldDescriptor::<$record>::boxed::<$inner>(
            stringify!($field),
            $name,
            |r: &$record| &r.$field,
            |r: &mut $record| &mut r.$field,
        )
    };
    (@field $record:ident, $name:literal, $field:ident, unsupported) => {
        $crate::FieldDescriptor::<$record>::unsupported(stringify!($field), $name)
    };
    ($record:ident { $($name:literal => $field:ident : $kind:ident $($inner:ty)?),* $(,)? }) => {
        impl $crate::Record for $record {
            const NAME: &'static str = stringify!($record);

            fn descriptor() -> $crate::TypeDescriptor<Self> {
                $crate::TypeDescriptor::new(<Self as $crate::Record>::NAME)
                    $(.with($crate::record!(@field $record, $name, $field, $kind $(, $inner)?)))*
            }
        }
    };
}
