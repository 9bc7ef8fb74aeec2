//! Destination description: how the decoder sees the object it is filling.
//!
//! Every decodable location implements [`Slot`]. A slot's declared shape is a
//! closed set ([`ShapeKind`]); the engine borrows the matching mutable view
//! through [`Slot::slot_mut`] and routes on it. Composites additionally carry
//! a `'static` descriptor ([`StructDef`]) with their tag table, so field
//! matching never executes destination code.

use core::any::{Any, TypeId, type_name};
use core::fmt;
use core::hash::Hash;
use std::collections::{BTreeMap, HashMap};

use crate::decode::{Context, ResolveError};

// ============================================================================
// Shapes and views
// ============================================================================

/// The declared shape of a destination slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    /// Terminal scalar (numbers, booleans, strings).
    Scalar,
    /// Composite with tagged fields.
    Struct,
    /// String-keyed mapping.
    Map,
    /// Ordered sequence, fixed or variable length.
    Seq,
    /// Lazily allocated indirection to a composite.
    Indirect,
    /// Open slot whose concrete type is resolved at decode time.
    Open,
}

impl ShapeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ShapeKind::Scalar => "scalar",
            ShapeKind::Struct => "struct",
            ShapeKind::Map => "mapping",
            ShapeKind::Seq => "sequence",
            ShapeKind::Indirect => "indirection",
            ShapeKind::Open => "open",
        }
    }
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A writable location in the destination object graph.
///
/// The two methods answer the two questions the engine ever asks: what shape
/// was declared here, and give me the matching mutable view.
pub trait Slot: Any {
    /// Declared shape, independent of any value about to be written.
    fn shape(&self) -> ShapeKind;

    /// Borrow the mutable view matching [`Slot::shape`].
    fn slot_mut(&mut self) -> SlotMut<'_>;
}

impl fmt::Debug for dyn Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} slot>", self.shape())
    }
}

/// Mutable view of a destination slot, one variant per [`ShapeKind`].
pub enum SlotMut<'a> {
    Scalar(ScalarMut<'a>),
    Struct(&'a mut dyn StructSlot),
    Map(&'a mut dyn MapSlot),
    Seq(&'a mut dyn SeqSlot),
    Indirect(&'a mut dyn IndirectSlot),
    Open(&'a mut Open),
}

impl SlotMut<'_> {
    pub fn kind(&self) -> ShapeKind {
        match self {
            SlotMut::Scalar(_) => ShapeKind::Scalar,
            SlotMut::Struct(_) => ShapeKind::Struct,
            SlotMut::Map(_) => ShapeKind::Map,
            SlotMut::Seq(_) => ShapeKind::Seq,
            SlotMut::Indirect(_) => ShapeKind::Indirect,
            SlotMut::Open(_) => ShapeKind::Open,
        }
    }
}

/// Writable scalar destination, one variant per supported primitive.
pub enum ScalarMut<'a> {
    Bool(&'a mut bool),
    I8(&'a mut i8),
    I16(&'a mut i16),
    I32(&'a mut i32),
    I64(&'a mut i64),
    I128(&'a mut i128),
    Isize(&'a mut isize),
    U8(&'a mut u8),
    U16(&'a mut u16),
    U32(&'a mut u32),
    U64(&'a mut u64),
    U128(&'a mut u128),
    Usize(&'a mut usize),
    F32(&'a mut f32),
    F64(&'a mut f64),
    Str(&'a mut String),
}

impl ScalarMut<'_> {
    /// Name of the destination type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            ScalarMut::Bool(_) => "bool",
            ScalarMut::I8(_) => "i8",
            ScalarMut::I16(_) => "i16",
            ScalarMut::I32(_) => "i32",
            ScalarMut::I64(_) => "i64",
            ScalarMut::I128(_) => "i128",
            ScalarMut::Isize(_) => "isize",
            ScalarMut::U8(_) => "u8",
            ScalarMut::U16(_) => "u16",
            ScalarMut::U32(_) => "u32",
            ScalarMut::U64(_) => "u64",
            ScalarMut::U128(_) => "u128",
            ScalarMut::Usize(_) => "usize",
            ScalarMut::F32(_) => "f32",
            ScalarMut::F64(_) => "f64",
            ScalarMut::Str(_) => "String",
        }
    }
}

// ============================================================================
// Composite descriptors
// ============================================================================

/// Hook through which a composite resolves the concrete type of one of its
/// own open fields, given the position being decoded. Returning `Ok(None)`
/// declines; an error aborts the decode.
pub type ResolveFn =
    fn(&Context<'_>) -> Result<Option<Box<dyn Slot>>, ResolveError>;

/// Static description of a tagged composite type.
///
/// Lives in a `static` per type (the `destination!` macro emits it), so the
/// engine can carry it through [`Context`] without borrowing the value under
/// construction.
pub struct StructDef {
    /// Type name, for diagnostics and resolver dispatch.
    pub type_name: &'static str,
    /// Identity accessor; a plain `fn` so the descriptor stays `const`-buildable.
    pub type_id: fn() -> TypeId,
    /// Field table, in declaration order.
    pub fields: &'static [FieldDef],
    /// Self-describing resolution capability, if the type declares one.
    pub resolve: Option<ResolveFn>,
}

impl StructDef {
    /// Does this descriptor describe `T`?
    pub fn is<T: 'static>(&self) -> bool {
        (self.type_id)() == TypeId::of::<T>()
    }
}

impl fmt::Debug for StructDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructDef")
            .field("type_name", &self.type_name)
            .field("fields", &self.fields.len())
            .field("resolve", &self.resolve.is_some())
            .finish()
    }
}

/// One field of a tagged composite.
#[derive(Debug)]
pub struct FieldDef {
    /// Field name in the Rust source. Never used for matching.
    pub name: &'static str,
    /// `(namespace, tag)` pairs, in the style of Go struct tags.
    pub tags: &'static [(&'static str, &'static str)],
}

impl FieldDef {
    /// The tag declared under `namespace`, if any.
    pub fn tag(&self, namespace: &str) -> Option<&'static str> {
        self.tags
            .iter()
            .find(|(ns, _)| *ns == namespace)
            .map(|(_, tag)| *tag)
    }
}

/// Composite destination with tagged fields.
pub trait StructSlot {
    /// The type's static descriptor.
    fn def(&self) -> &'static StructDef;

    /// Mutable access to the field at `index` in [`StructDef::fields`] order.
    /// `None` when `index` is out of range.
    fn field_mut(&mut self, index: usize) -> Option<&mut dyn Slot>;
}

// ============================================================================
// Container slots
// ============================================================================

/// Failure reported by a slot implementation while committing decoded data.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotError {
    /// The slot refused the write.
    NotWritable,
    /// The committed data did not match the slot's element or key type.
    Mismatch {
        expected: &'static str,
        got: String,
    },
}

impl fmt::Display for SlotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotError::NotWritable => write!(f, "slot is not writable"),
            SlotError::Mismatch { expected, got } => {
                write!(f, "slot expected {expected}, got {got}")
            }
        }
    }
}

impl std::error::Error for SlotError {}

/// String-keyed mapping destination.
///
/// The engine decodes entries into fresh slots from [`MapSlot::new_value`]
/// and commits them in one [`MapSlot::replace`] call; a failed decode never
/// leaves a half-written map behind.
pub trait MapSlot {
    /// Name of the declared key type.
    fn key_type(&self) -> &'static str;

    /// Whether the declared key type is `String`. Anything else is rejected
    /// by the engine before any entry is decoded.
    fn has_string_keys(&self) -> bool;

    /// Fresh zero value matching the declared value type.
    fn new_value(&self) -> Box<dyn Slot>;

    /// Replace the entire contents with `entries`.
    fn replace(&mut self, entries: Vec<(String, Box<dyn Slot>)>) -> Result<(), SlotError>;
}

/// Ordered sequence destination, fixed or variable length.
pub trait SeqSlot {
    /// Fresh zero value matching the declared element type.
    fn new_element(&self) -> Box<dyn Slot>;

    /// Replace the entire contents with `items`, converting the working
    /// sequence into the declared representation. Fixed-length destinations
    /// reject a length mismatch.
    fn replace(&mut self, items: Vec<Box<dyn Slot>>) -> Result<(), SlotError>;
}

/// Lazily allocated indirection around a composite destination.
pub trait IndirectSlot {
    /// Allocate a zero-valued target if the indirection is unset, then hand
    /// back the target slot. Never leaves the indirection unset.
    fn ensure(&mut self) -> &mut dyn Slot;
}

/// An open (polymorphic) destination slot.
///
/// The declaration carries no structural information; the concrete type is
/// chosen at decode time by a resolver (see [`ResolveFn`] and the global
/// resolver on `Config`). An unresolved slot stays at its zero value, unset.
#[derive(Debug, Default)]
pub struct Open(Option<Box<dyn Slot>>);

impl Open {
    /// An unset open slot; this is also the `Default`.
    pub const fn unset() -> Self {
        Open(None)
    }

    pub fn is_resolved(&self) -> bool {
        self.0.is_some()
    }

    /// Borrow the resolved value as a concrete `T`, if it is one.
    pub fn resolved_ref<T: 'static>(&self) -> Option<&T> {
        let slot: &dyn Slot = self.0.as_deref()?;
        let any: &dyn Any = slot;
        any.downcast_ref::<T>()
    }

    /// Store a resolved, already-decoded slot.
    pub fn set(&mut self, slot: Box<dyn Slot>) {
        self.0 = Some(slot);
    }
}

// ============================================================================
// Slot implementations for std types
// ============================================================================

/// Move a decoded boxed slot back into its concrete type.
fn reclaim<T: Slot>(slot: Box<dyn Slot>) -> Result<T, SlotError> {
    let any: Box<dyn Any> = slot;
    match any.downcast::<T>() {
        Ok(v) => Ok(*v),
        Err(_) => Err(SlotError::Mismatch {
            expected: type_name::<T>(),
            got: "a slot of another type".to_string(),
        }),
    }
}

macro_rules! impl_scalar_slot {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl Slot for $ty {
                fn shape(&self) -> ShapeKind {
                    ShapeKind::Scalar
                }
                fn slot_mut(&mut self) -> SlotMut<'_> {
                    SlotMut::Scalar(ScalarMut::$variant(self))
                }
            }
        )+
    };
}

impl_scalar_slot! {
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    i128 => I128,
    isize => Isize,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    u128 => U128,
    usize => Usize,
    f32 => F32,
    f64 => F64,
    String => Str,
}

impl<T: Slot + Default> Slot for Vec<T> {
    fn shape(&self) -> ShapeKind {
        ShapeKind::Seq
    }
    fn slot_mut(&mut self) -> SlotMut<'_> {
        SlotMut::Seq(self)
    }
}

impl<T: Slot + Default> SeqSlot for Vec<T> {
    fn new_element(&self) -> Box<dyn Slot> {
        Box::new(T::default())
    }

    fn replace(&mut self, items: Vec<Box<dyn Slot>>) -> Result<(), SlotError> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            out.push(reclaim::<T>(item)?);
        }
        *self = out;
        Ok(())
    }
}

impl<T: Slot + Default, const N: usize> Slot for [T; N] {
    fn shape(&self) -> ShapeKind {
        ShapeKind::Seq
    }
    fn slot_mut(&mut self) -> SlotMut<'_> {
        SlotMut::Seq(self)
    }
}

impl<T: Slot + Default, const N: usize> SeqSlot for [T; N] {
    fn new_element(&self) -> Box<dyn Slot> {
        Box::new(T::default())
    }

    fn replace(&mut self, items: Vec<Box<dyn Slot>>) -> Result<(), SlotError> {
        if items.len() != N {
            return Err(SlotError::Mismatch {
                expected: type_name::<[T; N]>(),
                got: format!("sequence of length {}", items.len()),
            });
        }
        for (dest, item) in self.iter_mut().zip(items) {
            *dest = reclaim::<T>(item)?;
        }
        Ok(())
    }
}

macro_rules! impl_map_slot {
    ($map:ident, $($bound:path),+) => {
        impl<K, V> Slot for $map<K, V>
        where
            K: $($bound +)+ Any,
            V: Slot + Default,
        {
            fn shape(&self) -> ShapeKind {
                ShapeKind::Map
            }
            fn slot_mut(&mut self) -> SlotMut<'_> {
                SlotMut::Map(self)
            }
        }

        impl<K, V> MapSlot for $map<K, V>
        where
            K: $($bound +)+ Any,
            V: Slot + Default,
        {
            fn key_type(&self) -> &'static str {
                type_name::<K>()
            }

            fn has_string_keys(&self) -> bool {
                TypeId::of::<K>() == TypeId::of::<String>()
            }

            fn new_value(&self) -> Box<dyn Slot> {
                Box::new(V::default())
            }

            fn replace(
                &mut self,
                entries: Vec<(String, Box<dyn Slot>)>,
            ) -> Result<(), SlotError> {
                let mut out = $map::new();
                for (key, value) in entries {
                    let key_any: Box<dyn Any> = Box::new(key);
                    let key = key_any.downcast::<K>().map_err(|_| SlotError::Mismatch {
                        expected: type_name::<K>(),
                        got: "a String key".to_string(),
                    })?;
                    out.insert(*key, reclaim::<V>(value)?);
                }
                *self = out;
                Ok(())
            }
        }
    };
}

impl_map_slot!(HashMap, Eq, Hash);
impl_map_slot!(BTreeMap, Ord);

impl<T: Slot + Default> Slot for Option<Box<T>> {
    fn shape(&self) -> ShapeKind {
        ShapeKind::Indirect
    }
    fn slot_mut(&mut self) -> SlotMut<'_> {
        SlotMut::Indirect(self)
    }
}

impl<T: Slot + Default> IndirectSlot for Option<Box<T>> {
    fn ensure(&mut self) -> &mut dyn Slot {
        self.get_or_insert_with(Box::default).as_mut()
    }
}

impl Slot for Open {
    fn shape(&self) -> ShapeKind {
        ShapeKind::Open
    }
    fn slot_mut(&mut self) -> SlotMut<'_> {
        SlotMut::Open(self)
    }
}

// `Open` aside, `Option<Box<T>>` always reads as an indirection: the target
// type is statically known, so there is nothing for a resolver to decide.

// ============================================================================
// Destination declaration macro
// ============================================================================

/// Declare a tagged composite destination.
///
/// Emits the struct itself, its [`Slot`]/[`StructSlot`] implementations, and
/// a `static` field-table descriptor. Each field carries one tag under the
/// declared namespace; the decoder matches source keys against tags under
/// whatever namespace its configuration names.
///
/// ```
/// use tagbind::destination;
///
/// destination! {
///     #[derive(Debug, Default, PartialEq)]
///     pub struct Server tagged "conf" {
///         host: String => "host",
///         port: u16 => "port",
///     }
/// }
/// ```
///
/// A composite that can resolve its own open fields registers the hook with a
/// trailing `resolve = <fn>;` clause.
#[macro_export]
macro_rules! destination {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident tagged $ns:literal {
            $( $fvis:vis $field:ident : $fty:ty => $tag:literal ),+ $(,)?
        }
        $( resolve = $resolve:expr ; )?
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $( $fvis $field : $fty, )+
        }

        impl $crate::Slot for $name {
            fn shape(&self) -> $crate::ShapeKind {
                $crate::ShapeKind::Struct
            }
            fn slot_mut(&mut self) -> $crate::SlotMut<'_> {
                $crate::SlotMut::Struct(self)
            }
        }

        impl $crate::StructSlot for $name {
            fn def(&self) -> &'static $crate::StructDef {
                static DEF: $crate::StructDef = $crate::StructDef {
                    type_name: ::core::stringify!($name),
                    type_id: ::core::any::TypeId::of::<$name>,
                    fields: &[
                        $(
                            $crate::FieldDef {
                                name: ::core::stringify!($field),
                                tags: &[($ns, $tag)],
                            },
                        )+
                    ],
                    resolve: $crate::destination!(@resolve $( $resolve )?),
                };
                &DEF
            }

            fn field_mut(&mut self, index: usize) -> Option<&mut dyn $crate::Slot> {
                let mut i = 0usize;
                $(
                    if index == i {
                        return Some(&mut self.$field);
                    }
                    i += 1;
                )+
                let _ = i;
                None
            }
        }
    };

    (@resolve) => {
        ::core::option::Option::None
    };
    (@resolve $resolve:expr) => {
        ::core::option::Option::Some($resolve)
    };
}
