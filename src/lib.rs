//! Decode dynamic value trees into statically typed destinations addressed
//! by field tags.
//!
//! The input is an in-memory [`Value`] tree, the shape an external parser
//! produces from a JSON-like document. The destination is any type
//! implementing [`Slot`]; composites declare a tag per field and the decoder
//! matches source keys against tags under the namespace named by [`Config`],
//! never against field names. Open ([`Open`]) fields carry no structural
//! information at all; their concrete type is picked at decode time, either
//! by the enclosing composite itself or by a global resolver.
//!
//! ```
//! use tagbind::{Config, Value, destination, from_value};
//!
//! destination! {
//!     #[derive(Debug, Default, PartialEq)]
//!     struct Server tagged "conf" {
//!         host: String => "host",
//!         port: u16 => "port",
//!     }
//! }
//!
//! let source = Value::map([
//!     ("host", Value::from("localhost")),
//!     ("port", Value::from(8080u16)),
//! ]);
//!
//! let server: Server = from_value(&source, &Config::new("conf")).unwrap();
//! assert_eq!(
//!     server,
//!     Server {
//!         host: "localhost".into(),
//!         port: 8080,
//!     }
//! );
//! ```
//!
//! Decoding is single-pass, synchronous and purely recursive; all state
//! lives on the call stack and in the destination being filled. The engine
//! fails fast: the first error aborts the whole decode, tagged with the
//! path of the failing node. The one deliberate exception is an open field
//! neither resolver claims, which is skipped and left unset.

mod decode;
mod reflect;
mod value;

pub use decode::{
    Config, Context, DecodeError, DecodeErrorKind, Decoder, GlobalResolver, Path, PathSegment,
    ResolveError,
};
pub use reflect::{
    FieldDef, IndirectSlot, MapSlot, Open, ResolveFn, ScalarMut, SeqSlot, ShapeKind, Slot,
    SlotError, SlotMut, StructDef, StructSlot,
};
pub use value::{Map, Value, ValueKind};

/// Decode `source` into a caller-allocated destination, in place.
///
/// The destination is filled field by field; on error, fields decoded before
/// the failing one keep their new values (map and sequence destinations are
/// exempt, since they commit atomically).
pub fn decode(source: &Value, dest: &mut dyn Slot, config: &Config) -> Result<(), DecodeError> {
    Decoder::new(config).decode(source, dest)
}

/// Decode `source` into a freshly allocated zero value of `T`.
pub fn from_value<T: Slot + Default>(source: &Value, config: &Config) -> Result<T, DecodeError> {
    let mut dest = T::default();
    decode(source, &mut dest, config)?;
    Ok(dest)
}
