//! The decoding engine: shape-directed recursive descent over a dynamic tree.

use core::fmt::{self, Display};

use crate::reflect::{
    IndirectSlot, MapSlot, Open, ScalarMut, SeqSlot, ShapeKind, Slot, SlotError, SlotMut,
    StructDef, StructSlot,
};
use crate::value::{Map, Value, ValueKind};

/// Find the best matching tag for an unknown source key.
/// Returns Some(suggestion) if a match with similarity >= 0.6 is found.
fn find_similar_tag<'a>(unknown: &str, expected: &[&'a str]) -> Option<&'a str> {
    let mut best_match: Option<(&'a str, f64)> = None;

    for &candidate in expected {
        let similarity = strsim::jaro_winkler(unknown, candidate);
        if similarity >= 0.6 && best_match.is_none_or(|(_, best)| similarity > best) {
            best_match = Some((candidate, similarity));
        }
    }

    best_match.map(|(tag, _)| tag)
}

// ============================================================================
// Error Types
// ============================================================================

/// One step of the path from the decode root to a failing node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Mapping key or struct tag.
    Key(String),
    /// Sequence index.
    Index(usize),
}

/// Path from the decode root to the node an error refers to.
///
/// Handlers prepend their own segment while an error bubbles up, so the
/// finished path reads root-first: `items[1].a`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Path {
    segments: Vec<PathSegment>,
}

impl Path {
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }
}

impl Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Key(key) if i == 0 => write!(f, "{key}")?,
                PathSegment::Key(key) => write!(f, ".{key}")?,
                PathSegment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

/// Error type for decoding.
#[derive(Debug)]
pub struct DecodeError {
    kind: DecodeErrorKind,
    path: Path,
}

impl DecodeError {
    /// Create a new error with an empty path.
    pub fn new(kind: DecodeErrorKind) -> Self {
        DecodeError {
            kind,
            path: Path::default(),
        }
    }

    /// The specific kind of failure.
    pub fn kind(&self) -> &DecodeErrorKind {
        &self.kind
    }

    /// Where in the source tree the failure happened.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn at_key(mut self, key: &str) -> Self {
        self.path.segments.insert(0, PathSegment::Key(key.to_string()));
        self
    }

    fn at_index(mut self, index: usize) -> Self {
        self.path.segments.insert(0, PathSegment::Index(index));
        self
    }
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "at {}: {}", self.path, self.kind)
        }
    }
}

impl std::error::Error for DecodeError {}

impl miette::Diagnostic for DecodeError {
    fn code<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
        Some(Box::new(self.kind.code()))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
        match &self.kind {
            DecodeErrorKind::UnknownField {
                suggestion: Some(suggested),
                ..
            } => Some(Box::new(format!("did you mean `{suggested}`?"))),
            DecodeErrorKind::UnsupportedKeyType { .. } => {
                Some(Box::new("declare the destination map with String keys"))
            }
            _ => None,
        }
    }
}

/// Specific error kinds for decoding.
#[derive(Debug)]
pub enum DecodeErrorKind {
    /// A composite or mapping destination was fed a non-mapping value.
    NotAMapping {
        /// The kind of value found instead.
        got: &'static str,
    },
    /// A sequence destination was fed a non-sequence value.
    NotASequence {
        /// The kind of value found instead.
        got: &'static str,
    },
    /// The destination slot refused the write.
    NotWritable,
    /// Value kind does not match the destination's declared kind.
    TypeMismatch {
        /// The declared destination type.
        expected: &'static str,
        /// What arrived instead.
        got: String,
    },
    /// Number does not fit the destination's numeric type.
    NumberOutOfRange {
        /// The numeric value that was out of range.
        value: String,
        /// The target type that couldn't hold the value.
        target: &'static str,
    },
    /// Source key with no matching destination tag.
    UnknownField {
        /// The unmatched source key.
        field: String,
        /// Tags the destination declares under the configured namespace.
        expected: Vec<&'static str>,
        /// Suggested tag (if similar to an expected one).
        suggestion: Option<&'static str>,
    },
    /// The destination's declared shape has no handler in this position.
    UnsupportedShape {
        /// The offending shape.
        shape: ShapeKind,
    },
    /// Mapping destination declared with non-String keys.
    UnsupportedKeyType {
        /// The declared key type.
        key_type: &'static str,
    },
    /// A self-describing or global resolver returned an error.
    ResolverFailed {
        /// The resolver's own message.
        message: String,
    },
}

impl Display for DecodeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeErrorKind::NotAMapping { got } => {
                write!(f, "expected a mapping, got {got}")
            }
            DecodeErrorKind::NotASequence { got } => {
                write!(f, "expected a sequence, got {got}")
            }
            DecodeErrorKind::NotWritable => write!(f, "destination slot is not writable"),
            DecodeErrorKind::TypeMismatch { expected, got } => {
                write!(f, "type mismatch: expected {expected}, got {got}")
            }
            DecodeErrorKind::NumberOutOfRange { value, target } => {
                write!(f, "number `{value}` out of range for {target}")
            }
            DecodeErrorKind::UnknownField {
                field,
                expected,
                suggestion,
            } => {
                write!(f, "unknown field `{field}`, expected one of: {expected:?}")?;
                if let Some(suggested) = suggestion {
                    write!(f, " (did you mean `{suggested}`?)")?;
                }
                Ok(())
            }
            DecodeErrorKind::UnsupportedShape { shape } => {
                write!(f, "unsupported destination shape: {shape}")
            }
            DecodeErrorKind::UnsupportedKeyType { key_type } => {
                write!(f, "unsupported map key type `{key_type}`, only String keys are supported")
            }
            DecodeErrorKind::ResolverFailed { message } => {
                write!(f, "resolver failed: {message}")
            }
        }
    }
}

impl DecodeErrorKind {
    /// Get an error code for this kind of error.
    pub fn code(&self) -> &'static str {
        match self {
            DecodeErrorKind::NotAMapping { .. } => "tagbind::not_a_mapping",
            DecodeErrorKind::NotASequence { .. } => "tagbind::not_a_sequence",
            DecodeErrorKind::NotWritable => "tagbind::not_writable",
            DecodeErrorKind::TypeMismatch { .. } => "tagbind::type_mismatch",
            DecodeErrorKind::NumberOutOfRange { .. } => "tagbind::number_out_of_range",
            DecodeErrorKind::UnknownField { .. } => "tagbind::unknown_field",
            DecodeErrorKind::UnsupportedShape { .. } => "tagbind::unsupported_shape",
            DecodeErrorKind::UnsupportedKeyType { .. } => "tagbind::unsupported_key_type",
            DecodeErrorKind::ResolverFailed { .. } => "tagbind::resolver_failed",
        }
    }
}

impl From<SlotError> for DecodeError {
    fn from(err: SlotError) -> Self {
        match err {
            SlotError::NotWritable => DecodeError::new(DecodeErrorKind::NotWritable),
            SlotError::Mismatch { expected, got } => {
                DecodeError::new(DecodeErrorKind::TypeMismatch { expected, got })
            }
        }
    }
}

/// Error returned by a resolver that was consulted but could not do its job.
///
/// Distinct from declining: a resolver that merely has no answer returns
/// `Ok(None)` and decoding moves on; a `ResolveError` aborts the decode.
#[derive(Debug, Clone)]
pub struct ResolveError {
    message: String,
}

impl ResolveError {
    pub fn new(message: impl Into<String>) -> Self {
        ResolveError {
            message: message.into(),
        }
    }
}

impl Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ResolveError {}

/// Result type for decoding.
pub type Result<T> = core::result::Result<T, DecodeError>;

// ============================================================================
// Configuration and context
// ============================================================================

/// Global open-slot resolver carried by [`Config`].
pub type GlobalResolver = Box<
    dyn Fn(&Context<'_>) -> core::result::Result<Option<Box<dyn Slot>>, ResolveError>
        + Send
        + Sync,
>;

/// Immutable parameters for one decode tree.
pub struct Config {
    tag_name: String,
    resolver: Option<GlobalResolver>,
}

impl Config {
    /// Create a configuration matching fields by their tag under `tag_name`.
    ///
    /// # Panics
    ///
    /// Panics if `tag_name` is empty.
    pub fn new(tag_name: impl Into<String>) -> Self {
        let tag_name = tag_name.into();
        assert!(!tag_name.is_empty(), "tag name must be non-empty");
        Config {
            tag_name,
            resolver: None,
        }
    }

    /// Install a global resolver for open slots.
    pub fn with_resolver<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&Context<'_>) -> core::result::Result<Option<Box<dyn Slot>>, ResolveError>
            + Send
            + Sync
            + 'static,
    {
        self.resolver = Some(Box::new(resolver));
        self
    }

    /// The tag namespace used for field matching.
    pub fn tag_name(&self) -> &str {
        &self.tag_name
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("tag_name", &self.tag_name)
            .field("resolver", &self.resolver.is_some())
            .finish()
    }
}

static EMPTY_MAP: Map = Map::new();

/// Where in the tree the current slot sits.
///
/// Built fresh by the struct handler for every field it delegates and passed
/// down the call chain by value; it is valid for one handler call chain and
/// never stored. A resolver uses it to pick a concrete type for an open slot
/// from the slot's key and its siblings' raw values.
#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    /// Key under which the current slot appears in the enclosing mapping.
    pub key: &'a str,
    /// The enclosing composite's complete raw mapping, siblings included.
    pub raw: &'a Map,
    /// Descriptor of the enclosing composite, if any. Informational only:
    /// the engine never mutates an ancestor through it.
    pub parent: Option<&'static StructDef>,
}

impl<'a> Context<'a> {
    /// The context of a top-level decode: no key, no siblings, no parent.
    pub(crate) fn root() -> Context<'static> {
        Context {
            key: "",
            raw: &EMPTY_MAP,
            parent: None,
        }
    }

    /// Raw value of a sibling in the enclosing mapping.
    pub fn sibling(&self, key: &str) -> Option<&'a Value> {
        self.raw.get(key)
    }

    /// Is the enclosing composite a `T`?
    pub fn parent_is<T: 'static>(&self) -> bool {
        self.parent.is_some_and(|def| def.is::<T>())
    }
}

// ============================================================================
// Decoder
// ============================================================================

fn mismatch(expected: &'static str, got: ValueKind) -> DecodeError {
    DecodeError::new(DecodeErrorKind::TypeMismatch {
        expected,
        got: got.as_str().to_string(),
    })
}

fn out_of_range(value: impl Display, target: &'static str) -> DecodeError {
    DecodeError::new(DecodeErrorKind::NumberOutOfRange {
        value: value.to_string(),
        target,
    })
}

fn fit<S, T>(n: S, target: &'static str) -> Result<T>
where
    S: Copy + Display,
    T: TryFrom<S>,
{
    T::try_from(n).map_err(|_| out_of_range(n, target))
}

fn resolver_failed(err: ResolveError) -> DecodeError {
    DecodeError::new(DecodeErrorKind::ResolverFailed {
        message: err.message,
    })
}

/// The decoding engine for one configuration.
///
/// Holds no mutable state: all decode state lives on the call stack and in
/// the destination being filled, so one `Decoder` may serve any number of
/// independent trees, concurrently included.
pub struct Decoder<'cfg> {
    config: &'cfg Config,
}

impl<'cfg> Decoder<'cfg> {
    pub fn new(config: &'cfg Config) -> Self {
        Decoder { config }
    }

    /// Decode `source` into the caller-allocated `dest`.
    pub fn decode(&self, source: &Value, dest: &mut dyn Slot) -> Result<()> {
        self.decode_into(source, dest, &Context::root())
    }

    /// Main dispatch point: route on the destination's declared shape and
    /// invoke exactly one handler. Every handler delegates back here for its
    /// children.
    fn decode_into(&self, source: &Value, dest: &mut dyn Slot, ctx: &Context<'_>) -> Result<()> {
        match dest.slot_mut() {
            SlotMut::Scalar(scalar) => self.decode_scalar(source, scalar),
            SlotMut::Struct(composite) => self.decode_struct(source, composite),
            SlotMut::Map(map) => self.decode_map(source, map, ctx),
            SlotMut::Seq(seq) => self.decode_seq(source, seq, ctx),
            SlotMut::Indirect(indirect) => self.decode_indirect(source, indirect),
            SlotMut::Open(open) => self.decode_open(source, open, ctx),
        }
    }

    /// Terminal assignment of a scalar value.
    fn decode_scalar(&self, source: &Value, dest: ScalarMut<'_>) -> Result<()> {
        log::trace!("decode_scalar: {} <- {}", dest.type_name(), source.kind());

        match source {
            Value::Str(s) => match dest {
                ScalarMut::Str(slot) => {
                    *slot = s.clone();
                    Ok(())
                }
                other => Err(mismatch(other.type_name(), ValueKind::String)),
            },
            Value::Bool(b) => match dest {
                ScalarMut::Bool(slot) => {
                    *slot = *b;
                    Ok(())
                }
                other => Err(mismatch(other.type_name(), ValueKind::Bool)),
            },
            Value::I64(n) => self.set_number_i64(dest, *n),
            Value::U64(n) => self.set_number_u64(dest, *n),
            Value::F64(n) => self.set_number_f64(dest, *n),
            other => Err(mismatch(dest.type_name(), other.kind())),
        }
    }

    /// Write a signed integer, converting to the destination's numeric type.
    fn set_number_i64(&self, dest: ScalarMut<'_>, n: i64) -> Result<()> {
        match dest {
            ScalarMut::I8(slot) => *slot = fit(n, "i8")?,
            ScalarMut::I16(slot) => *slot = fit(n, "i16")?,
            ScalarMut::I32(slot) => *slot = fit(n, "i32")?,
            ScalarMut::I64(slot) => *slot = n,
            ScalarMut::I128(slot) => *slot = i128::from(n),
            ScalarMut::Isize(slot) => *slot = fit(n, "isize")?,
            ScalarMut::U8(slot) => *slot = fit(n, "u8")?,
            ScalarMut::U16(slot) => *slot = fit(n, "u16")?,
            ScalarMut::U32(slot) => *slot = fit(n, "u32")?,
            ScalarMut::U64(slot) => *slot = fit(n, "u64")?,
            ScalarMut::U128(slot) => *slot = fit(n, "u128")?,
            ScalarMut::Usize(slot) => *slot = fit(n, "usize")?,
            ScalarMut::F32(slot) => *slot = n as f32,
            ScalarMut::F64(slot) => *slot = n as f64,
            other => return Err(mismatch(other.type_name(), ValueKind::Number)),
        }
        Ok(())
    }

    /// Write an unsigned integer, converting to the destination's numeric type.
    fn set_number_u64(&self, dest: ScalarMut<'_>, n: u64) -> Result<()> {
        match dest {
            ScalarMut::I8(slot) => *slot = fit(n, "i8")?,
            ScalarMut::I16(slot) => *slot = fit(n, "i16")?,
            ScalarMut::I32(slot) => *slot = fit(n, "i32")?,
            ScalarMut::I64(slot) => *slot = fit(n, "i64")?,
            ScalarMut::I128(slot) => *slot = i128::from(n),
            ScalarMut::Isize(slot) => *slot = fit(n, "isize")?,
            ScalarMut::U8(slot) => *slot = fit(n, "u8")?,
            ScalarMut::U16(slot) => *slot = fit(n, "u16")?,
            ScalarMut::U32(slot) => *slot = fit(n, "u32")?,
            ScalarMut::U64(slot) => *slot = n,
            ScalarMut::U128(slot) => *slot = u128::from(n),
            ScalarMut::Usize(slot) => *slot = fit(n, "usize")?,
            ScalarMut::F32(slot) => *slot = n as f32,
            ScalarMut::F64(slot) => *slot = n as f64,
            other => return Err(mismatch(other.type_name(), ValueKind::Number)),
        }
        Ok(())
    }

    /// Write a float. Integer destinations only accept a zero fractional part.
    fn set_number_f64(&self, dest: ScalarMut<'_>, n: f64) -> Result<()> {
        match dest {
            ScalarMut::F32(slot) => {
                *slot = n as f32;
                Ok(())
            }
            ScalarMut::F64(slot) => {
                *slot = n;
                Ok(())
            }
            other => {
                if n.fract() != 0.0 {
                    return Err(DecodeError::new(DecodeErrorKind::TypeMismatch {
                        expected: other.type_name(),
                        got: "number with a fractional part".to_string(),
                    }));
                }
                if n < 0.0 {
                    if n < i64::MIN as f64 {
                        return Err(out_of_range(n, other.type_name()));
                    }
                    self.set_number_i64(other, n as i64)
                } else {
                    if n > u64::MAX as f64 {
                        return Err(out_of_range(n, other.type_name()));
                    }
                    self.set_number_u64(other, n as u64)
                }
            }
        }
    }

    /// Decode a mapping into a tagged composite, field by field.
    fn decode_struct(&self, source: &Value, dest: &mut dyn StructSlot) -> Result<()> {
        let def = dest.def();
        log::trace!("decode_struct: {}", def.type_name);

        let map = match source.as_map() {
            Some(map) => map,
            None => {
                return Err(DecodeError::new(DecodeErrorKind::NotAMapping {
                    got: source.kind().as_str(),
                }));
            }
        };

        let tag_name = self.config.tag_name.as_str();
        for (key, value) in map {
            let index = match def
                .fields
                .iter()
                .position(|field| field.tag(tag_name) == Some(key.as_str()))
            {
                Some(index) => index,
                None => return Err(self.unknown_field(key, def, tag_name)),
            };

            let ctx = Context {
                key: key.as_str(),
                raw: map,
                parent: Some(def),
            };
            let field = dest
                .field_mut(index)
                .ok_or_else(|| DecodeError::new(DecodeErrorKind::NotWritable).at_key(key))?;
            self.decode_into(value, field, &ctx)
                .map_err(|e| e.at_key(key))?;
        }

        Ok(())
    }

    fn unknown_field(&self, key: &str, def: &'static StructDef, tag_name: &str) -> DecodeError {
        let expected: Vec<&'static str> = def
            .fields
            .iter()
            .filter_map(|field| field.tag(tag_name))
            .collect();
        let suggestion = find_similar_tag(key, &expected);
        DecodeError::new(DecodeErrorKind::UnknownField {
            field: key.to_string(),
            expected,
            suggestion,
        })
    }

    /// Decode a mapping into a string-keyed map destination.
    ///
    /// Entries are decoded into fresh slots and committed in one replace at
    /// the end: the destination never merges with pre-existing contents, and
    /// a failing entry leaves it untouched.
    fn decode_map(&self, source: &Value, dest: &mut dyn MapSlot, ctx: &Context<'_>) -> Result<()> {
        log::trace!("decode_map: keys {}", dest.key_type());

        let map = match source.as_map() {
            Some(map) => map,
            None => {
                return Err(DecodeError::new(DecodeErrorKind::NotAMapping {
                    got: source.kind().as_str(),
                }));
            }
        };

        if !dest.has_string_keys() {
            return Err(DecodeError::new(DecodeErrorKind::UnsupportedKeyType {
                key_type: dest.key_type(),
            }));
        }

        let mut entries = Vec::with_capacity(map.len());
        for (key, value) in map {
            let mut slot = dest.new_value();
            // The context still describes the enclosing composite field, not
            // the individual entry.
            self.decode_into(value, slot.as_mut(), ctx)
                .map_err(|e| e.at_key(key))?;
            entries.push((key.clone(), slot));
        }

        dest.replace(entries).map_err(DecodeError::from)
    }

    /// Decode a sequence element-wise, index-for-index, then convert the
    /// working sequence into the destination's declared representation.
    fn decode_seq(&self, source: &Value, dest: &mut dyn SeqSlot, ctx: &Context<'_>) -> Result<()> {
        log::trace!("decode_seq");

        let items = match source.as_seq() {
            Some(items) => items,
            None => {
                return Err(DecodeError::new(DecodeErrorKind::NotASequence {
                    got: source.kind().as_str(),
                }));
            }
        };

        let mut working = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let mut slot = dest.new_element();
            self.decode_into(item, slot.as_mut(), ctx)
                .map_err(|e| e.at_index(index))?;
            working.push(slot);
        }

        dest.replace(working).map_err(DecodeError::from)
    }

    /// Decode through an indirection. The target is lazily allocated and must
    /// be a composite; indirections to anything else are unsupported.
    fn decode_indirect(&self, source: &Value, dest: &mut dyn IndirectSlot) -> Result<()> {
        log::trace!("decode_indirect");

        match dest.ensure().slot_mut() {
            SlotMut::Struct(target) => self.decode_struct(source, target),
            other => Err(DecodeError::new(DecodeErrorKind::UnsupportedShape {
                shape: other.kind(),
            })),
        }
    }

    /// Decode into an open slot by first resolving its concrete type.
    ///
    /// The enclosing composite's own hook is consulted first; the global
    /// resolver only runs if no hook exists or the hook declines. When
    /// neither resolves, the slot is left unset and decoding continues.
    fn decode_open(&self, source: &Value, dest: &mut Open, ctx: &Context<'_>) -> Result<()> {
        log::trace!("decode_open: key `{}`", ctx.key);

        let mut resolved = match ctx.parent.and_then(|def| def.resolve) {
            Some(resolve) => resolve(ctx).map_err(resolver_failed)?,
            None => None,
        };
        if resolved.is_none() {
            if let Some(resolver) = &self.config.resolver {
                resolved = resolver(ctx).map_err(resolver_failed)?;
            }
        }

        let Some(mut slot) = resolved else {
            log::trace!("decode_open: unresolved, leaving `{}` unset", ctx.key);
            return Ok(());
        };

        self.decode_into(source, slot.as_mut(), ctx)?;
        dest.set(slot);
        Ok(())
    }
}
