//! Oid-addressed encode/decode for postgres wire values.
//!
//! A [`Codec`] couples one oid with its wire format and conversion
//! functions. Built-in codecs live in a process-wide table; introspected
//! and user codecs are registered per session through [`DataCodecs`].
//!
//! Every field on the wire is `Int32` length (-1 for NULL) followed by the
//! payload; [`Codec::encode_field`] and [`Codec::decode_field`] own that
//! outer frame so the per-type functions deal in payloads only.
use bytes::Bytes;
use std::sync::Arc;

pub(crate) mod scalar;
pub(crate) mod temporal;
pub(crate) mod network;
pub(crate) mod geometric;
pub(crate) mod text;

mod array;
mod record;
mod range;
mod registry;

pub use array::MAX_ARRAY_DIMS;
pub use record::CompositeField;
pub use registry::{DataCodecs, SharedTypeCache, builtin};

use crate::common::ByteStr;
use crate::io::WriteBuffer;
use crate::postgres::{Oid, PgFormat};
use crate::value::Value;

/// An error raised by an encoder rejecting a caller-supplied value, or a
/// decoder rejecting a malformed payload.
///
/// Encoding errors surface before any byte reaches the transport; the
/// connection stays healthy.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("cannot encode {value} as {name}")]
    TypeMismatch { name: &'static str, value: &'static str },
    #[error("value out of range for {name}")]
    Overflow { name: &'static str },
    #[error("multidimensional array is ragged")]
    RaggedArray,
    #[error("array exceeds {MAX_ARRAY_DIMS} dimensions")]
    TooManyDimensions,
    #[error("array element oid {got} does not match codec element {expected}")]
    ElementOidMismatch { expected: Oid, got: Oid },
    #[error("record field {index} has oid {got}, declared {expected}")]
    FieldOidMismatch { index: usize, expected: Oid, got: Oid },
    #[error("record has {got} fields, composite type declares {expected}")]
    FieldCount { expected: usize, got: usize },
    #[error("anonymous record has no encoder")]
    RecordEncode,
    #[error("no codec for oid {0}")]
    NoCodec(Oid),
    #[error("malformed {name} payload")]
    Malformed { name: &'static str },
    #[error("{left} trailing bytes after {name} payload")]
    TrailingBytes { name: &'static str, left: usize },
    #[error("invalid text form of {name}: {text:?}")]
    InvalidText { name: &'static str, text: Box<str> },
    #[error("jsonb version {0} is not supported")]
    JsonbVersion(u8),
    #[error("expected {expected} arguments, got {got}")]
    ArgumentCount { expected: usize, got: usize },
    #[error("non utf8 text payload: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

impl DataError {
    pub(crate) fn mismatch(name: &'static str, value: &Value) -> Self {
        Self::TypeMismatch { name, value: value.kind_name() }
    }

    pub(crate) fn malformed(name: &'static str) -> Self {
        Self::Malformed { name }
    }

    pub(crate) fn invalid_text(name: &'static str, text: &str) -> Self {
        Self::InvalidText { name, text: text.into() }
    }
}

pub(crate) type EncodeFn = fn(&Value, &mut WriteBuffer) -> Result<(), DataError>;
pub(crate) type DecodeFn = fn(&mut Bytes) -> Result<Value, DataError>;
pub(crate) type TextDecodeFn = fn(&str) -> Result<Value, DataError>;

/// A scalar wire conversion: one format, direct function pointers.
#[derive(Clone, Copy)]
pub(crate) struct Scalar {
    pub format: PgFormat,
    pub encode: EncodeFn,
    pub decode: DecodeFn,
    pub decode_text: TextDecodeFn,
}

impl Scalar {
    /// A text-format codec built from a text encoder/decoder pair.
    ///
    /// Its binary payload is its text form; decoding always routes through
    /// `decode_text`.
    pub(crate) const fn text(encode: EncodeFn, decode_text: TextDecodeFn) -> Self {
        Self { format: PgFormat::Text, encode, decode: decode_is_textual, decode_text }
    }
}

// never reached: `decode_payload` routes text-format scalars through
// `decode_text`
fn decode_is_textual(_: &mut Bytes) -> Result<Value, DataError> {
    Err(DataError::malformed("text-format payload"))
}

type CustomEncodeFn = dyn Fn(&Value, &mut Vec<u8>) -> Result<(), DataError> + Send + Sync;
type CustomDecodeFn = dyn Fn(&[u8]) -> Result<Value, DataError> + Send + Sync;

/// A user-supplied encoder/decoder pair wrapping byte or text payloads.
///
/// The wire frame is identical to the scalar format it wraps.
#[derive(Clone)]
pub struct CustomCodec {
    pub(crate) format: PgFormat,
    pub(crate) encode: Arc<CustomEncodeFn>,
    pub(crate) decode: Arc<CustomDecodeFn>,
}

impl CustomCodec {
    pub fn new<E, D>(format: PgFormat, encode: E, decode: D) -> Self
    where
        E: Fn(&Value, &mut Vec<u8>) -> Result<(), DataError> + Send + Sync + 'static,
        D: Fn(&[u8]) -> Result<Value, DataError> + Send + Sync + 'static,
    {
        Self { format, encode: Arc::new(encode), decode: Arc::new(decode) }
    }
}

impl std::fmt::Debug for CustomCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomCodec").field("format", &self.format).finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub(crate) enum CodecKind {
    Scalar(Scalar),
    Array { elem: Arc<Codec>, elem_oid: Oid },
    Composite { fields: Arc<[CompositeField]> },
    Range { elem: Arc<Codec> },
    Custom(CustomCodec),
}

impl std::fmt::Debug for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scalar").field("format", &self.format).finish_non_exhaustive()
    }
}

/// Wire conversion for one oid.
#[derive(Debug, Clone)]
pub struct Codec {
    oid: Oid,
    name: ByteStr,
    schema: ByteStr,
    pub(crate) kind: CodecKind,
}

impl Codec {
    pub(crate) fn scalar(oid: Oid, name: &'static str, scalar: Scalar) -> Self {
        Self {
            oid,
            name: ByteStr::from_static(name),
            schema: ByteStr::from_static("pg_catalog"),
            kind: CodecKind::Scalar(scalar),
        }
    }

    /// An array codec over `elem`.
    pub fn array(oid: Oid, name: ByteStr, schema: ByteStr, elem: Arc<Codec>) -> Self {
        let elem_oid = elem.oid();
        Self { oid, name, schema, kind: CodecKind::Array { elem, elem_oid } }
    }

    /// A named composite codec; `fields` are ordered by position.
    pub fn composite(oid: Oid, name: ByteStr, schema: ByteStr, fields: Vec<CompositeField>) -> Self {
        Self { oid, name, schema, kind: CodecKind::Composite { fields: fields.into() } }
    }

    /// A range codec over `elem`.
    pub fn range(oid: Oid, name: ByteStr, schema: ByteStr, elem: Arc<Codec>) -> Self {
        Self { oid, name, schema, kind: CodecKind::Range { elem } }
    }

    /// An enum codec; values travel as their text labels.
    pub fn enumeration(oid: Oid, name: ByteStr, schema: ByteStr) -> Self {
        Self {
            oid,
            name,
            schema,
            kind: CodecKind::Scalar(Scalar::text(scalar::encode_text_like, scalar::decode_text_value)),
        }
    }

    /// A codec wrapping user callbacks.
    pub fn custom(oid: Oid, name: ByteStr, schema: ByteStr, custom: CustomCodec) -> Self {
        Self { oid, name, schema, kind: CodecKind::Custom(custom) }
    }

    pub fn oid(&self) -> Oid {
        self.oid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Preferred wire format; decides Bind format codes.
    pub fn format(&self) -> PgFormat {
        match &self.kind {
            CodecKind::Scalar(s) => s.format,
            CodecKind::Custom(c) => c.format,
            _ => PgFormat::Binary,
        }
    }

    /// Encode one field: the `Int32` length frame plus the payload.
    ///
    /// `Value::Null` is the length -1 special case; no payload follows.
    pub fn encode_field(&self, value: &Value, buf: &mut WriteBuffer) -> Result<(), DataError> {
        if value.is_null() {
            buf.write_int32(-1);
            return Ok(());
        }
        let at = buf.begin_length();
        self.encode_payload(value, buf)?;
        buf.end_length(at);
        Ok(())
    }

    pub(crate) fn encode_payload(&self, value: &Value, buf: &mut WriteBuffer) -> Result<(), DataError> {
        match &self.kind {
            CodecKind::Scalar(s) => (s.encode)(value, buf),
            CodecKind::Array { elem, elem_oid } => array::encode(elem, *elem_oid, value, buf),
            CodecKind::Composite { fields } => record::encode(fields, value, buf),
            CodecKind::Range { elem } => range::encode(elem, value, buf),
            CodecKind::Custom(c) => {
                let mut out = Vec::new();
                (c.encode)(value, &mut out)?;
                buf.write_bytes(&out);
                Ok(())
            }
        }
    }

    /// Decode one field payload in the given format.
    ///
    /// `None` is a NULL field. The payload must be consumed exactly.
    pub fn decode_field(&self, format: PgFormat, payload: Option<Bytes>) -> Result<Value, DataError> {
        let Some(mut payload) = payload else {
            return Ok(Value::Null);
        };
        match format {
            PgFormat::Binary => {
                let value = self.decode_payload(&mut payload)?;
                if !payload.is_empty() {
                    return Err(DataError::TrailingBytes { name: "field", left: payload.len() });
                }
                Ok(value)
            }
            PgFormat::Text => self.decode_text(payload),
        }
    }

    pub(crate) fn decode_payload(&self, payload: &mut Bytes) -> Result<Value, DataError> {
        match &self.kind {
            CodecKind::Scalar(s) => match s.format {
                PgFormat::Binary => (s.decode)(payload),
                PgFormat::Text => {
                    let value = (s.decode_text)(std::str::from_utf8(payload)?)?;
                    payload.clear();
                    Ok(value)
                }
            },
            CodecKind::Array { elem, elem_oid } => array::decode(elem, *elem_oid, payload),
            CodecKind::Composite { fields } => record::decode(self.oid, fields, payload),
            CodecKind::Range { elem } => range::decode(elem, payload),
            CodecKind::Custom(c) => {
                let value = (c.decode)(payload)?;
                payload.clear();
                Ok(value)
            }
        }
    }

    fn decode_text(&self, payload: Bytes) -> Result<Value, DataError> {
        match &self.kind {
            CodecKind::Scalar(s) => {
                let text = std::str::from_utf8(&payload)?;
                (s.decode_text)(text)
            }
            CodecKind::Custom(c) => (c.decode)(&payload),
            // text forms of containers are not parsed; surface them raw
            _ => Ok(Value::Text(ByteStr::from_utf8(payload).map_err(DataError::Utf8)?)),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;

    /// Encode a non-null value's payload (without the length frame).
    pub fn encode(codec: &Codec, value: &Value) -> Vec<u8> {
        let mut buf = WriteBuffer::new();
        codec.encode_payload(value, &mut buf).expect("encode");
        buf.as_slice().to_vec()
    }

    /// Binary round-trip through the field frame.
    pub fn roundtrip(codec: &Codec, value: &Value) -> Value {
        let mut buf = WriteBuffer::new();
        codec.encode_field(value, &mut buf).expect("encode");
        let mut bytes = Bytes::copy_from_slice(buf.as_slice());
        let len = i32::from_be_bytes(bytes.split_to(4)[..].try_into().unwrap());
        let payload = match len {
            -1 => None,
            n => Some(bytes.split_to(n as usize)),
        };
        assert!(bytes.is_empty(), "field frame has trailing bytes");
        codec.decode_field(PgFormat::Binary, payload).expect("decode")
    }
}
