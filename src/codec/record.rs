//! Composite (row type) wire frame.
//!
//! ```text
//! int32 field_count
//! per field: uint32 field_oid, int32 length (-1 for null), payload
//! ```
//!
//! Named composite types carry their field codecs; the anonymous RECORD
//! decodes by resolving each field's declared oid against the built-in
//! table and has no encoder, as the server never accepts one as a
//! parameter.
use bytes::Bytes;

use super::{Codec, DataError, registry, scalar::take};
use crate::common::ByteStr;
use crate::io::WriteBuffer;
use crate::postgres::Oid;
use crate::value::Value;

/// One field of a named composite type.
#[derive(Debug, Clone)]
pub struct CompositeField {
    pub name: ByteStr,
    pub oid: Oid,
    pub codec: std::sync::Arc<Codec>,
}

pub(crate) fn encode(
    fields: &[CompositeField],
    value: &Value,
    buf: &mut WriteBuffer,
) -> Result<(), DataError> {
    if fields.is_empty() {
        return Err(DataError::RecordEncode);
    }
    let Value::Record(values) = value else {
        return Err(DataError::mismatch("record", value));
    };
    if values.len() != fields.len() {
        return Err(DataError::FieldCount { expected: fields.len(), got: values.len() });
    }

    buf.write_int32(fields.len() as i32);
    for (field, value) in fields.iter().zip(values) {
        buf.write_uint32(field.oid);
        field.codec.encode_field(value, buf)?;
    }
    Ok(())
}

pub(crate) fn decode(
    oid: Oid,
    fields: &[CompositeField],
    payload: &mut Bytes,
) -> Result<Value, DataError> {
    let count = i32::from_be_bytes(take::<4>(payload, "record")?);
    if count < 0 {
        return Err(DataError::malformed("record"));
    }
    let count = count as usize;

    let anonymous = fields.is_empty() && oid == crate::postgres::oid::RECORD;
    if !anonymous && count != fields.len() {
        return Err(DataError::FieldCount { expected: fields.len(), got: count });
    }

    let mut values = Vec::with_capacity(count);
    for index in 0..count {
        let field_oid = u32::from_be_bytes(take::<4>(payload, "record")?);
        let codec = if anonymous {
            registry::builtin(field_oid).ok_or(DataError::NoCodec(field_oid))?
        } else {
            let declared = &fields[index];
            if field_oid != declared.oid {
                return Err(DataError::FieldOidMismatch {
                    index,
                    expected: declared.oid,
                    got: field_oid,
                });
            }
            &declared.codec
        };

        let len = i32::from_be_bytes(take::<4>(payload, "record")?);
        if len == -1 {
            values.push(Value::Null);
            continue;
        }
        if len < 0 || payload.len() < len as usize {
            return Err(DataError::malformed("record"));
        }
        let mut field = payload.split_to(len as usize);
        let value = codec.decode_payload(&mut field)?;
        if !field.is_empty() {
            return Err(DataError::TrailingBytes { name: "record field", left: field.len() });
        }
        values.push(value);
    }
    Ok(Value::Record(values))
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::codec::builtin;
    use crate::codec::test_util::roundtrip;
    use crate::postgres::oid;

    fn point_ish() -> Codec {
        Codec::composite(
            60_000,
            ByteStr::from_static("pair"),
            ByteStr::from_static("public"),
            vec![
                CompositeField {
                    name: ByteStr::from_static("id"),
                    oid: oid::INT4,
                    codec: Arc::clone(builtin(oid::INT4).unwrap()),
                },
                CompositeField {
                    name: ByteStr::from_static("label"),
                    oid: oid::TEXT,
                    codec: Arc::clone(builtin(oid::TEXT).unwrap()),
                },
            ],
        )
    }

    #[test]
    fn named_composite_roundtrip() {
        let codec = point_ish();
        let v = Value::Record(vec![7.into(), "seven".into()]);
        assert_eq!(roundtrip(&codec, &v), v);

        let v = Value::Record(vec![7.into(), Value::Null]);
        assert_eq!(roundtrip(&codec, &v), v);
    }

    #[test]
    fn field_count_enforced() {
        let codec = point_ish();
        let mut buf = WriteBuffer::new();
        assert!(matches!(
            codec.encode_payload(&Value::Record(vec![7.into()]), &mut buf),
            Err(DataError::FieldCount { expected: 2, got: 1 })
        ));
    }

    #[test]
    fn field_oid_enforced_on_decode() {
        let codec = point_ish();
        let mut buf = WriteBuffer::new();
        codec
            .encode_payload(&Value::Record(vec![7.into(), "x".into()]), &mut buf)
            .unwrap();
        let mut bytes = buf.take();
        // corrupt the first field's declared oid
        let mut raw = bytes.to_vec();
        raw[4..8].copy_from_slice(&oid::INT8.to_be_bytes());
        bytes = raw.into();
        assert!(matches!(
            codec.decode_payload(&mut bytes),
            Err(DataError::FieldOidMismatch { index: 0, .. })
        ));
    }

    #[test]
    fn anonymous_record_decodes_by_wire_oid() {
        // build the frame by hand: (int4 1, text 'x')
        let mut buf = WriteBuffer::new();
        buf.write_int32(2);
        buf.write_uint32(oid::INT4);
        buf.write_int32(4);
        buf.write_int32(1);
        buf.write_uint32(oid::TEXT);
        buf.write_int32(1);
        buf.write_bytes(b"x");

        let record = builtin(oid::RECORD).unwrap();
        let mut payload = buf.take();
        assert_eq!(
            record.decode_payload(&mut payload).unwrap(),
            Value::Record(vec![1.into(), "x".into()]),
        );
    }

    #[test]
    fn anonymous_record_has_no_encoder() {
        let record = builtin(oid::RECORD).unwrap();
        let mut buf = WriteBuffer::new();
        assert!(matches!(
            record.encode_payload(&Value::Record(vec![1.into()]), &mut buf),
            Err(DataError::RecordEncode)
        ));
    }
}
