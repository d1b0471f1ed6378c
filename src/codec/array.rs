//! Array wire frame.
//!
//! ```text
//! int32 ndims
//! int32 flags          (zero)
//! uint32 element_oid
//! per dim: int32 length, int32 lower_bound (1 on write)
//! per element, row-major: int32 length (-1 for null), payload
//! ```
use bytes::Bytes;

use super::{Codec, DataError, scalar::take};
use crate::io::WriteBuffer;
use crate::postgres::Oid;
use crate::value::Value;

/// Postgres caps arrays at six dimensions.
pub const MAX_ARRAY_DIMS: usize = 6;

pub(crate) fn encode(
    elem: &Codec,
    elem_oid: Oid,
    value: &Value,
    buf: &mut WriteBuffer,
) -> Result<(), DataError> {
    let Value::Array(items) = value else {
        return Err(DataError::mismatch("array", value));
    };

    // one pass over the first spine discovers the shape; the element walk
    // then enforces it everywhere
    let dims = compute_dims(items)?;

    if dims.is_empty() {
        buf.write_int32(0); // ndims
        buf.write_int32(0); // flags
        buf.write_uint32(elem_oid);
        return Ok(());
    }

    buf.write_int32(dims.len() as i32);
    buf.write_int32(0);
    buf.write_uint32(elem_oid);
    for len in &dims {
        buf.write_int32(*len);
        buf.write_int32(1); // lower bound
    }

    encode_level(elem, &dims, 0, items, buf)
}

fn compute_dims(items: &[Value]) -> Result<Vec<i32>, DataError> {
    if items.is_empty() {
        return Ok(Vec::new());
    }
    let mut dims = vec![items.len() as i32];
    let mut probe = items;
    while let Some(Value::Array(inner)) = probe.first() {
        dims.push(inner.len() as i32);
        if dims.len() > MAX_ARRAY_DIMS {
            return Err(DataError::TooManyDimensions);
        }
        probe = inner;
    }
    Ok(dims)
}

fn encode_level(
    elem: &Codec,
    dims: &[i32],
    depth: usize,
    items: &[Value],
    buf: &mut WriteBuffer,
) -> Result<(), DataError> {
    if items.len() as i32 != dims[depth] {
        return Err(DataError::RaggedArray);
    }
    let leaf = depth + 1 == dims.len();
    for item in items {
        match item {
            Value::Array(inner) if !leaf => encode_level(elem, dims, depth + 1, inner, buf)?,
            Value::Array(_) => return Err(DataError::RaggedArray),
            _ if !leaf => return Err(DataError::RaggedArray),
            item => elem.encode_field(item, buf)?,
        }
    }
    Ok(())
}

pub(crate) fn decode(elem: &Codec, elem_oid: Oid, payload: &mut Bytes) -> Result<Value, DataError> {
    let ndims = i32::from_be_bytes(take::<4>(payload, "array")?);
    let _flags = i32::from_be_bytes(take::<4>(payload, "array")?);
    let got_oid = u32::from_be_bytes(take::<4>(payload, "array")?);
    if got_oid != elem_oid {
        return Err(DataError::ElementOidMismatch { expected: elem_oid, got: got_oid });
    }

    if ndims == 0 {
        return Ok(Value::Array(Vec::new()));
    }
    if !(1..=MAX_ARRAY_DIMS as i32).contains(&ndims) {
        return Err(DataError::malformed("array"));
    }

    let mut dims = Vec::with_capacity(ndims as usize);
    for _ in 0..ndims {
        let len = i32::from_be_bytes(take::<4>(payload, "array")?);
        let _lower_bound = i32::from_be_bytes(take::<4>(payload, "array")?);
        if len < 0 {
            return Err(DataError::malformed("array"));
        }
        dims.push(len);
    }

    // the overwhelmingly common case
    if ndims == 1 {
        let len = dims[0] as usize;
        let mut items = Vec::with_capacity(len);
        for _ in 0..len {
            items.push(decode_element(elem, payload)?);
        }
        return Ok(Value::Array(items));
    }

    decode_level(elem, &dims, payload)
}

fn decode_level(elem: &Codec, dims: &[i32], payload: &mut Bytes) -> Result<Value, DataError> {
    let len = dims[0] as usize;
    let mut items = Vec::with_capacity(len);
    if dims.len() == 1 {
        for _ in 0..len {
            items.push(decode_element(elem, payload)?);
        }
    } else {
        for _ in 0..len {
            items.push(decode_level(elem, &dims[1..], payload)?);
        }
    }
    Ok(Value::Array(items))
}

fn decode_element(elem: &Codec, payload: &mut Bytes) -> Result<Value, DataError> {
    let len = i32::from_be_bytes(take::<4>(payload, "array")?);
    if len == -1 {
        return Ok(Value::Null);
    }
    if len < 0 || payload.len() < len as usize {
        return Err(DataError::malformed("array"));
    }
    let mut field = payload.split_to(len as usize);
    let value = elem.decode_payload(&mut field)?;
    if !field.is_empty() {
        return Err(DataError::TrailingBytes { name: "array element", left: field.len() });
    }
    Ok(value)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::builtin;
    use crate::codec::test_util::{encode as encode_payload, roundtrip};
    use crate::postgres::oid;

    fn int4_array() -> &'static Codec {
        builtin(1007).unwrap()
    }

    #[test]
    fn two_dim_wire_form() {
        // [[1,2,3],[4,5,6]] per the documented frame
        let v = Value::Array(vec![
            Value::Array(vec![1.into(), 2.into(), 3.into()]),
            Value::Array(vec![4.into(), 5.into(), 6.into()]),
        ]);
        let bytes = encode_payload(int4_array(), &v);

        let mut expect = Vec::new();
        expect.extend_from_slice(&2i32.to_be_bytes()); // ndims
        expect.extend_from_slice(&0i32.to_be_bytes()); // flags
        expect.extend_from_slice(&oid::INT4.to_be_bytes()); // element oid
        expect.extend_from_slice(&2i32.to_be_bytes()); // dim 0
        expect.extend_from_slice(&1i32.to_be_bytes());
        expect.extend_from_slice(&3i32.to_be_bytes()); // dim 1
        expect.extend_from_slice(&1i32.to_be_bytes());
        for n in 1..=6i32 {
            expect.extend_from_slice(&4i32.to_be_bytes());
            expect.extend_from_slice(&n.to_be_bytes());
        }
        assert_eq!(bytes, expect);

        assert_eq!(roundtrip(int4_array(), &v), v);
    }

    #[test]
    fn one_dim_with_nulls() {
        let v = Value::Array(vec![1.into(), Value::Null, 3.into()]);
        assert_eq!(roundtrip(int4_array(), &v), v);
    }

    #[test]
    fn empty_array_has_no_dims() {
        let v = Value::Array(Vec::new());
        let bytes = encode_payload(int4_array(), &v);
        assert_eq!(bytes.len(), 12);
        assert_eq!(&bytes[..4], &0i32.to_be_bytes());
        assert_eq!(roundtrip(int4_array(), &v), v);
    }

    #[test]
    fn ragged_is_rejected() {
        let v = Value::Array(vec![
            Value::Array(vec![1.into(), 2.into()]),
            Value::Array(vec![3.into()]),
        ]);
        let mut buf = WriteBuffer::new();
        assert!(matches!(
            int4_array().encode_payload(&v, &mut buf),
            Err(DataError::RaggedArray)
        ));

        // mixing scalars and arrays at one level is a shape error too
        let v = Value::Array(vec![Value::Array(vec![1.into()]), 2.into()]);
        let mut buf = WriteBuffer::new();
        assert!(int4_array().encode_payload(&v, &mut buf).is_err());
    }

    #[test]
    fn depth_is_capped() {
        let mut v = Value::Int4(1);
        for _ in 0..7 {
            v = Value::Array(vec![v]);
        }
        let mut buf = WriteBuffer::new();
        assert!(matches!(
            int4_array().encode_payload(&v, &mut buf),
            Err(DataError::TooManyDimensions)
        ));
    }

    #[test]
    fn element_oid_is_checked() {
        let v = Value::Array(vec![1.into()]);
        let mut payload = Bytes::from(encode_payload(int4_array(), &v));
        // text[] decoding an int4[] payload must refuse
        let text_array = builtin(1009).unwrap();
        assert!(matches!(
            text_array.decode_payload(&mut payload.clone()),
            Err(DataError::ElementOidMismatch { .. })
        ));
        assert!(int4_array().decode_payload(&mut payload).is_ok());
    }

    #[test]
    fn text_element_roundtrip() {
        let text_array = builtin(1009).unwrap();
        let v = Value::Array(vec!["foo".into(), Value::Null, "".into()]);
        assert_eq!(roundtrip(text_array, &v), v);
    }
}
