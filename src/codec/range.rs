//! Range wire frame.
//!
//! One flags byte, then the present bounds in order, each as
//! `int32 length + payload`. Absent bounds are infinite on that side; the
//! empty range has no bounds at all.
use bytes::Bytes;

use super::{Codec, DataError, scalar::take};
use crate::io::WriteBuffer;
use crate::value::{PgRange, Value};

const RANGE_EMPTY: u8 = 0x01;
const RANGE_LB_INC: u8 = 0x02;
const RANGE_UB_INC: u8 = 0x04;
const RANGE_LB_INF: u8 = 0x08;
const RANGE_UB_INF: u8 = 0x10;

pub(crate) fn encode(elem: &Codec, value: &Value, buf: &mut WriteBuffer) -> Result<(), DataError> {
    let Value::Range(range) = value else {
        return Err(DataError::mismatch("range", value));
    };

    if range.empty {
        buf.write_byte(RANGE_EMPTY);
        return Ok(());
    }

    let mut flags = 0u8;
    if range.lower.is_none() {
        flags |= RANGE_LB_INF;
    } else if range.lower_inc {
        flags |= RANGE_LB_INC;
    }
    if range.upper.is_none() {
        flags |= RANGE_UB_INF;
    } else if range.upper_inc {
        flags |= RANGE_UB_INC;
    }
    buf.write_byte(flags);

    for bound in [&range.lower, &range.upper].into_iter().flatten() {
        if bound.is_null() {
            return Err(DataError::mismatch("range bound", bound));
        }
        elem.encode_field(bound, buf)?;
    }
    Ok(())
}

pub(crate) fn decode(elem: &Codec, payload: &mut Bytes) -> Result<Value, DataError> {
    let [flags] = take::<1>(payload, "range")?;

    if flags & RANGE_EMPTY != 0 {
        return Ok(Value::Range(Box::new(PgRange::empty())));
    }

    let lower = match flags & RANGE_LB_INF {
        0 => Some(decode_bound(elem, payload)?),
        _ => None,
    };
    let upper = match flags & RANGE_UB_INF {
        0 => Some(decode_bound(elem, payload)?),
        _ => None,
    };

    Ok(Value::Range(Box::new(PgRange {
        lower,
        upper,
        lower_inc: flags & RANGE_LB_INC != 0,
        upper_inc: flags & RANGE_UB_INC != 0,
        empty: false,
    })))
}

fn decode_bound(elem: &Codec, payload: &mut Bytes) -> Result<Value, DataError> {
    let len = i32::from_be_bytes(take::<4>(payload, "range")?);
    if len < 0 || payload.len() < len as usize {
        return Err(DataError::malformed("range"));
    }
    let mut field = payload.split_to(len as usize);
    let value = elem.decode_payload(&mut field)?;
    if !field.is_empty() {
        return Err(DataError::TrailingBytes { name: "range bound", left: field.len() });
    }
    Ok(value)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::builtin;
    use crate::codec::test_util::{encode as encode_payload, roundtrip};
    use crate::postgres::oid;

    fn int4range() -> &'static Codec {
        builtin(oid::INT4RANGE).unwrap()
    }

    #[test]
    fn canonical_range_roundtrip() {
        // [1, 10)
        let v = Value::Range(Box::new(PgRange::new(Some(1.into()), Some(10.into()))));
        assert_eq!(roundtrip(int4range(), &v), v);
    }

    #[test]
    fn empty_range_is_one_flag_byte() {
        let v = Value::Range(Box::new(PgRange::empty()));
        assert_eq!(encode_payload(int4range(), &v), [0x01]);
        assert_eq!(roundtrip(int4range(), &v), v);
    }

    #[test]
    fn unbounded_sides() {
        // (-inf, 5]
        let v = Value::Range(Box::new(PgRange {
            lower: None,
            upper: Some(5.into()),
            lower_inc: false,
            upper_inc: true,
            empty: false,
        }));
        let bytes = encode_payload(int4range(), &v);
        assert_eq!(bytes[0], RANGE_LB_INF | RANGE_UB_INC);
        assert_eq!(roundtrip(int4range(), &v), v);

        // (-inf, +inf)
        let v = Value::Range(Box::new(PgRange {
            lower: None,
            upper: None,
            lower_inc: false,
            upper_inc: false,
            empty: false,
        }));
        assert_eq!(encode_payload(int4range(), &v), [RANGE_LB_INF | RANGE_UB_INF]);
        assert_eq!(roundtrip(int4range(), &v), v);
    }

    #[test]
    fn tuple_shape_is_doubly_inclusive() {
        let v = Value::Range(Box::new(PgRange::from((Some(1.into()), None))));
        let bytes = encode_payload(int4range(), &v);
        assert_eq!(bytes[0], RANGE_LB_INC | RANGE_UB_INF);
    }

    #[test]
    fn null_bound_is_rejected() {
        let v = Value::Range(Box::new(PgRange::new(Some(Value::Null), None)));
        let mut buf = WriteBuffer::new();
        assert!(int4range().encode_payload(&v, &mut buf).is_err());
    }

    #[test]
    fn timestamp_range_roundtrip() {
        use crate::value::Timestamp;
        let tsrange = builtin(oid::TSRANGE).unwrap();
        let v = Value::Range(Box::new(PgRange::new(
            Some(Value::Timestamp(Timestamp::Finite(0))),
            Some(Value::Timestamp(Timestamp::PosInfinity)),
        )));
        assert_eq!(roundtrip(tsrange, &v), v);
    }
}
