//! Binary codecs for the scalar built-ins.
use bytes::{Buf, Bytes};

use super::DataError;
use crate::common::ByteStr;
use crate::io::WriteBuffer;
use crate::value::{Bit, Tid, TxidSnapshot, Value};

/// Length-checked fixed-size read from a field payload.
pub(crate) fn take<const N: usize>(payload: &mut Bytes, name: &'static str) -> Result<[u8; N], DataError> {
    if payload.len() < N {
        return Err(DataError::malformed(name));
    }
    let mut out = [0u8; N];
    payload.copy_to_slice(&mut out);
    Ok(out)
}

// ===== bool =====

pub(crate) fn encode_bool(value: &Value, buf: &mut WriteBuffer) -> Result<(), DataError> {
    match value {
        Value::Bool(b) => {
            buf.write_byte(*b as u8);
            Ok(())
        }
        other => Err(DataError::mismatch("bool", other)),
    }
}

pub(crate) fn decode_bool(payload: &mut Bytes) -> Result<Value, DataError> {
    let [b] = take::<1>(payload, "bool")?;
    Ok(Value::Bool(b != 0))
}

pub(crate) fn decode_bool_text(text: &str) -> Result<Value, DataError> {
    match text {
        "t" | "true" | "yes" | "on" | "1" => Ok(Value::Bool(true)),
        "f" | "false" | "no" | "off" | "0" => Ok(Value::Bool(false)),
        _ => Err(DataError::invalid_text("bool", text)),
    }
}

// ===== integers =====

macro_rules! int_codec {
    ($enc:ident, $dec:ident, $dec_text:ident, $ty:ty, $variant:ident, $name:literal, $n:literal) => {
        pub(crate) fn $enc(value: &Value, buf: &mut WriteBuffer) -> Result<(), DataError> {
            let v: $ty = match *value {
                Value::Int2(v) => v.into(),
                Value::Int4(v) => v.try_into().map_err(|_| DataError::Overflow { name: $name })?,
                Value::Int8(v) => v.try_into().map_err(|_| DataError::Overflow { name: $name })?,
                ref other => return Err(DataError::mismatch($name, other)),
            };
            buf.write_bytes(&v.to_be_bytes());
            Ok(())
        }

        pub(crate) fn $dec(payload: &mut Bytes) -> Result<Value, DataError> {
            Ok(Value::$variant(<$ty>::from_be_bytes(take::<$n>(payload, $name)?)))
        }

        pub(crate) fn $dec_text(text: &str) -> Result<Value, DataError> {
            text.parse::<$ty>()
                .map(Value::$variant)
                .map_err(|_| DataError::invalid_text($name, text))
        }
    };
}

int_codec!(encode_int2, decode_int2, decode_int2_text, i16, Int2, "int2", 2);
int_codec!(encode_int4, decode_int4, decode_int4_text, i32, Int4, "int4", 4);
int_codec!(encode_int8, decode_int8, decode_int8_text, i64, Int8, "int8", 8);

// ===== oid and the reg* family =====

pub(crate) fn encode_oid(value: &Value, buf: &mut WriteBuffer) -> Result<(), DataError> {
    let v: u32 = match *value {
        Value::Oid(v) => v,
        Value::Int4(v) => v.try_into().map_err(|_| DataError::Overflow { name: "oid" })?,
        Value::Int8(v) => v.try_into().map_err(|_| DataError::Overflow { name: "oid" })?,
        ref other => return Err(DataError::mismatch("oid", other)),
    };
    buf.write_uint32(v);
    Ok(())
}

pub(crate) fn decode_oid(payload: &mut Bytes) -> Result<Value, DataError> {
    Ok(Value::Oid(u32::from_be_bytes(take::<4>(payload, "oid")?)))
}

pub(crate) fn decode_oid_text(text: &str) -> Result<Value, DataError> {
    // the reg* types also travel as textual object names
    match text.parse::<u32>() {
        Ok(v) => Ok(Value::Oid(v)),
        Err(_) => Ok(Value::Text(ByteStr::copy_from_str(text))),
    }
}

// ===== floats =====

pub(crate) fn encode_float4(value: &Value, buf: &mut WriteBuffer) -> Result<(), DataError> {
    match *value {
        Value::Float4(v) => {
            buf.write_float32(v);
            Ok(())
        }
        ref other => Err(DataError::mismatch("float4", other)),
    }
}

pub(crate) fn decode_float4(payload: &mut Bytes) -> Result<Value, DataError> {
    Ok(Value::Float4(f32::from_be_bytes(take::<4>(payload, "float4")?)))
}

pub(crate) fn decode_float4_text(text: &str) -> Result<Value, DataError> {
    parse_float(text).map(|v| Value::Float4(v as f32)).ok_or_else(|| DataError::invalid_text("float4", text))
}

pub(crate) fn encode_float8(value: &Value, buf: &mut WriteBuffer) -> Result<(), DataError> {
    match *value {
        Value::Float8(v) => buf.write_float64(v),
        Value::Float4(v) => buf.write_float64(v.into()),
        ref other => return Err(DataError::mismatch("float8", other)),
    };
    Ok(())
}

pub(crate) fn decode_float8(payload: &mut Bytes) -> Result<Value, DataError> {
    Ok(Value::Float8(f64::from_be_bytes(take::<8>(payload, "float8")?)))
}

pub(crate) fn decode_float8_text(text: &str) -> Result<Value, DataError> {
    parse_float(text).map(Value::Float8).ok_or_else(|| DataError::invalid_text("float8", text))
}

fn parse_float(text: &str) -> Option<f64> {
    match text {
        "NaN" => Some(f64::NAN),
        "Infinity" => Some(f64::INFINITY),
        "-Infinity" => Some(f64::NEG_INFINITY),
        _ => text.parse().ok(),
    }
}

// ===== the session-encoded string family =====

pub(crate) fn encode_text_like(value: &Value, buf: &mut WriteBuffer) -> Result<(), DataError> {
    match value {
        Value::Text(s) => {
            buf.write_bytes(s.as_bytes());
            Ok(())
        }
        other => Err(DataError::mismatch("text", other)),
    }
}

pub(crate) fn decode_text_like(payload: &mut Bytes) -> Result<Value, DataError> {
    let out = ByteStr::from_utf8(payload.split_to(payload.len())).map_err(DataError::Utf8)?;
    Ok(Value::Text(out))
}

pub(crate) fn decode_text_value(text: &str) -> Result<Value, DataError> {
    Ok(Value::Text(ByteStr::copy_from_str(text)))
}

// "char" is a single byte on the wire
pub(crate) fn encode_char(value: &Value, buf: &mut WriteBuffer) -> Result<(), DataError> {
    match value {
        Value::Text(s) if s.len() == 1 => {
            buf.write_bytes(s.as_bytes());
            Ok(())
        }
        other => Err(DataError::mismatch("char", other)),
    }
}

// ===== bytea =====

pub(crate) fn encode_bytea(value: &Value, buf: &mut WriteBuffer) -> Result<(), DataError> {
    match value {
        Value::Bytea(b) => {
            buf.write_bytes(b);
            Ok(())
        }
        other => Err(DataError::mismatch("bytea", other)),
    }
}

pub(crate) fn decode_bytea(payload: &mut Bytes) -> Result<Value, DataError> {
    Ok(Value::Bytea(payload.split_to(payload.len())))
}

pub(crate) fn decode_bytea_text(text: &str) -> Result<Value, DataError> {
    // hex output format, `\x` followed by pairs
    let Some(hex) = text.strip_prefix("\\x") else {
        return Err(DataError::invalid_text("bytea", text));
    };
    if hex.len() % 2 != 0 {
        return Err(DataError::invalid_text("bytea", text));
    }
    let mut out = Vec::with_capacity(hex.len() / 2);
    let digits = hex.as_bytes();
    for pair in digits.chunks_exact(2) {
        let hi = hex_digit(pair[0]).ok_or_else(|| DataError::invalid_text("bytea", text))?;
        let lo = hex_digit(pair[1]).ok_or_else(|| DataError::invalid_text("bytea", text))?;
        out.push(hi << 4 | lo);
    }
    Ok(Value::Bytea(out.into()))
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

// ===== uuid =====

pub(crate) fn encode_uuid(value: &Value, buf: &mut WriteBuffer) -> Result<(), DataError> {
    match value {
        Value::Uuid(u) => {
            buf.write_bytes(u);
            Ok(())
        }
        other => Err(DataError::mismatch("uuid", other)),
    }
}

pub(crate) fn decode_uuid(payload: &mut Bytes) -> Result<Value, DataError> {
    Ok(Value::Uuid(take::<16>(payload, "uuid")?))
}

pub(crate) fn decode_uuid_text(text: &str) -> Result<Value, DataError> {
    let mut out = [0u8; 16];
    let mut nibbles = 0;
    for b in text.bytes() {
        if b == b'-' {
            continue;
        }
        let Some(digit) = hex_digit(b) else {
            return Err(DataError::invalid_text("uuid", text));
        };
        if nibbles == 32 {
            return Err(DataError::invalid_text("uuid", text));
        }
        out[nibbles / 2] = out[nibbles / 2] << 4 | digit;
        nibbles += 1;
    }
    if nibbles != 32 {
        return Err(DataError::invalid_text("uuid", text));
    }
    Ok(Value::Uuid(out))
}

// ===== json / jsonb =====

pub(crate) fn encode_json(value: &Value, buf: &mut WriteBuffer) -> Result<(), DataError> {
    match value {
        Value::Json(s) | Value::Text(s) => {
            buf.write_bytes(s.as_bytes());
            Ok(())
        }
        other => Err(DataError::mismatch("json", other)),
    }
}

pub(crate) fn decode_json(payload: &mut Bytes) -> Result<Value, DataError> {
    let out = ByteStr::from_utf8(payload.split_to(payload.len())).map_err(DataError::Utf8)?;
    Ok(Value::Json(out))
}

pub(crate) fn decode_json_text(text: &str) -> Result<Value, DataError> {
    Ok(Value::Json(ByteStr::copy_from_str(text)))
}

const JSONB_VERSION: u8 = 1;

pub(crate) fn encode_jsonb(value: &Value, buf: &mut WriteBuffer) -> Result<(), DataError> {
    match value {
        Value::Jsonb(s) | Value::Json(s) | Value::Text(s) => {
            buf.write_byte(JSONB_VERSION);
            buf.write_bytes(s.as_bytes());
            Ok(())
        }
        other => Err(DataError::mismatch("jsonb", other)),
    }
}

pub(crate) fn decode_jsonb(payload: &mut Bytes) -> Result<Value, DataError> {
    let [version] = take::<1>(payload, "jsonb")?;
    if version != JSONB_VERSION {
        return Err(DataError::JsonbVersion(version));
    }
    let out = ByteStr::from_utf8(payload.split_to(payload.len())).map_err(DataError::Utf8)?;
    Ok(Value::Jsonb(out))
}

pub(crate) fn decode_jsonb_text(text: &str) -> Result<Value, DataError> {
    Ok(Value::Jsonb(ByteStr::copy_from_str(text)))
}

// jsonpath shares the version-prefixed frame of jsonb
pub(crate) fn encode_jsonpath(value: &Value, buf: &mut WriteBuffer) -> Result<(), DataError> {
    match value {
        Value::Text(s) => {
            buf.write_byte(JSONB_VERSION);
            buf.write_bytes(s.as_bytes());
            Ok(())
        }
        other => Err(DataError::mismatch("jsonpath", other)),
    }
}

pub(crate) fn decode_jsonpath(payload: &mut Bytes) -> Result<Value, DataError> {
    let [version] = take::<1>(payload, "jsonpath")?;
    if version != JSONB_VERSION {
        return Err(DataError::JsonbVersion(version));
    }
    decode_text_like(payload)
}

// ===== bit / varbit =====

pub(crate) fn encode_bit(value: &Value, buf: &mut WriteBuffer) -> Result<(), DataError> {
    match value {
        Value::Bit(bit) => {
            if bit.bits < 0 || bit.data.len() != (bit.bits as usize).div_ceil(8) {
                return Err(DataError::mismatch("bit", value));
            }
            buf.write_int32(bit.bits);
            buf.write_bytes(&bit.data);
            Ok(())
        }
        other => Err(DataError::mismatch("bit", other)),
    }
}

pub(crate) fn decode_bit(payload: &mut Bytes) -> Result<Value, DataError> {
    let bits = i32::from_be_bytes(take::<4>(payload, "bit")?);
    if bits < 0 || payload.len() != (bits as usize).div_ceil(8) {
        return Err(DataError::malformed("bit"));
    }
    Ok(Value::Bit(Bit { bits, data: payload.split_to(payload.len()) }))
}

pub(crate) fn decode_bit_text(text: &str) -> Result<Value, DataError> {
    let mut data = vec![0u8; text.len().div_ceil(8)];
    for (i, c) in text.bytes().enumerate() {
        match c {
            b'1' => data[i / 8] |= 0x80 >> (i % 8),
            b'0' => {}
            _ => return Err(DataError::invalid_text("bit", text)),
        }
    }
    Ok(Value::Bit(Bit { bits: text.len() as i32, data: data.into() }))
}

// ===== tid =====

pub(crate) fn encode_tid(value: &Value, buf: &mut WriteBuffer) -> Result<(), DataError> {
    match *value {
        Value::Tid(tid) => {
            buf.write_uint32(tid.block);
            buf.write_int16(tid.offset as i16);
            Ok(())
        }
        ref other => Err(DataError::mismatch("tid", other)),
    }
}

pub(crate) fn decode_tid(payload: &mut Bytes) -> Result<Value, DataError> {
    let block = u32::from_be_bytes(take::<4>(payload, "tid")?);
    let offset = u16::from_be_bytes(take::<2>(payload, "tid")?);
    Ok(Value::Tid(Tid { block, offset }))
}

pub(crate) fn decode_tid_text(text: &str) -> Result<Value, DataError> {
    let err = || DataError::invalid_text("tid", text);
    let inner = text.strip_prefix('(').and_then(|t| t.strip_suffix(')')).ok_or_else(err)?;
    let (block, offset) = inner.split_once(',').ok_or_else(err)?;
    Ok(Value::Tid(Tid {
        block: block.parse().map_err(|_| err())?,
        offset: offset.parse().map_err(|_| err())?,
    }))
}

// ===== txid_snapshot =====

pub(crate) fn encode_txid_snapshot(value: &Value, buf: &mut WriteBuffer) -> Result<(), DataError> {
    match value {
        Value::TxidSnapshot(snap) => {
            buf.write_int32(snap.xip.len() as i32);
            buf.write_int64(snap.xmin as i64);
            buf.write_int64(snap.xmax as i64);
            for xid in &snap.xip {
                buf.write_int64(*xid as i64);
            }
            Ok(())
        }
        other => Err(DataError::mismatch("txid_snapshot", other)),
    }
}

pub(crate) fn decode_txid_snapshot(payload: &mut Bytes) -> Result<Value, DataError> {
    let nxip = i32::from_be_bytes(take::<4>(payload, "txid_snapshot")?);
    if nxip < 0 {
        return Err(DataError::malformed("txid_snapshot"));
    }
    let xmin = i64::from_be_bytes(take::<8>(payload, "txid_snapshot")?) as u64;
    let xmax = i64::from_be_bytes(take::<8>(payload, "txid_snapshot")?) as u64;
    let mut xip = Vec::with_capacity(nxip as usize);
    for _ in 0..nxip {
        xip.push(i64::from_be_bytes(take::<8>(payload, "txid_snapshot")?) as u64);
    }
    Ok(Value::TxidSnapshot(TxidSnapshot { xmin, xmax, xip }))
}

// ===== void =====

pub(crate) fn encode_void(value: &Value, _: &mut WriteBuffer) -> Result<(), DataError> {
    match value {
        Value::Void => Ok(()),
        other => Err(DataError::mismatch("void", other)),
    }
}

pub(crate) fn decode_void(payload: &mut Bytes) -> Result<Value, DataError> {
    if !payload.is_empty() {
        return Err(DataError::malformed("void"));
    }
    Ok(Value::Void)
}

pub(crate) fn decode_void_text(_: &str) -> Result<Value, DataError> {
    Ok(Value::Void)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::test_util::roundtrip;
    use crate::codec::builtin;
    use crate::postgres::oid;

    #[test]
    fn int_roundtrips() {
        let int2 = builtin(oid::INT2).unwrap();
        let int4 = builtin(oid::INT4).unwrap();
        let int8 = builtin(oid::INT8).unwrap();

        for v in [i16::MIN, -1, 0, 1, i16::MAX] {
            assert_eq!(roundtrip(int2, &v.into()), v.into());
        }
        for v in [i32::MIN, -1, 0, 1, i32::MAX] {
            assert_eq!(roundtrip(int4, &v.into()), v.into());
        }
        for v in [i64::MIN, -1, 0, 1, i64::MAX] {
            assert_eq!(roundtrip(int8, &v.into()), v.into());
        }
    }

    #[test]
    fn int_widening_and_overflow() {
        let int2 = builtin(oid::INT2).unwrap();
        // an in-range int8 narrows
        assert_eq!(roundtrip(int2, &Value::Int8(7)), Value::Int2(7));
        // out of range is a data error, not a wrap
        let mut buf = WriteBuffer::new();
        assert!(matches!(
            int2.encode_field(&Value::Int4(40_000), &mut buf),
            Err(DataError::Overflow { .. })
        ));
    }

    #[test]
    fn int4_wire_form() {
        let int4 = builtin(oid::INT4).unwrap();
        let bytes = crate::codec::test_util::encode(int4, &Value::Int4(1));
        assert_eq!(bytes, [0x00, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn bool_wire_form() {
        let codec = builtin(oid::BOOL).unwrap();
        assert_eq!(crate::codec::test_util::encode(codec, &true.into()), [0x01]);
        assert_eq!(crate::codec::test_util::encode(codec, &false.into()), [0x00]);
        assert_eq!(roundtrip(codec, &true.into()), true.into());
        assert_eq!(decode_bool_text("t").unwrap(), true.into());
    }

    #[test]
    fn float_roundtrips() {
        let float4 = builtin(oid::FLOAT4).unwrap();
        let float8 = builtin(oid::FLOAT8).unwrap();
        assert_eq!(roundtrip(float4, &Value::Float4(1.25)), Value::Float4(1.25));
        assert_eq!(roundtrip(float8, &Value::Float8(-2.5e300)), Value::Float8(-2.5e300));
        // NaN keeps its bit pattern class
        match roundtrip(float8, &Value::Float8(f64::NAN)) {
            Value::Float8(v) => assert!(v.is_nan()),
            other => panic!("{other:?}"),
        }
        assert_eq!(decode_float8_text("-Infinity").unwrap(), Value::Float8(f64::NEG_INFINITY));
    }

    #[test]
    fn bytea_text_form() {
        assert_eq!(
            decode_bytea_text("\\x01ff").unwrap(),
            Value::Bytea(vec![0x01, 0xff].into()),
        );
        assert!(decode_bytea_text("01ff").is_err());
    }

    #[test]
    fn uuid_roundtrip_and_text() {
        let codec = builtin(oid::UUID).unwrap();
        let uuid = [0xb8u8; 16];
        assert_eq!(roundtrip(codec, &Value::Uuid(uuid)), Value::Uuid(uuid));

        assert_eq!(
            decode_uuid_text("a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11").unwrap(),
            Value::Uuid([
                0xa0, 0xee, 0xbc, 0x99, 0x9c, 0x0b, 0x4e, 0xf8,
                0xbb, 0x6d, 0x6b, 0xb9, 0xbd, 0x38, 0x0a, 0x11,
            ]),
        );
        assert!(decode_uuid_text("a0eebc99").is_err());
    }

    #[test]
    fn jsonb_requires_version() {
        let codec = builtin(oid::JSONB).unwrap();
        let v = Value::Jsonb(ByteStr::from_static("{\"a\":1}"));
        assert_eq!(roundtrip(codec, &v), v);

        let mut bad = Bytes::from_static(b"\x02{}");
        assert!(matches!(decode_jsonb(&mut bad), Err(DataError::JsonbVersion(2))));
    }

    #[test]
    fn bit_text_and_roundtrip() {
        let codec = builtin(oid::VARBIT).unwrap();
        let v = decode_bit_text("101000001").unwrap();
        assert_eq!(
            v,
            Value::Bit(Bit { bits: 9, data: vec![0b1010_0000, 0b1000_0000].into() }),
        );
        assert_eq!(roundtrip(codec, &v), v);
    }

    #[test]
    fn tid_forms() {
        let codec = builtin(oid::TID).unwrap();
        let v = Value::Tid(Tid { block: 81, offset: 3 });
        assert_eq!(roundtrip(codec, &v), v);
        assert_eq!(decode_tid_text("(81,3)").unwrap(), v);
    }

    #[test]
    fn txid_snapshot_roundtrip() {
        let codec = builtin(oid::TXID_SNAPSHOT).unwrap();
        let v = Value::TxidSnapshot(TxidSnapshot { xmin: 700, xmax: 742, xip: vec![701, 722] });
        assert_eq!(roundtrip(codec, &v), v);
    }

    #[test]
    fn void_is_zero_length() {
        let codec = builtin(oid::VOID).unwrap();
        assert_eq!(crate::codec::test_util::encode(codec, &Value::Void), Vec::<u8>::new());
        assert_eq!(roundtrip(codec, &Value::Void), Value::Void);
    }

    #[test]
    fn short_payload_is_data_error() {
        let mut short = Bytes::from_static(&[0, 0, 1]);
        assert!(decode_int4(&mut short).is_err());
    }
}
