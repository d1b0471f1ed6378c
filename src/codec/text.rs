//! Text-format codecs.
//!
//! Types whose binary form is impractical travel as their text
//! input/output representation: the payload is the session-encoded string,
//! both directions.
use super::DataError;
use crate::common::ByteStr;
use crate::io::WriteBuffer;
use crate::value::Value;

/// numeric: the NUMERIC_EXTERNAL decimal string.
pub(crate) fn encode_numeric(value: &Value, buf: &mut WriteBuffer) -> Result<(), DataError> {
    match value {
        Value::Numeric(s) => {
            if validate_numeric(s).is_none() {
                return Err(DataError::invalid_text("numeric", s));
            }
            buf.write_bytes(s.as_bytes());
        }
        Value::Int2(v) => {
            buf.write_bytes(itoa::Buffer::new().format(*v).as_bytes());
        }
        Value::Int4(v) => {
            buf.write_bytes(itoa::Buffer::new().format(*v).as_bytes());
        }
        Value::Int8(v) => {
            buf.write_bytes(itoa::Buffer::new().format(*v).as_bytes());
        }
        other => return Err(DataError::mismatch("numeric", other)),
    }
    Ok(())
}

pub(crate) fn decode_numeric_text(text: &str) -> Result<Value, DataError> {
    match validate_numeric(text) {
        Some(()) => Ok(Value::Numeric(ByteStr::copy_from_str(text))),
        None => Err(DataError::invalid_text("numeric", text)),
    }
}

/// Light shape check over the decimal text: sign, digits, one point,
/// optional exponent, or the NaN/Infinity spellings.
fn validate_numeric(text: &str) -> Option<()> {
    match text {
        "NaN" | "Infinity" | "-Infinity" => return Some(()),
        "" => return None,
        _ => {}
    }
    let rest = text.strip_prefix(['+', '-']).unwrap_or(text);
    let (mantissa, exponent) = match rest.split_once(['e', 'E']) {
        Some((m, e)) => (m, Some(e)),
        None => (rest, None),
    };
    let mut digits = 0;
    let mut points = 0;
    for b in mantissa.bytes() {
        match b {
            b'0'..=b'9' => digits += 1,
            b'.' => points += 1,
            _ => return None,
        }
    }
    if digits == 0 || points > 1 {
        return None;
    }
    if let Some(exponent) = exponent {
        let exponent = exponent.strip_prefix(['+', '-']).unwrap_or(exponent);
        if exponent.is_empty() || !exponent.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
    }
    Some(())
}

/// Everything else in the text fallback set: the value is an opaque
/// session-encoded string.
pub(crate) fn encode_verbatim(value: &Value, buf: &mut WriteBuffer) -> Result<(), DataError> {
    match value {
        Value::Text(s) => {
            buf.write_bytes(s.as_bytes());
            Ok(())
        }
        other => Err(DataError::mismatch("text", other)),
    }
}

pub(crate) fn decode_verbatim_text(text: &str) -> Result<Value, DataError> {
    Ok(Value::Text(ByteStr::copy_from_str(text)))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::builtin;
    use crate::codec::test_util::{encode, roundtrip};
    use crate::postgres::{PgFormat, oid};

    #[test]
    fn numeric_travels_as_text() {
        let codec = builtin(oid::NUMERIC).unwrap();
        assert_eq!(codec.format(), PgFormat::Text);

        let v = Value::Numeric(ByteStr::from_static("123456.789"));
        assert_eq!(encode(codec, &v), b"123456.789");
        assert_eq!(roundtrip(codec, &v), v);

        // exact decimal round-trip, sign and exponent included
        for s in ["-0.00001", "1e10", "-1.5E-3", "NaN", "Infinity", "-Infinity"] {
            let v = Value::Numeric(ByteStr::from_static(s));
            assert_eq!(roundtrip(codec, &v), v);
        }
    }

    #[test]
    fn numeric_accepts_integers() {
        let codec = builtin(oid::NUMERIC).unwrap();
        assert_eq!(encode(codec, &Value::Int8(-42)), b"-42");
    }

    #[test]
    fn numeric_rejects_garbage() {
        for s in ["", "abc", "1.2.3", "1e", "--5"] {
            assert!(decode_numeric_text(s).is_err(), "accepted {s:?}");
        }
    }

    #[test]
    fn money_is_verbatim_text() {
        let codec = builtin(oid::MONEY).unwrap();
        assert_eq!(codec.format(), PgFormat::Text);
        let v = Value::Text(ByteStr::from_static("$12.34"));
        assert_eq!(roundtrip(codec, &v), v);
    }

    #[test]
    fn tsvector_is_verbatim_text() {
        let codec = builtin(oid::TSVECTOR).unwrap();
        let v = Value::Text(ByteStr::from_static("'fat':2 'rat':3"));
        assert_eq!(roundtrip(codec, &v), v);
    }
}
