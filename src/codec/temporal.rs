//! Binary codecs for the date/time built-ins.
//!
//! Days and microseconds are counted from the postgres epoch, 2000-01-01.
//! `date` reserves `0x7FFFFFFF`/`0x80000000` and the eight-byte timestamps
//! reserve `0x7FFF…FF`/`0x8000…00` for the two infinities.
use bytes::Bytes;

use super::{DataError, scalar::take};
use crate::io::WriteBuffer;
use crate::value::{Date, Interval, Time, TimeTz, Timestamp, Value};

const MICROS_PER_SEC: i64 = 1_000_000;
const MICROS_PER_DAY: i64 = 86_400 * MICROS_PER_SEC;

/// Days from 1970-01-01 to 2000-01-01.
const UNIX_TO_PG_DAYS: i64 = 10_957;

// ===== date =====

pub(crate) fn encode_date(value: &Value, buf: &mut WriteBuffer) -> Result<(), DataError> {
    let days = match *value {
        Value::Date(Date::Finite(days)) => days,
        Value::Date(Date::PosInfinity) => i32::MAX,
        Value::Date(Date::NegInfinity) => i32::MIN,
        ref other => return Err(DataError::mismatch("date", other)),
    };
    buf.write_int32(days);
    Ok(())
}

pub(crate) fn decode_date(payload: &mut Bytes) -> Result<Value, DataError> {
    let days = i32::from_be_bytes(take::<4>(payload, "date")?);
    Ok(Value::Date(match days {
        i32::MAX => Date::PosInfinity,
        i32::MIN => Date::NegInfinity,
        days => Date::Finite(days),
    }))
}

pub(crate) fn decode_date_text(text: &str) -> Result<Value, DataError> {
    match text {
        "infinity" => return Ok(Value::Date(Date::PosInfinity)),
        "-infinity" => return Ok(Value::Date(Date::NegInfinity)),
        _ => {}
    }
    let (days, rest) = parse_date(text).ok_or_else(|| DataError::invalid_text("date", text))?;
    if !rest.is_empty() {
        return Err(DataError::invalid_text("date", text));
    }
    Ok(Value::Date(Date::Finite(days)))
}

// ===== time / timetz =====

pub(crate) fn encode_time(value: &Value, buf: &mut WriteBuffer) -> Result<(), DataError> {
    match *value {
        Value::Time(Time { micros }) => {
            // 24:00:00 is a valid postgres time of day
            if !(0..=MICROS_PER_DAY).contains(&micros) {
                return Err(DataError::Overflow { name: "time" });
            }
            buf.write_int64(micros);
            Ok(())
        }
        ref other => Err(DataError::mismatch("time", other)),
    }
}

pub(crate) fn decode_time(payload: &mut Bytes) -> Result<Value, DataError> {
    let micros = i64::from_be_bytes(take::<8>(payload, "time")?);
    Ok(Value::Time(Time { micros }))
}

pub(crate) fn decode_time_text(text: &str) -> Result<Value, DataError> {
    let (micros, rest) = parse_time(text).ok_or_else(|| DataError::invalid_text("time", text))?;
    if !rest.is_empty() {
        return Err(DataError::invalid_text("time", text));
    }
    Ok(Value::Time(Time { micros }))
}

pub(crate) fn encode_timetz(value: &Value, buf: &mut WriteBuffer) -> Result<(), DataError> {
    match *value {
        Value::TimeTz(TimeTz { micros, offset_secs }) => {
            if !(0..=MICROS_PER_DAY).contains(&micros) {
                return Err(DataError::Overflow { name: "timetz" });
            }
            buf.write_int64(micros);
            // the wire stores seconds west of UTC, opposite of the host
            // convention
            buf.write_int32(-offset_secs);
            Ok(())
        }
        ref other => Err(DataError::mismatch("timetz", other)),
    }
}

pub(crate) fn decode_timetz(payload: &mut Bytes) -> Result<Value, DataError> {
    let micros = i64::from_be_bytes(take::<8>(payload, "timetz")?);
    let west = i32::from_be_bytes(take::<4>(payload, "timetz")?);
    Ok(Value::TimeTz(TimeTz { micros, offset_secs: -west }))
}

pub(crate) fn decode_timetz_text(text: &str) -> Result<Value, DataError> {
    let err = || DataError::invalid_text("timetz", text);
    let (micros, rest) = parse_time(text).ok_or_else(err)?;
    let offset_secs = parse_offset(rest).ok_or_else(err)?;
    Ok(Value::TimeTz(TimeTz { micros, offset_secs }))
}

// ===== timestamp / timestamptz =====

fn timestamp_micros(value: &Timestamp) -> i64 {
    match value {
        Timestamp::Finite(micros) => *micros,
        Timestamp::PosInfinity => i64::MAX,
        Timestamp::NegInfinity => i64::MIN,
    }
}

pub(crate) fn encode_timestamp(value: &Value, buf: &mut WriteBuffer) -> Result<(), DataError> {
    match value {
        Value::Timestamp(ts) => {
            buf.write_int64(timestamp_micros(ts));
            Ok(())
        }
        other => Err(DataError::mismatch("timestamp", other)),
    }
}

pub(crate) fn encode_timestamptz(value: &Value, buf: &mut WriteBuffer) -> Result<(), DataError> {
    match value {
        // a naive timestamp binds as UTC; the naive zone is lost
        Value::TimestampTz(ts) | Value::Timestamp(ts) => {
            buf.write_int64(timestamp_micros(ts));
            Ok(())
        }
        other => Err(DataError::mismatch("timestamptz", other)),
    }
}

fn decode_timestamp_micros(payload: &mut Bytes, name: &'static str) -> Result<Timestamp, DataError> {
    let micros = i64::from_be_bytes(take::<8>(payload, name)?);
    Ok(match micros {
        i64::MAX => Timestamp::PosInfinity,
        i64::MIN => Timestamp::NegInfinity,
        micros => Timestamp::Finite(micros),
    })
}

pub(crate) fn decode_timestamp(payload: &mut Bytes) -> Result<Value, DataError> {
    Ok(Value::Timestamp(decode_timestamp_micros(payload, "timestamp")?))
}

pub(crate) fn decode_timestamptz(payload: &mut Bytes) -> Result<Value, DataError> {
    Ok(Value::TimestampTz(decode_timestamp_micros(payload, "timestamptz")?))
}

pub(crate) fn decode_timestamp_text(text: &str) -> Result<Value, DataError> {
    parse_timestamp(text, false)
        .map(Value::Timestamp)
        .ok_or_else(|| DataError::invalid_text("timestamp", text))
}

pub(crate) fn decode_timestamptz_text(text: &str) -> Result<Value, DataError> {
    parse_timestamp(text, true)
        .map(Value::TimestampTz)
        .ok_or_else(|| DataError::invalid_text("timestamptz", text))
}

// ===== interval =====

pub(crate) fn encode_interval(value: &Value, buf: &mut WriteBuffer) -> Result<(), DataError> {
    match *value {
        Value::Interval(Interval { micros, days, months }) => {
            buf.write_int64(micros);
            buf.write_int32(days);
            buf.write_int32(months);
            Ok(())
        }
        ref other => Err(DataError::mismatch("interval", other)),
    }
}

pub(crate) fn decode_interval(payload: &mut Bytes) -> Result<Value, DataError> {
    let micros = i64::from_be_bytes(take::<8>(payload, "interval")?);
    let days = i32::from_be_bytes(take::<4>(payload, "interval")?);
    let months = i32::from_be_bytes(take::<4>(payload, "interval")?);
    Ok(Value::Interval(Interval { micros, days, months }))
}

// ===== text parsing =====

/// Days since 1970-01-01 for a civil date; branchless era arithmetic.
fn days_from_civil(y: i32, m: u32, d: u32) -> i64 {
    let y = i64::from(y) - i64::from(m <= 2);
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let mp = i64::from(if m > 2 { m - 3 } else { m + 9 });
    let doy = (153 * mp + 2) / 5 + i64::from(d) - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// Parse `YYYY-MM-DD`, returning postgres-epoch days and the rest.
fn parse_date(text: &str) -> Option<(i32, &str)> {
    let (y, rest) = take_int(text, b'-')?;
    let (m, rest) = take_int(rest, b'-')?;
    let (d, rest) = take_digits(rest)?;
    if !(1..=12).contains(&m) || !(1..=31).contains(&d) {
        return None;
    }
    let days = days_from_civil(y as i32, m as u32, d as u32) - UNIX_TO_PG_DAYS;
    Some((i32::try_from(days).ok()?, rest))
}

/// Parse `HH:MM:SS[.ffffff]`, returning microseconds since midnight and the
/// rest.
fn parse_time(text: &str) -> Option<(i64, &str)> {
    let (h, rest) = take_int(text, b':')?;
    let (m, rest) = take_int(rest, b':')?;
    let (s, mut rest) = take_digits(rest)?;
    if h > 24 || m > 59 || s > 60 {
        return None;
    }
    let mut micros = (h * 3600 + m * 60 + s) * MICROS_PER_SEC;
    if let Some(frac) = rest.strip_prefix('.') {
        let end = frac.bytes().position(|b| !b.is_ascii_digit()).unwrap_or(frac.len());
        let digits = &frac[..end];
        if digits.is_empty() || digits.len() > 6 {
            return None;
        }
        let frac_val: i64 = digits.parse().ok()?;
        micros += frac_val * 10i64.pow(6 - digits.len() as u32);
        rest = &frac[end..];
    }
    Some((micros, rest))
}

/// Parse `[+|-]HH[:MM[:SS]]`, returning seconds east of UTC.
fn parse_offset(text: &str) -> Option<i32> {
    let (sign, rest) = match text.as_bytes().first()? {
        b'+' => (1, &text[1..]),
        b'-' => (-1, &text[1..]),
        _ => return None,
    };
    let mut parts = rest.split(':');
    let hours: i32 = parts.next()?.parse().ok()?;
    let minutes: i32 = parts.next().map(str::parse).transpose().ok()?.unwrap_or(0);
    let seconds: i32 = parts.next().map(str::parse).transpose().ok()?.unwrap_or(0);
    Some(sign * (hours * 3600 + minutes * 60 + seconds))
}

fn parse_timestamp(text: &str, with_offset: bool) -> Option<Timestamp> {
    match text {
        "infinity" => return Some(Timestamp::PosInfinity),
        "-infinity" => return Some(Timestamp::NegInfinity),
        _ => {}
    }
    let (days, rest) = parse_date(text)?;
    let rest = rest.strip_prefix([' ', 'T'])?;
    let (time_micros, rest) = parse_time(rest)?;
    let mut micros = i64::from(days) * MICROS_PER_DAY + time_micros;
    if with_offset {
        micros -= i64::from(parse_offset(rest)?) * MICROS_PER_SEC;
    } else if !rest.is_empty() {
        return None;
    }
    Some(Timestamp::Finite(micros))
}

fn take_int(text: &str, delim: u8) -> Option<(i64, &str)> {
    let (v, rest) = take_digits(text)?;
    if *rest.as_bytes().first()? != delim {
        return None;
    }
    Some((v, &rest[1..]))
}

fn take_digits(text: &str) -> Option<(i64, &str)> {
    let end = text.bytes().position(|b| !b.is_ascii_digit()).unwrap_or(text.len());
    if end == 0 {
        return None;
    }
    Some((text[..end].parse().ok()?, &text[end..]))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::builtin;
    use crate::codec::test_util::{encode, roundtrip};
    use crate::postgres::oid;

    #[test]
    fn date_roundtrip_and_sentinels() {
        let codec = builtin(oid::DATE).unwrap();
        for v in [Date::Finite(0), Date::Finite(-10_957), Date::PosInfinity, Date::NegInfinity] {
            assert_eq!(roundtrip(codec, &Value::Date(v)), Value::Date(v));
        }
        assert_eq!(encode(codec, &Value::Date(Date::PosInfinity)), 0x7FFF_FFFFi32.to_be_bytes());
        assert_eq!(
            encode(codec, &Value::Date(Date::NegInfinity)),
            0x8000_0000u32.to_be_bytes(),
        );
    }

    #[test]
    fn date_text_form() {
        // postgres epoch day zero
        assert_eq!(decode_date_text("2000-01-01").unwrap(), Value::Date(Date::Finite(0)));
        assert_eq!(decode_date_text("2000-01-02").unwrap(), Value::Date(Date::Finite(1)));
        assert_eq!(decode_date_text("1970-01-01").unwrap(), Value::Date(Date::Finite(-10_957)));
        assert_eq!(decode_date_text("infinity").unwrap(), Value::Date(Date::PosInfinity));
        assert!(decode_date_text("2000-13-01").is_err());
    }

    #[test]
    fn timestamp_sentinel_wire_form() {
        let codec = builtin(oid::TIMESTAMPTZ).unwrap();
        let inf = Value::TimestampTz(Timestamp::PosInfinity);
        assert_eq!(encode(codec, &inf), 0x7FFF_FFFF_FFFF_FFFFi64.to_be_bytes());
        assert_eq!(roundtrip(codec, &inf), inf);
        let ninf = Value::TimestampTz(Timestamp::NegInfinity);
        assert_eq!(encode(codec, &ninf), 0x8000_0000_0000_0000u64.to_be_bytes());
        assert_eq!(roundtrip(codec, &ninf), ninf);
    }

    #[test]
    fn timestamp_text_form() {
        assert_eq!(
            decode_timestamp_text("2000-01-01 00:00:01").unwrap(),
            Value::Timestamp(Timestamp::Finite(1_000_000)),
        );
        assert_eq!(
            decode_timestamp_text("2000-01-02 00:00:00.5").unwrap(),
            Value::Timestamp(Timestamp::Finite(86_400_500_000)),
        );
        // offset is folded into UTC
        assert_eq!(
            decode_timestamptz_text("2000-01-01 02:00:00+02").unwrap(),
            Value::TimestampTz(Timestamp::Finite(0)),
        );
        assert!(decode_timestamp_text("2000-01-01").is_err());
    }

    #[test]
    fn time_bounds() {
        let codec = builtin(oid::TIME).unwrap();
        let v = Value::Time(Time { micros: 86_400_000_000 });
        assert_eq!(roundtrip(codec, &v), v);

        let mut buf = WriteBuffer::new();
        assert!(matches!(
            codec.encode_payload(&Value::Time(Time { micros: -1 }), &mut buf),
            Err(DataError::Overflow { .. })
        ));
        assert_eq!(
            decode_time_text("13:37:00.25").unwrap(),
            Value::Time(Time { micros: (13 * 3600 + 37 * 60) as i64 * 1_000_000 + 250_000 }),
        );
    }

    #[test]
    fn timetz_flips_offset_sign() {
        let codec = builtin(oid::TIMETZ).unwrap();
        let v = Value::TimeTz(TimeTz { micros: 3_600_000_000, offset_secs: 7200 });
        // wire stores seconds west, host value is seconds east
        let bytes = encode(codec, &v);
        assert_eq!(&bytes[8..], &(-7200i32).to_be_bytes());
        assert_eq!(roundtrip(codec, &v), v);
        assert_eq!(
            decode_timetz_text("01:00:00+02").unwrap(),
            Value::TimeTz(TimeTz { micros: 3_600_000_000, offset_secs: 7200 }),
        );
    }

    #[test]
    fn interval_roundtrip() {
        let codec = builtin(oid::INTERVAL).unwrap();
        let v = Value::Interval(Interval { micros: 12_345, days: -3, months: 14 });
        assert_eq!(roundtrip(codec, &v), v);
    }
}
