//! Binary codecs for `inet` and `cidr`.
use bytes::Bytes;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use super::{DataError, scalar::take};
use crate::io::WriteBuffer;
use crate::value::{Inet, Value};

/// Address family bytes on the wire: `PGSQL_AF_INET` and `+1` for v6.
const FAMILY_INET: u8 = 2;
const FAMILY_INET6: u8 = 3;

fn encode_inet_inner(value: &Value, is_cidr: bool, buf: &mut WriteBuffer) -> Result<(), DataError> {
    let name = if is_cidr { "cidr" } else { "inet" };
    let inet = match value {
        Value::Inet(inet) => *inet,
        other => return Err(DataError::mismatch(name, other)),
    };
    match inet.addr {
        IpAddr::V4(v4) => {
            if inet.prefix > 32 {
                return Err(DataError::Overflow { name });
            }
            buf.write_byte(FAMILY_INET);
            buf.write_byte(inet.prefix);
            buf.write_byte(is_cidr as u8);
            buf.write_byte(4);
            buf.write_bytes(&v4.octets());
        }
        IpAddr::V6(v6) => {
            if inet.prefix > 128 {
                return Err(DataError::Overflow { name });
            }
            buf.write_byte(FAMILY_INET6);
            buf.write_byte(inet.prefix);
            buf.write_byte(is_cidr as u8);
            buf.write_byte(16);
            buf.write_bytes(&v6.octets());
        }
    }
    Ok(())
}

pub(crate) fn encode_inet(value: &Value, buf: &mut WriteBuffer) -> Result<(), DataError> {
    encode_inet_inner(value, false, buf)
}

pub(crate) fn encode_cidr(value: &Value, buf: &mut WriteBuffer) -> Result<(), DataError> {
    encode_inet_inner(value, true, buf)
}

pub(crate) fn decode_inet(payload: &mut Bytes) -> Result<Value, DataError> {
    let [family, prefix, is_cidr, len] = take::<4>(payload, "inet")?;
    let addr = match (family, len) {
        (FAMILY_INET, 4) => IpAddr::V4(Ipv4Addr::from(take::<4>(payload, "inet")?)),
        (FAMILY_INET6, 16) => IpAddr::V6(Ipv6Addr::from(take::<16>(payload, "inet")?)),
        _ => return Err(DataError::malformed("inet")),
    };
    Ok(Value::Inet(Inet { addr, prefix, is_cidr: is_cidr != 0 }))
}

pub(crate) fn decode_inet_text(text: &str) -> Result<Value, DataError> {
    parse_inet(text, false).ok_or_else(|| DataError::invalid_text("inet", text))
}

pub(crate) fn decode_cidr_text(text: &str) -> Result<Value, DataError> {
    parse_inet(text, true).ok_or_else(|| DataError::invalid_text("cidr", text))
}

fn parse_inet(text: &str, is_cidr: bool) -> Option<Value> {
    let (addr, prefix) = match text.split_once('/') {
        Some((addr, prefix)) => (addr.parse::<IpAddr>().ok()?, Some(prefix.parse::<u8>().ok()?)),
        None => (text.parse::<IpAddr>().ok()?, None),
    };
    let max = match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    };
    let prefix = prefix.unwrap_or(max);
    if prefix > max {
        return None;
    }
    Some(Value::Inet(Inet { addr, prefix, is_cidr }))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::builtin;
    use crate::codec::test_util::{encode, roundtrip};
    use crate::postgres::oid;

    #[test]
    fn inet_v4_wire_form() {
        let codec = builtin(oid::INET).unwrap();
        let v = Value::Inet(Inet { addr: "192.168.0.1".parse().unwrap(), prefix: 24, is_cidr: false });
        assert_eq!(encode(codec, &v), [2, 24, 0, 4, 192, 168, 0, 1]);
        assert_eq!(roundtrip(codec, &v), v);
    }

    #[test]
    fn inet_v6_roundtrip() {
        let codec = builtin(oid::INET).unwrap();
        let v = Value::Inet(Inet { addr: "::1".parse().unwrap(), prefix: 128, is_cidr: false });
        assert_eq!(roundtrip(codec, &v), v);
    }

    #[test]
    fn cidr_flag_set() {
        let codec = builtin(oid::CIDR).unwrap();
        let v = Value::Inet(Inet { addr: "10.0.0.0".parse().unwrap(), prefix: 8, is_cidr: true });
        assert_eq!(encode(codec, &v)[2], 1);
        assert_eq!(roundtrip(codec, &v), v);
    }

    #[test]
    fn inet_text_form() {
        assert_eq!(
            decode_inet_text("127.0.0.1/32").unwrap(),
            Value::Inet(Inet { addr: "127.0.0.1".parse().unwrap(), prefix: 32, is_cidr: false }),
        );
        assert_eq!(
            decode_inet_text("127.0.0.1").unwrap(),
            Value::Inet(Inet::new("127.0.0.1".parse().unwrap())),
        );
        assert!(decode_inet_text("127.0.0.1/40").is_err());
    }
}
