//! Session parameters reported by the backend.
use std::collections::HashMap;

use crate::common::ByteStr;
use crate::postgres::ProtocolError;

/// Per-session key/value parameters, populated from `ParameterStatus`
/// messages.
///
/// At present the backend reports `server_version`, `server_encoding`,
/// `client_encoding`, `application_name`, `default_transaction_read_only`,
/// `in_hot_standby`, `is_superuser`, `session_authorization`,
/// `DateStyle`, `IntervalStyle`, `TimeZone`, `integer_datetimes`, and
/// `standard_conforming_strings`.
#[derive(Debug)]
pub struct SessionSettings {
    params: HashMap<ByteStr, ByteStr>,
    client_encoding: ByteStr,
    integer_datetimes: bool,
    standard_conforming_strings: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            params: HashMap::new(),
            client_encoding: ByteStr::from_static("UTF8"),
            integer_datetimes: true,
            standard_conforming_strings: true,
        }
    }
}

impl SessionSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a reported parameter.
    ///
    /// `client_encoding` re-binds the text codec; only the UTF-8 family is
    /// supported, anything else refuses the session.
    pub(crate) fn update(&mut self, name: ByteStr, value: ByteStr) -> Result<(), ProtocolError> {
        match name.as_str() {
            "client_encoding" => {
                if !encoding_is_utf8(&value) {
                    return Err(ProtocolError::UnsupportedEncoding(value.as_str().into()));
                }
                self.client_encoding = value.clone();
            }
            "integer_datetimes" => self.integer_datetimes = value == "on",
            "standard_conforming_strings" => self.standard_conforming_strings = value == "on",
            _ => {}
        }
        self.params.insert(name, value);
        Ok(())
    }

    /// Raw parameter lookup.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(ByteStr::as_str)
    }

    pub fn server_version(&self) -> Option<&str> {
        self.get("server_version")
    }

    pub fn date_style(&self) -> Option<&str> {
        self.get("DateStyle")
    }

    pub fn interval_style(&self) -> Option<&str> {
        self.get("IntervalStyle")
    }

    pub fn time_zone(&self) -> Option<&str> {
        self.get("TimeZone")
    }

    pub fn client_encoding(&self) -> &str {
        &self.client_encoding
    }

    /// Whether the server stores timestamps as microsecond integers.
    ///
    /// Always `on` since PostgreSQL 10; the binary temporal codecs assume
    /// it.
    pub fn integer_datetimes(&self) -> bool {
        self.integer_datetimes
    }

    pub fn standard_conforming_strings(&self) -> bool {
        self.standard_conforming_strings
    }
}

/// The UTF-8 spellings postgres accepts: `UTF8`, `utf-8`, `unicode`.
fn encoding_is_utf8(name: &str) -> bool {
    let mut normal = name.bytes().filter(|b| !matches!(b, b'-' | b'_')).map(|b| b.to_ascii_lowercase());
    let utf8 = normal.by_ref().eq(b"utf8".iter().copied());
    utf8 || name.eq_ignore_ascii_case("unicode")
}

#[cfg(test)]
mod test {
    use super::*;

    fn update(settings: &mut SessionSettings, name: &'static str, value: &'static str) -> Result<(), ProtocolError> {
        settings.update(ByteStr::from_static(name), ByteStr::from_static(value))
    }

    #[test]
    fn records_distinguished_fields() {
        let mut s = SessionSettings::new();
        update(&mut s, "server_version", "16.3").unwrap();
        update(&mut s, "DateStyle", "ISO, MDY").unwrap();
        update(&mut s, "integer_datetimes", "on").unwrap();
        update(&mut s, "TimeZone", "UTC").unwrap();

        assert_eq!(s.server_version(), Some("16.3"));
        assert_eq!(s.date_style(), Some("ISO, MDY"));
        assert_eq!(s.time_zone(), Some("UTC"));
        assert!(s.integer_datetimes());
    }

    #[test]
    fn client_encoding_must_be_utf8() {
        let mut s = SessionSettings::new();
        update(&mut s, "client_encoding", "UTF8").unwrap();
        update(&mut s, "client_encoding", "utf-8").unwrap();
        update(&mut s, "client_encoding", "UNICODE").unwrap();
        assert!(update(&mut s, "client_encoding", "LATIN1").is_err());
        assert!(update(&mut s, "client_encoding", "SQL_ASCII").is_err());
    }
}
