use bytes::Bytes;
use std::str::from_utf8;

/// An error when translating buffer from postgres.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A read crossed the current message boundary, or the buffer is short.
    #[error("read crosses message boundary")]
    ShortRead,
    /// Declared message length below the minimum of four.
    #[error("message {tag:?} declares bad length {length}")]
    BadMessageLength { tag: u8, length: i32 },
    /// A wire string is missing its nul terminator.
    #[error("string not nul terminated within message")]
    NulNotFound,
    /// Non UTF-8 bytes where the session encoding requires UTF-8.
    #[error("non utf8 wire string: {0}")]
    NonUtf8(std::str::Utf8Error),
    #[error("unknown format code {0}")]
    UnknownFormat(i16),
    #[error("unknown authentication request kind {0}")]
    UnknownAuth(i32),
    #[error("authentication method {0:?} is not supported")]
    UnsupportedAuth(&'static str),
    #[error("{0} is not supported")]
    Unsupported(&'static str),
    #[error("unexpected message {tag:?} in {phase}")]
    Unexpected { tag: char, phase: &'static str },
    #[error("client_encoding {0:?} is not supported, only UTF-8 encodings are")]
    UnsupportedEncoding(Box<str>),
}

impl ProtocolError {
    pub(crate) fn non_utf8(err: std::str::Utf8Error) -> Self {
        Self::NonUtf8(err)
    }

    pub(crate) fn unexpected(tag: u8, phase: &'static str) -> Self {
        Self::Unexpected { tag: tag as char, phase }
    }
}

/// A structured error or notice sent by the backend.
///
/// The message body consists of one or more identified fields, followed by
/// a zero byte as a terminator. Fields can appear in any order. For each
/// field there is a `Byte1` code identifying the field type, then the
/// field value as a nul-terminated string. Frontends should silently
/// ignore fields of unrecognized type.
///
/// <https://www.postgresql.org/docs/current/protocol-error-fields.html>
#[derive(Clone)]
pub struct ServerError {
    storage: Bytes,
    severity: (u16, u16),
    code: (u16, u16),
    message: (u16, u16),
}

impl ServerError {
    /// Parse the body of an `ErrorResponse` or `NoticeResponse`.
    pub fn parse(storage: Bytes) -> Self {
        let mut severity = (0, 0);
        let mut code = (0, 0);
        let mut message = (0, 0);

        // cache the three always-present fields, everything else is walked
        // on access
        for (field, span) in (Fields { storage: &storage, offset: 0 }) {
            match field {
                b'S' => severity = span,
                b'C' => code = span,
                b'M' => message = span,
                _ => {}
            }
        }

        Self { storage, severity, code, message }
    }

    /// Severity: `ERROR`, `FATAL`, or `PANIC` (in an error message), or
    /// `WARNING`, `NOTICE`, `DEBUG`, `INFO`, or `LOG` (in a notice message).
    pub fn severity(&self) -> &str {
        self.cached(self.severity)
    }

    /// The SQLSTATE code for the error.
    pub fn code(&self) -> &str {
        self.cached(self.code)
    }

    /// The primary human-readable error message.
    pub fn message(&self) -> &str {
        self.cached(self.message)
    }

    pub fn detail(&self) -> Option<&str> {
        self.get(b'D')
    }

    pub fn hint(&self) -> Option<&str> {
        self.get(b'H')
    }

    /// Error cursor position as an index into the original query string,
    /// measured in characters, counting from one.
    pub fn position(&self) -> Option<&str> {
        self.get(b'P')
    }

    /// Context in which the error occurred.
    pub fn where_(&self) -> Option<&str> {
        self.get(b'W')
    }

    pub fn schema_name(&self) -> Option<&str> {
        self.get(b's')
    }

    pub fn table_name(&self) -> Option<&str> {
        self.get(b't')
    }

    pub fn column_name(&self) -> Option<&str> {
        self.get(b'c')
    }

    pub fn datatype_name(&self) -> Option<&str> {
        self.get(b'd')
    }

    pub fn constraint_name(&self) -> Option<&str> {
        self.get(b'n')
    }

    pub fn file(&self) -> Option<&str> {
        self.get(b'F')
    }

    pub fn line(&self) -> Option<&str> {
        self.get(b'L')
    }

    pub fn routine(&self) -> Option<&str> {
        self.get(b'R')
    }

    /// Whether this is an error rather than a notice.
    pub fn is_error(&self) -> bool {
        matches!(self.severity(), "ERROR" | "FATAL" | "PANIC")
    }

    /// Raw lookup of a field by its type byte.
    pub fn get(&self, ty: u8) -> Option<&str> {
        Fields { storage: &self.storage, offset: 0 }
            .find(|(field, _)| *field == ty)
            .and_then(|(_, (start, end))| {
                from_utf8(&self.storage[start as usize..end as usize]).ok()
            })
    }

    fn cached(&self, span: (u16, u16)) -> &str {
        from_utf8(&self.storage[span.0 as usize..span.1 as usize]).unwrap_or_default()
    }
}

impl std::error::Error for ServerError { }

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.severity(), self.code(), self.message())
    }
}

impl std::fmt::Debug for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"{self}\"")
    }
}

struct Fields<'a> {
    storage: &'a Bytes,
    offset: u16,
}

impl Iterator for Fields<'_> {
    type Item = (u8, (u16, u16));

    fn next(&mut self) -> Option<Self::Item> {
        let ty = *self.storage.get(self.offset as usize)?;
        if ty == 0 {
            return None;
        }
        let start = self.offset + 1;
        let mut end = start;
        while *self.storage.get(end as usize)? != 0 {
            end += 1;
        }
        self.offset = end + 1;
        Some((ty, (start, end)))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_error_fields() {
        let body = Bytes::from_static(
            b"SERROR\0VERROR\0C42P01\0Mrelation \"x\" does not exist\0Fparse_relation.c\0L1452\0\0",
        );
        let err = ServerError::parse(body);
        assert_eq!(err.severity(), "ERROR");
        assert_eq!(err.code(), "42P01");
        assert_eq!(err.message(), "relation \"x\" does not exist");
        assert_eq!(err.file(), Some("parse_relation.c"));
        assert_eq!(err.line(), Some("1452"));
        assert_eq!(err.hint(), None);
        assert!(err.is_error());
    }

    #[test]
    fn notice_is_not_error() {
        let err = ServerError::parse(Bytes::from_static(b"SNOTICE\0C00000\0Mhello\0\0"));
        assert!(!err.is_error());
        assert_eq!(err.to_string(), "NOTICE 00000: hello");
    }
}
