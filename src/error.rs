//! `postwire` error types.
use std::{backtrace::Backtrace, fmt, io};

use crate::codec::DataError;
use crate::postgres::{Oid, ProtocolError, ServerError};

/// A specialized [`Result`] type for `postwire` operation.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Misuse of the protocol surface, reported synchronously.
#[derive(Debug, thiserror::Error)]
pub enum InterfaceError {
    #[error("another request is already in flight on this connection")]
    RequestInProgress,
    #[error("connection is closed")]
    ConnectionClosed,
    #[error("prepared statement is closed")]
    StatementClosed,
    #[error("prepared statement has {0} live portals")]
    StatementInUse(u32),
    #[error("statement types are unresolved; introspection required")]
    TypesUnresolved,
    #[error("oid {0} is a built-in type and cannot be overridden")]
    BuiltinCodec(Oid),
    #[error("a codec is already registered for oid {0}")]
    CodecRegistered(Oid),
}

crate::common::unit_error! {
    /// The transport reached EOF or failed mid-request.
    pub struct ConnectionLost("connection lost");
}

/// All possible error from `postwire` library.
pub struct Error {
    context: String,
    backtrace: Backtrace,
    kind: ErrorKind,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    /// The backend error fields, when the backend reported one.
    pub fn server(&self) -> Option<&ServerError> {
        match &self.kind {
            ErrorKind::Server(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_connection_lost(&self) -> bool {
        matches!(self.kind, ErrorKind::ConnectionLost(_))
    }

    /// Prefix shown ahead of the kind in the rendered message.
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }
}

/// All possible error kind from `postwire` library.
pub enum ErrorKind {
    /// A message did not match the wire layout; fatal for the connection.
    Protocol(ProtocolError),
    /// The backend reported an error; the connection recovers at the next
    /// `ReadyForQuery`.
    Server(ServerError),
    /// An encoder or decoder rejected a value; nothing reached the wire.
    Data(DataError),
    /// Misuse of the API.
    Interface(InterfaceError),
    /// The transport died mid-request.
    ConnectionLost(ConnectionLost),
    Io(io::Error),
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for Error {
            fn from($pat: $ty) -> Self {
                let backtrace = std::backtrace::Backtrace::capture();
                Self { context: String::new(), backtrace, kind: $body }
            }
        }
    };
}

from!(<ErrorKind>e => e);
from!(<ProtocolError>e => ErrorKind::Protocol(e));
from!(<ServerError>e => ErrorKind::Server(e));
from!(<DataError>e => ErrorKind::Data(e));
from!(<InterfaceError>e => ErrorKind::Interface(e));
from!(<ConnectionLost>e => ErrorKind::ConnectionLost(e));
from!(<io::Error>e => ErrorKind::Io(e));

impl std::error::Error for Error { }

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.context.is_empty() {
            write!(f, "{}: ", self.context)?;
        }

        fmt::Display::fmt(&self.kind, f)?;

        if let std::backtrace::BacktraceStatus::Captured = self.backtrace.status() {
            let mut backtrace = self.backtrace.to_string();
            write!(f, "\n\n")?;
            writeln!(f, "Stack backtrace:")?;
            backtrace.truncate(backtrace.trim_end().len());
            write!(f, "{}", backtrace)?;
        }

        Ok(())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

impl std::error::Error for ErrorKind { }

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Protocol(e) => e.fmt(f),
            Self::Server(e) => e.fmt(f),
            Self::Data(e) => e.fmt(f),
            Self::Interface(e) => e.fmt(f),
            Self::ConnectionLost(e) => e.fmt(f),
            Self::Io(e) => e.fmt(f),
        }
    }
}

impl fmt::Debug for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}
