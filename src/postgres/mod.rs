//! Postgres Frontend and Backend Protocol
//!
//! Docs here mostly quoted from the official postgres documentation.
//!
//! ## Messaging Overview
//!
//! All communication is through a stream of messages. The first byte of a message identifies the message type,
//! and the next four bytes specify the length of the rest of the message (this length count includes itself,
//! but not the message-type byte). The remaining contents of the message are determined by the message type.
//!
//! For historical reasons, the very first message sent by the client (the startup message)
//! has no initial message-type byte.
//!
//! ## Formats and Format Codes
//!
//! Data of a particular data type might be transmitted in any of several different formats.
//! As of PostgreSQL 7.4 the only supported formats are “text” and “binary”. Text has format
//! code zero, and Binary has format code one.
//!
//! Clients can specify a format code for each transmitted parameter value and for each column
//! of a query result.
//!
//! <https://www.postgresql.org/docs/17/protocol-overview.html>

pub mod oid;

pub mod backend;
pub mod frontend;

mod error;

pub use backend::{BackendMessage, BackendProtocol};
pub use error::{ProtocolError, ServerError};
pub use frontend::FrontendProtocol;

/// Postgres object identifier.
///
/// The oid type is implemented as an unsigned four-byte integer.
///
/// <https://www.postgresql.org/docs/current/datatype-oid.html>
pub type Oid = u32;

/// Wire format of a parameter or result column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PgFormat {
    /// Format code zero.
    Text,
    /// Format code one.
    Binary,
}

impl PgFormat {
    pub fn format_code(self) -> i16 {
        match self {
            Self::Text => 0,
            Self::Binary => 1,
        }
    }

    pub fn from_code(code: i16) -> Result<Self, ProtocolError> {
        match code {
            0 => Ok(Self::Text),
            1 => Ok(Self::Binary),
            _ => Err(ProtocolError::UnknownFormat(code)),
        }
    }
}

/// Backend transaction status as reported by `ReadyForQuery`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionStatus {
    /// `I`, idle (not in a transaction block).
    Idle,
    /// `T`, in a transaction block.
    InTransaction,
    /// `E`, in a failed transaction block (queries will be rejected until
    /// block is ended).
    InFailedTransaction,
    /// No `ReadyForQuery` observed yet.
    #[default]
    Unknown,
}

impl TransactionStatus {
    pub fn from_status_byte(status: u8) -> Self {
        match status {
            b'I' => Self::Idle,
            b'T' => Self::InTransaction,
            b'E' => Self::InFailedTransaction,
            _ => Self::Unknown,
        }
    }
}
