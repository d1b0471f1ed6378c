//! Postgres Backend Messages
use bytes::{Buf, Bytes};

use super::error::ProtocolError;
use crate::common::ByteStr;
use crate::ext::BytesExt;

/// A type that can be decoded into postgres backend message
pub trait BackendProtocol: Sized {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError>;
}

/// Postgres backend messages
#[derive(Debug)]
pub enum BackendMessage {
    Authentication(Authentication),
    BackendKeyData(BackendKeyData),
    BindComplete(BindComplete),
    CloseComplete(CloseComplete),
    CommandComplete(CommandComplete),
    CopyBothResponse(CopyBothResponse),
    CopyData(CopyData),
    CopyDone(CopyDone),
    CopyInResponse(CopyInResponse),
    CopyOutResponse(CopyOutResponse),
    DataRow(DataRow),
    EmptyQueryResponse(EmptyQueryResponse),
    ErrorResponse(ErrorResponse),
    NegotiateProtocolVersion(NegotiateProtocolVersion),
    NoData(NoData),
    NoticeResponse(NoticeResponse),
    NotificationResponse(NotificationResponse),
    ParameterDescription(ParameterDescription),
    ParameterStatus(ParameterStatus),
    ParseComplete(ParseComplete),
    PortalSuspended(PortalSuspended),
    ReadyForQuery(ReadyForQuery),
    RowDescription(RowDescription),
}

macro_rules! match_backend {
    ($($name:ident,)*) => {
        impl BackendMessage {
            pub fn msgtype(&self) -> u8 {
                match self {
                    $(Self::$name(_) => $name::MSGTYPE,)*
                }
            }
        }
        impl BackendProtocol for BackendMessage {
            fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
                let message = match msgtype {
                    $($name::MSGTYPE => Self::$name(<$name as BackendProtocol>::decode(msgtype, body)?),)*
                    _ => return Err(ProtocolError::unexpected(msgtype, "message dispatch")),
                };
                Ok(message)
            }
        }
    };
}

match_backend! {
    Authentication,
    BackendKeyData,
    BindComplete,
    CloseComplete,
    CommandComplete,
    CopyBothResponse,
    CopyData,
    CopyDone,
    CopyInResponse,
    CopyOutResponse,
    DataRow,
    EmptyQueryResponse,
    ErrorResponse,
    NegotiateProtocolVersion,
    NoData,
    NoticeResponse,
    NotificationResponse,
    ParameterDescription,
    ParameterStatus,
    ParseComplete,
    PortalSuspended,
    ReadyForQuery,
    RowDescription,
}

macro_rules! assert_msgtype {
    ($self:ident,$typ:ident) => {
        if $self::MSGTYPE != $typ {
            return Err(ProtocolError::unexpected($typ, stringify!($self)));
        }
    };
}

/// Identifies the message as an authentication request.
#[derive(Debug)]
pub enum Authentication {
    /// Int32(0) Specifies that the authentication was successful.
    Ok,
    /// Int32(2) Specifies that Kerberos V5 authentication is required.
    KerberosV5,
    /// Int32(3) Specifies that a clear-text password is required.
    CleartextPassword,
    /// Int32(5) Specifies that an MD5-encrypted password is required.
    /// Byte4 The salt to use when encrypting the password.
    MD5Password { salt: [u8; 4] },
    /// Int32(7) Specifies that GSSAPI authentication is required.
    GSS,
    /// Int32(9) Specifies that SSPI authentication is required.
    SSPI,
    /// Int32(10) Specifies that SASL authentication is required.
    /// The message body is a list of SASL authentication mechanisms,
    /// in the server's order of preference.
    SASL,
    /// Int32(11) A SASL challenge.
    SASLContinue,
    /// Int32(12) SASL authentication has completed.
    SASLFinal,
}

impl Authentication {
    pub const MSGTYPE: u8 = b'R';
}

impl BackendProtocol for Authentication {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(Authentication, msgtype);
        let auth = match body.get_i32() {
            0 => Authentication::Ok,
            2 => Authentication::KerberosV5,
            3 => Authentication::CleartextPassword,
            5 => {
                let mut salt = [0u8; 4];
                body.copy_to_slice(&mut salt);
                Authentication::MD5Password { salt }
            }
            7 => Authentication::GSS,
            9 => Authentication::SSPI,
            10 => Authentication::SASL,
            11 => Authentication::SASLContinue,
            12 => Authentication::SASLFinal,
            auth => return Err(ProtocolError::UnknownAuth(auth)),
        };
        Ok(auth)
    }
}

/// Identifies the message as cancellation key data.
///
/// The frontend must save these values if it wishes to be able to issue
/// CancelRequest messages later.
#[derive(Debug, Clone, Copy)]
pub struct BackendKeyData {
    /// The process ID of this backend.
    pub process_id: i32,
    /// The secret key of this backend.
    pub secret_key: i32,
}

impl BackendKeyData {
    pub const MSGTYPE: u8 = b'K';
}

impl BackendProtocol for BackendKeyData {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(BackendKeyData, msgtype);
        Ok(Self {
            process_id: body.get_i32(),
            secret_key: body.get_i32(),
        })
    }
}

/// Identifies the message as a run-time parameter status report
#[derive(Debug)]
pub struct ParameterStatus {
    /// The name of the run-time parameter being reported
    pub name: ByteStr,
    /// The current value of the parameter
    pub value: ByteStr,
}

impl ParameterStatus {
    pub const MSGTYPE: u8 = b'S';
}

impl BackendProtocol for ParameterStatus {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(ParameterStatus, msgtype);
        Ok(Self {
            name: body.get_nul_bytestr()?,
            value: body.get_nul_bytestr()?,
        })
    }
}

/// A warning message. The frontend should display the message.
///
/// The body shares the field layout of [`ErrorResponse`].
#[derive(Debug)]
pub struct NoticeResponse {
    pub body: Bytes,
}

impl NoticeResponse {
    pub const MSGTYPE: u8 = b'N';
}

impl BackendProtocol for NoticeResponse {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(NoticeResponse, msgtype);
        Ok(NoticeResponse { body })
    }
}

/// Identifies the message as a notification response.
///
/// Sent for each `NOTIFY` on a channel the session is listening on.
#[derive(Debug)]
pub struct NotificationResponse {
    /// The process ID of the notifying backend process.
    pub process_id: i32,
    /// The name of the channel that the notify has been raised on.
    pub channel: ByteStr,
    /// The “payload” string passed from the notifying process.
    pub payload: ByteStr,
}

impl NotificationResponse {
    pub const MSGTYPE: u8 = b'A';
}

impl BackendProtocol for NotificationResponse {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(NotificationResponse, msgtype);
        Ok(Self {
            process_id: body.get_i32(),
            channel: body.get_nul_bytestr()?,
            payload: body.get_nul_bytestr()?,
        })
    }
}

/// Identifies the message as an error.
///
/// The message body consists of one or more identified fields, followed by
/// a zero byte as a terminator; see
/// [`ServerError`][crate::postgres::ServerError] for the field layout.
#[derive(Debug, thiserror::Error)]
#[error("{body:?}")]
pub struct ErrorResponse {
    pub body: Bytes,
}

impl ErrorResponse {
    pub const MSGTYPE: u8 = b'E';
}

impl BackendProtocol for ErrorResponse {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(ErrorResponse, msgtype);
        Ok(Self { body })
    }
}

/// Identifies the message as a row description.
///
/// Indicates that rows are about to be returned in response to a query;
/// the contents describe the column layout of the rows. The body is kept
/// raw for the prepared-statement layer, which owns descriptor parsing.
#[derive(Debug)]
pub struct RowDescription {
    pub body: Bytes,
}

impl RowDescription {
    pub const MSGTYPE: u8 = b'T';
}

impl BackendProtocol for RowDescription {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(RowDescription, msgtype);
        Ok(Self { body })
    }
}

/// Identifies the message as a parameter description.
///
/// `Int16` the number of parameters used by the statement (can be zero),
/// then for each parameter the object ID of its data type.
#[derive(Debug)]
pub struct ParameterDescription {
    pub body: Bytes,
}

impl ParameterDescription {
    pub const MSGTYPE: u8 = b't';
}

impl BackendProtocol for ParameterDescription {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(ParameterDescription, msgtype);
        Ok(Self { body })
    }
}

/// Identifies the message as a data row.
///
/// `Int16` the number of column values that follow (possibly zero), then
/// for each column `Int32` length (-1 for NULL) and the value bytes.
#[derive(Debug)]
pub struct DataRow {
    pub body: Bytes,
}

impl DataRow {
    pub const MSGTYPE: u8 = b'D';
}

impl BackendProtocol for DataRow {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(DataRow, msgtype);
        Ok(Self { body })
    }
}

/// Identifies the message as a command-completed response.
#[derive(Debug)]
pub struct CommandComplete {
    /// The command tag. This is usually a single word that identifies which
    /// SQL command was completed, e.g. `SELECT 1` or `INSERT 0 3`.
    pub tag: ByteStr,
}

impl CommandComplete {
    pub const MSGTYPE: u8 = b'C';
}

impl BackendProtocol for CommandComplete {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(CommandComplete, msgtype);
        Ok(Self { tag: body.get_nul_bytestr()? })
    }
}

/// Identifies the message as a protocol version negotiation message.
#[derive(Debug)]
pub struct NegotiateProtocolVersion {
    /// Newest minor protocol version supported by the server for the major
    /// protocol version requested by the client.
    pub minor: i32,
    /// Number of protocol options not recognized by the server.
    pub unrecognized: i32,
}

impl NegotiateProtocolVersion {
    pub const MSGTYPE: u8 = b'v';
}

impl BackendProtocol for NegotiateProtocolVersion {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(NegotiateProtocolVersion, msgtype);
        Ok(Self {
            minor: body.get_i32(),
            unrecognized: body.get_i32(),
        })
    }
}

/// Identifies the message as the start of a COPY from the client.
#[derive(Debug)]
pub struct CopyInResponse {
    pub body: Bytes,
}

impl CopyInResponse {
    pub const MSGTYPE: u8 = b'G';
}

impl BackendProtocol for CopyInResponse {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(CopyInResponse, msgtype);
        Ok(Self { body })
    }
}

/// Identifies the message as the start of a COPY to the client.
#[derive(Debug)]
pub struct CopyOutResponse {
    pub body: Bytes,
}

impl CopyOutResponse {
    pub const MSGTYPE: u8 = b'H';
}

impl BackendProtocol for CopyOutResponse {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(CopyOutResponse, msgtype);
        Ok(Self { body })
    }
}

/// Identifies the message as the start of copy-both mode (streaming
/// replication only).
#[derive(Debug)]
pub struct CopyBothResponse {
    pub body: Bytes,
}

impl CopyBothResponse {
    pub const MSGTYPE: u8 = b'W';
}

impl BackendProtocol for CopyBothResponse {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(CopyBothResponse, msgtype);
        Ok(Self { body })
    }
}

/// Identifies the message as COPY data.
#[derive(Debug)]
pub struct CopyData {
    pub body: Bytes,
}

impl CopyData {
    pub const MSGTYPE: u8 = b'd';
}

impl BackendProtocol for CopyData {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(CopyData, msgtype);
        Ok(Self { body })
    }
}

/// Identifies the message type. ReadyForQuery is sent whenever the backend
/// is ready for a new query cycle.
#[derive(Debug)]
pub struct ReadyForQuery {
    /// Current backend transaction status indicator. Possible values are
    /// 'I' if idle (not in a transaction block); 'T' if in a transaction
    /// block; or 'E' if in a failed transaction block.
    pub tx_status: u8,
}

impl ReadyForQuery {
    pub const MSGTYPE: u8 = b'Z';
}

impl BackendProtocol for ReadyForQuery {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(ReadyForQuery, msgtype);
        Ok(Self { tx_status: body.get_u8() })
    }
}

macro_rules! unit_msg {
    ($(
        $(#[$doc:meta])* struct $name:ident, $ty:literal;
    )*) => {$(
            $(#[$doc])*
            #[derive(Debug)]
            pub struct $name;

            impl $name {
                pub const MSGTYPE: u8 = $ty;
            }

            impl BackendProtocol for $name {
                fn decode(msgtype: u8, _: Bytes) -> Result<Self, ProtocolError> {
                    assert_msgtype!($name, msgtype);
                    Ok(Self)
                }
            }
    )*};
}

unit_msg! {
    /// Identifies the message as a Bind-complete indicator.
    struct BindComplete, b'2';

    /// Identifies the message as a Close-complete indicator.
    struct CloseComplete, b'3';

    /// Identifies the message as a COPY-complete indicator.
    struct CopyDone, b'c';

    /// Identifies the message as a response to an empty query string.
    ///
    /// This substitutes for CommandComplete.
    struct EmptyQueryResponse, b'I';

    /// Identifies the message as a no-data indicator.
    struct NoData, b'n';

    /// Identifies the message as a Parse-complete indicator.
    struct ParseComplete, b'1';

    /// Identifies the message as a portal-suspended indicator.
    ///
    /// Note this only appears if an Execute message's row-count limit was reached.
    struct PortalSuspended, b's';
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn dispatches_by_tag() {
        let msg = BackendMessage::decode(b'K', Bytes::from_static(&[0, 0, 0, 7, 0, 0, 0, 9]))
            .unwrap();
        assert_eq!(msg.msgtype(), b'K');
        let BackendMessage::BackendKeyData(key) = msg else {
            panic!("wrong variant");
        };
        assert_eq!((key.process_id, key.secret_key), (7, 9));

        assert!(BackendMessage::decode(b'@', Bytes::new()).is_err());
    }

    #[test]
    fn auth_kinds() {
        let auth = Authentication::decode(b'R', Bytes::from_static(&[0, 0, 0, 0])).unwrap();
        assert!(matches!(auth, Authentication::Ok));

        let auth =
            Authentication::decode(b'R', Bytes::from_static(&[0, 0, 0, 5, 1, 2, 3, 4])).unwrap();
        assert!(matches!(auth, Authentication::MD5Password { salt: [1, 2, 3, 4] }));

        assert!(Authentication::decode(b'R', Bytes::from_static(&[0, 0, 0, 99])).is_err());
    }

    #[test]
    fn parameter_status_strings() {
        let msg = ParameterStatus::decode(b'S', Bytes::from_static(b"TimeZone\0UTC\0")).unwrap();
        assert_eq!(msg.name, "TimeZone");
        assert_eq!(msg.value, "UTC");
    }

    #[test]
    fn notification_payload() {
        let body = {
            let mut v = 33i32.to_be_bytes().to_vec();
            v.extend_from_slice(b"jobs\0go\0");
            Bytes::from(v)
        };
        let msg = NotificationResponse::decode(b'A', body).unwrap();
        assert_eq!(msg.process_id, 33);
        assert_eq!(msg.channel, "jobs");
        assert_eq!(msg.payload, "go");
    }

    #[test]
    fn wrong_tag_is_refused() {
        assert!(ReadyForQuery::decode(b'Q', Bytes::from_static(&[b'I'])).is_err());
        assert!(ParseComplete::decode(b'2', Bytes::new()).is_err());
    }
}
