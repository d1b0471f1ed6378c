//! Postgres Frontend Messages
//!
//! <https://www.postgresql.org/docs/current/protocol-message-formats.html>
use md5::{Digest, Md5};

use super::Oid;
use crate::io::WriteBuffer;

/// Write a frontend message to `buf`.
pub fn write<F: FrontendProtocol>(msg: F, buf: &mut WriteBuffer) {
    buf.new_message(F::MSGTYPE);
    msg.encode(buf);
    buf.end_message();
}

/// A type which can be encoded into postgres frontend message.
///
/// The tag byte and the length field are the buffer's business; `encode`
/// writes only the message body.
pub trait FrontendProtocol {
    /// Message type.
    const MSGTYPE: u8;

    /// Write the main body of the message.
    fn encode(self, buf: &mut WriteBuffer);
}

/// Postgres Startup frontend message.
///
/// For historical reasons, the very first message sent by the client (the
/// [`Startup`] message) has no initial message-type byte, thus [`Startup`]
/// does not implement [`FrontendProtocol`]. To write it, use
/// [`Startup::write`].
#[derive(Debug)]
pub struct Startup<'a> {
    /// The database user name to connect as. Required; there is no default.
    pub user: &'a str,
    /// The database to connect to. Defaults to the user name.
    pub database: Option<&'a str>,
    /// Reported back by the server in `application_name`.
    pub application_name: Option<&'a str>,
    /// Used to connect in streaming replication mode, where a small set of
    /// replication commands can be issued instead of SQL statements.
    ///
    /// Value can be true, false, or database, and the default is false.
    pub replication: Option<&'a str>,
    /// The session client encoding; only UTF-8 encodings are supported.
    pub client_encoding: &'a str,
}

impl Startup<'_> {
    pub fn write(self, buf: &mut WriteBuffer) {
        // Length of message contents in bytes, including self.
        let offset = buf.begin_length();

        // Int32(196608)
        // The protocol version number.
        // The most significant 16 bits are the major version number (3 for the protocol described here).
        // The least significant 16 bits are the minor version number (0 for the protocol described here).
        buf.write_int32(196_608);

        // The protocol version number is followed by one or more pairs of
        // parameter name and value strings.

        buf.write_str("client_encoding");
        buf.write_str(self.client_encoding);

        buf.write_str("user");
        buf.write_str(self.user);

        if let Some(db) = self.database {
            buf.write_str("database");
            buf.write_str(db);
        }

        if let Some(app) = self.application_name {
            buf.write_str("application_name");
            buf.write_str(app);
        }

        if let Some(repl) = self.replication {
            buf.write_str("replication");
            buf.write_str(repl);
        }

        // A zero byte is required as a terminator after the last name/value pair.
        buf.write_byte(b'\0');

        buf.end_length(offset);
    }
}

/// Cancel request packet, sent on its own fresh connection.
///
/// No message-type byte; the length-16 packet substitutes for a startup
/// message on the second connection.
#[derive(Debug, Clone, Copy)]
pub struct CancelRequest {
    /// The process ID of the target backend.
    pub process_id: i32,
    /// The secret key for the target backend.
    pub secret_key: i32,
}

impl CancelRequest {
    /// The cancel request code. The value is chosen to contain 1234 in the
    /// most significant 16 bits, and 5678 in the least significant 16 bits.
    pub const CODE: i32 = 80_877_102;

    pub fn write(self, buf: &mut WriteBuffer) {
        buf.write_int32(16);
        buf.write_int32(Self::CODE);
        buf.write_int32(self.process_id);
        buf.write_int32(self.secret_key);
    }
}

/// SSL negotiation request packet.
///
/// No message-type byte. The server answers with a single byte, `S` or `N`.
#[derive(Debug, Clone, Copy)]
pub struct SslRequest;

impl SslRequest {
    /// The SSL request code: 1234 in the most significant 16 bits, 5679 in
    /// the least significant.
    pub const CODE: i32 = 80_877_103;

    pub fn write(self, buf: &mut WriteBuffer) {
        buf.write_int32(8);
        buf.write_int32(Self::CODE);
    }
}

/// Identifies the message as a password response.
#[derive(Debug)]
pub struct PasswordMessage<'a> {
    /// The password in clear-text form.
    pub password: &'a str,
}

impl FrontendProtocol for PasswordMessage<'_> {
    const MSGTYPE: u8 = b'p';

    fn encode(self, buf: &mut WriteBuffer) {
        buf.write_str(self.password);
    }
}

/// MD5-encrypted password response.
///
/// The wire form is `"md5" + md5(md5(password + user) + salt)` in lowercase
/// hex.
#[derive(Debug)]
pub struct PasswordMd5<'a> {
    pub password: &'a str,
    pub user: &'a str,
    pub salt: [u8; 4],
}

impl FrontendProtocol for PasswordMd5<'_> {
    const MSGTYPE: u8 = b'p';

    fn encode(self, buf: &mut WriteBuffer) {
        let mut hasher = Md5::new();
        hasher.update(self.password);
        hasher.update(self.user);
        let credentials = hex(hasher.finalize_reset().into());

        hasher.update(credentials);
        hasher.update(self.salt);
        let salted = hex(hasher.finalize().into());

        buf.write_bytes(b"md5");
        buf.write_cstr(&salted);
    }
}

fn hex(digest: [u8; 16]) -> [u8; 32] {
    const TABLE: &[u8; 16] = b"0123456789abcdef";
    let mut out = [0u8; 32];
    for (i, b) in digest.into_iter().enumerate() {
        out[i * 2] = TABLE[(b >> 4) as usize];
        out[i * 2 + 1] = TABLE[(b & 0xf) as usize];
    }
    out
}

/// Identifies the message as a simple query.
pub struct Query<'a> {
    /// The query string itself.
    pub sql: &'a str,
}

impl FrontendProtocol for Query<'_> {
    const MSGTYPE: u8 = b'Q';

    fn encode(self, buf: &mut WriteBuffer) {
        buf.write_str(self.sql);
    }
}

/// Identifies the message as a Parse command.
pub struct Parse<'a, I> {
    /// Prepared statement name (an empty string selects the unnamed
    /// prepared statement).
    pub statement: &'a str,
    /// The query string to be parsed.
    pub sql: &'a str,
    /// The number of parameter data types specified (can be zero).
    ///
    /// Note that this is not an indication of the number of parameters that
    /// might appear in the query string, only the number that the frontend
    /// wants to prespecify types for.
    pub oids_len: i16,
    /// Specifies the object ID of the parameter data type.
    ///
    /// Placing a zero here is equivalent to leaving the type unspecified.
    pub oids: I,
}

impl<I> FrontendProtocol for Parse<'_, I>
where
    I: IntoIterator<Item = Oid>,
{
    const MSGTYPE: u8 = b'P';

    fn encode(self, buf: &mut WriteBuffer) {
        buf.write_str(self.statement);
        buf.write_str(self.sql);
        buf.write_int16(self.oids_len);
        for oid in self.oids {
            buf.write_uint32(oid);
        }
    }
}

/// Identifies the message as a Bind command.
///
/// The body (portal, statement, formats, parameters) is produced by the
/// prepared-statement state, which owns the argument codecs; see
/// [`PreparedStatement::encode_bind`][crate::PreparedStatement::encode_bind].
pub struct Bind<'a> {
    pub body: &'a WriteBuffer,
}

impl FrontendProtocol for Bind<'_> {
    const MSGTYPE: u8 = b'B';

    fn encode(self, buf: &mut WriteBuffer) {
        buf.write_buffer(self.body);
    }
}

/// Identifies the message as a Describe command.
pub struct Describe<'a> {
    /// 'S' to describe a prepared statement; or 'P' to describe a portal.
    pub kind: u8,
    /// The name of the prepared statement or portal to describe
    /// (an empty string selects the unnamed prepared statement or portal).
    pub name: &'a str,
}

impl FrontendProtocol for Describe<'_> {
    const MSGTYPE: u8 = b'D';

    fn encode(self, buf: &mut WriteBuffer) {
        buf.write_byte(self.kind);
        buf.write_str(self.name);
    }
}

/// Identifies the message as an Execute command.
pub struct Execute<'a> {
    /// The name of the portal to execute (an empty string selects the
    /// unnamed portal).
    pub portal: &'a str,
    /// Maximum number of rows to return, if portal contains a query that
    /// returns rows (ignored otherwise). Zero denotes “no limit”.
    pub max_rows: i32,
}

impl FrontendProtocol for Execute<'_> {
    const MSGTYPE: u8 = b'E';

    fn encode(self, buf: &mut WriteBuffer) {
        buf.write_str(self.portal);
        buf.write_int32(self.max_rows);
    }
}

/// Identifies the message as a Close command.
pub struct Close<'a> {
    /// 'S' to close a prepared statement; or 'P' to close a portal.
    pub kind: u8,
    /// The name of the prepared statement or portal to close
    /// (an empty string selects the unnamed prepared statement or portal).
    pub name: &'a str,
}

impl FrontendProtocol for Close<'_> {
    const MSGTYPE: u8 = b'C';

    fn encode(self, buf: &mut WriteBuffer) {
        buf.write_byte(self.kind);
        buf.write_str(self.name);
    }
}

/// Identifies the message as a Sync command.
///
/// The fence terminating an extended-query batch; the backend answers the
/// batch with a `ReadyForQuery`.
pub struct Sync;

impl FrontendProtocol for Sync {
    const MSGTYPE: u8 = b'S';

    fn encode(self, _: &mut WriteBuffer) { }
}

/// Identifies the message as a Flush command.
pub struct Flush;

impl FrontendProtocol for Flush {
    const MSGTYPE: u8 = b'H';

    fn encode(self, _: &mut WriteBuffer) { }
}

/// Identifies the message as a termination notice.
///
/// Sent before the frontend closes the connection.
pub struct Terminate;

impl FrontendProtocol for Terminate {
    const MSGTYPE: u8 = b'X';

    fn encode(self, _: &mut WriteBuffer) { }
}

/// Identifies the message as a COPY-failure indicator.
pub struct CopyFail<'a> {
    /// An error message to report as the cause of failure.
    pub message: &'a str,
}

impl FrontendProtocol for CopyFail<'_> {
    const MSGTYPE: u8 = b'f';

    fn encode(self, buf: &mut WriteBuffer) {
        buf.write_str(self.message);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sync_frame() {
        let mut buf = WriteBuffer::new();
        write(Sync, &mut buf);
        assert_eq!(buf.as_slice(), b"S\0\0\0\x04");
    }

    #[test]
    fn startup_packet_layout() {
        let mut buf = WriteBuffer::new();
        Startup {
            user: "postgres",
            database: Some("db"),
            application_name: None,
            replication: None,
            client_encoding: "utf8",
        }
        .write(&mut buf);

        let b = buf.as_slice();
        // total length includes itself
        assert_eq!(&b[..4], &(b.len() as i32).to_be_bytes());
        // protocol version 3.0
        assert_eq!(&b[4..8], &196_608i32.to_be_bytes());
        assert_eq!(
            &b[8..],
            b"client_encoding\0utf8\0user\0postgres\0database\0db\0\0"
        );
    }

    #[test]
    fn ssl_request_packet() {
        let mut buf = WriteBuffer::new();
        SslRequest.write(&mut buf);

        let mut expect = Vec::new();
        expect.extend_from_slice(&8i32.to_be_bytes());
        expect.extend_from_slice(&80_877_103i32.to_be_bytes());
        assert_eq!(buf.as_slice(), &expect[..]);
    }

    #[test]
    fn cancel_request_packet() {
        let mut buf = WriteBuffer::new();
        CancelRequest { process_id: 42, secret_key: 7 }.write(&mut buf);

        let mut expect = Vec::new();
        expect.extend_from_slice(&16i32.to_be_bytes());
        expect.extend_from_slice(&80_877_102i32.to_be_bytes());
        expect.extend_from_slice(&42i32.to_be_bytes());
        expect.extend_from_slice(&7i32.to_be_bytes());
        assert_eq!(buf.as_slice(), &expect[..]);
    }

    #[test]
    fn md5_password_hash() {
        // known-answer: user "root", password "password", fixed salt
        let mut buf = WriteBuffer::new();
        write(
            PasswordMd5 { password: "password", user: "root", salt: [147, 24, 57, 152] },
            &mut buf,
        );
        assert_eq!(&buf.as_slice()[..], &b"p\0\0\0(md53e2c9d99d49b201ef867a36f3f9ed62c\0"[..]);
    }
}
