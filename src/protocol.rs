//! The core protocol state machine.
//!
//! [`Protocol`] owns the framing buffers and dispatches backend messages in
//! receive order, one `match` per tag, the way libpq's `fe-protocol3.c`
//! does. Out-of-band messages (`ParameterStatus`, notices, notifications)
//! never change execution state; `ErrorResponse` latches the failure and
//! drains to the next `ReadyForQuery`, which is the completion anchor of
//! every request.
use bytes::{Buf, Bytes};
use std::collections::VecDeque;
use std::io;
use std::task::{Context, Poll, ready};

use crate::codec::DataCodecs;
use crate::common::{ByteStr, debug, verbose};
use crate::error::{ConnectionLost, Error, InterfaceError, Result};
use crate::io::{ReadBuffer, WriteBuffer};
use crate::postgres::{
    ProtocolError, ServerError, TransactionStatus,
    backend::{self, BackendProtocol},
    frontend::{self, FrontendProtocol},
};
use crate::settings::SessionSettings;
use crate::statement::{PreparedStatement, RowSchema};
use crate::transport::Transport;

/// Settings for the startup packet.
///
/// <https://www.postgresql.org/docs/current/protocol-flow.html#PROTOCOL-FLOW-START-UP>
#[derive(Debug, Clone)]
pub struct StartupConfig {
    pub(crate) user: ByteStr,
    pub(crate) database: Option<ByteStr>,
    pub(crate) password: Option<ByteStr>,
    pub(crate) application_name: Option<ByteStr>,
    pub(crate) replication: Option<ByteStr>,
}

impl StartupConfig {
    /// Create new config; the database user name is required.
    pub fn new(user: impl Into<ByteStr>) -> Self {
        Self {
            user: user.into(),
            database: None,
            password: None,
            application_name: None,
            replication: None,
        }
    }

    /// The database to connect to. Defaults to the user name.
    pub fn with_database(mut self, database: impl Into<ByteStr>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Authentication password, used for the cleartext and MD5 responses.
    pub fn with_password(mut self, password: impl Into<ByteStr>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_application_name(mut self, name: impl Into<ByteStr>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// Used to connect in streaming replication mode, where a small set of
    /// replication commands can be issued instead of SQL statements.
    pub fn with_replication(mut self, replication: impl Into<ByteStr>) -> Self {
        self.replication = Some(replication.into());
        self
    }
}

/// A `NOTIFY` event received out of band.
#[derive(Debug, Clone)]
pub struct Notification {
    /// The process ID of the notifying backend process.
    pub process_id: i32,
    /// The channel the notify was raised on.
    pub channel: ByteStr,
    /// The payload string passed from the notifying process.
    pub payload: ByteStr,
}

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnState {
    Bad,
    Started,
    Ok,
}

/// What the protocol is currently waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExecState {
    Idle,
    Auth,
    Prepare,
    Bind,
    BindExecute,
    Execute,
    CloseStmtPortal,
    SimpleQuery,
    /// Error latched; every frame up to `ReadyForQuery` is discarded.
    ErrorConsume,
    Failed,
}

/// Per in-flight command accumulation.
#[derive(Debug, Default)]
pub(crate) struct ResultAccumulator {
    pub(crate) failed: Option<Error>,
    pub(crate) param_desc: Option<Bytes>,
    pub(crate) row_desc: Option<Bytes>,
    pub(crate) command_tag: Option<ByteStr>,
    pub(crate) rows: Vec<Vec<crate::value::Value>>,
    pub(crate) suspended: bool,
    pub(crate) done: bool,
    /// simple-query schema for the current result set
    simple_schema: Option<RowSchema>,
}

impl ResultAccumulator {
    fn fail(&mut self, error: impl Into<Error>) {
        if self.failed.is_none() {
            self.failed = Some(error.into());
        }
    }
}

/// The protocol engine over one transport.
pub struct Protocol<IO> {
    io: IO,
    rbuf: ReadBuffer,
    wbuf: WriteBuffer,
    /// frames taken from `wbuf`, partially written to the transport
    out: Bytes,
    settings: SessionSettings,
    codecs: DataCodecs,
    conn_state: ConnState,
    exec: ExecState,
    tx_status: TransactionStatus,
    backend_key: Option<backend::BackendKeyData>,
    pub(crate) result: ResultAccumulator,
    /// present while authenticating; holds the password
    auth: Option<StartupConfig>,
    notifications: VecDeque<backend::NotificationResponse>,
    notice_hook: Option<Box<dyn FnMut(ServerError) + Send>>,
    /// a cancelled request's frames are drained up to `ReadyForQuery`
    skip_until_ready: bool,
    closed: bool,
}

impl<IO> Protocol<IO> {
    pub fn new(io: IO) -> Self {
        Self::with_codecs(io, DataCodecs::new())
    }

    /// Build with a codec configuration, e.g. one attached to a shared
    /// type cache.
    pub fn with_codecs(io: IO, codecs: DataCodecs) -> Self {
        Self {
            io,
            rbuf: ReadBuffer::new(),
            wbuf: WriteBuffer::new(),
            out: Bytes::new(),
            settings: SessionSettings::new(),
            codecs,
            conn_state: ConnState::Started,
            exec: ExecState::Idle,
            tx_status: TransactionStatus::Unknown,
            backend_key: None,
            result: ResultAccumulator::default(),
            auth: None,
            notifications: VecDeque::new(),
            notice_hook: None,
            skip_until_ready: false,
            closed: false,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn codecs(&mut self) -> &mut DataCodecs {
        &mut self.codecs
    }

    /// Transaction status from the last `ReadyForQuery`.
    pub fn transaction_status(&self) -> TransactionStatus {
        self.tx_status
    }

    /// Cancellation key data captured at startup.
    pub fn backend_key(&self) -> Option<(i32, i32)> {
        self.backend_key.map(|k| (k.process_id, k.secret_key))
    }

    /// Install a hook receiving `NoticeResponse` fields out of band.
    pub fn on_notice(&mut self, hook: impl FnMut(ServerError) + Send + 'static) {
        self.notice_hook = Some(Box::new(hook));
    }

    /// Take a queued `NOTIFY` event, if any.
    pub fn take_notification(&mut self) -> Option<Notification> {
        self.notifications.pop_front().map(|n| Notification {
            process_id: n.process_id,
            channel: n.channel,
            payload: n.payload,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed || matches!(self.exec, ExecState::Failed)
    }

    /// At most one outstanding request per connection.
    pub(crate) fn begin_request(&mut self, state: ExecState) -> Result<()> {
        if self.is_closed() {
            return Err(InterfaceError::ConnectionClosed.into());
        }
        if !matches!(self.exec, ExecState::Idle) {
            return Err(InterfaceError::RequestInProgress.into());
        }
        self.result = ResultAccumulator::default();
        self.exec = state;
        Ok(())
    }

    pub(crate) fn send<F: FrontendProtocol>(&mut self, message: F) {
        frontend::write(message, &mut self.wbuf);
    }

    /// A dropped operation future abandons its request; the response
    /// frames are drained cooperatively before the next request's.
    pub(crate) fn abandon_request(&mut self) {
        if matches!(self.exec, ExecState::Failed) || self.closed {
            return;
        }
        if !matches!(self.exec, ExecState::Idle) || !self.result.done {
            self.skip_until_ready = true;
        }
        self.exec = ExecState::Idle;
        self.result = ResultAccumulator::default();
    }

    fn fail_connection(&mut self) {
        self.conn_state = ConnState::Bad;
        self.exec = ExecState::Failed;
    }
}

impl<IO: Transport> Protocol<IO> {
    fn poll_flush_io(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        loop {
            if self.out.is_empty() {
                if self.wbuf.is_empty() {
                    break;
                }
                self.out = self.wbuf.take();
            }
            let n = ready!(self.io.poll_write(cx, &self.out))?;
            if n == 0 {
                return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
            }
            self.out.advance(n);
        }
        self.io.poll_flush(cx)
    }

    /// Drive the request to completion: flush buffered frames, then read
    /// and dispatch server messages until the completion anchor.
    pub(crate) fn poll_until_done(
        &mut self,
        cx: &mut Context,
        stmt: Option<&PreparedStatement>,
    ) -> Poll<Result<()>> {
        loop {
            match ready!(self.poll_flush_io(cx)) {
                Ok(()) => {}
                Err(err) => {
                    self.fail_connection();
                    return Poll::Ready(Err(err.into()));
                }
            }

            if self.result.done {
                return Poll::Ready(Ok(()));
            }

            let has_message = match self.rbuf.has_message() {
                Ok(has) => has,
                Err(err) => {
                    self.fail_connection();
                    return Poll::Ready(Err(err.into()));
                }
            };

            if !has_message {
                let segment = match ready!(self.io.poll_read(cx)) {
                    Ok(segment) => segment,
                    Err(err) => {
                        self.fail_connection();
                        return Poll::Ready(Err(err.into()));
                    }
                };
                if segment.is_empty() {
                    self.fail_connection();
                    return Poll::Ready(Err(ConnectionLost.into()));
                }
                self.rbuf.feed(segment);
                continue;
            }

            if let Err(err) = self.handle_message(stmt) {
                self.fail_connection();
                return Poll::Ready(Err(err));
            }
        }
    }

    /// Dispatch exactly one fully-buffered message.
    fn handle_message(&mut self, stmt: Option<&PreparedStatement>) -> Result<()> {
        let out = self.dispatch(stmt);
        self.rbuf.discard_message();
        out
    }

    fn dispatch(&mut self, stmt: Option<&PreparedStatement>) -> Result<()> {
        use backend::*;

        let tag = self.rbuf.message_type();
        verbose!(tag = tag as char, state = ?self.exec, "dispatch");

        // out-of-band messages first; they are valid in any state and a
        // drained request must not eat them
        match tag {
            ParameterStatus::MSGTYPE => {
                let body = self.rbuf.consume_message()?;
                let status = ParameterStatus::decode(tag, body)?;
                self.settings.update(status.name, status.value)?;
                return Ok(());
            }
            NoticeResponse::MSGTYPE => {
                let body = self.rbuf.consume_message()?;
                let notice = ServerError::parse(body);
                match &mut self.notice_hook {
                    Some(hook) => hook(notice),
                    None => {
                        debug!("{notice}");
                    }
                }
                return Ok(());
            }
            NotificationResponse::MSGTYPE => {
                let body = self.rbuf.consume_message()?;
                self.notifications.push_back(NotificationResponse::decode(tag, body)?);
                return Ok(());
            }
            BackendKeyData::MSGTYPE => {
                let body = self.rbuf.consume_message()?;
                self.backend_key = Some(BackendKeyData::decode(tag, body)?);
                return Ok(());
            }
            _ => {}
        }

        if self.skip_until_ready {
            if tag == ReadyForQuery::MSGTYPE {
                let status = self.rbuf.read_byte()?;
                self.tx_status = TransactionStatus::from_status_byte(status);
                self.skip_until_ready = false;
            }
            return Ok(());
        }

        match tag {
            ErrorResponse::MSGTYPE => {
                let body = self.rbuf.consume_message()?;
                let error = ServerError::parse(body);
                self.result.fail(error);
                if matches!(self.exec, ExecState::Auth) {
                    // a startup failure is not followed by ReadyForQuery
                    self.conn_state = ConnState::Bad;
                    self.exec = ExecState::Failed;
                    self.result.done = true;
                } else {
                    self.exec = ExecState::ErrorConsume;
                }
            }

            ReadyForQuery::MSGTYPE => {
                let status = self.rbuf.read_byte()?;
                self.tx_status = TransactionStatus::from_status_byte(status);
                self.exec = ExecState::Idle;
                self.result.done = true;
            }

            Authentication::MSGTYPE if matches!(self.exec, ExecState::Auth) => {
                let body = self.rbuf.consume_message()?;
                self.handle_auth(Authentication::decode(tag, body)?)?;
            }

            _ if matches!(self.exec, ExecState::ErrorConsume) => {
                // discard everything up to ReadyForQuery
            }

            ParseComplete::MSGTYPE | BindComplete::MSGTYPE | CloseComplete::MSGTYPE
            | NoData::MSGTYPE => {}

            ParameterDescription::MSGTYPE if matches!(self.exec, ExecState::Prepare) => {
                self.result.param_desc = Some(self.rbuf.consume_message()?);
            }

            RowDescription::MSGTYPE => match self.exec {
                ExecState::Prepare => {
                    self.result.row_desc = Some(self.rbuf.consume_message()?);
                }
                ExecState::SimpleQuery => {
                    let body = self.rbuf.consume_message()?;
                    let mut schema = RowSchema::parse(body)?;
                    schema.bind_codecs_for_simple_query(&mut self.codecs)?;
                    self.result.simple_schema = Some(schema);
                }
                _ => self.unexpected(tag),
            },

            DataRow::MSGTYPE => match self.exec {
                ExecState::BindExecute | ExecState::Execute => {
                    let body = self.rbuf.consume_message()?;
                    let Some(stmt) = stmt else {
                        return Err(ProtocolError::unexpected(tag, "no bound statement").into());
                    };
                    match stmt.decode_row(body) {
                        Ok(row) => self.result.rows.push(row),
                        // a decode failure is the request's failure, not
                        // the connection's; keep draining
                        Err(err) => {
                            self.result.fail(err);
                            self.exec = ExecState::ErrorConsume;
                        }
                    }
                }
                ExecState::SimpleQuery => {
                    let body = self.rbuf.consume_message()?;
                    let Some(schema) = &self.result.simple_schema else {
                        return Err(ProtocolError::unexpected(tag, "no row description").into());
                    };
                    match schema.decode_row(body) {
                        Ok(row) => self.result.rows.push(row),
                        Err(err) => {
                            self.result.fail(err);
                            self.exec = ExecState::ErrorConsume;
                        }
                    }
                }
                _ => self.unexpected(tag),
            },

            CommandComplete::MSGTYPE => {
                let body = self.rbuf.consume_message()?;
                let complete = CommandComplete::decode(tag, body)?;
                self.result.command_tag = Some(complete.tag);
                self.result.suspended = false;
                // a simple query may carry several result sets
                self.result.simple_schema = None;
            }

            PortalSuspended::MSGTYPE => {
                self.result.suspended = true;
            }

            EmptyQueryResponse::MSGTYPE => {
                self.result.command_tag = Some(ByteStr::default());
            }

            NegotiateProtocolVersion::MSGTYPE => {
                let body = self.rbuf.consume_message()?;
                let negotiate = NegotiateProtocolVersion::decode(tag, body)?;
                debug!(
                    "server negotiated protocol 3.{}, {} options unrecognized",
                    negotiate.minor, negotiate.unrecognized,
                );
            }

            CopyInResponse::MSGTYPE | CopyBothResponse::MSGTYPE => {
                // refuse the transfer; the backend answers with an
                // ErrorResponse which completes the request
                self.send(frontend::CopyFail { message: "COPY is not supported" });
                self.result.fail(ProtocolError::Unsupported("COPY"));
            }

            CopyOutResponse::MSGTYPE => {
                // nothing to refuse; drain the copy stream to completion
                self.result.fail(ProtocolError::Unsupported("COPY"));
            }

            CopyData::MSGTYPE | CopyDone::MSGTYPE => {}

            other => self.unexpected(other),
        }

        Ok(())
    }

    /// The state machine does not abort on unexpected-but-harmless
    /// messages.
    fn unexpected(&mut self, tag: u8) {
        debug!("unexpected message {:?} in {:?}, skipped", tag as char, self.exec);
    }

    fn handle_auth(&mut self, auth: backend::Authentication) -> Result<()> {
        use backend::Authentication;

        let config = self.auth.clone();
        match auth {
            Authentication::Ok => {
                self.conn_state = ConnState::Ok;
            }
            Authentication::CleartextPassword => {
                let password = config.and_then(|c| c.password).unwrap_or_default();
                self.send(frontend::PasswordMessage { password: password.as_str() });
            }
            Authentication::MD5Password { salt } => {
                let config = config.unwrap_or_else(|| StartupConfig::new(""));
                self.send(frontend::PasswordMd5 {
                    password: config.password.as_deref().unwrap_or_default(),
                    user: &config.user,
                    salt,
                });
            }
            Authentication::SASL | Authentication::SASLContinue | Authentication::SASLFinal => {
                return Err(ProtocolError::UnsupportedAuth("SASL").into());
            }
            Authentication::KerberosV5 => {
                return Err(ProtocolError::UnsupportedAuth("Kerberos V5").into());
            }
            Authentication::GSS => return Err(ProtocolError::UnsupportedAuth("GSSAPI").into()),
            Authentication::SSPI => return Err(ProtocolError::UnsupportedAuth("SSPI").into()),
        }
        Ok(())
    }

    pub(crate) fn start_startup(&mut self, config: StartupConfig) -> Result<()> {
        self.begin_request(ExecState::Auth)?;
        frontend::Startup {
            user: &config.user,
            database: config.database.as_deref(),
            application_name: config.application_name.as_deref(),
            replication: config.replication.as_deref(),
            client_encoding: "utf8",
        }
        .write(&mut self.wbuf);
        self.auth = Some(config);
        Ok(())
    }

    pub(crate) fn finish_startup(&mut self) -> Result<()> {
        self.auth = None;
        let result = std::mem::take(&mut self.result);
        if let Some(err) = result.failed {
            return Err(err);
        }
        if !matches!(self.conn_state, ConnState::Ok) {
            return Err(ConnectionLost.into());
        }
        Ok(())
    }

    /// Flush buffered frames, then shut the transport down.
    pub(crate) fn poll_close(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        ready!(self.poll_flush_io(cx))?;
        self.poll_shutdown_io(cx)
    }

    pub(crate) fn poll_shutdown_io(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        self.closed = true;
        self.conn_state = ConnState::Bad;
        self.io.poll_shutdown(cx)
    }

    /// Poll one out-of-band message while idle; used by the notification
    /// stream.
    pub(crate) fn poll_idle_message(&mut self, cx: &mut Context) -> Poll<Result<()>> {
        if !matches!(self.exec, ExecState::Idle) || self.is_closed() {
            return Poll::Pending;
        }
        loop {
            let has_message = match self.rbuf.has_message() {
                Ok(has) => has,
                Err(err) => {
                    self.fail_connection();
                    return Poll::Ready(Err(err.into()));
                }
            };
            if has_message {
                break;
            }
            let segment = match ready!(self.io.poll_read(cx)) {
                Ok(segment) => segment,
                Err(err) => {
                    self.fail_connection();
                    return Poll::Ready(Err(err.into()));
                }
            };
            if segment.is_empty() {
                self.fail_connection();
                return Poll::Ready(Err(ConnectionLost.into()));
            }
            self.rbuf.feed(segment);
        }
        if let Err(err) = self.handle_message(None) {
            self.fail_connection();
            return Poll::Ready(Err(err));
        }
        Poll::Ready(Ok(()))
    }

    #[cfg(test)]
    pub(crate) fn read_buffer_counters(&self) -> (u64, u64) {
        (self.rbuf.messages_framed(), self.rbuf.messages_discarded())
    }

    #[cfg(test)]
    pub(crate) fn io_ref(&self) -> &IO {
        &self.io
    }
}

impl<IO> std::fmt::Debug for Protocol<IO> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Protocol")
            .field("conn_state", &self.conn_state)
            .field("exec", &self.exec)
            .field("tx_status", &self.tx_status)
            .finish_non_exhaustive()
    }
}
