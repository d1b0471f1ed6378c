//! One-request-at-a-time operations over [`Protocol`].
//!
//! Each operation writes its frame batch, terminated by `Sync`, and
//! returns a future that drives the dispatch loop until the matching
//! `ReadyForQuery`. Dropping an operation future abandons the request
//! cooperatively: the response frames are drained before the next
//! request's.
use futures_core::Stream;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use crate::common::ByteStr;
use crate::error::Result;
use crate::postgres::frontend;
use crate::protocol::{ExecState, Notification, Protocol, ResultAccumulator, StartupConfig};
use crate::statement::PreparedStatement;
use crate::transport::{self, Transport};
use crate::value::Value;

/// Decoded rows and completion data of one executed command.
#[derive(Debug)]
pub struct QueryResult {
    /// Decoded rows, in receive order.
    pub rows: Vec<Vec<Value>>,
    /// The command tag of `CommandComplete`, e.g. `SELECT 1`.
    pub command_tag: Option<ByteStr>,
    /// Whether the portal suspended at the row limit instead of
    /// completing.
    pub suspended: bool,
}

impl QueryResult {
    fn from_accumulator(acc: ResultAccumulator) -> Self {
        Self {
            rows: acc.rows,
            command_tag: acc.command_tag,
            suspended: acc.suspended,
        }
    }

    /// Rows affected, parsed out of the command tag.
    pub fn rows_affected(&self) -> u64 {
        let Some(tag) = &self.command_tag else {
            return 0;
        };
        let mut whs = tag.split_whitespace();
        let Some(tag) = whs.next() else {
            return 0;
        };
        let Some(rows) = whs.next() else {
            return 0;
        };
        match tag {
            "INSERT" => whs.next().unwrap_or_default(),
            "SELECT" | "UPDATE" | "DELETE" | "MERGE" | "FETCH" | "MOVE" | "COPY" => rows,
            _ => return 0,
        }
        .parse()
        .unwrap_or_default()
    }
}

impl<IO: Transport> Protocol<IO> {
    /// Perform the startup phase: send the startup packet, answer the
    /// authentication request, and wait for `ReadyForQuery`.
    ///
    /// <https://www.postgresql.org/docs/current/protocol-flow.html#PROTOCOL-FLOW-START-UP>
    pub fn startup(&mut self, config: StartupConfig) -> Result<Startup<'_, IO>> {
        self.start_startup(config)?;
        Ok(Startup { proto: self, done: false })
    }

    /// Parse and describe a statement: `Parse` + `Describe(S)` + `Sync`.
    ///
    /// An empty `name` selects the unnamed prepared statement.
    pub fn prepare(&mut self, name: &str, query: &str) -> Result<Prepare<'_, IO>> {
        self.begin_request(ExecState::Prepare)?;
        self.send(frontend::Parse {
            statement: name,
            sql: query,
            oids_len: 0,
            oids: std::iter::empty(),
        });
        self.send(frontend::Describe { kind: b'S', name });
        self.send(frontend::Sync);
        Ok(Prepare {
            proto: self,
            name: ByteStr::copy_from_str(name),
            query: ByteStr::copy_from_str(query),
            done: false,
        })
    }

    /// Bind and run in one batch: `Bind` + `Execute` + `Sync`.
    ///
    /// Argument encoding happens here, into a local buffer; an encoding
    /// error surfaces before any byte reaches the transport. `limit` zero
    /// means no row limit.
    pub fn bind_execute<'a>(
        &'a mut self,
        stmt: &'a PreparedStatement,
        args: &[Value],
        portal: &str,
        limit: i32,
    ) -> Result<BindExecute<'a, IO>> {
        let body = stmt.encode_bind(portal, args)?;
        self.begin_request(ExecState::BindExecute)?;
        self.send(frontend::Bind { body: &body });
        self.send(frontend::Execute { portal, max_rows: limit });
        self.send(frontend::Sync);
        Ok(BindExecute { proto: self, stmt, done: false })
    }

    /// Open a portal without executing: `Bind` + `Sync`.
    ///
    /// On success the statement's portal reference count is raised; the
    /// owner drops it again when the portal closes.
    pub fn bind<'a>(
        &'a mut self,
        stmt: &'a PreparedStatement,
        args: &[Value],
        portal: &str,
    ) -> Result<Bind<'a, IO>> {
        let body = stmt.encode_bind(portal, args)?;
        self.begin_request(ExecState::Bind)?;
        self.send(frontend::Bind { body: &body });
        self.send(frontend::Sync);
        Ok(Bind { proto: self, stmt, done: false })
    }

    /// Run an existing portal: `Execute` + `Sync`.
    ///
    /// Rows decode against the statement the portal was bound from.
    pub fn execute<'a>(
        &'a mut self,
        stmt: &'a PreparedStatement,
        portal: &str,
        limit: i32,
    ) -> Result<Execute<'a, IO>> {
        stmt.check_open()?;
        self.begin_request(ExecState::Execute)?;
        self.send(frontend::Execute { portal, max_rows: limit });
        self.send(frontend::Sync);
        Ok(Execute { proto: self, stmt, done: false })
    }

    /// Simple-query protocol: one `Query` message, any number of result
    /// sets.
    ///
    /// <https://www.postgresql.org/docs/current/protocol-flow.html#PROTOCOL-FLOW-SIMPLE-QUERY>
    pub fn query(&mut self, sql: &str) -> Result<SimpleQuery<'_, IO>> {
        self.begin_request(ExecState::SimpleQuery)?;
        self.send(frontend::Query { sql });
        Ok(SimpleQuery { proto: self, done: false })
    }

    /// Release a server-side prepared statement: `Close(S)` + `Sync`.
    ///
    /// Refused while portals depend on it; on success the statement
    /// rejects further operations.
    pub fn close_statement<'a>(
        &'a mut self,
        stmt: &'a PreparedStatement,
    ) -> Result<CloseStatement<'a, IO>> {
        stmt.check_closable()?;
        self.begin_request(ExecState::CloseStmtPortal)?;
        self.send(frontend::Close { kind: b'S', name: stmt.name() });
        self.send(frontend::Sync);
        Ok(CloseStatement { proto: self, stmt, done: false })
    }

    /// Close a portal: `Close(P)` + `Sync`.
    pub fn close_portal(&mut self, portal: &str) -> Result<ClosePortal<'_, IO>> {
        self.begin_request(ExecState::CloseStmtPortal)?;
        self.send(frontend::Close { kind: b'P', name: portal });
        self.send(frontend::Sync);
        Ok(ClosePortal { proto: self, done: false })
    }

    /// Graceful close: `Terminate`, flush, shut the transport down.
    pub fn close(&mut self) -> Close<'_, IO> {
        if !self.is_closed() {
            self.send(frontend::Terminate);
        }
        Close { proto: self }
    }

    /// Hard cancel: tear the transport down without a goodbye.
    ///
    /// Any pending caller completes with a connection-lost error.
    pub fn abort(&mut self) -> Abort<'_, IO> {
        Abort { proto: self }
    }

    /// Queued `NOTIFY` events as a stream.
    ///
    /// While the connection is idle the stream reads the transport, so
    /// out-of-band notifications arrive without a query in flight.
    pub fn notifications(&mut self) -> Notifications<'_, IO> {
        Notifications { proto: self, failed: false }
    }
}

/// Cancel an in-flight request out of band.
///
/// Opens no state on `io`: writes the `CancelRequest` packet carrying the
/// [`backend_key`][Protocol::backend_key] and closes. The target
/// connection sees its request fail or complete normally, by server
/// timing.
pub async fn cancel_request<IO: Transport>(
    mut io: IO,
    process_id: i32,
    secret_key: i32,
) -> Result<()> {
    let mut buf = crate::io::WriteBuffer::new();
    frontend::CancelRequest { process_id, secret_key }.write(&mut buf);
    transport::write_all(&mut io, buf.as_slice()).await?;
    transport::shutdown(&mut io).await?;
    Ok(())
}

macro_rules! abandon_on_drop {
    ($name:ident) => {
        impl<IO> Drop for $name<'_, IO> {
            fn drop(&mut self) {
                if !self.done {
                    self.proto.abandon_request();
                }
            }
        }
    };
}

/// Await the completion anchor, then hand the accumulator to the caller.
fn poll_request<IO: Transport>(
    proto: &mut Protocol<IO>,
    stmt: Option<&PreparedStatement>,
    done: &mut bool,
    cx: &mut Context<'_>,
) -> Poll<Result<ResultAccumulator>> {
    if let Err(err) = ready!(proto.poll_until_done(cx, stmt)) {
        *done = true;
        return Poll::Ready(Err(err));
    }
    *done = true;
    let acc = std::mem::take(&mut proto.result);
    match acc.failed {
        Some(err) => Poll::Ready(Err(err)),
        None => Poll::Ready(Ok(acc)),
    }
}

/// Completion future of [`Protocol::startup`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Startup<'a, IO> {
    proto: &'a mut Protocol<IO>,
    done: bool,
}

impl<IO: Transport> Future for Startup<'_, IO> {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let me = self.get_mut();
        if let Err(err) = ready!(me.proto.poll_until_done(cx, None)) {
            me.done = true;
            return Poll::Ready(Err(err));
        }
        me.done = true;
        Poll::Ready(me.proto.finish_startup())
    }
}

abandon_on_drop!(Startup);

/// Completion future of [`Protocol::prepare`].
///
/// Resolves to the statement with its descriptors set; codecs are bound
/// when every referenced type is known, otherwise the caller introspects
/// the oids of [`init_types`][PreparedStatement::init_types] first.
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Prepare<'a, IO> {
    proto: &'a mut Protocol<IO>,
    name: ByteStr,
    query: ByteStr,
    done: bool,
}

impl<IO: Transport> Future for Prepare<'_, IO> {
    type Output = Result<PreparedStatement>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let me = self.get_mut();
        let acc = match ready!(poll_request(me.proto, None, &mut me.done, cx)) {
            Ok(acc) => acc,
            Err(err) => return Poll::Ready(Err(err)),
        };

        let mut stmt = PreparedStatement::new(
            std::mem::take(&mut me.name),
            std::mem::take(&mut me.query),
        );
        if let Some(param_desc) = acc.param_desc {
            stmt.set_param_desc(param_desc)?;
        }
        stmt.set_row_desc(acc.row_desc)?;
        if stmt.init_types(me.proto.codecs()).is_empty() {
            stmt.init_codecs(me.proto.codecs())?;
        }
        Poll::Ready(Ok(stmt))
    }
}

abandon_on_drop!(Prepare);

/// Completion future of [`Protocol::bind_execute`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct BindExecute<'a, IO> {
    proto: &'a mut Protocol<IO>,
    stmt: &'a PreparedStatement,
    done: bool,
}

impl<IO: Transport> Future for BindExecute<'_, IO> {
    type Output = Result<QueryResult>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let me = self.get_mut();
        let acc = ready!(poll_request(me.proto, Some(me.stmt), &mut me.done, cx))?;
        Poll::Ready(Ok(QueryResult::from_accumulator(acc)))
    }
}

abandon_on_drop!(BindExecute);

/// Completion future of [`Protocol::bind`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Bind<'a, IO> {
    proto: &'a mut Protocol<IO>,
    stmt: &'a PreparedStatement,
    done: bool,
}

impl<IO: Transport> Future for Bind<'_, IO> {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let me = self.get_mut();
        ready!(poll_request(me.proto, Some(me.stmt), &mut me.done, cx))?;
        me.stmt.attach();
        Poll::Ready(Ok(()))
    }
}

abandon_on_drop!(Bind);

/// Completion future of [`Protocol::execute`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Execute<'a, IO> {
    proto: &'a mut Protocol<IO>,
    stmt: &'a PreparedStatement,
    done: bool,
}

impl<IO: Transport> Future for Execute<'_, IO> {
    type Output = Result<QueryResult>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let me = self.get_mut();
        let acc = ready!(poll_request(me.proto, Some(me.stmt), &mut me.done, cx))?;
        Poll::Ready(Ok(QueryResult::from_accumulator(acc)))
    }
}

abandon_on_drop!(Execute);

/// Completion future of [`Protocol::query`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct SimpleQuery<'a, IO> {
    proto: &'a mut Protocol<IO>,
    done: bool,
}

impl<IO: Transport> Future for SimpleQuery<'_, IO> {
    type Output = Result<QueryResult>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let me = self.get_mut();
        let acc = ready!(poll_request(me.proto, None, &mut me.done, cx))?;
        Poll::Ready(Ok(QueryResult::from_accumulator(acc)))
    }
}

abandon_on_drop!(SimpleQuery);

/// Completion future of [`Protocol::close_statement`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct CloseStatement<'a, IO> {
    proto: &'a mut Protocol<IO>,
    stmt: &'a PreparedStatement,
    done: bool,
}

impl<IO: Transport> Future for CloseStatement<'_, IO> {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let me = self.get_mut();
        ready!(poll_request(me.proto, None, &mut me.done, cx))?;
        me.stmt.mark_closed();
        Poll::Ready(Ok(()))
    }
}

abandon_on_drop!(CloseStatement);

/// Completion future of [`Protocol::close_portal`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct ClosePortal<'a, IO> {
    proto: &'a mut Protocol<IO>,
    done: bool,
}

impl<IO: Transport> Future for ClosePortal<'_, IO> {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let me = self.get_mut();
        ready!(poll_request(me.proto, None, &mut me.done, cx))?;
        Poll::Ready(Ok(()))
    }
}

abandon_on_drop!(ClosePortal);

/// Completion future of [`Protocol::close`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Close<'a, IO> {
    proto: &'a mut Protocol<IO>,
}

impl<IO: Transport> Future for Close<'_, IO> {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let me = self.get_mut();
        ready!(me.proto.poll_close(cx))?;
        Poll::Ready(Ok(()))
    }
}

/// Completion future of [`Protocol::abort`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Abort<'a, IO> {
    proto: &'a mut Protocol<IO>,
}

impl<IO: Transport> Future for Abort<'_, IO> {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let me = self.get_mut();
        ready!(me.proto.poll_shutdown_io(cx))?;
        Poll::Ready(Ok(()))
    }
}

/// Stream of out-of-band `NOTIFY` events.
#[must_use = "streams do nothing unless polled"]
pub struct Notifications<'a, IO> {
    proto: &'a mut Protocol<IO>,
    failed: bool,
}

impl<IO: Transport> Stream for Notifications<'_, IO> {
    type Item = Result<Notification>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let me = self.get_mut();
        if me.failed {
            return Poll::Ready(None);
        }
        loop {
            if let Some(notification) = me.proto.take_notification() {
                return Poll::Ready(Some(Ok(notification)));
            }
            if let Err(err) = ready!(me.proto.poll_idle_message(cx)) {
                me.failed = true;
                return Poll::Ready(Some(Err(err)));
            }
        }
    }
}

#[cfg(test)]
mod test {
    use bytes::Bytes;
    use std::collections::VecDeque;
    use std::io;
    use std::task::Waker;

    use super::*;
    use crate::error::ErrorKind;
    use crate::io::WriteBuffer;
    use crate::postgres::{Oid, oid};

    /// A transport fed from a script of segments.
    struct Script {
        incoming: VecDeque<Bytes>,
        written: Vec<u8>,
        shutdown: bool,
    }

    impl Script {
        fn new() -> Self {
            Self { incoming: VecDeque::new(), written: Vec::new(), shutdown: false }
        }

        fn feed(&mut self, bytes: impl Into<Bytes>) -> &mut Self {
            self.incoming.push_back(bytes.into());
            self
        }

        fn feed_eof(&mut self) -> &mut Self {
            self.incoming.push_back(Bytes::new());
            self
        }
    }

    impl Transport for Script {
        fn poll_read(&mut self, _: &mut Context) -> Poll<io::Result<Bytes>> {
            match self.incoming.pop_front() {
                Some(segment) => Poll::Ready(Ok(segment)),
                None => Poll::Pending,
            }
        }

        fn poll_write(&mut self, _: &mut Context, buf: &[u8]) -> Poll<io::Result<usize>> {
            self.written.extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(&mut self, _: &mut Context) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(&mut self, _: &mut Context) -> Poll<io::Result<()>> {
            self.shutdown = true;
            Poll::Ready(Ok(()))
        }
    }

    /// Poll a future to completion against the scripted transport.
    fn run<F: Future>(fut: F) -> F::Output {
        let mut cx = Context::from_waker(Waker::noop());
        let mut fut = std::pin::pin!(fut);
        for _ in 0..1000 {
            if let Poll::Ready(out) = fut.as_mut().poll(&mut cx) {
                return out;
            }
        }
        panic!("future stalled on scripted transport");
    }

    // ===== server-side frame builders =====

    fn msg(tag: u8, body: &[u8]) -> Vec<u8> {
        let mut out = vec![tag];
        out.extend_from_slice(&(body.len() as i32 + 4).to_be_bytes());
        out.extend_from_slice(body);
        out
    }

    fn auth_ok() -> Vec<u8> {
        msg(b'R', &0i32.to_be_bytes())
    }

    fn backend_key(pid: i32, secret: i32) -> Vec<u8> {
        let mut body = pid.to_be_bytes().to_vec();
        body.extend_from_slice(&secret.to_be_bytes());
        msg(b'K', &body)
    }

    fn parameter_status(name: &str, value: &str) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(name.as_bytes());
        body.push(0);
        body.extend_from_slice(value.as_bytes());
        body.push(0);
        msg(b'S', &body)
    }

    fn ready_for_query(status: u8) -> Vec<u8> {
        msg(b'Z', &[status])
    }

    fn parse_complete() -> Vec<u8> {
        msg(b'1', &[])
    }

    fn bind_complete() -> Vec<u8> {
        msg(b'2', &[])
    }

    fn parameter_description(oids: &[Oid]) -> Vec<u8> {
        let mut body = (oids.len() as i16).to_be_bytes().to_vec();
        for oid in oids {
            body.extend_from_slice(&oid.to_be_bytes());
        }
        msg(b't', &body)
    }

    fn row_description(fields: &[(&str, Oid, i16)]) -> Vec<u8> {
        let mut buf = WriteBuffer::new();
        buf.write_int16(fields.len() as i16);
        for (name, type_oid, format) in fields {
            buf.write_str(name);
            buf.write_int32(0);
            buf.write_int16(0);
            buf.write_uint32(*type_oid);
            buf.write_int16(-1);
            buf.write_int32(-1);
            buf.write_int16(*format);
        }
        msg(b'T', buf.as_slice())
    }

    fn data_row(fields: &[Option<&[u8]>]) -> Vec<u8> {
        let mut buf = WriteBuffer::new();
        buf.write_int16(fields.len() as i16);
        for field in fields {
            match field {
                None => {
                    buf.write_int32(-1);
                }
                Some(payload) => {
                    buf.write_int32(payload.len() as i32);
                    buf.write_bytes(payload);
                }
            }
        }
        msg(b'D', buf.as_slice())
    }

    fn command_complete(tag: &str) -> Vec<u8> {
        let mut body = tag.as_bytes().to_vec();
        body.push(0);
        msg(b'C', &body)
    }

    fn error_response(fields: &[(u8, &str)]) -> Vec<u8> {
        let mut body = Vec::new();
        for (ty, value) in fields {
            body.push(*ty);
            body.extend_from_slice(value.as_bytes());
            body.push(0);
        }
        body.push(0);
        msg(b'E', &body)
    }

    fn notification(pid: i32, channel: &str, payload: &str) -> Vec<u8> {
        let mut body = pid.to_be_bytes().to_vec();
        body.extend_from_slice(channel.as_bytes());
        body.push(0);
        body.extend_from_slice(payload.as_bytes());
        body.push(0);
        msg(b'A', &body)
    }

    fn handshake() -> Vec<u8> {
        let mut script = auth_ok();
        script.extend(parameter_status("server_version", "16.3"));
        script.extend(parameter_status("client_encoding", "UTF8"));
        script.extend(parameter_status("integer_datetimes", "on"));
        script.extend(backend_key(4242, 1717));
        script.extend(ready_for_query(b'I'));
        script
    }

    fn connected(extra: Vec<u8>) -> Protocol<Script> {
        let mut script = Script::new();
        script.feed(handshake()).feed(extra);
        let mut proto = Protocol::new(script);
        run(proto.startup(StartupConfig::new("alice").with_database("db")).unwrap()).unwrap();
        proto
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn startup_handshake() {
        let proto = connected(Vec::new());
        assert_eq!(proto.settings().server_version(), Some("16.3"));
        assert_eq!(proto.backend_key(), Some((4242, 1717)));
        assert_eq!(
            proto.transaction_status(),
            crate::postgres::TransactionStatus::Idle,
        );
    }

    #[test]
    fn startup_writes_packet() {
        let mut script = Script::new();
        script.feed(handshake());
        let mut proto = Protocol::new(script);
        run(proto.startup(StartupConfig::new("alice").with_database("db")).unwrap()).unwrap();

        // untyped packet: length, version 3.0, then the parameter strings
        let written = &proto.io_ref().written;
        let expect_tail = b"client_encoding\0utf8\0user\0alice\0database\0db\0\0";
        let len = 4 + 4 + expect_tail.len();
        assert_eq!(&written[..4], &(len as i32).to_be_bytes());
        assert_eq!(&written[4..8], &196_608i32.to_be_bytes());
        assert_eq!(&written[8..len], expect_tail);
    }

    #[test]
    fn md5_authentication() {
        let mut auth_md5 = 5i32.to_be_bytes().to_vec();
        auth_md5.extend_from_slice(&[147, 24, 57, 152]);
        let mut script = Script::new();
        let mut bytes = msg(b'R', &auth_md5);
        bytes.extend(auth_ok());
        bytes.extend(ready_for_query(b'I'));
        script.feed(bytes);

        let mut proto = Protocol::new(script);
        run(proto
            .startup(StartupConfig::new("root").with_password("password"))
            .unwrap())
        .unwrap();

        // the hash of ("password", "root", salt) from the documented scheme
        let written = &proto.io_ref().written;
        assert!(contains(written, b"md53e2c9d99d49b201ef867a36f3f9ed62c\0"));
    }

    #[test]
    fn unsupported_auth_fails() {
        let mut script = Script::new();
        script.feed(msg(b'R', &10i32.to_be_bytes()));
        let mut proto = Protocol::new(script);
        let err = run(proto.startup(StartupConfig::new("alice")).unwrap()).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Protocol(_)));
    }

    #[test]
    fn s1_simple_query_binary_row() {
        let mut extra = row_description(&[("int4", oid::INT4, 1)]);
        extra.extend(data_row(&[Some(&[0, 0, 0, 1])]));
        extra.extend(command_complete("SELECT 1"));
        extra.extend(ready_for_query(b'I'));

        let mut proto = connected(extra);
        let res = run(proto.query("SELECT 1::int4").unwrap()).unwrap();

        assert_eq!(res.rows, vec![vec![Value::Int4(1)]]);
        assert_eq!(res.command_tag.as_deref(), Some("SELECT 1"));
        assert_eq!(res.rows_affected(), 1);
        assert!(contains(&proto.io_ref().written, b"SELECT 1::int4\0"));

        let (framed, discarded) = proto.read_buffer_counters();
        assert_eq!(framed, discarded);
    }

    #[test]
    fn simple_query_text_row() {
        let mut extra = row_description(&[("sum", oid::INT4, 0)]);
        extra.extend(data_row(&[Some(b"41")]));
        extra.extend(command_complete("SELECT 1"));
        extra.extend(ready_for_query(b'I'));

        let mut proto = connected(extra);
        let res = run(proto.query("SELECT 41").unwrap()).unwrap();
        assert_eq!(res.rows, vec![vec![Value::Int4(41)]]);
    }

    #[test]
    fn s2_prepared_add() {
        let mut extra = parse_complete();
        extra.extend(parameter_description(&[oid::INT4, oid::INT4]));
        extra.extend(row_description(&[("?column?", oid::INT4, 0)]));
        extra.extend(ready_for_query(b'I'));
        // bind-execute exchange
        extra.extend(bind_complete());
        extra.extend(data_row(&[Some(&[0, 0, 0, 5])]));
        extra.extend(command_complete("SELECT 1"));
        extra.extend(ready_for_query(b'I'));

        let mut proto = connected(extra);

        let stmt = run(proto.prepare("", "SELECT $1::int4 + $2::int4").unwrap()).unwrap();
        assert_eq!(stmt.param_oids(), &[oid::INT4, oid::INT4]);
        assert_eq!(stmt.columns().len(), 1);
        assert_eq!(stmt.columns()[0].type_oid, oid::INT4);

        let res = run(proto.bind_execute(&stmt, &[2.into(), 3.into()], "", 0).unwrap()).unwrap();
        assert_eq!(res.rows, vec![vec![Value::Int4(5)]]);
        assert!(!res.suspended);

        // the Bind parameter frame carries both int4 payloads
        let written = &proto.io_ref().written;
        assert!(contains(written, &[0, 0, 0, 4, 0, 0, 0, 2, 0, 0, 0, 4, 0, 0, 0, 3]));
        // Parse carried the query text, Sync fenced the batch
        assert!(contains(written, b"SELECT $1::int4 + $2::int4\0"));
        assert!(contains(written, b"S\0\0\0\x04"));
    }

    #[test]
    fn s3_null_argument() {
        let mut extra = parse_complete();
        extra.extend(parameter_description(&[oid::TEXT]));
        extra.extend(row_description(&[("text", oid::TEXT, 0)]));
        extra.extend(ready_for_query(b'I'));
        extra.extend(bind_complete());
        extra.extend(data_row(&[None]));
        extra.extend(command_complete("SELECT 1"));
        extra.extend(ready_for_query(b'I'));

        let mut proto = connected(extra);
        let stmt = run(proto.prepare("", "SELECT $1::text").unwrap()).unwrap();
        let res = run(proto.bind_execute(&stmt, &[Value::Null], "", 0).unwrap()).unwrap();

        assert_eq!(res.rows, vec![vec![Value::Null]]);
        // NULL travels as length -1, no payload
        assert!(contains(&proto.io_ref().written, &[0, 1, 255, 255, 255, 255, 0, 1]));
    }

    #[test]
    fn portal_suspension_reported() {
        let mut extra = parse_complete();
        extra.extend(parameter_description(&[]));
        extra.extend(row_description(&[("n", oid::INT4, 0)]));
        extra.extend(ready_for_query(b'I'));
        extra.extend(bind_complete());
        extra.extend(data_row(&[Some(&[0, 0, 0, 1])]));
        extra.extend(msg(b's', &[])); // PortalSuspended
        extra.extend(ready_for_query(b'I'));

        let mut proto = connected(extra);
        let stmt = run(proto.prepare("", "SELECT n FROM generate_series(1,10) n").unwrap()).unwrap();
        let res = run(proto.bind_execute(&stmt, &[], "", 1).unwrap()).unwrap();
        assert!(res.suspended);
        assert_eq!(res.rows.len(), 1);
    }

    #[test]
    fn s6_error_then_recovery() {
        let mut extra = error_response(&[
            (b'S', "ERROR"),
            (b'V', "ERROR"),
            (b'C', "42P01"),
            (b'M', "relation \"x\" does not exist"),
        ]);
        extra.extend(ready_for_query(b'I'));
        // next request succeeds
        extra.extend(command_complete("CREATE TABLE"));
        extra.extend(ready_for_query(b'I'));

        let mut proto = connected(extra);

        let err = run(proto.query("SELECT * FROM x").unwrap()).unwrap_err();
        let server = err.server().expect("server error");
        assert_eq!(server.code(), "42P01");
        assert_eq!(server.message(), "relation \"x\" does not exist");

        // connection returned to idle; the next request works
        let res = run(proto.query("CREATE TABLE x(a int)").unwrap()).unwrap();
        assert_eq!(res.command_tag.as_deref(), Some("CREATE TABLE"));
    }

    #[test]
    fn error_mid_rows_drains_to_ready() {
        let mut extra = row_description(&[("n", oid::INT4, 1)]);
        extra.extend(data_row(&[Some(&[0, 0, 0, 1])]));
        extra.extend(error_response(&[(b'S', "ERROR"), (b'C', "57014"), (b'M', "canceled")]));
        // frames after the error are discarded up to ReadyForQuery
        extra.extend(data_row(&[Some(&[0, 0, 0, 2])]));
        extra.extend(ready_for_query(b'I'));

        let mut proto = connected(extra);
        let err = run(proto.query("SELECT n").unwrap()).unwrap_err();
        assert_eq!(err.server().unwrap().code(), "57014");

        let (framed, discarded) = proto.read_buffer_counters();
        assert_eq!(framed, discarded);
    }

    #[test]
    fn notification_is_out_of_band() {
        let mut extra = row_description(&[("n", oid::INT4, 1)]);
        extra.extend(notification(99, "updates", "hello"));
        extra.extend(data_row(&[Some(&[0, 0, 0, 7])]));
        extra.extend(command_complete("SELECT 1"));
        extra.extend(ready_for_query(b'I'));

        let mut proto = connected(extra);
        let res = run(proto.query("SELECT n").unwrap()).unwrap();
        assert_eq!(res.rows, vec![vec![Value::Int4(7)]]);

        let n = proto.take_notification().expect("queued notification");
        assert_eq!(n.process_id, 99);
        assert_eq!(n.channel, "updates");
        assert_eq!(n.payload, "hello");
    }

    #[test]
    fn notification_stream_reads_while_idle() {
        let mut proto = connected(notification(7, "jobs", "w"));

        let mut stream = proto.notifications();
        let mut cx = Context::from_waker(Waker::noop());
        let polled = Pin::new(&mut stream).poll_next(&mut cx);
        match polled {
            Poll::Ready(Some(Ok(n))) => assert_eq!(n.channel, "jobs"),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn dropped_request_drains_cooperatively() {
        let mut extra = row_description(&[("n", oid::INT4, 1)]);
        extra.extend(data_row(&[Some(&[0, 0, 0, 1])]));
        extra.extend(command_complete("SELECT 1"));
        extra.extend(ready_for_query(b'I'));
        // the follow-up request's response
        extra.extend(command_complete("CREATE TABLE"));
        extra.extend(ready_for_query(b'I'));

        let mut proto = connected(extra);

        let abandoned = proto.query("SELECT n").unwrap();
        drop(abandoned);

        // the first response belongs to the cancelled request and is
        // discarded wholesale
        let res = run(proto.query("CREATE TABLE t(a int)").unwrap()).unwrap();
        assert_eq!(res.command_tag.as_deref(), Some("CREATE TABLE"));
        assert!(res.rows.is_empty());
    }

    #[test]
    fn copy_in_is_refused() {
        let mut extra = msg(b'G', &[0, 0, 0]);
        extra.extend(error_response(&[(b'S', "ERROR"), (b'C', "57014"), (b'M', "COPY aborted")]));
        extra.extend(ready_for_query(b'I'));

        let mut proto = connected(extra);
        let err = run(proto.query("COPY t FROM stdin").unwrap()).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Protocol(_)));
        // CopyFail went out
        assert!(contains(&proto.io_ref().written, b"COPY is not supported\0"));
    }

    #[test]
    fn eof_mid_request_is_connection_lost() {
        let mut proto = {
            let mut script = Script::new();
            script.feed(handshake());
            script.feed(row_description(&[("n", oid::INT4, 1)]));
            script.feed_eof();
            let mut proto = Protocol::new(script);
            run(proto.startup(StartupConfig::new("alice")).unwrap()).unwrap();
            proto
        };

        let err = run(proto.query("SELECT n").unwrap()).unwrap_err();
        assert!(err.is_connection_lost());

        // the connection is dead for every later operation
        assert!(proto.query("SELECT 1").is_err());
    }

    #[test]
    fn unexpected_message_is_skipped() {
        // a harmless unknown tag inside a simple query
        let mut extra = msg(b'?', &[1, 2, 3]);
        extra.extend(command_complete("SELECT 0"));
        extra.extend(ready_for_query(b'I'));

        let mut proto = connected(extra);
        let res = run(proto.query("SELECT 1 WHERE false").unwrap()).unwrap();
        assert_eq!(res.command_tag.as_deref(), Some("SELECT 0"));
    }

    #[test]
    fn segmented_delivery() {
        let mut extra = row_description(&[("n", oid::INT4, 1)]);
        extra.extend(data_row(&[Some(&[0, 0, 0, 9])]));
        extra.extend(command_complete("SELECT 1"));
        extra.extend(ready_for_query(b'I'));

        let mut script = Script::new();
        script.feed(handshake());
        // deliver the response three bytes at a time
        for chunk in extra.chunks(3) {
            script.feed(chunk.to_vec());
        }

        let mut proto = Protocol::new(script);
        run(proto.startup(StartupConfig::new("alice")).unwrap()).unwrap();
        let res = run(proto.query("SELECT n").unwrap()).unwrap();
        assert_eq!(res.rows, vec![vec![Value::Int4(9)]]);
    }

    #[test]
    fn close_statement_marks_closed() {
        let mut extra = parse_complete();
        extra.extend(parameter_description(&[]));
        extra.extend(row_description(&[("n", oid::INT4, 0)]));
        extra.extend(ready_for_query(b'I'));
        extra.extend(msg(b'3', &[])); // CloseComplete
        extra.extend(ready_for_query(b'I'));

        let mut proto = connected(extra);
        let stmt = run(proto.prepare("s1", "SELECT 1").unwrap()).unwrap();

        stmt.attach();
        assert!(proto.close_statement(&stmt).is_err());
        stmt.detach();

        run(proto.close_statement(&stmt).unwrap()).unwrap();
        assert!(stmt.is_closed());
        assert!(proto.bind_execute(&stmt, &[], "", 0).is_err());
    }

    #[test]
    fn terminate_on_close() {
        let mut proto = connected(Vec::new());
        run(proto.close()).unwrap();
        assert!(proto.io_ref().shutdown);
        assert!(contains(&proto.io_ref().written, b"X\0\0\0\x04"));
        assert!(proto.query("SELECT 1").is_err());
    }

    #[test]
    fn cancel_packet_layout() {
        let mut io = Script::new();
        run(cancel_request(&mut io, 4242, 1717)).unwrap();

        let mut expect = Vec::new();
        expect.extend_from_slice(&16i32.to_be_bytes());
        expect.extend_from_slice(&80_877_102i32.to_be_bytes());
        expect.extend_from_slice(&4242i32.to_be_bytes());
        expect.extend_from_slice(&1717i32.to_be_bytes());
        assert_eq!(io.written, expect);
        assert!(io.shutdown);
    }
}
