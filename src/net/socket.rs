use bytes::{BufMut, Bytes, BytesMut};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use crate::common::debug;
use crate::transport::Transport;

const READ_CHUNK: usize = 8 * 1024;

/// An either `TcpStream` or `UnixStream` implementing [`Transport`].
pub struct Socket {
    kind: Kind,
    chunk: BytesMut,
}

enum Kind {
    Tcp(tokio::net::TcpStream),
    #[cfg(unix)]
    Unix(tokio::net::UnixStream),
}

impl Socket {
    pub async fn connect_tcp(host: &str, port: u16) -> io::Result<Socket> {
        let socket = tokio::net::TcpStream::connect((host, port)).await?;
        socket.set_nodelay(true)?;
        debug!("connected via TCP stream: {:?}", socket.local_addr());
        Ok(Socket { kind: Kind::Tcp(socket), chunk: BytesMut::with_capacity(READ_CHUNK) })
    }

    #[cfg(unix)]
    pub async fn connect_unix(path: &str) -> io::Result<Socket> {
        let socket = tokio::net::UnixStream::connect(path).await?;
        debug!("connected via unix socket: {path:?}");
        Ok(Socket { kind: Kind::Unix(socket), chunk: BytesMut::with_capacity(READ_CHUNK) })
    }
}

impl Transport for Socket {
    fn poll_read(&mut self, cx: &mut Context) -> Poll<io::Result<Bytes>> {
        use tokio::io::{AsyncRead, ReadBuf};

        self.chunk.reserve(READ_CHUNK);
        let n = {
            let dst = self.chunk.chunk_mut();
            let dst = unsafe { dst.as_uninit_slice_mut() };
            let mut buf = ReadBuf::uninit(dst);
            let ptr = buf.filled().as_ptr();
            match &mut self.kind {
                Kind::Tcp(t) => ready!(AsyncRead::poll_read(Pin::new(t), cx, &mut buf)?),
                #[cfg(unix)]
                Kind::Unix(u) => ready!(AsyncRead::poll_read(Pin::new(u), cx, &mut buf)?),
            }

            // Ensure the pointer does not change from under us
            assert_eq!(ptr, buf.filled().as_ptr());
            buf.filled().len()
        };

        // Safety: this is the number of initialized (and read) bytes per
        // the invariants of `ReadBuf::filled`.
        unsafe {
            self.chunk.advance_mut(n);
        }

        Poll::Ready(Ok(self.chunk.split().freeze()))
    }

    fn poll_write(&mut self, cx: &mut Context, buf: &[u8]) -> Poll<io::Result<usize>> {
        use tokio::io::AsyncWrite;
        match &mut self.kind {
            Kind::Tcp(t) => AsyncWrite::poll_write(Pin::new(t), cx, buf),
            #[cfg(unix)]
            Kind::Unix(u) => AsyncWrite::poll_write(Pin::new(u), cx, buf),
        }
    }

    fn poll_flush(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        use tokio::io::AsyncWrite;
        match &mut self.kind {
            Kind::Tcp(t) => AsyncWrite::poll_flush(Pin::new(t), cx),
            #[cfg(unix)]
            Kind::Unix(u) => AsyncWrite::poll_flush(Pin::new(u), cx),
        }
    }

    fn poll_shutdown(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        use tokio::io::AsyncWrite;
        match &mut self.kind {
            Kind::Tcp(t) => AsyncWrite::poll_shutdown(Pin::new(t), cx),
            #[cfg(unix)]
            Kind::Unix(u) => AsyncWrite::poll_shutdown(Pin::new(u), cx),
        }
    }
}

impl std::fmt::Debug for Socket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            Kind::Tcp(tcp) => std::fmt::Debug::fmt(tcp, f),
            #[cfg(unix)]
            Kind::Unix(unix) => std::fmt::Debug::fmt(unix, f),
        }
    }
}
