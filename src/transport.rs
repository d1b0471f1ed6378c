//! The raw byte-stream seam under the protocol engine.
use bytes::Bytes;
use std::io;
use std::marker::PhantomPinned;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

/// A stream transport the protocol engine reads segments from and writes
/// frames to.
///
/// The engine never blocks inside the trait: every method is a plain poll.
/// An empty segment from [`poll_read`][Transport::poll_read] is end of
/// stream.
pub trait Transport: Unpin {
    /// Poll for the next segment of bytes, as delivered by the transport.
    fn poll_read(&mut self, cx: &mut Context) -> Poll<io::Result<Bytes>>;

    /// Poll to write some of `buf`, returning the number of bytes taken.
    fn poll_write(&mut self, cx: &mut Context, buf: &[u8]) -> Poll<io::Result<usize>>;

    /// Poll to flush the underlying io.
    fn poll_flush(&mut self, cx: &mut Context) -> Poll<io::Result<()>>;

    /// Poll to shut the stream down.
    fn poll_shutdown(&mut self, cx: &mut Context) -> Poll<io::Result<()>>;
}

impl<T> Transport for &mut T
where
    T: Transport,
{
    fn poll_read(&mut self, cx: &mut Context) -> Poll<io::Result<Bytes>> {
        T::poll_read(self, cx)
    }

    fn poll_write(&mut self, cx: &mut Context, buf: &[u8]) -> Poll<io::Result<usize>> {
        T::poll_write(self, cx, buf)
    }

    fn poll_flush(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        T::poll_flush(self, cx)
    }

    fn poll_shutdown(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        T::poll_shutdown(self, cx)
    }
}

/// Write all of `buf` to the transport.
pub fn write_all<'a, T: Transport>(transport: &'a mut T, buf: &'a [u8]) -> WriteAll<'a, T> {
    WriteAll { transport, buf, _pin: PhantomPinned }
}

/// Flush and shut the transport down.
pub fn shutdown<T: Transport>(transport: &mut T) -> Shutdown<'_, T> {
    Shutdown { transport, flushed: false, _pin: PhantomPinned }
}

pin_project_lite::pin_project! {
    #[must_use = "futures do nothing unless you `.await` or poll them"]
    pub struct WriteAll<'a, T> {
        transport: &'a mut T,
        buf: &'a [u8],
        #[pin]
        _pin: PhantomPinned,
    }
}

impl<T: Transport> Future for WriteAll<'_, T> {
    type Output = io::Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let me = self.project();
        while !me.buf.is_empty() {
            let n = ready!(me.transport.poll_write(cx, me.buf))?;
            if n == 0 {
                return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
            }
            let (_, rest) = std::mem::take(&mut *me.buf).split_at(n);
            *me.buf = rest;
        }
        Poll::Ready(Ok(()))
    }
}

pin_project_lite::pin_project! {
    #[must_use = "futures do nothing unless you `.await` or poll them"]
    pub struct Shutdown<'a, T> {
        transport: &'a mut T,
        flushed: bool,
        #[pin]
        _pin: PhantomPinned,
    }
}

impl<T: Transport> Future for Shutdown<'_, T> {
    type Output = io::Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let me = self.project();
        if !*me.flushed {
            ready!(me.transport.poll_flush(cx))?;
            *me.flushed = true;
        }
        me.transport.poll_shutdown(cx)
    }
}
