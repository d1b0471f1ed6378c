use bytes::{Buf, Bytes, BytesMut};
use std::collections::VecDeque;

use crate::postgres::ProtocolError;

/// Ingress buffer tracking postgres message boundaries.
///
/// Transport segments are appended as-is with [`feed`][ReadBuffer::feed] and
/// chained without copying. Once [`has_message`][ReadBuffer::has_message]
/// reports `true`, the typed readers consume the current message body;
/// every read is bounded by the message's declared length, and the owner
/// finishes the message with [`discard_message`][ReadBuffer::discard_message].
///
/// All communication is through a stream of messages. The first byte of a
/// message identifies the message type, and the next four bytes specify the
/// length of the rest of the message (this length count includes itself,
/// but not the message-type byte).
#[derive(Debug, Default)]
pub struct ReadBuffer {
    segments: VecDeque<Bytes>,
    /// total unconsumed bytes across all segments
    len: usize,
    frame: Option<Frame>,
    framed: u64,
    discarded: u64,
}

#[derive(Debug)]
struct Frame {
    tag: u8,
    body: usize,
    unread: usize,
}

impl ReadBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct a parser over one pre-framed message body.
    ///
    /// Used for decoding stored descriptor bytes (`RowDescription`,
    /// `ParameterDescription`) outside the live stream.
    pub fn message(payload: Bytes) -> Self {
        let len = payload.len();
        let mut segments = VecDeque::with_capacity(1);
        if len != 0 {
            segments.push_back(payload);
        }
        Self {
            segments,
            len,
            frame: Some(Frame { tag: 0, body: len, unread: len }),
            framed: 1,
            discarded: 0,
        }
    }

    /// Append a transport segment. Zero-length feeds are a no-op.
    pub fn feed(&mut self, bytes: Bytes) {
        if bytes.is_empty() {
            return;
        }
        self.len += bytes.len();
        self.segments.push_back(bytes);
    }

    /// Total unconsumed bytes currently buffered.
    pub fn remaining(&self) -> usize {
        self.len
    }

    /// Returns `true` once the current message is fully buffered.
    ///
    /// Parses the one type byte and four length bytes of the next header if
    /// none is pending, returning `false` while either is incomplete.
    pub fn has_message(&mut self) -> Result<bool, ProtocolError> {
        if self.frame.is_none() {
            if self.len < 5 {
                return Ok(false);
            }
            let tag = self.take_byte();
            let length = i32::from_be_bytes(self.take_array::<4>());
            if length < 4 {
                return Err(ProtocolError::BadMessageLength { tag, length });
            }
            let body = length as usize - 4;
            self.frame = Some(Frame { tag, body, unread: body });
            self.framed += 1;
        }
        let frame = self.frame.as_ref().expect("frame parsed above");
        Ok(self.len >= frame.unread)
    }

    /// Type tag of the current message.
    pub fn message_type(&self) -> u8 {
        self.frame.as_ref().expect("no message framed").tag
    }

    /// Declared length of the current message, including the length field.
    pub fn message_length(&self) -> i32 {
        self.frame.as_ref().expect("no message framed").body as i32 + 4
    }

    /// Unread bytes remaining in the current message.
    pub fn message_unread(&self) -> usize {
        self.frame.as_ref().map(|f| f.unread).unwrap_or(0)
    }

    pub fn read_byte(&mut self) -> Result<u8, ProtocolError> {
        self.bounded(1)?;
        Ok(self.take_byte())
    }

    pub fn read_int16(&mut self) -> Result<i16, ProtocolError> {
        self.bounded(2)?;
        Ok(i16::from_be_bytes(self.take_array::<2>()))
    }

    pub fn read_int32(&mut self) -> Result<i32, ProtocolError> {
        self.bounded(4)?;
        Ok(i32::from_be_bytes(self.take_array::<4>()))
    }

    /// Read up to and including a nul terminator; the nul is consumed but
    /// excluded from the result.
    pub fn read_cstr(&mut self) -> Result<Bytes, ProtocolError> {
        let unread = self.message_unread();
        let mut nul = None;
        let mut scanned = 0;
        'outer: for seg in &self.segments {
            for (i, b) in seg.iter().enumerate() {
                if scanned + i == unread {
                    break 'outer;
                }
                if *b == b'\0' {
                    nul = Some(scanned + i);
                    break 'outer;
                }
            }
            scanned += seg.len();
        }
        let Some(nul) = nul else {
            return Err(ProtocolError::NulNotFound);
        };
        let out = self.take_bytes(nul);
        self.take_byte(); // nul
        self.frame_mut().unread -= nul + 1;
        self.len_is_consistent();
        Ok(out)
    }

    /// Consume and return the remaining bytes of the current message.
    pub fn consume_message(&mut self) -> Result<Bytes, ProtocolError> {
        let unread = self.message_unread();
        self.bounded(unread)?;
        let out = self.take_bytes(unread);
        self.frame_mut().unread = 0;
        Ok(out)
    }

    /// Drop any unread tail of the current message and clear framing state.
    ///
    /// Underread is tolerated; the owner chose to skip the rest.
    pub fn discard_message(&mut self) {
        if let Some(frame) = self.frame.take() {
            let skip = frame.unread.min(self.len);
            self.advance(skip);
            self.discarded += 1;
        }
    }

    /// Messages framed so far.
    pub fn messages_framed(&self) -> u64 {
        self.framed
    }

    /// Messages discarded so far.
    pub fn messages_discarded(&self) -> u64 {
        self.discarded
    }

    fn frame_mut(&mut self) -> &mut Frame {
        self.frame.as_mut().expect("no message framed")
    }

    /// Every read is checked against the current message's unread count;
    /// overread is a fatal buffer error.
    fn bounded(&mut self, n: usize) -> Result<(), ProtocolError> {
        let frame = self.frame.as_ref().ok_or(ProtocolError::ShortRead)?;
        if frame.unread < n || self.len < n {
            return Err(ProtocolError::ShortRead);
        }
        self.frame_mut().unread -= n;
        Ok(())
    }

    fn take_byte(&mut self) -> u8 {
        let head = self.segments.front_mut().expect("byte available");
        let b = head.get_u8();
        self.len -= 1;
        if head.is_empty() {
            self.segments.pop_front();
        }
        b
    }

    fn take_array<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        // the common case is a single segment holding the whole header
        match self.segments.front_mut() {
            Some(head) if head.len() >= N => {
                head.copy_to_slice(&mut out);
                self.len -= N;
                if head.is_empty() {
                    self.segments.pop_front();
                }
            }
            _ => {
                for slot in out.iter_mut() {
                    *slot = self.take_byte();
                }
            }
        }
        out
    }

    /// Take `n` bytes, zero-copy when they live in one segment.
    fn take_bytes(&mut self, n: usize) -> Bytes {
        if n == 0 {
            return Bytes::new();
        }
        let head = self.segments.front_mut().expect("bytes available");
        if head.len() >= n {
            let out = head.split_to(n);
            self.len -= n;
            if head.is_empty() {
                self.segments.pop_front();
            }
            return out;
        }
        let mut out = BytesMut::with_capacity(n);
        let mut left = n;
        while left > 0 {
            let head = self.segments.front_mut().expect("bytes available");
            let take = head.len().min(left);
            out.extend_from_slice(&head.split_to(take));
            self.len -= take;
            left -= take;
            if head.is_empty() {
                self.segments.pop_front();
            }
        }
        out.freeze()
    }

    fn advance(&mut self, mut n: usize) {
        while n > 0 {
            let head = self.segments.front_mut().expect("bytes available");
            let take = head.len().min(n);
            head.advance(take);
            self.len -= take;
            n -= take;
            if head.is_empty() {
                self.segments.pop_front();
            }
        }
    }

    #[inline]
    fn len_is_consistent(&self) {
        debug_assert_eq!(self.len, self.segments.iter().map(Bytes::len).sum::<usize>());
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn framed(tag: u8, body: &[u8]) -> Vec<u8> {
        let mut out = vec![tag];
        out.extend_from_slice(&(body.len() as i32 + 4).to_be_bytes());
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn frames_across_segments() {
        let mut buf = ReadBuffer::new();
        let msg = framed(b'Z', &[b'I']);

        // drip the message one byte at a time
        for (i, b) in msg.iter().enumerate() {
            assert!(!buf.has_message().unwrap(), "complete after byte {i}");
            buf.feed(Bytes::copy_from_slice(&[*b]));
        }

        assert!(buf.has_message().unwrap());
        assert_eq!(buf.message_type(), b'Z');
        assert_eq!(buf.message_length(), 5);
        assert_eq!(buf.read_byte().unwrap(), b'I');
        buf.discard_message();
        assert_eq!(buf.remaining(), 0);
        assert_eq!(buf.messages_framed(), buf.messages_discarded());
    }

    #[test]
    fn reads_are_message_bounded() {
        let mut buf = ReadBuffer::new();
        let mut bytes = framed(b'K', &7i32.to_be_bytes());
        bytes.extend(framed(b'Z', &[b'I']));
        buf.feed(bytes.into());

        assert!(buf.has_message().unwrap());
        assert_eq!(buf.read_int32().unwrap(), 7);
        // next message's bytes are buffered but unreachable
        assert!(buf.read_byte().is_err());
        buf.discard_message();

        assert!(buf.has_message().unwrap());
        assert_eq!(buf.message_type(), b'Z');
    }

    #[test]
    fn cstr_stops_at_nul() {
        let mut buf = ReadBuffer::new();
        buf.feed(framed(b'S', b"client_encoding\0UTF8\0").into());

        assert!(buf.has_message().unwrap());
        assert_eq!(&buf.read_cstr().unwrap()[..], b"client_encoding");
        assert_eq!(&buf.read_cstr().unwrap()[..], b"UTF8");
        assert_eq!(buf.message_unread(), 0);
        buf.discard_message();
    }

    #[test]
    fn cstr_missing_nul_fails() {
        let mut buf = ReadBuffer::new();
        let mut bytes = framed(b'S', b"no-terminator");
        bytes.extend(framed(b'S', b"\0\0"));
        buf.feed(bytes.into());

        assert!(buf.has_message().unwrap());
        // the nul in the following message must not be visible
        assert!(buf.read_cstr().is_err());
    }

    #[test]
    fn underread_discard_skips_tail() {
        let mut buf = ReadBuffer::new();
        let mut bytes = framed(b'T', &[1, 2, 3, 4, 5, 6]);
        bytes.extend(framed(b'Z', &[b'E']));
        buf.feed(bytes.into());

        assert!(buf.has_message().unwrap());
        assert_eq!(buf.read_int16().unwrap(), 0x0102);
        buf.discard_message();

        assert!(buf.has_message().unwrap());
        assert_eq!(buf.message_type(), b'Z');
        assert_eq!(buf.read_byte().unwrap(), b'E');
        buf.discard_message();
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn consume_message_returns_tail() {
        let mut buf = ReadBuffer::new();
        buf.feed(framed(b'D', &[0, 1, 0, 0, 0, 4, 0, 0, 0, 9]).into());

        assert!(buf.has_message().unwrap());
        let body = buf.consume_message().unwrap();
        assert_eq!(&body[..], &[0, 1, 0, 0, 0, 4, 0, 0, 0, 9]);
        assert_eq!(buf.message_unread(), 0);
        buf.discard_message();
    }

    #[test]
    fn synthetic_message_parser() {
        let mut buf = ReadBuffer::message(Bytes::from_static(&[0, 2, 0, 0, 0, 23, 0, 0, 0, 23]));
        assert_eq!(buf.read_int16().unwrap(), 2);
        assert_eq!(buf.read_int32().unwrap(), 23);
        assert_eq!(buf.read_int32().unwrap(), 23);
        assert!(buf.read_byte().is_err());
    }

    #[test]
    fn bad_length_is_fatal() {
        let mut buf = ReadBuffer::new();
        buf.feed(Bytes::from_static(&[b'Z', 0, 0, 0, 2]));
        assert!(buf.has_message().is_err());
    }
}
