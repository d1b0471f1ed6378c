use bytes::{BufMut, Bytes, BytesMut};

use crate::ext::{BufMutExt, FmtExt, UsizeExt};

/// Growable outbound buffer with message-framing helpers.
///
/// Two modes: free-form writes, and message-framing started by
/// [`new_message`][WriteBuffer::new_message], which writes the tag byte,
/// reserves four length bytes, and patches them on
/// [`end_message`][WriteBuffer::end_message]. The length count includes
/// itself but not the message-type byte.
#[derive(Default)]
pub struct WriteBuffer {
    buf: BytesMut,
    /// offset of the open message's tag byte
    msg_start: Option<usize>,
}

impl std::fmt::Debug for WriteBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteBuffer")
            .field("buf", &self.buf.lossy())
            .field("msg_start", &self.msg_start)
            .finish()
    }
}

impl WriteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { buf: BytesMut::with_capacity(capacity), msg_start: None }
    }

    /// Begin a typed message frame.
    ///
    /// # Panics
    ///
    /// Panics if a message frame is already open.
    pub fn new_message(&mut self, tag: u8) -> &mut Self {
        assert!(self.msg_start.is_none(), "message frame already open");
        self.msg_start = Some(self.buf.len());
        self.buf.put_u8(tag);
        self.buf.put_u32(0); // length patched at end_message
        self
    }

    /// Close the open message frame, patching its length field.
    ///
    /// # Panics
    ///
    /// Panics if no message frame is open.
    pub fn end_message(&mut self) -> &mut Self {
        let start = self.msg_start.take().expect("no message frame open");
        // everything after the tag, including the length field itself
        let length = (self.buf.len() - start - 1).to_u32();
        self.buf[start + 1..start + 5].copy_from_slice(&length.to_be_bytes());
        self
    }

    pub fn write_byte(&mut self, v: u8) -> &mut Self {
        self.buf.put_u8(v);
        self
    }

    pub fn write_int16(&mut self, v: i16) -> &mut Self {
        self.buf.put_i16(v);
        self
    }

    pub fn write_int32(&mut self, v: i32) -> &mut Self {
        self.buf.put_i32(v);
        self
    }

    pub fn write_uint32(&mut self, v: u32) -> &mut Self {
        self.buf.put_u32(v);
        self
    }

    pub fn write_int64(&mut self, v: i64) -> &mut Self {
        self.buf.put_i64(v);
        self
    }

    pub fn write_float32(&mut self, v: f32) -> &mut Self {
        self.buf.put_f32(v);
        self
    }

    pub fn write_float64(&mut self, v: f64) -> &mut Self {
        self.buf.put_f64(v);
        self
    }

    pub fn write_bytes(&mut self, v: &[u8]) -> &mut Self {
        self.buf.put(v);
        self
    }

    /// Write bytes followed by a nul terminator.
    pub fn write_cstr(&mut self, v: &[u8]) -> &mut Self {
        self.buf.put(v);
        self.buf.put_u8(b'\0');
        self
    }

    /// Write a string followed by a nul terminator.
    ///
    /// The session encoding is UTF-8; `str` is already in wire form.
    pub fn write_str(&mut self, v: &str) -> &mut Self {
        self.buf.put_nul_string(v);
        self
    }

    /// Append another buffer's content.
    pub fn write_buffer(&mut self, other: &WriteBuffer) -> &mut Self {
        self.buf.put(other.as_slice());
        self
    }

    /// Reserve a 4-byte length field, to be patched by
    /// [`end_length`][WriteBuffer::end_length].
    pub fn begin_length(&mut self) -> usize {
        let at = self.buf.len();
        self.buf.put_i32(0);
        at
    }

    /// Patch the length field at `at` with the bytes written since.
    pub fn end_length(&mut self, at: usize) {
        let length = (self.buf.len() - at - 4) as i32;
        self.buf[at..at + 4].copy_from_slice(&length.to_be_bytes());
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Immutable view of everything written.
    ///
    /// # Panics
    ///
    /// Panics if a message frame is still open.
    pub fn as_slice(&self) -> &[u8] {
        assert!(self.msg_start.is_none(), "message frame still open");
        &self.buf
    }

    /// Take the written bytes, leaving the buffer empty.
    pub fn take(&mut self) -> Bytes {
        assert!(self.msg_start.is_none(), "message frame still open");
        self.buf.split().freeze()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.msg_start = None;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn frames_sync_message() {
        let mut buf = WriteBuffer::new();
        buf.new_message(b'S').end_message();
        assert_eq!(buf.as_slice(), b"S\0\0\0\x04");
    }

    #[test]
    fn patches_length_over_body() {
        let mut buf = WriteBuffer::new();
        buf.new_message(b'Q').write_str("SELECT 1").end_message();

        let mut expect = vec![b'Q'];
        expect.extend_from_slice(&13i32.to_be_bytes());
        expect.extend_from_slice(b"SELECT 1\0");
        assert_eq!(buf.as_slice(), &expect[..]);
    }

    #[test]
    fn multiple_messages_one_buffer() {
        let mut buf = WriteBuffer::new();
        buf.new_message(b'H').end_message();
        buf.new_message(b'S').end_message();
        assert_eq!(buf.as_slice(), b"H\0\0\0\x04S\0\0\0\x04");
    }

    #[test]
    fn nested_length_field() {
        let mut buf = WriteBuffer::new();
        let at = buf.begin_length();
        buf.write_int32(23);
        buf.end_length(at);
        assert_eq!(buf.as_slice(), &[0, 0, 0, 4, 0, 0, 0, 23]);
    }

    #[test]
    #[should_panic(expected = "message frame already open")]
    fn rejects_nested_frames() {
        let mut buf = WriteBuffer::new();
        buf.new_message(b'Q');
        buf.new_message(b'Q');
    }

    #[test]
    #[should_panic(expected = "no message frame open")]
    fn rejects_end_without_start() {
        let mut buf = WriteBuffer::new();
        buf.end_message();
    }

    #[test]
    fn big_endian_scalars() {
        let mut buf = WriteBuffer::new();
        buf.write_int16(-2).write_int32(1).write_int64(i64::MAX).write_float64(1.5);
        let b = buf.as_slice();
        assert_eq!(&b[..2], &(-2i16).to_be_bytes());
        assert_eq!(&b[2..6], &1i32.to_be_bytes());
        assert_eq!(&b[6..14], &i64::MAX.to_be_bytes());
        assert_eq!(&b[14..], &1.5f64.to_be_bytes());
    }
}
