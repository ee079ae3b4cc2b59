//! Bounded wire encoder for notification payloads
//!
//! Fixed layout, no length prefixes, little-endian integers:
//! 0:   Event tag (1 byte)
//! 1..: Event fields in the variant's fixed order
//!
//! Fields that would run past the end of the buffer are dropped whole.
//! The writer never allocates and never panics on a full buffer.

use bytes::BufMut;

/// Event tags (1 byte, first byte of every notification)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    OpeningFile = 0x00,
    PlayingAnimation = 0x01,
}

impl EventType {
    /// Wire value of the tag
    pub fn tag(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for EventType {
    type Error = crate::WireError;

    fn try_from(value: u8) -> crate::Result<Self> {
        match value {
            0x00 => Ok(EventType::OpeningFile),
            0x01 => Ok(EventType::PlayingAnimation),
            other => Err(crate::WireError::UnknownEvent(other)),
        }
    }
}

/// Outcome of encoding one notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    /// Bytes written from the start of the buffer
    pub len: usize,
    /// First field dropped for lack of space, if any
    pub overflow: Option<crate::WireError>,
}

impl Encoded {
    /// Whether at least one field was dropped
    pub fn overflowed(&self) -> bool {
        self.overflow.is_some()
    }
}

/// Write cursor over a bounded buffer.
///
/// A writer only exists while a notification is being built, so its cursor is
/// always valid. Each `write_*` either writes the whole field and advances the
/// position, or writes nothing, leaves the position where it was and returns
/// `false`.
#[derive(Debug)]
pub struct WireWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
    overflow: Option<crate::WireError>,
}

impl<'a> WireWriter<'a> {
    /// Start writing at the beginning of `buf`
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            overflow: None,
        }
    }

    /// Current cursor offset
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left before the end of the buffer
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Whether any write has been dropped so far
    pub fn overflowed(&self) -> bool {
        self.overflow.is_some()
    }

    /// Bytes written so far
    pub fn written(&self) -> &[u8] {
        &self.buf[..self.pos]
    }

    /// Append a single byte
    pub fn write_u8(&mut self, value: u8) -> bool {
        if !self.reserve(1) {
            return false;
        }
        self.tail().put_u8(value);
        self.pos += 1;
        true
    }

    /// Append a 4-byte integer
    pub fn write_int(&mut self, value: i32) -> bool {
        if !self.reserve(4) {
            return false;
        }
        self.tail().put_i32_le(value);
        self.pos += 4;
        true
    }

    /// Append an 8-byte integer
    pub fn write_long(&mut self, value: u64) -> bool {
        if !self.reserve(8) {
            return false;
        }
        self.tail().put_u64_le(value);
        self.pos += 8;
        true
    }

    /// Append text followed by a zero byte.
    ///
    /// Text is taken up to its first interior zero byte, so what the consumer
    /// reads back is exactly what was written.
    pub fn write_text(&mut self, value: impl AsRef<[u8]>) -> bool {
        let bytes = value.as_ref();
        let text = match bytes.iter().position(|&b| b == 0) {
            Some(end) => &bytes[..end],
            None => bytes,
        };

        let needed = text.len() + 1;
        if !self.reserve(needed) {
            return false;
        }

        let mut tail = self.tail();
        tail.put_slice(text);
        tail.put_u8(0);
        self.pos += needed;
        true
    }

    /// Finish the notification
    pub fn finish(self) -> Encoded {
        Encoded {
            len: self.pos,
            overflow: self.overflow,
        }
    }

    fn reserve(&mut self, needed: usize) -> bool {
        let remaining = self.remaining();
        if needed > remaining {
            if self.overflow.is_none() {
                self.overflow = Some(crate::WireError::Overflow { needed, remaining });
            }
            return false;
        }
        true
    }

    fn tail(&mut self) -> &mut [u8] {
        &mut self.buf[self.pos..]
    }
}
