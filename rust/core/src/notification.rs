//! Typed notifications and their decoding

use crate::{EventType, Result, WireError, WireWriter};
use bytes::Buf;
use serde::{Deserialize, Serialize};

/// Identifies a file inside the host's archives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileKey {
    pub name_hash: u64,
    pub locale: u64,
}

impl FileKey {
    pub fn new(name_hash: u64, locale: u64) -> Self {
        Self { name_hash, locale }
    }
}

/// A decoded notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    OpeningFile { key: FileKey, path: String },
    PlayingAnimation { id: i32, name: String },
}

impl Notification {
    /// Event tag of this notification
    pub fn event_type(&self) -> EventType {
        match self {
            Notification::OpeningFile { .. } => EventType::OpeningFile,
            Notification::PlayingAnimation { .. } => EventType::PlayingAnimation,
        }
    }

    /// Write tag and fields. Returns `false` if anything was dropped.
    pub fn encode(&self, writer: &mut WireWriter<'_>) -> bool {
        writer.write_u8(self.event_type().tag());
        match self {
            Notification::OpeningFile { key, path } => {
                writer.write_long(key.name_hash);
                writer.write_long(key.locale);
                writer.write_text(path);
            }
            Notification::PlayingAnimation { id, name } => {
                writer.write_int(*id);
                writer.write_text(name);
            }
        }
        !writer.overflowed()
    }

    /// Decode a notification from the start of `bytes`.
    ///
    /// Trailing bytes after the last field are ignored; the shared buffer is
    /// never cleared between notifications.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut buf = bytes;
        let tag = read_u8(&mut buf)?;

        match EventType::try_from(tag)? {
            EventType::OpeningFile => {
                let name_hash = read_u64(&mut buf)?;
                let locale = read_u64(&mut buf)?;
                let path = read_text(&mut buf)?;
                Ok(Notification::OpeningFile {
                    key: FileKey::new(name_hash, locale),
                    path,
                })
            }
            EventType::PlayingAnimation => {
                let id = read_i32(&mut buf)?;
                let name = read_text(&mut buf)?;
                Ok(Notification::PlayingAnimation { id, name })
            }
        }
    }
}

impl std::fmt::Display for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notification::OpeningFile { key, path } => write!(
                f,
                "opening file {} (hash {:016x}, locale {:016x})",
                path, key.name_hash, key.locale
            ),
            Notification::PlayingAnimation { id, name } => {
                write!(f, "playing animation {} ({})", name, id)
            }
        }
    }
}

fn ensure(buf: &[u8], needed: usize) -> Result<()> {
    if buf.remaining() < needed {
        return Err(WireError::InsufficientData {
            needed,
            available: buf.remaining(),
        });
    }
    Ok(())
}

fn read_u8(buf: &mut &[u8]) -> Result<u8> {
    ensure(buf, 1)?;
    Ok(buf.get_u8())
}

fn read_i32(buf: &mut &[u8]) -> Result<i32> {
    ensure(buf, 4)?;
    Ok(buf.get_i32_le())
}

fn read_u64(buf: &mut &[u8]) -> Result<u64> {
    ensure(buf, 8)?;
    Ok(buf.get_u64_le())
}

fn read_text(buf: &mut &[u8]) -> Result<String> {
    let end = buf
        .iter()
        .position(|&b| b == 0)
        .ok_or(WireError::MissingTerminator)?;
    let text = String::from_utf8_lossy(&buf[..end]).into_owned();
    buf.advance(end + 1);
    Ok(text)
}
