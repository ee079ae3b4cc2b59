//! loghook - Core Module
//!
//! Wire format shared by the notification producer and its consumer.
//! Each notification is a one-byte event tag followed by the event's fields,
//! written into a fixed shared buffer with no length prefixes.

pub mod error;
pub mod notification;
pub mod wire;

pub use error::*;
pub use notification::*;
pub use wire::*;

/// Capacity of the shared notification buffer in bytes
pub const BUFFER_SIZE: usize = 0x1000;

/// Current version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
