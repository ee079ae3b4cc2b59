//! loghook - Shared Memory Module
//!
//! Notification channel over a fixed shared buffer and a pair of named
//! signals. The producer attaches to resources the consumer created; if the
//! consumer is absent or stops answering, the producer carries on silently.

pub mod channel;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod host;
pub mod loopback;
pub mod platform;
pub mod region;
pub mod signal;

pub use channel::*;
pub use config::*;
pub use endpoint::*;
pub use error::*;
pub use host::*;
pub use platform::*;
pub use region::*;
pub use signal::*;

pub use loghook_core::{EventType, FileKey, Notification, BUFFER_SIZE};
