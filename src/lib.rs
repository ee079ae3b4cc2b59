//! loghook
//!
//! Lets a process report file loads and animation playback to an external
//! consumer through a shared-memory notification channel, without ever
//! blocking the reporting process for longer than a bounded handshake.
//!
//! ```no_run
//! use loghook::prelude::*;
//!
//! let channel = NotificationChannel::attach(ChannelConfig::default());
//! channel.notify_opening_file(0x1234, 0, "foo/bar.tex");
//! channel.notify_playing_animation(7, "Idle");
//! ```

pub use loghook_core as wire;
pub use loghook_shared_memory as shm;

/// Re-export common types
pub mod prelude {
    pub use loghook_core::{EventType, FileKey, Notification, WireWriter};
    pub use loghook_shared_memory::{
        ChannelConfig, ChannelError, ChannelState, Endpoint, NotificationChannel,
        NotificationHost, ResourceNames,
    };
}
