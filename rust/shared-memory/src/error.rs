//! Notification channel error types

use loghook_core::WireError;
use thiserror::Error;

/// Notification channel error types
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Platform-specific error
    #[error("Platform error: {0}")]
    Platform(String),

    /// Named resource does not exist (no consumer running)
    #[error("Shared resource not found: {0}")]
    ResourceNotFound(String),

    /// Memory mapping failed
    #[error("Memory mapping failed: {0}")]
    MappingFailed(String),

    /// Shared buffer smaller than the notification capacity
    #[error("Shared buffer too small: {size} bytes, need at least {min}")]
    BufferTooSmall { size: usize, min: usize },

    /// Resource name rejected before reaching the OS
    #[error("Invalid resource name: {0}")]
    InvalidName(String),

    /// No shared memory or named signal support on this target
    #[error("Shared notification channel is not supported on this platform")]
    Unsupported,

    /// Private lock not acquired in time
    #[error("Notification lock not acquired within {timeout_ms}ms")]
    LockTimeout { timeout_ms: u64 },

    /// Consumer did not acknowledge in time
    #[error("Consumer did not acknowledge within {timeout_ms}ms")]
    AckTimeout { timeout_ms: u64 },

    /// Wire format error
    #[error("Wire error: {0}")]
    Wire(#[from] WireError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias
pub type Result<T> = std::result::Result<T, ChannelError>;

/// How a failure affects the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Resource missing or unusable at construction
    SetupFailure,
    LockTimeout,
    AckTimeout,
    /// Field did not fit in the buffer
    Overflow,
}

impl ChannelError {
    /// Whether the channel stays usable after this error.
    ///
    /// Recoverable errors drop only the current notification; everything else
    /// leaves the channel disconnected.
    pub fn is_recoverable(&self) -> bool {
        matches!(self.kind(), FailureKind::LockTimeout | FailureKind::Overflow)
    }

    /// Failure category
    pub fn kind(&self) -> FailureKind {
        match self {
            ChannelError::LockTimeout { .. } => FailureKind::LockTimeout,
            ChannelError::AckTimeout { .. } => FailureKind::AckTimeout,
            ChannelError::Wire(WireError::Overflow { .. }) => FailureKind::Overflow,
            _ => FailureKind::SetupFailure,
        }
    }

    /// Convert platform error codes to ChannelError
    pub fn from_errno(errno: i32, message: impl Into<String>) -> Self {
        let message = message.into();
        match errno {
            2 => ChannelError::ResourceNotFound(message), // ENOENT
            1 | 13 => ChannelError::Platform(format!("Permission denied: {}", message)), // EPERM, EACCES
            _ => ChannelError::Platform(format!("Error {}: {}", errno, message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_recovery() {
        assert!(ChannelError::LockTimeout { timeout_ms: 1000 }.is_recoverable());
        assert!(ChannelError::from(WireError::Overflow { needed: 9, remaining: 2 }).is_recoverable());

        assert!(!ChannelError::AckTimeout { timeout_ms: 5000 }.is_recoverable());
        assert!(!ChannelError::ResourceNotFound("buffer".to_string()).is_recoverable());
        assert!(!ChannelError::Unsupported.is_recoverable());
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            ChannelError::AckTimeout { timeout_ms: 5000 }.kind(),
            FailureKind::AckTimeout
        );
        assert_eq!(
            ChannelError::BufferTooSmall { size: 16, min: 4096 }.kind(),
            FailureKind::SetupFailure
        );
        assert_eq!(
            ChannelError::from(WireError::UnknownEvent(4)).kind(),
            FailureKind::SetupFailure
        );
    }

    #[test]
    fn test_from_errno() {
        assert!(matches!(
            ChannelError::from_errno(2, "shm_open failed"),
            ChannelError::ResourceNotFound(_)
        ));
        assert!(matches!(
            ChannelError::from_errno(22, "sem_open failed"),
            ChannelError::Platform(msg) if msg == "Error 22: sem_open failed"
        ));
    }
}
