//! Channel configuration

use crate::{ChannelError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Prefix used when no other is configured
pub const DEFAULT_PREFIX: &str = "LogHook";

/// Names of the three resources the consumer creates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceNames {
    /// Raised by the producer when a notification is ready
    pub available: String,
    /// Raised by the consumer once it has read the buffer
    pub received: String,
    /// Shared notification buffer
    pub buffer: String,
}

impl ResourceNames {
    /// Derive all three names from a common prefix
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            available: format!("{}_NotificationAvailableEvent", prefix),
            received: format!("{}_NotificationReceivedEvent", prefix),
            buffer: format!("{}_NotificationBuffer", prefix),
        }
    }

    /// Check every name before handing it to the OS
    pub fn validate(&self) -> Result<()> {
        validate_resource_name(&self.available)?;
        validate_resource_name(&self.received)?;
        validate_resource_name(&self.buffer)
    }
}

impl Default for ResourceNames {
    fn default() -> Self {
        Self::with_prefix(DEFAULT_PREFIX)
    }
}

/// Notification channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Consumer resource names
    pub names: ResourceNames,
    /// Shared buffer capacity
    pub buffer_size: usize,
    /// Bound on waiting for the private notification lock
    pub lock_timeout: Duration,
    /// Bound on waiting for the consumer's acknowledgment
    pub ack_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            names: ResourceNames::default(),
            buffer_size: loghook_core::BUFFER_SIZE,
            lock_timeout: Duration::from_millis(1000),
            ack_timeout: Duration::from_millis(5000),
        }
    }
}

impl ChannelConfig {
    /// Default timeouts and size with names derived from `prefix`
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            names: ResourceNames::with_prefix(prefix),
            ..Self::default()
        }
    }
}

/// Validate a resource name
pub(crate) fn validate_resource_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 255 {
        return Err(ChannelError::InvalidName(format!(
            "name length {} outside 1..=255",
            name.len()
        )));
    }

    if name.contains('\0') {
        return Err(ChannelError::InvalidName("name contains null byte".to_string()));
    }

    Ok(())
}
