//! Consumer side of the notification channel
//!
//! Creates the shared buffer and both signals, then reads one notification per
//! `available` raise and acknowledges it on `received`.

use crate::{ChannelError, NamedSignal, ResourceNames, Result, SharedBuffer};
use loghook_core::Notification;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

/// Consumer owning the channel's shared resources
#[derive(Debug)]
pub struct NotificationHost {
    names: ResourceNames,
    available: NamedSignal,
    received: NamedSignal,
    buffer: SharedBuffer,
}

impl NotificationHost {
    /// Create the buffer and both signals. Dropping the host removes them.
    #[instrument(skip(names), fields(buffer = %names.buffer))]
    pub fn create(names: ResourceNames, capacity: usize) -> Result<Self> {
        names.validate()?;

        let available = NamedSignal::create(&names.available)?;
        let received = NamedSignal::create(&names.received)?;
        let buffer = SharedBuffer::create(&names.buffer, capacity)?;

        Ok(Self {
            names,
            available,
            received,
            buffer,
        })
    }

    /// Names producers attach to
    pub fn names(&self) -> &ResourceNames {
        &self.names
    }

    /// Wait up to `timeout` for one notification.
    ///
    /// The producer is acknowledged before this returns, including when the
    /// buffer does not decode, so a bad notification never stalls it.
    pub fn recv(&self, timeout: Duration) -> Result<Option<Notification>> {
        if !self.available.wait(timeout)? {
            return Ok(None);
        }

        let decoded = Notification::decode(self.buffer.as_slice());
        self.received.raise()?;

        decoded.map(Some).map_err(ChannelError::from)
    }

    /// Dispatch notifications to `handler` until `stop` is set.
    ///
    /// `stop` is checked at least once per `poll_interval`. Returns when a
    /// signal operation fails; undecodable notifications are logged and skipped.
    pub fn listen<F>(&self, stop: &AtomicBool, poll_interval: Duration, mut handler: F) -> Result<()>
    where
        F: FnMut(Notification),
    {
        debug!("Listening for notifications on {}", self.names.buffer);

        while !stop.load(Ordering::SeqCst) {
            match self.recv(poll_interval) {
                Ok(Some(notification)) => handler(notification),
                Ok(None) => continue,
                Err(ChannelError::Wire(e)) => warn!("Skipping notification: {}", e),
                Err(e) => {
                    error!("Notification listener stopped: {}", e);
                    return Err(e);
                }
            }
        }

        Ok(())
    }
}
