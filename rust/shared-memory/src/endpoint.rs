//! Producer-side view of the consumer's resources

use crate::{NamedSignal, ResourceNames, Result, SharedBuffer};
use std::time::Duration;
use tracing::instrument;

/// What a notification channel needs from its peer.
///
/// Implementations own their resources and release them on drop.
pub trait Endpoint: Send {
    /// Buffer the notification is encoded into
    fn buffer_mut(&mut self) -> &mut [u8];

    /// Tell the consumer a notification is ready
    fn raise_available(&mut self) -> Result<()>;

    /// Wait for the consumer to finish reading. `Ok(false)` on timeout.
    fn wait_received(&mut self, timeout: Duration) -> Result<bool>;
}

/// Endpoint over the named OS resources created by the consumer process
#[derive(Debug)]
pub struct SharedMemoryEndpoint {
    available: NamedSignal,
    received: NamedSignal,
    buffer: SharedBuffer,
}

impl SharedMemoryEndpoint {
    /// Attach to all three resources, failing if any is missing
    #[instrument(skip(names), fields(buffer = %names.buffer))]
    pub fn attach(names: &ResourceNames, capacity: usize) -> Result<Self> {
        names.validate()?;

        let available = NamedSignal::open(&names.available)?;
        let received = NamedSignal::open(&names.received)?;
        let buffer = SharedBuffer::open(&names.buffer, capacity)?;

        Ok(Self {
            available,
            received,
            buffer,
        })
    }
}

impl Endpoint for SharedMemoryEndpoint {
    fn buffer_mut(&mut self) -> &mut [u8] {
        self.buffer.as_slice_mut()
    }

    fn raise_available(&mut self) -> Result<()> {
        self.available.raise()
    }

    fn wait_received(&mut self, timeout: Duration) -> Result<bool> {
        self.received.wait(timeout)
    }
}
