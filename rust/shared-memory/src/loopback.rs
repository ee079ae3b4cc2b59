//! In-process endpoint pair
//!
//! Runs the full available/received handshake between two halves living in
//! the same process, for host integrations that want to exercise a channel
//! without creating OS resources.

use crate::{ChannelError, Endpoint, Result};
use loghook_core::Notification;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Auto-reset event
#[derive(Default)]
struct Event {
    raised: Mutex<bool>,
    cond: Condvar,
}

impl Event {
    fn raise(&self) {
        *self.raised.lock() = true;
        self.cond.notify_one();
    }

    fn wait(&self, timeout: Duration) -> bool {
        let mut raised = self.raised.lock();
        if !*raised {
            self.cond.wait_while_for(&mut raised, |raised| !*raised, timeout);
        }
        std::mem::replace(&mut *raised, false)
    }
}

struct Shared {
    /// Buffer contents as of the last raise of `available`
    published: Mutex<Vec<u8>>,
    available: Event,
    received: Event,
    raised_count: AtomicUsize,
    attached: AtomicBool,
}

/// Producer half
pub struct LoopbackEndpoint {
    buffer: Box<[u8]>,
    shared: Arc<Shared>,
}

/// Consumer half
pub struct LoopbackConsumer {
    shared: Arc<Shared>,
}

/// Build a connected endpoint/consumer pair with a `capacity`-byte buffer
pub fn pair(capacity: usize) -> (LoopbackEndpoint, LoopbackConsumer) {
    let shared = Arc::new(Shared {
        published: Mutex::new(vec![0; capacity]),
        available: Event::default(),
        received: Event::default(),
        raised_count: AtomicUsize::new(0),
        attached: AtomicBool::new(true),
    });

    let endpoint = LoopbackEndpoint {
        buffer: vec![0; capacity].into_boxed_slice(),
        shared: Arc::clone(&shared),
    };

    (endpoint, LoopbackConsumer { shared })
}

impl Endpoint for LoopbackEndpoint {
    fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    fn raise_available(&mut self) -> Result<()> {
        self.shared.published.lock().copy_from_slice(&self.buffer);
        self.shared.raised_count.fetch_add(1, Ordering::SeqCst);
        self.shared.available.raise();
        Ok(())
    }

    fn wait_received(&mut self, timeout: Duration) -> Result<bool> {
        Ok(self.shared.received.wait(timeout))
    }
}

impl Drop for LoopbackEndpoint {
    fn drop(&mut self) {
        self.shared.attached.store(false, Ordering::SeqCst);
    }
}

impl LoopbackConsumer {
    /// Wait for a notification and return a copy of the whole buffer
    /// without acknowledging it.
    pub fn wait_available(&self, timeout: Duration) -> Option<Vec<u8>> {
        if self.shared.available.wait(timeout) {
            Some(self.shared.published.lock().clone())
        } else {
            None
        }
    }

    /// Raise the received signal
    pub fn acknowledge(&self) {
        self.shared.received.raise();
    }

    /// Wait, decode, then acknowledge. Undecodable notifications are still
    /// acknowledged.
    pub fn recv(&self, timeout: Duration) -> Result<Option<Notification>> {
        let Some(bytes) = self.wait_available(timeout) else {
            return Ok(None);
        };
        let decoded = Notification::decode(&bytes);
        self.acknowledge();
        decoded.map(Some).map_err(ChannelError::from)
    }

    /// Number of times the producer raised `available`
    pub fn available_raised(&self) -> usize {
        self.shared.raised_count.load(Ordering::SeqCst)
    }

    /// Whether the producer half still exists
    pub fn is_attached(&self) -> bool {
        self.shared.attached.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_handshake() {
        let (mut endpoint, consumer) = pair(16);
        endpoint.buffer_mut()[..2].copy_from_slice(&[1, 2]);

        let reader = thread::spawn(move || {
            let bytes = consumer.wait_available(Duration::from_secs(5)).unwrap();
            consumer.acknowledge();
            (bytes, consumer)
        });

        endpoint.raise_available().unwrap();
        assert!(endpoint.wait_received(Duration::from_secs(5)).unwrap());

        let (bytes, consumer) = reader.join().unwrap();
        assert_eq!(&bytes[..2], &[1, 2]);
        assert_eq!(bytes.len(), 16);
        assert_eq!(consumer.available_raised(), 1);
    }

    #[test]
    fn test_wait_without_raise_times_out() {
        let (mut endpoint, consumer) = pair(8);
        assert!(consumer.wait_available(Duration::from_millis(10)).is_none());
        assert!(!endpoint.wait_received(Duration::from_millis(10)).unwrap());
    }

    #[test]
    fn test_event_resets_after_wait() {
        let (_endpoint, consumer) = pair(8);
        consumer.acknowledge();
        consumer.acknowledge();

        assert!(consumer.shared.received.wait(Duration::from_millis(10)));
        assert!(!consumer.shared.received.wait(Duration::from_millis(10)));
    }

    #[test]
    fn test_detach_on_drop() {
        let (endpoint, consumer) = pair(8);
        assert!(consumer.is_attached());
        drop(endpoint);
        assert!(!consumer.is_attached());
    }
}
