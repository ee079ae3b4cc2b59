//! Producer side of the notification channel
//!
//! One notification at a time: take the private lock, encode tag and fields
//! into the shared buffer, raise `available`, wait for `received`, release.
//! Every failure is absorbed here. A missing consumer at construction or an
//! unacknowledged notification leaves the channel disconnected for good, and
//! from then on every call returns without touching a shared resource.

use crate::{ChannelConfig, ChannelError, Endpoint, Result, SharedMemoryEndpoint};
use loghook_core::{Encoded, EventType, Notification, WireWriter};
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, error, trace, warn};

/// Channel state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelState {
    /// No consumer; every operation is a no-op
    Disconnected,
    /// Connected and ready for a notification
    Idle,
    /// A notification is between begin and end
    InProgress,
}

/// Channel counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStats {
    /// Notifications acknowledged by the consumer
    pub delivered: u64,
    /// Notifications dropped because the lock was busy
    pub dropped_lock_timeout: u64,
    /// Notifications dropped because a field did not fit
    pub dropped_overflow: u64,
}

#[derive(Default)]
struct StatsTracker {
    delivered: AtomicU64,
    dropped_lock_timeout: AtomicU64,
    dropped_overflow: AtomicU64,
}

impl StatsTracker {
    fn snapshot(&self) -> ChannelStats {
        ChannelStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped_lock_timeout: self.dropped_lock_timeout.load(Ordering::Relaxed),
            dropped_overflow: self.dropped_overflow.load(Ordering::Relaxed),
        }
    }
}

/// Notification channel to an external consumer.
///
/// Owned by the host integration and shared by reference with whatever hooks
/// call the `notify_*` methods. All methods take `&self` and are safe to call
/// from several threads; notifications are serialized by a private lock.
pub struct NotificationChannel<E: Endpoint = SharedMemoryEndpoint> {
    /// `None` once disconnected
    endpoint: Mutex<Option<E>>,
    connected: AtomicBool,
    config: ChannelConfig,
    stats: StatsTracker,
}

impl NotificationChannel<SharedMemoryEndpoint> {
    /// Attach to the consumer's shared resources.
    ///
    /// Never fails: if any resource is missing the channel starts out
    /// disconnected and stays that way.
    pub fn attach(config: ChannelConfig) -> Self {
        let endpoint = SharedMemoryEndpoint::attach(&config.names, config.buffer_size);
        Self::from_endpoint(endpoint, config)
    }
}

impl<E: Endpoint> NotificationChannel<E> {
    /// Build a channel from the outcome of attaching an endpoint
    pub fn from_endpoint(endpoint: Result<E>, config: ChannelConfig) -> Self {
        let endpoint = match endpoint {
            Ok(endpoint) => {
                debug!("Notification channel connected to {}", config.names.buffer);
                Some(endpoint)
            }
            Err(e) => {
                warn!("Notification channel disabled: {}", e);
                None
            }
        };

        Self {
            connected: AtomicBool::new(endpoint.is_some()),
            endpoint: Mutex::new(endpoint),
            config,
            stats: StatsTracker::default(),
        }
    }

    /// A channel that was never connected
    pub fn disconnected(config: ChannelConfig) -> Self {
        Self {
            endpoint: Mutex::new(None),
            connected: AtomicBool::new(false),
            config,
            stats: StatsTracker::default(),
        }
    }

    /// Report that the host is opening a file
    pub fn notify_opening_file(&self, name_hash: u64, locale: u64, path: impl AsRef<[u8]>) {
        self.send(EventType::OpeningFile, |writer| {
            writer.write_long(name_hash);
            writer.write_long(locale);
            writer.write_text(path);
        });
    }

    /// Report that the host started an animation
    pub fn notify_playing_animation(&self, id: i32, name: impl AsRef<[u8]>) {
        self.send(EventType::PlayingAnimation, |writer| {
            writer.write_int(id);
            writer.write_text(name);
        });
    }

    /// Send an already built notification
    pub fn notify(&self, notification: &Notification) {
        match notification {
            Notification::OpeningFile { key, path } => {
                self.notify_opening_file(key.name_hash, key.locale, path)
            }
            Notification::PlayingAnimation { id, name } => self.notify_playing_animation(*id, name),
        }
    }

    /// Disconnect and release every shared resource. Safe to call repeatedly.
    ///
    /// Waits for a notification in flight to finish first.
    pub fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        if self.endpoint.lock().take().is_some() {
            debug!("Notification channel closed");
        }
    }

    /// Whether notifications are still being sent
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Current state
    pub fn state(&self) -> ChannelState {
        if !self.is_connected() {
            ChannelState::Disconnected
        } else if self.endpoint.is_locked() {
            ChannelState::InProgress
        } else {
            ChannelState::Idle
        }
    }

    /// Counters since construction
    pub fn stats(&self) -> ChannelStats {
        self.stats.snapshot()
    }

    /// Configuration in use
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    fn send<F>(&self, event: EventType, encode: F)
    where
        F: FnOnce(&mut WireWriter<'_>),
    {
        let Some(mut slot) = self.begin_notification(event) else {
            return;
        };
        let Some(endpoint) = slot.as_mut() else {
            return;
        };

        let mut writer = WireWriter::new(endpoint.buffer_mut());
        writer.write_u8(event.tag());
        encode(&mut writer);
        let encoded = writer.finish();

        self.end_notification(slot, event, encoded);
    }

    /// Take the private lock, or give up on this notification
    fn begin_notification(&self, event: EventType) -> Option<MutexGuard<'_, Option<E>>> {
        if !self.is_connected() {
            return None;
        }

        match self.endpoint.try_lock_for(self.config.lock_timeout) {
            Some(slot) if slot.is_some() => Some(slot),
            Some(_) => None,
            None => {
                let err = ChannelError::LockTimeout {
                    timeout_ms: self.config.lock_timeout.as_millis() as u64,
                };
                debug!("Dropping {:?} notification: {}", event, err);
                self.stats.dropped_lock_timeout.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Publish the notification and wait for the consumer.
    ///
    /// The lock is released when `slot` drops at the end of this call.
    fn end_notification(&self, mut slot: MutexGuard<'_, Option<E>>, event: EventType, encoded: Encoded) {
        if let Some(overflow) = encoded.overflow {
            let err = ChannelError::from(overflow);
            warn!(
                "Dropping {:?} notification: {} ({} byte buffer)",
                event, err, self.config.buffer_size
            );
            self.stats.dropped_overflow.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let Some(endpoint) = slot.as_mut() else {
            return;
        };

        if let Err(e) = endpoint.raise_available() {
            error!("Failed to raise notification available signal: {}", e);
        }

        match endpoint.wait_received(self.config.ack_timeout) {
            Ok(true) => {
                trace!("Delivered {:?} notification ({} bytes)", event, encoded.len);
                self.stats.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Ok(false) => {
                let err = ChannelError::AckTimeout {
                    timeout_ms: self.config.ack_timeout.as_millis() as u64,
                };
                warn!("{}; disconnecting notification channel", err);
                self.disconnect(&mut slot);
            }
            Err(e) => {
                error!("Waiting for notification acknowledgment failed: {}; disconnecting", e);
                self.disconnect(&mut slot);
            }
        }
    }

    fn disconnect(&self, slot: &mut Option<E>) {
        self.connected.store(false, Ordering::SeqCst);
        // Dropping the endpoint unmaps the buffer and closes both signals
        drop(slot.take());
    }
}

impl<E: Endpoint> Drop for NotificationChannel<E> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<E: Endpoint> std::fmt::Debug for NotificationChannel<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationChannel")
            .field("state", &self.state())
            .field("buffer", &self.config.names.buffer)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::{self, LoopbackConsumer, LoopbackEndpoint};
    use loghook_core::FileKey;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};
    use tracing_test::traced_test;

    fn test_config() -> ChannelConfig {
        ChannelConfig {
            lock_timeout: Duration::from_millis(100),
            ack_timeout: Duration::from_millis(200),
            ..ChannelConfig::default()
        }
    }

    fn connected(config: ChannelConfig) -> (NotificationChannel<LoopbackEndpoint>, LoopbackConsumer) {
        let (endpoint, consumer) = loopback::pair(config.buffer_size);
        (NotificationChannel::from_endpoint(Ok(endpoint), config), consumer)
    }

    /// Read one notification on another thread and acknowledge it
    fn ack_one(consumer: LoopbackConsumer) -> thread::JoinHandle<(Vec<u8>, LoopbackConsumer)> {
        thread::spawn(move || {
            let bytes = consumer
                .wait_available(Duration::from_secs(5))
                .expect("notification");
            consumer.acknowledge();
            (bytes, consumer)
        })
    }

    #[test]
    fn test_opening_file_bytes() {
        let (channel, consumer) = connected(test_config());
        let reader = ack_one(consumer);

        channel.notify_opening_file(0x1234, 0, "foo/bar.tex");

        let (bytes, consumer) = reader.join().unwrap();
        let mut expected = vec![0x00, 0x34, 0x12, 0, 0, 0, 0, 0, 0];
        expected.extend_from_slice(&[0; 8]);
        expected.extend_from_slice(b"foo/bar.tex\0");

        assert_eq!(&bytes[..expected.len()], expected.as_slice());
        assert_eq!(consumer.available_raised(), 1);
        assert_eq!(channel.state(), ChannelState::Idle);
        assert_eq!(channel.stats().delivered, 1);
    }

    #[test]
    fn test_playing_animation_bytes() {
        let (channel, consumer) = connected(test_config());
        let reader = ack_one(consumer);

        channel.notify_playing_animation(7, "Idle");

        let (bytes, _consumer) = reader.join().unwrap();
        assert_eq!(&bytes[..10], &[0x01, 7, 0, 0, 0, b'I', b'd', b'l', b'e', 0]);
    }

    #[test]
    fn test_notify_typed() {
        let (channel, consumer) = connected(test_config());
        let notification = Notification::OpeningFile {
            key: FileKey::new(42, 9),
            path: "shaders/water.drm".to_string(),
        };

        let reader = thread::spawn(move || consumer.recv(Duration::from_secs(5)));
        channel.notify(&notification);

        assert_eq!(reader.join().unwrap().unwrap(), Some(notification));
    }

    #[test]
    fn test_successive_notifications() {
        let (channel, consumer) = connected(test_config());
        let reader = thread::spawn(move || {
            let mut seen = Vec::new();
            for _ in 0..3 {
                seen.push(consumer.recv(Duration::from_secs(5)).unwrap().unwrap());
            }
            seen
        });

        channel.notify_playing_animation(1, "walk");
        channel.notify_playing_animation(2, "run");
        channel.notify_opening_file(3, 4, "x");

        let seen = reader.join().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(
            seen[1],
            Notification::PlayingAnimation { id: 2, name: "run".to_string() }
        );
        assert_eq!(channel.stats().delivered, 3);
        assert!(channel.is_connected());
    }

    #[test]
    fn test_disconnected_is_noop() {
        let channel = NotificationChannel::<LoopbackEndpoint>::from_endpoint(
            Err(ChannelError::ResourceNotFound("LogHook_NotificationBuffer".to_string())),
            test_config(),
        );
        assert_eq!(channel.state(), ChannelState::Disconnected);

        let started = Instant::now();
        channel.notify_opening_file(1, 2, "a");
        channel.notify_playing_animation(3, "b");
        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(channel.stats(), ChannelStats::default());
    }

    #[traced_test]
    #[test]
    fn test_ack_timeout_disconnects() {
        let (channel, consumer) = connected(test_config());

        channel.notify_playing_animation(7, "Idle");

        assert_eq!(consumer.available_raised(), 1);
        assert_eq!(channel.state(), ChannelState::Disconnected);
        assert!(!consumer.is_attached());
        assert!(logs_contain("Consumer did not acknowledge within 200ms"));

        channel.notify_playing_animation(8, "Walk");
        assert_eq!(consumer.available_raised(), 1);
        assert_eq!(channel.stats().delivered, 0);
    }

    #[test]
    fn test_lock_timeout_drops_only_one() {
        let config = ChannelConfig {
            lock_timeout: Duration::from_millis(50),
            ack_timeout: Duration::from_secs(5),
            ..ChannelConfig::default()
        };
        let (channel, consumer) = connected(config);
        let channel = Arc::new(channel);

        // Hold the first notification in flight until the second gives up
        let slow_reader = thread::spawn(move || {
            consumer.wait_available(Duration::from_secs(5)).unwrap();
            thread::sleep(Duration::from_millis(300));
            consumer.acknowledge();
            consumer
        });
        let first = {
            let channel = Arc::clone(&channel);
            thread::spawn(move || channel.notify_playing_animation(1, "first"))
        };

        while channel.state() != ChannelState::InProgress {
            thread::yield_now();
        }
        channel.notify_playing_animation(2, "second");

        first.join().unwrap();
        let consumer = slow_reader.join().unwrap();

        let stats = channel.stats();
        assert_eq!(stats.dropped_lock_timeout, 1);
        assert_eq!(stats.delivered, 1);
        assert_eq!(consumer.available_raised(), 1);
        assert!(channel.is_connected());

        let reader = ack_one(consumer);
        channel.notify_playing_animation(3, "third");
        let (bytes, _) = reader.join().unwrap();
        assert_eq!(bytes[1], 3);
    }

    /// Endpoint whose `available` signal cannot be raised
    struct BrokenSignalEndpoint {
        buffer: Vec<u8>,
        waited: Arc<AtomicU64>,
    }

    impl Endpoint for BrokenSignalEndpoint {
        fn buffer_mut(&mut self) -> &mut [u8] {
            &mut self.buffer
        }

        fn raise_available(&mut self) -> Result<()> {
            Err(ChannelError::Platform("sem_post failed".to_string()))
        }

        fn wait_received(&mut self, timeout: Duration) -> Result<bool> {
            self.waited.fetch_add(1, Ordering::SeqCst);
            thread::sleep(timeout);
            Ok(false)
        }
    }

    #[traced_test]
    #[test]
    fn test_raise_failure_disconnects_after_ack_bound() {
        let config = test_config();
        let waited = Arc::new(AtomicU64::new(0));
        let endpoint = BrokenSignalEndpoint {
            buffer: vec![0; config.buffer_size],
            waited: Arc::clone(&waited),
        };
        let channel = NotificationChannel::from_endpoint(Ok(endpoint), config);

        let started = Instant::now();
        channel.notify_playing_animation(1, "x");

        assert!(logs_contain("Failed to raise notification available signal"));
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert_eq!(waited.load(Ordering::SeqCst), 1);
        assert_eq!(channel.state(), ChannelState::Disconnected);

        channel.notify_playing_animation(2, "y");
        assert_eq!(waited.load(Ordering::SeqCst), 1);
        assert_eq!(channel.stats().delivered, 0);
    }

    #[traced_test]
    #[test]
    fn test_overflow_is_not_published() {
        let config = ChannelConfig {
            buffer_size: 16,
            ..test_config()
        };
        let (channel, consumer) = connected(config);

        channel.notify_opening_file(1, 2, "this path does not fit");

        assert_eq!(consumer.available_raised(), 0);
        assert_eq!(channel.stats().dropped_overflow, 1);
        assert_eq!(channel.state(), ChannelState::Idle);
        assert!(logs_contain("Field of 8 bytes exceeds remaining capacity of 7 bytes"));

        let reader = ack_one(consumer);
        channel.notify_playing_animation(5, "ok");
        let (bytes, _) = reader.join().unwrap();
        assert_eq!(&bytes[..8], &[0x01, 5, 0, 0, 0, b'o', b'k', 0]);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (channel, consumer) = connected(test_config());

        channel.close();
        assert!(!consumer.is_attached());
        assert_eq!(channel.state(), ChannelState::Disconnected);

        channel.close();
        channel.notify_playing_animation(1, "x");
        assert_eq!(consumer.available_raised(), 0);
    }

    #[test]
    fn test_drop_releases_endpoint() {
        let (channel, consumer) = connected(test_config());
        drop(channel);
        assert!(!consumer.is_attached());
    }
}
