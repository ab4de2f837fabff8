use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::device::{DeviceConfig, DeviceIo, PlaybackDevice};
use crate::error::{AuralisError, Result};
use crate::ring_buffer::RingBuffer;

/// In-memory device for tests and offline rendering.
///
/// Played bytes are collected until `played_limit` is reached, after which `play`
/// accepts nothing until the collected output is taken. Capture data is fed by hand
/// through an [`OfflineHandle`].
pub struct OfflineDevice {
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    played: Mutex<Vec<u8>>,
    capture: Mutex<Option<Arc<RingBuffer>>>,
    config: Mutex<Option<DeviceConfig>>,
    io_calls: AtomicU64,
    open: AtomicBool,
    played_limit: usize,
    max_bytes_per_call: Option<usize>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl OfflineDevice {
    pub fn new() -> Self {
        Self::with_limits(1 << 20, None)
    }

    /// `played_limit` bytes are retained before `play` pushes back; `max_bytes_per_call`
    /// caps how much one `play` or `record` call moves, to exercise partial I/O.
    pub fn with_limits(played_limit: usize, max_bytes_per_call: Option<usize>) -> Self {
        Self {
            shared: Arc::new(Shared {
                played_limit,
                max_bytes_per_call,
                ..Default::default()
            }),
        }
    }

    pub fn handle(&self) -> OfflineHandle {
        OfflineHandle {
            shared: self.shared.clone(),
        }
    }
}

impl Default for OfflineDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackDevice for OfflineDevice {
    fn name(&self) -> &str {
        "offline"
    }

    fn init(&mut self, config: &DeviceConfig) -> Result<Box<dyn DeviceIo>> {
        config.validate()?;

        let capture = config
            .want_record
            .then(|| Arc::new(RingBuffer::new(config.capture_capacity)));
        *lock(&self.shared.capture) = capture.clone();
        *lock(&self.shared.config) = Some(*config);
        lock(&self.shared.played).clear();
        self.shared.open.store(true, Ordering::Release);

        log::debug!(
            "Offline device open (play: {}, record: {})",
            config.want_play,
            config.want_record
        );

        Ok(Box::new(OfflineIo {
            shared: self.shared.clone(),
            capture,
            want_play: config.want_play,
        }))
    }

    fn close(&mut self) {
        if self.shared.open.swap(false, Ordering::AcqRel) {
            *lock(&self.shared.capture) = None;
            log::debug!("Offline device closed");
        }
    }
}

struct OfflineIo {
    shared: Arc<Shared>,
    capture: Option<Arc<RingBuffer>>,
    want_play: bool,
}

impl OfflineIo {
    fn limit(&self, len: usize) -> usize {
        self.shared.max_bytes_per_call.map_or(len, |max| len.min(max))
    }
}

impl DeviceIo for OfflineIo {
    fn play(&mut self, data: &[u8]) -> Result<usize> {
        self.shared.io_calls.fetch_add(1, Ordering::Relaxed);
        if !self.want_play {
            return Err(AuralisError::InvalidState("Playback was not opened".into()));
        }
        let mut played = lock(&self.shared.played);
        let room = self.shared.played_limit.saturating_sub(played.len());
        let accepted = self.limit(data.len()).min(room);
        played.extend_from_slice(&data[..accepted]);
        Ok(accepted)
    }

    fn record(&mut self, buffer: &mut [u8]) -> Result<usize> {
        self.shared.io_calls.fetch_add(1, Ordering::Relaxed);
        let capture = self
            .capture
            .as_ref()
            .ok_or_else(|| AuralisError::InvalidState("Capture was not opened".into()))?;
        let len = self.limit(buffer.len());
        Ok(capture.read(&mut buffer[..len]))
    }
}

/// Test-side view of an [`OfflineDevice`]; stays valid after the device moves into an engine.
#[derive(Clone)]
pub struct OfflineHandle {
    shared: Arc<Shared>,
}

impl OfflineHandle {
    /// Number of `play` and `record` calls made so far.
    pub fn io_calls(&self) -> u64 {
        self.shared.io_calls.load(Ordering::Relaxed)
    }

    pub fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::Acquire)
    }

    pub fn config(&self) -> Option<DeviceConfig> {
        *lock(&self.shared.config)
    }

    pub fn played_len(&self) -> usize {
        lock(&self.shared.played).len()
    }

    /// Takes everything played so far, making room for more.
    pub fn take_played(&self) -> Vec<u8> {
        std::mem::take(&mut *lock(&self.shared.played))
    }

    /// Writes capture data as if a microphone produced it. Returns bytes accepted.
    pub fn feed_capture(&self, data: &[u8]) -> usize {
        match lock(&self.shared.capture).as_ref() {
            Some(capture) => capture.write(data),
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::StreamFormat;

    fn config(want_record: bool) -> DeviceConfig {
        DeviceConfig {
            sample_rate: 48_000,
            bits_per_sample: 16,
            play_channels: 2,
            record_channels: 1,
            want_play: true,
            want_record,
            capture_capacity: 64,
        }
    }

    #[test]
    fn play_collects_until_limit() {
        let mut device = OfflineDevice::with_limits(10, None);
        let handle = device.handle();
        let mut io = device.init(&config(false)).unwrap();

        assert_eq!(io.play(&[1; 8]).unwrap(), 8);
        assert_eq!(io.play(&[2; 8]).unwrap(), 2);
        assert_eq!(io.play(&[3; 8]).unwrap(), 0);
        assert_eq!(handle.take_played().len(), 10);
        assert_eq!(io.play(&[4; 4]).unwrap(), 4);
        assert_eq!(handle.io_calls(), 4);
    }

    #[test]
    fn partial_io_is_capped_per_call() {
        let mut device = OfflineDevice::with_limits(100, Some(3));
        let handle = device.handle();
        let mut io = device.init(&config(true)).unwrap();

        assert_eq!(io.play(&[0; 8]).unwrap(), 3);
        assert_eq!(handle.feed_capture(&[7; 8]), 8);
        let mut buf = [0u8; 8];
        assert_eq!(io.record(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[7, 7, 7]);
    }

    #[test]
    fn record_without_capture_fails() {
        let mut device = OfflineDevice::new();
        let handle = device.handle();
        let mut io = device.init(&config(false)).unwrap();
        assert!(io.record(&mut [0u8; 4]).is_err());
        assert_eq!(handle.feed_capture(&[1, 2]), 0);
    }

    #[test]
    fn invalid_configs_leave_the_device_closed() {
        let mut device = OfflineDevice::new();
        let handle = device.handle();

        let neither = DeviceConfig {
            want_play: false,
            ..config(false)
        };
        assert!(device.init(&neither).is_err());

        let odd_bits = DeviceConfig {
            bits_per_sample: 12,
            ..config(false)
        };
        assert!(device.init(&odd_bits).is_err());

        let tiny_ring = DeviceConfig {
            capture_capacity: 1,
            ..config(true)
        };
        assert!(device.init(&tiny_ring).is_err());

        assert!(!handle.is_open());
        assert!(handle.config().is_none());
    }

    #[test]
    fn formats_follow_each_direction() {
        let config = config(true);
        assert_eq!(config.play_format(), StreamFormat::new(48_000, 16, 2));
        assert_eq!(config.record_format(), StreamFormat::new(48_000, 16, 1));
    }

    #[test]
    fn close_is_idempotent() {
        let mut device = OfflineDevice::new();
        let handle = device.handle();
        let _io = device.init(&config(true)).unwrap();
        assert!(handle.is_open());
        device.close();
        device.close();
        assert!(!handle.is_open());
    }
}
