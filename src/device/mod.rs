//! Audio device abstraction.
//!
//! A [`PlaybackDevice`] stays on the thread that created the engine; platform streams
//! are not required to be `Send`. Its `init` hands out a [`DeviceIo`], which the render
//! thread owns and uses for non-blocking playback and capture.

mod cpal_device;
mod offline;

pub use cpal_device::CpalDevice;
pub use offline::{OfflineDevice, OfflineHandle};

use crate::error::{AuralisError, Result};
use crate::format::StreamFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub play_channels: u16,
    pub record_channels: u16,
    pub want_play: bool,
    pub want_record: bool,
    /// Size in bytes of the capture ring buffer between the device and the render thread
    pub capture_capacity: usize,
}

impl DeviceConfig {
    pub fn play_format(&self) -> StreamFormat {
        StreamFormat::new(self.sample_rate, self.bits_per_sample, self.play_channels)
    }

    pub fn record_format(&self) -> StreamFormat {
        StreamFormat::new(self.sample_rate, self.bits_per_sample, self.record_channels)
    }

    /// Checks the requested directions' formats.
    pub fn validate(&self) -> Result<()> {
        if !self.want_play && !self.want_record {
            return Err(AuralisError::AudioDevice(
                "Neither playback nor capture requested".into(),
            ));
        }
        if self.want_play {
            self.play_format().validate()?;
        }
        if self.want_record {
            self.record_format().validate()?;
            if self.capture_capacity < self.record_format().frame_bytes() {
                return Err(AuralisError::AudioDevice(format!(
                    "Capture ring of {} bytes cannot hold one frame",
                    self.capture_capacity
                )));
            }
        }
        Ok(())
    }
}

/// Render-thread side of an open device. Neither call blocks.
pub trait DeviceIo: Send {
    /// Queues interleaved PCM for playback and returns the number of bytes accepted.
    /// Zero means the device is full for now.
    fn play(&mut self, data: &[u8]) -> Result<usize>;

    /// Moves captured interleaved PCM into `buffer` and returns the number of bytes read.
    fn record(&mut self, buffer: &mut [u8]) -> Result<usize>;
}

pub trait PlaybackDevice {
    fn name(&self) -> &str;

    /// Opens playback, and capture when `config.want_record` is set.
    fn init(&mut self, config: &DeviceConfig) -> Result<Box<dyn DeviceIo>>;

    /// Stops and releases the platform streams. Safe to call repeatedly.
    fn close(&mut self);
}
