//! Input streams: interleaved PCM held in memory in its native format.

mod load_options;
mod symphonia_loader;

pub use load_options::LoadOptions;
pub use symphonia_loader::load_audio_file;

use crate::error::{AuralisError, Result};
use crate::format::{self, StreamFormat};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// One source's sample data, shared cheaply between the caller and the render thread.
#[derive(Debug, Clone)]
pub struct AudioStream {
    inner: Arc<StreamInner>,
}

#[derive(Debug)]
struct StreamInner {
    name: String,
    format: StreamFormat,
    data: Vec<u8>,
}

impl AudioStream {
    /// Wraps already-encoded interleaved PCM.
    pub fn from_pcm(name: impl Into<String>, format: StreamFormat, data: Vec<u8>) -> Result<Self> {
        let name = name.into();
        format.validate()?;

        if data.is_empty() {
            return Err(AuralisError::AudioLoading(format!(
                "Stream '{}' holds no samples",
                name
            )));
        }
        if data.len() % format.frame_bytes() != 0 {
            return Err(AuralisError::AudioFormat(format!(
                "Stream '{}' length {} is not a whole number of {}-byte frames",
                name,
                data.len(),
                format.frame_bytes()
            )));
        }

        Ok(Self {
            inner: Arc::new(StreamInner { name, format, data }),
        })
    }

    /// Encodes interleaved floats into `format` and wraps the result.
    pub fn from_f32(
        name: impl Into<String>,
        format: StreamFormat,
        samples: &[f32],
    ) -> Result<Self> {
        format.validate()?;
        let mut data = Vec::with_capacity(samples.len() * format.bytes_per_sample());
        let report = format::f32_to_pcm(samples, format.bits_per_sample, &mut data);
        if report.clipped() {
            log::warn!(
                "{} samples clipped while encoding stream",
                report.clipped_samples
            );
        }
        Self::from_pcm(name, format, data)
    }

    /// Decodes an audio file with the default options.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        load_audio_file(path, &LoadOptions::default())
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn format(&self) -> StreamFormat {
        self.inner.format
    }

    pub fn data(&self) -> &[u8] {
        &self.inner.data
    }

    pub fn len_bytes(&self) -> usize {
        self.inner.data.len()
    }

    pub fn total_frames(&self) -> usize {
        self.inner.data.len() / self.inner.format.frame_bytes()
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.total_frames() as f64 / self.inner.format.sample_rate as f64)
    }
}
