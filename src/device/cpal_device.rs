use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use ringbuf::HeapRb;
use ringbuf::traits::{Consumer, Observer, Producer, Split};

use crate::device::{DeviceConfig, DeviceIo, PlaybackDevice};
use crate::error::{AuralisError, Result};
use crate::format::{decode_sample, encode_sample};
use crate::ring_buffer::RingBuffer;

/// Default-host cpal device.
///
/// Playback samples travel to the output callback through a lock-free `HeapRb<f32>`;
/// captured samples are converted to the stream's PCM format in the input callback and
/// written into a [`RingBuffer`] the render thread drains.
pub struct CpalDevice {
    /// Frames of playback buffering between the render thread and the output callback
    buffer_frames: usize,
    streams: Vec<cpal::Stream>,
}

impl CpalDevice {
    pub fn new() -> Self {
        Self::with_buffer_frames(4096)
    }

    pub fn with_buffer_frames(buffer_frames: usize) -> Self {
        Self {
            buffer_frames,
            streams: Vec::new(),
        }
    }

    fn open_output(
        &mut self,
        host: &cpal::Host,
        config: &DeviceConfig,
    ) -> Result<ringbuf::HeapProd<f32>> {
        let device = host.default_output_device().ok_or_else(|| {
            AuralisError::AudioDevice("No default output device available".into())
        })?;

        let default_config = device.default_output_config().map_err(|e| {
            AuralisError::AudioDevice(format!("Failed to get default output config: {}", e))
        })?;

        let stream_config = cpal::StreamConfig {
            channels: config.play_channels,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let ring = HeapRb::<f32>::new(self.buffer_frames * config.play_channels as usize);
        let (producer, consumer) = ring.split();

        let stream = match default_config.sample_format() {
            cpal::SampleFormat::F32 => output_stream::<f32>(&device, &stream_config, consumer)?,
            cpal::SampleFormat::I16 => output_stream::<i16>(&device, &stream_config, consumer)?,
            cpal::SampleFormat::U16 => output_stream::<u16>(&device, &stream_config, consumer)?,
            other => {
                return Err(AuralisError::AudioFormat(format!(
                    "Unsupported output sample format {:?}",
                    other
                )));
            }
        };

        stream.play().map_err(|e| {
            AuralisError::AudioDevice(format!("Failed to start output stream: {}", e))
        })?;
        self.streams.push(stream);

        log::info!(
            "Output stream open: {}, device samples {:?}",
            config.play_format(),
            default_config.sample_format()
        );
        Ok(producer)
    }

    fn open_input(&mut self, host: &cpal::Host, config: &DeviceConfig) -> Result<Arc<RingBuffer>> {
        let device = host.default_input_device().ok_or_else(|| {
            AuralisError::AudioDevice("No default input device available".into())
        })?;

        let default_config = device.default_input_config().map_err(|e| {
            AuralisError::AudioDevice(format!("Failed to get default input config: {}", e))
        })?;

        let stream_config = cpal::StreamConfig {
            channels: config.record_channels,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let capture = Arc::new(RingBuffer::new(config.capture_capacity));
        let bits = config.bits_per_sample;

        let stream = match default_config.sample_format() {
            cpal::SampleFormat::F32 => {
                input_stream::<f32>(&device, &stream_config, capture.clone(), bits)?
            }
            cpal::SampleFormat::I16 => {
                input_stream::<i16>(&device, &stream_config, capture.clone(), bits)?
            }
            cpal::SampleFormat::U16 => {
                input_stream::<u16>(&device, &stream_config, capture.clone(), bits)?
            }
            other => {
                return Err(AuralisError::AudioFormat(format!(
                    "Unsupported input sample format {:?}",
                    other
                )));
            }
        };

        stream.play().map_err(|e| {
            AuralisError::AudioDevice(format!("Failed to start input stream: {}", e))
        })?;
        self.streams.push(stream);

        log::info!(
            "Input stream open: {}, {} byte capture ring",
            config.record_format(),
            config.capture_capacity
        );
        Ok(capture)
    }

    fn open(&mut self, host: &cpal::Host, config: &DeviceConfig) -> Result<CpalIo> {
        config.validate()?;
        let producer = if config.want_play {
            Some(self.open_output(host, config)?)
        } else {
            None
        };
        let capture = if config.want_record {
            Some(self.open_input(host, config)?)
        } else {
            None
        };
        Ok(CpalIo {
            producer,
            capture,
            bits: config.bits_per_sample,
            play_channels: config.play_channels as usize,
            scratch: Vec::new(),
        })
    }
}

impl Default for CpalDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackDevice for CpalDevice {
    fn name(&self) -> &str {
        "cpal"
    }

    fn init(&mut self, config: &DeviceConfig) -> Result<Box<dyn DeviceIo>> {
        self.close();
        let host = cpal::default_host();

        match self.open(&host, config) {
            Ok(io) => Ok(Box::new(io)),
            Err(e) => {
                self.close();
                Err(e)
            }
        }
    }

    fn close(&mut self) {
        if !self.streams.is_empty() {
            log::debug!("Closing {} cpal stream(s)", self.streams.len());
            self.streams.clear();
        }
    }
}

impl Drop for CpalDevice {
    fn drop(&mut self) {
        self.close();
    }
}

struct CpalIo {
    producer: Option<ringbuf::HeapProd<f32>>,
    capture: Option<Arc<RingBuffer>>,
    bits: u16,
    play_channels: usize,
    scratch: Vec<f32>,
}

impl DeviceIo for CpalIo {
    fn play(&mut self, data: &[u8]) -> Result<usize> {
        let producer = self
            .producer
            .as_mut()
            .ok_or_else(|| AuralisError::InvalidState("Playback was not opened".into()))?;

        let sample_bytes = (self.bits / 8) as usize;
        let frame_bytes = sample_bytes * self.play_channels;
        let frames = (data.len() / frame_bytes).min(producer.vacant_len() / self.play_channels);
        if frames == 0 {
            return Ok(0);
        }

        let accepted = frames * frame_bytes;
        self.scratch.clear();
        self.scratch.extend(
            data[..accepted]
                .chunks_exact(sample_bytes)
                .map(|bytes| decode_sample(bytes, self.bits)),
        );
        let pushed = producer.push_slice(&self.scratch);
        Ok(pushed / self.play_channels * frame_bytes)
    }

    fn record(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let capture = self
            .capture
            .as_ref()
            .ok_or_else(|| AuralisError::InvalidState("Capture was not opened".into()))?;
        Ok(capture.read(buffer))
    }
}

fn output_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut consumer: ringbuf::HeapCons<f32>,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                for sample in data.iter_mut() {
                    // Underruns play silence.
                    *sample = T::from_sample(consumer.try_pop().unwrap_or(0.0));
                }
            },
            move |err| {
                log::error!("Audio output stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AuralisError::AudioDevice(format!("Failed to build output stream: {}", e)))
}

fn input_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    capture: Arc<RingBuffer>,
    bits: u16,
) -> Result<cpal::Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let sample_bytes = (bits / 8) as usize;
    let mut encoded: Vec<u8> = Vec::new();

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                encoded.resize(data.len() * sample_bytes, 0);
                for (sample, out) in data.iter().zip(encoded.chunks_exact_mut(sample_bytes)) {
                    encode_sample(sample.to_sample::<f32>(), bits, out);
                }
                let written = capture.write(&encoded);
                if written < encoded.len() {
                    log::trace!("Capture ring full, dropped {} bytes", encoded.len() - written);
                }
            },
            move |err| {
                log::error!("Audio input stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AuralisError::AudioDevice(format!("Failed to build input stream: {}", e)))
}
