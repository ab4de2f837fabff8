//! Engine lifecycle and the two threads it coordinates.
//!
//! `init` validates the configuration, opens every collaborator and publishes a first
//! response set synchronously. `run` starts a real-time render thread and a background
//! update thread; geometry changes made through [`EngineController`] reach the render
//! thread as freshly published responses. `stop` joins both threads and closes the device.

mod render;
mod scene;
mod source;
mod update;

pub use scene::{EngineController, EngineStats};

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;

use crate::audio_data::AudioStream;
use crate::backend::{ComputeBackend, CpuBackend};
use crate::config::EngineDesc;
use crate::convolution::{ConvolutionParams, PublishMode, PublishStatus};
use crate::device::{CpalDevice, DeviceConfig, DeviceIo, PlaybackDevice};
use crate::error::{AuralisError, Result};
use crate::events::{EngineEvent, EventSink};
use crate::format::StreamFormat;
use crate::response::{GenerateOptions, ImageSourceGenerator, ResponseGenerator};
use crate::room::SoundSource;

use render::RenderLoop;
use scene::{Scene, Shared};
use source::SourceCursor;
use update::{UpdateLoop, Updater};

/// Output channels of the rendered mix.
const OUTPUT_CHANNELS: u16 = 2;

/// The pluggable parts of an engine.
pub struct Collaborators {
    pub device: Box<dyn PlaybackDevice>,
    pub backend: Box<dyn ComputeBackend>,
    pub generator: Box<dyn ResponseGenerator>,
}

impl Collaborators {
    pub fn new(
        device: impl PlaybackDevice + 'static,
        backend: impl ComputeBackend + 'static,
        generator: impl ResponseGenerator + 'static,
    ) -> Self {
        Self {
            device: Box::new(device),
            backend: Box::new(backend),
            generator: Box::new(generator),
        }
    }

    /// Default cpal device, CPU backend and image-source generator.
    pub fn system_default() -> Self {
        Self::new(CpalDevice::new(), CpuBackend::new(), ImageSourceGenerator::new())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Initialized,
    Running,
    Stopped,
    Closed,
}

/// Parts built by `init` and handed to the threads by `run`.
struct Pipeline {
    render: RenderLoop,
    update: UpdateLoop,
}

/// A spatial audio engine rendering a set of looping input streams.
///
/// The engine stays on the thread that created it (platform audio streams are not
/// `Send`); use [`Engine::controller`] to change geometry from other threads.
pub struct Engine {
    state: EngineState,
    format: StreamFormat,
    shared: Arc<Shared>,
    events: EventSink,
    event_receiver: Receiver<EngineEvent>,
    device: Option<Box<dyn PlaybackDevice>>,
    backend: Option<Box<dyn ComputeBackend>>,
    pipeline: Option<Pipeline>,
    render_thread: Option<JoinHandle<()>>,
    update_thread: Option<JoinHandle<()>>,
    poll_interval: std::time::Duration,
}

impl Engine {
    /// Builds a ready-to-run engine, or fails without leaving anything open.
    pub fn init(
        desc: EngineDesc,
        streams: Vec<AudioStream>,
        collaborators: Collaborators,
    ) -> Result<Self> {
        desc.validate()?;
        desc.validate_for_streams(streams.len())?;
        let format = common_format(&streams)?;

        log::info!(
            "Initializing engine: {} sources, {}, fft {}, block {}",
            streams.len(),
            format,
            desc.fft_length,
            desc.block_size
        );

        let Collaborators {
            mut device,
            backend,
            generator,
        } = collaborators;

        let device_config = DeviceConfig {
            sample_rate: format.sample_rate,
            bits_per_sample: format.bits_per_sample,
            play_channels: OUTPUT_CHANNELS,
            record_channels: format.channels,
            want_play: true,
            want_record: desc.use_microphone,
            capture_capacity: desc.capture_blocks * desc.block_size * format.frame_bytes(),
        };
        let io = device.init(&device_config)?;
        log::info!("Device '{}' initialized", device.name());

        let poll_interval = desc.poll_interval;
        let (events, event_receiver) = EventSink::channel();
        match Self::build(desc, streams, format, io, &*backend, generator, &events) {
            Ok((shared, pipeline)) => Ok(Self {
                state: EngineState::Initialized,
                format,
                shared,
                events,
                event_receiver,
                device: Some(device),
                backend: Some(backend),
                pipeline: Some(pipeline),
                render_thread: None,
                update_thread: None,
                poll_interval,
            }),
            Err(e) => {
                device.close();
                Err(e)
            }
        }
    }

    /// Everything after the device: backend, convolution, scene and the first publish.
    fn build(
        desc: EngineDesc,
        streams: Vec<AudioStream>,
        format: StreamFormat,
        io: Box<dyn DeviceIo>,
        backend: &dyn ComputeBackend,
        generator: Box<dyn ResponseGenerator>,
        events: &EventSink,
    ) -> Result<(Arc<Shared>, Pipeline)> {
        let sources = streams.len();

        let capabilities = backend.capabilities();
        let priority = backend.resolve_priority(desc.backend.queue_priority);
        let params = ConvolutionParams {
            method: desc.convolution_method,
            fft_length: desc.fft_length,
            block_size: desc.block_size,
            channel_count: sources * 2,
        };
        let (processor, publisher) = backend.create_convolution(&params, priority)?;

        let device_resident = desc.backend.prefer_device_buffers && capabilities.device_buffers;
        if desc.backend.prefer_device_buffers && !device_resident {
            log::warn!(
                "Backend '{}' has no device buffers, mixing in host memory",
                backend.name()
            );
        }
        let bus_left = backend.allocate(desc.block_size, device_resident)?;
        let bus_right = backend.allocate(desc.block_size, device_resident)?;
        log::info!(
            "Backend '{}' ready ({:?} priority, device buffers: {})",
            backend.name(),
            priority,
            device_resident
        );

        let mut scene = Scene {
            room: desc.room,
            listener: desc.listener,
            sources: (0..sources)
                .map(|i| SoundSource {
                    position: desc.source_position(i),
                    track_head: desc.head_tracking.get(i).copied().unwrap_or(false),
                })
                .collect(),
        };
        scene.snap_tracked_sources();

        let options = GenerateOptions {
            max_bounces: desc.max_bounces,
            suppress_direct_path: desc.suppress_direct_path,
        };
        let mut updater = Updater::new(
            publisher,
            generator,
            options,
            format.sample_rate,
            sources,
            desc.fft_length,
        );
        updater.regenerate(&scene)?;
        match updater.publish(PublishMode::NonBlocking)? {
            PublishStatus::Published => {}
            PublishStatus::InputFull => {
                return Err(AuralisError::Engine(
                    "Convolution engine refused the initial responses".into(),
                ));
            }
        }

        let shared = Shared::new(scene);
        shared.flags.responses_ready.store(true, Ordering::Release);
        shared
            .stats
            .responses_published
            .fetch_add(1, Ordering::Relaxed);

        events.emit(EngineEvent::ResponsesPublished {
            generation: updater.generation,
        });

        let render = RenderLoop {
            shared: shared.clone(),
            events: events.clone(),
            io,
            processor,
            cursors: streams.into_iter().map(SourceCursor::new).collect(),
            format,
            block_size: desc.block_size,
            use_microphone: desc.use_microphone,
            poll_interval: desc.poll_interval,
            priority: desc.render_priority.clone(),
            bus_left,
            bus_right,
        };
        let update = UpdateLoop {
            shared: shared.clone(),
            events: events.clone(),
            updater,
            publish_mode: desc.publish_mode,
            poll_interval: desc.poll_interval,
        };

        Ok((shared, Pipeline { render, update }))
    }

    /// Starts both threads and returns once the first block has reached the device.
    pub fn run(&mut self) -> Result<()> {
        if self.state != EngineState::Initialized {
            return Err(AuralisError::InvalidState(format!(
                "run() called in state {:?}",
                self.state
            )));
        }
        let Pipeline { render, update } = self
            .pipeline
            .take()
            .ok_or_else(|| AuralisError::InvalidState("Engine pipeline already used".into()))?;

        // From here on a failure leaves the engine stopped.
        self.state = EngineState::Stopped;

        match thread::Builder::new()
            .name("auralis-render".into())
            .spawn(move || render.run())
        {
            Ok(handle) => self.render_thread = Some(handle),
            Err(e) => {
                self.shutdown();
                return Err(e.into());
            }
        }

        match thread::Builder::new()
            .name("auralis-update".into())
            .spawn(move || update.run())
        {
            Ok(handle) => self.update_thread = Some(handle),
            Err(e) => {
                self.shutdown();
                return Err(e.into());
            }
        }

        while !self.shared.flags.running.load(Ordering::Acquire) {
            let finished = self
                .render_thread
                .as_ref()
                .is_none_or(|handle| handle.is_finished());
            if finished {
                self.shutdown();
                return Err(AuralisError::Engine(
                    "Render thread exited before playing its first block".into(),
                ));
            }
            thread::sleep(self.poll_interval);
        }

        self.state = EngineState::Running;
        log::info!("Engine running");
        Ok(())
    }

    /// Stops both threads and closes the device. No-op once stopped.
    pub fn stop(&mut self) -> Result<()> {
        match self.state {
            EngineState::Stopped | EngineState::Closed => Ok(()),
            EngineState::Initialized | EngineState::Running => {
                self.shutdown();
                self.state = EngineState::Stopped;
                log::info!("Engine stopped");
                Ok(())
            }
        }
    }

    /// Stops if needed and releases every collaborator. Terminal.
    pub fn close(&mut self) -> Result<()> {
        if self.state == EngineState::Closed {
            return Ok(());
        }
        self.stop()?;
        self.backend = None;
        self.device = None;
        self.state = EngineState::Closed;
        log::info!("Engine closed");
        Ok(())
    }

    fn shutdown(&mut self) {
        self.shared
            .flags
            .stop_requested
            .store(true, Ordering::Release);

        for (name, handle) in [
            ("render", self.render_thread.take()),
            ("update", self.update_thread.take()),
        ] {
            if let Some(handle) = handle {
                if handle.join().is_err() {
                    log::error!("The {} thread panicked", name);
                }
            }
        }

        // Never-started threads still own device I/O; release it before closing.
        self.pipeline = None;
        if let Some(device) = self.device.as_mut() {
            device.close();
        }
        self.shared.flags.running.store(false, Ordering::Release);
        self.events.emit(EngineEvent::EngineStopped);
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Shared sample format of all input streams.
    pub fn format(&self) -> StreamFormat {
        self.format
    }

    pub fn stats(&self) -> EngineStats {
        self.shared.stats.snapshot()
    }

    pub fn controller(&self) -> EngineController {
        EngineController::new(self.shared.clone())
    }

    /// Drains events reported since the last call.
    pub fn poll_events(&self) -> Vec<EngineEvent> {
        self.event_receiver.try_iter().collect()
    }

    /// Whether the render thread has played its first block and not stopped since.
    pub fn is_running(&self) -> bool {
        self.shared.flags.running.load(Ordering::Acquire)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Checks that every stream matches the first, collecting every mismatch.
fn common_format(streams: &[AudioStream]) -> Result<StreamFormat> {
    let first = streams.first().ok_or_else(|| {
        AuralisError::Configuration("At least one input stream is required".into())
    })?;
    let expected = first.format();
    expected.validate()?;

    let mut mismatches = Vec::new();
    for (i, stream) in streams.iter().enumerate().skip(1) {
        let format = stream.format();
        if format.sample_rate != expected.sample_rate {
            mismatches.push(format!(
                "stream {} '{}': sample rate {} Hz, expected {} Hz",
                i,
                stream.name(),
                format.sample_rate,
                expected.sample_rate
            ));
        }
        if format.bits_per_sample != expected.bits_per_sample {
            mismatches.push(format!(
                "stream {} '{}': {} bits per sample, expected {}",
                i,
                stream.name(),
                format.bits_per_sample,
                expected.bits_per_sample
            ));
        }
        if format.channels != expected.channels {
            mismatches.push(format!(
                "stream {} '{}': {} channels, expected {}",
                i,
                stream.name(),
                format.channels,
                expected.channels
            ));
        }
    }

    if mismatches.is_empty() {
        Ok(expected)
    } else {
        Err(AuralisError::FormatMismatch { mismatches })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn silent(name: &str, rate: u32, bits: u16, channels: u16) -> AudioStream {
        let format = StreamFormat::new(rate, bits, channels);
        AudioStream::from_pcm(name, format, vec![0; format.frame_bytes() * 64]).unwrap()
    }

    #[test]
    fn format_mismatches_are_collected() {
        let streams = vec![
            silent("a", 48_000, 16, 1),
            silent("b", 44_100, 16, 1),
            silent("c", 48_000, 24, 2),
        ];
        match common_format(&streams) {
            Err(AuralisError::FormatMismatch { mismatches }) => {
                assert_eq!(mismatches.len(), 3);
                assert!(mismatches[0].contains("44100"));
            }
            other => panic!("expected a format mismatch, got {:?}", other),
        }
    }

    #[test]
    fn matching_formats_pass() {
        let streams = vec![silent("a", 48_000, 16, 2), silent("b", 48_000, 16, 2)];
        assert_eq!(
            common_format(&streams).unwrap(),
            StreamFormat::new(48_000, 16, 2)
        );
    }
}
