//! # auralis
//!
//! Real-time room-acoustic spatial audio for Rust.
//!
//! Every input stream is a mono sound source placed inside a shoebox room. The engine
//! convolves each source with a stereo impulse response computed from the room, the
//! source position and the listener's head, mixes the results and plays them back.
//! Responses are regenerated in the background whenever the geometry changes, so the
//! render loop never waits on that work.
//!
//! ## Quick Start
//!
//! ```no_run
//! use auralis::*;
//!
//! let streams = vec![AudioStream::from_path("voice.wav")?];
//! let desc = EngineDesc::default().sources(vec![SourceDesc::at(Vec3::new(1.5, 1.7, 3.0))]);
//!
//! let mut engine = Engine::init(desc, streams, Collaborators::system_default())?;
//! engine.run()?;
//!
//! // Move the listener from any thread
//! let controller = engine.controller();
//! controller.set_listener_position(Vec3::new(4.0, 1.7, 6.0))?;
//!
//! for event in engine.poll_events() {
//!     if event.is_error() {
//!         eprintln!("{:?}", event);
//!     }
//! }
//!
//! engine.stop()?;
//! # Ok::<(), AuralisError>(())
//! ```
//!
//! ## Architecture
//!
//! 1. **Caller**: owns the [`Engine`], changes geometry through an [`EngineController`]
//! 2. **Render thread**: reads source blocks (or microphone capture), convolves, mixes and plays
//! 3. **Update thread**: regenerates responses when geometry is dirty and publishes them
//!
//! Responses cross from the update thread to the render thread through a single-slot
//! handoff owned by the convolution engine. The scene lock is only taken by control
//! calls and by the update thread.
//!
//! ## Collaborators
//!
//! - [`PlaybackDevice`]: [`CpalDevice`] for real hardware, [`OfflineDevice`] for tests
//! - [`ComputeBackend`]: [`CpuBackend`]
//! - [`ResponseGenerator`]: [`ImageSourceGenerator`] with a [`HeadModel`]
//!   ([`SphericalHead`], or `SteamAudioHead` with the `steam-audio` feature)

pub mod audio_data;
pub mod backend;
pub mod config;
pub mod convolution;
pub mod device;
pub mod engine;
pub mod error;
pub mod events;
pub mod format;
pub mod math;
pub mod response;
pub mod ring_buffer;
pub mod room;

pub use audio_data::{AudioStream, LoadOptions};
pub use backend::{
    BackendCapabilities, BackendSelection, ComputeBackend, CpuBackend, QueuePriority,
    SampleBuffer,
};
pub use config::{EngineDesc, SourceDesc};
pub use convolution::{
    ConvolutionMethod, ConvolutionParams, ConvolutionProcessor, PublishMode, PublishStatus,
    ResponsePublisher,
};
pub use device::{
    CpalDevice, DeviceConfig, DeviceIo, OfflineDevice, OfflineHandle, PlaybackDevice,
};
pub use engine::{Collaborators, Engine, EngineController, EngineState, EngineStats};
pub use error::{AuralisError, Result};
pub use events::EngineEvent;
pub use format::StreamFormat;
pub use math::{Orientation, Vec3};
pub use response::{
    GenerateOptions, HeadModel, ImageSourceGenerator, ImpulseResponsePair, ResponseGenerator,
    SphericalHead,
};
pub use ring_buffer::RingBuffer;
pub use room::{Listener, RoomGeometry, SoundSource, WallDamping};
