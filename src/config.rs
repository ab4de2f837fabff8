//! Configuration for auralis

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::BackendSelection;
use crate::convolution::{ConvolutionMethod, PublishMode};
use crate::error::{AuralisError, Result};
use crate::math::Vec3;
use crate::room::{Listener, RoomGeometry};

/// Hook run on the render thread before its first block, typically to raise its
/// scheduling priority. A failure is logged and the thread carries on.
pub type PriorityHook = Arc<dyn Fn() -> Result<()> + Send + Sync>;

/// Initial placement of one source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceDesc {
    pub position: Vec3,
}

impl SourceDesc {
    pub fn at(position: Vec3) -> Self {
        Self { position }
    }
}

#[derive(Clone)]
pub struct EngineDesc {
    /// Impulse response length in samples; a power of two no smaller than `block_size`
    pub fft_length: usize,
    /// Frames rendered per block
    pub block_size: usize,
    /// Replace source 0's input with microphone capture
    pub use_microphone: bool,
    /// Per source: pin the source to the listener position on every update
    pub head_tracking: Vec<bool>,
    /// Initial source positions; sources without an entry start at the room centre
    pub sources: Vec<SourceDesc>,
    pub max_bounces: u32,
    pub suppress_direct_path: bool,
    pub publish_mode: PublishMode,
    pub convolution_method: ConvolutionMethod,
    pub backend: BackendSelection,
    /// Sleep between polls in both engine threads
    pub poll_interval: Duration,
    /// Capture ring capacity, in blocks
    pub capture_blocks: usize,
    pub room: RoomGeometry,
    pub listener: Listener,
    pub render_priority: Option<PriorityHook>,
}

impl Default for EngineDesc {
    fn default() -> Self {
        Self {
            fft_length: 8192,
            block_size: 512,
            use_microphone: false,
            head_tracking: Vec::new(),
            sources: Vec::new(),
            max_bounces: 3,
            suppress_direct_path: false,
            publish_mode: PublishMode::Blocking,
            convolution_method: ConvolutionMethod::OverlapAdd,
            backend: BackendSelection::default(),
            poll_interval: Duration::from_millis(2),
            capture_blocks: 16,
            room: RoomGeometry::default(),
            listener: Listener::default(),
            render_priority: None,
        }
    }
}

impl fmt::Debug for EngineDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineDesc")
            .field("fft_length", &self.fft_length)
            .field("block_size", &self.block_size)
            .field("use_microphone", &self.use_microphone)
            .field("head_tracking", &self.head_tracking)
            .field("sources", &self.sources)
            .field("max_bounces", &self.max_bounces)
            .field("suppress_direct_path", &self.suppress_direct_path)
            .field("publish_mode", &self.publish_mode)
            .field("convolution_method", &self.convolution_method)
            .field("backend", &self.backend)
            .field("poll_interval", &self.poll_interval)
            .field("capture_blocks", &self.capture_blocks)
            .field("room", &self.room)
            .field("listener", &self.listener)
            .field("render_priority", &self.render_priority.is_some())
            .finish()
    }
}

impl EngineDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fft_length(mut self, length: usize) -> Self {
        self.fft_length = length;
        self
    }

    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    pub fn use_microphone(mut self, enable: bool) -> Self {
        self.use_microphone = enable;
        self
    }

    pub fn head_tracking(mut self, flags: Vec<bool>) -> Self {
        self.head_tracking = flags;
        self
    }

    pub fn sources(mut self, sources: Vec<SourceDesc>) -> Self {
        self.sources = sources;
        self
    }

    pub fn max_bounces(mut self, bounces: u32) -> Self {
        self.max_bounces = bounces;
        self
    }

    pub fn suppress_direct_path(mut self, suppress: bool) -> Self {
        self.suppress_direct_path = suppress;
        self
    }

    pub fn publish_mode(mut self, mode: PublishMode) -> Self {
        self.publish_mode = mode;
        self
    }

    pub fn convolution_method(mut self, method: ConvolutionMethod) -> Self {
        self.convolution_method = method;
        self
    }

    pub fn backend(mut self, selection: BackendSelection) -> Self {
        self.backend = selection;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn capture_blocks(mut self, blocks: usize) -> Self {
        self.capture_blocks = blocks;
        self
    }

    pub fn room(mut self, room: RoomGeometry) -> Self {
        self.room = room;
        self
    }

    pub fn listener(mut self, listener: Listener) -> Self {
        self.listener = listener;
        self
    }

    pub fn render_priority<F>(mut self, hook: F) -> Self
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        self.render_priority = Some(Arc::new(hook));
        self
    }

    /// Position of source `index` at init.
    pub fn source_position(&self, index: usize) -> Vec3 {
        self.sources
            .get(index)
            .map(|source| source.position)
            .unwrap_or_else(|| self.room.dimensions() * 0.5)
    }

    /// Checks everything that does not depend on the input streams.
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(AuralisError::Configuration("Block size must be non-zero".into()));
        }
        if !self.fft_length.is_power_of_two() {
            return Err(AuralisError::Configuration(format!(
                "FFT length {} is not a power of two",
                self.fft_length
            )));
        }
        if self.fft_length < self.block_size {
            return Err(AuralisError::Configuration(format!(
                "FFT length {} is shorter than block size {}",
                self.fft_length, self.block_size
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(AuralisError::Configuration("Poll interval must be non-zero".into()));
        }
        if self.capture_blocks == 0 {
            return Err(AuralisError::Configuration(
                "Capture ring must hold at least one block".into(),
            ));
        }

        self.room.validate()?;
        self.listener.validate(&self.room)?;
        for (i, source) in self.sources.iter().enumerate() {
            if !self.room.contains(source.position) {
                return Err(AuralisError::Configuration(format!(
                    "Source {} at {:?} lies outside the room",
                    i, source.position
                )));
            }
        }
        Ok(())
    }

    /// Checks the parts of the configuration that are sized by the stream count.
    pub fn validate_for_streams(&self, stream_count: usize) -> Result<()> {
        if stream_count == 0 {
            return Err(AuralisError::Configuration(
                "At least one input stream is required".into(),
            ));
        }
        if self.head_tracking.len() > stream_count {
            return Err(AuralisError::Configuration(format!(
                "{} head-tracking flags given for {} streams",
                self.head_tracking.len(),
                stream_count
            )));
        }
        if self.sources.len() > stream_count {
            return Err(AuralisError::Configuration(format!(
                "{} source descriptions given for {} streams",
                self.sources.len(),
                stream_count
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let desc = EngineDesc::default();
        assert_eq!(desc.fft_length, 8192);
        assert_eq!(desc.block_size, 512);
        assert_eq!(desc.max_bounces, 3);
        assert_eq!(desc.publish_mode, PublishMode::Blocking);
        assert_eq!(desc.poll_interval, Duration::from_millis(2));
        assert!(desc.validate().is_ok());
    }

    #[test]
    fn fft_length_must_cover_block() {
        assert!(EngineDesc::new().fft_length(256).validate().is_err());
        assert!(EngineDesc::new().fft_length(3000).validate().is_err());
        assert!(EngineDesc::new().block_size(0).validate().is_err());
        assert!(EngineDesc::new().fft_length(512).validate().is_ok());
    }

    #[test]
    fn stream_sized_checks() {
        let desc = EngineDesc::new().head_tracking(vec![true, false, false]);
        assert!(desc.validate_for_streams(0).is_err());
        assert!(desc.validate_for_streams(2).is_err());
        assert!(desc.validate_for_streams(3).is_ok());
    }

    #[test]
    fn sources_outside_room_are_rejected() {
        let desc = EngineDesc::new().sources(vec![SourceDesc::at(Vec3::new(50.0, 1.0, 1.0))]);
        assert!(desc.validate().is_err());
    }

    #[test]
    fn missing_sources_start_at_room_centre() {
        let desc = EngineDesc::new().sources(vec![SourceDesc::at(Vec3::new(1.0, 1.0, 1.0))]);
        assert_eq!(desc.source_position(0), Vec3::new(1.0, 1.0, 1.0));
        assert_eq!(desc.source_position(1), Vec3::new(3.0, 2.0, 5.0));
    }
}
