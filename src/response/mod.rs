//! Impulse response generation.
//!
//! A [`ResponseGenerator`] turns the room, one source and the listener into a stereo
//! impulse response whose length is the convolution FFT length. The update thread owns
//! its generator exclusively; `init` borrows it once for the synchronous first pass.

mod head;
mod image_source;
#[cfg(feature = "steam-audio")]
mod steam;

pub use head::{Arrival, HeadModel, SphericalHead};
pub use image_source::ImageSourceGenerator;
#[cfg(feature = "steam-audio")]
pub use steam::SteamAudioHead;

use crate::error::Result;
use crate::room::{Listener, RoomGeometry, SoundSource};

/// Left and right impulse responses for one source.
#[derive(Debug, Clone, PartialEq)]
pub struct ImpulseResponsePair {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

impl ImpulseResponsePair {
    /// A silent pair of `len` samples per ear.
    pub fn silent(len: usize) -> Self {
        Self {
            left: vec![0.0; len],
            right: vec![0.0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    pub fn clear(&mut self) {
        self.left.fill(0.0);
        self.right.fill(0.0);
    }

    /// Peak absolute sample over both ears.
    pub fn peak(&self) -> f32 {
        self.left
            .iter()
            .chain(self.right.iter())
            .fold(0.0f32, |peak, s| peak.max(s.abs()))
    }
}

/// Knobs forwarded unchanged from the engine configuration to every generate call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerateOptions {
    /// Highest reflection order to render
    pub max_bounces: u32,
    /// Leave out the direct source-to-ear path, keeping reflections only
    pub suppress_direct_path: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            max_bounces: 3,
            suppress_direct_path: false,
        }
    }
}

/// Computes a stereo impulse response from room, source and listener state.
pub trait ResponseGenerator: Send {
    /// Overwrites `out` with the response; its length is the FFT length.
    ///
    /// Identical inputs must produce bit-identical output.
    fn generate(
        &mut self,
        room: &RoomGeometry,
        source: &SoundSource,
        listener: &Listener,
        sample_rate: u32,
        out: &mut ImpulseResponsePair,
        options: &GenerateOptions,
    ) -> Result<()>;
}
