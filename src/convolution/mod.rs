//! Block convolution of live source audio against published impulse responses.
//!
//! The engine is split in two halves. The [`ConvolutionProcessor`] lives on the render
//! thread and the [`ResponsePublisher`] on the update thread; they meet at a single-slot
//! handoff, so new responses are picked up between blocks and never mid-block.

mod handoff;
mod overlap_add;
mod time_domain;

pub use handoff::{HandoffReceiver, HandoffSender, handoff};
pub use overlap_add::{OverlapAddProcessor, OverlapAddPublisher};
pub use time_domain::{TimeDomainProcessor, TimeDomainPublisher};

use crate::error::{AuralisError, Result};
use crate::response::ImpulseResponsePair;

/// Convolution algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConvolutionMethod {
    /// FFT overlap-add over one partition of twice the response length
    #[default]
    OverlapAdd,
    /// Direct time-domain sum; slow, used as a reference
    TimeDomain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvolutionParams {
    pub method: ConvolutionMethod,
    /// Impulse response length, a power of two
    pub fft_length: usize,
    /// Largest number of samples passed to one `process` call
    pub block_size: usize,
    /// Output channels, two per source
    pub channel_count: usize,
}

impl ConvolutionParams {
    pub fn source_count(&self) -> usize {
        self.channel_count / 2
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(AuralisError::Convolution("Block size must be non-zero".into()));
        }
        if !self.fft_length.is_power_of_two() || self.fft_length < self.block_size {
            return Err(AuralisError::Convolution(format!(
                "FFT length {} must be a power of two no smaller than block size {}",
                self.fft_length, self.block_size
            )));
        }
        if self.channel_count == 0 || self.channel_count % 2 != 0 {
            return Err(AuralisError::Convolution(format!(
                "Channel count {} must be a positive multiple of two",
                self.channel_count
            )));
        }
        Ok(())
    }
}

/// How `update_responses` behaves when the previous set has not been consumed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublishMode {
    /// Wait until the render side takes the pending set
    #[default]
    Blocking,
    /// Return [`PublishStatus::InputFull`] immediately
    NonBlocking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStatus {
    Published,
    /// The slot still holds an unconsumed set; nothing was published
    InputFull,
}

/// Render-thread half of a convolution engine.
pub trait ConvolutionProcessor: Send {
    /// Convolves one block per source with the latest published responses.
    ///
    /// `inputs[i]` is source `i`'s mono block; `out_left[i]` and `out_right[i]` receive
    /// its two ears. All slices hold at least `sample_count` samples. Until a set has
    /// been published the outputs are silent.
    fn process(
        &mut self,
        inputs: &[Vec<f32>],
        out_left: &mut [Vec<f32>],
        out_right: &mut [Vec<f32>],
        sample_count: usize,
    ) -> Result<()>;
}

/// Update-thread half of a convolution engine.
pub trait ResponsePublisher: Send {
    /// Hands a complete set of responses, one pair per source, to the processor.
    fn update_responses(
        &mut self,
        responses: &[ImpulseResponsePair],
        mode: PublishMode,
    ) -> Result<PublishStatus>;
}

/// Builds a connected processor/publisher pair on the host.
pub fn host_convolution(
    params: &ConvolutionParams,
) -> Result<(Box<dyn ConvolutionProcessor>, Box<dyn ResponsePublisher>)> {
    params.validate()?;

    log::info!(
        "Creating {:?} convolution ({} sources, fft {}, block {})",
        params.method,
        params.source_count(),
        params.fft_length,
        params.block_size
    );

    let pair: (Box<dyn ConvolutionProcessor>, Box<dyn ResponsePublisher>) =
        match params.method {
            ConvolutionMethod::OverlapAdd => {
                let (sender, receiver) = handoff();
                (
                    Box::new(OverlapAddProcessor::new(params, receiver)),
                    Box::new(OverlapAddPublisher::new(params, sender)),
                )
            }
            ConvolutionMethod::TimeDomain => {
                let (sender, receiver) = handoff();
                (
                    Box::new(TimeDomainProcessor::new(params, receiver)),
                    Box::new(TimeDomainPublisher::new(params, sender)),
                )
            }
        };
    Ok(pair)
}

/// Shared argument checks for `process`.
pub(crate) fn check_process_args(
    params: &ConvolutionParams,
    inputs: &[Vec<f32>],
    out_left: &[Vec<f32>],
    out_right: &[Vec<f32>],
    sample_count: usize,
) -> Result<()> {
    let sources = params.source_count();
    if inputs.len() != sources || out_left.len() != sources || out_right.len() != sources {
        return Err(AuralisError::Convolution(format!(
            "Expected {} sources, got {} inputs and {}/{} outputs",
            sources,
            inputs.len(),
            out_left.len(),
            out_right.len()
        )));
    }
    if sample_count > params.block_size {
        return Err(AuralisError::Convolution(format!(
            "Block of {} samples exceeds configured block size {}",
            sample_count, params.block_size
        )));
    }
    let short = inputs
        .iter()
        .chain(out_left)
        .chain(out_right)
        .any(|buffer| buffer.len() < sample_count);
    if short {
        return Err(AuralisError::Convolution(format!(
            "Buffers must hold {} samples",
            sample_count
        )));
    }
    Ok(())
}

/// Shared argument checks for `update_responses`.
pub(crate) fn check_responses(
    params: &ConvolutionParams,
    responses: &[ImpulseResponsePair],
) -> Result<()> {
    if responses.len() != params.source_count() {
        return Err(AuralisError::Convolution(format!(
            "Expected {} response pairs, got {}",
            params.source_count(),
            responses.len()
        )));
    }
    for (i, pair) in responses.iter().enumerate() {
        if pair.left.len() != params.fft_length || pair.right.len() != params.fft_length {
            return Err(AuralisError::Convolution(format!(
                "Response {} has {}/{} samples, expected {}",
                i,
                pair.left.len(),
                pair.right.len(),
                params.fft_length
            )));
        }
    }
    Ok(())
}
