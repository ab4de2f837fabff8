use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::convolution::{
    ConvolutionParams, ConvolutionProcessor, HandoffReceiver, HandoffSender, PublishMode,
    PublishStatus, ResponsePublisher, check_process_args, check_responses,
};
use crate::error::Result;
use crate::response::ImpulseResponsePair;

/// Response spectra for every output channel, `[source * 2 + ear]`.
pub(crate) type SpectrumSet = Vec<Vec<Complex<f32>>>;

/// Overlap-add convolution over a single partition of `2 * fft_length` points.
///
/// Each block is zero-padded, transformed, multiplied by both ear spectra, transformed
/// back and added into a per-channel accumulator. The first `sample_count` accumulator
/// samples are emitted and the accumulator shifts down by the same amount.
pub struct OverlapAddProcessor {
    params: ConvolutionParams,
    size: usize,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    receiver: HandoffReceiver<SpectrumSet>,
    spectra: Option<SpectrumSet>,

    input_spectrum: Vec<Complex<f32>>,
    product: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    accumulators: Vec<Vec<f32>>,
}

impl OverlapAddProcessor {
    pub fn new(params: &ConvolutionParams, receiver: HandoffReceiver<SpectrumSet>) -> Self {
        let size = params.fft_length * 2;
        let mut planner = FftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(size);
        let inverse = planner.plan_fft_inverse(size);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());

        Self {
            params: *params,
            size,
            forward,
            inverse,
            receiver,
            spectra: None,
            input_spectrum: vec![Complex::default(); size],
            product: vec![Complex::default(); size],
            scratch: vec![Complex::default(); scratch_len],
            accumulators: vec![vec![0.0; size]; params.channel_count],
        }
    }

    /// Multiplies the current input spectrum with `kernel` and adds the result into `accumulator`.
    fn accumulate(&mut self, kernel: &[Complex<f32>], channel: usize) {
        for ((out, x), h) in self.product.iter_mut().zip(&self.input_spectrum).zip(kernel) {
            *out = x * h;
        }
        self.inverse
            .process_with_scratch(&mut self.product, &mut self.scratch);

        let norm = 1.0 / self.size as f32;
        for (acc, y) in self.accumulators[channel].iter_mut().zip(&self.product) {
            *acc += y.re * norm;
        }
    }

    fn drain(&mut self, channel: usize, out: &mut [f32], sample_count: usize) {
        let acc = &mut self.accumulators[channel];
        out[..sample_count].copy_from_slice(&acc[..sample_count]);
        acc.copy_within(sample_count.., 0);
        let size = acc.len();
        acc[size - sample_count..].fill(0.0);
    }
}

impl ConvolutionProcessor for OverlapAddProcessor {
    fn process(
        &mut self,
        inputs: &[Vec<f32>],
        out_left: &mut [Vec<f32>],
        out_right: &mut [Vec<f32>],
        sample_count: usize,
    ) -> Result<()> {
        check_process_args(&self.params, inputs, out_left, out_right, sample_count)?;

        if let Some(spectra) = self.receiver.take_latest() {
            self.spectra = Some(spectra);
        }
        let Some(spectra) = self.spectra.take() else {
            for out in out_left.iter_mut().chain(out_right.iter_mut()) {
                out[..sample_count].fill(0.0);
            }
            return Ok(());
        };

        for (source, input) in inputs.iter().enumerate() {
            for (slot, sample) in self.input_spectrum.iter_mut().enumerate() {
                let re = if slot < sample_count { input[slot] } else { 0.0 };
                *sample = Complex::new(re, 0.0);
            }
            self.forward
                .process_with_scratch(&mut self.input_spectrum, &mut self.scratch);

            self.accumulate(&spectra[source * 2], source * 2);
            self.accumulate(&spectra[source * 2 + 1], source * 2 + 1);

            self.drain(source * 2, &mut out_left[source], sample_count);
            self.drain(source * 2 + 1, &mut out_right[source], sample_count);
        }

        self.spectra = Some(spectra);
        Ok(())
    }
}

/// Transforms published responses into spectra on the calling thread.
pub struct OverlapAddPublisher {
    params: ConvolutionParams,
    size: usize,
    forward: Arc<dyn Fft<f32>>,
    scratch: Vec<Complex<f32>>,
    sender: HandoffSender<SpectrumSet>,
}

impl OverlapAddPublisher {
    pub fn new(params: &ConvolutionParams, sender: HandoffSender<SpectrumSet>) -> Self {
        let size = params.fft_length * 2;
        let forward = FftPlanner::<f32>::new().plan_fft_forward(size);
        let scratch = vec![Complex::default(); forward.get_inplace_scratch_len()];
        Self {
            params: *params,
            size,
            forward,
            scratch,
            sender,
        }
    }

    fn spectrum(&mut self, response: &[f32]) -> Vec<Complex<f32>> {
        let mut spectrum: Vec<Complex<f32>> = response
            .iter()
            .map(|s| Complex::new(*s, 0.0))
            .chain(std::iter::repeat(Complex::default()))
            .take(self.size)
            .collect();
        self.forward
            .process_with_scratch(&mut spectrum, &mut self.scratch);
        spectrum
    }
}

impl ResponsePublisher for OverlapAddPublisher {
    fn update_responses(
        &mut self,
        responses: &[ImpulseResponsePair],
        mode: PublishMode,
    ) -> Result<PublishStatus> {
        check_responses(&self.params, responses)?;
        if mode == PublishMode::NonBlocking && self.sender.is_pending() {
            return Ok(PublishStatus::InputFull);
        }

        let mut spectra = Vec::with_capacity(self.params.channel_count);
        for pair in responses {
            spectra.push(self.spectrum(&pair.left));
            spectra.push(self.spectrum(&pair.right));
        }
        let status = self.sender.publish(spectra, mode)?;
        log::debug!("Overlap-add publish: {:?}", status);
        Ok(status)
    }
}
