use crate::convolution::{
    ConvolutionParams, ConvolutionProcessor, HandoffReceiver, HandoffSender, PublishMode,
    PublishStatus, ResponsePublisher, check_process_args, check_responses,
};
use crate::error::Result;
use crate::response::ImpulseResponsePair;

/// Responses for every output channel, `[source * 2 + ear]`.
pub(crate) type ResponseSet = Vec<Vec<f32>>;

/// Direct convolution sum. Keeps the last `fft_length - 1` input samples per source.
pub struct TimeDomainProcessor {
    params: ConvolutionParams,
    receiver: HandoffReceiver<ResponseSet>,
    responses: Option<ResponseSet>,
    /// Per source: history followed by the current block
    windows: Vec<Vec<f32>>,
}

impl TimeDomainProcessor {
    pub fn new(params: &ConvolutionParams, receiver: HandoffReceiver<ResponseSet>) -> Self {
        let history = params.fft_length - 1;
        Self {
            params: *params,
            receiver,
            responses: None,
            windows: vec![vec![0.0; history + params.block_size]; params.source_count()],
        }
    }
}

fn convolve_into(window: &[f32], history: usize, kernel: &[f32], out: &mut [f32]) {
    for (n, sample) in out.iter_mut().enumerate() {
        let newest = history + n;
        *sample = kernel
            .iter()
            .enumerate()
            .map(|(k, h)| h * window[newest - k])
            .sum();
    }
}

impl ConvolutionProcessor for TimeDomainProcessor {
    fn process(
        &mut self,
        inputs: &[Vec<f32>],
        out_left: &mut [Vec<f32>],
        out_right: &mut [Vec<f32>],
        sample_count: usize,
    ) -> Result<()> {
        check_process_args(&self.params, inputs, out_left, out_right, sample_count)?;

        if let Some(responses) = self.receiver.take_latest() {
            self.responses = Some(responses);
        }

        let history = self.params.fft_length - 1;
        for (source, input) in inputs.iter().enumerate() {
            let window = &mut self.windows[source];
            window[history..history + sample_count].copy_from_slice(&input[..sample_count]);

            match &self.responses {
                Some(responses) => {
                    convolve_into(
                        window,
                        history,
                        &responses[source * 2],
                        &mut out_left[source][..sample_count],
                    );
                    convolve_into(
                        window,
                        history,
                        &responses[source * 2 + 1],
                        &mut out_right[source][..sample_count],
                    );
                }
                None => {
                    out_left[source][..sample_count].fill(0.0);
                    out_right[source][..sample_count].fill(0.0);
                }
            }

            window.copy_within(sample_count..sample_count + history, 0);
        }
        Ok(())
    }
}

pub struct TimeDomainPublisher {
    params: ConvolutionParams,
    sender: HandoffSender<ResponseSet>,
}

impl TimeDomainPublisher {
    pub fn new(params: &ConvolutionParams, sender: HandoffSender<ResponseSet>) -> Self {
        Self {
            params: *params,
            sender,
        }
    }
}

impl ResponsePublisher for TimeDomainPublisher {
    fn update_responses(
        &mut self,
        responses: &[ImpulseResponsePair],
        mode: PublishMode,
    ) -> Result<PublishStatus> {
        check_responses(&self.params, responses)?;
        let set = responses
            .iter()
            .flat_map(|pair| [pair.left.clone(), pair.right.clone()])
            .collect();
        self.sender.publish(set, mode)
    }
}
