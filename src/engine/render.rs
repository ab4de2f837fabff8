use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use crate::backend::SampleBuffer;
use crate::config::PriorityHook;
use crate::convolution::ConvolutionProcessor;
use crate::device::DeviceIo;
use crate::engine::scene::Shared;
use crate::engine::source::SourceCursor;
use crate::error::Result;
use crate::events::{EngineEvent, EventSink};
use crate::format::{self, StreamFormat};

/// Everything the render thread owns. Built by `init`, moved into the thread by `run`.
pub(crate) struct RenderLoop {
    pub shared: Arc<Shared>,
    pub events: EventSink,
    pub io: Box<dyn DeviceIo>,
    pub processor: Box<dyn ConvolutionProcessor>,
    pub cursors: Vec<SourceCursor>,
    pub format: StreamFormat,
    pub block_size: usize,
    pub use_microphone: bool,
    pub poll_interval: Duration,
    pub priority: Option<PriorityHook>,
    pub bus_left: SampleBuffer,
    pub bus_right: SampleBuffer,
}

/// Per-block working memory, allocated once before the loop starts.
struct Scratch {
    /// Interleaved PCM per source
    pcm: Vec<Vec<u8>>,
    planar: Vec<Vec<f32>>,
    mono: Vec<Vec<f32>>,
    out_left: Vec<Vec<f32>>,
    out_right: Vec<Vec<f32>>,
    output: Vec<u8>,
}

enum Flow {
    Continue,
    Stop,
}

impl RenderLoop {
    pub fn run(mut self) {
        log::debug!("Render thread started");

        if let Some(hook) = self.priority.take() {
            if let Err(e) = hook() {
                log::warn!("Could not raise render thread priority, continuing: {}", e);
            }
        }

        if !self.wait_for_responses() {
            log::debug!("Render thread stopped before responses were ready");
            return;
        }

        let mut scratch = self.scratch();
        let mut block: u64 = 0;
        loop {
            if self.shared.flags.stop_requested() {
                break;
            }
            match self.render_block(&mut scratch, block) {
                Ok(Flow::Continue) => {
                    block += 1;
                    if block == 1 {
                        self.shared.flags.running.store(true, Ordering::Release);
                        self.events.emit(EngineEvent::RenderStarted);
                    }
                }
                Ok(Flow::Stop) => break,
                Err(e) => {
                    log::error!("Render thread halted: {}", e);
                    self.events.emit(EngineEvent::RenderFailed {
                        error: e.to_string(),
                    });
                    break;
                }
            }
        }

        log::debug!("Render thread exiting after {} blocks", block);
    }

    fn scratch(&self) -> Scratch {
        let sources = self.cursors.len();
        let block_bytes = self.block_size * self.format.frame_bytes();
        Scratch {
            pcm: vec![vec![0; block_bytes]; sources],
            planar: vec![vec![0.0; self.block_size]; self.format.channels as usize],
            mono: vec![vec![0.0; self.block_size]; sources],
            out_left: vec![vec![0.0; self.block_size]; sources],
            out_right: vec![vec![0.0; self.block_size]; sources],
            output: vec![0; self.block_size * 2 * self.format.bytes_per_sample()],
        }
    }

    /// Sleeps until the first response set is published. False if stopped first.
    fn wait_for_responses(&self) -> bool {
        let flags = &self.shared.flags;
        while !flags.responses_ready.load(Ordering::Acquire) {
            if flags.stop_requested() {
                return false;
            }
            thread::sleep(self.poll_interval);
        }
        true
    }

    fn render_block(&mut self, scratch: &mut Scratch, block: u64) -> Result<Flow> {
        let frames = self.block_size;

        for (cursor, pcm) in self.cursors.iter().zip(scratch.pcm.iter_mut()) {
            cursor.peek_block(pcm);
        }
        if self.use_microphone {
            if let Flow::Stop = self.capture_block(&mut scratch.pcm[0])? {
                return Ok(Flow::Stop);
            }
        }

        for (pcm, mono) in scratch.pcm.iter().zip(scratch.mono.iter_mut()) {
            format::deinterleave(pcm, self.format, frames, &mut scratch.planar)?;
            format::downmix(&scratch.planar, frames, mono);
        }

        self.processor.process(
            &scratch.mono,
            &mut scratch.out_left,
            &mut scratch.out_right,
            frames,
        )?;

        mix(&scratch.out_left, self.bus_left.as_mut_slice(), frames);
        mix(&scratch.out_right, self.bus_right.as_mut_slice(), frames);
        self.bus_left.synchronize();
        self.bus_right.synchronize();

        let report = format::interleave_stereo(
            &self.bus_left.as_slice()[..frames],
            &self.bus_right.as_slice()[..frames],
            self.format.bits_per_sample,
            &mut scratch.output,
        )?;
        if report.clipped() {
            self.report_clipping(block, report.clipped_samples);
        }

        let played = self.write_output(&scratch.output)?;
        let frames_played = played / (2 * self.format.bytes_per_sample());
        // A microphone-fed source 0 keeps its file position.
        let skip = usize::from(self.use_microphone);
        for cursor in self.cursors.iter_mut().skip(skip) {
            cursor.advance(frames_played);
        }
        self.shared
            .stats
            .blocks_rendered
            .fetch_add(1, Ordering::Relaxed);

        Ok(if played == scratch.output.len() {
            Flow::Continue
        } else {
            Flow::Stop
        })
    }

    /// Fills `block` from the capture path, polling until it is full or stop is requested.
    fn capture_block(&mut self, block: &mut [u8]) -> Result<Flow> {
        let mut filled = 0;
        while filled < block.len() {
            if self.shared.flags.stop_requested() {
                return Ok(Flow::Stop);
            }
            let read = self.io.record(&mut block[filled..])?;
            filled += read;
            if read == 0 {
                thread::sleep(self.poll_interval);
            }
        }
        Ok(Flow::Continue)
    }

    /// Writes until the whole block is accepted or stop is requested; returns bytes played.
    fn write_output(&mut self, output: &[u8]) -> Result<usize> {
        let mut written = 0;
        while written < output.len() {
            let accepted = self.io.play(&output[written..])?;
            written += accepted;
            if written < output.len() && accepted == 0 {
                if self.shared.flags.stop_requested() {
                    break;
                }
                thread::sleep(self.poll_interval);
            }
        }
        Ok(written)
    }

    fn report_clipping(&self, block: u64, samples: usize) {
        let clipped = self
            .shared
            .stats
            .clipped_blocks
            .fetch_add(1, Ordering::Relaxed)
            + 1;
        if clipped == 1 || clipped % 100 == 0 {
            log::warn!(
                "Output clipped in block {} ({} samples, {} clipped blocks so far)",
                block,
                samples,
                clipped
            );
        }
        self.events.emit(EngineEvent::Clipping { block, samples });
    }
}

/// Sums every source's channel into `bus`.
fn mix(channels: &[Vec<f32>], bus: &mut [f32], frames: usize) {
    let bus = &mut bus[..frames];
    bus.fill(0.0);
    for channel in channels {
        for (acc, sample) in bus.iter_mut().zip(&channel[..frames]) {
            *acc += sample;
        }
    }
}
