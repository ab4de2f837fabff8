use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use crate::convolution::{PublishMode, PublishStatus, ResponsePublisher};
use crate::engine::scene::{Scene, Shared};
use crate::error::Result;
use crate::events::{EngineEvent, EventSink};
use crate::response::{GenerateOptions, ImpulseResponsePair, ResponseGenerator};

/// Regenerates and publishes responses. Used once synchronously by `init`, then owned
/// by the update thread.
pub(crate) struct Updater {
    pub publisher: Box<dyn ResponsePublisher>,
    pub generator: Box<dyn ResponseGenerator>,
    pub options: GenerateOptions,
    pub sample_rate: u32,
    pub responses: Vec<ImpulseResponsePair>,
    pub generation: u64,
}

impl Updater {
    pub fn new(
        publisher: Box<dyn ResponsePublisher>,
        generator: Box<dyn ResponseGenerator>,
        options: GenerateOptions,
        sample_rate: u32,
        sources: usize,
        fft_length: usize,
    ) -> Self {
        Self {
            publisher,
            generator,
            options,
            sample_rate,
            responses: vec![ImpulseResponsePair::silent(fft_length); sources],
            generation: 0,
        }
    }

    /// Fills `responses` with one pair per source from `scene`.
    pub fn regenerate(&mut self, scene: &Scene) -> Result<()> {
        for (source, response) in scene.sources.iter().zip(self.responses.iter_mut()) {
            self.generator.generate(
                &scene.room,
                source,
                &scene.listener,
                self.sample_rate,
                response,
                &self.options,
            )?;
        }
        Ok(())
    }

    pub fn publish(&mut self, mode: PublishMode) -> Result<PublishStatus> {
        let status = self.publisher.update_responses(&self.responses, mode)?;
        if status == PublishStatus::Published {
            self.generation += 1;
        }
        Ok(status)
    }
}

pub(crate) struct UpdateLoop {
    pub shared: Arc<Shared>,
    pub events: EventSink,
    pub updater: Updater,
    pub publish_mode: PublishMode,
    pub poll_interval: Duration,
}

impl UpdateLoop {
    pub fn run(mut self) {
        log::debug!("Update thread started");
        let shared = self.shared.clone();
        let flags = &shared.flags;

        while !flags.stop_requested() {
            if !flags.take_dirty() {
                thread::sleep(self.poll_interval);
                continue;
            }

            // Dirty was cleared before the snapshot, so a change racing this pass marks it again.
            let scene = shared.snapshot_for_update();
            match self.update(&scene) {
                Ok(Some(generation)) => {
                    flags.responses_ready.store(true, Ordering::Release);
                    shared
                        .stats
                        .responses_published
                        .fetch_add(1, Ordering::Relaxed);
                    log::debug!("Published response set {}", generation);
                    self.events
                        .emit(EngineEvent::ResponsesPublished { generation });
                }
                // Input full or stopping; wait for the next wake before retrying.
                Ok(None) => thread::sleep(self.poll_interval),
                Err(e) => {
                    if flags.stop_requested() {
                        break;
                    }
                    log::warn!("Response update failed, keeping previous responses: {}", e);
                    self.events.emit(EngineEvent::UpdateFailed {
                        error: e.to_string(),
                    });
                }
            }
        }

        log::debug!(
            "Update thread exiting after {} publishes",
            self.updater.generation
        );
    }

    /// Regenerates and publishes; `None` when nothing was published this pass.
    fn update(&mut self, scene: &Scene) -> Result<Option<u64>> {
        self.updater.regenerate(scene)?;

        let flags = &self.shared.flags;
        loop {
            match self.updater.publish(self.publish_mode)? {
                PublishStatus::Published => return Ok(Some(self.updater.generation)),
                PublishStatus::InputFull if self.publish_mode == PublishMode::NonBlocking => {
                    log::debug!("Convolution input full, retrying on the next pass");
                    flags.mark_dirty();
                    return Ok(None);
                }
                PublishStatus::InputFull => {
                    if flags.stop_requested() {
                        return Ok(None);
                    }
                    thread::sleep(self.poll_interval);
                }
            }
        }
    }
}
