use std::f32::consts::TAU;
use std::thread;
use std::time::{Duration, Instant};

use auralis::*;

const RATE: u32 = 48_000;
const BLOCK: usize = 256;
/// Interleaved 16-bit stereo bytes of one rendered block
const OUTPUT_BLOCK_BYTES: usize = BLOCK * 2 * 2;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn mono_format() -> StreamFormat {
    StreamFormat::new(RATE, 16, 1)
}

fn sine(name: &str, frames: usize) -> AudioStream {
    let samples: Vec<f32> = (0..frames)
        .map(|i| 0.02 * (TAU * 440.0 * i as f32 / RATE as f32).sin())
        .collect();
    AudioStream::from_f32(name, mono_format(), &samples).unwrap()
}

fn silence(name: &str, frames: usize) -> AudioStream {
    AudioStream::from_pcm(name, mono_format(), vec![0; frames * 2]).unwrap()
}

fn small_desc() -> EngineDesc {
    EngineDesc::default()
        .fft_length(1024)
        .block_size(BLOCK)
        .max_bounces(2)
        .poll_interval(Duration::from_millis(1))
}

fn collaborators(device: OfflineDevice) -> Collaborators {
    Collaborators::new(device, CpuBackend::new(), ImageSourceGenerator::new())
}

/// Polls `condition` until it holds or five seconds pass.
fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

fn decode_i16(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

#[test]
fn mismatched_sample_rates_fail_before_opening_the_device() {
    init_logging();
    let device = OfflineDevice::new();
    let handle = device.handle();

    let odd = AudioStream::from_pcm("odd", StreamFormat::new(44_100, 16, 1), vec![0; 512]).unwrap();
    let result = Engine::init(small_desc(), vec![sine("a", 4096), odd], collaborators(device));

    match result {
        Err(AuralisError::FormatMismatch { mismatches }) => assert_eq!(mismatches.len(), 1),
        Err(e) => panic!("expected a format mismatch, got {}", e),
        Ok(_) => panic!("init accepted mismatched streams"),
    }
    assert!(handle.config().is_none());
    assert!(!handle.is_open());
}

#[test]
fn run_plays_and_stop_joins_both_threads() {
    init_logging();
    let device = OfflineDevice::new();
    let handle = device.handle();

    let mut engine = Engine::init(
        small_desc(),
        vec![sine("a", 4096), sine("b", 3000)],
        collaborators(device),
    )
    .unwrap();
    assert_eq!(engine.state(), EngineState::Initialized);
    assert!(!engine.is_running());
    assert!(handle.is_open());

    let config = handle.config().unwrap();
    assert_eq!(config.sample_rate, RATE);
    assert_eq!(config.play_channels, 2);
    assert!(!config.want_record);

    engine.run().unwrap();
    assert!(engine.is_running());
    assert_eq!(engine.state(), EngineState::Running);
    assert!(handle.played_len() >= OUTPUT_BLOCK_BYTES);

    assert!(wait_for(|| engine.stats().blocks_rendered >= 4));
    engine.stop().unwrap();

    assert_eq!(engine.state(), EngineState::Stopped);
    assert!(!engine.is_running());
    assert!(!handle.is_open());

    let calls = handle.io_calls();
    thread::sleep(Duration::from_millis(20));
    assert_eq!(handle.io_calls(), calls);

    let played = decode_i16(&handle.take_played());
    assert!(played.iter().any(|&sample| sample != 0));

    let events = engine.poll_events();
    assert_eq!(events.first(), Some(&EngineEvent::ResponsesPublished { generation: 1 }));
    assert!(events.contains(&EngineEvent::RenderStarted));
    assert_eq!(events.last(), Some(&EngineEvent::EngineStopped));
}

#[test]
fn lifecycle_calls_out_of_order_are_rejected_or_ignored() {
    init_logging();
    let mut engine =
        Engine::init(small_desc(), vec![sine("a", 2048)], collaborators(OfflineDevice::new()))
            .unwrap();

    engine.run().unwrap();
    assert!(matches!(engine.run(), Err(AuralisError::InvalidState(_))));

    engine.stop().unwrap();
    engine.stop().unwrap();
    assert!(matches!(engine.run(), Err(AuralisError::InvalidState(_))));

    engine.close().unwrap();
    engine.close().unwrap();
    assert_eq!(engine.state(), EngineState::Closed);
}

#[test]
fn stop_before_run_closes_the_device() {
    init_logging();
    let device = OfflineDevice::new();
    let handle = device.handle();
    let mut engine =
        Engine::init(small_desc(), vec![sine("a", 2048)], collaborators(device)).unwrap();

    engine.stop().unwrap();
    assert_eq!(engine.state(), EngineState::Stopped);
    assert!(!handle.is_open());
    assert_eq!(handle.io_calls(), 0);
}

/// Renders a few blocks with a silent file source and returns the decoded output.
fn render_with_silent_source(use_microphone: bool) -> Vec<i16> {
    let device = OfflineDevice::new();
    let handle = device.handle();
    let desc = small_desc().use_microphone(use_microphone);
    let mut engine =
        Engine::init(desc, vec![silence("quiet", 4096)], collaborators(device)).unwrap();

    if use_microphone {
        let config = handle.config().unwrap();
        assert!(config.want_record);
        assert_eq!(config.record_channels, 1);

        let voice = sine("voice", BLOCK * 8);
        assert_eq!(handle.feed_capture(voice.data()), voice.len_bytes());
    }

    engine.run().unwrap();
    assert!(wait_for(|| handle.played_len() >= 6 * OUTPUT_BLOCK_BYTES));
    engine.stop().unwrap();

    decode_i16(&handle.take_played())
}

#[test]
fn microphone_replaces_the_first_source() {
    init_logging();
    let with_mic = render_with_silent_source(true);
    assert!(with_mic.iter().any(|&sample| sample != 0));

    let without_mic = render_with_silent_source(false);
    assert!(without_mic.iter().all(|&sample| sample == 0));
}

#[test]
fn controller_changes_publish_new_responses() {
    init_logging();
    let mut engine =
        Engine::init(small_desc(), vec![sine("a", 4096)], collaborators(OfflineDevice::new()))
            .unwrap();
    engine.run().unwrap();
    assert_eq!(engine.stats().responses_published, 1);

    let controller = engine.controller();
    assert!(controller.set_listener_position(Vec3::new(2.0, 1.7, 4.0)).unwrap());
    assert!(wait_for(|| engine.stats().responses_published >= 2));
    assert!(wait_for(|| !controller.has_pending_changes()));

    // Unchanged geometry is not republished.
    assert!(!controller.set_listener_position(Vec3::new(2.0, 1.7, 4.0)).unwrap());

    // Outside the room.
    assert!(controller.set_listener_position(Vec3::new(20.0, 1.7, 4.0)).is_err());
    assert_eq!(controller.listener().position, Vec3::new(2.0, 1.7, 4.0));

    engine.stop().unwrap();
    let generations: Vec<u64> = engine
        .poll_events()
        .into_iter()
        .filter_map(|event| match event {
            EngineEvent::ResponsesPublished { generation } => Some(generation),
            _ => None,
        })
        .collect();
    assert!(generations.len() >= 2);
    assert!(generations.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn non_blocking_publishing_still_delivers_changes() {
    init_logging();
    let desc = small_desc().publish_mode(PublishMode::NonBlocking);
    let mut engine =
        Engine::init(desc, vec![sine("a", 4096)], collaborators(OfflineDevice::new())).unwrap();
    engine.run().unwrap();

    let controller = engine.controller();
    controller.set_source_position(0, Vec3::new(1.0, 1.0, 1.0)).unwrap();
    assert!(wait_for(|| engine.stats().responses_published >= 2));
    engine.stop().unwrap();
}

#[test]
fn partial_device_writes_still_render() {
    init_logging();
    let device = OfflineDevice::with_limits(1 << 20, Some(100));
    let handle = device.handle();
    let mut engine =
        Engine::init(small_desc(), vec![sine("a", 4096)], collaborators(device)).unwrap();

    engine.run().unwrap();
    assert!(wait_for(|| engine.stats().blocks_rendered >= 3));
    engine.stop().unwrap();

    assert!(handle.played_len() >= 3 * OUTPUT_BLOCK_BYTES);
    assert!(handle.io_calls() as usize >= 3 * OUTPUT_BLOCK_BYTES / 100);
}

#[test]
fn failing_priority_hook_does_not_stop_rendering() {
    init_logging();
    let desc = small_desc().render_priority(|| {
        Err(AuralisError::Configuration("real-time priority not permitted".into()))
    });
    let mut engine =
        Engine::init(desc, vec![sine("a", 2048)], collaborators(OfflineDevice::new())).unwrap();

    engine.run().unwrap();
    assert!(engine.is_running());
    engine.stop().unwrap();
}

#[test]
fn time_domain_convolution_renders_the_same_lifecycle() {
    init_logging();
    let desc = small_desc()
        .fft_length(256)
        .block_size(128)
        .convolution_method(ConvolutionMethod::TimeDomain);
    let device = OfflineDevice::new();
    let handle = device.handle();
    let mut engine = Engine::init(desc, vec![sine("a", 2048)], collaborators(device)).unwrap();

    engine.run().unwrap();
    assert!(wait_for(|| engine.stats().blocks_rendered >= 2));
    engine.stop().unwrap();
    assert!(decode_i16(&handle.take_played()).iter().any(|&s| s != 0));
}

#[test]
fn dropping_a_running_engine_closes_it() {
    init_logging();
    let device = OfflineDevice::new();
    let handle = device.handle();
    let mut engine =
        Engine::init(small_desc(), vec![sine("a", 2048)], collaborators(device)).unwrap();
    engine.run().unwrap();

    drop(engine);
    assert!(!handle.is_open());
}

/// Device whose playback fails once `working_calls` writes have gone through.
struct FailingDevice {
    working_calls: usize,
}

struct FailingIo {
    remaining: usize,
}

impl PlaybackDevice for FailingDevice {
    fn name(&self) -> &str {
        "failing"
    }

    fn init(&mut self, _config: &DeviceConfig) -> Result<Box<dyn DeviceIo>> {
        Ok(Box::new(FailingIo {
            remaining: self.working_calls,
        }))
    }

    fn close(&mut self) {}
}

impl DeviceIo for FailingIo {
    fn play(&mut self, data: &[u8]) -> Result<usize> {
        if self.remaining == 0 {
            return Err(AuralisError::AudioDevice("device unplugged".into()));
        }
        self.remaining -= 1;
        Ok(data.len())
    }

    fn record(&mut self, _buffer: &mut [u8]) -> Result<usize> {
        Ok(0)
    }
}

fn failing_collaborators(working_calls: usize) -> Collaborators {
    Collaborators::new(
        FailingDevice { working_calls },
        CpuBackend::new(),
        ImageSourceGenerator::new(),
    )
}

#[test]
fn clipping_is_counted_while_playback_continues() {
    init_logging();
    // Three coincident full-scale sources sum well past full scale.
    let loud = || AudioStream::from_f32("loud", mono_format(), &[1.0; 2048]).unwrap();
    let near = SourceDesc::at(Vec3::new(3.0, 1.7, 5.3));
    let desc = small_desc().sources(vec![near; 3]);
    let device = OfflineDevice::with_limits(10 * OUTPUT_BLOCK_BYTES, None);
    let handle = device.handle();

    let mut engine =
        Engine::init(desc, vec![loud(), loud(), loud()], collaborators(device)).unwrap();
    engine.run().unwrap();
    assert!(wait_for(|| handle.played_len() == 10 * OUTPUT_BLOCK_BYTES));
    assert!(wait_for(|| engine.stats().clipped_blocks >= 5));
    assert!(engine.is_running());
    engine.stop().unwrap();

    let stats = engine.stats();
    assert!(stats.blocks_rendered >= stats.clipped_blocks);
    let events = engine.poll_events();
    let clipping = events
        .iter()
        .filter(|event| matches!(event, EngineEvent::Clipping { samples, .. } if *samples > 0))
        .count();
    assert_eq!(clipping as u64, stats.clipped_blocks);
    assert!(!events.iter().any(EngineEvent::is_error));
}

#[test]
fn device_failure_halts_the_render_thread() {
    init_logging();
    let mut engine = Engine::init(small_desc(), vec![sine("a", 2048)], failing_collaborators(3))
        .unwrap();
    engine.run().unwrap();

    let mut events = Vec::new();
    assert!(wait_for(|| {
        events.extend(engine.poll_events());
        events.iter().any(|event| matches!(event, EngineEvent::RenderFailed { .. }))
    }));
    let failure = events
        .iter()
        .find_map(|event| match event {
            EngineEvent::RenderFailed { error } => Some(error.clone()),
            _ => None,
        })
        .unwrap();
    assert!(failure.contains("device unplugged"));

    let rendered = engine.stats().blocks_rendered;
    assert_eq!(rendered, 3);
    thread::sleep(Duration::from_millis(20));
    assert_eq!(engine.stats().blocks_rendered, rendered);

    engine.stop().unwrap();
    assert_eq!(engine.state(), EngineState::Stopped);
}

#[test]
fn run_fails_when_the_first_block_cannot_be_played() {
    init_logging();
    let mut engine = Engine::init(small_desc(), vec![sine("a", 2048)], failing_collaborators(0))
        .unwrap();

    assert!(matches!(engine.run(), Err(AuralisError::Engine(_))));
    assert_eq!(engine.state(), EngineState::Stopped);
    assert!(!engine.is_running());
    assert!(matches!(engine.run(), Err(AuralisError::InvalidState(_))));

    let events = engine.poll_events();
    assert!(events.iter().any(|event| matches!(event, EngineEvent::RenderFailed { .. })));
    assert!(!events.contains(&EngineEvent::RenderStarted));
}

#[test]
fn head_tracked_source_follows_the_listener() {
    init_logging();
    let desc = small_desc()
        .head_tracking(vec![false, true])
        .sources(vec![
            SourceDesc::at(Vec3::new(1.0, 1.0, 1.0)),
            SourceDesc::at(Vec3::new(5.0, 1.0, 9.0)),
        ]);
    let mut engine = Engine::init(
        desc,
        vec![sine("fixed", 2048), sine("voice", 2048)],
        collaborators(OfflineDevice::new()),
    )
    .unwrap();

    let controller = engine.controller();
    let start = controller.listener().position;
    assert_eq!(controller.source(1).unwrap().position, start);
    assert_eq!(controller.source(0).unwrap().position, Vec3::new(1.0, 1.0, 1.0));

    engine.run().unwrap();
    let moved = Vec3::new(2.0, 1.5, 7.0);
    controller.set_listener_position(moved).unwrap();
    assert!(wait_for(|| controller.source(1).unwrap().position == moved));
    assert!(wait_for(|| engine.stats().responses_published >= 2));
    assert_eq!(controller.source(0).unwrap().position, Vec3::new(1.0, 1.0, 1.0));

    engine.stop().unwrap();
}
