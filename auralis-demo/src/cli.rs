use std::f32::consts::TAU;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use auralis::{
    AudioStream, Collaborators, Engine, EngineDesc, EngineEvent, Orientation, SourceDesc, Vec3,
};

pub const USAGE: &str = "\
usage: auralis-demo [options] <file.wav>...

  --seconds <n>   play for n seconds (default 10)
  --orbit         walk the listener in a circle around the room centre
  --mic           replace the first file with the default microphone
  --bounces <n>   reflection order of the room model (default 3)";

#[derive(Debug, PartialEq)]
pub struct Options {
    pub files: Vec<String>,
    pub seconds: u64,
    pub orbit: bool,
    pub microphone: bool,
    pub max_bounces: u32,
}

impl Options {
    pub fn parse(args: &[String]) -> Result<Self> {
        let mut options = Self {
            files: Vec::new(),
            seconds: 10,
            orbit: false,
            microphone: false,
            max_bounces: 3,
        };

        let mut args = args.iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--seconds" => {
                    let value = args.next().context("--seconds needs a value")?;
                    options.seconds = value.parse().context("--seconds must be a number")?;
                }
                "--bounces" => {
                    let value = args.next().context("--bounces needs a value")?;
                    options.max_bounces = value.parse().context("--bounces must be a number")?;
                }
                "--orbit" => options.orbit = true,
                "--mic" => options.microphone = true,
                flag if flag.starts_with("--") => bail!("unknown option {}", flag),
                file => options.files.push(file.to_string()),
            }
        }

        if options.files.is_empty() {
            bail!("no input files given");
        }
        Ok(options)
    }
}

pub fn run(options: Options) -> Result<()> {
    let mut streams = Vec::with_capacity(options.files.len());
    for path in &options.files {
        let stream =
            AudioStream::from_path(path).with_context(|| format!("loading {}", path))?;
        log::info!(
            "Loaded '{}': {}, {:.1}s",
            stream.name(),
            stream.format(),
            stream.duration().as_secs_f32()
        );
        streams.push(stream);
    }

    let mut desc = EngineDesc::default()
        .use_microphone(options.microphone)
        .max_bounces(options.max_bounces);
    let centre = desc.room.dimensions() * 0.5;
    desc = desc.sources(spread_sources(streams.len(), centre));

    let mut engine = Engine::init(desc, streams, Collaborators::system_default())?;
    engine.run()?;
    log::info!("Playing for {} seconds", options.seconds);

    let controller = engine.controller();
    let start = Instant::now();
    let duration = Duration::from_secs(options.seconds);
    while start.elapsed() < duration {
        if options.orbit {
            let angle = TAU * start.elapsed().as_secs_f32() / 8.0;
            let position = centre + Vec3::new(angle.cos(), 0.0, angle.sin()) * 1.5;
            // Keep facing the room centre
            let facing = Orientation::new(TAU / 4.0 - angle, 0.0, 0.0);
            controller.set_listener_position(position)?;
            controller.set_listener_orientation(facing)?;
        }

        for event in engine.poll_events() {
            match event {
                EngineEvent::RenderFailed { error } => bail!("render thread failed: {}", error),
                EngineEvent::UpdateFailed { error } => log::warn!("update failed: {}", error),
                other => log::debug!("{:?}", other),
            }
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    engine.stop()?;
    let stats = engine.stats();
    log::info!(
        "Rendered {} blocks, published {} response sets, {} clipped blocks",
        stats.blocks_rendered,
        stats.responses_published,
        stats.clipped_blocks
    );
    engine.close()?;
    Ok(())
}

/// Places sources on a line in front of the room centre.
fn spread_sources(count: usize, centre: Vec3) -> Vec<SourceDesc> {
    (0..count)
        .map(|i| {
            let offset = i as f32 - (count as f32 - 1.0) / 2.0;
            SourceDesc::at(centre + Vec3::new(offset, 0.0, -2.0))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_flags_and_files() {
        let options =
            Options::parse(&args(&["--orbit", "a.wav", "--seconds", "3", "b.wav"])).unwrap();
        assert_eq!(options.files, vec!["a.wav", "b.wav"]);
        assert_eq!(options.seconds, 3);
        assert!(options.orbit);
        assert!(!options.microphone);
    }

    #[test]
    fn rejects_missing_files_and_unknown_flags() {
        assert!(Options::parse(&args(&["--mic"])).is_err());
        assert!(Options::parse(&args(&["--loud", "a.wav"])).is_err());
        assert!(Options::parse(&args(&["a.wav", "--seconds"])).is_err());
    }

    #[test]
    fn sources_are_centred() {
        let sources = spread_sources(3, Vec3::new(3.0, 2.0, 5.0));
        assert_eq!(sources[0].position, Vec3::new(2.0, 2.0, 3.0));
        assert_eq!(sources[1].position, Vec3::new(3.0, 2.0, 3.0));
        assert_eq!(sources[2].position, Vec3::new(4.0, 2.0, 3.0));
    }
}
