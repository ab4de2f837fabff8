use crate::{
    audio_data::{AudioStream, LoadOptions},
    error::{AuralisError, Result},
    format::StreamFormat,
};
use std::fs::File;
use std::path::Path;
use symphonia::{
    core::{
        audio::SampleBuffer, codecs::DecoderOptions, errors::Error, formats::FormatOptions,
        io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
    },
    default::{get_codecs, get_probe},
};

/// Decodes an audio file into an [`AudioStream`] kept at integer PCM of the file's bit depth.
pub fn load_audio_file(path: impl AsRef<Path>, options: &LoadOptions) -> Result<AudioStream> {
    let path = path.as_ref();
    let file = File::open(path)?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| AuralisError::AudioLoading(format!("Failed to probe audio format: {:?}", e)))?;

    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| AuralisError::AudioLoading("No default audio track found".to_string()))?;
    let track_id = track.id;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| AuralisError::AudioLoading("Sample rate not found".to_string()))?;

    let channels = track
        .codec_params
        .channels
        .ok_or_else(|| AuralisError::AudioLoading("Channel count not found".to_string()))?
        .count() as u16;

    let bits = options
        .bits_per_sample
        .or(track.codec_params.bits_per_sample.map(|b| b as u16))
        .unwrap_or(16);
    let stream_format = StreamFormat::new(sample_rate, bits, channels);
    stream_format.validate()?;

    let mut decoder = get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| AuralisError::AudioLoading(format!("Failed to create decoder: {:?}", e)))?;

    let max_frames = options
        .max_duration
        .map(|d| (d.as_secs_f64() * sample_rate as f64) as usize)
        .unwrap_or(usize::MAX);

    let mut data: Vec<u8> = Vec::new();
    let mut frames_decoded = 0;

    while frames_decoded < max_frames {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(Error::IoError(_)) => break, // end-of-file
            Err(e) => {
                return Err(AuralisError::AudioLoading(format!(
                    "Error reading packet: {:?}",
                    e
                )));
            }
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(Error::IoError(_)) => break,
            Err(Error::DecodeError(_)) => continue, // recoverable corruption
            Err(e) => {
                return Err(AuralisError::AudioLoading(format!(
                    "Error decoding packet: {:?}",
                    e
                )));
            }
        };

        let spec = *decoded.spec();
        let capacity = decoded.capacity();
        let mut tmp = SampleBuffer::<i32>::new(capacity as u64, spec);
        tmp.copy_interleaved_ref(decoded);

        let frames_in_packet = tmp.samples().len() / channels as usize;
        let frames_to_keep = frames_in_packet.min(max_frames - frames_decoded);
        pack_samples(
            &tmp.samples()[..frames_to_keep * channels as usize],
            bits,
            &mut data,
        );
        frames_decoded += frames_to_keep;
    }

    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("stream")
        .to_string();

    log::info!(
        "Loaded '{}': {} frames, {}",
        name,
        frames_decoded,
        stream_format
    );

    AudioStream::from_pcm(name, stream_format, data)
}

/// Narrows full-scale i32 samples to `bits` wide little-endian PCM.
fn pack_samples(samples: &[i32], bits: u16, out: &mut Vec<u8>) {
    for &sample in samples {
        match bits {
            8 => out.push(((sample >> 24) + 128) as u8),
            16 => out.extend_from_slice(&((sample >> 16) as i16).to_le_bytes()),
            24 => out.extend_from_slice(&(sample >> 8).to_le_bytes()[..3]),
            _ => out.extend_from_slice(&sample.to_le_bytes()),
        }
    }
}
