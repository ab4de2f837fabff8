//! Interleaved integer PCM ⇄ planar f32 conversion.
//!
//! 8-bit samples are unsigned, 16/24/32-bit samples are signed little-endian.

use crate::error::{AuralisError, Result};

/// Sample layout shared by every input stream and the output device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub channels: u16,
}

impl StreamFormat {
    pub fn new(sample_rate: u32, bits_per_sample: u16, channels: u16) -> Self {
        Self {
            sample_rate,
            bits_per_sample,
            channels,
        }
    }

    pub fn bytes_per_sample(&self) -> usize {
        self.bits_per_sample as usize / 8
    }

    pub fn frame_bytes(&self) -> usize {
        self.bytes_per_sample() * self.channels as usize
    }

    pub fn validate(&self) -> Result<()> {
        if !matches!(self.bits_per_sample, 8 | 16 | 24 | 32) {
            return Err(AuralisError::AudioFormat(format!(
                "Unsupported bit depth {}",
                self.bits_per_sample
            )));
        }
        if self.channels == 0 {
            return Err(AuralisError::AudioFormat("Channel count is zero".into()));
        }
        if self.sample_rate == 0 {
            return Err(AuralisError::AudioFormat("Sample rate is zero".into()));
        }
        Ok(())
    }
}

impl std::fmt::Display for StreamFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} Hz / {}-bit / {} ch",
            self.sample_rate, self.bits_per_sample, self.channels
        )
    }
}

/// Outcome of a float to PCM conversion. Clipping is reported, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConversionReport {
    pub clipped_samples: usize,
}

impl ConversionReport {
    pub fn clipped(&self) -> bool {
        self.clipped_samples > 0
    }
}

fn full_scale(bits: u16) -> f64 {
    match bits {
        8 => 128.0,
        16 => 32_768.0,
        24 => 8_388_608.0,
        _ => 2_147_483_648.0,
    }
}

/// Decodes one sample of `bits` width from the start of `bytes`.
pub fn decode_sample(bytes: &[u8], bits: u16) -> f32 {
    let value = match bits {
        8 => bytes[0] as i32 - 128,
        16 => i16::from_le_bytes([bytes[0], bytes[1]]) as i32,
        // Sign-extend by placing the three bytes in the top of an i32.
        24 => i32::from_le_bytes([0, bytes[0], bytes[1], bytes[2]]) >> 8,
        _ => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
    };
    (value as f64 / full_scale(bits)) as f32
}

/// Encodes `value` into the start of `out`, returning true when it had to be clipped.
pub fn encode_sample(value: f32, bits: u16, out: &mut [u8]) -> bool {
    let clipped = !value.is_finite() || !(-1.0..=1.0).contains(&value);
    let value = if value.is_finite() { value } else { 0.0 };

    let scale = full_scale(bits);
    let scaled = (value as f64 * scale).round();
    let quantized = scaled.clamp(-scale, scale - 1.0) as i64;

    match bits {
        8 => out[0] = (quantized + 128) as u8,
        16 => out[..2].copy_from_slice(&(quantized as i16).to_le_bytes()),
        24 => out[..3].copy_from_slice(&(quantized as i32).to_le_bytes()[..3]),
        _ => out[..4].copy_from_slice(&(quantized as i32).to_le_bytes()),
    }
    clipped
}

/// Appends interleaved PCM bytes to `out` as interleaved floats.
pub fn pcm_to_f32(bytes: &[u8], bits: u16, out: &mut Vec<f32>) {
    let width = bits as usize / 8;
    out.extend(
        bytes
            .chunks_exact(width)
            .map(|sample| decode_sample(sample, bits)),
    );
}

/// Appends interleaved floats to `out` as PCM bytes.
pub fn f32_to_pcm(samples: &[f32], bits: u16, out: &mut Vec<u8>) -> ConversionReport {
    let width = bits as usize / 8;
    let start = out.len();
    out.resize(start + samples.len() * width, 0);

    let mut report = ConversionReport::default();
    for (sample, dst) in samples.iter().zip(out[start..].chunks_exact_mut(width)) {
        if encode_sample(*sample, bits, dst) {
            report.clipped_samples += 1;
        }
    }
    report
}

/// Splits `frames` interleaved frames of `input` into one float buffer per channel.
pub fn deinterleave(
    input: &[u8],
    format: StreamFormat,
    frames: usize,
    planar: &mut [Vec<f32>],
) -> Result<()> {
    let channels = format.channels as usize;
    let width = format.bytes_per_sample();

    if planar.len() != channels {
        return Err(AuralisError::AudioFormat(format!(
            "Expected {} planar buffers, got {}",
            channels,
            planar.len()
        )));
    }
    if input.len() < frames * format.frame_bytes() {
        return Err(AuralisError::AudioFormat(format!(
            "Input holds {} bytes, block needs {}",
            input.len(),
            frames * format.frame_bytes()
        )));
    }
    if planar.iter().any(|channel| channel.len() < frames) {
        return Err(AuralisError::AudioFormat(
            "Planar buffer shorter than block".into(),
        ));
    }

    for (frame_idx, frame) in input
        .chunks_exact(format.frame_bytes())
        .take(frames)
        .enumerate()
    {
        for (channel, sample) in frame.chunks_exact(width).enumerate() {
            planar[channel][frame_idx] = decode_sample(sample, format.bits_per_sample);
        }
    }
    Ok(())
}

/// Averages planar channels into one mono buffer.
pub fn downmix(planar: &[Vec<f32>], frames: usize, out: &mut [f32]) {
    let gain = 1.0 / planar.len().max(1) as f32;
    for (frame_idx, sample) in out.iter_mut().take(frames).enumerate() {
        *sample = planar.iter().map(|channel| channel[frame_idx]).sum::<f32>() * gain;
    }
}

/// Interleaves the two mixed buses into stereo PCM of `bits` width.
pub fn interleave_stereo(
    left: &[f32],
    right: &[f32],
    bits: u16,
    out: &mut [u8],
) -> Result<ConversionReport> {
    let width = bits as usize / 8;
    let frames = left.len();

    if right.len() != frames {
        return Err(AuralisError::AudioFormat(format!(
            "Left bus has {} frames, right bus has {}",
            frames,
            right.len()
        )));
    }
    if out.len() < frames * width * 2 {
        return Err(AuralisError::AudioFormat(format!(
            "Output holds {} bytes, block needs {}",
            out.len(),
            frames * width * 2
        )));
    }

    let mut report = ConversionReport::default();
    for (frame_idx, dst) in out.chunks_exact_mut(width * 2).take(frames).enumerate() {
        let (dst_left, dst_right) = dst.split_at_mut(width);
        if encode_sample(left[frame_idx], bits, dst_left) {
            report.clipped_samples += 1;
        }
        if encode_sample(right[frame_idx], bits, dst_right) {
            report.clipped_samples += 1;
        }
    }
    Ok(report)
}
