use crate::error::{AuralisError, Result};
use crate::math::Vec3;
use crate::response::head::add_fractional_tap;
use crate::response::{Arrival, HeadModel};
use audionimbus::{
    AmbisonicsDecodeEffect, AmbisonicsDecodeEffectParams, AmbisonicsDecodeEffectSettings,
    AmbisonicsEncodeEffect, AmbisonicsEncodeEffectParams, AmbisonicsEncodeEffectSettings,
    AudioBufferSettings, AudioSettings, Context, CoordinateSystem, Direction, Hrtf, HrtfSettings,
    SpeakerLayout, Vector3, VolumeNormalization, audio_buffer::AudioBuffer as NimbusBuffer,
};

const AMBISONICS_ORDER: u32 = 2;
const AMBISONICS_CHANNELS: usize = 9;

/// Ear model backed by Steam Audio's default HRTF.
///
/// Every arrival is rendered as the HRTF's binaural response to a unit impulse from the
/// arrival direction, scaled by reflection loss and spreading, then laid into the
/// response at the arrival's centre delay.
pub struct SteamAudioHead {
    #[allow(dead_code)] // Must outlive the HRTF and effects
    context: Context,
    hrtf: Hrtf,
    encode: AmbisonicsEncodeEffect,
    decode: AmbisonicsDecodeEffect,
    frame_size: usize,
    reference_distance: f32,

    impulse: Vec<f32>,
    silence: Vec<f32>,
    encoded: Vec<f32>,
    decoded: Vec<f32>,
}

impl SteamAudioHead {
    /// `frame_size` bounds the length of each rendered HRIR.
    pub fn new(sample_rate: u32, frame_size: usize) -> Result<Self> {
        let context = Context::try_new(&audionimbus::ContextSettings::default()).map_err(|e| {
            AuralisError::ResponseGeneration(format!("Failed to create Steam Audio context: {}", e))
        })?;

        let audio_settings = AudioSettings {
            sampling_rate: sample_rate,
            frame_size: frame_size as u32,
        };

        let hrtf = Hrtf::try_new(
            &context,
            &audio_settings,
            &HrtfSettings {
                volume_normalization: VolumeNormalization::None,
                sofa_information: None,
                ..Default::default()
            },
        )
        .map_err(|e| AuralisError::ResponseGeneration(format!("Failed to create HRTF: {}", e)))?;

        let encode = AmbisonicsEncodeEffect::try_new(
            &context,
            &audio_settings,
            &AmbisonicsEncodeEffectSettings {
                max_order: AMBISONICS_ORDER,
            },
        )
        .map_err(|e| {
            AuralisError::ResponseGeneration(format!(
                "Failed to create AmbisonicsEncodeEffect: {}",
                e
            ))
        })?;

        let decode = AmbisonicsDecodeEffect::try_new(
            &context,
            &audio_settings,
            &AmbisonicsDecodeEffectSettings {
                max_order: AMBISONICS_ORDER,
                speaker_layout: SpeakerLayout::Stereo,
                hrtf: &hrtf,
            },
        )
        .map_err(|e| {
            AuralisError::ResponseGeneration(format!(
                "Failed to create AmbisonicsDecodeEffect: {}",
                e
            ))
        })?;

        let mut impulse = vec![0.0; frame_size];
        if let Some(first) = impulse.first_mut() {
            *first = 1.0;
        }

        log::info!(
            "Steam Audio head model ready ({} Hz, {} sample HRIRs)",
            sample_rate,
            frame_size
        );

        Ok(Self {
            context,
            hrtf,
            encode,
            decode,
            frame_size,
            reference_distance: 1.0,
            impulse,
            silence: vec![0.0; frame_size],
            encoded: vec![0.0; frame_size * AMBISONICS_CHANNELS],
            decoded: vec![0.0; frame_size * 2],
        })
    }

    /// Runs one frame through encode and decode; the binaural result lands in `decoded`.
    fn run_frame(&mut self, direction: Vec3, impulse: bool) -> Result<()> {
        let input = if impulse { &self.impulse } else { &self.silence };
        let input_buf = NimbusBuffer::try_with_data_and_settings(
            input,
            AudioBufferSettings {
                num_channels: Some(1),
                ..Default::default()
            },
        )
        .map_err(|e| {
            AuralisError::ResponseGeneration(format!("Failed to create input buffer: {}", e))
        })?;

        let encoded_buf = NimbusBuffer::try_with_data_and_settings(
            &mut self.encoded,
            AudioBufferSettings {
                num_channels: Some(AMBISONICS_CHANNELS as u32),
                ..Default::default()
            },
        )
        .map_err(|e| {
            AuralisError::ResponseGeneration(format!("Failed to create encode buffer: {}", e))
        })?;

        self.encode.apply(
            &AmbisonicsEncodeEffectParams {
                direction: Direction::new(direction.x, direction.y, direction.z),
                order: AMBISONICS_ORDER,
            },
            &input_buf,
            &encoded_buf,
        );

        let decoded_buf = NimbusBuffer::try_with_data_and_settings(
            &mut self.decoded,
            AudioBufferSettings {
                num_channels: Some(2),
                ..Default::default()
            },
        )
        .map_err(|e| {
            AuralisError::ResponseGeneration(format!("Failed to create decode buffer: {}", e))
        })?;

        self.decode.apply(
            &AmbisonicsDecodeEffectParams {
                order: AMBISONICS_ORDER,
                hrtf: &self.hrtf,
                orientation: CoordinateSystem {
                    ahead: Vector3::new(0.0, 0.0, -1.0),
                    ..Default::default()
                },
                binaural: true,
            },
            &encoded_buf,
            &decoded_buf,
        );

        Ok(())
    }

    /// Renders the HRIR pair for `direction` into `decoded` (left half, then right half).
    fn render_hrir(&mut self, direction: Vec3) -> Result<()> {
        // A silent frame flushes the previous tail and settles the encoder on the new direction.
        self.run_frame(direction, false)?;
        self.run_frame(direction, true)
    }
}

impl HeadModel for SteamAudioHead {
    fn add_arrival(&mut self, arrival: &Arrival, left: &mut [f32], right: &mut [f32]) {
        let direction = if arrival.direction == Vec3::ZERO {
            Vec3::NEG_Z
        } else {
            arrival.direction
        };
        if let Err(e) = self.render_hrir(direction) {
            log::warn!("Skipping arrival, HRIR rendering failed: {}", e);
            return;
        }

        let amplitude = arrival.reflection_gain * self.reference_distance
            / arrival.center_distance.max(self.reference_distance);
        let (hrir_left, hrir_right) = self.decoded.split_at(self.frame_size);
        for (i, (l, r)) in hrir_left.iter().zip(hrir_right).enumerate() {
            let delay = arrival.center_delay + i as f32;
            add_fractional_tap(left, delay, amplitude * l);
            add_fractional_tap(right, delay, amplitude * r);
        }
    }
}

impl std::fmt::Debug for SteamAudioHead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SteamAudioHead")
            .field("frame_size", &self.frame_size)
            .finish_non_exhaustive()
    }
}
