use crate::error::{AuralisError, Result};
use crate::math::Vec3;
use crate::response::{
    Arrival, GenerateOptions, HeadModel, ImpulseResponsePair, ResponseGenerator, SphericalHead,
};
use crate::room::{Listener, RoomGeometry, SoundSource};

/// Speed of sound in air at 20 °C, m/s.
pub const SPEED_OF_SOUND: f32 = 343.0;

/// One mirror image of the source along a single axis.
#[derive(Debug, Clone, Copy)]
struct AxisImage {
    coordinate: f32,
    bounces: u32,
    gain: f32,
}

/// Shoebox image-source model.
///
/// Every image whose reflection order is at most `max_bounces` contributes one
/// arrival, attenuated by the damping of each wall on its path and rendered into
/// the ears by the head model. Images later than the response length are dropped.
pub struct ImageSourceGenerator<H: HeadModel = SphericalHead> {
    head: H,
    speed_of_sound: f32,
    axis_images: [Vec<AxisImage>; 3],
}

impl ImageSourceGenerator<SphericalHead> {
    pub fn new() -> Self {
        Self::with_head(SphericalHead::default())
    }
}

impl Default for ImageSourceGenerator<SphericalHead> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: HeadModel> ImageSourceGenerator<H> {
    pub fn with_head(head: H) -> Self {
        Self {
            head,
            speed_of_sound: SPEED_OF_SOUND,
            axis_images: [Vec::new(), Vec::new(), Vec::new()],
        }
    }

    pub fn speed_of_sound(mut self, speed: f32) -> Self {
        self.speed_of_sound = speed;
        self
    }

    pub fn head(&self) -> &H {
        &self.head
    }

    /// Images along one axis: `(1 - 2p)·s + 2mL` for `p ∈ {0, 1}`, hitting the low
    /// wall `|m - p|` times and the high wall `|m|` times.
    fn fill_axis_images(
        images: &mut Vec<AxisImage>,
        source: f32,
        extent: f32,
        (low_damping, high_damping): (f32, f32),
        max_bounces: u32,
    ) {
        images.clear();
        let n = max_bounces as i64;
        for m in -n..=n {
            for p in 0..=1i64 {
                let low_hits = (m - p).unsigned_abs() as u32;
                let high_hits = m.unsigned_abs() as u32;
                let bounces = low_hits + high_hits;
                if bounces > max_bounces {
                    continue;
                }
                images.push(AxisImage {
                    coordinate: (1 - 2 * p) as f32 * source + 2.0 * m as f32 * extent,
                    bounces,
                    gain: low_damping.powi(low_hits as i32) * high_damping.powi(high_hits as i32),
                });
            }
        }
    }

    fn arrival_for(
        &self,
        image: Vec3,
        listener: &Listener,
        sample_rate: u32,
        gain: f32,
    ) -> Arrival {
        let samples_per_meter = sample_rate as f32 / self.speed_of_sound;
        let offset = image - listener.position;
        let center_distance = offset.length();
        let left_distance = image.distance(listener.left_ear());
        let right_distance = image.distance(listener.right_ear());

        Arrival {
            direction: listener.orientation.to_local(offset.normalize_or_zero()),
            center_distance,
            left_distance,
            right_distance,
            center_delay: center_distance * samples_per_meter,
            left_delay: left_distance * samples_per_meter,
            right_delay: right_distance * samples_per_meter,
            reflection_gain: gain,
        }
    }
}

impl<H: HeadModel> ResponseGenerator for ImageSourceGenerator<H> {
    fn generate(
        &mut self,
        room: &RoomGeometry,
        source: &SoundSource,
        listener: &Listener,
        sample_rate: u32,
        out: &mut ImpulseResponsePair,
        options: &GenerateOptions,
    ) -> Result<()> {
        if out.left.len() != out.right.len() || out.is_empty() {
            return Err(AuralisError::ResponseGeneration(format!(
                "Response buffers must be equal and non-empty, got {} and {}",
                out.left.len(),
                out.right.len()
            )));
        }
        if sample_rate == 0 {
            return Err(AuralisError::ResponseGeneration("Sample rate is zero".into()));
        }
        room.validate()?;

        out.clear();

        let dims = room.dimensions();
        let position = source.position;
        let damping = room.damping.per_axis();
        let mut axis_images = std::mem::take(&mut self.axis_images);
        for axis in 0..3 {
            Self::fill_axis_images(
                &mut axis_images[axis],
                position[axis],
                dims[axis],
                damping[axis],
                options.max_bounces,
            );
        }

        // Farthest path that still lands inside the response, plus the head radius.
        let max_distance =
            out.len() as f32 * self.speed_of_sound / sample_rate as f32 + listener.ear_spacing;
        let mut rendered = 0usize;

        for x in &axis_images[0] {
            for y in &axis_images[1] {
                let xy_bounces = x.bounces + y.bounces;
                if xy_bounces > options.max_bounces {
                    continue;
                }
                for z in &axis_images[2] {
                    let bounces = xy_bounces + z.bounces;
                    if bounces > options.max_bounces {
                        continue;
                    }
                    if bounces == 0 && options.suppress_direct_path {
                        continue;
                    }

                    let image = Vec3::new(x.coordinate, y.coordinate, z.coordinate);
                    if image.distance(listener.position) > max_distance {
                        continue;
                    }

                    let arrival =
                        self.arrival_for(image, listener, sample_rate, x.gain * y.gain * z.gain);
                    self.head.add_arrival(&arrival, &mut out.left, &mut out.right);
                    rendered += 1;
                }
            }
        }

        self.axis_images = axis_images;
        log::trace!(
            "Rendered {} image sources (max bounces {}, direct {})",
            rendered,
            options.max_bounces,
            !options.suppress_direct_path
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Orientation;
    use crate::room::WallDamping;

    const RATE: u32 = 48_000;

    fn fixed_scene() -> (RoomGeometry, SoundSource, Listener) {
        let room = RoomGeometry::new(6.0, 4.0, 10.0, WallDamping::uniform(0.7));
        let source = SoundSource::new(Vec3::new(2.0, 1.5, 3.0));
        let listener = Listener::new(Vec3::new(4.0, 1.7, 7.0), Orientation::identity(), 0.18);
        (room, source, listener)
    }

    fn first_nonzero(samples: &[f32]) -> Option<usize> {
        samples.iter().position(|s| *s != 0.0)
    }

    #[test]
    fn identical_inputs_give_bit_identical_responses() {
        let (room, source, listener) = fixed_scene();
        let options = GenerateOptions::default();
        let mut generator = ImageSourceGenerator::new();

        let mut first = ImpulseResponsePair::silent(4096);
        let mut second = ImpulseResponsePair::silent(4096);
        generator
            .generate(&room, &source, &listener, RATE, &mut first, &options)
            .unwrap();
        generator
            .generate(&room, &source, &listener, RATE, &mut second, &options)
            .unwrap();

        assert!(first.left.iter().zip(&second.left).all(|(a, b)| a.to_bits() == b.to_bits()));
        assert!(first.right.iter().zip(&second.right).all(|(a, b)| a.to_bits() == b.to_bits()));
        assert!(first.peak() > 0.0);
    }

    #[test]
    fn direct_path_arrives_at_geometric_delay() {
        let (room, source, listener) = fixed_scene();
        let mut generator = ImageSourceGenerator::new();
        let mut ir = ImpulseResponsePair::silent(4096);
        let options = GenerateOptions {
            max_bounces: 0,
            suppress_direct_path: false,
        };
        generator
            .generate(&room, &source, &listener, RATE, &mut ir, &options)
            .unwrap();

        let expected = source.position.distance(listener.left_ear()) * RATE as f32 / SPEED_OF_SOUND;
        assert_eq!(first_nonzero(&ir.left), Some(expected.floor() as usize));
    }

    #[test]
    fn suppressing_direct_path_delays_first_arrival() {
        let (room, source, listener) = fixed_scene();
        let mut generator = ImageSourceGenerator::new();
        let mut with_direct = ImpulseResponsePair::silent(4096);
        let mut reflections_only = ImpulseResponsePair::silent(4096);

        generator
            .generate(
                &room,
                &source,
                &listener,
                RATE,
                &mut with_direct,
                &GenerateOptions::default(),
            )
            .unwrap();
        generator
            .generate(
                &room,
                &source,
                &listener,
                RATE,
                &mut reflections_only,
                &GenerateOptions {
                    max_bounces: 3,
                    suppress_direct_path: true,
                },
            )
            .unwrap();

        assert!(first_nonzero(&reflections_only.left) > first_nonzero(&with_direct.left));
    }

    #[test]
    fn zero_bounces_without_direct_is_silent() {
        let (room, source, listener) = fixed_scene();
        let mut generator = ImageSourceGenerator::new();
        let mut ir = ImpulseResponsePair::silent(1024);
        let options = GenerateOptions {
            max_bounces: 0,
            suppress_direct_path: true,
        };
        generator
            .generate(&room, &source, &listener, RATE, &mut ir, &options)
            .unwrap();
        assert_eq!(ir.peak(), 0.0);
    }

    #[test]
    fn more_bounces_add_energy() {
        let (room, source, listener) = fixed_scene();
        let mut generator = ImageSourceGenerator::new();
        let energy = |bounces: u32, generator: &mut ImageSourceGenerator| {
            let mut ir = ImpulseResponsePair::silent(8192);
            let options = GenerateOptions {
                max_bounces: bounces,
                suppress_direct_path: false,
            };
            generator
                .generate(&room, &source, &listener, RATE, &mut ir, &options)
                .unwrap();
            ir.left.iter().map(|s| s * s).sum::<f32>()
        };
        assert!(energy(2, &mut generator) > energy(1, &mut generator));
    }

    #[test]
    fn first_order_axis_images_mirror_the_walls() {
        let mut images = Vec::new();
        ImageSourceGenerator::<SphericalHead>::fill_axis_images(
            &mut images,
            1.0,
            5.0,
            (0.5, 0.25),
            1,
        );
        let mut coords: Vec<(f32, u32, f32)> =
            images.iter().map(|i| (i.coordinate, i.bounces, i.gain)).collect();
        coords.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        assert_eq!(coords, vec![(-1.0, 1, 0.5), (1.0, 0, 1.0), (9.0, 1, 0.25)]);
    }

    #[test]
    fn mismatched_buffers_are_rejected() {
        let (room, source, listener) = fixed_scene();
        let mut generator = ImageSourceGenerator::new();
        let mut ir = ImpulseResponsePair {
            left: vec![0.0; 16],
            right: vec![0.0; 8],
        };
        assert!(generator
            .generate(&room, &source, &listener, RATE, &mut ir, &GenerateOptions::default())
            .is_err());
    }
}
