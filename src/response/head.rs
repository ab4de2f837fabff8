use crate::math::Vec3;

/// One sound path (direct or reflected) arriving at the listener's head.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arrival {
    /// Unit vector from the head centre towards the (image) source, in the head frame
    /// (x right, y up, −z ahead). Zero when the source sits at the head centre.
    pub direction: Vec3,
    /// Path length to the head centre, left ear and right ear in meters
    pub center_distance: f32,
    pub left_distance: f32,
    pub right_distance: f32,
    /// Propagation delays in samples matching the distances above
    pub center_delay: f32,
    pub left_delay: f32,
    pub right_delay: f32,
    /// Product of the damping of every wall the path bounced off
    pub reflection_gain: f32,
}

/// Renders arrivals into the two ear channels of an impulse response.
pub trait HeadModel: Send {
    fn add_arrival(&mut self, arrival: &Arrival, left: &mut [f32], right: &mut [f32]);
}

/// Rigid-sphere approximation: per-ear delays from the ear positions and a
/// cardioid-shaped level drop on the shadowed side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphericalHead {
    /// Gain of an ear facing directly away from the arrival, in (0, 1]
    pub shadow_floor: f32,
    /// Distance inside which spreading loss stops growing
    pub reference_distance: f32,
}

impl SphericalHead {
    pub fn new(shadow_floor: f32, reference_distance: f32) -> Self {
        Self {
            shadow_floor,
            reference_distance,
        }
    }

    fn ear_gain(&self, direction: Vec3, ear_axis: Vec3) -> f32 {
        let facing = direction.dot(ear_axis);
        0.5 * (1.0 + self.shadow_floor) + 0.5 * (1.0 - self.shadow_floor) * facing
    }

    fn spreading(&self, distance: f32) -> f32 {
        self.reference_distance / distance.max(self.reference_distance)
    }
}

impl Default for SphericalHead {
    fn default() -> Self {
        Self::new(0.35, 1.0)
    }
}

impl HeadModel for SphericalHead {
    fn add_arrival(&mut self, arrival: &Arrival, left: &mut [f32], right: &mut [f32]) {
        let left_amp = arrival.reflection_gain
            * self.spreading(arrival.left_distance)
            * self.ear_gain(arrival.direction, -Vec3::X);
        let right_amp = arrival.reflection_gain
            * self.spreading(arrival.right_distance)
            * self.ear_gain(arrival.direction, Vec3::X);

        add_fractional_tap(left, arrival.left_delay, left_amp);
        add_fractional_tap(right, arrival.right_delay, right_amp);
    }
}

/// Adds `amplitude` at a fractional `delay`, split linearly over the two nearest samples.
/// Taps past the end of `buffer` are dropped.
pub(crate) fn add_fractional_tap(buffer: &mut [f32], delay: f32, amplitude: f32) {
    if !(delay >= 0.0) {
        return;
    }
    let index = delay.floor() as usize;
    let frac = delay - delay.floor();

    if let Some(sample) = buffer.get_mut(index) {
        *sample += amplitude * (1.0 - frac);
    }
    if frac > 0.0 {
        if let Some(sample) = buffer.get_mut(index + 1) {
            *sample += amplitude * frac;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arrival_from(direction: Vec3, delay: f32) -> Arrival {
        Arrival {
            direction,
            center_distance: 2.0,
            left_distance: 2.0,
            right_distance: 2.0,
            center_delay: delay,
            left_delay: delay,
            right_delay: delay,
            reflection_gain: 1.0,
        }
    }

    #[test]
    fn fractional_tap_splits_energy() {
        let mut buf = [0.0f32; 4];
        add_fractional_tap(&mut buf, 1.25, 1.0);
        assert_eq!(buf, [0.0, 0.75, 0.25, 0.0]);
    }

    #[test]
    fn taps_past_end_are_dropped() {
        let mut buf = [0.0f32; 4];
        add_fractional_tap(&mut buf, 3.5, 1.0);
        add_fractional_tap(&mut buf, 10.0, 1.0);
        assert_eq!(buf, [0.0, 0.0, 0.0, 0.5]);
    }

    #[test]
    fn source_on_the_right_is_louder_in_right_ear() {
        let mut head = SphericalHead::default();
        let mut left = [0.0f32; 8];
        let mut right = [0.0f32; 8];
        head.add_arrival(&arrival_from(Vec3::X, 2.0), &mut left, &mut right);
        assert!(right[2] > left[2]);
        assert!((right[2] - 0.5).abs() < 1e-6);
        assert!((left[2] - 0.5 * 0.35).abs() < 1e-6);
    }

    #[test]
    fn frontal_source_is_balanced() {
        let mut head = SphericalHead::default();
        let mut left = [0.0f32; 8];
        let mut right = [0.0f32; 8];
        head.add_arrival(&arrival_from(-Vec3::Z, 3.0), &mut left, &mut right);
        assert_eq!(left, right);
    }
}
