//! Math types for auralis

pub use glam::{Quat, Vec3};

/// Head orientation as yaw (about +Y), pitch (about +X) and roll (about +Z), in radians.
///
/// At zero orientation the listener faces −Z with +Y up and +X to the right.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Orientation {
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
}

impl Orientation {
    pub fn new(yaw: f32, pitch: f32, roll: f32) -> Self {
        Self { yaw, pitch, roll }
    }

    pub fn identity() -> Self {
        Self::default()
    }

    pub fn rotation(&self) -> Quat {
        Quat::from_euler(glam::EulerRot::YXZ, self.yaw, self.pitch, self.roll)
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation() * (-Vec3::Z)
    }

    pub fn up(&self) -> Vec3 {
        self.rotation() * Vec3::Y
    }

    pub fn right(&self) -> Vec3 {
        self.rotation() * Vec3::X
    }

    /// Expresses a world-space vector in the head frame (x right, y up, −z ahead).
    pub fn to_local(&self, world: Vec3) -> Vec3 {
        self.rotation().inverse() * world
    }

    pub fn is_finite(&self) -> bool {
        self.yaw.is_finite() && self.pitch.is_finite() && self.roll.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-5
    }

    #[test]
    fn identity_faces_negative_z() {
        let o = Orientation::identity();
        assert!(close(o.forward(), Vec3::new(0.0, 0.0, -1.0)));
        assert!(close(o.up(), Vec3::Y));
        assert!(close(o.right(), Vec3::X));
    }

    #[test]
    fn yaw_quarter_turn_faces_left() {
        let o = Orientation::new(std::f32::consts::FRAC_PI_2, 0.0, 0.0);
        assert!(close(o.forward(), Vec3::new(-1.0, 0.0, 0.0)));
        assert!(close(o.right(), Vec3::new(0.0, 0.0, -1.0)));
    }

    #[test]
    fn to_local_inverts_rotation() {
        let o = Orientation::new(0.4, -0.2, 0.1);
        assert!(close(o.to_local(o.forward()), -Vec3::Z));
        assert!(close(o.to_local(o.right()), Vec3::X));
    }
}
