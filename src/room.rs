//! Room, listener and source records read by the response generator.

use crate::error::{AuralisError, Result};
use crate::math::{Orientation, Vec3};

/// Amplitude retained per reflection off each of the six walls, each in (0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WallDamping {
    /// Wall at x = 0
    pub left: f32,
    /// Wall at x = width
    pub right: f32,
    /// Wall at y = 0
    pub floor: f32,
    /// Wall at y = height
    pub ceiling: f32,
    /// Wall at z = 0
    pub front: f32,
    /// Wall at z = length
    pub back: f32,
}

impl WallDamping {
    pub fn uniform(value: f32) -> Self {
        Self {
            left: value,
            right: value,
            floor: value,
            ceiling: value,
            front: value,
            back: value,
        }
    }

    /// Damping pairs as `[(low wall, high wall); 3]` for the x, y and z axes.
    pub fn per_axis(&self) -> [(f32, f32); 3] {
        [
            (self.left, self.right),
            (self.floor, self.ceiling),
            (self.front, self.back),
        ]
    }

    fn validate(&self) -> Result<()> {
        let walls = [
            ("left", self.left),
            ("right", self.right),
            ("floor", self.floor),
            ("ceiling", self.ceiling),
            ("front", self.front),
            ("back", self.back),
        ];
        for (name, value) in walls {
            if !(value > 0.0 && value <= 1.0) {
                return Err(AuralisError::Configuration(format!(
                    "{} wall damping {} outside (0, 1]",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

impl Default for WallDamping {
    fn default() -> Self {
        Self::uniform(0.8)
    }
}

/// Shoebox room spanning `[0, width] × [0, height] × [0, length]` in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoomGeometry {
    pub width: f32,
    pub height: f32,
    pub length: f32,
    pub damping: WallDamping,
}

impl RoomGeometry {
    pub fn new(width: f32, height: f32, length: f32, damping: WallDamping) -> Self {
        Self {
            width,
            height,
            length,
            damping,
        }
    }

    pub fn dimensions(&self) -> Vec3 {
        Vec3::new(self.width, self.height, self.length)
    }

    pub fn contains(&self, point: Vec3) -> bool {
        let dims = self.dimensions();
        point.cmpge(Vec3::ZERO).all() && point.cmple(dims).all()
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("width", self.width),
            ("height", self.height),
            ("length", self.length),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(AuralisError::Configuration(format!(
                    "Room {} must be positive, got {}",
                    name, value
                )));
            }
        }
        self.damping.validate()
    }
}

impl Default for RoomGeometry {
    fn default() -> Self {
        Self::new(6.0, 4.0, 10.0, WallDamping::default())
    }
}

/// The listener's head: position, orientation and ear spacing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Listener {
    pub position: Vec3,
    pub orientation: Orientation,
    /// Distance between the two ears in meters
    pub ear_spacing: f32,
}

impl Listener {
    pub fn new(position: Vec3, orientation: Orientation, ear_spacing: f32) -> Self {
        Self {
            position,
            orientation,
            ear_spacing,
        }
    }

    pub fn left_ear(&self) -> Vec3 {
        self.position - self.orientation.right() * (self.ear_spacing * 0.5)
    }

    pub fn right_ear(&self) -> Vec3 {
        self.position + self.orientation.right() * (self.ear_spacing * 0.5)
    }

    pub fn validate(&self, room: &RoomGeometry) -> Result<()> {
        if !(self.ear_spacing.is_finite() && self.ear_spacing > 0.0) {
            return Err(AuralisError::Configuration(format!(
                "Ear spacing must be positive, got {}",
                self.ear_spacing
            )));
        }
        if !self.orientation.is_finite() {
            return Err(AuralisError::Configuration(
                "Listener orientation is not finite".into(),
            ));
        }
        if !room.contains(self.position) {
            return Err(AuralisError::Configuration(format!(
                "Listener position {:?} is outside the room",
                self.position
            )));
        }
        Ok(())
    }
}

impl Default for Listener {
    fn default() -> Self {
        Self::new(Vec3::new(3.0, 1.7, 5.0), Orientation::identity(), 0.18)
    }
}

/// A point source inside the room.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoundSource {
    pub position: Vec3,
    /// When set, the update thread moves this source onto the listener every cycle.
    pub track_head: bool,
}

impl SoundSource {
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            track_head: false,
        }
    }

    pub fn tracking_head(position: Vec3) -> Self {
        Self {
            position,
            track_head: true,
        }
    }

    pub fn validate(&self, room: &RoomGeometry) -> Result<()> {
        if !room.contains(self.position) {
            return Err(AuralisError::Configuration(format!(
                "Source position {:?} is outside the room",
                self.position
            )));
        }
        Ok(())
    }
}
