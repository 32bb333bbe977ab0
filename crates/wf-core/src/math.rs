//! 3D math for spatial playback
//!
//! Minimal vector/pose types shared by the backend's 3D gain model and the
//! engine's listener state.

use serde::{Deserialize, Serialize};

/// 3D vector (right-handed, -Z forward).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    /// Default listener forward direction.
    pub const FORWARD: Self = Self {
        x: 0.0,
        y: 0.0,
        z: -1.0,
    };

    /// Default listener up direction.
    pub const UP: Self = Self {
        x: 0.0,
        y: 1.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub fn length_squared(self) -> f32 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    #[inline]
    pub fn length(self) -> f32 {
        self.length_squared().sqrt()
    }

    /// True when the vector is too short to carry a direction. Orientation
    /// inputs in this state are treated as "unset" and skipped.
    #[inline]
    pub fn is_near_zero(self) -> bool {
        self.length_squared() < 1e-12
    }

    /// Unit vector, or [`Vec3::FORWARD`] when the input is near zero.
    pub fn normalized(self) -> Self {
        let len = self.length();
        if len < 1e-6 {
            return Self::FORWARD;
        }
        Self {
            x: self.x / len,
            y: self.y / len,
            z: self.z / len,
        }
    }

    #[inline]
    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    #[inline]
    pub fn sub(self, other: Self) -> Self {
        Self {
            x: self.x - other.x,
            y: self.y - other.y,
            z: self.z - other.z,
        }
    }

    #[inline]
    pub fn distance_to(self, other: Self) -> f32 {
        self.sub(other).length()
    }
}

/// Listener pose: position plus forward/up basis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ListenerPose {
    pub position: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
}

impl ListenerPose {
    /// Identity pose: origin, looking down -Z, +Y up.
    pub fn identity() -> Self {
        Self {
            position: Vec3::ZERO,
            forward: Vec3::FORWARD,
            up: Vec3::UP,
        }
    }
}

impl Default for ListenerPose {
    fn default() -> Self {
        Self::identity()
    }
}
