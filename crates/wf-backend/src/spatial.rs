//! 3D gain model
//!
//! Inverse-distance attenuation clamped between the source's min/max
//! distances, times a cone factor derived from the angle between the source's
//! facing direction and the direction to the listener. Applied per render
//! block; sub-block interpolation is not needed at display-frame update
//! rates.

use crate::api::Spatial3dMode;
use wf_core::{ListenerPose, Vec3};

/// Per-channel 3D state.
#[derive(Debug, Clone)]
pub struct Spatial3d {
    pub mode: Spatial3dMode,
    pub position: Vec3,
    /// Facing direction; `None` means omnidirectional (cone ignored).
    pub orientation: Option<Vec3>,
    pub min_distance: f32,
    pub max_distance: f32,
    pub cone_inner_deg: f32,
    pub cone_outer_deg: f32,
    pub cone_outer_volume: f32,
}

impl Default for Spatial3d {
    fn default() -> Self {
        Self {
            mode: Spatial3dMode::Off,
            position: Vec3::ZERO,
            orientation: None,
            min_distance: 1.0,
            max_distance: 10_000.0,
            cone_inner_deg: 360.0,
            cone_outer_deg: 360.0,
            cone_outer_volume: 1.0,
        }
    }
}

/// Gain in [0, 1] for a source at `params` heard from `listener`.
pub fn spatial_gain(params: &Spatial3d, listener: &ListenerPose) -> f32 {
    if params.mode == Spatial3dMode::Off {
        return 1.0;
    }

    // Relative mode positions the source in listener space.
    let to_listener = match params.mode {
        Spatial3dMode::Relative => Vec3::ZERO.sub(params.position),
        _ => listener.position.sub(params.position),
    };
    let distance = to_listener.length();

    let min_d = params.min_distance.max(1e-3);
    let max_d = params.max_distance.max(min_d);
    let clamped = distance.clamp(min_d, max_d);
    let mut gain = (min_d / clamped).min(1.0);

    if let Some(facing) = params.orientation
        && params.cone_outer_deg < 360.0
        && distance > 1e-6
    {
        let facing = facing.normalized();
        let cos_angle = (facing.dot(to_listener) / distance).clamp(-1.0, 1.0);
        let angle_deg = cos_angle.acos().to_degrees();

        let inner_half = params.cone_inner_deg.min(params.cone_outer_deg) * 0.5;
        let outer_half = (params.cone_outer_deg * 0.5).max(inner_half + 1e-3);

        let cone = if angle_deg <= inner_half {
            1.0
        } else if angle_deg >= outer_half {
            params.cone_outer_volume
        } else {
            let t = (angle_deg - inner_half) / (outer_half - inner_half);
            1.0 + (params.cone_outer_volume - 1.0) * t
        };
        gain *= cone.clamp(0.0, 1.0);
    }

    gain
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn listener_at_origin() -> ListenerPose {
        ListenerPose::identity()
    }

    #[test]
    fn off_mode_is_unity() {
        let params = Spatial3d::default();
        assert_eq!(spatial_gain(&params, &listener_at_origin()), 1.0);
    }

    #[test]
    fn inverse_distance_halves_at_double_min() {
        let params = Spatial3d {
            mode: Spatial3dMode::Normal,
            position: Vec3::new(2.0, 0.0, 0.0),
            min_distance: 1.0,
            ..Default::default()
        };
        assert_relative_eq!(
            spatial_gain(&params, &listener_at_origin()),
            0.5,
            epsilon = 1e-6
        );
    }

    #[test]
    fn gain_stops_falling_past_max_distance() {
        let near_max = Spatial3d {
            mode: Spatial3dMode::Normal,
            position: Vec3::new(10.0, 0.0, 0.0),
            min_distance: 1.0,
            max_distance: 10.0,
            ..Default::default()
        };
        let beyond_max = Spatial3d {
            position: Vec3::new(500.0, 0.0, 0.0),
            ..near_max.clone()
        };
        let listener = listener_at_origin();
        assert_relative_eq!(
            spatial_gain(&near_max, &listener),
            spatial_gain(&beyond_max, &listener),
            epsilon = 1e-6
        );
    }

    #[test]
    fn cone_attenuates_behind_source() {
        // Source at +X facing away from the listener.
        let params = Spatial3d {
            mode: Spatial3dMode::Normal,
            position: Vec3::new(1.0, 0.0, 0.0),
            orientation: Some(Vec3::new(1.0, 0.0, 0.0)),
            cone_inner_deg: 60.0,
            cone_outer_deg: 120.0,
            cone_outer_volume: 0.25,
            ..Default::default()
        };
        let gain = spatial_gain(&params, &listener_at_origin());
        assert_relative_eq!(gain, 0.25, epsilon = 1e-6);

        // Same source facing the listener sits inside the inner cone.
        let facing = Spatial3d {
            orientation: Some(Vec3::new(-1.0, 0.0, 0.0)),
            ..params
        };
        assert_relative_eq!(spatial_gain(&facing, &listener_at_origin()), 1.0, epsilon = 1e-6);
    }
}
