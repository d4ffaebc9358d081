//! Per-surface glidability classification.
//!
//! A pure function consumed by the renderer to color surfaces: can the
//! player, at their current horizontal speed, ramp-slide across a surface
//! without the engine re-grounding them? Re-grounding is skipped while the
//! clipped velocity rises faster than the ground-check threshold, so the
//! classification reduces to the launch velocity a slope of that steepness
//! produces.

use cgmath::Vector3;

use crate::constants::{
    MIN_NO_GROUND_CHECKS_VEL_Z, SV_MAXVELOCITY, SV_STANDABLE_NORMAL, TICK_RATE,
};

/// Whether a glide across a surface would keep the player airborne.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Glidability {
    /// The slide launches the player hard enough to stay airborne.
    Success,
    /// Within one tick of gravity of staying airborne.
    AlmostFail,
    /// The player would be re-grounded (or the surface is standable).
    Fail,
}

/// Classify one surface by its unit normal against a player moving at
/// `hori_speed` horizontally into the slope.
pub fn classify(normal: Vector3<f32>, hori_speed: f32, gravity: f32) -> Glidability {
    let nz = normal.z;

    // Standable ground always re-grounds; walls and ceilings never launch
    if nz >= SV_STANDABLE_NORMAL || nz <= 0.0 {
        return Glidability::Fail;
    }

    let speed = hori_speed.clamp(0.0, SV_MAXVELOCITY);

    // Sliding horizontally into the slope's downhill direction, the clip
    // against the plane converts speed into upward velocity:
    //   v_up = s * sqrt(1 - nz^2) * nz
    let launch_vel_z = speed * (1.0 - nz * nz).max(0.0).sqrt() * nz;

    let threshold = MIN_NO_GROUND_CHECKS_VEL_Z;
    let gravity_per_tick = gravity / TICK_RATE;

    if launch_vel_z > threshold {
        Glidability::Success
    } else if launch_vel_z > threshold - gravity_per_tick {
        Glidability::AlmostFail
    } else {
        Glidability::Fail
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SV_GRAVITY;

    fn slope_normal(nz: f32) -> Vector3<f32> {
        let nx = (1.0 - nz * nz).sqrt();
        Vector3::new(nx, 0.0, nz)
    }

    #[test]
    fn standable_ground_always_fails() {
        let flat = Vector3::new(0.0, 0.0, 1.0);
        assert_eq!(classify(flat, 3000.0, SV_GRAVITY), Glidability::Fail);
        assert_eq!(
            classify(slope_normal(0.7), 3000.0, SV_GRAVITY),
            Glidability::Fail
        );
    }

    #[test]
    fn walls_never_launch() {
        let wall = Vector3::new(1.0, 0.0, 0.0);
        assert_eq!(classify(wall, 3000.0, SV_GRAVITY), Glidability::Fail);
    }

    #[test]
    fn fast_player_on_mid_slope_glides() {
        // nz = 0.5: launch = s * 0.866 * 0.5 = 0.433 s; 500 u/s gives 216
        let ramp = slope_normal(0.5);
        assert_eq!(classify(ramp, 500.0, SV_GRAVITY), Glidability::Success);
    }

    #[test]
    fn slow_player_on_mid_slope_fails() {
        let ramp = slope_normal(0.5);
        // 100 u/s gives a 43 u/s launch, far below the 140 threshold
        assert_eq!(classify(ramp, 100.0, SV_GRAVITY), Glidability::Fail);
    }

    #[test]
    fn near_threshold_is_almost_fail() {
        let ramp = slope_normal(0.5);
        // launch = 0.433 s; threshold 140 -> s ~ 323. Just below, within
        // one tick of gravity (12.5 u/s), is the warning band.
        let s_threshold = MIN_NO_GROUND_CHECKS_VEL_Z / (0.75f32.sqrt() * 0.5);
        let just_below = s_threshold - 10.0;
        assert_eq!(
            classify(ramp, just_below, SV_GRAVITY),
            Glidability::AlmostFail
        );
    }
}
