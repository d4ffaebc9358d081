//! Player and projectile entities.

use cgmath::{InnerSpace, Vector3};

use crate::coll::{CollidableWorld, SweptQuery};
use crate::constants::{BUMPMINE_ARM_DELAY, SV_GRAVITY, SV_STAMINAMAX};
use crate::sim::input::PressCounters;

/// The simulated player entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    /// Feet position.
    pub position: Vector3<f32>,
    pub velocity: Vector3<f32>,
    /// Pitch, yaw, roll in degrees.
    pub angles: Vector3<f32>,
    pub stamina: f32,
    pub crouched: bool,
    pub weapon_slot: u32,
    pub time_since_weapon_switch_sec: f32,
    pub counters: PressCounters,
}

impl Default for Player {
    fn default() -> Self {
        Self {
            position: Vector3::new(0.0, 0.0, 0.0),
            velocity: Vector3::new(0.0, 0.0, 0.0),
            angles: Vector3::new(0.0, 0.0, 0.0),
            stamina: SV_STAMINAMAX,
            crouched: false,
            weapon_slot: 0,
            time_since_weapon_switch_sec: 100.0,
            counters: PressCounters::default(),
        }
    }
}

/// Half extent of the mine hull used for projectile traces.
const BUMPMINE_HULL_HALF: f32 = 2.0;

/// A thrown bump mine in flight or stuck to a surface.
#[derive(Debug, Clone, PartialEq)]
pub struct BumpmineProjectile {
    pub position: Vector3<f32>,
    pub velocity: Vector3<f32>,
    /// Pitch, yaw, roll in degrees.
    pub angles: Vector3<f32>,
    /// 0.0 to 1.0; the mine triggers only once fully armed.
    pub arm_progress: f32,
    /// 0.0 to 1.0 once triggered.
    pub detonate_progress: f32,
}

impl BumpmineProjectile {
    pub fn thrown(position: Vector3<f32>, velocity: Vector3<f32>, angles: Vector3<f32>) -> Self {
        Self {
            position,
            velocity,
            angles,
            arm_progress: 0.0,
            detonate_progress: 0.0,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.arm_progress >= 1.0
    }

    /// World transform for drawing this mine.
    pub fn render_transform(&self) -> cgmath::Matrix4<f32> {
        crate::math::model_transform(self.position, self.angles, 1.0)
    }

    pub fn is_stuck(&self) -> bool {
        self.velocity.magnitude2() == 0.0
    }

    /// Advance one tick: ballistic flight until the first surface contact,
    /// then stick there. Arming progresses regardless.
    pub fn advance(&mut self, step_size_sec: f32, world: &CollidableWorld) {
        self.arm_progress = (self.arm_progress + step_size_sec / BUMPMINE_ARM_DELAY).min(1.0);

        if self.is_stuck() {
            return;
        }

        self.velocity.z -= SV_GRAVITY * step_size_sec;

        let end = self.position + self.velocity * step_size_sec;
        let hull = Vector3::new(BUMPMINE_HULL_HALF, BUMPMINE_HULL_HALF, BUMPMINE_HULL_HALF);
        let query = SweptQuery::new(self.position, end, -hull, hull);
        let trace = world.sweep(&query);

        self.position = trace.end_position(&query);
        if trace.did_hit() {
            self.velocity = Vector3::new(0.0, 0.0, 0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coll::{CollidableWorld, NoExternalAssets};
    use crate::map::synth;
    use crate::phy::DecodeOptions;
    use std::sync::Arc;

    fn floor_world() -> CollidableWorld {
        let map = synth::single_box_map(
            Vector3::new(-512.0, -512.0, -16.0),
            Vector3::new(512.0, 512.0, 0.0),
        );
        let (world, report) =
            CollidableWorld::build(Arc::new(map), &NoExternalAssets, DecodeOptions::default());
        assert!(report.is_empty());
        world
    }

    #[test]
    fn projectile_falls_and_sticks() {
        let world = floor_world();
        let mut mine = BumpmineProjectile::thrown(
            Vector3::new(0.0, 0.0, 100.0),
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(0.0, 0.0, 0.0),
        );

        let dt = 1.0 / 64.0;
        for _ in 0..256 {
            mine.advance(dt, &world);
            if mine.is_stuck() {
                break;
            }
        }

        assert!(mine.is_stuck());
        assert!(mine.is_armed());
        // Resting just above the floor surface (hull half extent + epsilon)
        assert!(mine.position.z > 0.0);
        assert!(mine.position.z < BUMPMINE_HULL_HALF + 0.5);
    }

    #[test]
    fn default_player_spawns_with_full_stamina() {
        let player = Player::default();
        assert_eq!(player.stamina, SV_STAMINAMAX);
        assert!(!player.crouched);
    }
}
