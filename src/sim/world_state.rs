//! The simulated world state: player, movement scratch and projectiles.
//!
//! Value-semantic by design: states are cheap to copy, interpolate and
//! snapshot, which is what the tick engine's finalized/predicted/drawn
//! triple relies on.

use cgmath::Vector3;

use crate::coll::CollidableWorld;
use crate::constants::{
    ATTACK_BOOST_SPEED, BUMPMINE_THROW_SPEED, CL_BACKSPEED, CL_FORWARDSPEED, CL_SIDESPEED,
    NOCLIP_FLY_SPEED, NOCLIP_FLY_VERTICAL, NOCLIP_SPEED_MULTIPLIER, RUN_MAX_SPEED,
};
use crate::math::{angle_vectors, normalize_mut};
use crate::sim::input::{Command, CommandKey, PlayerInput};
use crate::sim::movement::{Buttons, MoveContext, MoveState};
use crate::sim::player::{BumpmineProjectile, Player};

/// One complete simulation state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorldState {
    pub player: Player,
    pub move_state: MoveState,
    pub projectiles: Vec<BumpmineProjectile>,
}

impl WorldState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Horizontal speed of the player, for display.
    pub fn horizontal_speed(&self) -> f32 {
        let v = self.move_state.velocity;
        (v.x * v.x + v.y * v.y).sqrt()
    }

    /// Linear interpolation for drawing. Positions blend; every discrete
    /// attribute snaps to the later state.
    pub fn interpolate(state_a: &WorldState, state_b: &WorldState, phase: f32) -> WorldState {
        if phase <= 0.0 {
            return state_a.clone();
        }
        if phase >= 1.0 {
            return state_b.clone();
        }

        let mut interp = state_b.clone();
        interp.player.position =
            state_a.player.position + phase * (state_b.player.position - state_a.player.position);
        interp.move_state.origin = interp.player.position;

        for (i, projectile) in interp.projectiles.iter_mut().enumerate() {
            if let Some(prev) = state_a.projectiles.get(i) {
                projectile.position =
                    prev.position + phase * (projectile.position - prev.position);
            }
        }

        interp
    }

    /// Advance this state by one tick, applying the given inputs in order.
    /// Without a loaded world the tick is a no-op.
    pub fn do_time_step(
        &mut self,
        step_size_sec: f64,
        player_inputs: &[PlayerInput],
        world: Option<&CollidableWorld>,
    ) {
        let Some(world) = world else {
            log::trace!("[WorldState] tick requested before a world was loaded");
            return;
        };
        let time_delta = step_size_sec as f32;

        // Conclusions drawn from player input
        let mut try_attack = false;

        // Fold the input queue into the press counters, chronologically
        for input in player_inputs {
            for &cmd in &input.commands {
                if cmd == Command::PlusAttack && !self.player.counters.is_active(CommandKey::Attack)
                {
                    try_attack = true;
                }
                self.player.counters.apply(cmd);
            }
        }

        // The latest input decides the new viewing angles and weapon
        if let Some(last) = player_inputs.last() {
            self.player.angles = Vector3::new(last.view_pitch, last.view_yaw, 0.0);
            self.player.weapon_slot = last.weapon_slot;
        }

        // Key state at the end of the tick's input queue is what counts
        let counters = &self.player.counters;
        let try_move_forward = counters.is_active(CommandKey::Forward);
        let try_move_back = counters.is_active(CommandKey::Back);
        let try_move_left = counters.is_active(CommandKey::MoveLeft);
        let try_move_right = counters.is_active(CommandKey::MoveRight);

        if counters.is_active(CommandKey::Attack2) {
            // Debug free-fly path, active while attack2 is held
            self.fly_move(time_delta);
        } else {
            self.walk_tick(
                time_delta,
                try_attack,
                try_move_forward,
                try_move_back,
                try_move_left,
                try_move_right,
                world,
            );
        }

        for projectile in &mut self.projectiles {
            projectile.advance(time_delta, world);
        }
    }

    /// Spawn a bump mine throw from the eye along the view direction.
    pub fn throw_bumpmine(&mut self, throw_speed: f32) {
        let basis = angle_vectors(self.player.angles);
        let eye = self.player.position
            + Vector3::new(0.0, 0.0, crate::constants::PLAYER_EYE_LEVEL_STANDING);
        self.projectiles.push(BumpmineProjectile::thrown(
            eye,
            throw_speed * basis.forward,
            self.player.angles,
        ));
    }

    fn fly_move(&mut self, time_delta: f32) {
        let counters = &self.player.counters;
        let yaw = self.player.angles.y;

        let forward_xy = Vector3::new(
            yaw.to_radians().cos(),
            yaw.to_radians().sin(),
            0.0,
        );
        let right_xy = Vector3::new(
            (yaw - 90.0).to_radians().cos(),
            (yaw - 90.0).to_radians().sin(),
            0.0,
        );

        let forward = counters.is_active(CommandKey::Forward);
        let back = counters.is_active(CommandKey::Back);
        let left = counters.is_active(CommandKey::MoveLeft);
        let right = counters.is_active(CommandKey::MoveRight);

        let mut wish_dir = Vector3::new(0.0, 0.0, 0.0);
        if forward && !back {
            wish_dir += forward_xy;
        } else if back && !forward {
            wish_dir -= forward_xy;
        }
        if right && !left {
            wish_dir += right_xy;
        } else if left && !right {
            wish_dir -= right_xy;
        }

        if wish_dir.x == 0.0 && wish_dir.y == 0.0 {
            self.player.velocity.x = 0.0;
            self.player.velocity.y = 0.0;
        } else {
            normalize_mut(&mut wish_dir);

            let mut speed = NOCLIP_FLY_SPEED;
            if counters.is_active(CommandKey::Speed) {
                speed *= 2.0 * NOCLIP_SPEED_MULTIPLIER;
            }
            self.player.velocity.x = speed * wish_dir.x;
            self.player.velocity.y = speed * wish_dir.y;
        }

        if counters.is_active(CommandKey::Jump) {
            self.player.velocity.z = if counters.is_active(CommandKey::Speed) {
                NOCLIP_SPEED_MULTIPLIER * NOCLIP_FLY_VERTICAL
            } else {
                NOCLIP_FLY_VERTICAL
            };
        } else if counters.is_active(CommandKey::Duck) {
            self.player.velocity.z = -NOCLIP_SPEED_MULTIPLIER * NOCLIP_FLY_VERTICAL;
        } else {
            self.player.velocity.z = 0.0;
        }

        self.player.position += time_delta * self.player.velocity;
    }

    #[allow(clippy::too_many_arguments)]
    fn walk_tick(
        &mut self,
        time_delta: f32,
        try_attack: bool,
        forward: bool,
        back: bool,
        left: bool,
        right: bool,
        world: &CollidableWorld,
    ) {
        let counters = &self.player.counters;

        let mut buttons = Buttons::empty();
        if forward {
            buttons |= Buttons::FORWARD;
        }
        if back {
            buttons |= Buttons::BACK;
        }
        if left {
            buttons |= Buttons::MOVELEFT;
        }
        if right {
            buttons |= Buttons::MOVERIGHT;
        }
        if counters.is_active(CommandKey::Jump) {
            buttons |= Buttons::JUMP;
        }
        if counters.is_active(CommandKey::Speed) {
            buttons |= Buttons::SPEED;
        }
        if counters.is_active(CommandKey::Duck) {
            buttons |= Buttons::DUCK;
        }
        self.move_state.buttons = buttons;

        let mut forward_move = 0.0;
        if forward {
            forward_move += CL_FORWARDSPEED;
        }
        if back {
            forward_move -= CL_BACKSPEED;
        }
        let mut side_move = 0.0;
        if right {
            side_move += CL_SIDESPEED;
        }
        if left {
            side_move -= CL_SIDESPEED;
        }
        self.move_state.forward_move = forward_move;
        self.move_state.side_move = side_move;

        self.move_state.view_angles = self.player.angles;
        self.move_state.origin = self.player.position;
        self.move_state.stamina = self.player.stamina;

        // An attack press on the counter-zero edge throws a bump mine from
        // the eye and, as a debug helper, boosts the player along the view
        if try_attack {
            self.throw_bumpmine(BUMPMINE_THROW_SPEED);
            let basis = angle_vectors(self.player.angles);
            self.move_state.velocity += ATTACK_BOOST_SPEED * basis.forward;
        }

        self.move_state.max_speed = RUN_MAX_SPEED;

        let mut ctx = MoveContext::new(world, &mut self.move_state);
        ctx.player_move(time_delta);
        ctx.finish_move();

        // Publish the movement results back into the player entity
        self.player.position = self.move_state.origin;
        self.player.crouched = self.move_state.ducked;
        self.player.stamina = self.move_state.stamina;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::coll::{CollidableWorld, NoExternalAssets};
    use crate::map::synth;
    use crate::phy::DecodeOptions;

    fn floor_world() -> CollidableWorld {
        let map = synth::single_box_map(
            Vector3::new(-4096.0, -4096.0, -16.0),
            Vector3::new(4096.0, 4096.0, 64.0),
        );
        let (world, report) =
            CollidableWorld::build(Arc::new(map), &NoExternalAssets, DecodeOptions::default());
        assert!(report.is_empty());
        world
    }

    #[test]
    fn tick_without_world_is_a_no_op() {
        let mut state = WorldState::new();
        state.player.position = Vector3::new(1.0, 2.0, 3.0);
        let before = state.clone();
        state.do_time_step(1.0 / 64.0, &[], None);
        assert_eq!(state, before);
    }

    #[test]
    fn interpolation_blends_positions_only() {
        let mut a = WorldState::new();
        a.player.position = Vector3::new(0.0, 0.0, 0.0);
        a.move_state.on_ground = false;

        let mut b = WorldState::new();
        b.player.position = Vector3::new(10.0, 0.0, 0.0);
        b.move_state.on_ground = true;

        let mid = WorldState::interpolate(&a, &b, 0.25);
        assert!((mid.player.position.x - 2.5).abs() < 1e-5);
        // Discrete attributes snap to the later state
        assert!(mid.move_state.on_ground);

        assert_eq!(WorldState::interpolate(&a, &b, -1.0), a);
        assert_eq!(WorldState::interpolate(&a, &b, 2.0), b);
    }

    #[test]
    fn view_angles_come_from_latest_input() {
        let world = floor_world();
        let mut state = WorldState::new();
        state.player.position = Vector3::new(0.0, 0.0, 64.03125);
        state.move_state.on_ground = true;

        let t = std::time::Instant::now();
        let inputs = vec![
            PlayerInput::at(t).with_view(5.0, 10.0),
            PlayerInput::at(t).with_view(-3.0, 90.0),
        ];
        state.do_time_step(1.0 / 64.0, &inputs, Some(&world));
        assert_eq!(state.player.angles, Vector3::new(-3.0, 90.0, 0.0));
    }

    #[test]
    fn fly_mode_ignores_collision() {
        let world = floor_world();
        let mut state = WorldState::new();
        state.player.position = Vector3::new(0.0, 0.0, 100.0);

        let t = std::time::Instant::now();
        // Hold attack2 + forward, looking along +X
        let press = PlayerInput::at(t)
            .with_commands(&[Command::PlusAttack2, Command::PlusForward])
            .with_view(0.0, 0.0);
        state.do_time_step(1.0 / 64.0, &[press], Some(&world));

        let expected_x = NOCLIP_FLY_SPEED / 64.0;
        assert!((state.player.position.x - expected_x).abs() < 1e-3);
        assert_eq!(state.player.velocity.y, 0.0);
    }

    #[test]
    fn attack_edge_throws_a_bumpmine() {
        let world = floor_world();
        let mut state = WorldState::new();
        state.player.position = Vector3::new(0.0, 0.0, 64.03125);
        state.move_state.origin = state.player.position;
        state.move_state.on_ground = true;

        let t = std::time::Instant::now();
        let press = PlayerInput::at(t).with_commands(&[Command::PlusAttack]);
        state.do_time_step(1.0 / 64.0, &[press], Some(&world));
        assert_eq!(state.projectiles.len(), 1);
        assert!(state.projectiles[0].position.z > 64.0, "thrown from the eye");

        // Holding attack does not spawn another mine
        state.do_time_step(1.0 / 64.0, &[PlayerInput::at(t)], Some(&world));
        assert_eq!(state.projectiles.len(), 1);

        // Release and press again throws the next one
        let release = PlayerInput::at(t).with_commands(&[Command::MinusAttack]);
        state.do_time_step(1.0 / 64.0, &[release], Some(&world));
        let press = PlayerInput::at(t).with_commands(&[Command::PlusAttack]);
        state.do_time_step(1.0 / 64.0, &[press], Some(&world));
        assert_eq!(state.projectiles.len(), 2);
    }

    #[test]
    fn thrown_bumpmine_is_tracked() {
        let world = floor_world();
        let mut state = WorldState::new();
        state.player.position = Vector3::new(0.0, 0.0, 64.03125);
        state.player.angles = Vector3::new(0.0, 0.0, 0.0);
        state.throw_bumpmine(600.0);
        assert_eq!(state.projectiles.len(), 1);
        assert!(state.projectiles[0].velocity.x > 0.0);

        let t = std::time::Instant::now();
        state.do_time_step(1.0 / 64.0, &[PlayerInput::at(t)], Some(&world));
        assert!(state.projectiles[0].position.x > 0.0);
    }
}
