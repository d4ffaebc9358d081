//! Server-authoritative player movement.
//!
//! One tick of WALK-mode movement: clamp wish parameters, tick timers,
//! optional jump, ground friction, ground/air acceleration, the multi-bump
//! slide with plane clipping, step up/down, the stay-on-ground snap, and the
//! two half-steps of gravity that bracket it all. The world is read through
//! a shared reference passed per call; the movement state is a plain value
//! that lives inside the world state.

use bitflags::bitflags;
use cgmath::{InnerSpace, Vector3};

use crate::coll::{CollidableWorld, SweptQuery, TraceResult};
use crate::constants::{
    DIST_EPSILON, JUMP_TIME_MS, MAX_BUMPS, MAX_CLIP_PLANES, MIN_LEAVE_GROUND_VEL_Z,
    MIN_NO_GROUND_CHECKS_VEL_Z, PLAYER_FALL_PUNCH_THRESHOLD, PLAYER_HEIGHT_CROUCHED,
    PLAYER_HEIGHT_STANDING, PLAYER_MAX_SAFE_FALL_SPEED, PLAYER_MIN_BOUNCE_SPEED, PLAYER_WIDTH,
    POST_JUMP_SURFACE_FRICTION, SV_ACCELERATE, SV_AIRACCELERATE, SV_AIR_MAX_WISHSPEED,
    SV_FRICTION, SV_GRAVITY, SV_JUMP_IMPULSE, SV_MAXSPEED, SV_MAXVELOCITY, SV_STAMINAJUMPCOST,
    SV_STAMINALANDCOST, SV_STAMINAMAX, SV_STAMINARECOVERYRATE, SV_STANDABLE_NORMAL, SV_STEPSIZE,
    SV_STOPSPEED, COORD_RESOLUTION,
};
use crate::math::{angle_vectors, normalize_mut};

bitflags! {
    /// Button state handed to the movement pass.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Buttons: u32 {
        const JUMP      = 1 << 1;
        const DUCK      = 1 << 2;
        const FORWARD   = 1 << 3;
        const BACK      = 1 << 4;
        const MOVELEFT  = 1 << 9;
        const MOVERIGHT = 1 << 10;
        const SPEED     = 1 << 17;
    }
}

/// Movement modes. Only Walk is fully implemented; Ladder and Observer are
/// stubs with the same external contract, Noclip is the debug free-fly path
/// handled a level above.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveType {
    None,
    Walk,
    Fly,
    Ladder,
    Noclip,
    Observer,
}

/// Movement state carried across ticks. Value-semantic; part of the world
/// state snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveState {
    pub move_type: MoveType,
    pub on_ground: bool,
    /// Surface tag of the ground currently stood on; -1 when airborne.
    pub ground_surface: i32,

    pub ducked: bool,
    pub ducking: bool,
    pub in_duck_jump: bool,
    /// Remaining duck transition time, in milliseconds.
    pub duck_time_ms: f32,
    pub duck_jump_time_ms: f32,
    /// Auto-unduck timer armed on jump, in milliseconds.
    pub jump_time_ms: f32,

    /// Downward speed at the moment the ground was left.
    pub fall_velocity: f32,
    pub allow_auto_movement: bool,

    pub max_speed: f32,
    pub forward_move: f32,
    pub side_move: f32,
    pub buttons: Buttons,
    pub old_buttons: Buttons,

    /// Pitch, yaw, roll in degrees.
    pub view_angles: Vector3<f32>,
    pub origin: Vector3<f32>,
    pub velocity: Vector3<f32>,
    pub base_velocity: Vector3<f32>,

    pub surface_friction: f32,
    pub stamina: f32,
}

impl Default for MoveState {
    fn default() -> Self {
        Self {
            move_type: MoveType::Walk,
            on_ground: false,
            ground_surface: -1,
            ducked: false,
            ducking: false,
            in_duck_jump: false,
            duck_time_ms: 0.0,
            duck_jump_time_ms: 0.0,
            jump_time_ms: 0.0,
            fall_velocity: 0.0,
            allow_auto_movement: true,
            max_speed: 0.0,
            forward_move: 0.0,
            side_move: 0.0,
            buttons: Buttons::empty(),
            old_buttons: Buttons::empty(),
            view_angles: Vector3::new(0.0, 0.0, 0.0),
            origin: Vector3::new(0.0, 0.0, 0.0),
            velocity: Vector3::new(0.0, 0.0, 0.0),
            base_velocity: Vector3::new(0.0, 0.0, 0.0),
            surface_friction: 1.0,
            stamina: SV_STAMINAMAX,
        }
    }
}

// Plane comparisons in the ported movement logic are exact, never fuzzy.
fn vectors_exactly_equal(a: Vector3<f32>, b: Vector3<f32>) -> bool {
    a.x == b.x && a.y == b.y && a.z == b.z
}

/// A hull trace with the query it answered, so endpoints can be recovered.
#[derive(Debug, Clone, Copy)]
struct HullTrace {
    query: SweptQuery,
    result: TraceResult,
}

impl HullTrace {
    fn end_position(&self) -> Vector3<f32> {
        self.result.end_position(&self.query)
    }
}

/// Movement pass over one state against one world snapshot.
pub struct MoveContext<'a> {
    world: &'a CollidableWorld,
    pub state: &'a mut MoveState,
}

impl<'a> MoveContext<'a> {
    pub fn new(world: &'a CollidableWorld, state: &'a mut MoveState) -> Self {
        Self { world, state }
    }

    /// Hull mins for the given crouch state (feet at the origin).
    /// Crouching only lowers the top of the hull.
    pub fn player_mins(_ducked: bool) -> Vector3<f32> {
        Vector3::new(-0.5 * PLAYER_WIDTH, -0.5 * PLAYER_WIDTH, 0.0)
    }

    /// Hull maxs for the given crouch state.
    pub fn player_maxs(ducked: bool) -> Vector3<f32> {
        let height = if ducked {
            PLAYER_HEIGHT_CROUCHED
        } else {
            PLAYER_HEIGHT_STANDING
        };
        Vector3::new(0.5 * PLAYER_WIDTH, 0.5 * PLAYER_WIDTH, height)
    }

    fn current_mins(&self) -> Vector3<f32> {
        Self::player_mins(self.state.ducked)
    }

    fn current_maxs(&self) -> Vector3<f32> {
        Self::player_maxs(self.state.ducked)
    }

    fn trace_player_bbox(&self, start: Vector3<f32>, end: Vector3<f32>) -> HullTrace {
        let query = SweptQuery::new(start, end, self.current_mins(), self.current_maxs());
        HullTrace {
            query,
            result: self.world.sweep(&query),
        }
    }

    fn try_touch_ground(
        &self,
        start: Vector3<f32>,
        end: Vector3<f32>,
        mins: Vector3<f32>,
        maxs: Vector3<f32>,
    ) -> HullTrace {
        let query = SweptQuery::new(start, end, mins, maxs);
        HullTrace {
            query,
            result: self.world.sweep(&query),
        }
    }

    /// Top-level per-tick movement entry point.
    pub fn player_move(&mut self, time_delta: f32) {
        self.check_parameters();
        self.reduce_timers(time_delta);

        if self.state.move_type != MoveType::Walk {
            self.categorize_position();
        } else if self.state.velocity.z > MIN_LEAVE_GROUND_VEL_Z {
            self.set_ground_entity(false, -1);
        }

        // If we are not on ground, store off how fast we are moving down
        if !self.state.on_ground {
            self.state.fall_velocity = -self.state.velocity.z;
        }

        match self.state.move_type {
            MoveType::Walk => self.full_walk_move(time_delta),
            // Ladder and observer movement keep the walk-mode contract but
            // are not simulated yet; noclip/fly are handled by the caller.
            MoveType::Ladder
            | MoveType::Observer
            | MoveType::Noclip
            | MoveType::Fly
            | MoveType::None => {}
        }
    }

    /// After-move bookkeeping shared by all move types.
    pub fn finish_move(&mut self) {
        self.state.old_buttons = self.state.buttons;
    }

    fn check_parameters(&mut self) {
        if self.state.move_type == MoveType::Noclip {
            return;
        }

        let spd = self.state.forward_move * self.state.forward_move
            + self.state.side_move * self.state.side_move;

        self.state.max_speed = SV_MAXSPEED.min(self.state.max_speed);

        if spd != 0.0 && spd > self.state.max_speed * self.state.max_speed {
            let ratio = self.state.max_speed / spd.sqrt();
            self.state.forward_move *= ratio;
            self.state.side_move *= ratio;
        }
    }

    fn reduce_timers(&mut self, time_delta: f32) {
        let frame_msec = 1000.0 * time_delta;

        if self.state.duck_time_ms > 0.0 {
            self.state.duck_time_ms = (self.state.duck_time_ms - frame_msec).max(0.0);
        }
        if self.state.duck_jump_time_ms > 0.0 {
            self.state.duck_jump_time_ms = (self.state.duck_jump_time_ms - frame_msec).max(0.0);
        }
        if self.state.jump_time_ms > 0.0 {
            self.state.jump_time_ms = (self.state.jump_time_ms - frame_msec).max(0.0);
        }

        self.state.stamina =
            (self.state.stamina + SV_STAMINARECOVERYRATE * time_delta).min(SV_STAMINAMAX);
    }

    fn start_gravity(&mut self, frametime: f32) {
        let ent_gravity = 1.0;

        // Half a step now, the other half after the move; this keeps the
        // integration symmetric over the tick.
        self.state.velocity.z -= ent_gravity * SV_GRAVITY * 0.5 * frametime;

        self.state.velocity.z += self.state.base_velocity.z * frametime;
        self.state.base_velocity.z = 0.0;

        self.check_velocity();
    }

    fn finish_gravity(&mut self, frametime: f32) {
        let ent_gravity = 1.0;
        self.state.velocity.z -= ent_gravity * SV_GRAVITY * 0.5 * frametime;
        self.check_velocity();
    }

    fn check_velocity(&mut self) {
        for i in 0..3 {
            if self.state.velocity[i].is_nan() {
                log::warn!("[Movement] got a NaN velocity on axis {}", i);
                self.state.velocity[i] = 0.0;
            }
            if self.state.origin[i].is_nan() {
                log::warn!("[Movement] got a NaN origin on axis {}", i);
                self.state.origin[i] = 0.0;
            }

            if self.state.velocity[i] > SV_MAXVELOCITY {
                log::debug!("[Movement] velocity too high on axis {}", i);
                self.state.velocity[i] = SV_MAXVELOCITY;
            } else if self.state.velocity[i] < -SV_MAXVELOCITY {
                log::debug!("[Movement] velocity too low on axis {}", i);
                self.state.velocity[i] = -SV_MAXVELOCITY;
            }
        }
    }

    /// Ground friction. Water friction would live here too.
    fn friction(&mut self, frametime: f32) {
        let speed = self.state.velocity.magnitude();
        if speed < 0.1 {
            return;
        }

        let mut drop = 0.0;

        if self.state.on_ground {
            let friction = SV_FRICTION * self.state.surface_friction;

            // Bleed off some speed, but if we have less than the bleed
            // threshold, bleed the threshold amount.
            let control = if speed < SV_STOPSPEED {
                SV_STOPSPEED
            } else {
                speed
            };
            drop += control * friction * frametime;
        }

        let mut newspeed = speed - drop;
        if newspeed < 0.0 {
            newspeed = 0.0;
        }

        if newspeed != speed {
            newspeed /= speed;
            self.state.velocity *= newspeed;
        }
    }

    fn accelerate(&mut self, wishdir: Vector3<f32>, wishspeed: f32, accel: f32, frametime: f32) {
        let currentspeed = self.state.velocity.dot(wishdir);
        let addspeed = wishspeed - currentspeed;
        if addspeed <= 0.0 {
            return;
        }

        let mut accelspeed = accel * frametime * wishspeed * self.state.surface_friction;
        if accelspeed > addspeed {
            accelspeed = addspeed;
        }

        self.state.velocity += accelspeed * wishdir;
    }

    fn air_accelerate(
        &mut self,
        frametime: f32,
        wishdir: Vector3<f32>,
        wishspeed: f32,
        accel: f32,
    ) {
        let mut wishspd = wishspeed;
        if wishspd > SV_AIR_MAX_WISHSPEED {
            wishspd = SV_AIR_MAX_WISHSPEED;
        }

        let currentspeed = self.state.velocity.dot(wishdir);
        let addspeed = wishspd - currentspeed;
        if addspeed <= 0.0 {
            return;
        }

        // Acceleration scales with the uncapped wish speed
        let mut accelspeed = accel * wishspeed * frametime * self.state.surface_friction;
        if accelspeed > addspeed {
            accelspeed = addspeed;
        }

        self.state.velocity += accelspeed * wishdir;
    }

    fn air_move(&mut self, frametime: f32) {
        let basis = angle_vectors(self.state.view_angles);
        let mut forward = basis.forward;
        let mut right = basis.right;

        let fmove = self.state.forward_move;
        let smove = self.state.side_move;

        forward.z = 0.0;
        right.z = 0.0;
        normalize_mut(&mut forward);
        normalize_mut(&mut right);

        let mut wishvel = Vector3::new(
            forward.x * fmove + right.x * smove,
            forward.y * fmove + right.y * smove,
            0.0,
        );

        let mut wishdir = wishvel;
        let mut wishspeed = normalize_mut(&mut wishdir);

        if wishspeed != 0.0 && wishspeed > self.state.max_speed {
            wishvel *= self.state.max_speed / wishspeed;
            wishspeed = self.state.max_speed;
        }

        self.air_accelerate(frametime, wishdir, wishspeed, SV_AIRACCELERATE);

        self.state.velocity += self.state.base_velocity;
        self.try_player_move(frametime, None);
        self.state.velocity -= self.state.base_velocity;
    }

    fn walk_move(&mut self, frametime: f32) {
        let basis = angle_vectors(self.state.view_angles);
        let mut forward = basis.forward;
        let mut right = basis.right;

        let fmove = self.state.forward_move;
        let smove = self.state.side_move;

        if forward.z != 0.0 {
            forward.z = 0.0;
            normalize_mut(&mut forward);
        }
        if right.z != 0.0 {
            right.z = 0.0;
            normalize_mut(&mut right);
        }

        let mut wishvel = Vector3::new(
            forward.x * fmove + right.x * smove,
            forward.y * fmove + right.y * smove,
            0.0,
        );

        let mut wishdir = wishvel;
        let mut wishspeed = normalize_mut(&mut wishdir);

        if wishspeed != 0.0 && wishspeed > self.state.max_speed {
            wishvel *= self.state.max_speed / wishspeed;
            wishspeed = self.state.max_speed;
        }

        self.state.velocity.z = 0.0;
        self.accelerate(wishdir, wishspeed, SV_ACCELERATE, frametime);
        self.state.velocity.z = 0.0;

        self.state.velocity += self.state.base_velocity;

        let spd = self.state.velocity.magnitude();
        if spd < 1.0 {
            self.state.velocity = Vector3::new(0.0, 0.0, 0.0);
            self.state.velocity -= self.state.base_velocity;
            return;
        }

        // First try moving directly to the next spot
        let dest = Vector3::new(
            self.state.origin.x + self.state.velocity.x * frametime,
            self.state.origin.y + self.state.velocity.y * frametime,
            self.state.origin.z,
        );
        let tr = self.trace_player_bbox(self.state.origin, dest);

        if tr.result.fraction == 1.0 {
            self.state.origin = dest;
            self.state.velocity -= self.state.base_velocity;
            self.stay_on_ground();
            return;
        }

        // Don't walk up stairs if not on ground
        if !self.state.on_ground {
            self.state.velocity -= self.state.base_velocity;
            return;
        }

        self.step_move(frametime, dest, tr);

        self.state.velocity -= self.state.base_velocity;

        self.stay_on_ground();
    }

    /// The basic slide that attempts to climb step heights: take both the
    /// plain slide and the raised slide, keep whichever travels farther.
    fn step_move(&mut self, frametime: f32, dest: Vector3<f32>, trace: HullTrace) {
        // Down results
        let pos = self.state.origin;
        let vel = self.state.velocity;

        self.try_player_move(frametime, Some((dest, &trace)));
        let down_pos = self.state.origin;
        let down_vel = self.state.velocity;

        // Reset and raise by a step height
        self.state.origin = pos;
        self.state.velocity = vel;

        let mut end = self.state.origin;
        if self.state.allow_auto_movement {
            end.z += SV_STEPSIZE + DIST_EPSILON;
        }

        let trace_up = self.trace_player_bbox(self.state.origin, end);
        if !trace_up.result.startsolid && !trace_up.result.allsolid {
            self.state.origin = trace_up.end_position();
        }

        self.try_player_move(frametime, None);

        // Attempt to step back down
        let mut end = self.state.origin;
        if self.state.allow_auto_movement {
            end.z -= SV_STEPSIZE + DIST_EPSILON;
        }

        let trace_down = self.trace_player_bbox(self.state.origin, end);

        // If we are not on the ground any more, use the plain slide
        if trace_down.result.plane_normal.z < SV_STANDABLE_NORMAL {
            self.state.origin = down_pos;
            self.state.velocity = down_vel;
            return;
        }

        if !trace_down.result.startsolid && !trace_down.result.allsolid {
            self.state.origin = trace_down.end_position();
        }
        let up_pos = self.state.origin;

        // Decide which attempt went farther
        let down_dist = (down_pos.x - pos.x) * (down_pos.x - pos.x)
            + (down_pos.y - pos.y) * (down_pos.y - pos.y);
        let up_dist =
            (up_pos.x - pos.x) * (up_pos.x - pos.x) + (up_pos.y - pos.y) * (up_pos.y - pos.y);

        if down_dist > up_dist {
            self.state.origin = down_pos;
            self.state.velocity = down_vel;
        } else {
            // Copy the Z velocity from the plain slide
            self.state.velocity.z = down_vel.z;
        }
    }

    /// Slide along up to four impact planes, following creases and giving
    /// up in acute corners.
    fn try_player_move(
        &mut self,
        frametime: f32,
        first: Option<(Vector3<f32>, &HullTrace)>,
    ) -> u32 {
        let mut blocked = 0u32;
        let mut numplanes = 0usize;
        let mut planes = [Vector3::new(0.0, 0.0, 0.0); MAX_CLIP_PLANES];

        let mut original_velocity = self.state.velocity;
        let primal_velocity = self.state.velocity;

        let mut all_fraction = 0.0f32;
        let mut time_left = frametime;

        let mut new_velocity = Vector3::new(0.0, 0.0, 0.0);

        for _bumpcount in 0..MAX_BUMPS {
            if self.state.velocity.magnitude() == 0.0 {
                break;
            }

            let end = self.state.origin + time_left * self.state.velocity;

            // Reuse the walk-move trace when it already answers this query
            let tr = match first {
                Some((first_dest, first_trace)) if vectors_exactly_equal(end, first_dest) => {
                    *first_trace
                }
                _ => self.trace_player_bbox(self.state.origin, end),
            };

            all_fraction += tr.result.fraction;

            if tr.result.allsolid {
                // Trapped in a solid; stop dead
                self.state.velocity = Vector3::new(0.0, 0.0, 0.0);
                return 4;
            }

            if tr.result.fraction > 0.0 {
                let reached_endpos = tr.end_position();

                if tr.result.fraction == 1.0 {
                    // Terrain tracing can let a swept box through while its
                    // end position is stuck in a triangle. Re-test with an
                    // unswept box and refuse the move when it would stick.
                    let stuck = self.trace_player_bbox(reached_endpos, reached_endpos);
                    if stuck.result.startsolid || stuck.result.fraction != 1.0 {
                        self.state.velocity = Vector3::new(0.0, 0.0, 0.0);
                        break;
                    }
                }

                self.state.origin = reached_endpos;
                original_velocity = self.state.velocity;
                numplanes = 0;
            }

            if tr.result.fraction == 1.0 {
                break;
            }

            if tr.result.plane_normal.z > SV_STANDABLE_NORMAL {
                blocked |= 1; // floor
            }
            if tr.result.plane_normal.z == 0.0 {
                blocked |= 2; // step / wall
            }

            time_left -= time_left * tr.result.fraction;

            if numplanes >= MAX_CLIP_PLANES {
                // This shouldn't really happen; stop dead
                self.state.velocity = Vector3::new(0.0, 0.0, 0.0);
                break;
            }

            planes[numplanes] = tr.result.plane_normal;
            numplanes += 1;

            // Reflect velocity only off the first impact plane while
            // airborne; jumping in place into an acute corner could wedge
            // the player otherwise.
            if numplanes == 1
                && self.state.move_type == MoveType::Walk
                && !self.state.on_ground
            {
                clip_velocity(original_velocity, planes[0], &mut new_velocity, 1.0);
                self.state.velocity = new_velocity;
                original_velocity = new_velocity;
            } else {
                let mut i = 0;
                while i < numplanes {
                    clip_velocity(original_velocity, planes[i], &mut self.state.velocity, 1.0);

                    let mut reclipped = false;
                    for (j, plane) in planes.iter().enumerate().take(numplanes) {
                        if j != i && self.state.velocity.dot(*plane) < 0.0 {
                            reclipped = true; // still moving into a plane
                            break;
                        }
                    }
                    if !reclipped {
                        break;
                    }
                    i += 1;
                }

                if i == numplanes {
                    // Did not find a plane set to slide along
                    if numplanes != 2 {
                        self.state.velocity = Vector3::new(0.0, 0.0, 0.0);
                        break;
                    }
                    // Slide along the crease of the two planes
                    let mut dir = planes[0].cross(planes[1]);
                    normalize_mut(&mut dir);
                    let d = dir.dot(self.state.velocity);
                    self.state.velocity = d * dir;
                }

                // If the new velocity opposes the original, stop dead to
                // avoid tiny oscillations in sloping corners
                let d = self.state.velocity.dot(primal_velocity);
                if d <= 0.0 {
                    self.state.velocity = Vector3::new(0.0, 0.0, 0.0);
                    break;
                }
            }
        }

        if all_fraction == 0.0 {
            self.state.velocity = Vector3::new(0.0, 0.0, 0.0);
        }

        blocked
    }

    /// Try to keep a walking player on the ground when running down slopes.
    fn stay_on_ground(&mut self) {
        let mut start = self.state.origin;
        let mut end = self.state.origin;
        start.z += 2.0;
        end.z -= SV_STEPSIZE;

        // See how far up we can go without getting stuck
        let up_trace = self.trace_player_bbox(self.state.origin, start);
        let start = up_trace.end_position();

        // Now trace down from a known safe position. startsolid is
        // unreliable against terrain here, so gate on fraction instead.
        let down_trace = self.trace_player_bbox(start, end);
        if down_trace.result.fraction > 0.0
            && down_trace.result.fraction < 1.0
            && !down_trace.result.startsolid
            && down_trace.result.plane_normal.z >= SV_STANDABLE_NORMAL
        {
            let endpos = down_trace.end_position();
            let delta = (self.state.origin.z - endpos.z).abs();

            // Snapping below the network resolution would never replicate
            if delta > 0.5 * COORD_RESOLUTION {
                self.state.origin = endpos;
            }
        }
    }

    /// Jump on the rising edge of the jump button. Returns whether a jump
    /// started.
    fn check_jump_button(&mut self) -> bool {
        if !self.state.on_ground {
            self.state.old_buttons |= Buttons::JUMP;
            return false; // in air, so no effect
        }

        if self.state.old_buttons.contains(Buttons::JUMP) {
            return false; // don't pogo stick
        }

        // Cannot jump while in the unduck transition
        if self.state.ducking && self.state.ducked {
            return false;
        }

        // Still updating the eye position
        if self.state.duck_jump_time_ms > 0.0 {
            return false;
        }

        self.set_ground_entity(false, -1);

        if self.state.ducking || self.state.ducked {
            // d = 0.5 * g * t^2, v = sqrt(2 * g * height)
            self.state.velocity.z = SV_JUMP_IMPULSE;
        } else {
            self.state.velocity.z += SV_JUMP_IMPULSE;
        }

        // The stamina penalty is charged independently of the impulse
        self.state.stamina -= SV_STAMINAJUMPCOST * self.state.stamina;

        self.state.jump_time_ms = JUMP_TIME_MS;
        self.state.in_duck_jump = true;

        self.state.old_buttons |= Buttons::JUMP;
        true
    }

    fn full_walk_move(&mut self, frametime: f32) {
        self.start_gravity(frametime);

        if self.state.buttons.contains(Buttons::JUMP) {
            self.check_jump_button();
        } else {
            self.state.old_buttons.remove(Buttons::JUMP);
        }

        // Friction is applied before base velocity is added, so standing on
        // a conveyor does not bleed the conveyor speed.
        if self.state.on_ground {
            self.state.velocity.z = 0.0;
            self.friction(frametime);
        }

        self.check_velocity();

        if self.state.on_ground {
            self.walk_move(frametime);
        } else {
            self.air_move(frametime);
        }

        self.categorize_position();
        self.check_velocity();

        self.finish_gravity(frametime);

        if self.state.on_ground {
            self.state.velocity.z = 0.0;
        }
        self.check_falling();
    }

    fn set_ground_entity(&mut self, has_ground: bool, surface: i32) {
        let old_ground = self.state.on_ground;
        let new_ground = has_ground;

        // Ground velocity is always zero here; moving grounds would hand
        // their velocity over at these two transitions.
        if (!old_ground && new_ground) || (old_ground && !new_ground) {
            self.state.base_velocity.z = 0.0;
        }

        self.state.on_ground = new_ground;

        if new_ground {
            self.state.ground_surface = surface;
            self.categorize_ground_surface(surface);
            self.state.velocity.z = 0.0;
        } else {
            self.state.ground_surface = -1;
        }
    }

    fn categorize_ground_surface(&mut self, surface: i32) {
        self.state.surface_friction = self.world.surface_friction(surface);
    }

    /// Trace the hull in quadrants looking for a standable plane, to recover
    /// from a leaning wall the full-hull trace hit first. The original
    /// fraction/endpos are kept either way.
    fn try_touch_ground_in_quadrants(
        &self,
        start: Vector3<f32>,
        end: Vector3<f32>,
    ) -> (bool, i32) {
        let mins_src = self.current_mins();
        let maxs_src = self.current_maxs();

        // -x, -y quadrant
        let mins = mins_src;
        let maxs = Vector3::new(maxs_src.x.min(0.0), maxs_src.y.min(0.0), maxs_src.z);
        let tr = self.try_touch_ground(start, end, mins, maxs);
        if tr.result.did_hit() && tr.result.plane_normal.z >= SV_STANDABLE_NORMAL {
            return (true, tr.result.surface);
        }

        // +x, +y quadrant
        let mins = Vector3::new(mins_src.x.max(0.0), mins_src.y.max(0.0), mins_src.z);
        let maxs = maxs_src;
        let tr = self.try_touch_ground(start, end, mins, maxs);
        if tr.result.did_hit() && tr.result.plane_normal.z >= SV_STANDABLE_NORMAL {
            return (true, tr.result.surface);
        }

        // -x, +y quadrant
        let mins = Vector3::new(mins_src.x, mins_src.y.max(0.0), mins_src.z);
        let maxs = Vector3::new(maxs_src.x.min(0.0), maxs_src.y, maxs_src.z);
        let tr = self.try_touch_ground(start, end, mins, maxs);
        if tr.result.did_hit() && tr.result.plane_normal.z >= SV_STANDABLE_NORMAL {
            return (true, tr.result.surface);
        }

        // +x, -y quadrant
        let mins = Vector3::new(mins_src.x.max(0.0), mins_src.y, mins_src.z);
        let maxs = Vector3::new(maxs_src.x, maxs_src.y.min(0.0), maxs_src.z);
        let tr = self.try_touch_ground(start, end, mins, maxs);
        if tr.result.did_hit() && tr.result.plane_normal.z >= SV_STANDABLE_NORMAL {
            return (true, tr.result.surface);
        }

        (false, -1)
    }

    fn categorize_position(&mut self) {
        // Reset, otherwise ground friction from the previous surface leaks
        // into this tick
        self.state.surface_friction = 1.0;

        let offset = 2.0;
        let bump_origin = self.state.origin;
        let mut point = self.state.origin;
        point.z -= offset;

        let zvel = self.state.velocity.z;
        let moving_up = zvel > 0.0;
        let moving_up_rapidly = zvel > MIN_NO_GROUND_CHECKS_VEL_Z;

        if moving_up_rapidly || (moving_up && self.state.move_type == MoveType::Ladder) {
            self.set_ground_entity(false, -1);
        } else {
            let tr = self.try_touch_ground(
                bump_origin,
                point,
                self.current_mins(),
                self.current_maxs(),
            );

            if tr.result.did_hit() && tr.result.plane_normal.z >= SV_STANDABLE_NORMAL {
                self.set_ground_entity(true, tr.result.surface);
            } else {
                // Steep plane underneath; check the quadrant sub-hulls for
                // a shallower slope that can still be stood on
                let (standable, surface) =
                    self.try_touch_ground_in_quadrants(bump_origin, point);

                if standable {
                    self.set_ground_entity(true, surface);
                } else {
                    self.set_ground_entity(false, -1);
                    if self.state.velocity.z > 0.0 && self.state.move_type != MoveType::Noclip {
                        // Affects air acceleration during the rising part
                        // of a jump
                        self.state.surface_friction = POST_JUMP_SURFACE_FRICTION;
                    }
                }
            }
        }
    }

    /// Landing handling: classify the impact and clear the fall velocity.
    fn check_falling(&mut self) {
        if !self.state.on_ground || self.state.fall_velocity <= 0.0 {
            return;
        }

        if self.state.fall_velocity >= PLAYER_FALL_PUNCH_THRESHOLD {
            let impact_volume = if self.state.fall_velocity > PLAYER_MAX_SAFE_FALL_SPEED {
                // Fast enough to take damage
                1.0
            } else if self.state.fall_velocity > PLAYER_MAX_SAFE_FALL_SPEED / 2.0 {
                0.85
            } else if self.state.fall_velocity < PLAYER_MIN_BOUNCE_SPEED {
                0.0
            } else {
                0.5
            };
            log::trace!(
                "[Movement] landed at {:.1} u/s (impact volume {})",
                self.state.fall_velocity,
                impact_volume
            );

            self.state.stamina -= SV_STAMINALANDCOST * self.state.stamina;
        }

        self.state.fall_velocity = 0.0;
    }
}

/// Slide off an impacting plane. Returns blocking flags:
/// 0x01 floor, 0x02 step or wall.
pub fn clip_velocity(
    input: Vector3<f32>,
    normal: Vector3<f32>,
    out: &mut Vector3<f32>,
    overbounce: f32,
) -> u32 {
    let angle = normal.z;

    let mut blocked = 0u32;
    if angle > 0.0 {
        blocked |= 0x01; // floor
    }
    if angle == 0.0 {
        blocked |= 0x02; // step / wall
    }

    let backoff = input.dot(normal) * overbounce;
    for i in 0..3 {
        let change = normal[i] * backoff;
        out[i] = input[i] - change;
    }

    // Iterate once to make sure we aren't still moving through the plane
    let adjust = out.dot(normal);
    if adjust < 0.0 {
        *out -= normal * adjust;
    }

    blocked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::assert_vec_near;

    #[test]
    fn clip_velocity_removes_normal_component() {
        let mut out = Vector3::new(0.0, 0.0, 0.0);
        let blocked = clip_velocity(
            Vector3::new(320.0, 0.0, -10.0),
            Vector3::new(-1.0, 0.0, 0.0),
            &mut out,
            1.0,
        );
        assert_eq!(blocked, 0x02);
        assert_vec_near(out, Vector3::new(0.0, 0.0, -10.0), 1e-4);
    }

    #[test]
    fn clip_velocity_on_floor_flags_floor() {
        let mut out = Vector3::new(0.0, 0.0, 0.0);
        let blocked = clip_velocity(
            Vector3::new(100.0, 0.0, -50.0),
            Vector3::new(0.0, 0.0, 1.0),
            &mut out,
            1.0,
        );
        assert_eq!(blocked, 0x01);
        assert_vec_near(out, Vector3::new(100.0, 0.0, 0.0), 1e-4);
    }

    #[test]
    fn clip_velocity_overbounce_reflects() {
        let mut out = Vector3::new(0.0, 0.0, 0.0);
        clip_velocity(
            Vector3::new(0.0, 0.0, -100.0),
            Vector3::new(0.0, 0.0, 1.0),
            &mut out,
            2.0,
        );
        assert_vec_near(out, Vector3::new(0.0, 0.0, 100.0), 1e-4);
    }

    #[test]
    fn hull_sizes_match_crouch_state() {
        let standing = MoveContext::player_maxs(false);
        let crouched = MoveContext::player_maxs(true);
        assert_eq!(standing.z, PLAYER_HEIGHT_STANDING);
        assert_eq!(crouched.z, PLAYER_HEIGHT_CROUCHED);
        assert_eq!(standing.x, 16.0);
        assert_eq!(MoveContext::player_mins(false).z, 0.0);
    }
}
