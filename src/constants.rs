//! Simulation tunables and engine epsilons.
//!
//! Every game-behavior constant lives here as a named value; movement and
//! collision code never spells these out inline. The movement block mirrors
//! the server convar values of the Danger Zone game mode at 64 ticks.

/// Server tick rate in Hz.
pub const TICK_RATE: f32 = 64.0;

/// Fractional bits of the network coordinate encoding.
pub const COORD_FRACTIONAL_BITS: u32 = 5;

/// Network coordinate quantization step (1/32 unit).
pub const COORD_RESOLUTION: f32 = 1.0 / (1 << COORD_FRACTIONAL_BITS) as f32;

/// Standard collision test epsilon, equal to the network grid.
pub const DIST_EPSILON: f32 = 0.03125;

// ---- Player hull ----

/// Hull extent along X and Y.
pub const PLAYER_WIDTH: f32 = 32.0;
/// Hull height while standing.
pub const PLAYER_HEIGHT_STANDING: f32 = 72.0;
/// Hull height while crouched.
pub const PLAYER_HEIGHT_CROUCHED: f32 = 54.0;
/// Eye height above the feet while standing.
pub const PLAYER_EYE_LEVEL_STANDING: f32 = 64.093811;
/// Eye height above the feet while crouched.
pub const PLAYER_EYE_LEVEL_CROUCHED: f32 = 46.076218;
/// Resting clearance between the feet and the ground contact.
pub const PLAYER_FEET_LEVEL: f32 = 0.031250;

// ---- Movement convars ----

/// Ground acceleration.
pub const SV_ACCELERATE: f32 = 5.5;
/// Air acceleration.
pub const SV_AIRACCELERATE: f32 = 12.0;
/// Cap on the wish-speed component added while airborne.
pub const SV_AIR_MAX_WISHSPEED: f32 = 30.0;
/// Friction floor; speeds below this bleed as if moving at it.
pub const SV_STOPSPEED: f32 = 80.0;
/// World friction.
pub const SV_FRICTION: f32 = 5.2;
/// World gravity in units per second squared.
pub const SV_GRAVITY: f32 = 800.0;
/// Per-axis velocity clamp.
pub const SV_MAXVELOCITY: f32 = 3500.0;
/// Client-side max speed clamp applied during parameter checks.
pub const SV_MAXSPEED: f32 = 320.0;
/// Step-up / step-down height.
pub const SV_STEPSIZE: f32 = 18.0;
/// Initial upward jump velocity; sqrt(2 * gravity * height) for ~57 units.
pub const SV_JUMP_IMPULSE: f32 = 301.993377;
/// Minimum ground-plane normal Z the player can stand on.
pub const SV_STANDABLE_NORMAL: f32 = 0.7;

/// Wish magnitude contributed by the forward key.
pub const CL_FORWARDSPEED: f32 = 450.0;
/// Wish magnitude contributed by the back key.
pub const CL_BACKSPEED: f32 = 450.0;
/// Wish magnitude contributed by the strafe keys.
pub const CL_SIDESPEED: f32 = 450.0;
/// The effective per-tick max speed fed into the movement pass.
pub const RUN_MAX_SPEED: f32 = 260.0;

// ---- Stamina ----

/// Maximum stamina value (also the spawn value).
pub const SV_STAMINAMAX: f32 = 80.0;
/// Stamina recovered per second.
pub const SV_STAMINARECOVERYRATE: f32 = 60.0;
/// Fraction of current stamina spent per jump.
pub const SV_STAMINAJUMPCOST: f32 = 0.08;
/// Fraction of current stamina spent on a hard landing.
pub const SV_STAMINALANDCOST: f32 = 0.05;

// ---- Ground categorization and falling ----

/// Upward speed above which the player immediately leaves walk-mode ground.
pub const MIN_LEAVE_GROUND_VEL_Z: f32 = 250.0;
/// Upward speed above which the downward ground probe is skipped.
pub const MIN_NO_GROUND_CHECKS_VEL_Z: f32 = 140.0;
/// Fall speed above which a landing may deal damage.
pub const PLAYER_MAX_SAFE_FALL_SPEED: f32 = 580.0;
/// Fall speed below which a landing makes no impact at all.
pub const PLAYER_MIN_BOUNCE_SPEED: f32 = 200.0;
/// Fall speed at which a landing starts to punch the view.
pub const PLAYER_FALL_PUNCH_THRESHOLD: f32 = 350.0;

// ---- Timers (milliseconds, matching the wire encoding) ----

/// Duck transition timer arm value.
pub const DUCK_TIME_MS: f32 = 1000.0;
/// Post-jump timer arm value, based on the 21-unit jump apex.
pub const JUMP_TIME_MS: f32 = 510.0;

// ---- Slide clipping ----

/// Velocity components below this are zeroed after a plane clip.
pub const STOP_EPSILON: f32 = 0.1;
/// Maximum simultaneous clip planes tracked by the slide loop.
pub const MAX_CLIP_PLANES: usize = 5;
/// Maximum bump iterations of the slide loop.
pub const MAX_BUMPS: usize = 4;
/// Post-jump surface friction override while rising.
pub const POST_JUMP_SURFACE_FRICTION: f32 = 0.25;

// ---- Debug movement (noclip fly path) ----

/// Horizontal fly speed of the debug free-fly mode.
pub const NOCLIP_FLY_SPEED: f32 = 250.0;
/// Vertical fly speed of the debug free-fly mode.
pub const NOCLIP_FLY_VERTICAL: f32 = 300.0;
/// Speed-key multiplier of the debug free-fly mode.
pub const NOCLIP_SPEED_MULTIPLIER: f32 = 6.0;
/// Velocity boost applied along the view direction on the attack edge.
pub const ATTACK_BOOST_SPEED: f32 = 1400.0;

// ---- Projectiles ----

/// Launch speed of a thrown bump mine.
pub const BUMPMINE_THROW_SPEED: f32 = 600.0;
/// Seconds until a thrown bump mine arms.
pub const BUMPMINE_ARM_DELAY: f32 = 0.3;
/// Seconds from trigger to detonation of an armed bump mine.
pub const BUMPMINE_DETONATE_DELAY: f32 = 0.25;

// ---- Geometry extraction ----

/// Over-cut used when clipping brush faces, so on-plane vertices fall
/// cleanly to one side. Observed intersection drift is ~0.0005.
pub const BRUSH_PLANE_OVER_CUT: f32 = 0.001;
/// Minimum depth a plane must cut to not be considered redundant.
pub const BRUSH_PLANE_REDUNDANCY: f32 = 0.01;
/// Distance below which two face vertices are merged.
pub const VERTEX_MERGE_EPSILON: f32 = 1.0e-5;
/// Hover distance of displacement boundary strips above the surface.
pub const DISP_BOUNDARY_HOVER: f32 = 2.0;
/// Inward thickness of displacement boundary strips, as a tile-width ratio.
pub const DISP_BOUNDARY_THICKNESS: f32 = 0.1;

// ---- Collision model decoding ----

/// Scale from .phy model space (meters) to world units (inches).
pub const VPHY_MODEL_SCALE: f32 = 1.0 / 0.0254;
/// Sanity cap on convex sections per model.
pub const PHY_MAX_SECTIONS: usize = 16_000;
/// Sanity cap on triangles per convex section.
pub const PHY_MAX_TRIANGLES: usize = 128_000;
/// Sanity cap on vertices per convex section.
pub const PHY_MAX_VERTICES: usize = 256_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coord_resolution_matches_fractional_bits() {
        assert_eq!(COORD_RESOLUTION, 0.03125);
        assert_eq!(COORD_RESOLUTION, DIST_EPSILON);
    }

    #[test]
    fn jump_impulse_matches_derivation() {
        // sqrt(2 * g * h) for the ~57 unit jump apex
        let derived = (2.0 * SV_GRAVITY * 57.0).sqrt();
        assert!((derived - SV_JUMP_IMPULSE).abs() < 0.5);
    }
}
