//! movesim - offline movement and collision simulator.
//!
//! Reproduces the server-authoritative player movement and collision
//! semantics of a first-person shooter's battle-royale game mode. Given a
//! parsed map, the crate builds a collidable world (brushes, displacement
//! surfaces, convex prop collision models, a BVH over all of them) and
//! drives a fixed-rate movement simulation over it, producing per-tick
//! world states plus interpolated display states.
//!
//! Data flow, leaves first:
//!
//! ```text
//! raw map data ──► map (geometry extraction) ─┐
//! raw phy data ──► phy (convex model decode) ─┼─► coll::CollidableWorld
//!                                             │
//!                  sim::PlayerInput ──► sim::TickEngine ──► sim movement
//!                                             │                │ sweeps
//!                                             └── WorldState ◄─┘
//! ```
//!
//! The renderer-facing side is data only: [`render::RenderableWorld`] and
//! the per-surface glidability classification.

// Constants module
pub mod constants;

// Core modules
pub mod coll;
pub mod error;
pub mod map;
pub mod math;
pub mod phy;
pub mod render;
pub mod sim;

pub use coll::{CollidableWorld, NoExternalAssets, PhySource, SweptQuery, TraceResult, WorldSlot};
pub use error::{ErrorReport, SimError, SimResult};
pub use map::ParsedMap;
pub use phy::{decode_phy, DecodeOptions, PhyBlob, PhyModel};
pub use render::{Glidability, RenderableWorld};
pub use sim::{MoveState, Player, PlayerInput, TickEngine, WorldState};

use crate::constants::TICK_RATE;

/// Top-level simulation configuration.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Server tick rate in Hz.
    pub tick_rate: f32,
    /// Real-time scale of the tick clock; 1.0 is real time.
    pub game_timescale: f32,
    /// Interpolate drawn states between ticks.
    pub interpolate: bool,
    /// Include shrink-wrap sections when decoding prop collision models.
    pub include_shrink_wrap_sections: bool,
    /// Maximum empty ticks simulated to catch up with the wall clock before
    /// the tick clock is re-based instead.
    pub max_catchup_ticks: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_rate: TICK_RATE,
            game_timescale: 1.0,
            interpolate: true,
            include_shrink_wrap_sections: false,
            max_catchup_ticks: 256,
        }
    }
}

impl SimConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> SimResult<()> {
        if !(self.tick_rate > 0.0) || !self.tick_rate.is_finite() {
            return Err(SimError::InvalidConfig {
                field: "tick_rate".to_string(),
                reason: format!("must be a positive rate, got {}", self.tick_rate),
            });
        }
        if !(self.game_timescale > 0.0) || !self.game_timescale.is_finite() {
            return Err(SimError::InvalidConfig {
                field: "game_timescale".to_string(),
                reason: format!("must be positive, got {}", self.game_timescale),
            });
        }
        if self.max_catchup_ticks == 0 {
            return Err(SimError::InvalidConfig {
                field: "max_catchup_ticks".to_string(),
                reason: "must allow at least one catch-up tick".to_string(),
            });
        }
        Ok(())
    }

    /// Simulation step size in seconds.
    pub fn step_size_sec(&self) -> f32 {
        1.0 / self.tick_rate
    }

    /// Decode options derived from this configuration.
    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            include_shrink_wrap: self.include_shrink_wrap_sections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SimConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tick_rate, 64.0);
        assert!((config.step_size_sec() - 0.015625).abs() < 1e-9);
    }

    #[test]
    fn bad_configs_are_rejected() {
        let mut config = SimConfig::default();
        config.tick_rate = 0.0;
        assert!(config.validate().is_err());

        let mut config = SimConfig::default();
        config.game_timescale = -1.0;
        assert!(config.validate().is_err());

        let mut config = SimConfig::default();
        config.max_catchup_ticks = 0;
        assert!(config.validate().is_err());
    }
}
