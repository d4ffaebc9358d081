//! Simulation: input model, player movement, world state and the tick engine.

pub mod game;
pub mod input;
pub mod movement;
pub mod player;
pub mod world_state;

pub use game::TickEngine;
pub use input::{Command, CommandKey, PlayerInput, PressCounters};
pub use movement::{clip_velocity, Buttons, MoveContext, MoveState, MoveType};
pub use player::{BumpmineProjectile, Player};
pub use world_state::WorldState;
