//! The tick engine.
//!
//! Simulates game ticks at a fixed rate from queued player input, and
//! produces responsive display states the way a client-side prediction loop
//! does: the last finalized tick never changes, the next tick is re-predicted
//! on every new input, and the drawn state interpolates between the last
//! drawn state and the prediction. No asynchronicity; callers feed inputs.

use std::time::{Duration, Instant};

use crate::coll::CollidableWorld;
use crate::error::{SimError, SimResult};
use crate::sim::input::PlayerInput;
use crate::sim::world_state::WorldState;
use crate::SimConfig;

/// Fixed-tick simulation driver.
///
/// Determinism contract: for identical (initial state, step size, input
/// sequence), the stream of finalized states is bit-identical across runs on
/// the same machine. Drawn states may differ with render cadence.
pub struct TickEngine {
    step_size_sec: f32,
    tick_interval_ns: u64,
    interpolate: bool,
    max_catchup_ticks: u32,

    game_start: Instant,
    started: bool,

    finalized_tick_id: u64,
    finalized: WorldState,

    /// Player inputs since the last finalized tick, chronological.
    inputs_since_finalized: Vec<PlayerInput>,

    /// Prediction of the tick after the last finalized one.
    predicted: WorldState,

    drawn: WorldState,
    drawn_time: Instant,
}

impl TickEngine {
    pub fn new(config: &SimConfig) -> SimResult<Self> {
        config.validate()?;

        let step_size_sec = config.step_size_sec();
        let real_interval_sec = step_size_sec as f64 / config.game_timescale as f64;
        let tick_interval_ns = (real_interval_sec * 1.0e9) as u64;
        if tick_interval_ns == 0 {
            return Err(SimError::InvalidConfig {
                field: "tick_rate".to_string(),
                reason: "tick interval rounds to zero".to_string(),
            });
        }

        let now = Instant::now();
        Ok(Self {
            step_size_sec,
            tick_interval_ns,
            interpolate: config.interpolate,
            max_catchup_ticks: config.max_catchup_ticks,
            game_start: now,
            started: false,
            finalized_tick_id: 0,
            finalized: WorldState::new(),
            inputs_since_finalized: Vec::new(),
            predicted: WorldState::new(),
            drawn: WorldState::new(),
            drawn_time: now,
        })
    }

    pub fn has_started(&self) -> bool {
        self.started
    }

    pub fn last_finalized_tick_id(&self) -> u64 {
        self.finalized_tick_id
    }

    pub fn last_finalized_state(&self) -> &WorldState {
        &self.finalized
    }

    /// (Re-)start the simulation at the given state. `now` becomes the time
    /// point of tick 0.
    pub fn start(
        &mut self,
        initial_state: WorldState,
        now: Instant,
        world: Option<&CollidableWorld>,
    ) {
        self.game_start = now;
        self.started = true;

        self.finalized_tick_id = 0;
        self.finalized = initial_state.clone();
        self.inputs_since_finalized.clear();

        // Predict one tick ahead so interpolation has a target
        self.predicted = initial_state.clone();
        self.predicted
            .do_time_step(self.step_size_sec as f64, &[], world);

        self.drawn = initial_state;
        self.drawn_time = now;
    }

    fn tick_time(&self, tick_id: u64) -> Instant {
        self.game_start + Duration::from_nanos(self.tick_interval_ns.saturating_mul(tick_id))
    }

    /// Process a new input sample and return the state to draw.
    ///
    /// Inputs must arrive in chronological order (equal timestamps are
    /// allowed). An input affects a tick when it was sampled at or before
    /// the tick's time point.
    pub fn process_input(
        &mut self,
        input: PlayerInput,
        world: Option<&CollidableWorld>,
    ) -> WorldState {
        if !self.started {
            log::warn!("[TickEngine] input received before the game was started");
            return WorldState::new();
        }

        debug_assert!(self
            .inputs_since_finalized
            .iter()
            .all(|earlier| input.time >= earlier.time));

        let cur_time = input.time;

        // Step 1: the tick that directly precedes this input
        let mut preceding_tick_id = self.finalized_tick_id;
        while self.tick_time(preceding_tick_id + 1) < cur_time {
            preceding_tick_id += 1;
        }

        // Step 2: advance the simulation up to that tick. The first
        // advancement reuses the prediction: no input relevant to it can
        // arrive anymore.
        if self.finalized_tick_id < preceding_tick_id {
            self.finalized = std::mem::take(&mut self.predicted);
            self.finalized_tick_id += 1;
            self.inputs_since_finalized.clear();
        }

        // Any further ticks passed with no input at all
        let mut caught_up = 0u32;
        while self.finalized_tick_id < preceding_tick_id {
            if caught_up >= self.max_catchup_ticks {
                // Falling behind unboundedly; re-base the clock instead of
                // simulating the backlog
                let skipped = preceding_tick_id - self.finalized_tick_id;
                log::warn!(
                    "[TickEngine] catch-up window exceeded, skipping {} ticks",
                    skipped
                );
                self.game_start +=
                    Duration::from_nanos(self.tick_interval_ns.saturating_mul(skipped));
                break;
            }
            self.finalized
                .do_time_step(self.step_size_sec as f64, &[], world);
            self.finalized_tick_id += 1;
            caught_up += 1;
        }

        // Step 3: re-predict the next tick with the new input included
        self.inputs_since_finalized.push(input);

        let mut predicted_next = self.finalized.clone();
        predicted_next.do_time_step(
            self.step_size_sec as f64,
            &self.inputs_since_finalized,
            world,
        );

        let next_tick_time = self.tick_time(self.finalized_tick_id + 1);

        // Step 4: interpolate the drawn state toward the prediction
        let drawn_state = if self.interpolate {
            let range = next_tick_time.saturating_duration_since(self.drawn_time);
            let step = cur_time.saturating_duration_since(self.drawn_time);
            if range.is_zero() {
                predicted_next.clone()
            } else {
                let phase =
                    (step.as_secs_f64() / range.as_secs_f64()).clamp(0.0, 1.0) as f32;
                WorldState::interpolate(&self.drawn, &predicted_next, phase)
            }
        } else {
            self.finalized.clone()
        };

        // Step 5: remember for the next call
        self.predicted = predicted_next;
        self.drawn = drawn_state.clone();
        self.drawn_time = cur_time;

        drawn_state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::Vector3;
    use std::sync::Arc;

    use crate::coll::{CollidableWorld, NoExternalAssets};
    use crate::map::synth;
    use crate::phy::DecodeOptions;
    use crate::sim::input::Command;

    fn floor_world() -> CollidableWorld {
        let map = synth::single_box_map(
            Vector3::new(-4096.0, -4096.0, -16.0),
            Vector3::new(4096.0, 4096.0, 0.0),
        );
        let (world, report) =
            CollidableWorld::build(Arc::new(map), &NoExternalAssets, DecodeOptions::default());
        assert!(report.is_empty());
        world
    }

    fn grounded_state() -> WorldState {
        let mut state = WorldState::new();
        state.player.position = Vector3::new(0.0, 0.0, 0.03125);
        state.move_state.origin = state.player.position;
        state.move_state.on_ground = true;
        state
    }

    fn engine() -> TickEngine {
        TickEngine::new(&SimConfig::default()).unwrap()
    }

    #[test]
    fn finalized_sequence_is_deterministic() {
        let world = floor_world();
        let base = Instant::now();
        let tick = Duration::from_nanos((1.0e9 / 64.0) as u64);

        let run = || {
            let mut engine = engine();
            engine.start(grounded_state(), base, Some(&world));
            // Inputs at every half tick, walking forward with one jump
            for i in 1..=64u32 {
                let time = base + tick * i / 2;
                let mut input = PlayerInput::at(time).with_commands(&[Command::PlusForward]);
                if i == 8 {
                    input.commands.push(Command::PlusJump);
                }
                if i == 12 {
                    input.commands.push(Command::MinusJump);
                }
                engine.process_input(input, Some(&world));
            }
            (engine.finalized_tick_id, engine.finalized.clone())
        };

        let (ticks_a, state_a) = run();
        let (ticks_b, state_b) = run();
        assert_eq!(ticks_a, ticks_b);
        assert_eq!(state_a, state_b);
        assert!(ticks_a > 0);
    }

    #[test]
    fn empty_ticks_advance_without_input() {
        let world = floor_world();
        let base = Instant::now();
        let mut engine = engine();
        engine.start(grounded_state(), base, Some(&world));

        // One input far in the future finalizes many empty ticks
        let late = base + Duration::from_millis(500);
        engine.process_input(PlayerInput::at(late), Some(&world));
        // 500ms at 64 Hz = 32 ticks
        assert!(engine.finalized_tick_id >= 30);
        assert!(engine.finalized_tick_id <= 33);
    }

    #[test]
    fn interpolation_is_clamped_to_prediction() {
        let world = floor_world();
        let base = Instant::now();
        let mut engine = engine();
        engine.start(grounded_state(), base, Some(&world));

        // An input sampled way past the next tick still draws a state no
        // further than the predicted tick
        let drawn = engine.process_input(
            PlayerInput::at(base + Duration::from_millis(40)).with_commands(&[]),
            Some(&world),
        );
        assert_eq!(drawn.player.position, engine.predicted.player.position);
    }

    #[test]
    fn catchup_window_caps_backlog() {
        let world = floor_world();
        let base = Instant::now();
        let mut config = SimConfig::default();
        config.max_catchup_ticks = 4;
        let mut engine = TickEngine::new(&config).unwrap();
        engine.start(grounded_state(), base, Some(&world));

        // 10 seconds of silence would be 640 ticks; the window caps it
        let late = base + Duration::from_secs(10);
        engine.process_input(PlayerInput::at(late), Some(&world));
        assert!(engine.finalized_tick_id <= 6);
    }

    #[test]
    fn input_before_start_is_rejected() {
        let mut engine = engine();
        let state = engine.process_input(PlayerInput::at(Instant::now()), None);
        assert_eq!(state, WorldState::new());
        assert!(!engine.has_started());
    }
}
