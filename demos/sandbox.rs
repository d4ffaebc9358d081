//! Minimal simulation sandbox: build a synthetic world, start the tick
//! engine and sprint toward a step while jumping once.
//!
//! Run with `cargo run --example sandbox`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use cgmath::Vector3;

use movesim::coll::{CollidableWorld, NoExternalAssets};
use movesim::map::{synth, BrushContents, ParsedMap};
use movesim::sim::{Command, PlayerInput, TickEngine, WorldState};
use movesim::SimConfig;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    // A floor with a 17-unit step and a far wall
    let mut map = ParsedMap::empty();
    synth::push_axial_box(
        &mut map,
        Vector3::new(-2048.0, -2048.0, -64.0),
        Vector3::new(2048.0, 2048.0, 0.0),
        BrushContents::SOLID,
    );
    synth::push_axial_box(
        &mut map,
        Vector3::new(256.0, -512.0, 0.0),
        Vector3::new(1024.0, 512.0, 17.0),
        BrushContents::SOLID,
    );
    synth::push_axial_box(
        &mut map,
        Vector3::new(1024.0, -2048.0, -64.0),
        Vector3::new(1090.0, 2048.0, 512.0),
        BrushContents::SOLID,
    );
    synth::finalize_worldspawn(&mut map);

    let (world, report) = CollidableWorld::build(
        Arc::new(map),
        &NoExternalAssets,
        SimConfig::default().decode_options(),
    );
    if !report.is_empty() {
        eprintln!("world issues:\n{}", report);
    }

    let config = SimConfig::default();
    let mut engine = TickEngine::new(&config)?;

    let mut initial = WorldState::new();
    initial.player.position = Vector3::new(0.0, 0.0, 0.03125);
    initial.move_state.origin = initial.player.position;
    initial.move_state.on_ground = true;

    let start = Instant::now();
    engine.start(initial, start, Some(&world));

    // Feed inputs at 128 Hz for 3 seconds: run forward, jump at the step
    let input_interval = Duration::from_nanos(7_812_500);
    let mut held_jump = false;
    for i in 0..384u32 {
        let time = start + input_interval * (i + 1);
        let mut input = PlayerInput::at(time).with_view(0.0, 0.0);
        if i == 0 {
            input.commands.push(Command::PlusForward);
        }
        let state = engine.process_input(input, Some(&world));

        let p = state.player.position;
        if i % 32 == 0 {
            println!(
                "t={:.2}s pos=({:8.2},{:8.2},{:8.2}) hori={:6.1} u/s ground={}",
                (i + 1) as f32 * 0.0078125,
                p.x,
                p.y,
                p.z,
                state.horizontal_speed(),
                state.move_state.on_ground,
            );
        }

        // One jump as the step gets close
        if !held_jump && p.x > 200.0 {
            held_jump = true;
            let t = time + Duration::from_nanos(1);
            engine.process_input(
                PlayerInput::at(t).with_commands(&[Command::PlusJump]),
                Some(&world),
            );
        }
    }

    Ok(())
}
