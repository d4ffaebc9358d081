//! Edge-triggered player input.
//!
//! Key bindings issue +command on press and -command on release. The player
//! keeps a non-negative press counter per command so chorded bindings
//! compose: two bindings pressing the same command keep it active until both
//! are released. A command is active during a tick iff its counter is
//! positive at the end of that tick's input queue.

use std::time::Instant;

/// One console-style input command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    PlusForward,
    PlusBack,
    PlusMoveLeft,
    PlusMoveRight,
    PlusUse,
    PlusJump,
    PlusDuck,
    PlusSpeed,
    PlusAttack,
    PlusAttack2,

    MinusForward,
    MinusBack,
    MinusMoveLeft,
    MinusMoveRight,
    MinusUse,
    MinusJump,
    MinusDuck,
    MinusSpeed,
    MinusAttack,
    MinusAttack2,
}

/// The key a command pair acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKey {
    Forward,
    Back,
    MoveLeft,
    MoveRight,
    Use,
    Jump,
    Duck,
    Speed,
    Attack,
    Attack2,
}

impl Command {
    pub fn is_plus(&self) -> bool {
        matches!(
            self,
            Command::PlusForward
                | Command::PlusBack
                | Command::PlusMoveLeft
                | Command::PlusMoveRight
                | Command::PlusUse
                | Command::PlusJump
                | Command::PlusDuck
                | Command::PlusSpeed
                | Command::PlusAttack
                | Command::PlusAttack2
        )
    }

    pub fn key(&self) -> CommandKey {
        match self {
            Command::PlusForward | Command::MinusForward => CommandKey::Forward,
            Command::PlusBack | Command::MinusBack => CommandKey::Back,
            Command::PlusMoveLeft | Command::MinusMoveLeft => CommandKey::MoveLeft,
            Command::PlusMoveRight | Command::MinusMoveRight => CommandKey::MoveRight,
            Command::PlusUse | Command::MinusUse => CommandKey::Use,
            Command::PlusJump | Command::MinusJump => CommandKey::Jump,
            Command::PlusDuck | Command::MinusDuck => CommandKey::Duck,
            Command::PlusSpeed | Command::MinusSpeed => CommandKey::Speed,
            Command::PlusAttack | Command::MinusAttack => CommandKey::Attack,
            Command::PlusAttack2 | Command::MinusAttack2 => CommandKey::Attack2,
        }
    }

    /// The release commands of every key, for resetting input state.
    pub fn all_minus_commands() -> [Command; 10] {
        [
            Command::MinusForward,
            Command::MinusBack,
            Command::MinusMoveLeft,
            Command::MinusMoveRight,
            Command::MinusUse,
            Command::MinusJump,
            Command::MinusDuck,
            Command::MinusSpeed,
            Command::MinusAttack,
            Command::MinusAttack2,
        ]
    }
}

const KEY_COUNT: usize = 10;

fn key_index(key: CommandKey) -> usize {
    match key {
        CommandKey::Forward => 0,
        CommandKey::Back => 1,
        CommandKey::MoveLeft => 2,
        CommandKey::MoveRight => 3,
        CommandKey::Use => 4,
        CommandKey::Jump => 5,
        CommandKey::Duck => 6,
        CommandKey::Speed => 7,
        CommandKey::Attack => 8,
        CommandKey::Attack2 => 9,
    }
}

/// Per-key press counters. A +command increments, a -command decrements,
/// floored at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PressCounters {
    counts: [u32; KEY_COUNT],
}

impl PressCounters {
    pub fn apply(&mut self, cmd: Command) {
        let idx = key_index(cmd.key());
        if cmd.is_plus() {
            self.counts[idx] += 1;
        } else {
            self.counts[idx] = self.counts[idx].saturating_sub(1);
        }
    }

    pub fn count(&self, key: CommandKey) -> u32 {
        self.counts[key_index(key)]
    }

    pub fn is_active(&self, key: CommandKey) -> bool {
        self.count(key) > 0
    }
}

/// A timestamped input sample: the commands issued since the previous
/// sample plus the view state at sample time.
#[derive(Debug, Clone)]
pub struct PlayerInput {
    /// When this input was sampled.
    pub time: Instant,
    pub commands: Vec<Command>,
    pub weapon_slot: u32,
    pub view_pitch: f32,
    pub view_yaw: f32,
}

impl PlayerInput {
    pub fn at(time: Instant) -> Self {
        Self {
            time,
            commands: Vec::new(),
            weapon_slot: 0,
            view_pitch: 0.0,
            view_yaw: 0.0,
        }
    }

    pub fn with_commands(mut self, commands: &[Command]) -> Self {
        self.commands.extend_from_slice(commands);
        self
    }

    pub fn with_view(mut self, pitch: f32, yaw: f32) -> Self {
        self.view_pitch = pitch;
        self.view_yaw = yaw;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_never_goes_negative() {
        let mut counters = PressCounters::default();
        for _ in 0..3 {
            counters.apply(Command::MinusJump);
        }
        assert_eq!(counters.count(CommandKey::Jump), 0);
        counters.apply(Command::PlusJump);
        assert_eq!(counters.count(CommandKey::Jump), 1);
    }

    #[test]
    fn chorded_bindings_compose() {
        // Two bindings for jump: P, P, R, R -> counts 1, 2, 1, 0
        let mut counters = PressCounters::default();
        let mut seen = Vec::new();
        for cmd in [
            Command::PlusJump,
            Command::PlusJump,
            Command::MinusJump,
            Command::MinusJump,
        ] {
            counters.apply(cmd);
            seen.push(counters.count(CommandKey::Jump));
        }
        assert_eq!(seen, vec![1, 2, 1, 0]);
    }

    #[test]
    fn random_sequences_stay_non_negative() {
        use rand::{rngs::StdRng, Rng, SeedableRng};
        let mut rng = StdRng::seed_from_u64(21);
        let mut counters = PressCounters::default();
        for _ in 0..10_000 {
            let cmd = if rng.gen_bool(0.5) {
                Command::PlusDuck
            } else {
                Command::MinusDuck
            };
            counters.apply(cmd);
            // u32 cannot go negative; assert the floor behaves instead
            if counters.count(CommandKey::Duck) == 0 {
                counters.apply(Command::MinusDuck);
                assert_eq!(counters.count(CommandKey::Duck), 0);
            }
        }
    }
}
