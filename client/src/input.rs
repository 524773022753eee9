//! Directional key sampling and the rate-limited move/stop command emitter

use shared::{ClientMessage, Direction};
use std::time::{Duration, Instant};

/// Cadence of the input sampling loop.
pub const INPUT_TICK: Duration = Duration::from_millis(50);

/// Minimum spacing between two bursts of move commands.
pub const MOVE_INTERVAL: Duration = Duration::from_millis(100);

/// Currently pressed directional keys, each tracked independently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectionKeys {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

impl DirectionKeys {
    pub fn is_pressed(&self, direction: Direction) -> bool {
        match direction {
            Direction::Up => self.up,
            Direction::Down => self.down,
            Direction::Left => self.left,
            Direction::Right => self.right,
        }
    }

    pub fn is_idle(&self) -> bool {
        !(self.up || self.down || self.left || self.right)
    }

    pub fn active(&self) -> impl Iterator<Item = Direction> + '_ {
        Direction::ALL
            .into_iter()
            .filter(move |direction| self.is_pressed(*direction))
    }

    /// Reads the keyboard (WASD and arrow keys).
    pub fn sample() -> Self {
        use macroquad::prelude::{is_key_down, KeyCode};

        Self {
            up: is_key_down(KeyCode::W) || is_key_down(KeyCode::Up),
            down: is_key_down(KeyCode::S) || is_key_down(KeyCode::Down),
            left: is_key_down(KeyCode::A) || is_key_down(KeyCode::Left),
            right: is_key_down(KeyCode::D) || is_key_down(KeyCode::Right),
        }
    }
}

/// Turns sampled key state into protocol commands.
///
/// Commands only flow once the throttler is armed, which happens after the
/// server has placed the local player. While keys are held, one `move` per
/// active direction goes out at most every [`MOVE_INTERVAL`]. Releasing all
/// keys sends a single `stop`; further idle ticks stay silent until the next
/// movement.
#[derive(Debug)]
pub struct InputThrottler {
    armed: bool,
    last_move_sent: Option<Instant>,
    stopped: bool,
}

impl InputThrottler {
    pub fn new() -> Self {
        Self {
            armed: false,
            last_move_sent: None,
            stopped: true,
        }
    }

    pub fn arm(&mut self) {
        self.armed = true;
    }

    pub fn disarm(&mut self) {
        self.armed = false;
        self.last_move_sent = None;
        self.stopped = true;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn tick(&mut self, now: Instant, channel_open: bool, keys: DirectionKeys) -> Vec<ClientMessage> {
        if !channel_open || !self.armed {
            return Vec::new();
        }

        if keys.is_idle() {
            if self.stopped {
                return Vec::new();
            }
            self.stopped = true;
            return vec![ClientMessage::Stop];
        }

        let due = self
            .last_move_sent
            .map_or(true, |last| now.duration_since(last) >= MOVE_INTERVAL);
        if !due {
            return Vec::new();
        }

        self.last_move_sent = Some(now);
        self.stopped = false;
        keys.active().map(ClientMessage::step).collect()
    }
}

impl Default for InputThrottler {
    fn default() -> Self {
        Self::new()
    }
}
