//! Exponential smoothing of remote players toward their server-reported targets

use crate::game::RemotePlayer;

/// Fraction of the remaining distance covered per presentation tick.
pub const SMOOTHING_FACTOR: f64 = 0.1;

/// Below this per-axis distance the displayed position snaps onto the target.
pub const SNAP_EPSILON: f64 = 0.5;

/// Advances one displayed coordinate pair toward its target by one tick.
///
/// A step too small to change the displayed value at this magnitude snaps
/// onto the target, so every tick makes progress.
pub fn step_towards(displayed: (f64, f64), target: (f64, f64)) -> (f64, f64) {
    let dx = target.0 - displayed.0;
    let dy = target.1 - displayed.1;

    if dx.abs() <= SNAP_EPSILON && dy.abs() <= SNAP_EPSILON {
        return target;
    }

    let next = (
        displayed.0 + dx * SMOOTHING_FACTOR,
        displayed.1 + dy * SMOOTHING_FACTOR,
    );
    if next == displayed {
        target
    } else {
        next
    }
}

/// Runs one presentation tick for a single remote player.
pub fn advance(player: &mut RemotePlayer) {
    let (x, y) = step_towards((player.x, player.y), (player.target_x, player.target_y));
    player.x = x;
    player.y = y;
}

/// Runs one presentation tick for every remote player.
pub fn advance_all<'a>(players: impl IntoIterator<Item = &'a mut RemotePlayer>) {
    for player in players {
        advance(player);
    }
}
