// Terminal view of the current snapshot

use std::{
    io::{self, Write},
    time::Duration,
};

use itertools::Itertools;
use log::debug;

use crate::{
    lifecycle::Shutdown,
    snapshot::{SharedSnapshot, Snapshot},
};

const HIDE_CURSOR_AND_CLEAR: &str = "\x1b[?25l\x1b[2J\x1b[H";
const SHOW_CURSOR_AND_CLEAR: &str = "\x1b[?25h\x1b[2J\x1b[H";

pub fn render_snapshot(snapshot: &Snapshot) -> String {
    let fuel_total = snapshot
        .fuel_total
        .map_or_else(|| "--".to_string(), |t| format!("{:.2}", t));
    let position = snapshot
        .position
        .map_or_else(|| "--".to_string(), |p| p.to_string());
    let brake_bias = snapshot
        .brake_bias
        .map(|b| format!(", Brake bias: {:.1}%", b))
        .unwrap_or_default();

    let header = [
        format!(
            "Gear: {}, RPM: {}, Speed: {}{}",
            snapshot.gear, snapshot.rpm, snapshot.speed_kph, brake_bias
        ),
        format!(
            "Fuel: {:.2}L/{}L [{:.2}%], {:.2}L per lap",
            snapshot.fuel_liters, fuel_total, snapshot.fuel_pct, snapshot.fuel_per_lap
        ),
        format!(
            "Lap time: {} [{}]",
            snapshot.current_lap_time, snapshot.lap_delta_text
        ),
        format!("Best lap time: {}", snapshot.best_lap_time),
        format!("Last lap time: {}", snapshot.last_lap_time),
        format!("Lap: {} [{:.2}%]", snapshot.lap, snapshot.lap_dist_pct),
        format!("Pos: {}", position),
    ];
    let rows = snapshot.standings.iter().enumerate().map(|(slot, entry)| {
        format!(
            "[{:2}] [{:2}] {:<30} {:3} {:10.4} {}",
            slot + 1,
            entry.car_idx,
            entry.driver_name,
            entry.lap,
            entry.lap_pct,
            entry.time_behind_text
        )
    });

    header.into_iter().chain(rows).join("\n")
}

/// Redraw the terminal view every `period` until shutdown, then restore the cursor.
pub fn run(shared: &SharedSnapshot, shutdown: &Shutdown, period: Duration) {
    let mut stdout = io::stdout();
    while !shutdown.wait_timeout(period) {
        let view = shared.with(render_snapshot);
        let drawn = writeln!(stdout, "{}{}", HIDE_CURSOR_AND_CLEAR, view).and_then(|_| stdout.flush());
        if let Err(e) = drawn {
            debug!("Could not draw snapshot: {}", e);
        }
    }
    let _ = write!(stdout, "{}", SHOW_CURSOR_AND_CLEAR).and_then(|_| stdout.flush());
}
