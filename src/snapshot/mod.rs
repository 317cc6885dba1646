pub mod builder;

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard},
};

use serde::{Deserialize, Serialize};

use crate::{
    format::{format_delta, format_lap_time},
    standings::{CompetitorEntry, WINDOW_LEN},
};

pub use builder::SnapshotBuilder;

/// The derived telemetry view served to the display.
///
/// A snapshot is rebuilt on every sample tick and published as a whole, so readers of
/// the [`SharedSnapshot`] always see every field from the same tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub speed_kph: i32,
    pub gear: i32,
    pub rpm: i32,
    pub lap: i32,
    /// Completion of the current lap, 0 to 100
    pub lap_dist_pct: f32,
    pub current_lap_time: String,
    pub best_lap_time: String,
    pub last_lap_time: String,
    pub lap_delta: f32,
    pub lap_delta_text: String,
    pub fuel_liters: f32,
    /// Fuel level, 0 to 100
    pub fuel_pct: f32,
    pub fuel_per_lap: f32,
    /// Estimated tank capacity in liters, unknown while the fuel percentage is zero
    pub fuel_total: Option<f32>,
    pub brake_bias: Option<f32>,
    /// 1-based race position of the player
    pub position: Option<usize>,
    pub standings: [CompetitorEntry; WINDOW_LEN],
    /// Number of published samples
    pub tick: u64,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            speed_kph: 0,
            gear: 0,
            rpm: 0,
            lap: 0,
            lap_dist_pct: 0.,
            current_lap_time: format_lap_time(0.),
            best_lap_time: format_lap_time(0.),
            last_lap_time: format_lap_time(0.),
            lap_delta: 0.,
            lap_delta_text: format_delta(0.),
            fuel_liters: 0.,
            fuel_pct: 0.,
            fuel_per_lap: 0.,
            fuel_total: None,
            brake_bias: None,
            position: None,
            standings: Default::default(),
            tick: 0,
        }
    }
}

impl Snapshot {
    /// Laps left with the current fuel at the measured consumption.
    pub fn fuel_laps_remaining(&self) -> Option<f32> {
        (self.fuel_per_lap > 0.).then(|| self.fuel_liters / self.fuel_per_lap)
    }
}

/// Mutex-guarded snapshot shared by the builder, the protocol server and the renderer.
///
/// Cloning the handle shares the same snapshot.
#[derive(Clone, Debug, Default)]
pub struct SharedSnapshot(Arc<Mutex<Snapshot>>);

impl SharedSnapshot {
    pub fn new(snapshot: Snapshot) -> Self {
        Self(Arc::new(Mutex::new(snapshot)))
    }

    // publish is a single clone_from, a poisoned lock still guards a whole snapshot
    fn lock(&self) -> MutexGuard<'_, Snapshot> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the shared snapshot with `snapshot` in a single lock acquisition.
    pub fn publish(&self, snapshot: &Snapshot) {
        self.lock().clone_from(snapshot);
    }

    /// A copy of the current snapshot.
    pub fn read(&self) -> Snapshot {
        self.lock().clone()
    }

    /// Run `f` against the current snapshot while holding the lock.
    ///
    /// `f` must not block; the builder waits on the same lock.
    pub fn with<R>(&self, f: impl FnOnce(&Snapshot) -> R) -> R {
        f(&self.lock())
    }
}

/// Fuel level observed at the start of each lap.
#[derive(Debug, Default, Clone)]
pub struct FuelHistory {
    levels: BTreeMap<u32, f32>,
}

impl FuelHistory {
    /// Record the fuel level for `lap`. Only the first sample of a lap is kept.
    pub fn record(&mut self, lap: i32, liters: f32) {
        if let Ok(lap) = u32::try_from(lap) {
            self.levels.entry(lap).or_insert(liters);
        }
    }

    pub fn level_at(&self, lap: u32) -> Option<f32> {
        self.levels.get(&lap).copied()
    }

    /// Fuel burned between the start of lap `lap - 2` and the start of lap `lap - 1`.
    ///
    /// Zero until lap 2 and whenever one of the two laps was not observed.
    pub fn per_lap(&self, lap: i32) -> f32 {
        let Ok(lap) = u32::try_from(lap) else {
            return 0.;
        };
        if lap < 2 {
            return 0.;
        }
        match (self.level_at(lap - 2), self.level_at(lap - 1)) {
            (Some(before), Some(after)) => before - after,
            _ => 0.,
        }
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

/// Estimate the tank capacity from the current level and its percentage (0 to 100).
pub fn tank_estimate(liters: f32, pct: f32) -> Option<f32> {
    (pct > 0.).then(|| 100. * liters / pct)
}
