//! Race-order standings and the five-row window shown on the display.
//!
//! The engine builds one [`CompetitorEntry`] per classified car, orders them by race
//! progress, derives a time gap for each entry, and finally cuts a window of
//! [`WINDOW_LEN`] rows centered on a reference car. Rows that fall outside the field are
//! filled with [`CompetitorEntry::padding`] so the reference car always stays in the
//! middle row.

use std::cmp::Ordering;

use clap::ValueEnum;
use itertools::Itertools;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::{
    format::format_gap,
    telemetry::{SessionInfo, TelemetrySource, vars},
};

pub const WINDOW_LEN: usize = 5;
/// Rows shown above (and below) the reference car.
const WINDOW_HALF: isize = 2;
pub const PADDING_NAME: &str = "---";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompetitorEntry {
    pub car_idx: i32,
    /// Position within the current lap, 0 to 100
    pub lap_pct: f32,
    /// Completed laps, -1 when not yet classified
    pub lap: i32,
    pub driver_name: String,
    /// Estimated time for the car to reach its current position on track
    pub est_time: f32,
    pub time_behind: f32,
    pub time_behind_text: String,
}

impl CompetitorEntry {
    pub fn padding() -> Self {
        Self {
            car_idx: 0,
            lap_pct: 0.,
            lap: 0,
            driver_name: PADDING_NAME.to_string(),
            est_time: 0.,
            time_behind: 0.,
            time_behind_text: String::new(),
        }
    }

    pub fn is_padding(&self) -> bool {
        self.driver_name == PADDING_NAME && self.car_idx == 0 && self.lap == 0
    }
}

impl Default for CompetitorEntry {
    fn default() -> Self {
        Self::padding()
    }
}

/// How the time gap of each standings row is derived.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum GapPolicy {
    /// Absolute gap between each car and the reference car.
    #[default]
    Relative,
    /// Interval to the car immediately ahead in race order; the leader shows zero.
    ///
    /// The interval is not corrected when the trailing car is still on the previous
    /// lap, so it is meaningless across the start/finish line.
    GapToAhead,
}

/// Build the unordered standings table from the roster and the per-car arrays.
///
/// Pace cars, spectators, empty names, cars without a classified lap, and roster slots
/// outside the per-car arrays are left out. The table is empty until the simulation
/// reports per-car lap distances.
pub fn build_table(source: &dyn TelemetrySource, session: &SessionInfo) -> Vec<CompetitorEntry> {
    let lap_dist_pct = match source.get_float_array(vars::CAR_IDX_LAP_DIST_PCT) {
        Ok(Some(values)) => values,
        Ok(None) => return Vec::new(),
        Err(e) => {
            warn!("{}", e);
            return Vec::new();
        }
    };
    let est_time = source
        .get_float_array(vars::CAR_IDX_EST_TIME)
        .unwrap_or_else(|e| {
            warn!("{}", e);
            None
        })
        .unwrap_or(&[]);
    let laps = source
        .get_int_array(vars::CAR_IDX_LAP)
        .unwrap_or_else(|e| {
            warn!("{}", e);
            None
        })
        .unwrap_or(&[]);

    session
        .drivers
        .iter()
        .filter(|d| !d.is_pace_car && !d.is_spectator && !d.user_name.is_empty())
        .filter_map(|d| {
            let idx = usize::try_from(d.car_idx).ok()?;
            let lap = *laps.get(idx)?;
            if lap == -1 {
                return None;
            }
            Some(CompetitorEntry {
                car_idx: d.car_idx,
                lap_pct: lap_dist_pct.get(idx).copied().unwrap_or(0.) * 100.,
                lap,
                driver_name: d.user_name.clone(),
                est_time: est_time.get(idx).copied().unwrap_or(0.),
                time_behind: 0.,
                time_behind_text: format_gap(0.),
            })
        })
        .collect()
}

/// Sort by race progress: more laps first, then further around the current lap.
///
/// The sort is stable, entries with an identical key keep their roster order.
pub fn order(table: Vec<CompetitorEntry>) -> Vec<CompetitorEntry> {
    table
        .into_iter()
        .sorted_by(|a, b| {
            b.lap.cmp(&a.lap).then_with(|| {
                b.lap_pct
                    .partial_cmp(&a.lap_pct)
                    .unwrap_or(Ordering::Equal)
            })
        })
        .collect()
}

/// Fill `time_behind` and its text for every entry of an ordered table.
pub fn apply_gaps(table: &mut [CompetitorEntry], reference_est_time: f32, policy: GapPolicy) {
    match policy {
        GapPolicy::Relative => {
            for entry in table.iter_mut() {
                entry.time_behind = (reference_est_time - entry.est_time).abs();
            }
        }
        GapPolicy::GapToAhead => {
            let ahead: Vec<f32> = table.iter().map(|e| e.est_time).collect();
            for (rank, entry) in table.iter_mut().enumerate() {
                entry.time_behind = match rank {
                    0 => 0.,
                    _ => ahead[rank - 1] - entry.est_time,
                };
            }
        }
    }

    for entry in table.iter_mut() {
        entry.time_behind_text = format_gap(entry.time_behind);
    }
}

/// Locate a car in an ordered table.
pub fn rank_of(table: &[CompetitorEntry], car_idx: i32) -> Option<usize> {
    table.iter().position(|e| e.car_idx == car_idx)
}

/// Cut the display window centered on `reference_car_idx`.
///
/// Returns the window together with the reference car's rank. Slots outside the table
/// hold the padding entry. A reference car that is not in the table yields a window of
/// padding only.
pub fn window(
    table: &[CompetitorEntry],
    reference_car_idx: i32,
) -> ([CompetitorEntry; WINDOW_LEN], Option<usize>) {
    let Some(rank) = rank_of(table, reference_car_idx) else {
        return (std::array::from_fn(|_| CompetitorEntry::padding()), None);
    };

    let rows = std::array::from_fn(|slot| {
        let idx = rank as isize + slot as isize - WINDOW_HALF;
        usize::try_from(idx)
            .ok()
            .and_then(|idx| table.get(idx))
            .cloned()
            .unwrap_or_else(CompetitorEntry::padding)
    });
    (rows, Some(rank))
}

/// Build, order, gap, and window the standings for the session's player.
pub fn standings_window(
    source: &dyn TelemetrySource,
    session: &SessionInfo,
    policy: GapPolicy,
) -> ([CompetitorEntry; WINDOW_LEN], Option<usize>) {
    let mut table = order(build_table(source, session));

    let reference_est_time = usize::try_from(session.player_car_idx)
        .ok()
        .and_then(|idx| {
            source
                .get_float_array(vars::CAR_IDX_EST_TIME)
                .ok()
                .flatten()?
                .get(idx)
                .copied()
        })
        .unwrap_or(0.);
    apply_gaps(&mut table, reference_est_time, policy);

    window(&table, session.player_car_idx)
}
