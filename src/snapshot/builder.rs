use std::time::{Duration, Instant};

use log::{debug, info, warn};
use uom::si::{
    f32::Velocity,
    velocity::{kilometer_per_hour, meter_per_second},
};

use super::{FuelHistory, SharedSnapshot, Snapshot, tank_estimate};
use crate::{
    DashError,
    format::{format_delta, format_lap_time},
    lifecycle::Shutdown,
    standings::{GapPolicy, standings_window},
    telemetry::{TelemetrySource, vars},
};

/// Samples a telemetry source and derives the display snapshot.
///
/// The builder owns its source and a scratch snapshot. Every tick it pulls a new state,
/// recomputes the derived fields into the scratch copy, and only then publishes it, so the
/// shared lock is held for a single copy.
pub struct SnapshotBuilder<S> {
    source: S,
    fuel: FuelHistory,
    gap_policy: GapPolicy,
    update_timeout: Duration,
    scratch: Snapshot,
    failed_updates: u64,
}

impl<S: TelemetrySource> SnapshotBuilder<S> {
    pub fn new(source: S, gap_policy: GapPolicy, update_timeout: Duration) -> Self {
        Self {
            source,
            fuel: FuelHistory::default(),
            gap_policy,
            update_timeout,
            scratch: Snapshot::default(),
            failed_updates: 0,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn fuel_history(&self) -> &FuelHistory {
        &self.fuel
    }

    /// Run one sample tick.
    ///
    /// Returns the freshly derived snapshot, or the update error when the source had no
    /// new state. In that case the previous snapshot is left untouched.
    pub fn sample(&mut self) -> Result<&Snapshot, DashError> {
        if let Err(e) = self.source.update(self.update_timeout) {
            if self.failed_updates == 0 {
                warn!("Could not update telemetry: {}", e);
            } else {
                debug!("Could not update telemetry: {}", e);
            }
            self.failed_updates += 1;
            return Err(e);
        }
        if self.failed_updates > 0 {
            info!(
                "Telemetry updates resumed after {} failures",
                self.failed_updates
            );
            self.failed_updates = 0;
        }

        self.vehicle_data();
        self.fuel_data();
        self.lap_data();
        self.standings_data();
        self.scratch.tick += 1;
        Ok(&self.scratch)
    }

    /// Sample at a fixed rate and publish every successful tick until shutdown.
    ///
    /// Ticks that are missed because a sample overran its period are dropped rather than
    /// replayed in a burst.
    pub fn run(&mut self, shared: &SharedSnapshot, shutdown: &Shutdown, period: Duration) {
        info!("Sampling telemetry every {:?}", period);
        let mut next_tick = Instant::now();
        loop {
            if let Ok(snapshot) = self.sample() {
                shared.publish(snapshot);
            }

            next_tick += period;
            let now = Instant::now();
            if next_tick < now {
                next_tick = now;
            }
            if shutdown.wait_timeout(next_tick - now) {
                break;
            }
        }
        info!("Snapshot builder stopped after {} samples", self.scratch.tick);
    }

    fn read_int(&self, name: &str) -> Option<i32> {
        self.source.get_int(name).unwrap_or_else(|e| {
            warn!("{}", e);
            None
        })
    }

    fn read_float(&self, name: &str) -> Option<f32> {
        self.source.get_float(name).unwrap_or_else(|e| {
            warn!("{}", e);
            None
        })
    }

    fn vehicle_data(&mut self) {
        if let Some(gear) = self.read_int(vars::GEAR) {
            self.scratch.gear = gear;
        }
        if let Some(rpm) = self.read_float(vars::RPM) {
            self.scratch.rpm = rpm.round() as i32;
        }
        if let Some(speed) = self.read_float(vars::SPEED) {
            let speed = Velocity::new::<meter_per_second>(speed);
            self.scratch.speed_kph = speed.get::<kilometer_per_hour>().round() as i32;
        }
        self.scratch.brake_bias = self.read_float(vars::BRAKE_BIAS);
    }

    fn fuel_data(&mut self) {
        let lap = self.read_int(vars::LAP);
        let liters = self.read_float(vars::FUEL_LEVEL);
        let pct = self.read_float(vars::FUEL_LEVEL_PCT).map(|p| p * 100.);

        if let Some(liters) = liters {
            self.scratch.fuel_liters = liters;
        }
        if let Some(pct) = pct {
            self.scratch.fuel_pct = pct;
        }
        if let (Some(lap), Some(liters)) = (lap, liters) {
            self.fuel.record(lap, liters);
            self.scratch.fuel_per_lap = self.fuel.per_lap(lap);
        }
        self.scratch.fuel_total = tank_estimate(self.scratch.fuel_liters, self.scratch.fuel_pct);
    }

    fn lap_data(&mut self) {
        if let Some(lap) = self.read_int(vars::LAP) {
            self.scratch.lap = lap;
        }
        if let Some(pct) = self.read_float(vars::LAP_DIST_PCT) {
            self.scratch.lap_dist_pct = pct * 100.;
        }
        if let Some(t) = self.read_float(vars::LAP_CURRENT_LAP_TIME) {
            self.scratch.current_lap_time = format_lap_time(t);
        }
        if let Some(t) = self.read_float(vars::LAP_BEST_LAP_TIME) {
            self.scratch.best_lap_time = format_lap_time(t);
        }
        if let Some(t) = self.read_float(vars::LAP_LAST_LAP_TIME) {
            self.scratch.last_lap_time = format_lap_time(t);
        }
        if let Some(delta) = self.read_float(vars::LAP_DELTA_TO_BEST_LAP) {
            self.scratch.lap_delta = delta;
            self.scratch.lap_delta_text = format_delta(delta);
        }
    }

    fn standings_data(&mut self) {
        let Some(session) = self.source.session_info() else {
            return;
        };
        let (rows, rank) = standings_window(&self.source, session, self.gap_policy);
        self.scratch.standings = rows;
        self.scratch.position = rank.map(|r| r + 1);
    }
}
