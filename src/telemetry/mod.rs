pub mod ibt;
pub mod producer;
pub mod recorder;
pub mod replay;
pub(crate) mod session;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::DashError;

pub use producer::{MockTelemetrySource, TelemetrySource};

/// Names of the simulation variables consumed by the snapshot builder.
pub mod vars {
    pub const GEAR: &str = "Gear";
    pub const RPM: &str = "RPM";
    pub const SPEED: &str = "Speed";
    pub const BRAKE_BIAS: &str = "dcBrakeBias";
    pub const FUEL_LEVEL: &str = "FuelLevel";
    pub const FUEL_LEVEL_PCT: &str = "FuelLevelPct";
    pub const LAP: &str = "Lap";
    pub const LAP_DIST_PCT: &str = "LapDistPct";
    pub const LAP_CURRENT_LAP_TIME: &str = "LapCurrentLapTime";
    pub const LAP_BEST_LAP_TIME: &str = "LapBestLapTime";
    pub const LAP_LAST_LAP_TIME: &str = "LapLastLapTime";
    pub const LAP_DELTA_TO_BEST_LAP: &str = "LapDeltaToBestLap";
    pub const CAR_IDX_LAP_DIST_PCT: &str = "CarIdxLapDistPct";
    pub const CAR_IDX_EST_TIME: &str = "CarIdxEstTime";
    pub const CAR_IDX_LAP: &str = "CarIdxLap";

    /// Every variable the builder reads, in the order they are recorded.
    pub const ALL: &[&str] = &[
        GEAR,
        RPM,
        SPEED,
        BRAKE_BIAS,
        FUEL_LEVEL,
        FUEL_LEVEL_PCT,
        LAP,
        LAP_DIST_PCT,
        LAP_CURRENT_LAP_TIME,
        LAP_BEST_LAP_TIME,
        LAP_LAST_LAP_TIME,
        LAP_DELTA_TO_BEST_LAP,
        CAR_IDX_LAP_DIST_PCT,
        CAR_IDX_EST_TIME,
        CAR_IDX_LAP,
    ];
}

/// A single value read from the simulation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum VarValue {
    Int(i32),
    Float(f32),
    Double(f64),
    Bool(bool),
    Str(String),
    FloatArray(Vec<f32>),
    IntArray(Vec<i32>),
}

impl VarValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            VarValue::Int(_) => "int",
            VarValue::Float(_) => "float",
            VarValue::Double(_) => "double",
            VarValue::Bool(_) => "bool",
            VarValue::Str(_) => "string",
            VarValue::FloatArray(_) => "float array",
            VarValue::IntArray(_) => "int array",
        }
    }

    fn mismatch(&self, name: &str, expected: &'static str) -> DashError {
        DashError::VariableTypeMismatch {
            name: name.to_string(),
            expected,
            found: self.type_name(),
        }
    }

    pub fn as_int(&self, name: &str) -> Result<i32, DashError> {
        match self {
            VarValue::Int(v) => Ok(*v),
            VarValue::Bool(v) => Ok(*v as i32),
            other => Err(other.mismatch(name, "int")),
        }
    }

    pub fn as_float(&self, name: &str) -> Result<f32, DashError> {
        match self {
            VarValue::Float(v) => Ok(*v),
            VarValue::Double(v) => Ok(*v as f32),
            other => Err(other.mismatch(name, "float")),
        }
    }

    pub fn as_float_array(&self, name: &str) -> Result<&[f32], DashError> {
        match self {
            VarValue::FloatArray(v) => Ok(v),
            other => Err(other.mismatch(name, "float array")),
        }
    }

    pub fn as_int_array(&self, name: &str) -> Result<&[i32], DashError> {
        match self {
            VarValue::IntArray(v) => Ok(v),
            other => Err(other.mismatch(name, "int array")),
        }
    }
}

/// One slot of the session roster.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct DriverInfo {
    pub car_idx: i32,
    pub user_name: String,
    pub is_pace_car: bool,
    pub is_spectator: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct SessionInfo {
    /// Car index of the local driver
    pub player_car_idx: i32,
    pub drivers: Vec<DriverInfo>,
}

/// The values consumed during one sample tick, as written to a recording.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RecordedTick {
    pub tick: u64,
    pub elapsed_ms: u64,
    pub vars: BTreeMap<String, VarValue>,
}

/// A line of a JSON Lines telemetry recording.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum RecordedLine {
    SessionChange(SessionInfo),
    Tick(RecordedTick),
}
