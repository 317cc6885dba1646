// Error types for dashlink

use snafu::Snafu;
use std::io;

#[derive(Debug, Snafu)]
pub enum DashError {
    // Errors for the serial transport
    #[snafu(display("Unable to open serial port {port}"))]
    SerialOpen {
        port: String,
        source: serialport::Error,
    },

    // Errors for the telemetry providers
    #[snafu(display("Telemetry provider could not be initialized: {description}"))]
    ProviderInit { description: String },
    #[snafu(display("Unable to open telemetry file {path}"))]
    ReplayFile { path: String, source: io::Error },
    #[snafu(display("Invalid IBT file: {reason}"))]
    InvalidIbt { reason: String },
    #[snafu(display("Could not parse session info: {reason}"))]
    SessionInfoParse { reason: String },
    #[snafu(display("Timeout waiting for telemetry update"))]
    UpdateTimeout,
    #[snafu(display("Telemetry replay reached the end of the recording"))]
    ReplayExhausted,

    // Errors while reading variables
    #[snafu(display("Variable {name} has type {found}, expected {expected}"))]
    VariableTypeMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    // Errors for the telemetry writer
    #[snafu(display("Error writing telemetry file"))]
    WriterError { source: io::Error },

    // Config management errors
    #[snafu(display("Could not find application data directory to save config file"))]
    NoConfigDir,
    #[snafu(display("Error reading or writing config file"))]
    ConfigIOError { source: io::Error },
    #[snafu(display("Error serializing config file"))]
    ConfigSerializeError { source: serde_json::Error },

    // Wire protocol errors
    #[snafu(display("Invalid frame: {reason}"))]
    InvalidFrame { reason: String },

    // Worker lifecycle errors
    #[snafu(display("Could not spawn {worker} worker"))]
    WorkerSpawn {
        worker: &'static str,
        source: io::Error,
    },
    #[snafu(display("The {worker} worker panicked"))]
    WorkerPanicked { worker: &'static str },
}
