// Library interface for dashlink
// This allows integration tests and benches to access internal modules

pub mod codec;
pub mod config;
pub mod errors;
pub mod format;
pub mod lifecycle;
pub mod render;
pub mod serial;
pub mod snapshot;
pub mod standings;
pub mod telemetry;
pub mod writer;

// Re-export commonly used types
pub use codec::{FRAME_SIZE, FrameFormat, decode_frame, encode_frame};
pub use config::AppConfig;
pub use errors::DashError;
pub use lifecycle::{Controller, ControllerSettings, Shutdown};
pub use serial::{ProtocolServer, ServerStats, Transport};
pub use snapshot::{SharedSnapshot, Snapshot, SnapshotBuilder};
pub use standings::{CompetitorEntry, GapPolicy};
pub use telemetry::{MockTelemetrySource, SessionInfo, TelemetrySource, VarValue};
