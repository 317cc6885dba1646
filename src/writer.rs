use std::{fs::File, io::BufWriter, path::Path, sync::mpsc::Receiver};

use log::{error, info};
use serde_jsonlines::JsonLinesWriter;

use crate::{DashError, telemetry::RecordedLine};

/// Append every received line to a JSON Lines file until the sending side hangs up.
pub fn write_recording(file: &Path, receiver: Receiver<RecordedLine>) -> Result<(), DashError> {
    let recording_file = File::create(file).map_err(|e| DashError::WriterError { source: e })?;
    let mut writer = JsonLinesWriter::new(BufWriter::new(recording_file));
    let mut written = 0usize;
    for line in &receiver {
        match writer.write(&line) {
            Ok(()) => written += 1,
            Err(e) => error!("Error while writing telemetry line to output file: {}", e),
        }
    }
    writer
        .flush()
        .map_err(|e| DashError::WriterError { source: e })?;
    info!("Wrote {} lines to {}", written, file.display());
    Ok(())
}
