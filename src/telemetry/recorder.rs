use std::{
    collections::BTreeMap,
    path::PathBuf,
    sync::mpsc::{self, Sender},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use log::warn;

use super::{RecordedLine, RecordedTick, SessionInfo, TelemetrySource, VarValue, vars};
use crate::{DashError, writer};

/// Wraps a source and forwards the consumed variables of every successful update to a
/// recording writer.
pub struct RecordingSource<S> {
    inner: S,
    sender: Option<Sender<RecordedLine>>,
    session_sent: bool,
    tick: u64,
    started: Instant,
}

impl<S: TelemetrySource> RecordingSource<S> {
    pub fn new(inner: S, sender: Sender<RecordedLine>) -> Self {
        Self {
            inner,
            sender: Some(sender),
            session_sent: false,
            tick: 0,
            started: Instant::now(),
        }
    }

    fn send(&mut self, line: RecordedLine) {
        if let Some(sender) = &self.sender {
            if sender.send(line).is_err() {
                warn!("Telemetry writer stopped, recording disabled");
                self.sender = None;
            }
        }
    }
}

impl<S: TelemetrySource> TelemetrySource for RecordingSource<S> {
    fn update(&mut self, timeout: Duration) -> Result<(), DashError> {
        self.inner.update(timeout)?;

        if !self.session_sent {
            if let Some(session) = self.inner.session_info().cloned() {
                self.send(RecordedLine::SessionChange(session));
                self.session_sent = true;
            }
        }

        let vars: BTreeMap<String, VarValue> = vars::ALL
            .iter()
            .filter_map(|name| Some((name.to_string(), self.inner.get(name)?.clone())))
            .collect();
        let line = RecordedLine::Tick(RecordedTick {
            tick: self.tick,
            elapsed_ms: self.started.elapsed().as_millis() as u64,
            vars,
        });
        self.tick += 1;
        self.send(line);
        Ok(())
    }

    fn get(&self, name: &str) -> Option<&VarValue> {
        self.inner.get(name)
    }

    fn session_info(&self) -> Option<&SessionInfo> {
        self.inner.session_info()
    }

    fn session_yaml(&self) -> Option<&str> {
        self.inner.session_yaml()
    }
}

/// Start a writer thread for `output` and wrap `source` so that it feeds it.
///
/// The writer finishes once the returned source is dropped.
pub fn record_to<S: TelemetrySource>(
    source: S,
    output: PathBuf,
) -> Result<(RecordingSource<S>, JoinHandle<Result<(), DashError>>), DashError> {
    let (tx, rx) = mpsc::channel::<RecordedLine>();
    let handle = thread::Builder::new()
        .name("recorder".to_string())
        .spawn(move || writer::write_recording(&output, rx))
        .map_err(|e| DashError::WorkerSpawn {
            worker: "recorder",
            source: e,
        })?;
    Ok((RecordingSource::new(source, tx), handle))
}
