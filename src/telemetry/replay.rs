use std::{
    collections::HashMap,
    path::Path,
    time::{Duration, Instant},
};

use log::{error, info};

use super::{RecordedLine, RecordedTick, SessionInfo, TelemetrySource, VarValue, ibt::Pacing};
use crate::DashError;

/// Replays a JSON Lines recording written by [`super::recorder::RecordingSource`].
///
/// The whole recording is loaded up front. With [`Pacing::RealTime`] each update jumps to
/// the latest tick whose timestamp has elapsed since the first update.
pub struct RecordingReplaySource {
    ticks: Vec<RecordedTick>,
    session: Option<SessionInfo>,
    current: HashMap<String, VarValue>,
    loaded: Option<usize>,
    pacing: Pacing,
    started: Option<Instant>,
}

impl RecordingReplaySource {
    pub fn from_lines(lines: Vec<RecordedLine>, pacing: Pacing) -> Self {
        let mut ticks = Vec::new();
        let mut session = None;
        for line in lines {
            match line {
                RecordedLine::SessionChange(info) => session = Some(info),
                RecordedLine::Tick(tick) => ticks.push(tick),
            }
        }

        Self {
            ticks,
            session,
            current: HashMap::new(),
            loaded: None,
            pacing,
            started: None,
        }
    }

    /// Load a recording from a JSON Lines file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or a line is not a valid recording line.
    pub fn from_file(path: &Path, pacing: Pacing) -> Result<Self, DashError> {
        let lines = serde_jsonlines::json_lines::<RecordedLine, _>(path)
            .map_err(|e| DashError::ReplayFile {
                path: path.display().to_string(),
                source: e,
            })?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                error!("Could not parse recording line: {}", e);
                DashError::ReplayFile {
                    path: path.display().to_string(),
                    source: e,
                }
            })?;

        let source = Self::from_lines(lines, pacing);
        info!(
            "Loaded {}: {} recorded ticks",
            path.display(),
            source.ticks.len()
        );
        Ok(source)
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    fn target_tick(&mut self) -> Option<usize> {
        match self.pacing {
            Pacing::EveryUpdate => {
                let next = self.loaded.map_or(0, |i| i + 1);
                (next < self.ticks.len()).then_some(next)
            }
            Pacing::RealTime => {
                let started = *self.started.get_or_insert_with(Instant::now);
                let elapsed_ms = started.elapsed().as_millis() as u64;
                let base = self.ticks.first()?.elapsed_ms;
                let due = self
                    .ticks
                    .partition_point(|t| t.elapsed_ms.saturating_sub(base) <= elapsed_ms);
                if due >= self.ticks.len() && self.loaded == Some(self.ticks.len() - 1) {
                    None
                } else {
                    Some(due.saturating_sub(1))
                }
            }
        }
    }
}

impl TelemetrySource for RecordingReplaySource {
    fn update(&mut self, _timeout: Duration) -> Result<(), DashError> {
        let target = self.target_tick().ok_or(DashError::ReplayExhausted)?;
        if self.loaded != Some(target) {
            self.current = self.ticks[target].vars.clone().into_iter().collect();
            self.loaded = Some(target);
        }
        Ok(())
    }

    fn get(&self, name: &str) -> Option<&VarValue> {
        self.current.get(name)
    }

    fn session_info(&self) -> Option<&SessionInfo> {
        self.session.as_ref()
    }
}
