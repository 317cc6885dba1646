use std::{collections::HashMap, time::Duration};

use crate::DashError;

use super::{SessionInfo, VarValue};

#[allow(unused)]
const CONN_RETRY_WAIT_MS: u64 = 200;

/// A source of named simulation variables.
///
/// Implementations connect to a live simulation or replay a recording. The snapshot
/// builder drives a source from a single thread, so implementations only need to be
/// `Send`.
///
/// # Lifecycle
///
/// 1. Call `update()` to pull the next telemetry state
/// 2. Call `get()` for each variable of interest; values reflect the last successful update
/// 3. Call `session_info()` to read the competitor roster
pub trait TelemetrySource: Send {
    /// Pull the next telemetry state, waiting at most `timeout` for it.
    ///
    /// # Errors
    ///
    /// Returns an error if no new state is available. Callers treat this as "skip this
    /// tick" and retry on the next one.
    fn update(&mut self, timeout: Duration) -> Result<(), DashError>;

    /// Look up a variable by name. `None` means the variable is not provided.
    fn get(&self, name: &str) -> Option<&VarValue>;

    /// The parsed session roster, once the source has published one.
    fn session_info(&self) -> Option<&SessionInfo>;

    /// The raw session metadata text, when the source exposes it.
    fn session_yaml(&self) -> Option<&str> {
        None
    }

    fn get_int(&self, name: &str) -> Result<Option<i32>, DashError> {
        self.get(name).map(|v| v.as_int(name)).transpose()
    }

    fn get_float(&self, name: &str) -> Result<Option<f32>, DashError> {
        self.get(name).map(|v| v.as_float(name)).transpose()
    }

    fn get_float_array(&self, name: &str) -> Result<Option<&[f32]>, DashError> {
        self.get(name).map(|v| v.as_float_array(name)).transpose()
    }

    fn get_int_array(&self, name: &str) -> Result<Option<&[i32]>, DashError> {
        self.get(name).map(|v| v.as_int_array(name)).transpose()
    }
}

impl<S: TelemetrySource + ?Sized> TelemetrySource for Box<S> {
    fn update(&mut self, timeout: Duration) -> Result<(), DashError> {
        (**self).update(timeout)
    }

    fn get(&self, name: &str) -> Option<&VarValue> {
        (**self).get(name)
    }

    fn session_info(&self) -> Option<&SessionInfo> {
        (**self).session_info()
    }

    fn session_yaml(&self) -> Option<&str> {
        (**self).session_yaml()
    }
}

/// Live iRacing telemetry read through the simulation's shared memory.
#[cfg(windows)]
pub struct LiveSource {
    runtime: tokio::runtime::Runtime,
    client: simetry::iracing::Client,
    values: HashMap<String, VarValue>,
    session: Option<SessionInfo>,
    session_yaml: Option<String>,
}

#[cfg(windows)]
impl LiveSource {
    /// Connect to a running iRacing session, waiting up to `timeout` for the first state.
    pub fn connect(timeout: Duration) -> Result<Self, DashError> {
        use log::info;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| DashError::ProviderInit {
                description: format!("could not start runtime: {}", e),
            })?;

        info!("iRacing: waiting for a session...");
        let retry_delay = Duration::from_millis(CONN_RETRY_WAIT_MS);
        let client = runtime
            .block_on(async {
                tokio::time::timeout(timeout, simetry::iracing::Client::connect(retry_delay)).await
            })
            .map_err(|_| DashError::ProviderInit {
                description: "timeout waiting for iRacing session".to_string(),
            })?;

        let mut source = Self {
            runtime,
            client,
            values: HashMap::new(),
            session: None,
            session_yaml: None,
        };
        source.update(timeout)?;
        info!("iRacing: connection established");
        Ok(source)
    }

    fn read_state(&mut self, state: &simetry::iracing::SimState) {
        use super::vars;

        self.values.clear();
        for name in [vars::GEAR, vars::LAP] {
            if let Some(v) = state.read_name::<i32>(name) {
                self.values.insert(name.to_string(), VarValue::Int(v));
            }
        }
        for name in [
            vars::RPM,
            vars::SPEED,
            vars::BRAKE_BIAS,
            vars::FUEL_LEVEL,
            vars::FUEL_LEVEL_PCT,
            vars::LAP_DIST_PCT,
            vars::LAP_CURRENT_LAP_TIME,
            vars::LAP_BEST_LAP_TIME,
            vars::LAP_LAST_LAP_TIME,
            vars::LAP_DELTA_TO_BEST_LAP,
        ] {
            if let Some(v) = state.read_name::<f32>(name) {
                self.values.insert(name.to_string(), VarValue::Float(v));
            }
        }
        for name in [vars::CAR_IDX_LAP_DIST_PCT, vars::CAR_IDX_EST_TIME] {
            if let Some(v) = state.read_name::<Vec<f32>>(name) {
                self.values.insert(name.to_string(), VarValue::FloatArray(v));
            }
        }
        if let Some(v) = state.read_name::<Vec<i32>>(vars::CAR_IDX_LAP) {
            self.values
                .insert(vars::CAR_IDX_LAP.to_string(), VarValue::IntArray(v));
        }

        if self.session.is_none() {
            use log::warn;

            let yaml = state.session_info();
            match SessionInfo::from_yaml(yaml) {
                Ok(session) => self.session = Some(session),
                Err(e) => warn!("iRacing: {}", e),
            }
            let mut text = String::new();
            if yaml_rust::YamlEmitter::new(&mut text).dump(yaml).is_ok() {
                self.session_yaml = Some(text);
            }
        }
    }
}

#[cfg(windows)]
impl TelemetrySource for LiveSource {
    fn update(&mut self, timeout: Duration) -> Result<(), DashError> {
        let client = &mut self.client;
        let state = self
            .runtime
            .block_on(async { tokio::time::timeout(timeout, client.next_sim_state()).await })
            .map_err(|_| DashError::UpdateTimeout)?
            .ok_or(DashError::ProviderInit {
                description: "iRacing session closed".to_string(),
            })?;
        self.read_state(&state);
        Ok(())
    }

    fn get(&self, name: &str) -> Option<&VarValue> {
        self.values.get(name)
    }

    fn session_info(&self) -> Option<&SessionInfo> {
        self.session.as_ref()
    }

    fn session_yaml(&self) -> Option<&str> {
        self.session_yaml.as_deref()
    }
}

/// An in-memory telemetry source for tests and demos.
///
/// Each call to `update()` moves to the next queued frame. A queued failure makes that
/// update return `UpdateTimeout`. Once the queue is drained the source either keeps the
/// last frame (`hold_last`) or reports `ReplayExhausted`.
#[derive(Default)]
pub struct MockTelemetrySource {
    frames: Vec<Option<HashMap<String, VarValue>>>,
    cursor: usize,
    current: HashMap<String, VarValue>,
    session: Option<SessionInfo>,
    hold_last: bool,
}

impl MockTelemetrySource {
    pub fn new(session: Option<SessionInfo>) -> Self {
        Self {
            session,
            ..Default::default()
        }
    }

    pub fn push_frame<'a>(&mut self, values: impl IntoIterator<Item = (&'a str, VarValue)>) {
        self.frames.push(Some(
            values
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        ));
    }

    pub fn push_failure(&mut self) {
        self.frames.push(None);
    }

    pub fn hold_last(mut self, hold_last: bool) -> Self {
        self.hold_last = hold_last;
        self
    }

    pub fn remaining(&self) -> usize {
        self.frames.len().saturating_sub(self.cursor)
    }
}

impl TelemetrySource for MockTelemetrySource {
    fn update(&mut self, _timeout: Duration) -> Result<(), DashError> {
        if self.cursor >= self.frames.len() {
            return if self.hold_last && !self.current.is_empty() {
                Ok(())
            } else {
                Err(DashError::ReplayExhausted)
            };
        }

        let frame = self.frames[self.cursor].take();
        self.cursor += 1;
        match frame {
            Some(values) => {
                self.current = values;
                Ok(())
            }
            None => Err(DashError::UpdateTimeout),
        }
    }

    fn get(&self, name: &str) -> Option<&VarValue> {
        self.current.get(name)
    }

    fn session_info(&self) -> Option<&SessionInfo> {
        self.session.as_ref()
    }
}
