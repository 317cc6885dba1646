use std::{
    sync::{Arc, Condvar, Mutex},
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{error, info};

use crate::{
    DashError,
    codec::FrameFormat,
    render,
    serial::{ProtocolServer, ServerStats, Transport},
    snapshot::{SharedSnapshot, SnapshotBuilder},
    standings::GapPolicy,
    telemetry::TelemetrySource,
};

/// Cancellation token shared by every worker.
///
/// Workers observe it at their wait points; nothing is interrupted mid-operation.
#[derive(Clone, Debug, Default)]
pub struct Shutdown(Arc<(Mutex<bool>, Condvar)>);

impl Shutdown {
    pub fn trigger(&self) {
        let (lock, cvar) = &*self.0;
        *lock.lock().unwrap_or_else(|p| p.into_inner()) = true;
        cvar.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        *self.0.0.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Sleep for `timeout` or until shutdown is triggered. Returns whether it was.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.0;
        let guard = lock.lock().unwrap_or_else(|p| p.into_inner());
        let (triggered, _) = cvar
            .wait_timeout_while(guard, timeout, |triggered| !*triggered)
            .unwrap_or_else(|p| p.into_inner());
        *triggered
    }
}

/// Worker timing and output settings.
#[derive(Clone, Debug)]
pub struct ControllerSettings {
    pub sample_period: Duration,
    pub update_timeout: Duration,
    pub gap_policy: GapPolicy,
    pub frame_format: FrameFormat,
    /// Refresh period of the terminal view, `None` to disable it
    pub render_period: Option<Duration>,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            sample_period: Duration::from_secs(1) / 240,
            update_timeout: Duration::from_millis(100),
            gap_policy: GapPolicy::default(),
            frame_format: FrameFormat::default(),
            render_period: None,
        }
    }
}

/// Starts the snapshot builder, the protocol server and the optional terminal view, and
/// tears them down once shutdown is triggered.
pub struct Controller {
    settings: ControllerSettings,
    shared: SharedSnapshot,
    shutdown: Shutdown,
}

impl Controller {
    pub fn new(settings: ControllerSettings) -> Self {
        Self {
            settings,
            shared: SharedSnapshot::default(),
            shutdown: Shutdown::default(),
        }
    }

    /// Token that stops every worker when triggered.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn snapshot(&self) -> SharedSnapshot {
        self.shared.clone()
    }

    /// Run every worker until shutdown and return the server's delivery counters.
    ///
    /// The transport is dropped only after all workers have been joined.
    pub fn run<S, T>(self, source: S, transport: T) -> Result<ServerStats, DashError>
    where
        S: TelemetrySource + 'static,
        T: Transport + 'static,
    {
        let mut workers: Vec<(&'static str, JoinHandle<()>)> = Vec::new();

        let builder = {
            let shared = self.shared.clone();
            let shutdown = self.shutdown.clone();
            let mut builder = SnapshotBuilder::new(
                source,
                self.settings.gap_policy,
                self.settings.update_timeout,
            );
            let period = self.settings.sample_period;
            self.spawn("builder", move || builder.run(&shared, &shutdown, period))
        };
        workers.push(("builder", builder?));

        if let Some(period) = self.settings.render_period {
            let shared = self.shared.clone();
            let shutdown = self.shutdown.clone();
            match self.spawn("render", move || render::run(&shared, &shutdown, period)) {
                Ok(handle) => workers.push(("render", handle)),
                Err(e) => return Err(self.abort(workers, e)),
            }
        }

        let server = {
            let shared = self.shared.clone();
            let shutdown = self.shutdown.clone();
            let format = self.settings.frame_format;
            self.spawn("server", move || {
                let mut server = ProtocolServer::new(transport, shared, format);
                let stats = server.run(&shutdown);
                (stats, server.into_transport())
            })
        };
        let server = match server {
            Ok(handle) => handle,
            Err(e) => return Err(self.abort(workers, e)),
        };

        let mut result = match server.join() {
            Ok((stats, transport)) => Ok((stats, transport)),
            Err(_) => {
                error!("The server worker panicked");
                self.shutdown.trigger();
                Err(DashError::WorkerPanicked { worker: "server" })
            }
        };
        for (worker, handle) in workers {
            if handle.join().is_err() {
                error!("The {} worker panicked", worker);
                if result.is_ok() {
                    result = Err(DashError::WorkerPanicked { worker });
                }
            }
        }

        let (stats, transport) = result?;
        drop(transport);
        info!("All workers stopped");
        Ok(stats)
    }

    fn spawn<F, R>(&self, name: &'static str, f: F) -> Result<JoinHandle<R>, DashError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        thread::Builder::new()
            .name(name.to_string())
            .spawn(f)
            .map_err(|e| DashError::WorkerSpawn {
                worker: name,
                source: e,
            })
    }

    fn abort(&self, workers: Vec<(&'static str, JoinHandle<()>)>, e: DashError) -> DashError {
        self.shutdown.trigger();
        for (_, handle) in workers {
            let _ = handle.join();
        }
        e
    }
}
