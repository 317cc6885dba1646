use std::{
    io::{self, ErrorKind},
    time::{Duration, Instant},
};

use log::{debug, info, trace, warn};

use super::transport::Transport;
use crate::{
    codec::{FrameFormat, encode_frame},
    lifecycle::Shutdown,
    snapshot::SharedSnapshot,
};

/// Request code sent by the display to ask for the current frame.
pub const REQUEST_DATA: i8 = 5;

const DEFAULT_BACKOFF: Duration = Duration::from_millis(100);

/// Delivery counters of a [`ProtocolServer`].
#[derive(Clone, Debug, Default)]
pub struct ServerStats {
    pub served: u64,
    pub ignored: u64,
    pub failed_writes: u64,
    /// Summed time between consecutive data requests
    pub total_interval: Duration,
    pub intervals: u32,
    pub last_request: Option<Instant>,
}

impl ServerStats {
    /// Mean time between two data requests, once at least two were received.
    pub fn average_interval(&self) -> Option<Duration> {
        (self.intervals > 0).then(|| self.total_interval / self.intervals)
    }

    fn record_request(&mut self, at: Instant) {
        if let Some(previous) = self.last_request {
            let interval = at.duration_since(previous);
            trace!("Data request after {:?}", interval);
            self.total_interval += interval;
            self.intervals = self.intervals.saturating_add(1);
        }
        self.last_request = Some(at);
    }
}

/// Serves the shared snapshot to a display that polls for it.
///
/// The server idles on a one byte read. A [`REQUEST_DATA`] byte drops any queued input,
/// encodes the current snapshot and writes the whole frame. Every other byte is ignored.
pub struct ProtocolServer<T> {
    transport: T,
    snapshot: SharedSnapshot,
    format: FrameFormat,
    backoff: Duration,
    stats: ServerStats,
}

impl<T: Transport> ProtocolServer<T> {
    pub fn new(transport: T, snapshot: SharedSnapshot, format: FrameFormat) -> Self {
        Self {
            transport,
            snapshot,
            format,
            backoff: DEFAULT_BACKOFF,
            stats: ServerStats::default(),
        }
    }

    /// Pause after end of stream or a read error before reading again.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Serve requests until shutdown is triggered and return the delivery counters.
    pub fn run(&mut self, shutdown: &Shutdown) -> ServerStats {
        info!("Serving {:?} frames", self.format);
        while !shutdown.is_triggered() {
            self.poll(shutdown);
        }

        match self.stats.average_interval() {
            Some(avg) => info!(
                "Served {} frames, average request interval {:?}",
                self.stats.served, avg
            ),
            None => info!("Served {} frames", self.stats.served),
        }
        if self.stats.failed_writes > 0 {
            warn!("{} frames could not be written", self.stats.failed_writes);
        }
        self.stats.clone()
    }

    /// Read one byte and handle it.
    pub fn poll(&mut self, shutdown: &Shutdown) {
        let mut buf = [0u8; 1];
        match self.transport.read(&mut buf) {
            Ok(0) => {
                debug!("Serial stream ended, retrying");
                shutdown.wait_timeout(self.backoff);
            }
            Ok(_) => self.handle_request(buf[0] as i8),
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                warn!("Error reading from serial port: {}", e);
                shutdown.wait_timeout(self.backoff);
            }
        }
    }

    fn handle_request(&mut self, code: i8) {
        if code != REQUEST_DATA {
            trace!("Ignoring request code {}", code);
            self.stats.ignored += 1;
            return;
        }
        self.stats.record_request(Instant::now());

        match self.serve() {
            Ok(()) => self.stats.served += 1,
            Err(e) => {
                warn!("Could not send frame: {}", e);
                self.stats.failed_writes += 1;
            }
        }
    }

    fn serve(&mut self) -> io::Result<()> {
        if let Err(e) = self.transport.clear_input() {
            debug!("Could not clear pending input: {}", e);
        }
        let format = self.format;
        let frame = self.snapshot.with(|s| encode_frame(format, s));
        self.transport.write_all(&frame)?;
        self.transport.flush()
    }
}
