use std::{
    collections::VecDeque,
    io::{self, Read, Write},
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use log::info;
use serialport::{ClearBuffer, SerialPort};

use crate::{DashError, lifecycle::Shutdown};

/// A byte stream to the display.
///
/// Reads must return `ErrorKind::TimedOut` (or `WouldBlock`) when no byte arrives within
/// the configured read timeout, so the server can observe shutdown.
pub trait Transport: Read + Write + Send {
    /// Drop every byte received but not yet read.
    fn clear_input(&mut self) -> io::Result<()>;
}

impl Transport for Box<dyn SerialPort> {
    fn clear_input(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::Input).map_err(io::Error::from)
    }
}

/// Open a serial port in 8N1 mode.
pub fn open_port(
    port: &str,
    baud_rate: u32,
    read_timeout: Duration,
) -> Result<Box<dyn SerialPort>, DashError> {
    let serial = serialport::new(port, baud_rate)
        .timeout(read_timeout)
        .open()
        .map_err(|e| DashError::SerialOpen {
            port: port.to_string(),
            source: e,
        })?;
    info!("Opened {} at {} baud", port, baud_rate);
    Ok(serial)
}

enum ScriptedRead {
    Byte(u8),
    Eof,
    Error(io::ErrorKind),
}

/// An in-memory transport that replays a scripted sequence of reads.
///
/// Everything written is collected in a shared buffer. Once the script is exhausted
/// reads time out, and the shutdown token registered with [`MockTransport::shutdown_when_done`]
/// is triggered.
#[derive(Default)]
pub struct MockTransport {
    reads: VecDeque<ScriptedRead>,
    written: Arc<Mutex<Vec<u8>>>,
    fail_writes: bool,
    cleared: usize,
    flushes: usize,
    shutdown: Option<Shutdown>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_byte(&mut self, byte: u8) -> &mut Self {
        self.reads.push_back(ScriptedRead::Byte(byte));
        self
    }

    pub fn push_eof(&mut self) -> &mut Self {
        self.reads.push_back(ScriptedRead::Eof);
        self
    }

    pub fn push_error(&mut self, kind: io::ErrorKind) -> &mut Self {
        self.reads.push_back(ScriptedRead::Error(kind));
        self
    }

    pub fn fail_writes(&mut self, fail: bool) -> &mut Self {
        self.fail_writes = fail;
        self
    }

    pub fn shutdown_when_done(&mut self, shutdown: Shutdown) -> &mut Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Handle on the bytes written so far, usable after the transport was moved.
    pub fn written(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.written)
    }

    pub fn cleared(&self) -> usize {
        self.cleared
    }

    pub fn flushes(&self) -> usize {
        self.flushes
    }
}

impl Read for MockTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.reads.pop_front() {
            Some(ScriptedRead::Byte(byte)) if !buf.is_empty() => {
                buf[0] = byte;
                Ok(1)
            }
            Some(ScriptedRead::Byte(_)) | Some(ScriptedRead::Eof) => Ok(0),
            Some(ScriptedRead::Error(kind)) => Err(io::Error::from(kind)),
            None => {
                if let Some(shutdown) = &self.shutdown {
                    shutdown.trigger();
                }
                thread::sleep(Duration::from_millis(1));
                Err(io::Error::from(io::ErrorKind::TimedOut))
            }
        }
    }
}

impl Write for MockTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.fail_writes {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        self.written
            .lock()
            .map_err(|_| io::Error::other("written buffer poisoned"))?
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flushes += 1;
        Ok(())
    }
}

impl Transport for MockTransport {
    fn clear_input(&mut self) -> io::Result<()> {
        self.cleared += 1;
        Ok(())
    }
}
