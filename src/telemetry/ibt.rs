//! Replay of iRacing `.ibt` disk telemetry files.
//!
//! An IBT file is laid out as:
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │ Header (112 bytes, little-endian i32s)     │
//! │ Disk sub-header (32 bytes)                 │
//! ├────────────────────────────────────────────┤
//! │ Variable headers (144 bytes each)          │
//! ├────────────────────────────────────────────┤
//! │ Session info (YAML text)                   │
//! ├────────────────────────────────────────────┤
//! │ Sample rows (buf_len bytes each)           │
//! └────────────────────────────────────────────┘
//! ```

use std::{
    collections::HashMap,
    fs::File,
    io::{BufReader, Read, Seek, SeekFrom},
    path::Path,
    time::{Duration, Instant},
};

use log::{debug, info, warn};

use super::{SessionInfo, TelemetrySource, VarValue};
use crate::DashError;

pub const HEADER_LEN: usize = 112;
pub const DISK_SUB_HEADER_LEN: usize = 32;
pub const VAR_HEADER_LEN: usize = 144;

const VAR_NAME_OFFSET: usize = 16;
const VAR_NAME_LEN: usize = 32;
const MAX_VARS: i32 = 4096;
const DEFAULT_TICK_RATE: i32 = 60;

/// How a replay advances through its recorded samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pacing {
    /// Follow the wall clock from the first update, skipping rows when behind.
    RealTime,
    /// Advance one sample per update.
    EveryUpdate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum VarType {
    Char,
    Bool,
    Int,
    BitField,
    Float,
    Double,
}

impl VarType {
    fn size(self) -> usize {
        match self {
            VarType::Char | VarType::Bool => 1,
            VarType::Int | VarType::BitField | VarType::Float => 4,
            VarType::Double => 8,
        }
    }
}

impl TryFrom<i32> for VarType {
    type Error = DashError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(VarType::Char),
            1 => Ok(VarType::Bool),
            2 => Ok(VarType::Int),
            3 => Ok(VarType::BitField),
            4 => Ok(VarType::Float),
            5 => Ok(VarType::Double),
            other => Err(DashError::InvalidIbt {
                reason: format!("unknown variable type {}", other),
            }),
        }
    }
}

#[derive(Clone, Debug)]
struct VarHeader {
    var_type: VarType,
    offset: usize,
    count: usize,
    name: String,
}

#[derive(Clone, Debug)]
struct IbtHeader {
    tick_rate: i32,
    session_info_len: usize,
    session_info_offset: usize,
    num_vars: usize,
    var_header_offset: usize,
    buf_len: usize,
    data_offset: usize,
    record_count: usize,
}

fn le_array<const N: usize>(buf: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[offset..offset + N]);
    out
}

fn le_i32(buf: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes(le_array(buf, offset))
}

fn non_negative(value: i32, field: &str) -> Result<usize, DashError> {
    usize::try_from(value).map_err(|_| DashError::InvalidIbt {
        reason: format!("negative {} ({})", field, value),
    })
}

impl IbtHeader {
    fn parse(buf: &[u8; HEADER_LEN + DISK_SUB_HEADER_LEN], file_len: u64) -> Result<Self, DashError> {
        let tick_rate = match le_i32(buf, 8) {
            rate if rate > 0 => rate,
            _ => DEFAULT_TICK_RATE,
        };
        let session_info_len = non_negative(le_i32(buf, 16), "session info length")?;
        let session_info_offset = non_negative(le_i32(buf, 20), "session info offset")?;
        let num_vars = le_i32(buf, 24);
        if !(0..=MAX_VARS).contains(&num_vars) {
            return Err(DashError::InvalidIbt {
                reason: format!("unreasonable variable count {}", num_vars),
            });
        }
        let var_header_offset = non_negative(le_i32(buf, 28), "variable header offset")?;
        let buf_len = non_negative(le_i32(buf, 36), "buffer length")?;
        if buf_len == 0 {
            return Err(DashError::InvalidIbt {
                reason: "zero-length sample rows".to_string(),
            });
        }
        // first var buffer descriptor: tick count, then buffer offset
        let data_offset = non_negative(le_i32(buf, 52), "data offset")?;

        let rows_in_file = (file_len.saturating_sub(data_offset as u64) / buf_len as u64) as usize;
        let record_count = match le_i32(buf, HEADER_LEN + 28) {
            n if n > 0 => (n as usize).min(rows_in_file),
            _ => rows_in_file,
        };

        Ok(Self {
            tick_rate,
            session_info_len,
            session_info_offset,
            num_vars: num_vars as usize,
            var_header_offset,
            buf_len,
            data_offset,
            record_count,
        })
    }
}

impl VarHeader {
    fn parse(buf: &[u8], buf_len: usize) -> Result<Self, DashError> {
        let var_type = VarType::try_from(le_i32(buf, 0))?;
        let offset = non_negative(le_i32(buf, 4), "variable offset")?;
        let count = non_negative(le_i32(buf, 8), "variable count")?.max(1);
        let name_bytes = &buf[VAR_NAME_OFFSET..VAR_NAME_OFFSET + VAR_NAME_LEN];
        let name_end = name_bytes.iter().position(|b| *b == 0).unwrap_or(VAR_NAME_LEN);
        let name = String::from_utf8_lossy(&name_bytes[..name_end]).to_string();

        if offset + var_type.size() * count > buf_len {
            return Err(DashError::InvalidIbt {
                reason: format!("variable {} lies outside the sample row", name),
            });
        }

        Ok(Self {
            var_type,
            offset,
            count,
            name,
        })
    }

    fn decode(&self, row: &[u8]) -> VarValue {
        let size = self.var_type.size();
        let at = |i: usize| self.offset + i * size;

        match (self.var_type, self.count) {
            (VarType::Char, _) => {
                let bytes = &row[self.offset..self.offset + self.count];
                let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
                VarValue::Str(String::from_utf8_lossy(&bytes[..end]).to_string())
            }
            (VarType::Bool, 1) => VarValue::Bool(row[self.offset] != 0),
            (VarType::Bool, n) => VarValue::IntArray((0..n).map(|i| row[at(i)] as i32).collect()),
            (VarType::Int | VarType::BitField, 1) => VarValue::Int(le_i32(row, self.offset)),
            (VarType::Int | VarType::BitField, n) => {
                VarValue::IntArray((0..n).map(|i| le_i32(row, at(i))).collect())
            }
            (VarType::Float, 1) => VarValue::Float(f32::from_le_bytes(le_array(row, self.offset))),
            (VarType::Float, n) => VarValue::FloatArray(
                (0..n)
                    .map(|i| f32::from_le_bytes(le_array(row, at(i))))
                    .collect(),
            ),
            (VarType::Double, 1) => {
                VarValue::Double(f64::from_le_bytes(le_array(row, self.offset)))
            }
            (VarType::Double, n) => VarValue::FloatArray(
                (0..n)
                    .map(|i| f64::from_le_bytes(le_array(row, at(i))) as f32)
                    .collect(),
            ),
        }
    }
}

/// Telemetry source replaying an IBT file.
pub struct IbtReplaySource<R> {
    reader: R,
    name: String,
    header: IbtHeader,
    var_headers: Vec<VarHeader>,
    session: Option<SessionInfo>,
    session_yaml: Option<String>,
    row: Vec<u8>,
    values: HashMap<String, VarValue>,
    loaded: Option<usize>,
    next_record: usize,
    pacing: Pacing,
    started: Option<Instant>,
}

impl IbtReplaySource<BufReader<File>> {
    pub fn open(path: &Path, pacing: Pacing) -> Result<Self, DashError> {
        let file = File::open(path).map_err(|e| DashError::ReplayFile {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_reader(BufReader::new(file), &path.display().to_string(), pacing)
    }
}

impl<R: Read + Seek> IbtReplaySource<R> {
    pub fn from_reader(mut reader: R, name: &str, pacing: Pacing) -> Result<Self, DashError> {
        let io_error = |e| DashError::ReplayFile {
            path: name.to_string(),
            source: e,
        };

        let file_len = reader.seek(SeekFrom::End(0)).map_err(io_error)?;
        reader.seek(SeekFrom::Start(0)).map_err(io_error)?;

        let mut header_buf = [0u8; HEADER_LEN + DISK_SUB_HEADER_LEN];
        reader.read_exact(&mut header_buf).map_err(|e| DashError::InvalidIbt {
            reason: format!("could not read header: {}", e),
        })?;
        let header = IbtHeader::parse(&header_buf, file_len)?;

        let mut var_buf = vec![0u8; header.num_vars * VAR_HEADER_LEN];
        reader
            .seek(SeekFrom::Start(header.var_header_offset as u64))
            .map_err(io_error)?;
        reader.read_exact(&mut var_buf).map_err(|e| DashError::InvalidIbt {
            reason: format!("could not read variable headers: {}", e),
        })?;
        let var_headers = var_buf
            .chunks_exact(VAR_HEADER_LEN)
            .map(|chunk| VarHeader::parse(chunk, header.buf_len))
            .collect::<Result<Vec<_>, _>>()?;

        let mut yaml_buf = vec![0u8; header.session_info_len];
        reader
            .seek(SeekFrom::Start(header.session_info_offset as u64))
            .map_err(io_error)?;
        reader.read_exact(&mut yaml_buf).map_err(|e| DashError::InvalidIbt {
            reason: format!("could not read session info: {}", e),
        })?;
        let yaml_end = yaml_buf.iter().position(|b| *b == 0).unwrap_or(yaml_buf.len());
        let session_yaml = String::from_utf8_lossy(&yaml_buf[..yaml_end]).to_string();
        let session = match SessionInfo::from_yaml_str(&session_yaml) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!("{}: {}, standings will be empty", name, e);
                None
            }
        };

        info!(
            "Loaded {}: {} variables, {} samples at {} Hz",
            name,
            var_headers.len(),
            header.record_count,
            header.tick_rate
        );

        Ok(Self {
            reader,
            name: name.to_string(),
            row: vec![0u8; header.buf_len],
            header,
            var_headers,
            session,
            session_yaml: Some(session_yaml),
            values: HashMap::new(),
            loaded: None,
            next_record: 0,
            pacing,
            started: None,
        })
    }

    pub fn record_count(&self) -> usize {
        self.header.record_count
    }

    pub fn tick_rate(&self) -> i32 {
        self.header.tick_rate
    }

    fn target_record(&mut self) -> usize {
        match self.pacing {
            Pacing::EveryUpdate => self.next_record,
            Pacing::RealTime => {
                let started = *self.started.get_or_insert_with(Instant::now);
                (started.elapsed().as_secs_f64() * self.header.tick_rate as f64) as usize
            }
        }
    }

    fn load_record(&mut self, record: usize) -> Result<(), DashError> {
        let offset = self.header.data_offset as u64 + (record * self.header.buf_len) as u64;
        self.reader
            .seek(SeekFrom::Start(offset))
            .and_then(|_| self.reader.read_exact(&mut self.row))
            .map_err(|e| DashError::ReplayFile {
                path: self.name.clone(),
                source: e,
            })?;

        self.values.clear();
        for var in &self.var_headers {
            self.values.insert(var.name.clone(), var.decode(&self.row));
        }
        self.loaded = Some(record);
        self.next_record = record + 1;
        Ok(())
    }
}

impl<R: Read + Seek + Send> TelemetrySource for IbtReplaySource<R> {
    fn update(&mut self, _timeout: Duration) -> Result<(), DashError> {
        let target = self.target_record();
        if target >= self.header.record_count {
            return Err(DashError::ReplayExhausted);
        }
        if self.loaded == Some(target) {
            return Ok(());
        }
        if let Some(loaded) = self.loaded {
            if target > loaded + 1 {
                debug!("{}: skipped {} samples", self.name, target - loaded - 1);
            }
        }
        self.load_record(target)
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const YAML: &str = "DriverInfo:\n DriverCarIdx: 1\n Drivers:\n - CarIdx: 0\n   UserName: Ana\n - CarIdx: 1\n   UserName: Ben\n";

    struct TestVar {
        name: &'static str,
        var_type: i32,
        count: i32,
    }

    const VARS: [TestVar; 4] = [
        TestVar { name: "Gear", var_type: 2, count: 1 },
        TestVar { name: "Speed", var_type: 4, count: 1 },
        TestVar { name: "CarIdxEstTime", var_type: 4, count: 2 },
        TestVar { name: "dcBrakeBias", var_type: 5, count: 1 },
    ];
    // 4 + 4 + 8 + 8
    const BUF_LEN: usize = 24;

    fn row(gear: i32, speed: f32, est: [f32; 2], bias: f64) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend(gear.to_le_bytes());
        out.extend(speed.to_le_bytes());
        out.extend(est[0].to_le_bytes());
        out.extend(est[1].to_le_bytes());
        out.extend(bias.to_le_bytes());
        out
    }

    fn build_ibt(rows: &[Vec<u8>], record_count: i32) -> Vec<u8> {
        let var_header_offset = HEADER_LEN + DISK_SUB_HEADER_LEN;
        let session_info_offset = var_header_offset + VARS.len() * VAR_HEADER_LEN;
        let data_offset = session_info_offset + YAML.len() + 1;

        let mut header = vec![0u8; HEADER_LEN + DISK_SUB_HEADER_LEN];
        let mut put = |at: usize, value: i32| header[at..at + 4].copy_from_slice(&value.to_le_bytes());
        put(0, 2);
        put(8, 60);
        put(16, YAML.len() as i32 + 1);
        put(20, session_info_offset as i32);
        put(24, VARS.len() as i32);
        put(28, var_header_offset as i32);
        put(32, 1);
        put(36, BUF_LEN as i32);
        put(52, data_offset as i32);
        put(HEADER_LEN + 28, record_count);

        let mut out = header;
        let mut offset = 0;
        for var in &VARS {
            let mut var_header = vec![0u8; VAR_HEADER_LEN];
            var_header[0..4].copy_from_slice(&var.var_type.to_le_bytes());
            var_header[4..8].copy_from_slice(&(offset as i32).to_le_bytes());
            var_header[8..12].copy_from_slice(&var.count.to_le_bytes());
            var_header[VAR_NAME_OFFSET..VAR_NAME_OFFSET + var.name.len()]
                .copy_from_slice(var.name.as_bytes());
            let size = if var.var_type == 5 { 8 } else { 4 };
            offset += size * var.count as usize;
            out.extend(var_header);
        }
        out.extend(YAML.as_bytes());
        out.push(0);
        for r in rows {
            out.extend(r);
        }
        out
    }

    fn source(rows: &[Vec<u8>], record_count: i32) -> IbtReplaySource<Cursor<Vec<u8>>> {
        IbtReplaySource::from_reader(
            Cursor::new(build_ibt(rows, record_count)),
            "memory",
            Pacing::EveryUpdate,
        )
        .unwrap()
    }

    #[test]
    fn test_reads_header_and_session() {
        let rows = vec![row(3, 27.8, [10., 12.], 54.5)];
        let source = source(&rows, 1);

        assert_eq!(source.record_count(), 1);
        assert_eq!(source.tick_rate(), 60);
        let session = source.session_info().unwrap();
        assert_eq!(session.player_car_idx, 1);
        assert_eq!(session.drivers[1].user_name, "Ben");
        assert!(source.session_yaml().unwrap().contains("DriverCarIdx"));
    }

    #[test]
    fn test_replays_rows_in_order() {
        let rows = vec![
            row(3, 27.8, [10., 12.], 54.5),
            row(4, 40.0, [11., 13.5], 54.0),
        ];
        let mut source = source(&rows, 2);

        source.update(Duration::ZERO).unwrap();
        assert_eq!(source.get("Gear"), Some(&VarValue::Int(3)));
        assert_eq!(source.get("Speed"), Some(&VarValue::Float(27.8)));
        assert_eq!(
            source.get("CarIdxEstTime"),
            Some(&VarValue::FloatArray(vec![10., 12.]))
        );
        assert_eq!(source.get("dcBrakeBias"), Some(&VarValue::Double(54.5)));

        source.update(Duration::ZERO).unwrap();
        assert_eq!(source.get("Gear"), Some(&VarValue::Int(4)));

        assert!(matches!(
            source.update(Duration::ZERO),
            Err(DashError::ReplayExhausted)
        ));
    }

    #[test]
    fn test_record_count_falls_back_to_file_length() {
        let rows = vec![row(1, 1., [0., 0.], 0.), row(2, 2., [0., 0.], 0.)];
        let source = source(&rows, 0);
        assert_eq!(source.record_count(), 2);
    }

    #[test]
    fn test_truncated_header_is_rejected() {
        let result =
            IbtReplaySource::from_reader(Cursor::new(vec![0u8; 40]), "short", Pacing::EveryUpdate);
        assert!(matches!(result, Err(DashError::InvalidIbt { .. })));
    }

    #[test]
    fn test_variable_outside_row_is_rejected() {
        let mut bytes = build_ibt(&[row(1, 1., [0., 0.], 0.)], 1);
        // shrink the declared row length below the last variable's end
        bytes[36..40].copy_from_slice(&8i32.to_le_bytes());
        let result = IbtReplaySource::from_reader(Cursor::new(bytes), "bad", Pacing::EveryUpdate);
        assert!(matches!(result, Err(DashError::InvalidIbt { .. })));
    }
}
