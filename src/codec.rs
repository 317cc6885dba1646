//! Fixed-width wire frames for the serial display.
//!
//! The dashboard frame is a sequence of ASCII text fields, each left-aligned in a fixed
//! number of bytes and padded with NUL. The display firmware knows the exact size in
//! advance, so there is no length prefix, only a start and an end marker:
//!
//! ```text
//! 0x02 | speed 5 | gear 3 | rpm 6 | lap 5 | delta 6 | best 10 | current 10 | last 10
//!      | fuel 15 | 5 x (lap 4 | name 24 | behind 8) | 0x03
//! ```
//!
//! The basic frame of the first display generation only carries speed, gear and rpm as
//! little-endian `i32`.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::{
    DashError,
    snapshot::Snapshot,
    standings::{CompetitorEntry, WINDOW_LEN},
};

pub const START_MARKER: u8 = 0x02;
pub const END_MARKER: u8 = 0x03;

pub const SPEED_LEN: usize = 5;
pub const GEAR_LEN: usize = 3;
pub const RPM_LEN: usize = 6;
pub const LAP_NUMBER_LEN: usize = 5;
pub const DELTA_LEN: usize = 6;
pub const BEST_LAP_LEN: usize = 10;
pub const CURRENT_LAP_LEN: usize = 10;
pub const LAST_LAP_LEN: usize = 10;
pub const FUEL_ESTIMATE_LEN: usize = 15;

pub const ROW_LAP_LEN: usize = 4;
pub const DRIVER_NAME_LEN: usize = 24;
pub const TIME_BEHIND_LEN: usize = 8;
pub const ROW_LEN: usize = ROW_LAP_LEN + DRIVER_NAME_LEN + TIME_BEHIND_LEN;

pub const FRAME_SIZE: usize = 1
    + SPEED_LEN
    + GEAR_LEN
    + RPM_LEN
    + LAP_NUMBER_LEN
    + DELTA_LEN
    + BEST_LAP_LEN
    + CURRENT_LAP_LEN
    + LAST_LAP_LEN
    + FUEL_ESTIMATE_LEN
    + WINDOW_LEN * ROW_LEN
    + 1;

pub const BASIC_FRAME_SIZE: usize = 3 * size_of::<i32>();

/// Wire generation served to the display.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FrameFormat {
    /// Full dashboard frame with lap timing, fuel and standings.
    #[default]
    Dashboard,
    /// Speed, gear and rpm as little-endian integers.
    Basic,
}

impl FrameFormat {
    pub fn frame_size(&self) -> usize {
        match self {
            FrameFormat::Dashboard => FRAME_SIZE,
            FrameFormat::Basic => BASIC_FRAME_SIZE,
        }
    }
}

/// Encode the snapshot in the given wire format.
///
/// # Panics
///
/// Panics if the encoded frame does not have the declared size of the format.
pub fn encode_frame(format: FrameFormat, snapshot: &Snapshot) -> Vec<u8> {
    let bytes = match format {
        FrameFormat::Dashboard => FrameFields::from_snapshot(snapshot).to_bytes(),
        FrameFormat::Basic => BasicFields::from_snapshot(snapshot).to_bytes(),
    };
    assert_eq!(
        bytes.len(),
        format.frame_size(),
        "encoded {:?} frame has the wrong size",
        format
    );
    bytes
}

/// One standings row as written on the wire.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RowFields {
    pub lap: String,
    pub driver_name: String,
    pub time_behind: String,
}

impl RowFields {
    pub fn from_entry(entry: &CompetitorEntry) -> Self {
        Self {
            lap: bounded(&format!("{:<2}", entry.lap), ROW_LAP_LEN),
            driver_name: bounded(entry.driver_name.trim(), DRIVER_NAME_LEN),
            time_behind: bounded(&entry.time_behind_text, TIME_BEHIND_LEN),
        }
    }
}

/// Every text field of a dashboard frame, exactly as it is written on the wire.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameFields {
    pub speed: String,
    pub gear: String,
    pub rpm: String,
    pub lap: String,
    pub delta: String,
    pub best_lap: String,
    pub current_lap: String,
    pub last_lap: String,
    pub fuel_estimate: String,
    pub rows: [RowFields; WINDOW_LEN],
}

impl FrameFields {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let fuel_estimate = match snapshot.fuel_laps_remaining() {
            Some(laps) => format!("{:.1} - {:.1}", snapshot.fuel_per_lap, laps),
            None => format!("{:.1} - --", snapshot.fuel_per_lap),
        };

        Self {
            speed: bounded(&format!("{:>3}", snapshot.speed_kph), SPEED_LEN),
            gear: bounded(&format!("{:>2}", snapshot.gear), GEAR_LEN),
            rpm: bounded(&format!("{:>3}", snapshot.rpm), RPM_LEN),
            lap: bounded(&format!("{:<3}", snapshot.lap), LAP_NUMBER_LEN),
            delta: bounded(&snapshot.lap_delta_text, DELTA_LEN),
            best_lap: bounded(&snapshot.best_lap_time, BEST_LAP_LEN),
            current_lap: bounded(&snapshot.current_lap_time, CURRENT_LAP_LEN),
            last_lap: bounded(&snapshot.last_lap_time, LAST_LAP_LEN),
            fuel_estimate: bounded(&fuel_estimate, FUEL_ESTIMATE_LEN),
            rows: std::array::from_fn(|i| RowFields::from_entry(&snapshot.standings[i])),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(FRAME_SIZE);
        frame.push(START_MARKER);
        put_text(&mut frame, &self.speed, SPEED_LEN);
        put_text(&mut frame, &self.gear, GEAR_LEN);
        put_text(&mut frame, &self.rpm, RPM_LEN);
        put_text(&mut frame, &self.lap, LAP_NUMBER_LEN);
        put_text(&mut frame, &self.delta, DELTA_LEN);
        put_text(&mut frame, &self.best_lap, BEST_LAP_LEN);
        put_text(&mut frame, &self.current_lap, CURRENT_LAP_LEN);
        put_text(&mut frame, &self.last_lap, LAST_LAP_LEN);
        put_text(&mut frame, &self.fuel_estimate, FUEL_ESTIMATE_LEN);
        for row in &self.rows {
            put_text(&mut frame, &row.lap, ROW_LAP_LEN);
            put_text(&mut frame, &row.driver_name, DRIVER_NAME_LEN);
            put_text(&mut frame, &row.time_behind, TIME_BEHIND_LEN);
        }
        frame.push(END_MARKER);
        frame
    }
}

/// Parse a dashboard frame back into its text fields.
pub fn decode_frame(bytes: &[u8]) -> Result<FrameFields, DashError> {
    if bytes.len() != FRAME_SIZE {
        return Err(DashError::InvalidFrame {
            reason: format!("expected {} bytes, got {}", FRAME_SIZE, bytes.len()),
        });
    }
    if bytes[0] != START_MARKER || bytes[FRAME_SIZE - 1] != END_MARKER {
        return Err(DashError::InvalidFrame {
            reason: "missing start or end marker".to_string(),
        });
    }

    let mut reader = FieldReader {
        bytes: &bytes[1..FRAME_SIZE - 1],
    };
    let mut fields = FrameFields {
        speed: reader.text(SPEED_LEN),
        gear: reader.text(GEAR_LEN),
        rpm: reader.text(RPM_LEN),
        lap: reader.text(LAP_NUMBER_LEN),
        delta: reader.text(DELTA_LEN),
        best_lap: reader.text(BEST_LAP_LEN),
        current_lap: reader.text(CURRENT_LAP_LEN),
        last_lap: reader.text(LAST_LAP_LEN),
        fuel_estimate: reader.text(FUEL_ESTIMATE_LEN),
        rows: Default::default(),
    };
    for row in fields.rows.iter_mut() {
        row.lap = reader.text(ROW_LAP_LEN);
        row.driver_name = reader.text(DRIVER_NAME_LEN);
        row.time_behind = reader.text(TIME_BEHIND_LEN);
    }
    Ok(fields)
}

/// Fields of the first generation frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BasicFields {
    pub speed: i32,
    pub gear: i32,
    pub rpm: i32,
}

impl BasicFields {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            speed: snapshot.speed_kph,
            gear: snapshot.gear,
            rpm: snapshot.rpm,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        [self.speed, self.gear, self.rpm]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect()
    }
}

pub fn decode_basic_frame(bytes: &[u8]) -> Result<BasicFields, DashError> {
    let values: Vec<i32> = bytes
        .chunks_exact(size_of::<i32>())
        .filter_map(|chunk| chunk.try_into().ok().map(i32::from_le_bytes))
        .collect();
    match (bytes.len(), values.as_slice()) {
        (BASIC_FRAME_SIZE, &[speed, gear, rpm]) => Ok(BasicFields { speed, gear, rpm }),
        (len, _) => Err(DashError::InvalidFrame {
            reason: format!("expected {} bytes, got {}", BASIC_FRAME_SIZE, len),
        }),
    }
}

/// Replace anything the display cannot print with `?` and cut the text to `width` bytes.
fn bounded(text: &str, width: usize) -> String {
    text.chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '?' })
        .take(width)
        .collect()
}

fn put_text(frame: &mut Vec<u8>, text: &str, width: usize) {
    let bytes = &text.as_bytes()[..text.len().min(width)];
    frame.extend_from_slice(bytes);
    frame.resize(frame.len() + width - bytes.len(), 0);
}

struct FieldReader<'a> {
    bytes: &'a [u8],
}

impl FieldReader<'_> {
    fn text(&mut self, width: usize) -> String {
        let (field, rest) = self.bytes.split_at(width);
        self.bytes = rest;
        let end = field.iter().position(|&b| b == 0).unwrap_or(width);
        String::from_utf8_lossy(&field[..end]).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{format_delta, format_gap, format_lap_time};
    use proptest::prelude::*;

    fn entry(lap: i32, name: &str, behind: f32) -> CompetitorEntry {
        CompetitorEntry {
            car_idx: 1,
            lap_pct: 50.,
            lap,
            driver_name: name.to_string(),
            est_time: 0.,
            time_behind: behind,
            time_behind_text: format_gap(behind),
        }
    }

    fn race_snapshot() -> Snapshot {
        Snapshot {
            speed_kph: 100,
            gear: 3,
            rpm: 6500,
            lap: 7,
            current_lap_time: format_lap_time(45.5),
            best_lap_time: format_lap_time(83.456),
            last_lap_time: format_lap_time(84.1),
            lap_delta: 0.123,
            lap_delta_text: format_delta(0.123),
            fuel_liters: 30.,
            fuel_per_lap: 2.5,
            standings: [
                CompetitorEntry::padding(),
                entry(7, "Ana Rossi", 1.25),
                entry(7, "  Ben Okafor  ", 0.),
                entry(6, "Cătălina Müller", 4.5),
                CompetitorEntry::padding(),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_frame_size_matches_layout() {
        assert_eq!(FRAME_SIZE, 252);
        assert_eq!(ROW_LEN, 36);
        assert_eq!(BASIC_FRAME_SIZE, 12);
    }

    #[test]
    fn test_dashboard_layout() {
        let frame = encode_frame(FrameFormat::Dashboard, &race_snapshot());

        assert_eq!(frame.len(), FRAME_SIZE);
        assert_eq!(frame[0], START_MARKER);
        assert_eq!(frame[FRAME_SIZE - 1], END_MARKER);
        assert_eq!(&frame[1..6], b"100\0\0");
        assert_eq!(&frame[6..9], b" 3\0");
        assert_eq!(&frame[9..15], b"6500\0\0");
        assert_eq!(&frame[15..20], b"7  \0\0");
        assert_eq!(&frame[20..26], b"-.12\0\0");
        assert_eq!(&frame[26..36], b"01:23.456\0");
    }

    #[test]
    fn test_dashboard_round_trip() {
        let fields = decode_frame(&encode_frame(FrameFormat::Dashboard, &race_snapshot())).unwrap();

        assert_eq!(fields.speed, "100");
        assert_eq!(fields.current_lap, "00:45.500");
        assert_eq!(fields.last_lap, "01:24.099");
        assert_eq!(fields.fuel_estimate, "2.5 - 12.0");
        assert_eq!(fields.rows[0].driver_name, "---");
        assert_eq!(fields.rows[0].lap, "0 ");
        assert_eq!(fields.rows[0].time_behind, "");
        assert_eq!(fields.rows[1].lap, "7 ");
        assert_eq!(fields.rows[1].time_behind, "1.250");
        assert_eq!(fields.rows[2].driver_name, "Ben Okafor");
        assert_eq!(fields.rows[3].driver_name, "C?t?lina M?ller");
    }

    #[test]
    fn test_unknown_fuel_estimate() {
        let snapshot = Snapshot {
            fuel_liters: 30.,
            ..Default::default()
        };
        let fields = FrameFields::from_snapshot(&snapshot);
        assert_eq!(fields.fuel_estimate, "0.0 - --");
    }

    #[test]
    fn test_long_names_are_truncated() {
        let mut snapshot = Snapshot::default();
        snapshot.standings[2] = entry(12, "Maximilian Alexander von Habsburg", 0.);

        let frame = encode_frame(FrameFormat::Dashboard, &snapshot);
        let fields = decode_frame(&frame).unwrap();
        assert_eq!(fields.rows[2].driver_name, "Maximilian Alexander von");
        assert_eq!(fields.rows[2].driver_name.len(), DRIVER_NAME_LEN);
    }

    #[test]
    fn test_decode_rejects_malformed_frames() {
        assert!(decode_frame(&[0u8; 10]).is_err());

        let mut frame = encode_frame(FrameFormat::Dashboard, &Snapshot::default());
        frame[FRAME_SIZE - 1] = 0;
        assert!(matches!(
            decode_frame(&frame),
            Err(DashError::InvalidFrame { .. })
        ));
    }

    #[test]
    fn test_basic_frame() {
        let frame = encode_frame(FrameFormat::Basic, &race_snapshot());

        assert_eq!(&frame[0..4], &100i32.to_le_bytes());
        assert_eq!(
            decode_basic_frame(&frame).unwrap(),
            BasicFields {
                speed: 100,
                gear: 3,
                rpm: 6500
            }
        );
        assert!(decode_basic_frame(&frame[..8]).is_err());
    }

    #[test]
    fn test_reverse_gear_and_negative_values() {
        let snapshot = Snapshot {
            gear: -1,
            ..Default::default()
        };
        let fields = decode_frame(&encode_frame(FrameFormat::Dashboard, &snapshot)).unwrap();
        assert_eq!(fields.gear, "-1");
    }

    fn arb_entry() -> impl Strategy<Value = CompetitorEntry> {
        (-1i32..200, "\\PC{0,40}", -2000f32..2000f32).prop_map(|(lap, name, behind)| {
            CompetitorEntry {
                car_idx: 0,
                lap_pct: 0.,
                lap,
                driver_name: name,
                est_time: 0.,
                time_behind: behind,
                time_behind_text: format_gap(behind),
            }
        })
    }

    fn arb_snapshot() -> impl Strategy<Value = Snapshot> {
        (
            (any::<i32>(), -1i32..10, any::<i32>(), any::<i32>()),
            (-200f32..200f32, 0f32..10000f32, 0f32..10000f32),
            (0f32..200f32, 0f32..20f32),
            prop::array::uniform5(arb_entry()),
        )
            .prop_map(
                |((speed_kph, gear, rpm, lap), (delta, best, last), (fuel_liters, fuel_per_lap), standings)| {
                    Snapshot {
                        speed_kph,
                        gear,
                        rpm,
                        lap,
                        best_lap_time: format_lap_time(best),
                        last_lap_time: format_lap_time(last),
                        lap_delta: delta,
                        lap_delta_text: format_delta(delta),
                        fuel_liters,
                        fuel_per_lap,
                        standings,
                        ..Default::default()
                    }
                },
            )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_frame_size_is_constant(snapshot in arb_snapshot()) {
            prop_assert_eq!(encode_frame(FrameFormat::Dashboard, &snapshot).len(), FRAME_SIZE);
            prop_assert_eq!(encode_frame(FrameFormat::Basic, &snapshot).len(), BASIC_FRAME_SIZE);
        }

        #[test]
        fn prop_decode_reproduces_written_text(snapshot in arb_snapshot()) {
            let fields = FrameFields::from_snapshot(&snapshot);
            let decoded = decode_frame(&fields.to_bytes()).unwrap();
            prop_assert_eq!(decoded, fields);
        }
    }
}
