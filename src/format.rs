// Text representations shared by the snapshot, the standings and the wire frame

/// Largest delta magnitude the display can show, in seconds.
pub const MAX_DELTA_S: f64 = 99.9;
/// Largest gap magnitude shown in a standings row, in seconds.
pub const MAX_GAP_S: f64 = 999.999;

/// Format a lap time as `MM:SS.mmm`.
///
/// Negative or unset values are shown as zero. Milliseconds are truncated and minutes
/// wrap after 99.
pub fn format_lap_time(t: f32) -> String {
    let t = if t.is_finite() && t > 0. { t as f64 } else { 0. };
    let total_ms = (t * 1000.).floor() as u64;
    let minutes = (total_ms / 60_000) % 100;
    let seconds = (total_ms / 1000) % 60;
    let millis = total_ms % 1000;
    format!("{:02}:{:02}.{:03}", minutes, seconds, millis)
}

/// Format the delta to the reference lap.
///
/// The sign is `-` when the current lap is at or behind the reference pace (`t >= 0`)
/// and `+` when it is ahead. At one second or more the magnitude has one decimal,
/// rounded half up. Below one second it is shown as truncated hundredths without the
/// leading zero.
pub fn format_delta(t: f32) -> String {
    let t = if t.is_finite() { t as f64 } else { 0. };
    let sign = if t < 0. { '+' } else { '-' };
    let magnitude = t.abs().min(MAX_DELTA_S);

    if magnitude >= 1. {
        let rounded = (magnitude * 10. + 0.5).floor() / 10.;
        format!("{}{:.1}", sign, rounded)
    } else {
        let hundredths = (magnitude * 100.) as u32;
        format!("{}.{:02}", sign, hundredths)
    }
}

/// Format a standings time gap in seconds with millisecond resolution.
pub fn format_gap(t: f32) -> String {
    let t = if t.is_finite() { t as f64 } else { 0. };
    format!("{:.3}", t.clamp(-MAX_GAP_S, MAX_GAP_S))
}
