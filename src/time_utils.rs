//! Time handling for WRF output: `XTIME`-style CF units, the timestamp
//! embedded in `wrfout` file names, and the epoch encoding used in stores.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};

/// Timestamp format WRF uses in file names and the `Times` variable
pub const WRF_TIME_FORMAT: &str = "%Y-%m-%d_%H:%M:%S";
const WRF_TIME_LEN: usize = 19;

/// Parse `YYYY-MM-DD_HH:MM:SS`
pub fn parse_wrf_timestamp(s: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(s.trim(), WRF_TIME_FORMAT)
        .map_err(|e| format!("Invalid WRF timestamp '{}': {}", s, e))
}

/// Valid time encoded at the end of a WRF output file name, e.g.
/// `wrfout_d01_2020-01-01_00:00:00` (an extension like `.nc` is tolerated)
pub fn time_from_filename(name: &str) -> Option<NaiveDateTime> {
    let stem = name.strip_suffix(".nc").unwrap_or(name);
    if stem.len() < WRF_TIME_LEN || !stem.is_char_boundary(stem.len() - WRF_TIME_LEN) {
        return None;
    }
    parse_wrf_timestamp(&stem[stem.len() - WRF_TIME_LEN..]).ok()
}

/// Offsets beyond this many seconds (about 292 million years) cannot be
/// represented as a `Duration`
const MAX_OFFSET_SECONDS: f64 = (i64::MAX / 1000) as f64;

/// Parsed form of a CF time `units` attribute such as
/// `minutes since 2020-01-01 00:00:00`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeUnits {
    pub seconds_per_unit: f64,
    pub reference: NaiveDateTime,
}

impl TimeUnits {
    pub fn parse(units: &str) -> Result<Self, String> {
        let (unit, reference) = units
            .split_once(" since ")
            .ok_or_else(|| format!("Time units '{}' lack 'since'", units))?;

        let seconds_per_unit = match unit.trim().to_ascii_lowercase().as_str() {
            "seconds" | "second" | "secs" | "sec" | "s" => 1.0,
            "minutes" | "minute" | "mins" | "min" => 60.0,
            "hours" | "hour" | "hrs" | "hr" | "h" => 3600.0,
            "days" | "day" | "d" => 86400.0,
            other => return Err(format!("Unsupported time unit '{}'", other)),
        };

        Ok(Self {
            seconds_per_unit,
            reference: parse_time_string(reference)?,
        })
    }

    /// Decode an offset to an absolute time (rounded to the nearest second)
    pub fn decode(&self, value: f64) -> Result<NaiveDateTime, String> {
        if !value.is_finite() {
            return Err(format!("Non-finite time offset {}", value));
        }
        let out_of_range = || format!("Time offset {} out of range", value);
        let seconds = (value * self.seconds_per_unit).round();
        if seconds.abs() >= MAX_OFFSET_SECONDS {
            return Err(out_of_range());
        }
        let offset = Duration::try_seconds(seconds as i64).ok_or_else(out_of_range)?;
        self.reference.checked_add_signed(offset).ok_or_else(out_of_range)
    }
}

/// Parse ISO-like times: `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS`,
/// the WRF underscore form, or a bare date (midnight)
pub fn parse_time_string(time_str: &str) -> Result<NaiveDateTime, String> {
    let s = time_str.trim();
    for format in [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        WRF_TIME_FORMAT,
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(dt);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return Ok(dt);
        }
    }
    Err(format!("Could not parse time string: {}", time_str))
}

/// Seconds since 1970-01-01T00:00:00
pub fn to_epoch_seconds(dt: &NaiveDateTime) -> i64 {
    dt.and_utc().timestamp()
}

pub fn from_epoch_seconds(seconds: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp(seconds, 0).map(|dt| dt.naive_utc())
}

/// Format a time the way WRF names its files
pub fn format_wrf_timestamp(dt: &NaiveDateTime) -> String {
    dt.format(WRF_TIME_FORMAT).to_string()
}
