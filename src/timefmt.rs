//! Timestamp and duration grammars
//!
//! Timestamp fields read three tags:
//! - `time_format`: `unix`, `unixnano`, `rfc3339` (default), `rfc2822`, or a
//!   chrono `strftime` pattern such as `%Y-%m-%d %H:%M`
//! - `time_utc`: boolean literal, interpret offset-less input as UTC
//! - `time_location`: IANA zone name, wins over `time_utc`
//!
//! Without either, offset-less input is interpreted in the local zone.
//!
//! Durations use the `1h30m` / `1.5s` / `300ms` literal grammar.

use chrono::format::ParseErrorKind;
use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::coerce::parse_bool;
use crate::error::{BindError, Result};
use crate::schema::FieldMeta;

pub const TIME_FORMAT_TAG: &str = "time_format";
pub const TIME_UTC_TAG: &str = "time_utc";
pub const TIME_LOCATION_TAG: &str = "time_location";

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Timestamp options collected from a field's tags
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeOptions {
    pub format: String,
    pub utc: bool,
    pub location: Option<String>,
}

impl TimeOptions {
    pub fn from_field(field: Option<&FieldMeta>) -> Self {
        let Some(field) = field else {
            return Self::default();
        };

        Self {
            format: field.get(TIME_FORMAT_TAG).to_string(),
            // malformed booleans read as false
            utc: parse_bool(field.get(TIME_UTC_TAG)).unwrap_or(false),
            location: field
                .lookup(TIME_LOCATION_TAG)
                .filter(|name| !name.is_empty())
                .map(str::to_string),
        }
    }
}

enum Zone {
    Local,
    Utc,
    Named(Tz),
}

impl Zone {
    fn resolve(opts: &TimeOptions) -> Result<Self> {
        if let Some(name) = &opts.location {
            return name
                .parse::<Tz>()
                .map(Zone::Named)
                .map_err(|_| BindError::UnknownLocation { name: name.clone() });
        }
        Ok(if opts.utc { Zone::Utc } else { Zone::Local })
    }

    fn from_utc(&self, instant: DateTime<Utc>) -> DateTime<FixedOffset> {
        match self {
            Zone::Local => instant.with_timezone(&Local).fixed_offset(),
            Zone::Utc => instant.fixed_offset(),
            Zone::Named(tz) => instant.with_timezone(tz).fixed_offset(),
        }
    }

    fn from_local(&self, naive: &NaiveDateTime) -> Option<DateTime<FixedOffset>> {
        match self {
            Zone::Local => Local
                .from_local_datetime(naive)
                .earliest()
                .map(|dt| dt.fixed_offset()),
            Zone::Utc => Some(Utc.from_utc_datetime(naive).fixed_offset()),
            Zone::Named(tz) => tz
                .from_local_datetime(naive)
                .earliest()
                .map(|dt| dt.fixed_offset()),
        }
    }
}

/// Parse a timestamp according to the field's options
pub fn parse_time(val: &str, opts: &TimeOptions) -> Result<DateTime<FixedOffset>> {
    let format = opts.format.to_ascii_lowercase();

    if format == "unix" || format == "unixnano" {
        let raw: i64 = val.parse().map_err(|e| invalid_time(val, e))?;
        let (secs, nanos) = if format == "unixnano" {
            (
                raw.div_euclid(NANOS_PER_SECOND),
                raw.rem_euclid(NANOS_PER_SECOND),
            )
        } else {
            (raw, 0)
        };
        let instant = DateTime::from_timestamp(secs, nanos as u32)
            .ok_or_else(|| invalid_time(val, "out of range"))?;
        return Ok(Zone::resolve(opts)?.from_utc(instant));
    }

    if val.is_empty() {
        return Ok(DateTime::<FixedOffset>::default());
    }

    let zone = Zone::resolve(opts)?;

    match format.as_str() {
        "" | "rfc3339" => {
            DateTime::parse_from_rfc3339(val).map_err(|e| invalid_time(val, e))
        }
        "rfc2822" => DateTime::parse_from_rfc2822(val).map_err(|e| invalid_time(val, e)),
        _ => parse_layout(val, &opts.format, &zone),
    }
}

fn parse_layout(val: &str, layout: &str, zone: &Zone) -> Result<DateTime<FixedOffset>> {
    let offset_err = match DateTime::parse_from_str(val, layout) {
        Ok(dt) => return Ok(dt),
        Err(e) => e,
    };
    if offset_err.kind() != ParseErrorKind::NotEnough {
        return Err(invalid_time(val, offset_err));
    }

    // no offset in the layout: interpret in the resolved zone
    let naive = match NaiveDateTime::parse_from_str(val, layout) {
        Ok(naive) => naive,
        Err(e) if e.kind() == ParseErrorKind::NotEnough => NaiveDate::parse_from_str(val, layout)
            .map_err(|e| invalid_time(val, e))?
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| invalid_time(val, "invalid midnight"))?,
        Err(e) => return Err(invalid_time(val, e)),
    };

    zone.from_local(&naive)
        .ok_or_else(|| invalid_time(val, "local time does not exist in the zone"))
}

fn invalid_time(val: &str, reason: impl std::fmt::Display) -> BindError {
    BindError::InvalidTime {
        value: val.to_string(),
        reason: reason.to_string(),
    }
}

static DURATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[-+]?(?:(?:\d+\.?\d*|\.\d+)(?:ns|us|µs|μs|ms|s|m|h))+$")
        .expect("duration grammar regex")
});

static SEGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d*)(?:\.(\d*))?(ns|us|µs|μs|ms|s|m|h)").expect("duration segment regex")
});

fn unit_nanos(unit: &str) -> i128 {
    match unit {
        "ns" => 1,
        "us" | "µs" | "μs" => 1_000,
        "ms" => 1_000_000,
        "s" => 1_000_000_000,
        "m" => 60_000_000_000,
        _ => 3_600_000_000_000,
    }
}

/// Parse a duration literal such as `1h30m`, `-1.5h` or `300ms`
pub fn parse_duration(val: &str) -> Result<TimeDelta> {
    let unsigned = val.trim_start_matches(['-', '+']);
    let negative = val.starts_with('-');

    if unsigned == "0" && val.len() - unsigned.len() <= 1 {
        return Ok(TimeDelta::zero());
    }
    if !DURATION.is_match(val) {
        return Err(invalid_duration(val, "expected a number followed by a unit (ns, us, ms, s, m, h)"));
    }

    let mut total: i128 = 0;
    for caps in SEGMENT.captures_iter(unsigned) {
        let unit = unit_nanos(&caps[3]);
        let whole: i128 = match &caps[1] {
            "" => 0,
            digits => digits
                .parse()
                .map_err(|_| invalid_duration(val, "number out of range"))?,
        };
        let mut nanos = whole
            .checked_mul(unit)
            .ok_or_else(|| invalid_duration(val, "overflow"))?;

        if let Some(frac) = caps.get(2).map(|m| m.as_str()).filter(|f| !f.is_empty()) {
            // digits past nanosecond precision cannot change the result
            let frac = &frac[..frac.len().min(18)];
            let digits: i128 = frac.parse().map_err(|_| invalid_duration(val, "bad fraction"))?;
            nanos += digits * unit / 10i128.pow(frac.len() as u32);
        }

        total = total
            .checked_add(nanos)
            .filter(|t| *t <= i64::MAX as i128 + 1)
            .ok_or_else(|| invalid_duration(val, "overflow"))?;
    }

    if negative {
        total = -total;
    }
    let nanos = i64::try_from(total).map_err(|_| invalid_duration(val, "overflow"))?;
    Ok(TimeDelta::nanoseconds(nanos))
}

fn invalid_duration(val: &str, reason: impl std::fmt::Display) -> BindError {
    BindError::InvalidDuration {
        value: val.to_string(),
        reason: reason.to_string(),
    }
}

/// Render a duration in the literal grammar (`1h30m0s`, `1.5ms`, `0s`)
pub fn format_duration(delta: TimeDelta) -> String {
    let Some(nanos) = delta.num_nanoseconds() else {
        return format!("{}s", delta.num_seconds());
    };
    if nanos == 0 {
        return "0s".to_string();
    }

    let mut rest = nanos.unsigned_abs();
    let mut out = String::new();
    if nanos < 0 {
        out.push('-');
    }

    if rest < NANOS_PER_SECOND as u64 {
        let (unit, suffix) = match rest {
            0..=999 => (1, "ns"),
            1_000..=999_999 => (1_000, "µs"),
            _ => (1_000_000, "ms"),
        };
        out.push_str(&fraction(rest, unit));
        out.push_str(suffix);
        return out;
    }

    let hours = rest / 3_600_000_000_000;
    rest %= 3_600_000_000_000;
    let minutes = rest / 60_000_000_000;
    rest %= 60_000_000_000;

    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if hours > 0 || minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    out.push_str(&fraction(rest, NANOS_PER_SECOND as u64));
    out.push('s');
    out
}

fn fraction(value: u64, unit: u64) -> String {
    let whole = value / unit;
    let frac = value % unit;
    if frac == 0 {
        return whole.to_string();
    }
    let width = unit.to_string().len() - 1;
    let digits = format!("{frac:0width$}");
    format!("{whole}.{}", digits.trim_end_matches('0'))
}
