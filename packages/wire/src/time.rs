//! The two wire time renderings.
//!
//! `_tmf` = 0 stores instants as signed decimal seconds since the epoch;
//! `_tmf` = 1 stores them as `YYYY-MM-DDThh:mm:ssZ`, UTC only, exactly 20
//! bytes. The ISO form sorts lexicographically in instant order, which the
//! query matcher relies on for its string comparison path.

use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;

/// Integer seconds per UTC day; day buckets are `end / 86400`.
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Byte length of the ISO-8601 rendering, without terminator.
const ISO8601_LEN: usize = 20;
const ISO8601_FMT: &str = "%Y-%m-%dT%H:%M:%SZ";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeError {
    #[error("invalid iso8601 date/time")]
    InvalidIso8601,
    #[error("invalid epoch seconds")]
    InvalidEpoch,
}

/// Deployment-wide time rendering, stored in slot 1 of every hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeFormat {
    #[default]
    Epoch,
    Iso8601,
}

impl TimeFormat {
    /// Interpret a stored `_tmf` value; anything other than 1 is the
    /// epoch rendering.
    pub fn from_flag(flag: i64) -> TimeFormat {
        if flag == 1 {
            TimeFormat::Iso8601
        } else {
            TimeFormat::Epoch
        }
    }

    /// The `_tmf` value written to the wire.
    pub const fn flag(self) -> u8 {
        match self {
            TimeFormat::Epoch => 0,
            TimeFormat::Iso8601 => 1,
        }
    }
}

/// Render an instant in the given format. Instants before the epoch are
/// clamped to zero; the ISO form cannot express them and the encoder never
/// stores them.
pub fn format_time(tmf: TimeFormat, t: i64) -> String {
    match tmf {
        TimeFormat::Epoch => t.to_string(),
        TimeFormat::Iso8601 => {
            let t = t.max(0);
            let dt: DateTime<Utc> = DateTime::from_timestamp(t, 0)
                .unwrap_or_else(|| DateTime::from_timestamp(0, 0).unwrap());
            dt.format(ISO8601_FMT).to_string()
        }
    }
}

/// Parse a wire time literal back to seconds since the epoch.
pub fn parse_time(tmf: TimeFormat, literal: &str) -> Result<i64, TimeError> {
    match tmf {
        TimeFormat::Epoch => literal.parse::<i64>().map_err(|_| TimeError::InvalidEpoch),
        TimeFormat::Iso8601 => {
            if literal.len() != ISO8601_LEN {
                return Err(TimeError::InvalidIso8601);
            }
            NaiveDateTime::parse_from_str(literal, ISO8601_FMT)
                .map(|naive| naive.and_utc().timestamp())
                .map_err(|_| TimeError::InvalidIso8601)
        }
    }
}

/// Day bucket of an end time: floor division by [`SECONDS_PER_DAY`].
pub fn day_bucket(end_time: i64) -> i64 {
    end_time.div_euclid(SECONDS_PER_DAY)
}
