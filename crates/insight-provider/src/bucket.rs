//! Time bucketing for data-point series.
//!
//! Buckets are UTC calendar days or UTC calendar months, identified by the
//! unix timestamp of their first second. A series is filled so that every
//! bucket between the rounded-down bounds of a query carries a value.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use insight_core::id::utc_from_unix;
use insight_core::{Error, Result};

const DAY_SECS: i64 = 24 * 60 * 60;

/// Bucket width of a data-point series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Resolution {
    /// One bucket per UTC day.
    Daily,
    /// One bucket per UTC calendar month.
    Monthly,
}

impl Resolution {
    /// Returns the wire name of this resolution.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "DAILY",
            Self::Monthly => "MONTHLY",
        }
    }

    /// Truncates `ts` to the start of its bucket.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if `ts` is outside the representable range.
    pub fn round_down(&self, ts: i64) -> Result<i64> {
        match self {
            Self::Daily => {
                utc_from_unix(ts)?;
                Ok(ts - ts.rem_euclid(DAY_SECS))
            }
            Self::Monthly => {
                let dt = utc_from_unix(ts)?;
                month_start(dt.year(), dt.month())
            }
        }
    }

    /// Returns the start of the bucket following the one starting at `bucket`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if the next bucket is not representable.
    pub fn next(&self, bucket: i64) -> Result<i64> {
        match self {
            Self::Daily => Ok(bucket + DAY_SECS),
            Self::Monthly => {
                let dt = utc_from_unix(bucket)?;
                if dt.month() == 12 {
                    month_start(dt.year() + 1, 1)
                } else {
                    month_start(dt.year(), dt.month() + 1)
                }
            }
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "DAILY" => Ok(Self::Daily),
            "MONTHLY" => Ok(Self::Monthly),
            other => Err(Error::InvalidInput(format!("unknown resolution: {other}"))),
        }
    }
}

fn month_start(year: i32, month: u32) -> Result<i64> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive).timestamp())
        .ok_or_else(|| Error::InvalidInput(format!("month {year}-{month:02} is out of range")))
}

/// One point of a series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Start of the bucket (unix seconds).
    pub timestamp: i64,
    /// Bucket value.
    pub value: f64,
}

/// Expands sparse `points` into one point per bucket in
/// `[round_down(from), round_down(to)]`, filling missing buckets with `0`.
///
/// Points outside the range are dropped. The result is strictly increasing
/// by timestamp.
///
/// # Errors
///
/// Returns `Error::InvalidInput` if a bound is not representable.
pub fn fill_up(
    points: &[DataPoint],
    from: i64,
    to: i64,
    resolution: Resolution,
) -> Result<Vec<DataPoint>> {
    let by_bucket: BTreeMap<i64, f64> = points.iter().map(|p| (p.timestamp, p.value)).collect();
    let first = resolution.round_down(from)?;
    let last = resolution.round_down(to)?;

    let mut filled = Vec::new();
    let mut bucket = first;
    while bucket <= last {
        filled.push(DataPoint {
            timestamp: bucket,
            value: by_bucket.get(&bucket).copied().unwrap_or(0.0),
        });
        bucket = resolution.next(bucket)?;
    }
    Ok(filled)
}
