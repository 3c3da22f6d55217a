//! Correlation keys tie an export request to its artifact, its publish job
//! and its sidecar status file.
//!
//! Textual form: `{created_ticks},{subject_id},{correlation_uuid},{format}`
//! where ticks count 100ns intervals since 0001-01-01T00:00:00Z.

use super::ExportFormat;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

const TICKS_PER_SECOND: i64 = 10_000_000;
const NANOS_PER_TICK: i64 = 100;
const TICKS_AT_UNIX_EPOCH: i64 = 621_355_968_000_000_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyParseError {
    #[error("expected 4 comma separated fields, got {0}")]
    FieldCount(usize),

    #[error("invalid ticks: {0}")]
    Ticks(String),

    #[error("invalid subject id: {0}")]
    SubjectId(String),

    #[error("invalid correlation id: {0}")]
    CorrelationId(String),

    #[error("invalid format: {0}")]
    Format(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationKey {
    pub subject_id: i64,
    pub correlation_id: Uuid,
    pub created: DateTime<Utc>,
    pub format: ExportFormat,
}

impl CorrelationKey {
    pub fn new(subject_id: i64, format: ExportFormat) -> Self {
        Self::created_at(subject_id, format, Utc::now())
    }

    /// Build a key with `created` truncated to tick precision.
    pub fn created_at(subject_id: i64, format: ExportFormat, created: DateTime<Utc>) -> Self {
        let created = ticks_to_datetime(datetime_to_ticks(&created)).unwrap_or(created);
        Self {
            subject_id,
            correlation_id: Uuid::new_v4(),
            created,
            format,
        }
    }

    pub fn created_ticks(&self) -> i64 {
        datetime_to_ticks(&self.created)
    }
}

fn datetime_to_ticks(datetime: &DateTime<Utc>) -> i64 {
    TICKS_AT_UNIX_EPOCH
        + datetime.timestamp() * TICKS_PER_SECOND
        + i64::from(datetime.timestamp_subsec_nanos()) / NANOS_PER_TICK
}

fn ticks_to_datetime(ticks: i64) -> Option<DateTime<Utc>> {
    let since_epoch = ticks.checked_sub(TICKS_AT_UNIX_EPOCH)?;
    let seconds = since_epoch.div_euclid(TICKS_PER_SECOND);
    let nanos = since_epoch.rem_euclid(TICKS_PER_SECOND) * NANOS_PER_TICK;
    DateTime::from_timestamp(seconds, nanos as u32)
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.created_ticks(),
            self.subject_id,
            self.correlation_id.hyphenated(),
            self.format
        )
    }
}

impl FromStr for CorrelationKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.trim().split(',').collect();
        let [ticks, subject_id, correlation_id, format] = fields.as_slice() else {
            return Err(KeyParseError::FieldCount(fields.len()));
        };

        let created = ticks
            .parse::<i64>()
            .ok()
            .filter(|ticks| *ticks >= 0)
            .and_then(ticks_to_datetime)
            .ok_or_else(|| KeyParseError::Ticks(ticks.to_string()))?;
        let subject_id = subject_id
            .parse::<i64>()
            .ok()
            .filter(|id| *id > 0)
            .ok_or_else(|| KeyParseError::SubjectId(subject_id.to_string()))?;
        let correlation_id = Uuid::parse_str(correlation_id)
            .map_err(|_| KeyParseError::CorrelationId(correlation_id.to_string()))?;
        let format = format.parse::<ExportFormat>().map_err(KeyParseError::Format)?;

        Ok(Self {
            subject_id,
            correlation_id,
            created,
            format,
        })
    }
}

/// A key as received from a caller: absent and `"null"` are a valid empty
/// key, anything else must parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKey {
    Empty,
    Present(CorrelationKey),
}

impl ExportKey {
    pub fn parse(input: Option<&str>) -> Result<Self, KeyParseError> {
        match input.map(str::trim) {
            None | Some("") => Ok(ExportKey::Empty),
            Some(s) if s.eq_ignore_ascii_case("null") => Ok(ExportKey::Empty),
            Some(s) => s.parse().map(ExportKey::Present),
        }
    }

    pub fn as_key(&self) -> Option<&CorrelationKey> {
        match self {
            ExportKey::Empty => None,
            ExportKey::Present(key) => Some(key),
        }
    }
}
