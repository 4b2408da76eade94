use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::TwinId;
use crate::error::CoreError;

/// A telemetry reading. Booleans stay booleans so conditions can use them directly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleValue {
    Bool(bool),
    Number(f64),
}

impl SampleValue {
    /// Numeric view; `true` reads as 1.0.
    pub fn as_f64(&self) -> f64 {
        match self {
            SampleValue::Number(v) => *v,
            SampleValue::Bool(true) => 1.0,
            SampleValue::Bool(false) => 0.0,
        }
    }
}

impl From<f64> for SampleValue {
    fn from(v: f64) -> Self {
        SampleValue::Number(v)
    }
}

impl From<bool> for SampleValue {
    fn from(v: bool) -> Self {
        SampleValue::Bool(v)
    }
}

/// A single `(point, timestamp, value)` observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedSample {
    pub point_id: TwinId,
    pub timestamp: DateTime<Utc>,
    pub value: SampleValue,
}

impl TimedSample {
    pub fn new(point_id: impl Into<TwinId>, timestamp: DateTime<Utc>, value: impl Into<SampleValue>) -> Self {
        Self {
            point_id: point_id.into(),
            timestamp,
            value: value.into(),
        }
    }
}

/// Inclusive evaluation window `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, CoreError> {
        if start > end {
            return Err(CoreError::InvalidRange {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t <= self.end
    }
}
