//! Point-in-time measurements

use std::fmt;

use super::id::Id;

/// Reserved tag key carrying the data type of a measurement.
pub const TYPE_TAG: &str = "type";

/// Tag key naming which statistic of a meter a measurement holds.
pub const STATISTIC_TAG: &str = "statistic";

/// Well-known values of the `type` tag.
///
/// The tag itself is free-form: any value set on an identifier is passed
/// through to the payload untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Gauge,
    Counter,
}

impl DataType {
    pub fn value(&self) -> &'static str {
        match self {
            DataType::Gauge => "gauge",
            DataType::Counter => "counter",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value())
    }
}

/// Values of the `statistic` tag emitted by the built-in meters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Statistic {
    Count,
    TotalTime,
    TotalAmount,
}

impl Statistic {
    pub fn value(&self) -> &'static str {
        match self {
            Statistic::Count => "count",
            Statistic::TotalTime => "totalTime",
            Statistic::TotalAmount => "totalAmount",
        }
    }
}

/// Immutable snapshot of a meter value.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    id: Id,
    timestamp: i64,
    value: f64,
}

impl Measurement {
    /// Create a measurement; `timestamp` is in epoch milliseconds.
    pub fn new(id: Id, timestamp: i64, value: f64) -> Self {
        Self {
            id,
            timestamp,
            value,
        }
    }

    pub fn id(&self) -> &Id {
        &self.id
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// NaN and infinities cannot be exported.
    pub fn is_finite(&self) -> bool {
        self.value.is_finite()
    }

    /// Value of the `type` tag, `gauge` when the identifier has none.
    pub fn data_type(&self) -> &str {
        self.id.tag(TYPE_TAG).unwrap_or(DataType::Gauge.value())
    }
}

/// Finite, single-pass sequence of measurements returned by `Meter::measure`.
pub type Measurements = std::vec::IntoIter<Measurement>;
