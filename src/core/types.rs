use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::primitives::{datetime_to_unix_seconds, decimal_to_f64};
use crate::error::{DatasetError, DatasetResult};

/// One `(x, y)` entry of a series. An absent `y` is a gap placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct XyDataItem {
    pub x: f64,
    #[serde(default)]
    pub y: Option<f64>,
}

impl XyDataItem {
    #[must_use]
    pub fn new(x: f64, y: impl Into<Option<f64>>) -> Self {
        Self { x, y: y.into() }
    }

    #[must_use]
    pub fn placeholder(x: f64) -> Self {
        Self { x, y: None }
    }

    #[must_use]
    pub fn has_value(self) -> bool {
        self.y.is_some()
    }

    /// Builds an item whose x is the unix time in seconds.
    pub fn from_decimal_time(time: DateTime<Utc>, value: Option<Decimal>) -> DatasetResult<Self> {
        let y = match value {
            Some(value) => Some(decimal_to_f64(value, "value")?),
            None => None,
        };
        Ok(Self {
            x: datetime_to_unix_seconds(time),
            y,
        })
    }

    /// `true` when x is finite and y is either absent or finite.
    #[must_use]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_none_or(f64::is_finite)
    }

    pub(crate) fn ensure_finite(self) -> DatasetResult<Self> {
        if !self.x.is_finite() {
            return Err(DatasetError::InvalidArgument(format!(
                "x must be finite, got {}",
                self.x
            )));
        }
        if let Some(y) = self.y.filter(|y| !y.is_finite()) {
            return Err(DatasetError::InvalidArgument(format!(
                "y at x = {} must be finite, got {y}",
                self.x
            )));
        }
        Ok(self)
    }

    pub(crate) fn x_key(self) -> OrderedFloat<f64> {
        OrderedFloat(self.x)
    }
}
