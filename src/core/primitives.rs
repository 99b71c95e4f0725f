use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::error::{DatasetError, DatasetResult};

pub fn decimal_to_f64(value: Decimal, field_name: &str) -> DatasetResult<f64> {
    value.to_f64().ok_or_else(|| {
        DatasetError::InvalidArgument(format!("{field_name} cannot be represented as f64"))
    })
}

#[must_use]
pub fn datetime_to_unix_seconds(time: DateTime<Utc>) -> f64 {
    time.timestamp_millis() as f64 / 1000.0
}

/// Returns `true` when `a` and `b` address the same x slot.
///
/// Matching is exact; `NaN` matches `NaN` and `-0.0` matches `0.0`.
#[must_use]
pub fn same_x(a: f64, b: f64) -> bool {
    ordered_float::OrderedFloat(a) == ordered_float::OrderedFloat(b)
}
