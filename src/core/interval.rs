use serde::{Deserialize, Serialize};

use crate::core::XySeries;
use crate::error::{DatasetError, DatasetResult};

pub const DEFAULT_INTERVAL_WIDTH: f64 = 1.0;
pub const DEFAULT_POSITION_FACTOR: f64 = 0.5;

/// How the width of each x-interval is derived.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum IntervalWidth {
    /// Every item gets the same positive width.
    Fixed(f64),
    /// Width is the smaller gap to the neighbouring distinct x-values.
    /// Endpoints use their single gap; a lone x gets width `0`.
    AutoFromNeighbors,
}

impl Default for IntervalWidth {
    fn default() -> Self {
        Self::Fixed(DEFAULT_INTERVAL_WIDTH)
    }
}

/// Start/end span computed around one x-value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct XInterval {
    pub start: f64,
    pub end: f64,
}

impl XInterval {
    #[must_use]
    pub fn width(self) -> f64 {
        self.end - self.start
    }
}

/// Inclusive x-range covered by a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DomainBounds {
    pub lower: f64,
    pub upper: f64,
}

/// Derives an `[start, end]` span for each x of a series.
///
/// `start = x - width * position_factor` and
/// `end = x + width * (1 - position_factor)`. Results are computed on demand
/// from the series' current x-values, so nothing has to be invalidated when
/// the series changes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntervalDelegate {
    width: IntervalWidth,
    position_factor: f64,
}

impl Default for IntervalDelegate {
    fn default() -> Self {
        Self {
            width: IntervalWidth::default(),
            position_factor: DEFAULT_POSITION_FACTOR,
        }
    }
}

impl IntervalDelegate {
    pub fn new(width: IntervalWidth, position_factor: f64) -> DatasetResult<Self> {
        Ok(Self {
            width: validate_width(width)?,
            position_factor: validate_position_factor(position_factor)?,
        })
    }

    #[must_use]
    pub fn width(self) -> IntervalWidth {
        self.width
    }

    /// The configured width when in fixed mode.
    #[must_use]
    pub fn fixed_width(self) -> Option<f64> {
        match self.width {
            IntervalWidth::Fixed(width) => Some(width),
            IntervalWidth::AutoFromNeighbors => None,
        }
    }

    #[must_use]
    pub fn is_auto_width(self) -> bool {
        matches!(self.width, IntervalWidth::AutoFromNeighbors)
    }

    #[must_use]
    pub fn position_factor(self) -> f64 {
        self.position_factor
    }

    pub fn set_width(&mut self, width: IntervalWidth) -> DatasetResult<()> {
        self.width = validate_width(width)?;
        Ok(())
    }

    /// Switches to fixed mode with `width` (must be finite and > 0).
    pub fn set_fixed_width(&mut self, width: f64) -> DatasetResult<()> {
        self.set_width(IntervalWidth::Fixed(width))
    }

    /// Toggles auto mode. Leaving auto mode restores the default fixed width.
    pub fn set_auto_width(&mut self, auto: bool) {
        self.width = match (auto, self.width) {
            (true, _) => IntervalWidth::AutoFromNeighbors,
            (false, IntervalWidth::AutoFromNeighbors) => IntervalWidth::default(),
            (false, fixed) => fixed,
        };
    }

    pub fn set_position_factor(&mut self, position_factor: f64) -> DatasetResult<()> {
        self.position_factor = validate_position_factor(position_factor)?;
        Ok(())
    }

    pub fn width_at<K>(self, series: &XySeries<K>, item: usize) -> DatasetResult<f64> {
        match self.width {
            IntervalWidth::Fixed(width) => {
                series.x(item)?;
                Ok(width)
            }
            IntervalWidth::AutoFromNeighbors => neighbor_width(series, item),
        }
    }

    pub fn interval<K>(self, series: &XySeries<K>, item: usize) -> DatasetResult<XInterval> {
        let x = series.x(item)?;
        let width = self.width_at(series, item)?;
        Ok(XInterval {
            start: x - width * self.position_factor,
            end: x + width * (1.0 - self.position_factor),
        })
    }

    pub fn start_x<K>(self, series: &XySeries<K>, item: usize) -> DatasetResult<f64> {
        self.interval(series, item).map(|interval| interval.start)
    }

    pub fn end_x<K>(self, series: &XySeries<K>, item: usize) -> DatasetResult<f64> {
        self.interval(series, item).map(|interval| interval.end)
    }

    /// Smallest and largest x across `series`, optionally widened by the
    /// item intervals. `NaN` x-values are ignored; `None` when nothing is left.
    #[must_use]
    pub fn domain_bounds<'a, K: 'a>(
        self,
        series: impl IntoIterator<Item = &'a XySeries<K>>,
        include_interval: bool,
    ) -> Option<DomainBounds> {
        let mut bounds: Option<DomainBounds> = None;
        for s in series {
            for (index, item) in s.items().iter().enumerate() {
                if item.x.is_nan() {
                    continue;
                }
                let (lower, upper) = if include_interval {
                    match self.interval(s, index) {
                        Ok(interval) => (interval.start, interval.end),
                        Err(_) => continue,
                    }
                } else {
                    (item.x, item.x)
                };
                bounds = Some(match bounds {
                    Some(current) => DomainBounds {
                        lower: current.lower.min(lower),
                        upper: current.upper.max(upper),
                    },
                    None => DomainBounds { lower, upper },
                });
            }
        }
        bounds
    }
}

fn validate_width(width: IntervalWidth) -> DatasetResult<IntervalWidth> {
    if let IntervalWidth::Fixed(value) = width {
        if !value.is_finite() || value <= 0.0 {
            return Err(DatasetError::InvalidArgument(
                "interval width must be finite and > 0".to_owned(),
            ));
        }
    }
    Ok(width)
}

fn validate_position_factor(position_factor: f64) -> DatasetResult<f64> {
    if !(0.0..=1.0).contains(&position_factor) {
        return Err(DatasetError::InvalidArgument(
            "interval position factor must be within [0, 1]".to_owned(),
        ));
    }
    Ok(position_factor)
}

fn neighbor_width<K>(series: &XySeries<K>, item: usize) -> DatasetResult<f64> {
    let x = series.x(item)?;
    let items = series.items();
    let (previous, next) = if series.auto_sort() {
        (
            items[..item].iter().rev().map(|i| i.x).find(|&v| v < x),
            items[item + 1..].iter().map(|i| i.x).find(|&v| v > x),
        )
    } else {
        let previous = items
            .iter()
            .map(|i| i.x)
            .filter(|&v| v < x)
            .reduce(f64::max);
        let next = items
            .iter()
            .map(|i| i.x)
            .filter(|&v| v > x)
            .reduce(f64::min);
        (previous, next)
    };

    Ok(match (previous, next) {
        (Some(previous), Some(next)) => (x - previous).min(next - x),
        (Some(previous), None) => x - previous,
        (None, Some(next)) => next - x,
        (None, None) => 0.0,
    })
}
