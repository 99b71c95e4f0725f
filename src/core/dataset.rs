//! Read-side dataset interfaces consumed by renderers.

use std::fmt::Debug;
use std::hash::Hash;

use crate::error::DatasetResult;

/// Bounds required of a series key inside a table.
pub trait SeriesKey: Clone + Eq + Hash + Debug {}

impl<T: Clone + Eq + Hash + Debug> SeriesKey for T {}

/// Positional read access to a multi-series XY dataset.
pub trait XyDataset {
    type Key;

    fn series_count(&self) -> usize;
    fn series_key(&self, series: usize) -> DatasetResult<&Self::Key>;
    fn item_count(&self, series: usize) -> DatasetResult<usize>;
    fn x(&self, series: usize, item: usize) -> DatasetResult<f64>;
    fn y(&self, series: usize, item: usize) -> DatasetResult<Option<f64>>;
}

/// Dataset whose items carry an x/y span, e.g. for bar rendering.
pub trait IntervalXyDataset: XyDataset {
    fn start_x(&self, series: usize, item: usize) -> DatasetResult<f64>;
    fn end_x(&self, series: usize, item: usize) -> DatasetResult<f64>;
    fn start_y(&self, series: usize, item: usize) -> DatasetResult<Option<f64>>;
    fn end_y(&self, series: usize, item: usize) -> DatasetResult<Option<f64>>;
}

/// Dataset whose series all share the same ordered x-values, so item `i`
/// addresses the same column in every series.
pub trait TableXyDataset: XyDataset {
    fn column_count(&self) -> usize;
}
