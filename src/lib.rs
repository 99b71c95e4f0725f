//! xy-table: aligned multi-series XY datasets.
//!
//! An [`AlignedTable`] holds several keyed [`XySeries`] and keeps them on one
//! shared, ordered set of x-values, so stacked and area renderers can sum
//! column by column. Intervals for bar-style consumers come from an
//! [`IntervalDelegate`]. Change listeners see exactly one notification per
//! externally invoked mutation.

pub mod core;
pub mod error;
pub mod events;
pub mod telemetry;

pub use crate::core::{
    AlignedTable, IntervalDelegate, IntervalWidth, TableConfig, XyDataItem, XySeries,
};
pub use error::{DatasetError, DatasetResult};
pub use events::{ChangeListener, ChangeSource, ListenerId};
