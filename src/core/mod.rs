pub mod aligned_table;
pub mod dataset;
pub mod interval;
pub mod json_contract;
pub mod primitives;
pub mod series;
pub mod types;

pub use aligned_table::{AlignedTable, SeriesEditor, SharedAlignedTable, TableConfig};
pub use dataset::{IntervalXyDataset, SeriesKey, TableXyDataset, XyDataset};
pub use interval::{
    DEFAULT_INTERVAL_WIDTH, DEFAULT_POSITION_FACTOR, DomainBounds, IntervalDelegate,
    IntervalWidth, XInterval,
};
pub use json_contract::{TABLE_SNAPSHOT_JSON_SCHEMA_V1, TableSnapshotJsonContractV1};
pub use series::XySeries;
pub use types::XyDataItem;
