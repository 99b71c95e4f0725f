use serde::{Deserialize, Serialize};

use crate::core::AlignedTable;
use crate::core::dataset::SeriesKey;
use crate::error::{DatasetError, DatasetResult};

pub const TABLE_SNAPSHOT_JSON_SCHEMA_V1: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "K: Serialize",
    deserialize = "K: SeriesKey + Deserialize<'de>"
))]
pub struct TableSnapshotJsonContractV1<K> {
    pub schema_version: u32,
    pub table: AlignedTable<K>,
}

impl<K> AlignedTable<K>
where
    K: SeriesKey + Serialize,
{
    pub fn to_json_pretty(&self) -> DatasetResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            DatasetError::Serialization(format!("failed to serialize table json: {e}"))
        })
    }

    pub fn to_json_contract_v1_pretty(&self) -> DatasetResult<String> {
        let payload = TableSnapshotJsonContractV1 {
            schema_version: TABLE_SNAPSHOT_JSON_SCHEMA_V1,
            table: self.clone(),
        };
        serde_json::to_string_pretty(&payload).map_err(|e| {
            DatasetError::Serialization(format!("failed to serialize table contract v1: {e}"))
        })
    }
}

impl<K> AlignedTable<K>
where
    K: SeriesKey + for<'de> Deserialize<'de>,
{
    /// Parses either a bare table or a versioned contract payload.
    pub fn from_json_compat_str(input: &str) -> DatasetResult<Self> {
        let value: serde_json::Value = serde_json::from_str(input).map_err(|e| {
            DatasetError::Serialization(format!("failed to parse table json payload: {e}"))
        })?;

        let Some(version) = value.get("schema_version") else {
            return serde_json::from_value(value).map_err(|e| {
                DatasetError::Serialization(format!("failed to decode table json: {e}"))
            });
        };

        if version.as_u64() != Some(u64::from(TABLE_SNAPSHOT_JSON_SCHEMA_V1)) {
            return Err(DatasetError::Serialization(format!(
                "unsupported table schema version: {version}"
            )));
        }
        let payload: TableSnapshotJsonContractV1<K> =
            serde_json::from_value(value).map_err(|e| {
                DatasetError::Serialization(format!("failed to decode table contract v1: {e}"))
            })?;
        Ok(payload.table)
    }
}
