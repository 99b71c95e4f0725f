use std::fmt;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::trace;

use crate::core::XyDataItem;
use crate::core::primitives::same_x;
use crate::error::{DatasetError, DatasetResult};
use crate::events::{ChangeListener, ChangeNotifier, ChangeSource, ListenerId};

/// Ordered, keyed sequence of `(x, y)` items.
///
/// Policy flags:
/// - `auto_sort`: items are kept ascending by x; otherwise insertion order.
/// - `allow_duplicate_x`: when `false`, adding an item at an existing x
///   replaces that item's y instead of inserting a second item.
///
/// Every structural mutation broadcasts exactly one change notification to
/// the series' listeners.
#[derive(Clone)]
pub struct XySeries<K> {
    key: K,
    items: Vec<XyDataItem>,
    auto_sort: bool,
    allow_duplicate_x: bool,
    revision: u64,
    notifier: ChangeNotifier<XySeries<K>>,
}

impl<K> XySeries<K> {
    /// Creates a sorted series that does not allow duplicate x-values.
    #[must_use]
    pub fn new(key: K) -> Self {
        Self::with_policy(key, true, false)
    }

    #[must_use]
    pub fn with_policy(key: K, auto_sort: bool, allow_duplicate_x: bool) -> Self {
        Self {
            key,
            items: Vec::new(),
            auto_sort,
            allow_duplicate_x,
            revision: 0,
            notifier: ChangeNotifier::new(),
        }
    }

    /// Builds a series from `(x, y)` pairs, applying the regular add policy.
    #[must_use]
    pub fn from_pairs<Y>(key: K, pairs: impl IntoIterator<Item = (f64, Y)>) -> Self
    where
        Y: Into<Option<f64>>,
    {
        let mut series = Self::new(key);
        for (x, y) in pairs {
            series.insert_or_replace(XyDataItem::new(x, y));
        }
        series
    }

    #[must_use]
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Renames the series and notifies listeners.
    pub fn set_key(&mut self, key: K) {
        self.key = key;
        self.changed();
    }

    #[must_use]
    pub fn auto_sort(&self) -> bool {
        self.auto_sort
    }

    #[must_use]
    pub fn allow_duplicate_x(&self) -> bool {
        self.allow_duplicate_x
    }

    #[must_use]
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn items(&self) -> &[XyDataItem] {
        &self.items
    }

    pub fn x_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.items.iter().map(|item| item.x)
    }

    pub fn get(&self, index: usize) -> DatasetResult<XyDataItem> {
        DatasetError::check_index("item", index, self.items.len())?;
        Ok(self.items[index])
    }

    pub fn x(&self, index: usize) -> DatasetResult<f64> {
        self.get(index).map(|item| item.x)
    }

    pub fn y(&self, index: usize) -> DatasetResult<Option<f64>> {
        self.get(index).map(|item| item.y)
    }

    /// Index of the first item at `x`.
    ///
    /// Sorted series use a binary search, unsorted series a linear scan.
    #[must_use]
    pub fn index_of_x(&self, x: f64) -> Option<usize> {
        if self.auto_sort {
            let key = OrderedFloat(x);
            let index = self.items.partition_point(|item| item.x_key() < key);
            (index < self.items.len() && self.items[index].x_key() == key).then_some(index)
        } else {
            self.items.iter().position(|item| same_x(item.x, x))
        }
    }

    #[must_use]
    pub fn contains_x(&self, x: f64) -> bool {
        self.index_of_x(x).is_some()
    }

    /// Y-value at `x`, `None` when the slot is absent or a placeholder.
    #[must_use]
    pub fn y_at(&self, x: f64) -> Option<f64> {
        self.index_of_x(x).and_then(|index| self.items[index].y)
    }

    /// Adds an item.
    ///
    /// When duplicates are not allowed and `x` is already present, the
    /// existing item's y is replaced, so the series holds one item per x.
    pub fn add(&mut self, x: f64, y: impl Into<Option<f64>>) {
        self.add_item(XyDataItem::new(x, y));
    }

    pub fn add_item(&mut self, item: XyDataItem) {
        self.insert_or_replace(item);
        self.changed();
    }

    /// Adds an item or replaces the y at an existing x.
    ///
    /// Returns the replaced item. Series that allow duplicate x-values always
    /// insert and return `None`.
    pub fn add_or_update(&mut self, x: f64, y: impl Into<Option<f64>>) -> Option<XyDataItem> {
        let previous = self.insert_or_replace(XyDataItem::new(x, y));
        self.changed();
        previous
    }

    /// Replaces the y-value of the item at `x`.
    pub fn update(&mut self, x: f64, y: impl Into<Option<f64>>) -> DatasetResult<()> {
        let index = self
            .index_of_x(x)
            .ok_or_else(|| DatasetError::NotFound(format!("no item with x = {x}")))?;
        self.items[index].y = y.into();
        self.changed();
        Ok(())
    }

    pub fn update_by_index(
        &mut self,
        index: usize,
        y: impl Into<Option<f64>>,
    ) -> DatasetResult<()> {
        DatasetError::check_index("item", index, self.items.len())?;
        self.items[index].y = y.into();
        self.changed();
        Ok(())
    }

    /// Removes the first item at `x`.
    pub fn remove(&mut self, x: f64) -> DatasetResult<XyDataItem> {
        self.take_x(x)
            .ok_or_else(|| DatasetError::NotFound(format!("no item with x = {x}")))
    }

    pub(crate) fn take_x(&mut self, x: f64) -> Option<XyDataItem> {
        let index = self.index_of_x(x)?;
        let item = self.items.remove(index);
        self.changed();
        Some(item)
    }

    pub fn remove_at(&mut self, index: usize) -> DatasetResult<XyDataItem> {
        DatasetError::check_index("item", index, self.items.len())?;
        let item = self.items.remove(index);
        self.changed();
        Ok(item)
    }

    /// Removes the inclusive index range `start..=end` with one notification.
    pub fn delete(&mut self, start: usize, end: usize) -> DatasetResult<()> {
        if start > end {
            return Err(DatasetError::InvalidArgument(format!(
                "delete range start {start} must be <= end {end}"
            )));
        }
        DatasetError::check_index("item", end, self.items.len())?;
        self.items.drain(start..=end);
        self.changed();
        Ok(())
    }

    /// Removes every item. Empty series are left untouched and silent.
    pub fn clear(&mut self) {
        if self.items.is_empty() {
            return;
        }
        self.items.clear();
        self.changed();
    }

    #[must_use]
    pub fn min_x(&self) -> Option<f64> {
        finite_min(self.items.iter().map(|item| item.x))
    }

    #[must_use]
    pub fn max_x(&self) -> Option<f64> {
        finite_max(self.items.iter().map(|item| item.x))
    }

    #[must_use]
    pub fn min_y(&self) -> Option<f64> {
        finite_min(self.items.iter().filter_map(|item| item.y))
    }

    #[must_use]
    pub fn max_y(&self) -> Option<f64> {
        finite_max(self.items.iter().filter_map(|item| item.y))
    }

    pub fn add_change_listener(
        &mut self,
        listener: Box<dyn ChangeListener<Self>>,
    ) -> ListenerId {
        self.notifier.add_listener(listener)
    }

    pub fn remove_change_listener(&mut self, id: ListenerId) -> bool {
        self.notifier.remove_listener(id)
    }

    /// Counter bumped by every structural mutation, suppressed or not.
    pub(crate) fn revision(&self) -> u64 {
        self.revision
    }

    /// Inserts a placeholder for every x of `xs` (ascending, distinct) the
    /// series does not hold yet, merging them in one pass. Notifies once
    /// when anything was inserted; returns the number of placeholders.
    pub(crate) fn fill_placeholders(&mut self, xs: &[f64]) -> usize {
        let missing: Vec<f64> = xs
            .iter()
            .copied()
            .filter(|&x| !self.contains_x(x))
            .collect();
        if missing.is_empty() {
            return 0;
        }

        if self.auto_sort {
            let existing = std::mem::take(&mut self.items);
            self.items.reserve(existing.len() + missing.len());
            let mut pending = missing.iter().copied().peekable();
            for item in existing {
                while let Some(x) = pending.next_if(|&x| OrderedFloat(x) < item.x_key()) {
                    self.items.push(XyDataItem::placeholder(x));
                }
                self.items.push(item);
            }
            self.items.extend(pending.map(XyDataItem::placeholder));
        } else {
            self.items
                .extend(missing.iter().copied().map(XyDataItem::placeholder));
        }
        trace!(filled = missing.len(), "back-fill placeholders");
        self.changed();
        missing.len()
    }

    fn insert_or_replace(&mut self, item: XyDataItem) -> Option<XyDataItem> {
        if !self.allow_duplicate_x {
            if let Some(index) = self.index_of_x(item.x) {
                let previous = self.items[index];
                self.items[index].y = item.y;
                return Some(previous);
            }
        }

        let index = if self.auto_sort {
            // Equal x-values keep their insertion order.
            let key = item.x_key();
            self.items.partition_point(|existing| existing.x_key() <= key)
        } else {
            self.items.len()
        };
        self.items.insert(index, item);
        None
    }

    fn changed(&mut self) {
        self.revision = self.revision.wrapping_add(1);
        trace!(count = self.items.len(), "series changed");
        self.fire_changed();
    }
}

impl<K> ChangeSource for XySeries<K> {
    fn notifier(&self) -> &ChangeNotifier<Self> {
        &self.notifier
    }

    fn notifier_mut(&mut self) -> &mut ChangeNotifier<Self> {
        &mut self.notifier
    }
}

impl<K: PartialEq> PartialEq for XySeries<K> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
            && self.auto_sort == other.auto_sort
            && self.allow_duplicate_x == other.allow_duplicate_x
            && self.items == other.items
    }
}

impl<K: fmt::Debug> fmt::Debug for XySeries<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XySeries")
            .field("key", &self.key)
            .field("auto_sort", &self.auto_sort)
            .field("allow_duplicate_x", &self.allow_duplicate_x)
            .field("items", &self.items)
            .finish()
    }
}

fn finite_min(values: impl Iterator<Item = f64>) -> Option<f64> {
    values.filter(|value| !value.is_nan()).reduce(f64::min)
}

fn finite_max(values: impl Iterator<Item = f64>) -> Option<f64> {
    values.filter(|value| !value.is_nan()).reduce(f64::max)
}

#[derive(Serialize)]
struct SeriesSnapshotRef<'a, K> {
    key: &'a K,
    auto_sort: bool,
    allow_duplicate_x: bool,
    items: &'a [XyDataItem],
}

#[derive(Deserialize)]
struct SeriesSnapshot<K> {
    key: K,
    #[serde(default = "default_auto_sort")]
    auto_sort: bool,
    #[serde(default)]
    allow_duplicate_x: bool,
    #[serde(default)]
    items: Vec<XyDataItem>,
}

fn default_auto_sort() -> bool {
    true
}

impl<K> XySeries<K> {
    fn from_snapshot(snapshot: SeriesSnapshot<K>) -> DatasetResult<Self> {
        let mut series =
            Self::with_policy(snapshot.key, snapshot.auto_sort, snapshot.allow_duplicate_x);
        for item in snapshot.items {
            if series.insert_or_replace(item.ensure_finite()?).is_some() {
                return Err(DatasetError::InvalidArgument(format!(
                    "duplicate x = {} in a series that does not allow duplicates",
                    item.x
                )));
            }
        }
        Ok(series)
    }
}

/// Non-finite values have no JSON form (they would be written as `null`),
/// so serializing a series that holds one fails.
impl<K: Serialize> Serialize for XySeries<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if let Some(item) = self.items.iter().find(|item| !item.is_finite()) {
            return Err(serde::ser::Error::custom(format!(
                "series holds a non-finite item at x = {}",
                item.x
            )));
        }
        SeriesSnapshotRef {
            key: &self.key,
            auto_sort: self.auto_sort,
            allow_duplicate_x: self.allow_duplicate_x,
            items: &self.items,
        }
        .serialize(serializer)
    }
}

impl<'de, K: Deserialize<'de>> Deserialize<'de> for XySeries<K> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let snapshot = SeriesSnapshot::<K>::deserialize(deserializer)?;
        Self::from_snapshot(snapshot).map_err(serde::de::Error::custom)
    }
}
