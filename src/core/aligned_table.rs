use std::collections::BTreeSet;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, trace};

use crate::core::dataset::{IntervalXyDataset, SeriesKey, TableXyDataset, XyDataset};
use crate::core::interval::{DomainBounds, IntervalDelegate, IntervalWidth, XInterval};
use crate::core::{XyDataItem, XySeries};
use crate::error::{DatasetError, DatasetResult};
use crate::events::{ChangeListener, ChangeNotifier, ChangeSource, ListenerId};

/// A table shared across threads. Every public operation runs under the one
/// lock, so member series are never observed half-aligned.
pub type SharedAlignedTable<K> = Arc<Mutex<AlignedTable<K>>>;

/// Construction-time options of an [`AlignedTable`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TableConfig {
    #[serde(default)]
    pub auto_prune: bool,
    #[serde(default)]
    pub interval: IntervalDelegate,
}

impl TableConfig {
    #[must_use]
    pub fn with_auto_prune(mut self, auto_prune: bool) -> Self {
        self.auto_prune = auto_prune;
        self
    }

    #[must_use]
    pub fn with_interval(mut self, interval: IntervalDelegate) -> Self {
        self.interval = interval;
        self
    }
}

/// Multi-series dataset whose members all share one set of x-values.
///
/// After every public operation each member series holds exactly one item
/// for every x in [`AlignedTable::x_points`], absent values being stored as
/// placeholders, and no member holds an x outside that set. Member series
/// are owned by the table; mutate them through [`AlignedTable::modify_series`]
/// so the table can resynchronize.
///
/// Listeners registered with [`AlignedTable::add_change_listener`] see one
/// notification per externally invoked mutation, however many back-fill
/// insertions it caused.
#[derive(Clone)]
pub struct AlignedTable<K> {
    series: IndexMap<K, XySeries<K>>,
    x_points: BTreeSet<OrderedFloat<f64>>,
    auto_prune: bool,
    interval: IntervalDelegate,
    notifier: ChangeNotifier<AlignedTable<K>>,
}

impl<K: SeriesKey> Default for AlignedTable<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: SeriesKey> AlignedTable<K> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(TableConfig::default())
    }

    #[must_use]
    pub fn with_config(config: TableConfig) -> Self {
        Self {
            series: IndexMap::new(),
            x_points: BTreeSet::new(),
            auto_prune: config.auto_prune,
            interval: config.interval,
            notifier: ChangeNotifier::new(),
        }
    }

    /// Creates a table seeded with one series.
    pub fn from_series(series: XySeries<K>) -> DatasetResult<Self> {
        let mut table = Self::new();
        table.add_series(series)?;
        Ok(table)
    }

    #[must_use]
    pub fn config(&self) -> TableConfig {
        TableConfig {
            auto_prune: self.auto_prune,
            interval: self.interval,
        }
    }

    #[must_use]
    pub fn is_auto_prune(&self) -> bool {
        self.auto_prune
    }

    /// Enables or disables auto-pruning. Enabling prunes immediately.
    pub fn set_auto_prune(&mut self, auto_prune: bool) {
        if self.auto_prune == auto_prune {
            return;
        }
        self.auto_prune = auto_prune;
        if auto_prune {
            self.prune_x_points();
        }
        self.fire_changed();
    }

    /// Adds a series, aligning it and every existing member to the union of
    /// their x-values.
    ///
    /// Rejects series that allow duplicate x-values, unsorted series (item
    /// indices must address the same column in every member), series holding
    /// a non-finite x or y, and keys that are already present. Nothing is
    /// mutated on rejection.
    pub fn add_series(&mut self, mut series: XySeries<K>) -> DatasetResult<()> {
        if series.allow_duplicate_x() {
            return Err(DatasetError::InvalidArgument(
                "cannot accept a series that allows duplicate x-values".to_owned(),
            ));
        }
        if !series.auto_sort() {
            return Err(DatasetError::InvalidArgument(
                "cannot accept a series that is not sorted by x".to_owned(),
            ));
        }
        if self.series.contains_key(series.key()) {
            return Err(DatasetError::InvalidArgument(format!(
                "series with key {:?} is already present",
                series.key()
            )));
        }
        for item in series.items() {
            item.ensure_finite()?;
        }

        {
            let mut table = self.suppress_events();
            table.align_incoming(&mut series);
            let key = series.key().clone();
            debug!(
                key = ?key,
                items = series.item_count(),
                x_points = table.x_points.len(),
                "add series"
            );
            table.series.insert(key, series);
        }
        self.fire_changed();
        Ok(())
    }

    /// Removes the series at `index` and hands it back to the caller.
    pub fn remove_series(&mut self, index: usize) -> DatasetResult<XySeries<K>> {
        let len = self.series.len();
        let (key, removed) =
            self.series
                .shift_remove_index(index)
                .ok_or(DatasetError::IndexOutOfRange {
                    what: "series",
                    index,
                    len,
                })?;
        debug!(key = ?key, remaining = self.series.len(), "remove series");

        if self.series.is_empty() {
            self.x_points.clear();
        } else if self.auto_prune {
            self.prune_x_points();
        }
        self.fire_changed();
        Ok(removed)
    }

    pub fn remove_series_by_key(&mut self, key: &K) -> DatasetResult<XySeries<K>> {
        let index = self
            .series
            .get_index_of(key)
            .ok_or_else(|| DatasetError::NotFound(format!("no series with key {key:?}")))?;
        self.remove_series(index)
    }

    pub fn remove_all_series(&mut self) {
        debug!(count = self.series.len(), "remove all series");
        self.series.clear();
        self.x_points.clear();
        self.fire_changed();
    }

    /// Removes the items at `x` from every member and drops `x` from the table.
    pub fn remove_all_values_for_x(&mut self, x: f64) -> DatasetResult<()> {
        if !self.x_points.contains(&OrderedFloat(x)) {
            return Err(DatasetError::NotFound(format!("no x-value {x} in table")));
        }
        self.remove_x_everywhere(x);
        if self.auto_prune {
            self.prune_x_points();
        }
        self.fire_changed();
        Ok(())
    }

    /// `true` when no member has a value at `x`.
    #[must_use]
    pub fn can_prune(&self, x: f64) -> bool {
        self.series.values().all(|series| series.y_at(x).is_none())
    }

    /// Removes every x-value at which all members are absent.
    ///
    /// Returns the number of pruned x-values; listeners are notified once
    /// when that number is non-zero.
    pub fn prune(&mut self) -> usize {
        let pruned = self.prune_x_points();
        if pruned > 0 {
            self.fire_changed();
        }
        pruned
    }

    /// Recomputes the x-value union from scratch and back-fills every member.
    pub fn update_x_points(&mut self) {
        self.synchronize();
        self.fire_changed();
    }

    /// Mutates the member at `index` through a [`SeriesEditor`], then
    /// resynchronizes the table if the series changed.
    ///
    /// Removing an item from one member leaves a placeholder at that x while
    /// other members still hold it; auto-pruning, when enabled, then drops
    /// the x if no member has a value there.
    pub fn modify_series<R>(
        &mut self,
        index: usize,
        edit: impl FnOnce(&mut SeriesEditor<'_, K>) -> R,
    ) -> DatasetResult<R> {
        let len = self.series.len();
        self.mutate_member(index, |series| edit(&mut SeriesEditor { series }))
            .ok_or(DatasetError::IndexOutOfRange {
                what: "series",
                index,
                len,
            })
    }

    pub fn modify_series_by_key<R>(
        &mut self,
        key: &K,
        edit: impl FnOnce(&mut SeriesEditor<'_, K>) -> R,
    ) -> DatasetResult<R> {
        let index = self
            .series
            .get_index_of(key)
            .ok_or_else(|| DatasetError::NotFound(format!("no series with key {key:?}")))?;
        self.modify_series(index, edit)
    }

    /// Changes the key of the member at `index`, keeping its position.
    pub fn rename_series(&mut self, index: usize, key: K) -> DatasetResult<()> {
        let len = self.series.len();
        DatasetError::check_index("series", index, len)?;
        match self.series.get_index_of(&key) {
            Some(existing) if existing == index => return Ok(()),
            Some(_) => {
                return Err(DatasetError::InvalidArgument(format!(
                    "series with key {key:?} is already present"
                )));
            }
            None => {}
        }

        let (_, mut series) =
            self.series
                .shift_remove_index(index)
                .ok_or(DatasetError::IndexOutOfRange {
                    what: "series",
                    index,
                    len,
                })?;
        series.set_key(key.clone());
        self.series.shift_insert(index, key, series);
        self.fire_changed();
        Ok(())
    }

    #[must_use]
    pub fn series_count(&self) -> usize {
        self.series.len()
    }

    pub fn series(&self, index: usize) -> DatasetResult<&XySeries<K>> {
        self.series
            .get_index(index)
            .map(|(_, series)| series)
            .ok_or(DatasetError::IndexOutOfRange {
                what: "series",
                index,
                len: self.series.len(),
            })
    }

    #[must_use]
    pub fn series_by_key(&self, key: &K) -> Option<&XySeries<K>> {
        self.series.get(key)
    }

    #[must_use]
    pub fn series_index(&self, key: &K) -> Option<usize> {
        self.series.get_index_of(key)
    }

    pub fn series_key(&self, index: usize) -> DatasetResult<&K> {
        self.series(index).map(XySeries::key)
    }

    /// Members in insertion (stacking) order.
    pub fn series_iter(&self) -> impl Iterator<Item = &XySeries<K>> + '_ {
        self.series.values()
    }

    /// Distinct x-values known to the table, ascending.
    pub fn x_points(&self) -> impl Iterator<Item = f64> + '_ {
        self.x_points.iter().map(|x| x.0)
    }

    /// Number of distinct x-values, which is also every member's item count.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.x_points.len()
    }

    pub fn series_item_count(&self, series: usize) -> DatasetResult<usize> {
        self.series(series).map(XySeries::item_count)
    }

    pub fn item(&self, series: usize, item: usize) -> DatasetResult<XyDataItem> {
        self.series(series)?.get(item)
    }

    pub fn x(&self, series: usize, item: usize) -> DatasetResult<f64> {
        self.series(series)?.x(item)
    }

    pub fn y(&self, series: usize, item: usize) -> DatasetResult<Option<f64>> {
        self.series(series)?.y(item)
    }

    pub fn interval(&self, series: usize, item: usize) -> DatasetResult<XInterval> {
        self.interval.interval(self.series(series)?, item)
    }

    pub fn start_x(&self, series: usize, item: usize) -> DatasetResult<f64> {
        self.interval.start_x(self.series(series)?, item)
    }

    pub fn end_x(&self, series: usize, item: usize) -> DatasetResult<f64> {
        self.interval.end_x(self.series(series)?, item)
    }

    pub fn start_y(&self, series: usize, item: usize) -> DatasetResult<Option<f64>> {
        self.y(series, item)
    }

    pub fn end_y(&self, series: usize, item: usize) -> DatasetResult<Option<f64>> {
        self.y(series, item)
    }

    #[must_use]
    pub fn domain_bounds(&self, include_interval: bool) -> Option<DomainBounds> {
        self.interval
            .domain_bounds(self.series.values(), include_interval)
    }

    #[must_use]
    pub fn domain_lower_bound(&self, include_interval: bool) -> Option<f64> {
        self.domain_bounds(include_interval).map(|bounds| bounds.lower)
    }

    #[must_use]
    pub fn domain_upper_bound(&self, include_interval: bool) -> Option<f64> {
        self.domain_bounds(include_interval).map(|bounds| bounds.upper)
    }

    #[must_use]
    pub fn interval_delegate(&self) -> IntervalDelegate {
        self.interval
    }

    pub fn set_interval_width(&mut self, width: f64) -> DatasetResult<()> {
        self.interval.set_fixed_width(width)?;
        self.fire_changed();
        Ok(())
    }

    pub fn set_auto_width(&mut self, auto: bool) {
        self.interval.set_auto_width(auto);
        self.fire_changed();
    }

    pub fn set_interval_position_factor(&mut self, position_factor: f64) -> DatasetResult<()> {
        self.interval.set_position_factor(position_factor)?;
        self.fire_changed();
        Ok(())
    }

    /// Replaces width mode and position factor together.
    pub fn set_interval_mode(
        &mut self,
        width: IntervalWidth,
        position_factor: f64,
    ) -> DatasetResult<()> {
        self.interval = IntervalDelegate::new(width, position_factor)?;
        self.fire_changed();
        Ok(())
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

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.notifier.listener_count()
    }

    /// Brings `incoming` and the current members to a common x-value set.
    fn align_incoming(&mut self, incoming: &mut XySeries<K>) {
        let incoming_xs: BTreeSet<OrderedFloat<f64>> =
            incoming.x_values().map(OrderedFloat).collect();
        let new_xs: Vec<f64> = incoming_xs
            .difference(&self.x_points)
            .map(|x| x.0)
            .collect();

        if !new_xs.is_empty() {
            self.x_points.extend(new_xs.iter().copied().map(OrderedFloat));
            for index in 0..self.series.len() {
                self.back_fill(index, &new_xs);
            }
        }

        let missing: Vec<f64> = self
            .x_points
            .difference(&incoming_xs)
            .map(|x| x.0)
            .collect();
        incoming.fill_placeholders(&missing);
    }

    /// Full resynchronization: recompute the union of all member x-values,
    /// back-fill every member and optionally prune. Does not notify.
    fn synchronize(&mut self) {
        let mut table = self.suppress_events();
        let union: BTreeSet<OrderedFloat<f64>> = table
            .series
            .values()
            .flat_map(|series| series.x_values())
            .map(OrderedFloat)
            .collect();

        let union_xs: Vec<f64> = union.iter().map(|x| x.0).collect();
        for index in 0..table.series.len() {
            table.back_fill(index, &union_xs);
        }
        table.x_points = union;

        if table.auto_prune {
            table.prune_x_points();
        }
    }

    /// Handler for a member mutation. Nested calls raised by the table's own
    /// back-fill and prune passes are dropped; the outer pass covers them.
    fn series_changed(&mut self, index: usize) {
        if !self.notifier.is_propagating() {
            trace!(index, "nested series change suppressed");
            return;
        }
        debug!(index, "member series changed, resynchronizing");
        self.synchronize();
        self.fire_changed();
    }

    /// Runs `mutate` on the member at `index` and routes the resulting change,
    /// if any, to [`Self::series_changed`]. `None` when `index` is out of range.
    fn mutate_member<R>(
        &mut self,
        index: usize,
        mutate: impl FnOnce(&mut XySeries<K>) -> R,
    ) -> Option<R> {
        let (_, series) = self.series.get_index_mut(index)?;
        let revision = series.revision();
        let result = mutate(series);
        if series.revision() != revision {
            self.series_changed(index);
        }
        Some(result)
    }

    /// Gives the member at `index` a placeholder for each of `xs` it lacks.
    fn back_fill(&mut self, index: usize, xs: &[f64]) {
        self.mutate_member(index, |series| series.fill_placeholders(xs));
    }

    fn remove_x_everywhere(&mut self, x: f64) {
        let mut table = self.suppress_events();
        for index in 0..table.series.len() {
            table.mutate_member(index, |series| series.take_x(x));
        }
        table.x_points.remove(&OrderedFloat(x));
    }

    fn prune_x_points(&mut self) -> usize {
        let mut table = self.suppress_events();
        // Iterate a copy: pruning removes entries from the live set.
        let snapshot: Vec<f64> = table.x_points.iter().map(|x| x.0).collect();
        let mut pruned = 0;
        for x in snapshot {
            if table.can_prune(x) {
                table.remove_x_everywhere(x);
                pruned += 1;
            }
        }
        if pruned > 0 {
            debug!(pruned, remaining = table.x_points.len(), "pruned x-values");
        }
        pruned
    }
}

impl<K> ChangeSource for AlignedTable<K> {
    fn notifier(&self) -> &ChangeNotifier<Self> {
        &self.notifier
    }

    fn notifier_mut(&mut self) -> &mut ChangeNotifier<Self> {
        &mut self.notifier
    }
}

/// Write access to one member series of an [`AlignedTable`].
///
/// Exposes the data mutations of [`XySeries`] but not its key, which the
/// table indexes. Reads go through `Deref`. Writes reject non-finite x and
/// y values before touching the series.
pub struct SeriesEditor<'a, K> {
    series: &'a mut XySeries<K>,
}

impl<K> Deref for SeriesEditor<'_, K> {
    type Target = XySeries<K>;

    fn deref(&self) -> &XySeries<K> {
        self.series
    }
}

impl<K> SeriesEditor<'_, K> {
    pub fn add(&mut self, x: f64, y: impl Into<Option<f64>>) -> DatasetResult<()> {
        self.add_item(XyDataItem::new(x, y))
    }

    pub fn add_item(&mut self, item: XyDataItem) -> DatasetResult<()> {
        self.series.add_item(item.ensure_finite()?);
        Ok(())
    }

    pub fn add_or_update(
        &mut self,
        x: f64,
        y: impl Into<Option<f64>>,
    ) -> DatasetResult<Option<XyDataItem>> {
        let item = XyDataItem::new(x, y).ensure_finite()?;
        Ok(self.series.add_or_update(item.x, item.y))
    }

    pub fn update(&mut self, x: f64, y: impl Into<Option<f64>>) -> DatasetResult<()> {
        let item = XyDataItem::new(x, y).ensure_finite()?;
        self.series.update(item.x, item.y)
    }

    pub fn update_by_index(
        &mut self,
        index: usize,
        y: impl Into<Option<f64>>,
    ) -> DatasetResult<()> {
        let y = finite_y(y.into())?;
        self.series.update_by_index(index, y)
    }

    pub fn remove(&mut self, x: f64) -> DatasetResult<XyDataItem> {
        self.series.remove(x)
    }

    pub fn remove_at(&mut self, index: usize) -> DatasetResult<XyDataItem> {
        self.series.remove_at(index)
    }

    pub fn delete(&mut self, start: usize, end: usize) -> DatasetResult<()> {
        self.series.delete(start, end)
    }

    pub fn clear(&mut self) {
        self.series.clear();
    }
}

fn finite_y(y: Option<f64>) -> DatasetResult<Option<f64>> {
    match y {
        Some(value) if !value.is_finite() => Err(DatasetError::InvalidArgument(format!(
            "y must be finite, got {value}"
        ))),
        _ => Ok(y),
    }
}

impl<K: PartialEq> PartialEq for AlignedTable<K> {
    fn eq(&self, other: &Self) -> bool {
        self.auto_prune == other.auto_prune
            && self.interval == other.interval
            && self.series.len() == other.series.len()
            && self
                .series
                .values()
                .zip(other.series.values())
                .all(|(a, b)| a == b)
    }
}

impl<K: fmt::Debug> fmt::Debug for AlignedTable<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlignedTable")
            .field("series", &self.series.values().collect::<Vec<_>>())
            .field("x_points", &self.x_points.len())
            .field("auto_prune", &self.auto_prune)
            .field("interval", &self.interval)
            .field("notifier", &self.notifier)
            .finish()
    }
}

impl<K: SeriesKey> XyDataset for AlignedTable<K> {
    type Key = K;

    fn series_count(&self) -> usize {
        AlignedTable::series_count(self)
    }

    fn series_key(&self, series: usize) -> DatasetResult<&K> {
        AlignedTable::series_key(self, series)
    }

    fn item_count(&self, series: usize) -> DatasetResult<usize> {
        self.series_item_count(series)
    }

    fn x(&self, series: usize, item: usize) -> DatasetResult<f64> {
        AlignedTable::x(self, series, item)
    }

    fn y(&self, series: usize, item: usize) -> DatasetResult<Option<f64>> {
        AlignedTable::y(self, series, item)
    }
}

impl<K: SeriesKey> IntervalXyDataset for AlignedTable<K> {
    fn start_x(&self, series: usize, item: usize) -> DatasetResult<f64> {
        AlignedTable::start_x(self, series, item)
    }

    fn end_x(&self, series: usize, item: usize) -> DatasetResult<f64> {
        AlignedTable::end_x(self, series, item)
    }

    fn start_y(&self, series: usize, item: usize) -> DatasetResult<Option<f64>> {
        AlignedTable::start_y(self, series, item)
    }

    fn end_y(&self, series: usize, item: usize) -> DatasetResult<Option<f64>> {
        AlignedTable::end_y(self, series, item)
    }
}

impl<K: SeriesKey> TableXyDataset for AlignedTable<K> {
    fn column_count(&self) -> usize {
        self.item_count()
    }
}

#[derive(Serialize)]
struct TableSnapshotRef<'a, K> {
    config: TableConfig,
    series: Vec<&'a XySeries<K>>,
}

#[derive(Deserialize)]
struct TableSnapshot<K> {
    #[serde(default)]
    config: TableConfig,
    #[serde(default = "Vec::new")]
    series: Vec<XySeries<K>>,
}

impl<K: Serialize> Serialize for AlignedTable<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        TableSnapshotRef {
            config: TableConfig {
                auto_prune: self.auto_prune,
                interval: self.interval,
            },
            series: self.series.values().collect(),
        }
        .serialize(serializer)
    }
}

/// The x-value set is not stored; it is rebuilt by re-adding every series.
impl<'de, K: SeriesKey + Deserialize<'de>> Deserialize<'de> for AlignedTable<K> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let snapshot = TableSnapshot::<K>::deserialize(deserializer)?;
        let mut table = Self::with_config(snapshot.config);
        for series in snapshot.series {
            table
                .add_series(series)
                .map_err(serde::de::Error::custom)?;
        }
        Ok(table)
    }
}
