use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use ordered_float::OrderedFloat;
use proptest::prelude::*;
use xy_table::{AlignedTable, IntervalDelegate, IntervalWidth, TableConfig, XySeries};

type Table = AlignedTable<usize>;

#[derive(Debug, Clone)]
enum Edit {
    Add { series: usize, x: f64, y: Option<f64> },
    Remove { series: usize, x: f64 },
    Update { series: usize, x: f64, y: Option<f64> },
    RemoveColumn { x: f64 },
    Prune,
}

fn x_strategy() -> impl Strategy<Value = f64> {
    (0u8..24).prop_map(|step| f64::from(step) * 0.5)
}

fn y_strategy() -> impl Strategy<Value = Option<f64>> {
    prop_oneof![
        3 => (-1_000.0f64..1_000.0).prop_map(Some),
        1 => Just(None),
    ]
}

fn series_strategy() -> impl Strategy<Value = Vec<Vec<(f64, Option<f64>)>>> {
    prop::collection::vec(
        prop::collection::vec((x_strategy(), y_strategy()), 0..12),
        1..5,
    )
}

fn edit_strategy() -> impl Strategy<Value = Edit> {
    prop_oneof![
        (0usize..4, x_strategy(), y_strategy())
            .prop_map(|(series, x, y)| Edit::Add { series, x, y }),
        (0usize..4, x_strategy()).prop_map(|(series, x)| Edit::Remove { series, x }),
        (0usize..4, x_strategy(), y_strategy())
            .prop_map(|(series, x, y)| Edit::Update { series, x, y }),
        x_strategy().prop_map(|x| Edit::RemoveColumn { x }),
        Just(Edit::Prune),
    ]
}

fn build(all: &[Vec<(f64, Option<f64>)>], auto_prune: bool) -> Table {
    let mut table = AlignedTable::with_config(TableConfig::default().with_auto_prune(auto_prune));
    for (key, pairs) in all.iter().enumerate() {
        table
            .add_series(XySeries::from_pairs(key, pairs.iter().copied()))
            .expect("add generated series");
    }
    table
}

fn union_of(all: &[Vec<(f64, Option<f64>)>]) -> Vec<f64> {
    let set: BTreeSet<OrderedFloat<f64>> = all
        .iter()
        .flat_map(|pairs| pairs.iter().map(|&(x, _)| OrderedFloat(x)))
        .collect();
    set.into_iter().map(|x| x.0).collect()
}

fn is_aligned(table: &Table) -> bool {
    let x_points: Vec<f64> = table.x_points().collect();
    table
        .series_iter()
        .all(|series| series.x_values().collect::<Vec<_>>() == x_points)
}

fn has_prunable_column(table: &Table) -> bool {
    table.x_points().any(|x| table.can_prune(x))
}

fn counter(table: &mut Table) -> Arc<AtomicUsize> {
    let hits = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&hits);
    table.add_change_listener(Box::new(move |_: &Table| {
        sink.fetch_add(1, Ordering::SeqCst);
    }));
    hits
}

/// Applies `edit`; returns whether the table reported success.
fn apply(table: &mut Table, edit: &Edit) -> bool {
    let count = table.series_count();
    match *edit {
        Edit::Add { series, x, y } => matches!(
            table.modify_series(series % count, |s| s.add(x, y)),
            Ok(Ok(()))
        ),
        Edit::Remove { series, x } => matches!(
            table.modify_series(series % count, |s| s.remove(x)),
            Ok(Ok(_))
        ),
        Edit::Update { series, x, y } => matches!(
            table.modify_series(series % count, |s| s.update(x, y)),
            Ok(Ok(()))
        ),
        Edit::RemoveColumn { x } => table.remove_all_values_for_x(x).is_ok(),
        Edit::Prune => table.prune() > 0,
    }
}

proptest! {
    #[test]
    fn adding_series_aligns_to_the_union(all in series_strategy()) {
        let table = build(&all, false);
        let x_points: Vec<f64> = table.x_points().collect();
        prop_assert_eq!(&x_points, &union_of(&all));
        prop_assert!(is_aligned(&table));

        for (index, pairs) in all.iter().enumerate() {
            let series = table.series(index).expect("series");
            let mut expected: Vec<(f64, Option<f64>)> = Vec::new();
            for &(x, y) in pairs {
                match expected.iter_mut().find(|(ex, _)| *ex == x) {
                    Some(slot) => slot.1 = y,
                    None => expected.push((x, y)),
                }
            }
            for (x, y) in expected {
                prop_assert_eq!(series.y_at(x), y);
            }
        }
    }

    #[test]
    fn every_successful_edit_notifies_once_and_keeps_alignment(
        all in series_strategy(),
        auto_prune in any::<bool>(),
        edits in prop::collection::vec(edit_strategy(), 1..24),
    ) {
        let mut table = build(&all, auto_prune);
        // Adding series never prunes, even with auto-prune on.
        table.prune();
        let hits = counter(&mut table);

        for edit in &edits {
            let before = hits.load(Ordering::SeqCst);
            let applied = apply(&mut table, edit);
            let fired = hits.load(Ordering::SeqCst) - before;

            prop_assert_eq!(fired, usize::from(applied), "edit {:?}", edit);
            prop_assert!(is_aligned(&table), "edit {:?}", edit);
            prop_assert_eq!(table.item_count(), table.x_points().count());
            if auto_prune {
                prop_assert!(!has_prunable_column(&table), "edit {:?}", edit);
            }
        }
    }

    #[test]
    fn prune_is_idempotent(all in series_strategy()) {
        let mut table = build(&all, false);
        let prunable = table.x_points().filter(|&x| table.can_prune(x)).count();

        prop_assert_eq!(table.prune(), prunable);
        prop_assert!(!has_prunable_column(&table));
        prop_assert!(is_aligned(&table));

        let after_first = table.clone();
        prop_assert_eq!(table.prune(), 0);
        prop_assert_eq!(&table, &after_first);
    }

    #[test]
    fn fixed_interval_matches_width_and_factor(
        all in series_strategy(),
        width in 0.01f64..100.0,
        factor in 0.0f64..=1.0,
    ) {
        let mut table = build(&all, false);
        table.set_interval_width(width).expect("width");
        table.set_interval_position_factor(factor).expect("factor");

        for item in 0..table.item_count() {
            let x = table.x(0, item).expect("x");
            let start = table.start_x(0, item).expect("start");
            let end = table.end_x(0, item).expect("end");
            prop_assert_eq!(start, x - width * factor);
            prop_assert!(((end - start) - width).abs() <= 1e-9);
        }
    }

    #[test]
    fn auto_width_is_the_smaller_neighbor_gap(
        base in -1_000.0f64..1_000.0,
        left in 0.01f64..50.0,
        right in 0.01f64..50.0,
    ) {
        let delegate = IntervalDelegate::new(IntervalWidth::AutoFromNeighbors, 0.5)
            .expect("delegate");
        let series = XySeries::from_pairs(
            "s",
            [(base - left, 1.0), (base, 2.0), (base + right, 3.0)],
        );
        let middle_gap_left = series.x(1).expect("x") - series.x(0).expect("x");
        let middle_gap_right = series.x(2).expect("x") - series.x(1).expect("x");

        let width = delegate.width_at(&series, 1).expect("width");
        prop_assert_eq!(width, middle_gap_left.min(middle_gap_right));
        prop_assert_eq!(delegate.width_at(&series, 0).expect("width"), middle_gap_left);
        prop_assert_eq!(delegate.width_at(&series, 2).expect("width"), middle_gap_right);
    }
}
