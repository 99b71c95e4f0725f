use std::sync::{Arc, Mutex};
use std::thread;

use xy_table::core::SharedAlignedTable;
use xy_table::{AlignedTable, ChangeListener, IntervalWidth, TableConfig, XySeries};

type Table = AlignedTable<&'static str>;

#[derive(Debug, Clone, PartialEq)]
struct Observed {
    x_points: Vec<f64>,
    aligned: bool,
}

#[derive(Clone)]
struct RecordingListener {
    events: Arc<Mutex<Vec<Observed>>>,
}

impl ChangeListener<Table> for RecordingListener {
    fn on_changed(&mut self, table: &Table) {
        let x_points: Vec<f64> = table.x_points().collect();
        let aligned = table
            .series_iter()
            .all(|series| series.x_values().collect::<Vec<_>>() == x_points);
        self.events
            .lock()
            .expect("events lock")
            .push(Observed { x_points, aligned });
    }
}

fn record(table: &mut Table) -> Arc<Mutex<Vec<Observed>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    table.add_change_listener(Box::new(RecordingListener {
        events: Arc::clone(&events),
    }));
    events
}

fn drain(events: &Arc<Mutex<Vec<Observed>>>) -> Vec<Observed> {
    std::mem::take(&mut *events.lock().expect("events lock"))
}

fn two_series_table() -> Table {
    let mut table = AlignedTable::new();
    table
        .add_series(XySeries::from_pairs("A", [(1.0, 10.0), (2.0, 20.0)]))
        .expect("add A");
    table
        .add_series(XySeries::from_pairs("B", [(2.0, 5.0), (3.0, 7.0)]))
        .expect("add B");
    table
}

#[test]
fn add_series_notifies_once_with_the_aligned_state() {
    let mut table = AlignedTable::new();
    table
        .add_series(XySeries::from_pairs("A", [(1.0, 10.0), (2.0, 20.0)]))
        .expect("add A");
    let events = record(&mut table);

    table
        .add_series(XySeries::from_pairs("B", [(2.0, 5.0), (3.0, 7.0)]))
        .expect("add B");

    assert_eq!(
        drain(&events),
        vec![Observed {
            x_points: vec![1.0, 2.0, 3.0],
            aligned: true,
        }]
    );
}

#[test]
fn rejected_add_does_not_notify() {
    let mut table = two_series_table();
    let events = record(&mut table);

    assert!(
        table
            .add_series(XySeries::with_policy("D", true, true))
            .is_err()
    );
    assert!(table.add_series(XySeries::new("A")).is_err());
    assert!(drain(&events).is_empty());
}

#[test]
fn member_edit_that_back_fills_notifies_once() {
    let mut table = two_series_table();
    let events = record(&mut table);

    table
        .modify_series(0, |series| series.add(4.0, 40.0))
        .expect("modify")
        .expect("add");

    let observed = drain(&events);
    assert_eq!(observed.len(), 1);
    assert!(observed[0].aligned);
    assert_eq!(observed[0].x_points, vec![1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn read_only_edit_does_not_notify() {
    let mut table = two_series_table();
    let events = record(&mut table);

    let count = table
        .modify_series(1, |series| series.item_count())
        .expect("modify");
    assert_eq!(count, 3);

    let missing = table
        .modify_series(1, |series| series.remove(42.0))
        .expect("modify");
    assert!(missing.is_err());
    assert!(drain(&events).is_empty());
}

#[test]
fn member_series_listeners_also_see_back_fills() {
    let mut a = XySeries::from_pairs("A", [(1.0, 10.0)]);
    let hits = Arc::new(Mutex::new(0usize));
    let sink = Arc::clone(&hits);
    a.add_change_listener(Box::new(move |_: &XySeries<&'static str>| {
        *sink.lock().expect("hits lock") += 1;
    }));

    let mut table = AlignedTable::new();
    table.add_series(a).expect("add A");
    table
        .add_series(XySeries::from_pairs("B", [(2.0, 5.0), (3.0, 7.0)]))
        .expect("add B");

    // x = 2 and x = 3 are back-filled into A in a single pass.
    assert_eq!(*hits.lock().expect("hits lock"), 1);
}

#[test]
fn each_table_operation_notifies_exactly_once() {
    let mut table = two_series_table();
    let events = record(&mut table);

    table.remove_all_values_for_x(1.0).expect("remove x");
    assert_eq!(drain(&events).len(), 1);

    table.update_x_points();
    assert_eq!(drain(&events).len(), 1);

    table.set_auto_prune(true);
    assert_eq!(drain(&events).len(), 1);
    table.set_auto_prune(true);
    assert!(drain(&events).is_empty());

    table.rename_series(1, "C").expect("rename");
    assert_eq!(drain(&events).len(), 1);

    table.set_interval_width(2.0).expect("width");
    table.set_auto_width(true);
    table.set_interval_position_factor(0.0).expect("factor");
    table
        .set_interval_mode(IntervalWidth::Fixed(3.0), 1.0)
        .expect("mode");
    assert_eq!(drain(&events).len(), 4);

    table.remove_series(0).expect("remove series");
    assert_eq!(drain(&events).len(), 1);

    table.remove_all_series();
    let observed = drain(&events);
    assert_eq!(observed.len(), 1);
    assert!(observed[0].x_points.is_empty());
}

#[test]
fn failed_operations_do_not_notify() {
    let mut table = two_series_table();
    let events = record(&mut table);

    assert!(table.remove_all_values_for_x(99.0).is_err());
    assert!(table.set_interval_width(0.0).is_err());
    assert!(table.set_interval_width(f64::NAN).is_err());
    assert!(table.set_interval_position_factor(1.5).is_err());
    assert!(table.remove_series(7).is_err());
    assert!(table.rename_series(0, "B").is_err());
    assert!(drain(&events).is_empty());
}

#[test]
fn prune_notifies_only_when_something_was_pruned() {
    let mut table = AlignedTable::new();
    table
        .add_series(XySeries::from_pairs("A", [(1.0, None), (2.0, Some(2.0))]))
        .expect("add A");
    let events = record(&mut table);

    assert_eq!(table.prune(), 1);
    assert_eq!(drain(&events).len(), 1);

    assert_eq!(table.prune(), 0);
    assert!(drain(&events).is_empty());
}

#[test]
fn auto_prune_during_member_edit_still_notifies_once() {
    let mut table = AlignedTable::with_config(TableConfig::default().with_auto_prune(true));
    table
        .add_series(XySeries::from_pairs("A", [(1.0, 1.0), (2.0, 2.0), (3.0, 3.0)]))
        .expect("add A");
    table
        .add_series(XySeries::from_pairs("B", [(3.0, 9.0)]))
        .expect("add B");
    let events = record(&mut table);

    table
        .modify_series(0, |series| series.delete(0, 1))
        .expect("modify")
        .expect("delete");

    let observed = drain(&events);
    assert_eq!(observed.len(), 1);
    assert_eq!(observed[0].x_points, vec![3.0]);
    assert!(observed[0].aligned);
}

#[test]
fn removed_listener_stops_receiving() {
    let mut table = two_series_table();
    let events = Arc::new(Mutex::new(Vec::new()));
    let id = table.add_change_listener(Box::new(RecordingListener {
        events: Arc::clone(&events),
    }));
    assert_eq!(table.listener_count(), 1);

    table.update_x_points();
    assert!(table.remove_change_listener(id));
    assert!(!table.remove_change_listener(id));
    table.update_x_points();

    assert_eq!(drain(&events).len(), 1);
    assert_eq!(table.listener_count(), 0);
}

#[test]
fn clones_do_not_carry_listeners() {
    let mut table = two_series_table();
    let events = record(&mut table);

    let mut cloned = table.clone();
    assert_eq!(cloned.listener_count(), 0);
    cloned.update_x_points();
    assert!(drain(&events).is_empty());
}

#[test]
fn shared_table_stays_aligned_across_threads() {
    let shared: SharedAlignedTable<String> = Arc::new(Mutex::new(AlignedTable::new()));
    let notifications = Arc::new(Mutex::new(0usize));
    {
        let sink = Arc::clone(&notifications);
        shared
            .lock()
            .expect("table lock")
            .add_change_listener(Box::new(move |_: &AlignedTable<String>| {
                *sink.lock().expect("count lock") += 1;
            }));
    }

    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let table = Arc::clone(&shared);
            thread::spawn(move || {
                let offset = f64::from(worker);
                let series = XySeries::from_pairs(
                    format!("worker-{worker}"),
                    (0..3).map(|i| (offset + f64::from(i), offset)),
                );
                table
                    .lock()
                    .expect("table lock")
                    .add_series(series)
                    .expect("add series");
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("worker thread");
    }

    let table = shared.lock().expect("table lock");
    assert_eq!(table.series_count(), 4);
    let x_points: Vec<f64> = table.x_points().collect();
    assert_eq!(x_points, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    for series in table.series_iter() {
        assert_eq!(series.x_values().collect::<Vec<_>>(), x_points);
    }
    assert_eq!(*notifications.lock().expect("count lock"), 4);
}
