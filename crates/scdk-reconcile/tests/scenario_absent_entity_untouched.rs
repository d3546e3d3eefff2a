use chrono::NaiveDate;
use scdk_reconcile::*;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

#[test]
fn scenario_entity_missing_from_snapshot_keeps_current_version() {
    let run1 = reconcile(
        &[
            EntityRow::new().with("id", 1).with("name", "A"),
            EntityRow::new().with("id", 2).with("name", "B"),
        ],
        Vec::new(),
        "id",
        d(2024, 1, 1),
    )
    .unwrap();

    let out = reconcile_with(
        &[EntityRow::new().with("id", 1).with("name", "A")],
        run1.clone(),
        &ReconcileOptions::new("id", d(2024, 2, 1)),
        &NormalizingComparator,
        &mut UuidKeys,
    )
    .unwrap();

    assert_eq!(out.rows, run1);
    assert_eq!(out.report.untouched, vec!["2".to_string()]);
    assert!(out.report.is_noop());
}

#[test]
fn scenario_empty_snapshot_leaves_history_as_is() {
    let run1 = reconcile(
        &[EntityRow::new().with("id", 1).with("name", "A")],
        Vec::new(),
        "id",
        d(2024, 1, 1),
    )
    .unwrap();

    let out = reconcile(&[], run1.clone(), "id", d(2024, 2, 1)).unwrap();
    assert_eq!(out, run1);
}
