//! CSV table contract: header layout, versioning column parsing, reserved names.

use chrono::NaiveDate;
use scdk_reconcile::{open_sentinel, EntityRow, HistorizedRow, Value};
use scdk_store::*;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

#[test]
fn history_encodes_attributes_then_versioning_columns() {
    let mut closed = HistorizedRow::open(
        "k1",
        d(2024, 1, 1),
        EntityRow::new().with("PartnerID", "1").with("Name", "Acme").attributes,
    );
    closed.close(d(2024, 2, 1));
    let current = HistorizedRow::open(
        "k2",
        d(2024, 2, 1),
        EntityRow::new().with("PartnerID", "1").with("Name", Value::Null).attributes,
    );
    let table = HistoryTable {
        attribute_columns: vec!["PartnerID".to_string(), "Name".to_string()],
        rows: vec![closed, current],
    };

    let bytes = encode_history(&table, "t").unwrap();
    assert_eq!(
        String::from_utf8(bytes).unwrap(),
        "PartnerID,Name,TechnicalKey,Date_From,Date_To,Is_valid\n\
         1,Acme,k1,2024-01-01,2024-02-01,No\n\
         1,,k2,2024-02-01,9999-12-31,Yes\n"
    );
}

#[test]
fn history_decodes_with_versioning_columns_anywhere() {
    let csv = "TechnicalKey,PartnerID,Is_valid,Name,Date_From,Date_To\n\
               k1,7,Yes,\"Acme, Inc.\",2024-01-01,9999-12-31\n";

    let table = decode_history(csv.as_bytes(), "t").unwrap();
    assert_eq!(table.attribute_columns, vec!["PartnerID", "Name"]);

    let row = &table.rows[0];
    assert_eq!(row.technical_key, "k1");
    assert!(row.is_current);
    assert_eq!(row.valid_from, d(2024, 1, 1));
    assert_eq!(row.valid_to, open_sentinel());
    assert_eq!(row.get("Name"), Some(&Value::from("Acme, Inc.")));
    assert_eq!(row.get("PartnerID"), Some(&Value::from("7")));
}

#[test]
fn history_missing_versioning_column_is_rejected() {
    let csv = "PartnerID,TechnicalKey,Date_From,Date_To\n1,k,2024-01-01,9999-12-31\n";
    let err = decode_history(csv.as_bytes(), "t").unwrap_err();
    assert_eq!(
        err,
        StoreError::MissingColumn {
            path: "t".to_string(),
            column: "Is_valid".to_string(),
        }
    );
}

#[test]
fn history_bad_date_names_row_and_column() {
    let csv = "PartnerID,TechnicalKey,Date_From,Date_To,Is_valid\n\
               1,k1,2024-01-01,9999-12-31,Yes\n\
               2,k2,01/02/2024,9999-12-31,Yes\n";
    let err = decode_history(csv.as_bytes(), "t").unwrap_err();
    assert_eq!(
        err,
        StoreError::ParseField {
            path: "t".to_string(),
            row: 1,
            column: "Date_From".to_string(),
            raw: "01/02/2024".to_string(),
        }
    );
}

#[test]
fn history_bad_flag_is_rejected() {
    let csv = "PartnerID,TechnicalKey,Date_From,Date_To,Is_valid\n1,k1,2024-01-01,9999-12-31,maybe\n";
    assert!(matches!(
        decode_history(csv.as_bytes(), "t"),
        Err(StoreError::ParseField { .. })
    ));
}

#[test]
fn snapshot_keeps_column_order_and_reads_text() {
    let csv = "PartnerID,Name,Since\n1,Acme,2020-05-01\n2,,\n";
    let table = decode_snapshot(csv.as_bytes(), "s").unwrap();

    assert_eq!(table.columns, vec!["PartnerID", "Name", "Since"]);
    assert_eq!(table.rows.len(), 2);
    assert_eq!(table.rows[0].get("Since"), Some(&Value::from("2020-05-01")));
    assert_eq!(table.rows[1].get("Name"), Some(&Value::Null));
}

#[test]
fn snapshot_with_versioning_column_is_rejected() {
    let csv = "PartnerID,Is_valid\n1,Yes\n";
    let err = decode_snapshot(csv.as_bytes(), "s").unwrap_err();
    assert!(matches!(err, StoreError::ReservedColumn { ref column, .. } if column == "Is_valid"));
}

#[test]
fn snapshot_duplicate_header_is_rejected() {
    let csv = "PartnerID,Name,Name\n1,a,b\n";
    assert!(matches!(
        decode_snapshot(csv.as_bytes(), "s"),
        Err(StoreError::DuplicateColumn { .. })
    ));
}

#[test]
fn snapshot_ragged_row_is_rejected() {
    let csv = "PartnerID,Name\n1,a\n2\n";
    assert!(matches!(
        decode_snapshot(csv.as_bytes(), "s"),
        Err(StoreError::Csv { .. })
    ));
}
