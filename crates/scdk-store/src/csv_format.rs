//! CSV encoding of snapshot and history tables.
//!
//! ## History column contract
//!
//! | Column          | Example        | Notes                                 |
//! |-----------------|----------------|---------------------------------------|
//! | *attributes*    | `PartnerID`    | Source columns, in stored order       |
//! | `TechnicalKey`  | uuid           | Version key                           |
//! | `Date_From`     | `2024-01-10`   | `YYYY-MM-DD`                          |
//! | `Date_To`       | `9999-12-31`   | Open sentinel while current           |
//! | `Is_valid`      | `Yes` / `No`   | Current flag                          |
//!
//! Versioning columns may appear anywhere in an existing file; on write they
//! always follow the attribute columns. Empty cells decode as `Null`, every
//! other attribute cell as `Text`.

use std::collections::HashSet;
use std::io::Read;

use chrono::NaiveDate;
use scdk_reconcile::{Attributes, EntityRow, HistorizedRow, Value};

use crate::{HistoryTable, SnapshotTable, StoreError};

pub const COL_TECHNICAL_KEY: &str = "TechnicalKey";
pub const COL_DATE_FROM: &str = "Date_From";
pub const COL_DATE_TO: &str = "Date_To";
pub const COL_IS_VALID: &str = "Is_valid";

pub const META_COLUMNS: [&str; 4] = [COL_TECHNICAL_KEY, COL_DATE_FROM, COL_DATE_TO, COL_IS_VALID];

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const YES: &str = "Yes";
pub const NO: &str = "No";

fn csv_err(path: &str, e: csv::Error) -> StoreError {
    StoreError::Csv {
        path: path.to_string(),
        message: e.to_string(),
    }
}

fn read_header<R: Read>(rdr: &mut csv::Reader<R>, path: &str) -> Result<Vec<String>, StoreError> {
    let header: Vec<String> = rdr
        .headers()
        .map_err(|e| csv_err(path, e))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut seen = HashSet::new();
    for h in &header {
        if h.is_empty() {
            return Err(StoreError::Csv {
                path: path.to_string(),
                message: "header contains an empty column name".to_string(),
            });
        }
        if !seen.insert(h.as_str()) {
            return Err(StoreError::DuplicateColumn {
                path: path.to_string(),
                column: h.clone(),
            });
        }
    }
    Ok(header)
}

fn cell_value(raw: &str) -> Value {
    if raw.is_empty() {
        Value::Null
    } else {
        Value::Text(raw.to_string())
    }
}

/// Decode a source table. Versioning column names are reserved.
pub fn decode_snapshot<R: Read>(reader: R, path: &str) -> Result<SnapshotTable, StoreError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let columns = read_header(&mut rdr, path)?;

    if let Some(reserved) = columns.iter().find(|c| META_COLUMNS.contains(&c.as_str())) {
        return Err(StoreError::ReservedColumn {
            path: path.to_string(),
            column: reserved.clone(),
        });
    }

    let mut rows = Vec::new();
    for rec in rdr.records() {
        let rec = rec.map_err(|e| csv_err(path, e))?;
        let attributes: Attributes = columns
            .iter()
            .zip(rec.iter())
            .map(|(c, raw)| (c.clone(), cell_value(raw)))
            .collect();
        rows.push(EntityRow::from(attributes));
    }

    Ok(SnapshotTable { columns, rows })
}

/// Decode a historized table.
pub fn decode_history<R: Read>(reader: R, path: &str) -> Result<HistoryTable, StoreError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let header = read_header(&mut rdr, path)?;

    let position = |name: &str| {
        header
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| StoreError::MissingColumn {
                path: path.to_string(),
                column: name.to_string(),
            })
    };
    let key_at = position(COL_TECHNICAL_KEY)?;
    let from_at = position(COL_DATE_FROM)?;
    let to_at = position(COL_DATE_TO)?;
    let valid_at = position(COL_IS_VALID)?;

    let attribute_columns: Vec<(usize, String)> = header
        .iter()
        .enumerate()
        .filter(|(_, h)| !META_COLUMNS.contains(&h.as_str()))
        .map(|(i, h)| (i, h.clone()))
        .collect();

    let mut rows = Vec::new();
    for (row_no, rec) in rdr.records().enumerate() {
        let rec = rec.map_err(|e| csv_err(path, e))?;
        let field = |i: usize| rec.get(i).unwrap_or("");
        let parse_err = |column: &str, raw: &str| StoreError::ParseField {
            path: path.to_string(),
            row: row_no,
            column: column.to_string(),
            raw: raw.to_string(),
        };

        let technical_key = field(key_at).trim().to_string();
        if technical_key.is_empty() {
            return Err(parse_err(COL_TECHNICAL_KEY, ""));
        }
        let valid_from = parse_date(field(from_at)).ok_or_else(|| parse_err(COL_DATE_FROM, field(from_at)))?;
        let valid_to = parse_date(field(to_at)).ok_or_else(|| parse_err(COL_DATE_TO, field(to_at)))?;
        let is_current = parse_flag(field(valid_at)).ok_or_else(|| parse_err(COL_IS_VALID, field(valid_at)))?;

        let attributes: Attributes = attribute_columns
            .iter()
            .map(|(i, c)| (c.clone(), cell_value(field(*i))))
            .collect();

        rows.push(HistorizedRow {
            technical_key,
            valid_from,
            valid_to,
            is_current,
            attributes,
        });
    }

    Ok(HistoryTable {
        attribute_columns: attribute_columns.into_iter().map(|(_, c)| c).collect(),
        rows,
    })
}

/// Encode a historized table: attribute columns, then versioning columns.
pub fn encode_history(table: &HistoryTable, path: &str) -> Result<Vec<u8>, StoreError> {
    let mut wtr = csv::Writer::from_writer(Vec::new());

    let header = table
        .attribute_columns
        .iter()
        .map(String::as_str)
        .chain(META_COLUMNS);
    wtr.write_record(header).map_err(|e| csv_err(path, e))?;

    for row in &table.rows {
        let mut record: Vec<String> = Vec::with_capacity(table.attribute_columns.len() + META_COLUMNS.len());
        for c in &table.attribute_columns {
            let v = row.get(c).ok_or_else(|| StoreError::MissingColumn {
                path: path.to_string(),
                column: c.clone(),
            })?;
            record.push(v.to_string());
        }
        record.push(row.technical_key.clone());
        record.push(row.valid_from.format(DATE_FORMAT).to_string());
        record.push(row.valid_to.format(DATE_FORMAT).to_string());
        record.push(if row.is_current { YES } else { NO }.to_string());
        wtr.write_record(&record).map_err(|e| csv_err(path, e))?;
    }

    wtr.into_inner().map_err(|e| StoreError::Csv {
        path: path.to_string(),
        message: e.to_string(),
    })
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).ok()
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "yes" | "true" => Some(true),
        "no" | "false" => Some(false),
        _ => None,
    }
}
