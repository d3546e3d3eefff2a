use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// `valid_to` of a version that is still in effect.
pub fn open_sentinel() -> NaiveDate {
    NaiveDate::from_ymd_opt(9999, 12, 31).unwrap_or(NaiveDate::MAX)
}

/// One attribute value of an entity.
///
/// Variant order matters for untagged deserialization: integers are tried
/// before floats and ISO dates before free text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Date(NaiveDate),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

/// Named attribute values. Keyed by attribute name (stable ordering).
pub type Attributes = BTreeMap<String, Value>;

/// Current true state of one business entity as of the run date.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityRow {
    pub attributes: Attributes,
}

impl EntityRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly for fixtures.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn attribute_names(&self) -> BTreeSet<&str> {
        self.attributes.keys().map(String::as_str).collect()
    }
}

impl From<Attributes> for EntityRow {
    fn from(attributes: Attributes) -> Self {
        Self { attributes }
    }
}

/// One version of an entity inside the historized table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistorizedRow {
    /// Version-scoped unique key. Never reused, never rewritten.
    pub technical_key: String,
    pub valid_from: NaiveDate,
    /// [`open_sentinel`] while the version is current.
    pub valid_to: NaiveDate,
    pub is_current: bool,
    pub attributes: Attributes,
}

impl HistorizedRow {
    /// New current version effective from `valid_from`.
    pub fn open(technical_key: impl Into<String>, valid_from: NaiveDate, attributes: Attributes) -> Self {
        Self {
            technical_key: technical_key.into(),
            valid_from,
            valid_to: open_sentinel(),
            is_current: true,
            attributes,
        }
    }

    /// Supersede this version at `as_of`. Only `valid_to` and `is_current` move.
    pub fn close(&mut self, as_of: NaiveDate) {
        self.valid_to = as_of;
        self.is_current = false;
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn attribute_names(&self) -> BTreeSet<&str> {
        self.attributes.keys().map(String::as_str).collect()
    }

    /// `true` when `date` falls inside `[valid_from, valid_to)`.
    pub fn is_valid_on(&self, date: NaiveDate) -> bool {
        self.valid_from <= date && date < self.valid_to
    }
}

/// Per-run parameters handed in by the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Name of the business identifier attribute.
    pub id_field: String,
    /// Run date. Used for `valid_from` of new versions and `valid_to` of closed ones.
    pub as_of: NaiveDate,
}

impl ReconcileOptions {
    pub fn new(id_field: impl Into<String>, as_of: NaiveDate) -> Self {
        Self {
            id_field: id_field.into(),
            as_of,
        }
    }
}

/// A single attribute that differs between the current version and the snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldChange {
    pub field: String,
    pub previous: Value,
    pub current: Value,
}

/// What the engine decided for one snapshot entity.
#[derive(Clone, Debug, PartialEq)]
pub enum EntityAction {
    /// Identifier had no current version; a new one was opened.
    FirstSeen { new_key: String },
    /// Current version matches the snapshot; carried forward as-is.
    Unchanged { current_key: String },
    /// Current version was closed and superseded.
    Changed {
        closed_key: String,
        new_key: String,
        changes: Vec<FieldChange>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct EntityOutcome {
    /// Normalized identifier.
    pub identifier: String,
    pub action: EntityAction,
}

/// Evidence of what a reconcile run did, in snapshot order.
#[derive(Clone, Debug, PartialEq)]
pub struct ReconcileReport {
    pub as_of: NaiveDate,
    pub entities: Vec<EntityOutcome>,
    /// Identifiers current in history but absent from the snapshot (sorted).
    pub untouched: Vec<String>,
}

impl ReconcileReport {
    pub fn empty(as_of: NaiveDate) -> Self {
        Self {
            as_of,
            entities: Vec::new(),
            untouched: Vec::new(),
        }
    }

    pub fn inserted_count(&self) -> usize {
        self.entities
            .iter()
            .filter(|e| matches!(e.action, EntityAction::FirstSeen { .. }))
            .count()
    }

    pub fn changed_count(&self) -> usize {
        self.entities
            .iter()
            .filter(|e| matches!(e.action, EntityAction::Changed { .. }))
            .count()
    }

    pub fn unchanged_count(&self) -> usize {
        self.entities
            .iter()
            .filter(|e| matches!(e.action, EntityAction::Unchanged { .. }))
            .count()
    }

    /// `true` when the run produced no closures and no new versions.
    pub fn is_noop(&self) -> bool {
        self.inserted_count() == 0 && self.changed_count() == 0
    }
}

/// Replacement table plus the report that explains it.
#[derive(Clone, Debug, PartialEq)]
pub struct ReconcileOutcome {
    /// Complete historized table in output order (identifier, valid_from).
    pub rows: Vec<HistorizedRow>,
    pub report: ReconcileReport,
}
