use chrono::NaiveDate;
use uuid::Uuid;

/// Source of technical keys for newly opened versions.
pub trait KeyGenerator {
    fn next_key(&mut self, identifier: &str, valid_from: NaiveDate) -> String;
}

/// Random v4 UUIDs. Production default.
#[derive(Clone, Copy, Debug, Default)]
pub struct UuidKeys;

impl KeyGenerator for UuidKeys {
    fn next_key(&mut self, _identifier: &str, _valid_from: NaiveDate) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Reproducible v5 UUIDs derived from `(namespace, identifier, valid_from, seq)`.
///
/// `seq` increments on every call so two versions opened for the same
/// identifier on the same date still get distinct keys.
#[derive(Clone, Debug)]
pub struct DeterministicKeys {
    namespace: Uuid,
    seq: u64,
}

impl DeterministicKeys {
    pub fn new(namespace: Uuid) -> Self {
        Self { namespace, seq: 0 }
    }

    /// Namespace derived from a free-form label (e.g. a destination table name).
    pub fn for_label(label: &str) -> Self {
        Self::new(Uuid::new_v5(&Uuid::NAMESPACE_OID, label.as_bytes()))
    }
}

impl KeyGenerator for DeterministicKeys {
    fn next_key(&mut self, identifier: &str, valid_from: NaiveDate) -> String {
        let material = format!("{identifier}|{}|{}", valid_from.format("%Y-%m-%d"), self.seq);
        self.seq += 1;
        Uuid::new_v5(&self.namespace, material.as_bytes()).to_string()
    }
}
