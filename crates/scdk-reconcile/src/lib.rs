//! scdk-reconcile
//!
//! SCD Type 2 reconciliation engine.
//!
//! Architectural decisions:
//! - Snapshot + existing history in, complete replacement history out
//! - Unknown identifier => first-seen insert
//! - Any attribute drift => close current version, open a new one
//! - Identifier absent from snapshot => left untouched (no delete inference)
//! - Multiple current versions, duplicate snapshot ids, column drift => hard error
//!
//! Deterministic, pure logic. No IO. No clock (caller supplies `as_of`).

mod audit;
mod compare;
mod engine;
mod error;
mod keys;
mod types;

pub use audit::{rows_as_of, verify_history, HistoryAudit, HistoryViolation};
pub use compare::{
    canonical_decimal, identifier_key, NormalizedValue, NormalizingComparator, StrictComparator,
    ValueComparator,
};
pub use engine::{reconcile, reconcile_with};
pub use error::{ReconcileError, RowOrigin, SchemaMismatch};
pub use keys::{DeterministicKeys, KeyGenerator, UuidKeys};
pub use types::*;
