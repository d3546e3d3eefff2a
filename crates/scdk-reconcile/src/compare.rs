//! Attribute comparison.
//!
//! History tables round-trip through storage that may not preserve value
//! representation (a CSV cell is always text, a warehouse column may come back
//! as a number). Comparing raw values would turn every such round trip into a
//! new version, so the engine compares through a [`ValueComparator`].

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::Value;

/// Decides whether two attribute values represent the same fact.
pub trait ValueComparator {
    fn name(&self) -> &'static str;

    fn equivalent(&self, a: &Value, b: &Value) -> bool;
}

/// Representation-independent form of a [`Value`].
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NormalizedValue {
    Null,
    Bool(bool),
    /// Canonical decimal string (see [`canonical_decimal`]).
    Number(String),
    Date(NaiveDate),
    Text(String),
}

impl NormalizedValue {
    /// Plain string form, used for identifiers.
    pub fn into_key(self) -> Option<String> {
        match self {
            NormalizedValue::Null => None,
            NormalizedValue::Bool(b) => Some(b.to_string()),
            NormalizedValue::Number(n) => Some(n),
            NormalizedValue::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            NormalizedValue::Text(s) => Some(s),
        }
    }
}

/// Default comparator.
///
/// Two text values are compared as trimmed strings, with blank text equal to
/// `Null`. Coercion applies only across variants, where it treats these as
/// equal:
/// - integers, floats and numeric text with the same decimal value
/// - dates and date text (`YYYY-MM-DD`, `YYYY/MM/DD`, midnight timestamps)
/// - booleans and `"true"`/`"false"` text (any case)
///
/// So `"01234"` and `"1234"` differ, while `Int(1234)` and `"01234"` do not.
#[derive(Clone, Copy, Debug, Default)]
pub struct NormalizingComparator;

impl NormalizingComparator {
    pub fn normalize(&self, value: &Value) -> NormalizedValue {
        match value {
            Value::Null => NormalizedValue::Null,
            Value::Bool(b) => NormalizedValue::Bool(*b),
            Value::Int(i) => NormalizedValue::Number(i.to_string()),
            Value::Float(x) => {
                let s = x.to_string();
                match canonical_decimal(&s) {
                    Some(n) => NormalizedValue::Number(n),
                    // NaN / inf
                    None => NormalizedValue::Text(s),
                }
            }
            Value::Date(d) => NormalizedValue::Date(*d),
            Value::Text(s) => normalize_text(s),
        }
    }
}

impl ValueComparator for NormalizingComparator {
    fn name(&self) -> &'static str {
        "normalized"
    }

    fn equivalent(&self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Text(x), Value::Text(y)) => x.trim() == y.trim(),
            _ => self.normalize(a) == self.normalize(b),
        }
    }
}

/// Exact comparison: same variant, same value.
#[derive(Clone, Copy, Debug, Default)]
pub struct StrictComparator;

impl ValueComparator for StrictComparator {
    fn name(&self) -> &'static str {
        "strict"
    }

    fn equivalent(&self, a: &Value, b: &Value) -> bool {
        a == b
    }
}

/// String form of an identifier value.
///
/// Numbers are written in canonical decimal form so `1`, `1.0` and `"1"` name
/// the same entity. Text is trimmed and otherwise kept verbatim: `"007"` and
/// `"7"` are different entities. Returns `None` for null / blank identifiers.
pub fn identifier_key(value: &Value) -> Option<String> {
    match value {
        Value::Text(s) => {
            let t = s.trim();
            (!t.is_empty()).then(|| t.to_string())
        }
        other => NormalizingComparator.normalize(other).into_key(),
    }
}

fn normalize_text(raw: &str) -> NormalizedValue {
    let t = raw.trim();
    if t.is_empty() {
        return NormalizedValue::Null;
    }
    if let Some(n) = canonical_decimal(t) {
        return NormalizedValue::Number(n);
    }
    if let Some(d) = parse_date_text(t) {
        return NormalizedValue::Date(d);
    }
    if t.eq_ignore_ascii_case("true") {
        return NormalizedValue::Bool(true);
    }
    if t.eq_ignore_ascii_case("false") {
        return NormalizedValue::Bool(false);
    }
    NormalizedValue::Text(t.to_string())
}

fn parse_date_text(t: &str) -> Option<NaiveDate> {
    for fmt in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(t, fmt) {
            return Some(d);
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(t, fmt) {
            if dt.time() == NaiveTime::MIN {
                return Some(dt.date());
            }
        }
    }
    None
}

/// Canonical decimal form of a plain decimal literal, or `None` if `s` is not one.
///
/// Accepts an optional sign, digits and an optional fractional part (no
/// exponent). Leading integer zeros and trailing fractional zeros are dropped,
/// and negative zero becomes `0`: `"007.50"` -> `"7.5"`, `"-0.0"` -> `"0"`.
pub fn canonical_decimal(s: &str) -> Option<String> {
    let s = s.trim();
    let (negative, body) = match s.as_bytes().first()? {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };

    let (int_part, frac_part) = match body.split_once('.') {
        Some((i, f)) => (i, f),
        None => (body, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit()) || !frac_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let int_trimmed = int_part.trim_start_matches('0');
    let frac_trimmed = frac_part.trim_end_matches('0');

    let mut out = String::with_capacity(s.len());
    let is_zero = int_trimmed.is_empty() && frac_trimmed.is_empty();
    if negative && !is_zero {
        out.push('-');
    }
    if int_trimmed.is_empty() {
        out.push('0');
    } else {
        out.push_str(int_trimmed);
    }
    if !frac_trimmed.is_empty() {
        out.push('.');
        out.push_str(frac_trimmed);
    }
    Some(out)
}
