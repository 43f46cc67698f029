//! Typed path and query parameter values.
//!
//! Values keep their type until the URI is resolved, at which point
//! [`ParamValue::sanitize`] renders them in the wire format the API expects.

use chrono::{DateTime, FixedOffset, NaiveDate, SecondsFormat, Utc};
use std::fmt;

/// A path or query parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Rendered as lowercase `true` / `false`.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// An unsigned integer.
    UInt(u64),
    /// A floating point number.
    Float(f64),
    /// A plain string.
    Str(String),
    /// An instant, rendered as RFC 3339 with `Z` for UTC offsets.
    DateTime(DateTime<FixedOffset>),
    /// A calendar date, rendered as `YYYY-MM-DD`.
    Date(NaiveDate),
    /// A list of already-rendered items, joined with commas on the wire.
    List(Vec<String>),
}

impl ParamValue {
    /// Renders the value in its wire form.
    ///
    /// Date-times keep as many fractional second digits as they carry, so
    /// parsing the output recovers the same instant.
    ///
    /// ```
    /// use harvest_engine::ParamValue;
    /// use chrono::{TimeZone, Utc};
    ///
    /// assert_eq!(ParamValue::from(true).sanitize(), "true");
    ///
    /// let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
    /// assert_eq!(ParamValue::from(at).sanitize(), "2024-03-01T09:30:00Z");
    /// ```
    pub fn sanitize(&self) -> String {
        match self {
            ParamValue::Bool(true) => "true".to_string(),
            ParamValue::Bool(false) => "false".to_string(),
            ParamValue::Int(n) => n.to_string(),
            ParamValue::UInt(n) => n.to_string(),
            ParamValue::Float(n) => n.to_string(),
            ParamValue::Str(s) => s.clone(),
            ParamValue::DateTime(dt) => dt.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            ParamValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            ParamValue::List(items) => items.join(","),
        }
    }

    /// Returns `true` for empty strings and empty lists.
    ///
    /// Such values are never bound as query parameters.
    pub fn is_empty(&self) -> bool {
        match self {
            ParamValue::Str(s) => s.is_empty(),
            ParamValue::List(items) => items.is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sanitize())
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(value.into())
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        ParamValue::UInt(value.into())
    }
}

impl From<u64> for ParamValue {
    fn from(value: u64) -> Self {
        ParamValue::UInt(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Str(value)
    }
}

impl From<DateTime<FixedOffset>> for ParamValue {
    fn from(value: DateTime<FixedOffset>) -> Self {
        ParamValue::DateTime(value)
    }
}

impl From<DateTime<Utc>> for ParamValue {
    fn from(value: DateTime<Utc>) -> Self {
        ParamValue::DateTime(value.fixed_offset())
    }
}

impl From<NaiveDate> for ParamValue {
    fn from(value: NaiveDate) -> Self {
        ParamValue::Date(value)
    }
}

impl<T: ToString> From<Vec<T>> for ParamValue {
    fn from(value: Vec<T>) -> Self {
        ParamValue::List(value.iter().map(ToString::to_string).collect())
    }
}

/// An insertion-ordered parameter map with case-insensitive names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamMap {
    entries: Vec<(String, ParamValue)>,
}

impl ParamMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a value, returning the previous one.
    ///
    /// A replaced entry keeps its original position and spelling.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<ParamValue>,
    ) -> Option<ParamValue> {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(index) => Some(std::mem::replace(&mut self.entries[index].1, value)),
            None => {
                self.entries.push((name, value));
                None
            }
        }
    }

    /// Returns the value stored under `name`.
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.position(name).map(|index| &self.entries[index].1)
    }

    /// Returns `true` if `name` has a value.
    pub fn contains_key(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Removes and returns the value stored under `name`.
    pub fn remove(&mut self, name: &str) -> Option<ParamValue> {
        self.position(name)
            .map(|index| self.entries.remove(index).1)
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(name))
    }
}

impl<K, V> FromIterator<(K, V)> for ParamMap
where
    K: Into<String>,
    V: Into<ParamValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = ParamMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}
