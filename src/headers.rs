//! Case-insensitive, multi-valued request headers.

use crate::{Error, Result};
use http::{HeaderMap, HeaderName, HeaderValue};
use std::collections::{BTreeSet, HashMap};
use std::hash::{Hash, Hasher};

/// A header name compared and hashed without regard to ASCII case.
///
/// The spelling used when the name was first added is kept for display.
#[derive(Debug, Clone)]
struct HeaderKey(String);

impl PartialEq for HeaderKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for HeaderKey {}

impl Hash for HeaderKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for byte in self.0.bytes() {
            state.write_u8(byte.to_ascii_lowercase());
        }
    }
}

/// Request headers keyed case-insensitively, each holding a set of values.
///
/// Duplicate values under one name collapse into one. A name whose last
/// value is removed disappears from the map.
///
/// # Examples
///
/// ```
/// use harvest_engine::HeaderMultimap;
///
/// let mut headers = HeaderMultimap::new();
/// headers.add("accept", ["application/json"])?;
/// headers.add("Accept", ["text/plain"])?;
///
/// assert_eq!(headers.len(), 1);
/// assert_eq!(headers.get("ACCEPT").map(|v| v.len()), Some(2));
/// # Ok::<(), harvest_engine::Error>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMultimap {
    entries: HashMap<HeaderKey, BTreeSet<String>>,
}

impl HeaderMultimap {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends values under `name`. An empty value list is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `name` is empty.
    pub fn add<I, V>(&mut self, name: &str, values: I) -> Result<()>
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        check_name(name)?;
        let mut values = values.into_iter().map(Into::into).peekable();
        if values.peek().is_none() {
            return Ok(());
        }
        self.entries
            .entry(HeaderKey(name.to_string()))
            .or_default()
            .extend(values);
        Ok(())
    }

    /// Replaces every value under `name` with `value`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `name` is empty.
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> Result<()> {
        self.remove_all(name)?;
        self.add(name, [value])
    }

    /// Removes a single value. Returns `true` if it was present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `name` is empty.
    pub fn remove(&mut self, name: &str, value: &str) -> Result<bool> {
        check_name(name)?;
        let key = HeaderKey(name.to_string());
        let Some(values) = self.entries.get_mut(&key) else {
            return Ok(false);
        };
        let removed = values.remove(value);
        if values.is_empty() {
            self.entries.remove(&key);
        }
        Ok(removed)
    }

    /// Removes `name` and all of its values. Returns `true` if it was present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `name` is empty.
    pub fn remove_all(&mut self, name: &str) -> Result<bool> {
        check_name(name)?;
        Ok(self.entries.remove(&HeaderKey(name.to_string())).is_some())
    }

    /// Adds every value from `other` into this map.
    pub fn merge_from(&mut self, other: &HeaderMultimap) {
        for (key, values) in &other.entries {
            self.entries
                .entry(key.clone())
                .or_default()
                .extend(values.iter().cloned());
        }
    }

    /// Returns the values stored under `name`, if any.
    pub fn get(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.entries.get(&HeaderKey(name.to_string()))
    }

    /// Returns `true` if `name` has at least one value.
    pub fn contains_key(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Returns the number of distinct header names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no headers are set.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over header names and their value sets.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.entries.iter().map(|(k, v)| (k.0.as_str(), v))
    }

    /// Converts into an [`http::HeaderMap`], one entry per value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if a name or value is not valid HTTP.
    pub fn to_header_map(&self) -> Result<HeaderMap> {
        let mut map = HeaderMap::new();
        for (name, values) in self.iter() {
            let name = HeaderName::try_from(name)
                .map_err(|e| Error::InvalidArgument(format!("Invalid header name: {}", e)))?;
            for value in values {
                let value = HeaderValue::try_from(value.as_str())
                    .map_err(|e| Error::InvalidArgument(format!("Invalid header value: {}", e)))?;
                map.append(name.clone(), value);
            }
        }
        Ok(map)
    }
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidArgument(
            "header name must not be empty".to_string(),
        ));
    }
    Ok(())
}
