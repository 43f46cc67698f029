//! Declarative query-parameter binding.
//!
//! A query configuration type lists its fields once through
//! [`QueryParameters::query_fields`]. [`bind`] walks that list in order and
//! copies each non-empty value into a request's query map, keeping any value
//! already bound under the same wire name.
//!
//! ```
//! use harvest_engine::{bind, ParamMap, QueryField, QueryParameters};
//!
//! #[derive(Default)]
//! struct ClientsQuery {
//!     is_active: Option<bool>,
//!     page: Option<u32>,
//! }
//!
//! impl QueryParameters for ClientsQuery {
//!     fn query_fields() -> Vec<QueryField<Self>> {
//!         vec![
//!             QueryField::new("is_active", |q: &Self| q.is_active.map(Into::into)),
//!             QueryField::new("Page", |q: &Self| q.page.map(Into::into)),
//!         ]
//!     }
//! }
//!
//! let mut target = ParamMap::new();
//! bind(&ClientsQuery { is_active: None, page: Some(2) }, &mut target);
//! assert_eq!(target.get("page").map(|v| v.sanitize()), Some("2".to_string()));
//! assert!(!target.contains_key("is_active"));
//! ```

use crate::params::{ParamMap, ParamValue};
use std::borrow::Cow;
use std::fmt;

/// Describes one bindable field of a query configuration type.
pub struct QueryField<Q> {
    name: &'static str,
    wire_name: Option<&'static str>,
    accessor: fn(&Q) -> Option<ParamValue>,
}

impl<Q> QueryField<Q> {
    /// Declares a field whose wire name derives from `name`.
    ///
    /// The derived wire name is `name` with its first letter lowercased.
    pub fn new(name: &'static str, accessor: fn(&Q) -> Option<ParamValue>) -> Self {
        Self {
            name,
            wire_name: None,
            accessor,
        }
    }

    /// Overrides the wire name.
    pub fn wire_name(mut self, wire_name: &'static str) -> Self {
        self.wire_name = Some(wire_name);
        self
    }

    /// Returns the declared field name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the name this field is sent under.
    pub fn resolved_wire_name(&self) -> Cow<'static, str> {
        match self.wire_name {
            Some(wire) => Cow::Borrowed(wire),
            None => lowercase_first(self.name),
        }
    }

    /// Reads the field's value from `params`.
    pub fn value(&self, params: &Q) -> Option<ParamValue> {
        (self.accessor)(params)
    }
}

impl<Q> Clone for QueryField<Q> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Q> Copy for QueryField<Q> {}

impl<Q> fmt::Debug for QueryField<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryField")
            .field("name", &self.name)
            .field("wire_name", &self.resolved_wire_name())
            .finish()
    }
}

/// A typed set of query parameters with a declared field list.
pub trait QueryParameters {
    /// Returns the bindable fields in declaration order.
    fn query_fields() -> Vec<QueryField<Self>>
    where
        Self: Sized;
}

/// For requests that take no query parameters.
impl QueryParameters for () {
    fn query_fields() -> Vec<QueryField<Self>> {
        Vec::new()
    }
}

/// Copies the non-empty fields of `params` into `target`.
///
/// Absent values, empty strings and empty lists are skipped. A wire name that
/// already has a value in `target` is left untouched, so whichever layer binds
/// first wins. Returns the number of values inserted.
pub fn bind<Q: QueryParameters>(params: &Q, target: &mut ParamMap) -> usize {
    let mut bound = 0;
    for field in Q::query_fields() {
        let Some(value) = field.value(params) else {
            continue;
        };
        if value.is_empty() {
            continue;
        }
        let wire_name = field.resolved_wire_name();
        if target.contains_key(&wire_name) {
            continue;
        }
        target.insert(wire_name.into_owned(), value);
        bound += 1;
    }
    bound
}

fn lowercase_first(name: &'static str) -> Cow<'static, str> {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_uppercase() => {
            Cow::Owned(first.to_lowercase().chain(chars).collect())
        }
        _ => Cow::Borrowed(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    #[derive(Default)]
    struct TimeEntriesQuery {
        user_id: Option<u64>,
        is_running: Option<bool>,
        from: Option<String>,
        updated_since: Option<DateTime<Utc>>,
        project_ids: Vec<u64>,
        page: Option<u32>,
    }

    impl QueryParameters for TimeEntriesQuery {
        fn query_fields() -> Vec<QueryField<Self>> {
            vec![
                QueryField::new("UserId", |q: &Self| q.user_id.map(Into::into)).wire_name("user_id"),
                QueryField::new("IsRunning", |q: &Self| q.is_running.map(Into::into))
                    .wire_name("is_running"),
                QueryField::new("From", |q: &Self| q.from.clone().map(Into::into)),
                QueryField::new("updated_since", |q: &Self| q.updated_since.map(Into::into)),
                QueryField::new("ProjectIds", |q: &Self| Some(q.project_ids.clone().into()))
                    .wire_name("project_ids"),
                QueryField::new("Page", |q: &Self| q.page.map(Into::into)),
            ]
        }
    }

    #[test]
    fn test_default_wire_name_lowercases_first_letter() {
        let fields = TimeEntriesQuery::query_fields();
        let names: Vec<_> = fields.iter().map(|f| f.resolved_wire_name()).collect();
        assert_eq!(
            names,
            vec!["user_id", "is_running", "from", "updated_since", "project_ids", "page"]
        );
    }

    #[test]
    fn test_skips_absent_and_empty_values() {
        let query = TimeEntriesQuery {
            from: Some(String::new()),
            is_running: Some(false),
            ..Default::default()
        };
        let mut target = ParamMap::new();
        let bound = bind(&query, &mut target);

        assert_eq!(bound, 1);
        assert_eq!(target.get("is_running"), Some(&ParamValue::Bool(false)));
        assert!(!target.contains_key("from"));
        assert!(!target.contains_key("project_ids"));
    }

    #[test]
    fn test_first_writer_wins() {
        let mut target = ParamMap::new();
        bind(
            &TimeEntriesQuery {
                page: Some(2),
                ..Default::default()
            },
            &mut target,
        );
        bind(
            &TimeEntriesQuery {
                page: Some(5),
                user_id: Some(9),
                ..Default::default()
            },
            &mut target,
        );

        assert_eq!(target.get("page"), Some(&ParamValue::UInt(2)));
        assert_eq!(target.get("user_id"), Some(&ParamValue::UInt(9)));
    }

    #[test]
    fn test_existing_value_is_matched_case_insensitively() {
        let mut target = ParamMap::new();
        target.insert("PAGE", 1u32);
        bind(
            &TimeEntriesQuery {
                page: Some(3),
                ..Default::default()
            },
            &mut target,
        );
        assert_eq!(target.len(), 1);
        assert_eq!(target.get("page"), Some(&ParamValue::UInt(1)));
    }

    #[test]
    fn test_binds_in_declaration_order() {
        let query = TimeEntriesQuery {
            user_id: Some(1),
            updated_since: Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()),
            project_ids: vec![3, 4],
            page: Some(1),
            ..Default::default()
        };
        let mut target = ParamMap::new();
        bind(&query, &mut target);

        let names: Vec<_> = target.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(names, vec!["user_id", "updated_since", "project_ids", "page"]);
        assert_eq!(target.get("project_ids").unwrap().sanitize(), "3,4");
    }

    #[test]
    fn test_unit_binds_nothing() {
        let mut target = ParamMap::new();
        assert_eq!(bind(&(), &mut target), 0);
    }
}
