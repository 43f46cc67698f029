//! The request descriptor handed from builders to the adapter.

use crate::headers::HeaderMultimap;
use crate::params::{ParamMap, ParamValue};
use crate::query::{self, QueryParameters};
use crate::template::{self, BASE_URL_PARAM};
use crate::{Error, Result};
use http::Method;
use serde::Serialize;
use url::Url;

/// `Content-Type` / `Accept` value for JSON payloads.
pub const APPLICATION_JSON: &str = "application/json";

/// How a descriptor's final URI is produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UriMode {
    /// Expand the URL template against the path and query maps.
    Template,
    /// Use this absolute URI verbatim.
    Absolute(Url),
}

/// Everything needed to send one API request.
///
/// The URI is computed on demand from the template and parameter maps, so
/// parameters added after construction are picked up by the next call to
/// [`RequestDescriptor::uri`].
///
/// # Examples
///
/// ```
/// use harvest_engine::RequestDescriptor;
/// use http::Method;
///
/// let mut request = RequestDescriptor::new(Method::GET, "{+baseurl}/clients{?is_active,page}");
/// request.path_parameters.insert("baseurl", "https://api.example.com/v2");
/// request.query_parameters.insert("is_active", true);
/// request.query_parameters.insert("page", 2u32);
///
/// assert_eq!(
///     request.uri()?.as_str(),
///     "https://api.example.com/v2/clients?is_active=true&page=2"
/// );
/// # Ok::<(), harvest_engine::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    /// The HTTP method.
    pub method: Method,

    /// The URI template, e.g. `{+baseurl}/clients{?is_active,page}`.
    pub url_template: String,

    /// Values for path expressions in the template.
    pub path_parameters: ParamMap,

    /// Values for query expressions in the template.
    pub query_parameters: ParamMap,

    /// Request headers.
    pub headers: HeaderMultimap,

    /// The serialized request body, if any.
    pub content: Option<Vec<u8>>,

    uri_mode: UriMode,
}

impl RequestDescriptor {
    /// Creates a descriptor with empty parameter maps and no body.
    pub fn new(method: Method, url_template: impl Into<String>) -> Self {
        Self {
            method,
            url_template: url_template.into(),
            path_parameters: ParamMap::new(),
            query_parameters: ParamMap::new(),
            headers: HeaderMultimap::new(),
            content: None,
            uri_mode: UriMode::Template,
        }
    }

    /// Returns how the URI is produced.
    pub fn uri_mode(&self) -> &UriMode {
        &self.uri_mode
    }

    /// Pins the request to an absolute URI.
    ///
    /// The path and query maps are cleared; the template is ignored from now on.
    pub fn set_uri(&mut self, uri: Url) {
        self.path_parameters.clear();
        self.query_parameters.clear();
        self.uri_mode = UriMode::Absolute(uri);
    }

    /// Computes the final request URI.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingBaseUrl`] if the template needs `baseurl` and it
    /// is not set, or a template/URL error if expansion fails.
    pub fn uri(&self) -> Result<Url> {
        match &self.uri_mode {
            UriMode::Absolute(uri) => Ok(uri.clone()),
            UriMode::Template => template::resolve(
                &self.url_template,
                &self.path_parameters,
                &self.query_parameters,
            ),
        }
    }

    /// Sets the `baseurl` path parameter unless one is already present.
    ///
    /// Has no effect on a descriptor pinned to an absolute URI.
    pub fn ensure_base_url(&mut self, base_url: &str) {
        if self.uri_mode == UriMode::Template && !self.path_parameters.contains_key(BASE_URL_PARAM) {
            self.path_parameters
                .insert(BASE_URL_PARAM, ParamValue::from(base_url.trim_end_matches('/')));
        }
    }

    /// Binds a typed query configuration into the query map.
    ///
    /// Values already present in the map are kept.
    pub fn add_query_parameters<Q: QueryParameters>(&mut self, params: &Q) -> usize {
        query::bind(params, &mut self.query_parameters)
    }

    /// Serializes `body` as JSON and sets `Content-Type: application/json`.
    ///
    /// Object fields whose value is `null` are dropped from the payload.
    ///
    /// Date-times are written exactly as their `Serialize` impl renders them.
    /// Declare body instants as `DateTime<Utc>` to send them in UTC; a
    /// `DateTime<FixedOffset>` keeps its offset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SerializationFailed`] if `body` cannot be serialized.
    pub fn set_json_content<B: Serialize + ?Sized>(&mut self, body: &B) -> Result<()> {
        let mut value =
            serde_json::to_value(body).map_err(|e| Error::SerializationFailed(e.to_string()))?;
        strip_nulls(&mut value);
        let bytes =
            serde_json::to_vec(&value).map_err(|e| Error::SerializationFailed(e.to_string()))?;
        self.content = Some(bytes);
        self.headers.set(http::header::CONTENT_TYPE.as_str(), APPLICATION_JSON)
    }
}

fn strip_nulls(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            map.values_mut().for_each(strip_nulls);
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(strip_nulls),
        _ => {}
    }
}
