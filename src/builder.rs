//! Request builders that produce [`RequestDescriptor`]s.
//!
//! A [`RequestBuilder`] owns a URL template and the path parameters gathered
//! while navigating to a resource. Its `for_*` methods stamp out descriptors
//! with the right method, default headers and body, then apply an optional
//! caller configuration.

use crate::headers::HeaderMultimap;
use crate::params::{ParamMap, ParamValue};
use crate::query::QueryParameters;
use crate::request::{RequestDescriptor, APPLICATION_JSON};
use crate::{Error, Result};
use http::Method;
use serde::Serialize;
use url::Url;

/// Per-request options supplied by the caller.
///
/// A fresh instance is handed to the configuration callback of each `for_*`
/// call. Query parameters bound from it do not replace values the builder
/// already set.
#[derive(Debug, Clone, Default)]
pub struct RequestConfiguration<Q> {
    /// Extra headers merged into the request.
    pub headers: HeaderMultimap,

    /// Typed query parameters, bound when present.
    pub query_parameters: Option<Q>,
}

impl<Q: Default> RequestConfiguration<Q> {
    /// Returns the query parameters, creating default ones on first use.
    pub fn query(&mut self) -> &mut Q {
        self.query_parameters.get_or_insert_with(Q::default)
    }
}

/// Builds descriptors for one resource path.
///
/// # Examples
///
/// ```
/// use harvest_engine::{QueryField, QueryParameters, RequestBuilder};
///
/// #[derive(Default)]
/// struct ProjectsQuery {
///     client_id: Option<u64>,
/// }
///
/// impl QueryParameters for ProjectsQuery {
///     fn query_fields() -> Vec<QueryField<Self>> {
///         vec![QueryField::new("client_id", |q: &Self| q.client_id.map(Into::into))]
///     }
/// }
///
/// let builder = RequestBuilder::new("{+baseurl}/projects{?client_id}")
///     .with_path_parameter("baseurl", "https://api.example.com/v2");
///
/// let request = builder.for_get(Some(|config: &mut harvest_engine::RequestConfiguration<ProjectsQuery>| {
///     config.query().client_id = Some(42);
/// }))?;
///
/// assert_eq!(request.uri()?.as_str(), "https://api.example.com/v2/projects?client_id=42");
/// # Ok::<(), harvest_engine::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    url_template: String,
    path_parameters: ParamMap,
    raw_url: Option<Url>,
}

impl RequestBuilder {
    /// Creates a builder for `url_template` with no path parameters.
    pub fn new(url_template: impl Into<String>) -> Self {
        Self {
            url_template: url_template.into(),
            path_parameters: ParamMap::new(),
            raw_url: None,
        }
    }

    /// Creates a builder for `url_template` that inherits `path_parameters`.
    pub fn with_parameters(url_template: impl Into<String>, path_parameters: ParamMap) -> Self {
        Self {
            url_template: url_template.into(),
            path_parameters,
            raw_url: None,
        }
    }

    /// Adds or replaces a path parameter.
    pub fn with_path_parameter(
        mut self,
        name: impl Into<String>,
        value: impl Into<ParamValue>,
    ) -> Self {
        self.path_parameters.insert(name, value);
        self
    }

    /// Returns a builder whose descriptors target `raw_url` verbatim.
    ///
    /// Useful for following pagination links returned by the API.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if `raw_url` is not an absolute URL.
    pub fn with_url(&self, raw_url: &str) -> Result<Self> {
        Ok(Self {
            url_template: self.url_template.clone(),
            path_parameters: ParamMap::new(),
            raw_url: Some(Url::parse(raw_url)?),
        })
    }

    /// Returns the URL template.
    pub fn url_template(&self) -> &str {
        &self.url_template
    }

    /// Returns the path parameters collected so far.
    pub fn path_parameters(&self) -> &ParamMap {
        &self.path_parameters
    }

    /// Builds a GET descriptor with `Accept: application/json`.
    pub fn for_get<Q, F>(&self, configure: Option<F>) -> Result<RequestDescriptor>
    where
        Q: QueryParameters + Default,
        F: FnOnce(&mut RequestConfiguration<Q>),
    {
        let mut request = self.descriptor(Method::GET);
        request.headers.add(http::header::ACCEPT.as_str(), [APPLICATION_JSON])?;
        apply_configuration(&mut request, configure)?;
        Ok(request)
    }

    /// Builds a POST descriptor carrying `body` as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingBody`] if `body` is `None`.
    pub fn for_post<B, Q, F>(&self, body: Option<&B>, configure: Option<F>) -> Result<RequestDescriptor>
    where
        B: Serialize + ?Sized,
        Q: QueryParameters + Default,
        F: FnOnce(&mut RequestConfiguration<Q>),
    {
        self.with_body(Method::POST, body, configure)
    }

    /// Builds a PATCH descriptor carrying `body` as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingBody`] if `body` is `None`.
    pub fn for_patch<B, Q, F>(&self, body: Option<&B>, configure: Option<F>) -> Result<RequestDescriptor>
    where
        B: Serialize + ?Sized,
        Q: QueryParameters + Default,
        F: FnOnce(&mut RequestConfiguration<Q>),
    {
        self.with_body(Method::PATCH, body, configure)
    }

    /// Builds a PUT descriptor carrying `body` as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingBody`] if `body` is `None`.
    pub fn for_put<B, Q, F>(&self, body: Option<&B>, configure: Option<F>) -> Result<RequestDescriptor>
    where
        B: Serialize + ?Sized,
        Q: QueryParameters + Default,
        F: FnOnce(&mut RequestConfiguration<Q>),
    {
        self.with_body(Method::PUT, body, configure)
    }

    /// Builds a DELETE descriptor. No `Accept` header is added.
    pub fn for_delete<Q, F>(&self, configure: Option<F>) -> Result<RequestDescriptor>
    where
        Q: QueryParameters + Default,
        F: FnOnce(&mut RequestConfiguration<Q>),
    {
        let mut request = self.descriptor(Method::DELETE);
        apply_configuration(&mut request, configure)?;
        Ok(request)
    }

    fn with_body<B, Q, F>(
        &self,
        method: Method,
        body: Option<&B>,
        configure: Option<F>,
    ) -> Result<RequestDescriptor>
    where
        B: Serialize + ?Sized,
        Q: QueryParameters + Default,
        F: FnOnce(&mut RequestConfiguration<Q>),
    {
        let body = body.ok_or(Error::MissingBody)?;
        let mut request = self.descriptor(method);
        request.headers.add(http::header::ACCEPT.as_str(), [APPLICATION_JSON])?;
        request.set_json_content(body)?;
        apply_configuration(&mut request, configure)?;
        Ok(request)
    }

    fn descriptor(&self, method: Method) -> RequestDescriptor {
        let mut request = RequestDescriptor::new(method, self.url_template.clone());
        match &self.raw_url {
            Some(url) => request.set_uri(url.clone()),
            None => request.path_parameters = self.path_parameters.clone(),
        }
        request
    }
}

fn apply_configuration<Q, F>(request: &mut RequestDescriptor, configure: Option<F>) -> Result<()>
where
    Q: QueryParameters + Default,
    F: FnOnce(&mut RequestConfiguration<Q>),
{
    let Some(configure) = configure else {
        return Ok(());
    };
    let mut config = RequestConfiguration::<Q>::default();
    configure(&mut config);

    if let Some(query) = &config.query_parameters {
        if matches!(request.uri_mode(), crate::request::UriMode::Template) {
            request.add_query_parameters(query);
        }
    }
    request.headers.merge_from(&config.headers);
    Ok(())
}

/// Type of the configuration callback for requests without query parameters.
pub type NoConfiguration = fn(&mut RequestConfiguration<()>);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryField;
    use serde_json::json;

    #[derive(Default)]
    struct ClientsQuery {
        is_active: Option<bool>,
        page: Option<u32>,
    }

    impl QueryParameters for ClientsQuery {
        fn query_fields() -> Vec<QueryField<Self>> {
            vec![
                QueryField::new("is_active", |q: &Self| q.is_active.map(Into::into)),
                QueryField::new("page", |q: &Self| q.page.map(Into::into)),
            ]
        }
    }

    fn clients() -> RequestBuilder {
        RequestBuilder::new("{+baseurl}/clients{?is_active,page}")
            .with_path_parameter("baseurl", "https://api.example.com/v2")
    }

    #[test]
    fn test_get_sets_accept_header() {
        let request = clients().for_get::<(), NoConfiguration>(None).unwrap();
        assert_eq!(request.method, Method::GET);
        assert!(request.headers.get("accept").unwrap().contains(APPLICATION_JSON));
        assert!(request.content.is_none());
    }

    #[test]
    fn test_delete_has_no_accept_header() {
        let request = clients().for_delete::<(), NoConfiguration>(None).unwrap();
        assert_eq!(request.method, Method::DELETE);
        assert!(!request.headers.contains_key("Accept"));
    }

    #[test]
    fn test_post_requires_body() {
        let result = clients().for_post::<serde_json::Value, (), NoConfiguration>(None, None);
        assert!(matches!(result, Err(Error::MissingBody)));

        let result = clients().for_patch::<serde_json::Value, (), NoConfiguration>(None, None);
        assert!(matches!(result, Err(Error::MissingBody)));
    }

    #[test]
    fn test_post_serializes_body() {
        let body = json!({ "name": "Acme", "currency": null });
        let request = clients()
            .for_post::<_, (), NoConfiguration>(Some(&body), None)
            .unwrap();

        assert_eq!(request.method, Method::POST);
        assert!(request.headers.contains_key("content-type"));
        assert!(request.headers.contains_key("accept"));
        assert_eq!(request.content.as_deref(), Some(br#"{"name":"Acme"}"#.as_slice()));
    }

    #[test]
    fn test_configuration_binds_query_and_merges_headers() {
        let request = clients()
            .for_get(Some(|config: &mut RequestConfiguration<ClientsQuery>| {
                config.query().is_active = Some(true);
                config.query().page = Some(2);
                config.headers.add("Accept", ["text/csv"]).unwrap();
            }))
            .unwrap();

        assert_eq!(
            request.uri().unwrap().as_str(),
            "https://api.example.com/v2/clients?is_active=true&page=2"
        );
        assert_eq!(request.headers.get("accept").unwrap().len(), 2);
    }

    #[test]
    fn test_with_url_uses_absolute_uri() {
        let next = clients()
            .with_url("https://api.example.com/v2/clients?page=3&per_page=100")
            .unwrap();
        let request = next
            .for_get(Some(|config: &mut RequestConfiguration<ClientsQuery>| {
                config.query().page = Some(7);
            }))
            .unwrap();

        assert!(request.path_parameters.is_empty());
        assert!(request.query_parameters.is_empty());
        assert_eq!(
            request.uri().unwrap().as_str(),
            "https://api.example.com/v2/clients?page=3&per_page=100"
        );
    }

    #[test]
    fn test_builder_path_parameters_are_copied() {
        let builder = RequestBuilder::with_parameters(
            "{+baseurl}/clients/{client_id}",
            clients().path_parameters().clone(),
        )
        .with_path_parameter("client_id", 5u64);

        let request = builder.for_get::<(), NoConfiguration>(None).unwrap();
        assert_eq!(
            request.uri().unwrap().as_str(),
            "https://api.example.com/v2/clients/5"
        );
        assert_eq!(builder.url_template(), "{+baseurl}/clients/{client_id}");
    }
}
