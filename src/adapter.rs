//! The request adapter: authorizes descriptors and hands them to a transport.
//!
//! The [`RequestAdapter`] type is the main entry point for sending requests.
//! Use [`RequestAdapterBuilder`] to configure and create adapters.

use crate::auth::AuthCredential;
use crate::headers::HeaderMultimap;
use crate::request::RequestDescriptor;
use crate::transport::{ReqwestTransport, Transport, TransportRequest, TransportResponse};
use crate::{Error, Response, Result};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Base URL of the Harvest v2 API.
pub const DEFAULT_BASE_URL: &str = "https://api.harvestapp.com/v2";

/// `User-Agent` sent when none is configured.
pub const DEFAULT_USER_AGENT: &str = concat!("harvest-engine/", env!("CARGO_PKG_VERSION"));

/// Header naming the Harvest account a request acts on.
pub const ACCOUNT_ID_HEADER: &str = "Harvest-Account-Id";

/// Sends [`RequestDescriptor`]s on behalf of a credential.
///
/// The adapter is cheap to clone and meant to be shared. Each call fills in
/// the `baseurl` path parameter, adds the default headers, authorizes the
/// request, resolves its URI and sends it exactly once.
///
/// # Examples
///
/// ```no_run
/// use harvest_engine::{RequestAdapter, RequestBuilder, StaticTokenCredential};
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), harvest_engine::Error> {
/// let adapter = RequestAdapter::builder()
///     .credential(StaticTokenCredential::new("personal-access-token")?)
///     .account_id("12345")
///     .user_agent("MyApp (me@example.com)")
///     .timeout(Duration::from_secs(30))
///     .build()?;
///
/// let request = RequestBuilder::new("{+baseurl}/company")
///     .for_get::<(), harvest_engine::NoConfiguration>(None)?;
/// let company = adapter
///     .send::<serde_json::Value>(request, &CancellationToken::new())
///     .await?;
/// println!("{}", company.data["name"]);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RequestAdapter {
    inner: Arc<AdapterInner>,
}

struct AdapterInner {
    transport: Arc<dyn Transport>,
    credential: Arc<dyn AuthCredential>,
    base_url: String,
    default_headers: HeaderMultimap,
}

impl RequestAdapter {
    /// Creates a new `RequestAdapterBuilder`.
    pub fn builder() -> RequestAdapterBuilder {
        RequestAdapterBuilder::new()
    }

    /// Returns the base URL substituted for `{+baseurl}`.
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Authorizes `request` and turns it into a transport request.
    ///
    /// The URI and headers are validated before the credential runs, so a
    /// misconfigured request never triggers a token refresh.
    ///
    /// # Errors
    ///
    /// Configuration errors (missing base URL, bad headers) and authentication
    /// errors from the credential.
    pub async fn prepare(
        &self,
        mut request: RequestDescriptor,
        cancel: &CancellationToken,
    ) -> Result<TransportRequest> {
        request.ensure_base_url(&self.inner.base_url);
        for (name, values) in self.inner.default_headers.iter() {
            if !request.headers.contains_key(name) {
                request.headers.add(name, values.iter().cloned())?;
            }
        }

        let uri = request.uri()?;
        request.headers.to_header_map()?;

        self.inner.credential.authorize(&mut request, cancel).await?;

        Ok(TransportRequest {
            uri,
            headers: request.headers.to_header_map()?,
            method: request.method,
            body: request.content,
        })
    }

    /// Sends `request` and deserializes the JSON response body.
    ///
    /// # Errors
    ///
    /// Besides configuration and authentication errors, returns
    /// [`Error::HttpError`] for non-2xx statuses and
    /// [`Error::DeserializationFailed`] when the body does not match `T`.
    pub async fn send<T>(&self, request: RequestDescriptor, cancel: &CancellationToken) -> Result<Response<T>>
    where
        T: DeserializeOwned,
    {
        let (response, latency) = self.execute(request, cancel).await?;
        let raw_body = String::from_utf8_lossy(&response.body).into_owned();

        match serde_json::from_str::<T>(&raw_body) {
            Ok(data) => Ok(Response::new(
                data,
                raw_body,
                response.status,
                response.headers,
                latency,
            )),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    raw_response = %raw_body,
                    "Failed to deserialize response"
                );

                Err(Error::DeserializationFailed {
                    raw_response: raw_body,
                    serde_error: e.to_string(),
                    status: response.status,
                })
            }
        }
    }

    /// Sends `request` and ignores the response body.
    ///
    /// Intended for calls such as DELETE that answer without content.
    pub async fn send_no_content(
        &self,
        request: RequestDescriptor,
        cancel: &CancellationToken,
    ) -> Result<Response<()>> {
        let (response, latency) = self.execute(request, cancel).await?;
        let raw_body = String::from_utf8_lossy(&response.body).into_owned();
        Ok(Response::new(
            (),
            raw_body,
            response.status,
            response.headers,
            latency,
        ))
    }

    async fn execute(
        &self,
        request: RequestDescriptor,
        cancel: &CancellationToken,
    ) -> Result<(TransportResponse, Duration)> {
        let start_time = Instant::now();
        let request = self.prepare(request, cancel).await?;
        let method = request.method.clone();

        tracing::debug!(
            method = %request.method,
            url = %request.uri,
            "Executing HTTP request"
        );

        let response = self.inner.transport.send(request, cancel).await?;
        let latency = start_time.elapsed();
        let status = response.status;

        tracing::info!(
            status = status.as_u16(),
            latency_ms = latency.as_millis(),
            method = %method,
            "Received HTTP response"
        );

        if !status.is_success() {
            let raw_response = String::from_utf8_lossy(&response.body).into_owned();

            if status.is_client_error() {
                tracing::error!(
                    status = status.as_u16(),
                    response = %raw_response,
                    "Client error (4xx)"
                );
            } else if status.is_server_error() {
                tracing::warn!(
                    status = status.as_u16(),
                    response = %raw_response,
                    "Server error (5xx)"
                );
            }

            return Err(Error::HttpError {
                status,
                raw_response,
                headers: response.headers,
            });
        }

        Ok((response, latency))
    }
}

/// Builder for configuring and creating a [`RequestAdapter`].
pub struct RequestAdapterBuilder {
    base_url: String,
    user_agent: String,
    account_id: Option<String>,
    default_headers: HeaderMultimap,
    timeout: Option<Duration>,
    credential: Option<Arc<dyn AuthCredential>>,
    transport: Option<Arc<dyn Transport>>,
}

impl RequestAdapterBuilder {
    /// Creates a builder targeting [`DEFAULT_BASE_URL`].
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            account_id: None,
            default_headers: HeaderMultimap::new(),
            timeout: None,
            credential: None,
            transport: None,
        }
    }

    /// Sets the base URL substituted for `{+baseurl}`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        let url = Url::parse(url.as_ref())?;
        self.base_url = url.as_str().trim_end_matches('/').to_string();
        Ok(self)
    }

    /// Sets the `User-Agent` header.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets the `Harvest-Account-Id` header.
    pub fn account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    /// Adds a default header included in every request that does not set it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `name` is empty.
    pub fn default_header(mut self, name: &str, value: impl Into<String>) -> Result<Self> {
        self.default_headers.add(name, [value])?;
        Ok(self)
    }

    /// Sets the request timeout of the default transport.
    ///
    /// Ignored when a custom transport is supplied.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the credential that authorizes requests.
    pub fn credential(mut self, credential: impl AuthCredential + 'static) -> Self {
        self.credential = Some(Arc::new(credential));
        self
    }

    /// Replaces the default `reqwest` transport.
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Builds the configured `RequestAdapter`.
    ///
    /// # Errors
    ///
    /// Returns an error if no credential was provided or the default
    /// transport cannot be built.
    pub fn build(self) -> Result<RequestAdapter> {
        let credential = self
            .credential
            .ok_or_else(|| Error::ConfigurationError("A credential is required".to_string()))?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => {
                let mut transport = ReqwestTransport::new()?;
                if let Some(timeout) = self.timeout {
                    transport = transport.timeout(timeout);
                }
                Arc::new(transport)
            }
        };

        let mut default_headers = self.default_headers;
        default_headers.set(http::header::USER_AGENT.as_str(), self.user_agent)?;
        if let Some(account_id) = self.account_id {
            default_headers.set(ACCOUNT_ID_HEADER, account_id)?;
        }

        Ok(RequestAdapter {
            inner: Arc::new(AdapterInner {
                transport,
                credential,
                base_url: self.base_url,
                default_headers,
            }),
        })
    }
}

impl Default for RequestAdapterBuilder {
    fn default() -> Self {
        Self::new()
    }
}
