//! Response wrapper that preserves both parsed data and raw response details.
//!
//! The [`Response`] type wraps the deserialized body of an API call along with
//! the status, headers, latency and raw body of the exchange.

use http::{HeaderMap, StatusCode};
use std::time::Duration;

/// A successful API response.
///
/// # Examples
///
/// ```no_run
/// use harvest_engine::{RequestAdapter, RequestBuilder, StaticTokenCredential};
/// use serde::Deserialize;
/// use tokio_util::sync::CancellationToken;
///
/// #[derive(Deserialize)]
/// struct Me {
///     id: u64,
///     first_name: String,
/// }
///
/// # async fn example() -> Result<(), harvest_engine::Error> {
/// let adapter = RequestAdapter::builder()
///     .credential(StaticTokenCredential::new("token")?)
///     .account_id("12345")
///     .build()?;
///
/// let request = RequestBuilder::new("{+baseurl}/users/me")
///     .for_get::<(), harvest_engine::NoConfiguration>(None)?;
/// let me = adapter.send::<Me>(request, &CancellationToken::new()).await?;
///
/// println!("Hello {} ({})", me.first_name, me.id);
/// println!("Request took {:?}", me.latency);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Response<T> {
    /// The deserialized response data.
    pub data: T,

    /// The raw response body as a string.
    ///
    /// This is useful for debugging, logging, or when you need to inspect
    /// the exact response from the server.
    pub raw_body: String,

    /// The HTTP status code of the response.
    pub status: StatusCode,

    /// The response headers.
    pub headers: HeaderMap,

    /// Time from authorization until the response body was read.
    pub latency: Duration,
}

impl<T> Response<T> {
    /// Creates a new `Response`.
    pub fn new(
        data: T,
        raw_body: String,
        status: StatusCode,
        headers: HeaderMap,
        latency: Duration,
    ) -> Self {
        Self {
            data,
            raw_body,
            status,
            headers,
            latency,
        }
    }

    /// Maps the response data to a different type using the provided function.
    ///
    /// This is useful when you want to transform the response data while
    /// preserving the metadata.
    ///
    /// # Examples
    ///
    /// ```
    /// # use harvest_engine::Response;
    /// # use http::{HeaderMap, StatusCode};
    /// # use std::time::Duration;
    /// let response = Response::new(
    ///     42,
    ///     "42".to_string(),
    ///     StatusCode::OK,
    ///     HeaderMap::new(),
    ///     Duration::from_millis(100),
    /// );
    ///
    /// let string_response = response.map(|n| n.to_string());
    /// assert_eq!(string_response.data, "42");
    /// ```
    pub fn map<U, F>(self, f: F) -> Response<U>
    where
        F: FnOnce(T) -> U,
    {
        Response {
            data: f(self.data),
            raw_body: self.raw_body,
            status: self.status,
            headers: self.headers,
            latency: self.latency,
        }
    }

    /// Returns a reference to a header value by name.
    ///
    /// # Examples
    ///
    /// ```
    /// # use harvest_engine::Response;
    /// # use http::{HeaderMap, StatusCode, HeaderValue};
    /// # use std::time::Duration;
    /// let mut headers = HeaderMap::new();
    /// headers.insert("x-total-pages", HeaderValue::from_static("3"));
    ///
    /// let response = Response::new(
    ///     (),
    ///     String::new(),
    ///     StatusCode::OK,
    ///     headers,
    ///     Duration::from_millis(100),
    /// );
    ///
    /// assert_eq!(response.header("X-Total-Pages"), Some("3"));
    /// ```
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }
}

impl<T> AsRef<T> for Response<T> {
    fn as_ref(&self) -> &T {
        &self.data
    }
}

impl<T> std::ops::Deref for Response<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}
