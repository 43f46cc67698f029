//! Error types for request composition, authentication and transport.
//!
//! Errors fall into three groups. Configuration errors are raised before any
//! network activity. Authentication errors come from the credential layer.
//! Transport errors are passed through unchanged from `reqwest`.

use http::{HeaderMap, StatusCode};

/// The main error type for the engine.
///
/// # Examples
///
/// ```
/// use harvest_engine::{Error, RequestDescriptor};
/// use http::Method;
///
/// let request = RequestDescriptor::new(Method::GET, "{+baseurl}/users/me");
/// match request.uri() {
///     Err(Error::MissingBaseUrl) => {}
///     other => panic!("unexpected: {:?}", other),
/// }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The URL template references `{+baseurl}` but no `baseurl` path
    /// parameter was supplied.
    #[error("Configuration error: the URL template requires a `baseurl` path parameter")]
    MissingBaseUrl,

    /// A POST, PATCH or PUT request was built without a body.
    #[error("Configuration error: a request body is required for this method")]
    MissingBody,

    /// An argument was empty or otherwise unusable, such as an empty header name.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid configuration was provided to a builder.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// The resolved URI could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Failed to serialize the request body.
    #[error("Failed to serialize request: {0}")]
    SerializationFailed(String),

    /// The credential cannot produce a usable access token.
    ///
    /// Raised when no token has been obtained yet, or when the token has
    /// expired and there is no refresh token to renew it.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The OAuth2 dance failed.
    ///
    /// Covers redirects carrying an `error` parameter, CSRF state mismatches,
    /// redirects without an authorization code, and token endpoint rejections.
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed {
        /// Why authentication failed
        reason: String,
        /// The HTTP status returned by the token endpoint, if any
        status: Option<StatusCode>,
        /// The raw token endpoint response body, if any
        raw_response: Option<String>,
    },

    /// A network-level error from the transport (DNS, TLS, timeouts...).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The operation was cancelled before it completed.
    #[error("Operation cancelled")]
    Cancelled,

    /// The server returned a non-2xx HTTP status code.
    #[error("HTTP error {status}: {raw_response}")]
    HttpError {
        /// The HTTP status code
        status: StatusCode,
        /// The raw response body
        raw_response: String,
        /// The response headers
        headers: HeaderMap,
    },

    /// Failed to deserialize a response body into the expected type.
    #[error("Failed to deserialize response (status {status}): {serde_error}")]
    DeserializationFailed {
        /// The raw response body that failed to deserialize
        raw_response: String,
        /// The serde error message
        serde_error: String,
        /// The HTTP status code
        status: StatusCode,
    },
}

impl Error {
    pub(crate) fn authentication(reason: impl Into<String>) -> Self {
        Error::AuthenticationFailed {
            reason: reason.into(),
            status: None,
            raw_response: None,
        }
    }

    /// Returns `true` for errors caused by how a request or builder was set up.
    ///
    /// These are raised before any network activity and never go away on
    /// their own.
    ///
    /// ```
    /// use harvest_engine::Error;
    ///
    /// assert!(Error::MissingBody.is_configuration());
    /// assert!(!Error::Cancelled.is_configuration());
    /// ```
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::MissingBaseUrl
                | Error::MissingBody
                | Error::InvalidArgument(_)
                | Error::ConfigurationError(_)
                | Error::InvalidUrl(_)
                | Error::SerializationFailed(_)
        )
    }

    /// Returns `true` for `Unauthorized` and `AuthenticationFailed`.
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            Error::Unauthorized(_) | Error::AuthenticationFailed { .. }
        )
    }

    /// Returns the HTTP status code if this error has one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::HttpError { status, .. } => Some(*status),
            Error::DeserializationFailed { status, .. } => Some(*status),
            Error::AuthenticationFailed { status, .. } => *status,
            _ => None,
        }
    }

    /// Returns the raw response body if this error has one.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Error::HttpError { raw_response, .. } => Some(raw_response),
            Error::DeserializationFailed { raw_response, .. } => Some(raw_response),
            Error::AuthenticationFailed { raw_response, .. } => raw_response.as_deref(),
            _ => None,
        }
    }
}

/// A specialized `Result` type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(Error::MissingBaseUrl.is_configuration());
        assert!(Error::InvalidArgument("empty".into()).is_configuration());
        assert!(Error::Unauthorized("expired".into()).is_authentication());
        assert!(Error::authentication("state mismatch").is_authentication());
        assert!(!Error::Cancelled.is_authentication());
    }

    #[test]
    fn test_status_and_raw_response() {
        let err = Error::AuthenticationFailed {
            reason: "token endpoint rejected the request".into(),
            status: Some(StatusCode::BAD_REQUEST),
            raw_response: Some("{\"error\":\"invalid_grant\"}".into()),
        };
        assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
        assert_eq!(err.raw_response(), Some("{\"error\":\"invalid_grant\"}"));

        let err = Error::HttpError {
            status: StatusCode::NOT_FOUND,
            raw_response: "Not found".into(),
            headers: HeaderMap::new(),
        };
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(err.raw_response(), Some("Not found"));
        assert_eq!(Error::MissingBody.status(), None);
    }
}
