//! OAuth2 access tokens.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// How many seconds ahead of expiry a refreshable token is renewed.
pub const REFRESH_WINDOW_SECS: i64 = 300;

/// The body returned by the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The bearer token.
    pub access_token: String,
    /// Token used to obtain a new access token.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Usually `bearer`.
    #[serde(default)]
    pub token_type: Option<String>,
    /// Lifetime of the access token in seconds.
    pub expires_in: i64,
    /// Granted scopes.
    #[serde(default)]
    pub scope: Option<String>,
}

/// A bearer token with its expiry and optional refresh token.
///
/// The three fields are only ever replaced together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    token: String,
    expires_at: DateTime<Utc>,
    refresh_token: Option<String>,
}

impl AccessToken {
    /// Creates a token expiring at `expires_at`.
    pub fn new(
        token: impl Into<String>,
        expires_at: DateTime<Utc>,
        refresh_token: Option<String>,
    ) -> Self {
        Self {
            token: token.into(),
            expires_at,
            refresh_token,
        }
    }

    /// Creates a token from a token endpoint response, expiring `expires_in`
    /// seconds from now.
    pub fn from_response(response: TokenResponse) -> Self {
        Self::new(
            response.access_token,
            expiry_from_now(response.expires_in),
            response.refresh_token,
        )
    }

    /// Returns the bearer token.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Returns the expiry instant.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Returns the refresh token, if any.
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    /// Returns `true` if the token expires within five minutes and can be
    /// refreshed.
    ///
    /// A token without a refresh token never needs a refresh, since none can
    /// be performed.
    pub fn refresh_needed(&self) -> bool {
        self.refresh_needed_at(Utc::now())
    }

    /// [`refresh_needed`](Self::refresh_needed) evaluated at `now`.
    ///
    /// ```
    /// use harvest_engine::AccessToken;
    /// use chrono::{Duration, Utc};
    ///
    /// let now = Utc::now();
    /// let token = AccessToken::new("t", now + Duration::minutes(4), Some("r".into()));
    /// assert!(token.refresh_needed_at(now));
    ///
    /// let token = AccessToken::new("t", now + Duration::minutes(4), None);
    /// assert!(!token.refresh_needed_at(now));
    /// ```
    pub fn refresh_needed_at(&self, now: DateTime<Utc>) -> bool {
        self.refresh_token.is_some() && self.expires_at < now + Duration::seconds(REFRESH_WINDOW_SECS)
    }

    /// Returns `true` once the expiry instant has passed.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// [`is_expired`](Self::is_expired) evaluated at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Replaces the token, its expiry and its refresh token in one step.
    pub fn update(
        &mut self,
        token: impl Into<String>,
        expires_in_seconds: i64,
        refresh_token: Option<String>,
    ) {
        *self = Self::new(token, expiry_from_now(expires_in_seconds), refresh_token);
    }

    /// Replaces all fields from a token endpoint response.
    ///
    /// A response without a refresh token keeps the current one, since token
    /// endpoints may omit it when it did not rotate.
    pub fn apply(&mut self, response: TokenResponse) {
        let refresh_token = response.refresh_token.or_else(|| self.refresh_token.take());
        self.update(response.access_token, response.expires_in, refresh_token);
    }
}

fn expiry_from_now(expires_in_seconds: i64) -> DateTime<Utc> {
    let lifetime = Duration::try_seconds(expires_in_seconds).unwrap_or(Duration::MAX);
    Utc::now()
        .checked_add_signed(lifetime)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
