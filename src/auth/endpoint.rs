//! The OAuth2 token endpoint collaborator.

use crate::token::TokenResponse;
use crate::{Error, Result};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Host serving the authorization and token endpoints.
pub const AUTHORIZATION_HOST: &str = "https://id.getharvest.com";

const TOKEN_PATH: &str = "/api/v2/oauth2/token";

/// The OAuth2 client registration.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    /// The client id.
    pub client_id: String,
    /// The client secret.
    pub client_secret: String,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// What is being exchanged for an access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenGrant<'a> {
    /// An authorization code received on the redirect URI.
    AuthorizationCode(&'a str),
    /// A refresh token from an earlier exchange.
    RefreshToken(&'a str),
}

impl TokenGrant<'_> {
    fn grant_type(&self) -> &'static str {
        match self {
            TokenGrant::AuthorizationCode(_) => "authorization_code",
            TokenGrant::RefreshToken(_) => "refresh_token",
        }
    }

    fn field(&self) -> (&'static str, &str) {
        match *self {
            TokenGrant::AuthorizationCode(code) => ("code", code),
            TokenGrant::RefreshToken(token) => ("refresh_token", token),
        }
    }
}

/// Exchanges authorization codes and refresh tokens for access tokens.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Requests a token, giving up with [`Error::Cancelled`] if `cancel` fires.
    async fn request_token(
        &self,
        client: &ClientCredentials,
        grant: TokenGrant<'_>,
        cancel: &CancellationToken,
    ) -> Result<TokenResponse>;
}

/// The Harvest ID token endpoint, called with `reqwest`.
#[derive(Debug, Clone)]
pub struct HarvestTokenEndpoint {
    http_client: reqwest::Client,
    token_url: Url,
    user_agent: String,
}

impl HarvestTokenEndpoint {
    /// Creates an endpoint pointing at [`AUTHORIZATION_HOST`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationError`] if the HTTP client cannot be built.
    pub fn new() -> Result<Self> {
        let http_client = reqwest::Client::builder().build().map_err(|e| {
            Error::ConfigurationError(format!("Failed to build HTTP client: {}", e))
        })?;
        Self::with_client(http_client, AUTHORIZATION_HOST)
    }

    /// Creates an endpoint on `host` using an existing client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if `host` is not a valid URL.
    pub fn with_client(http_client: reqwest::Client, host: &str) -> Result<Self> {
        let token_url = Url::parse(host)?.join(TOKEN_PATH)?;
        Ok(Self {
            http_client,
            token_url,
            user_agent: crate::adapter::DEFAULT_USER_AGENT.to_string(),
        })
    }

    /// Sets the `User-Agent` sent to the token endpoint.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Returns the token URL.
    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    async fn post(&self, client: &ClientCredentials, grant: TokenGrant<'_>) -> Result<TokenResponse> {
        let (field, value) = grant.field();
        let form = [
            (field, value),
            ("client_id", client.client_id.as_str()),
            ("client_secret", client.client_secret.as_str()),
            ("grant_type", grant.grant_type()),
        ];

        tracing::debug!(
            url = %self.token_url,
            grant_type = grant.grant_type(),
            "Requesting access token"
        );

        let response = self
            .http_client
            .post(self.token_url.clone())
            .header(http::header::USER_AGENT, &self.user_agent)
            .header(http::header::ACCEPT, crate::request::APPLICATION_JSON)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let raw_body = response.text().await?;

        if !status.is_success() {
            tracing::warn!(
                status = status.as_u16(),
                grant_type = grant.grant_type(),
                "Token endpoint rejected the request"
            );
            return Err(Error::AuthenticationFailed {
                reason: format!("token endpoint returned {}", status),
                status: Some(status),
                raw_response: Some(raw_body),
            });
        }

        serde_json::from_str::<TokenResponse>(&raw_body).map_err(|e| {
            tracing::error!(error = %e, "Failed to deserialize token response");
            Error::DeserializationFailed {
                raw_response: raw_body,
                serde_error: e.to_string(),
                status,
            }
        })
    }
}

#[async_trait]
impl TokenEndpoint for HarvestTokenEndpoint {
    async fn request_token(
        &self,
        client: &ClientCredentials,
        grant: TokenGrant<'_>,
        cancel: &CancellationToken,
    ) -> Result<TokenResponse> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = self.post(client, grant) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_url() {
        let endpoint = HarvestTokenEndpoint::new().unwrap();
        assert_eq!(
            endpoint.token_url().as_str(),
            "https://id.getharvest.com/api/v2/oauth2/token"
        );
    }

    #[test]
    fn test_grant_fields() {
        assert_eq!(TokenGrant::AuthorizationCode("c").field(), ("code", "c"));
        assert_eq!(TokenGrant::RefreshToken("r").grant_type(), "refresh_token");
    }

    #[tokio::test]
    async fn test_cancelled_before_request() {
        let endpoint =
            HarvestTokenEndpoint::with_client(reqwest::Client::new(), "http://127.0.0.1:9").unwrap();
        let client = ClientCredentials {
            client_id: "id".into(),
            client_secret: "secret".into(),
        };
        let cancel = CancellationToken::new();
        cancel.cancel();

        for _ in 0..20 {
            let result = endpoint
                .request_token(&client, TokenGrant::RefreshToken("r"), &cancel)
                .await;
            assert!(matches!(result, Err(Error::Cancelled)));
        }
    }

    #[test]
    fn test_client_secret_is_redacted() {
        let client = ClientCredentials {
            client_id: "id".into(),
            client_secret: "hunter2".into(),
        };
        assert!(!format!("{:?}", client).contains("hunter2"));
    }
}
