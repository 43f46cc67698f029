use super::endpoint::{ClientCredentials, TokenEndpoint, TokenGrant, AUTHORIZATION_HOST};
use super::{set_bearer, AuthCredential};
use crate::params::ParamMap;
use crate::request::RequestDescriptor;
use crate::template;
use crate::token::{AccessToken, TokenResponse};
use crate::{Error, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::{rngs::OsRng, RngCore};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Scope requested when none is configured.
pub const DEFAULT_SCOPE: &str = "harvest:all";

const AUTHORIZE_TEMPLATE: &str =
    "{+host}/oauth2/authorize{?client_id,redirect_uri,state,scope,response_type}";

/// The OAuth2 `response_type` requested from the authorization server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseType {
    /// Authorization-code flow; the code arrives in the redirect query.
    #[default]
    Code,
    /// Implicit flow; the token arrives in the redirect fragment.
    Token,
}

impl ResponseType {
    /// Returns the wire value.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::Code => "code",
            ResponseType::Token => "token",
        }
    }
}

/// OAuth2 authorization-code credential.
///
/// The flow runs in three steps:
///
/// 1. Send the user to [`authorization_url`](Self::authorization_url).
/// 2. Feed every redirect the host observes to
///    [`handle_redirect`](Self::handle_redirect) until it returns `true`.
/// 3. Use the credential to authorize requests. Tokens that are about to
///    expire are refreshed first.
///
/// Refreshes are serialized: concurrent requests wait for the refresh already
/// in flight instead of starting their own.
///
/// # Examples
///
/// ```no_run
/// use harvest_engine::{AuthorizationCodeCredential, HarvestTokenEndpoint};
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), harvest_engine::Error> {
/// let credential = AuthorizationCodeCredential::new(
///     "client-id",
///     "client-secret",
///     "http://localhost:8080/callback",
///     Arc::new(HarvestTokenEndpoint::new()?),
/// )?;
///
/// println!("Open {}", credential.authorization_url()?);
///
/// let cancel = CancellationToken::new();
/// let redirect = "http://localhost:8080/callback?code=abc&state=...";
/// if credential.handle_redirect(redirect, &cancel).await? {
///     println!("Authenticated");
/// }
/// # Ok(())
/// # }
/// ```
pub struct AuthorizationCodeCredential {
    client: ClientCredentials,
    redirect_uri: String,
    scope: String,
    response_type: ResponseType,
    authorization_host: String,
    state: OnceLock<String>,
    token: Mutex<Option<AccessToken>>,
    endpoint: Arc<dyn TokenEndpoint>,
}

impl AuthorizationCodeCredential {
    /// Creates an unauthenticated credential.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the client id or secret is empty,
    /// or if `redirect_uri` is not an absolute URL.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
        endpoint: Arc<dyn TokenEndpoint>,
    ) -> Result<Self> {
        let client = ClientCredentials {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        };
        if client.client_id.is_empty() {
            return Err(Error::InvalidArgument("client id must not be empty".to_string()));
        }
        if client.client_secret.is_empty() {
            return Err(Error::InvalidArgument(
                "client secret must not be empty".to_string(),
            ));
        }
        let redirect_uri = redirect_uri.into();
        Url::parse(&redirect_uri)
            .map_err(|e| Error::InvalidArgument(format!("Invalid redirect URI: {}", e)))?;

        Ok(Self {
            client,
            redirect_uri,
            scope: DEFAULT_SCOPE.to_string(),
            response_type: ResponseType::Code,
            authorization_host: AUTHORIZATION_HOST.to_string(),
            state: OnceLock::new(),
            token: Mutex::new(None),
            endpoint,
        })
    }

    /// Sets the requested scope.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Sets the requested response type.
    pub fn with_response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    /// Points the authorization URL at another host.
    pub fn with_authorization_host(mut self, host: impl Into<String>) -> Self {
        self.authorization_host = host.into().trim_end_matches('/').to_string();
        self
    }

    /// Returns the CSRF state, generating it on first use.
    ///
    /// The value is 32 random bytes from the OS, base64-encoded, and stays the
    /// same for the lifetime of the credential.
    pub fn state(&self) -> &str {
        self.state.get_or_init(generate_state)
    }

    /// Builds the URL the user visits to grant access.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if the authorization host is not a valid URL.
    pub fn authorization_url(&self) -> Result<Url> {
        let mut path = ParamMap::new();
        path.insert("host", self.authorization_host.as_str());

        let mut query = ParamMap::new();
        query.insert("client_id", self.client.client_id.as_str());
        query.insert("redirect_uri", self.redirect_uri.as_str());
        query.insert("state", self.state());
        query.insert("scope", self.scope.as_str());
        query.insert("response_type", self.response_type.as_str());

        template::resolve(AUTHORIZE_TEMPLATE, &path, &query)
    }

    /// Processes a redirect observed by the host.
    ///
    /// Redirects that do not start with the configured redirect URI are
    /// ignored and return `Ok(false)`. A matching redirect is validated and, on
    /// success, leaves the credential authenticated and returns `Ok(true)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AuthenticationFailed`] if the redirect is malformed,
    /// carries an `error`, has a state that does not match
    /// [`state`](Self::state), or lacks the code/token. Errors from the token
    /// endpoint are passed through.
    pub async fn handle_redirect(&self, received: &str, cancel: &CancellationToken) -> Result<bool> {
        if !received.starts_with(&self.redirect_uri) {
            tracing::debug!(redirect = %received, "Ignoring unrelated redirect");
            return Ok(false);
        }

        let url = Url::parse(received)
            .map_err(|e| Error::authentication(format!("malformed redirect URI: {}", e)))?;
        let params = self.redirect_parameters(&url);

        if let Some(error) = params.get("error") {
            let description = params
                .get("error_description")
                .map(|d| format!(": {}", d))
                .unwrap_or_default();
            return Err(Error::authentication(format!(
                "authorization was denied ({}){}",
                error, description
            )));
        }

        let Some(expected) = self.state.get() else {
            return Err(Error::authentication(
                "no authorization request was issued by this credential",
            ));
        };
        if params.get("state") != Some(expected) {
            return Err(Error::authentication("state parameter does not match"));
        }

        let token = match self.response_type {
            ResponseType::Code => {
                let code = params
                    .get("code")
                    .ok_or_else(|| Error::authentication("redirect carries no authorization code"))?;
                let response = self
                    .endpoint
                    .request_token(&self.client, TokenGrant::AuthorizationCode(code), cancel)
                    .await?;
                AccessToken::from_response(response)
            }
            ResponseType::Token => {
                let access_token = params
                    .get("access_token")
                    .ok_or_else(|| Error::authentication("redirect carries no access token"))?;
                let expires_in = params
                    .get("expires_in")
                    .and_then(|s| s.parse::<i64>().ok())
                    .ok_or_else(|| Error::authentication("redirect carries no valid expires_in"))?;
                AccessToken::from_response(TokenResponse {
                    access_token: access_token.clone(),
                    refresh_token: None,
                    token_type: params.get("token_type").cloned(),
                    expires_in,
                    scope: params.get("scope").cloned(),
                })
            }
        };

        let mut guard = self.lock_token(cancel).await?;
        *guard = Some(token);
        tracing::info!(
            response_type = self.response_type.as_str(),
            "Authorization completed"
        );
        Ok(true)
    }

    /// Returns a copy of the current access token, if any.
    pub async fn access_token(&self) -> Option<AccessToken> {
        self.token.lock().await.clone()
    }

    /// Installs a previously stored access token.
    pub async fn set_access_token(&self, token: AccessToken) {
        *self.token.lock().await = Some(token);
    }

    fn redirect_parameters(&self, url: &Url) -> HashMap<String, String> {
        let raw = match self.response_type {
            ResponseType::Code => url.query(),
            ResponseType::Token => url.fragment(),
        };
        url::form_urlencoded::parse(raw.unwrap_or_default().as_bytes())
            .into_owned()
            .collect()
    }

    async fn lock_token(
        &self,
        cancel: &CancellationToken,
    ) -> Result<tokio::sync::MutexGuard<'_, Option<AccessToken>>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            guard = self.token.lock() => Ok(guard),
        }
    }
}

impl std::fmt::Debug for AuthorizationCodeCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationCodeCredential")
            .field("client", &self.client)
            .field("redirect_uri", &self.redirect_uri)
            .field("scope", &self.scope)
            .field("response_type", &self.response_type)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AuthCredential for AuthorizationCodeCredential {
    async fn authorize(
        &self,
        request: &mut RequestDescriptor,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut guard = self.lock_token(cancel).await?;
        let token = guard.as_mut().ok_or_else(|| {
            Error::Unauthorized("no access token; complete the authorization flow first".to_string())
        })?;

        let refresh_token = token
            .refresh_token()
            .map(str::to_owned)
            .filter(|_| token.refresh_needed());

        if let Some(refresh_token) = refresh_token {
            let response = self
                .endpoint
                .request_token(&self.client, TokenGrant::RefreshToken(&refresh_token), cancel)
                .await?;
            token.apply(response);
            tracing::info!(expires_at = %token.expires_at(), "Access token refreshed");
        } else if token.is_expired() {
            return Err(Error::Unauthorized(
                "access token expired and cannot be refreshed".to_string(),
            ));
        }

        set_bearer(request, token.token())
    }
}

fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use http::Method;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeEndpoint {
        calls: AtomicUsize,
        grants: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TokenEndpoint for FakeEndpoint {
        async fn request_token(
            &self,
            _client: &ClientCredentials,
            grant: TokenGrant<'_>,
            cancel: &CancellationToken,
        ) -> Result<TokenResponse> {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.grants.lock().unwrap().push(format!("{:?}", grant));
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            Ok(TokenResponse {
                access_token: format!("access-{}", n),
                refresh_token: Some(format!("refresh-{}", n)),
                token_type: Some("bearer".into()),
                expires_in: 1_209_600,
                scope: Some(DEFAULT_SCOPE.into()),
            })
        }
    }

    const REDIRECT: &str = "http://localhost:8080/callback";

    fn credential(endpoint: Arc<FakeEndpoint>) -> AuthorizationCodeCredential {
        AuthorizationCodeCredential::new("client-id", "secret", REDIRECT, endpoint).unwrap()
    }

    fn request() -> RequestDescriptor {
        RequestDescriptor::new(Method::GET, "{+baseurl}/users/me")
    }

    fn bearer(request: &RequestDescriptor) -> String {
        request
            .headers
            .get("authorization")
            .and_then(|v| v.iter().next().cloned())
            .unwrap_or_default()
    }

    #[test]
    fn test_authorization_url_has_stable_state() {
        let credential = credential(Arc::default());
        let first = credential.authorization_url().unwrap();
        let second = credential.authorization_url().unwrap();

        let state = |url: &Url| {
            url.query_pairs()
                .find(|(k, _)| k == "state")
                .map(|(_, v)| v.into_owned())
        };
        assert_eq!(state(&first), state(&second));
        assert_eq!(state(&first).as_deref(), Some(credential.state()));

        let decoded = STANDARD.decode(credential.state()).unwrap();
        assert_eq!(decoded.len(), 32);
    }

    #[test]
    fn test_authorization_url_layout() {
        let credential = credential(Arc::default());
        let url = credential.authorization_url().unwrap();

        assert_eq!(url.host_str(), Some("id.getharvest.com"));
        assert_eq!(url.path(), "/oauth2/authorize");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let names: Vec<_> = pairs.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            names,
            vec!["client_id", "redirect_uri", "state", "scope", "response_type"]
        );
        assert_eq!(pairs[1].1, REDIRECT);
        assert_eq!(pairs[3].1, "harvest:all");
        assert_eq!(pairs[4].1, "code");
        assert!(url
            .as_str()
            .contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080%2Fcallback"));
    }

    #[test]
    fn test_distinct_credentials_get_distinct_states() {
        let a = credential(Arc::default());
        let b = credential(Arc::default());
        assert_ne!(a.state(), b.state());
    }

    #[tokio::test]
    async fn test_unrelated_redirect_is_ignored() {
        let endpoint = Arc::new(FakeEndpoint::default());
        let credential = credential(endpoint.clone());
        credential.authorization_url().unwrap();

        let handled = credential
            .handle_redirect("https://example.com/elsewhere?code=x", &CancellationToken::new())
            .await
            .unwrap();
        assert!(!handled);
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 0);
        assert!(credential.access_token().await.is_none());
    }

    #[tokio::test]
    async fn test_code_exchange_authenticates() {
        let endpoint = Arc::new(FakeEndpoint::default());
        let credential = credential(endpoint.clone());
        credential.authorization_url().unwrap();

        let mut redirect = Url::parse(REDIRECT).unwrap();
        redirect
            .query_pairs_mut()
            .append_pair("code", "the-code")
            .append_pair("scope", "harvest:1234")
            .append_pair("state", credential.state());

        let handled = credential
            .handle_redirect(redirect.as_str(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(handled);
        assert_eq!(
            endpoint.grants.lock().unwrap().as_slice(),
            ["AuthorizationCode(\"the-code\")"]
        );

        let mut request = request();
        credential
            .authorize(&mut request, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(bearer(&request), "Bearer access-1");
    }

    #[tokio::test]
    async fn test_state_mismatch_fails() {
        let credential = credential(Arc::default());
        credential.authorization_url().unwrap();

        let result = credential
            .handle_redirect(
                &format!("{}?code=abc&state=forged", REDIRECT),
                &CancellationToken::new(),
            )
            .await;
        assert!(matches!(result, Err(Error::AuthenticationFailed { .. })));
    }

    #[tokio::test]
    async fn test_denied_redirect_fails() {
        let credential = credential(Arc::default());
        credential.authorization_url().unwrap();

        let result = credential
            .handle_redirect(
                &format!("{}?error=access_denied", REDIRECT),
                &CancellationToken::new(),
            )
            .await;
        assert!(matches!(result, Err(Error::AuthenticationFailed { .. })));
    }

    #[tokio::test]
    async fn test_missing_code_fails() {
        let credential = credential(Arc::default());
        let mut redirect = Url::parse(REDIRECT).unwrap();
        redirect
            .query_pairs_mut()
            .append_pair("state", credential.state());

        let result = credential
            .handle_redirect(redirect.as_str(), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(Error::AuthenticationFailed { .. })));
    }

    #[tokio::test]
    async fn test_implicit_flow_reads_fragment() {
        let endpoint = Arc::new(FakeEndpoint::default());
        let credential = credential(endpoint.clone()).with_response_type(ResponseType::Token);
        let url = credential.authorization_url().unwrap();
        assert!(url.as_str().ends_with("response_type=token"));

        let mut redirect = Url::parse(REDIRECT).unwrap();
        let fragment = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("access_token", "implicit-token")
            .append_pair("expires_in", "3600")
            .append_pair("state", credential.state())
            .finish();
        redirect.set_fragment(Some(&fragment));

        assert!(credential
            .handle_redirect(redirect.as_str(), &CancellationToken::new())
            .await
            .unwrap());
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 0);

        let token = credential.access_token().await.unwrap();
        assert_eq!(token.token(), "implicit-token");
        assert_eq!(token.refresh_token(), None);
    }

    #[tokio::test]
    async fn test_unauthenticated_authorize_fails() {
        let credential = credential(Arc::default());
        let result = credential
            .authorize(&mut request(), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(Error::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_refreshes_token_near_expiry() {
        let endpoint = Arc::new(FakeEndpoint::default());
        let credential = credential(endpoint.clone());
        credential
            .set_access_token(AccessToken::new(
                "old",
                Utc::now() + Duration::minutes(2),
                Some("old-refresh".into()),
            ))
            .await;

        let mut request = request();
        credential
            .authorize(&mut request, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(bearer(&request), "Bearer access-1");
        assert_eq!(
            endpoint.grants.lock().unwrap().as_slice(),
            ["RefreshToken(\"old-refresh\")"]
        );
        let token = credential.access_token().await.unwrap();
        assert_eq!(token.refresh_token(), Some("refresh-1"));
        assert!(!token.refresh_needed());
    }

    #[tokio::test]
    async fn test_expired_token_without_refresh_is_unauthorized() {
        let credential = credential(Arc::default());
        credential
            .set_access_token(AccessToken::new("old", Utc::now() - Duration::seconds(1), None))
            .await;

        let result = credential
            .authorize(&mut request(), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(Error::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_refresh() {
        let endpoint = Arc::new(FakeEndpoint::default());
        let credential = Arc::new(credential(endpoint.clone()));
        credential
            .set_access_token(AccessToken::new(
                "old",
                Utc::now() + Duration::seconds(30),
                Some("old-refresh".into()),
            ))
            .await;

        let mut handles = Vec::new();
        for _ in 0..5 {
            let credential = credential.clone();
            handles.push(tokio::spawn(async move {
                let mut request = request();
                credential
                    .authorize(&mut request, &CancellationToken::new())
                    .await
                    .map(|_| bearer(&request))
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "Bearer access-1");
        }
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_refresh_leaves_token_untouched() {
        let endpoint = Arc::new(FakeEndpoint::default());
        let credential = credential(endpoint.clone());
        let original = AccessToken::new(
            "old",
            Utc::now() + Duration::minutes(1),
            Some("old-refresh".into()),
        );
        credential.set_access_token(original.clone()).await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = credential.authorize(&mut request(), &cancel).await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(credential.access_token().await, Some(original));
    }

    #[tokio::test]
    async fn test_cancelled_signal_always_wins_over_fresh_token() {
        let endpoint = Arc::new(FakeEndpoint::default());
        let credential = credential(endpoint.clone());
        credential
            .set_access_token(AccessToken::new(
                "fresh",
                Utc::now() + Duration::days(7),
                Some("refresh".into()),
            ))
            .await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        for _ in 0..100 {
            let mut request = request();
            let result = credential.authorize(&mut request, &cancel).await;
            assert!(matches!(result, Err(Error::Cancelled)));
            assert!(!request.headers.contains_key("authorization"));
        }
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_rejects_missing_arguments() {
        let endpoint: Arc<dyn TokenEndpoint> = Arc::new(FakeEndpoint::default());
        assert!(matches!(
            AuthorizationCodeCredential::new("", "secret", REDIRECT, endpoint.clone()),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            AuthorizationCodeCredential::new("id", "", REDIRECT, endpoint.clone()),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            AuthorizationCodeCredential::new("id", "secret", "not a url", endpoint),
            Err(Error::InvalidArgument(_))
        ));
    }
}
