use super::{set_bearer, AuthCredential};
use crate::request::RequestDescriptor;
use crate::token::AccessToken;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::DateTime;
use tokio_util::sync::CancellationToken;

/// A fixed bearer token, such as a Harvest personal access token.
///
/// The token is sent unconditionally and never refreshed.
///
/// # Examples
///
/// ```
/// use harvest_engine::StaticTokenCredential;
///
/// let credential = StaticTokenCredential::new("my-personal-access-token")?;
/// assert_eq!(credential.access_token().token(), "my-personal-access-token");
/// # Ok::<(), harvest_engine::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticTokenCredential {
    token: AccessToken,
}

impl StaticTokenCredential {
    /// Creates a credential from an opaque token string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `token` is empty.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if token.is_empty() {
            return Err(Error::InvalidArgument("token must not be empty".to_string()));
        }
        Ok(Self {
            token: AccessToken::new(token, DateTime::<chrono::Utc>::MAX_UTC, None),
        })
    }

    /// Returns the wrapped token.
    pub fn access_token(&self) -> &AccessToken {
        &self.token
    }
}

#[async_trait]
impl AuthCredential for StaticTokenCredential {
    async fn authorize(
        &self,
        request: &mut RequestDescriptor,
        _cancel: &CancellationToken,
    ) -> Result<()> {
        set_bearer(request, self.token.token())
    }
}
