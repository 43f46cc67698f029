//! Credentials that authorize outgoing requests.
//!
//! Two strategies are provided:
//!
//! - [`StaticTokenCredential`] sends a fixed personal access token.
//! - [`AuthorizationCodeCredential`] runs the OAuth2 authorization-code flow
//!   and keeps its access token fresh.

mod authorization_code;
mod endpoint;
mod static_token;

pub use authorization_code::{AuthorizationCodeCredential, ResponseType, DEFAULT_SCOPE};
pub use endpoint::{
    ClientCredentials, HarvestTokenEndpoint, TokenEndpoint, TokenGrant, AUTHORIZATION_HOST,
};
pub use static_token::StaticTokenCredential;

use crate::request::RequestDescriptor;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Attaches authorization to a request before it is sent.
#[async_trait]
pub trait AuthCredential: Send + Sync {
    /// Adds the `Authorization` header to `request`.
    ///
    /// Implementations may perform network calls (such as a token refresh)
    /// and must abandon them without side effects if `cancel` fires.
    async fn authorize(&self, request: &mut RequestDescriptor, cancel: &CancellationToken)
        -> Result<()>;
}

#[async_trait]
impl<T: AuthCredential + ?Sized> AuthCredential for Arc<T> {
    async fn authorize(
        &self,
        request: &mut RequestDescriptor,
        cancel: &CancellationToken,
    ) -> Result<()> {
        (**self).authorize(request, cancel).await
    }
}

fn set_bearer(request: &mut RequestDescriptor, token: &str) -> Result<()> {
    request
        .headers
        .set(http::header::AUTHORIZATION.as_str(), format!("Bearer {}", token))
}
