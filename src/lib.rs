//! # harvest-engine - request composition and authentication for Harvest API clients
//!
//! This crate is the engine underneath a Harvest v2 REST client. Resource
//! wrappers describe *what* to call with a URL template, typed parameters and
//! a body; the engine turns that into an authorized HTTP request and hands it
//! to a transport.
//!
//! ## Quick Start
//!
//! ```no_run
//! use harvest_engine::{
//!     QueryField, QueryParameters, RequestAdapter, RequestBuilder, RequestConfiguration,
//!     StaticTokenCredential,
//! };
//! use serde::Deserialize;
//! use tokio_util::sync::CancellationToken;
//!
//! #[derive(Default)]
//! struct ClientsQuery {
//!     is_active: Option<bool>,
//!     page: Option<u32>,
//! }
//!
//! impl QueryParameters for ClientsQuery {
//!     fn query_fields() -> Vec<QueryField<Self>> {
//!         vec![
//!             QueryField::new("is_active", |q: &Self| q.is_active.map(Into::into)),
//!             QueryField::new("page", |q: &Self| q.page.map(Into::into)),
//!         ]
//!     }
//! }
//!
//! #[derive(Deserialize)]
//! struct Clients {
//!     clients: Vec<serde_json::Value>,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), harvest_engine::Error> {
//!     let adapter = RequestAdapter::builder()
//!         .credential(StaticTokenCredential::new("personal-access-token")?)
//!         .account_id("12345")
//!         .build()?;
//!
//!     let request = RequestBuilder::new("{+baseurl}/clients{?is_active,page}").for_get(Some(
//!         |config: &mut RequestConfiguration<ClientsQuery>| {
//!             config.query().is_active = Some(true);
//!         },
//!     ))?;
//!
//!     let clients = adapter
//!         .send::<Clients>(request, &CancellationToken::new())
//!         .await?;
//!     println!("{} active clients", clients.clients.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Pieces
//!
//! - [`HeaderMultimap`] - case-insensitive, multi-valued headers
//! - [`UriTemplate`] / [`resolve`] - URI template expansion with typed
//!   [`ParamValue`] sanitization
//! - [`QueryParameters`] / [`bind`] - declarative query binding, first writer wins
//! - [`RequestDescriptor`] / [`RequestBuilder`] - request composition
//! - [`AccessToken`], [`StaticTokenCredential`], [`AuthorizationCodeCredential`] -
//!   authentication, including the OAuth2 authorization-code flow
//! - [`RequestAdapter`] - authorizes descriptors and sends them through a
//!   [`Transport`]
//!
//! ## Error Handling
//!
//! Every fallible operation returns [`Error`]. Configuration errors surface
//! before any network activity:
//!
//! ```
//! use harvest_engine::{Error, NoConfiguration, RequestBuilder};
//!
//! let builder = RequestBuilder::new("{+baseurl}/clients");
//! let result = builder.for_post::<serde_json::Value, (), NoConfiguration>(None, None);
//! assert!(matches!(result, Err(Error::MissingBody)));
//! ```

mod adapter;
pub mod auth;
mod builder;
mod error;
mod headers;
mod params;
mod query;
mod request;
mod response;
mod template;
mod token;
pub mod transport;

pub use adapter::{
    RequestAdapter, RequestAdapterBuilder, ACCOUNT_ID_HEADER, DEFAULT_BASE_URL, DEFAULT_USER_AGENT,
};
pub use auth::{
    AuthCredential, AuthorizationCodeCredential, HarvestTokenEndpoint, ResponseType,
    StaticTokenCredential, TokenEndpoint,
};
pub use builder::{NoConfiguration, RequestBuilder, RequestConfiguration};
pub use error::{Error, Result};
pub use headers::HeaderMultimap;
pub use params::{ParamMap, ParamValue};
pub use query::{bind, QueryField, QueryParameters};
pub use request::{RequestDescriptor, UriMode, APPLICATION_JSON};
pub use response::Response;
pub use template::{resolve, UriTemplate, BASE_URL_PARAM};
pub use token::{AccessToken, TokenResponse, REFRESH_WINDOW_SECS};
pub use transport::{ReqwestTransport, Transport};
